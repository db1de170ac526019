//! HTTP route handlers.

use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Json, Response},
    routing::{delete, get, post, put},
};
use serde::{Deserialize, Serialize};

use crate::health::Health;
use crate::records::{
    Contact, ContactDraft, Contract, ContractDraft, DocumentDraft, LinkedDocument, Pendency,
    PendencyDraft, RecordId, StaffDraft, StaffRecord, StudentDraft, StudentRecord,
};
use crate::service::{ArchiveService, HealthSnapshot};
use crate::slots::PoolType;
use crate::store::{
    ContactRow, ContractRow, DocumentHolder, PendencyRow, RecordQuery, StoreError,
};
use crate::version::VersionInfo;

type ApiResult<T> = Result<T, StoreError>;

impl IntoResponse for StoreError {
    fn into_response(self) -> Response {
        match self {
            StoreError::NotFound { .. } => (
                StatusCode::NOT_FOUND,
                Json(serde_json::json!({ "detail": self.to_string() })),
            )
                .into_response(),
            StoreError::Validation { field, message } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                Json(serde_json::json!({
                    "detail": [{
                        "loc": ["body", field],
                        "msg": message,
                        "type": "value_error"
                    }]
                })),
            )
                .into_response(),
            StoreError::Conflict(reason) => (
                StatusCode::CONFLICT,
                Json(serde_json::json!({ "detail": reason })),
            )
                .into_response(),
            StoreError::Storage(reason) => {
                tracing::error!(error = %reason, "Storage failure while serving request");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(serde_json::json!({ "detail": "storage error" })),
                )
                    .into_response()
            }
        }
    }
}

fn parse_pool(raw: &str) -> Result<PoolType, Response> {
    raw.parse::<PoolType>().map_err(|e| {
        (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "detail": e.to_string() })),
        )
            .into_response()
    })
}

#[derive(Debug, Serialize)]
pub struct HealthCheckResponse {
    pub status: Health,
    pub students: usize,
    pub staff: usize,
    pub version: VersionInfo,
}

impl From<HealthSnapshot> for HealthCheckResponse {
    fn from(snapshot: HealthSnapshot) -> Self {
        Self {
            status: snapshot.state,
            students: snapshot.students,
            staff: snapshot.staff,
            version: snapshot.version,
        }
    }
}

async fn health_check(State(service): State<Arc<ArchiveService>>) -> Json<HealthCheckResponse> {
    Json(service.health().await.into())
}

async fn shutdown(State(service): State<Arc<ArchiveService>>) -> impl IntoResponse {
    tracing::info!("Shutdown requested via HTTP");
    service.set_health(Health::ShuttingDown).await;
    service.trigger_shutdown();
    (StatusCode::OK, Json(serde_json::json!({})))
}

// ----- slots -----

#[derive(Debug, Serialize)]
pub struct AvailableSlots {
    pub pool: PoolType,
    pub available: Vec<u32>,
}

#[derive(Debug, Serialize)]
pub struct SlotCheck {
    pub pool: PoolType,
    pub number: u32,
    pub available: bool,
}

async fn available_slots(
    State(service): State<Arc<ArchiveService>>,
    Path(pool): Path<String>,
) -> Result<Json<AvailableSlots>, Response> {
    let pool = parse_pool(&pool)?;
    let available = service
        .store()
        .available_slots(pool)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(AvailableSlots { pool, available }))
}

async fn check_slot(
    State(service): State<Arc<ArchiveService>>,
    Path((pool, number)): Path<(String, u32)>,
) -> Result<Json<SlotCheck>, Response> {
    let pool = parse_pool(&pool)?;
    let available = service
        .store()
        .validate_slot(pool, number)
        .await
        .map_err(IntoResponse::into_response)?;
    Ok(Json(SlotCheck {
        pool,
        number,
        available,
    }))
}

// ----- students -----

async fn list_students(
    State(service): State<Arc<ArchiveService>>,
    Query(query): Query<RecordQuery>,
) -> Json<Vec<StudentRecord>> {
    Json(service.store().list_students(&query).await)
}

async fn get_student(
    State(service): State<Arc<ArchiveService>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Json<StudentRecord>> {
    Ok(Json(service.store().student(id).await?))
}

async fn create_student(
    State(service): State<Arc<ArchiveService>>,
    Json(draft): Json<StudentDraft>,
) -> ApiResult<(StatusCode, Json<StudentRecord>)> {
    let student = service.store().create_student(draft).await?;
    Ok((StatusCode::CREATED, Json(student)))
}

async fn update_student(
    State(service): State<Arc<ArchiveService>>,
    Path(id): Path<RecordId>,
    Json(draft): Json<StudentDraft>,
) -> ApiResult<Json<StudentRecord>> {
    Ok(Json(service.store().update_student(id, draft).await?))
}

async fn delete_student(
    State(service): State<Arc<ArchiveService>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Json<StudentRecord>> {
    Ok(Json(service.store().delete_student(id).await?))
}

async fn add_contact(
    State(service): State<Arc<ArchiveService>>,
    Path(id): Path<RecordId>,
    Json(draft): Json<ContactDraft>,
) -> ApiResult<(StatusCode, Json<Contact>)> {
    let contact = service.store().add_contact(id, draft).await?;
    Ok((StatusCode::CREATED, Json(contact)))
}

async fn update_contact(
    State(service): State<Arc<ArchiveService>>,
    Path((id, contact_id)): Path<(RecordId, RecordId)>,
    Json(draft): Json<ContactDraft>,
) -> ApiResult<Json<Contact>> {
    Ok(Json(
        service.store().update_contact(id, contact_id, draft).await?,
    ))
}

async fn delete_contact(
    State(service): State<Arc<ArchiveService>>,
    Path((id, contact_id)): Path<(RecordId, RecordId)>,
) -> ApiResult<Json<Contact>> {
    Ok(Json(service.store().delete_contact(id, contact_id).await?))
}

async fn add_pendency(
    State(service): State<Arc<ArchiveService>>,
    Path(id): Path<RecordId>,
    Json(draft): Json<PendencyDraft>,
) -> ApiResult<(StatusCode, Json<Pendency>)> {
    let pendency = service.store().add_pendency(id, draft).await?;
    Ok((StatusCode::CREATED, Json(pendency)))
}

async fn update_pendency(
    State(service): State<Arc<ArchiveService>>,
    Path((id, pendency_id)): Path<(RecordId, RecordId)>,
    Json(draft): Json<PendencyDraft>,
) -> ApiResult<Json<Pendency>> {
    Ok(Json(
        service
            .store()
            .update_pendency(id, pendency_id, draft)
            .await?,
    ))
}

async fn delete_pendency(
    State(service): State<Arc<ArchiveService>>,
    Path((id, pendency_id)): Path<(RecordId, RecordId)>,
) -> ApiResult<Json<Pendency>> {
    Ok(Json(
        service.store().delete_pendency(id, pendency_id).await?,
    ))
}

async fn list_contacts(State(service): State<Arc<ArchiveService>>) -> Json<Vec<ContactRow>> {
    Json(service.store().all_contacts().await)
}

async fn list_pendencies(State(service): State<Arc<ArchiveService>>) -> Json<Vec<PendencyRow>> {
    Json(service.store().all_pendencies().await)
}

// ----- staff -----

async fn list_staff(
    State(service): State<Arc<ArchiveService>>,
    Query(query): Query<RecordQuery>,
) -> Json<Vec<StaffRecord>> {
    Json(service.store().list_staff(&query).await)
}

async fn get_staff(
    State(service): State<Arc<ArchiveService>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Json<StaffRecord>> {
    Ok(Json(service.store().staff_member(id).await?))
}

async fn create_staff(
    State(service): State<Arc<ArchiveService>>,
    Json(draft): Json<StaffDraft>,
) -> ApiResult<(StatusCode, Json<StaffRecord>)> {
    let staff = service.store().create_staff(draft).await?;
    Ok((StatusCode::CREATED, Json(staff)))
}

async fn update_staff(
    State(service): State<Arc<ArchiveService>>,
    Path(id): Path<RecordId>,
    Json(draft): Json<StaffDraft>,
) -> ApiResult<Json<StaffRecord>> {
    Ok(Json(service.store().update_staff(id, draft).await?))
}

async fn delete_staff(
    State(service): State<Arc<ArchiveService>>,
    Path(id): Path<RecordId>,
) -> ApiResult<Json<StaffRecord>> {
    Ok(Json(service.store().delete_staff(id).await?))
}

async fn add_contract(
    State(service): State<Arc<ArchiveService>>,
    Path(id): Path<RecordId>,
    Json(draft): Json<ContractDraft>,
) -> ApiResult<(StatusCode, Json<Contract>)> {
    let contract = service.store().add_contract(id, draft).await?;
    Ok((StatusCode::CREATED, Json(contract)))
}

async fn update_contract(
    State(service): State<Arc<ArchiveService>>,
    Path((id, contract_id)): Path<(RecordId, RecordId)>,
    Json(draft): Json<ContractDraft>,
) -> ApiResult<Json<Contract>> {
    Ok(Json(
        service
            .store()
            .update_contract(id, contract_id, draft)
            .await?,
    ))
}

async fn delete_contract(
    State(service): State<Arc<ArchiveService>>,
    Path((id, contract_id)): Path<(RecordId, RecordId)>,
) -> ApiResult<Json<Contract>> {
    Ok(Json(
        service.store().delete_contract(id, contract_id).await?,
    ))
}

async fn list_contracts(State(service): State<Arc<ArchiveService>>) -> Json<Vec<ContractRow>> {
    Json(service.store().all_contracts().await)
}

// ----- documents and covers, shared by both pools -----

async fn attach_document(
    service: &ArchiveService,
    pool: PoolType,
    id: RecordId,
    draft: DocumentDraft,
) -> ApiResult<(StatusCode, Json<LinkedDocument>)> {
    let doc = service.store().attach_document(pool, id, draft).await?;
    Ok((StatusCode::CREATED, Json(doc)))
}

async fn attach_student_document(
    State(service): State<Arc<ArchiveService>>,
    Path(id): Path<RecordId>,
    Json(draft): Json<DocumentDraft>,
) -> ApiResult<(StatusCode, Json<LinkedDocument>)> {
    attach_document(&service, PoolType::Student, id, draft).await
}

async fn attach_staff_document(
    State(service): State<Arc<ArchiveService>>,
    Path(id): Path<RecordId>,
    Json(draft): Json<DocumentDraft>,
) -> ApiResult<(StatusCode, Json<LinkedDocument>)> {
    attach_document(&service, PoolType::Staff, id, draft).await
}

async fn detach_student_document(
    State(service): State<Arc<ArchiveService>>,
    Path((id, doc_id)): Path<(RecordId, RecordId)>,
) -> ApiResult<Json<LinkedDocument>> {
    Ok(Json(
        service
            .store()
            .detach_document(PoolType::Student, id, doc_id)
            .await?,
    ))
}

async fn detach_staff_document(
    State(service): State<Arc<ArchiveService>>,
    Path((id, doc_id)): Path<(RecordId, RecordId)>,
) -> ApiResult<Json<LinkedDocument>> {
    Ok(Json(
        service
            .store()
            .detach_document(PoolType::Staff, id, doc_id)
            .await?,
    ))
}

#[derive(Debug, Default, Deserialize)]
pub struct DocumentQuery {
    #[serde(default)]
    pub name: Option<String>,
}

async fn search_documents(
    State(service): State<Arc<ArchiveService>>,
    Query(query): Query<DocumentQuery>,
) -> Json<Vec<DocumentHolder>> {
    Json(service.store().documents(query.name.as_deref()).await)
}

#[derive(Debug, Default, Deserialize)]
pub struct CoverQuery {
    /// `json` returns the sheet's fields instead of the printable text.
    #[serde(default)]
    pub format: Option<String>,
}

async fn cover(
    service: &ArchiveService,
    pool: PoolType,
    id: RecordId,
    query: CoverQuery,
) -> ApiResult<Response> {
    let sheet = service.store().cover_sheet(pool, id).await?;
    if query.format.as_deref() == Some("json") {
        return Ok(Json(sheet).into_response());
    }
    let disposition = format!("inline; filename=\"{}\"", sheet.file_name);
    Ok((
        [
            (header::CONTENT_TYPE, "text/plain; charset=utf-8".to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        sheet.render_text(),
    )
        .into_response())
}

async fn student_cover(
    State(service): State<Arc<ArchiveService>>,
    Path(id): Path<RecordId>,
    Query(query): Query<CoverQuery>,
) -> ApiResult<Response> {
    cover(&service, PoolType::Student, id, query).await
}

async fn staff_cover(
    State(service): State<Arc<ArchiveService>>,
    Path(id): Path<RecordId>,
    Query(query): Query<CoverQuery>,
) -> ApiResult<Response> {
    cover(&service, PoolType::Staff, id, query).await
}

pub fn routes(service: Arc<ArchiveService>) -> Router {
    Router::new()
        .route("/health-check", get(health_check))
        .route("/shutdown", post(shutdown))
        .route("/slots/{pool}/available", get(available_slots))
        .route("/slots/{pool}/available/{number}", get(check_slot))
        .route("/students", get(list_students).post(create_student))
        .route(
            "/students/{id}",
            get(get_student).put(update_student).delete(delete_student),
        )
        .route("/students/{id}/cover", get(student_cover))
        .route("/students/{id}/contacts", post(add_contact))
        .route(
            "/students/{id}/contacts/{cid}",
            put(update_contact).delete(delete_contact),
        )
        .route("/students/{id}/pendencies", post(add_pendency))
        .route(
            "/students/{id}/pendencies/{pid}",
            put(update_pendency).delete(delete_pendency),
        )
        .route("/students/{id}/documents", post(attach_student_document))
        .route(
            "/students/{id}/documents/{did}",
            delete(detach_student_document),
        )
        .route("/staff", get(list_staff).post(create_staff))
        .route(
            "/staff/{id}",
            get(get_staff).put(update_staff).delete(delete_staff),
        )
        .route("/staff/{id}/cover", get(staff_cover))
        .route("/staff/{id}/contracts", post(add_contract))
        .route(
            "/staff/{id}/contracts/{cid}",
            put(update_contract).delete(delete_contract),
        )
        .route("/staff/{id}/documents", post(attach_staff_document))
        .route("/staff/{id}/documents/{did}", delete(detach_staff_document))
        .route("/contacts", get(list_contacts))
        .route("/pendencies", get(list_pendencies))
        .route("/contracts", get(list_contracts))
        .route("/documents", get(search_documents))
        .with_state(service)
}
