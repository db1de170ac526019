//! RecordStore: student and staff folders plus their slot assignments.
//!
//! The store owns which record holds which slot; the allocator owns the
//! released ledger. Every write path calls the allocator explicitly, in this
//! order:
//! - create: validate-or-acquire, consume, then write the record
//! - update: validate the new slot, consume it, then release the old one
//! - delete: release the slot, then remove the record
//!
//! All of it happens under the store's write lock, so the record table and
//! the ledger move together.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::cover::CoverSheet;
use crate::persist::{self, PersistError};
use crate::records::{
    Contact, ContactDraft, Contract, ContractDraft, DocumentDraft, FieldError, FileStatus,
    LinkedDocument, Pendency, PendencyDraft, RecordId, StaffDraft, StaffRecord, StudentDraft,
    StudentRecord,
};
use crate::slots::{
    AllocatorError, FileLedger, MemoryLedger, PoolType, ReleasedLedger, SlotAllocator,
};

pub const LEDGER_FILE: &str = "released_slots.json";
pub const RECORDS_FILE: &str = "records.json";

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("{kind} {id} not found")]
    NotFound { kind: &'static str, id: RecordId },
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },
    #[error("{0}")]
    Conflict(String),
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<FieldError> for StoreError {
    fn from(e: FieldError) -> Self {
        StoreError::Validation {
            field: e.field,
            message: e.message,
        }
    }
}

impl From<AllocatorError> for StoreError {
    fn from(e: AllocatorError) -> Self {
        match e {
            AllocatorError::Exhausted { .. } => StoreError::Conflict(e.to_string()),
            AllocatorError::Ledger(_) => StoreError::Storage(e.to_string()),
        }
    }
}

impl From<PersistError> for StoreError {
    fn from(e: PersistError) -> Self {
        StoreError::Storage(e.to_string())
    }
}

fn not_found(kind: &'static str, id: RecordId) -> StoreError {
    StoreError::NotFound { kind, id }
}

/// Search filters for folder listings.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RecordQuery {
    /// Case-insensitive substring of the holder's name.
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub location: Option<u32>,
    #[serde(default)]
    pub status: Option<FileStatus>,
}

impl RecordQuery {
    fn matches(&self, name: &str, location: Option<u32>, status: FileStatus) -> bool {
        if let Some(needle) = self.name.as_deref().map(str::trim).filter(|n| !n.is_empty())
            && !name.to_lowercase().contains(&needle.to_lowercase())
        {
            return false;
        }
        if self.location.is_some() && self.location != location {
            return false;
        }
        if self.status.is_some_and(|s| s != status) {
            return false;
        }
        true
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ContactRow {
    pub student_id: RecordId,
    pub student_name: String,
    #[serde(flatten)]
    pub contact: Contact,
}

#[derive(Debug, Clone, Serialize)]
pub struct PendencyRow {
    pub student_id: RecordId,
    pub student_name: String,
    #[serde(flatten)]
    pub pendency: Pendency,
}

#[derive(Debug, Clone, Serialize)]
pub struct ContractRow {
    pub staff_id: RecordId,
    pub staff_name: String,
    #[serde(flatten)]
    pub contract: Contract,
}

/// A folder and its linked documents, as returned by document search.
#[derive(Debug, Clone, Serialize)]
pub struct DocumentHolder {
    pub pool: PoolType,
    pub id: RecordId,
    pub name: String,
    pub location: Option<u32>,
    pub documents: Vec<LinkedDocument>,
}

/// Persisted record tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Records {
    #[serde(default)]
    last_id: RecordId,
    #[serde(default)]
    students: BTreeMap<RecordId, StudentRecord>,
    #[serde(default)]
    staff: BTreeMap<RecordId, StaffRecord>,
}

impl Records {
    fn occupancy(&self, pool: PoolType) -> BTreeSet<u32> {
        match pool {
            PoolType::Student => self.students.values().filter_map(|s| s.location).collect(),
            PoolType::Staff => self.staff.values().filter_map(|s| s.location).collect(),
        }
    }
}

fn next_id(last_id: &mut RecordId) -> RecordId {
    *last_id += 1;
    *last_id
}

/// A folder kind that holds a slot in one pool.
trait Folder: Clone {
    const POOL: PoolType;
    const KIND: &'static str;

    fn location(&self) -> Option<u32>;
    fn set_location(&mut self, location: Option<u32>);
    fn documents_mut(&mut self) -> &mut Vec<LinkedDocument>;
    fn table(records: &Records) -> &BTreeMap<RecordId, Self>;
    /// The folder table and the shared id counter, borrowed together.
    fn split_mut(records: &mut Records) -> (&mut BTreeMap<RecordId, Self>, &mut RecordId);
}

impl Folder for StudentRecord {
    const POOL: PoolType = PoolType::Student;
    const KIND: &'static str = "student";

    fn location(&self) -> Option<u32> {
        self.location
    }

    fn set_location(&mut self, location: Option<u32>) {
        self.location = location;
    }

    fn documents_mut(&mut self) -> &mut Vec<LinkedDocument> {
        &mut self.documents
    }

    fn table(records: &Records) -> &BTreeMap<RecordId, Self> {
        &records.students
    }

    fn split_mut(records: &mut Records) -> (&mut BTreeMap<RecordId, Self>, &mut RecordId) {
        (&mut records.students, &mut records.last_id)
    }
}

impl Folder for StaffRecord {
    const POOL: PoolType = PoolType::Staff;
    const KIND: &'static str = "staff";

    fn location(&self) -> Option<u32> {
        self.location
    }

    fn set_location(&mut self, location: Option<u32>) {
        self.location = location;
    }

    fn documents_mut(&mut self) -> &mut Vec<LinkedDocument> {
        &mut self.documents
    }

    fn table(records: &Records) -> &BTreeMap<RecordId, Self> {
        &records.staff
    }

    fn split_mut(records: &mut Records) -> (&mut BTreeMap<RecordId, Self>, &mut RecordId) {
        (&mut records.staff, &mut records.last_id)
    }
}

fn sorted_by_slot<F: Folder>(mut folders: Vec<F>, id: impl Fn(&F) -> RecordId) -> Vec<F> {
    folders.sort_by_key(|f| (f.location().is_none(), f.location(), id(f)));
    folders
}

/// Student and staff folders backed by a released-slot ledger.
pub struct RecordStore {
    records: RwLock<Records>,
    allocator: SlotAllocator,
    snapshot_path: Option<PathBuf>,
}

impl RecordStore {
    /// Store that keeps everything in memory.
    pub fn in_memory() -> Self {
        Self::with_ledger(Arc::new(MemoryLedger::new()))
    }

    /// In-memory records over the given ledger.
    pub fn with_ledger(ledger: Arc<dyn ReleasedLedger>) -> Self {
        Self {
            records: RwLock::new(Records::default()),
            allocator: SlotAllocator::new(ledger),
            snapshot_path: None,
        }
    }

    /// Store persisted under `data_dir`: the ledger in [`LEDGER_FILE`] and
    /// the records in [`RECORDS_FILE`].
    pub fn open(data_dir: &Path) -> Result<Self, StoreError> {
        let ledger = FileLedger::open(data_dir.join(LEDGER_FILE))
            .map_err(|e| StoreError::Storage(e.to_string()))?;
        tracing::info!(ledger = %ledger.path().display(), "Opened released-slot ledger");
        Self::with_snapshot(Arc::new(ledger), data_dir.join(RECORDS_FILE))
    }

    /// Records persisted at `snapshot_path` over the given ledger.
    pub fn with_snapshot(
        ledger: Arc<dyn ReleasedLedger>,
        snapshot_path: PathBuf,
    ) -> Result<Self, StoreError> {
        let records = persist::load_json::<Records>(&snapshot_path)?.unwrap_or_default();

        tracing::info!(
            snapshot = %snapshot_path.display(),
            students = records.students.len(),
            staff = records.staff.len(),
            "Opened record store"
        );

        Ok(Self {
            records: RwLock::new(records),
            allocator: SlotAllocator::new(ledger),
            snapshot_path: Some(snapshot_path),
        })
    }

    fn persist(&self, records: &Records) -> Result<(), StoreError> {
        if let Some(path) = &self.snapshot_path {
            persist::store_json(path, records)?;
        }
        Ok(())
    }

    // ----- slots -----

    /// Slot numbers a form may offer for `pool`.
    pub async fn available_slots(&self, pool: PoolType) -> Result<Vec<u32>, StoreError> {
        let records = self.records.read().await;
        let occupancy = records.occupancy(pool);
        Ok(self.allocator.list_available(pool, &occupancy).await?)
    }

    /// Whether `number` would be accepted as a manual pick in `pool`.
    pub async fn validate_slot(&self, pool: PoolType, number: u32) -> Result<bool, StoreError> {
        let records = self.records.read().await;
        let occupancy = records.occupancy(pool);
        Ok(self
            .allocator
            .validate_assignment(number, pool, &occupancy)
            .await?)
    }

    async fn ensure_available(
        &self,
        pool: PoolType,
        number: u32,
        occupancy: &BTreeSet<u32>,
    ) -> Result<(), StoreError> {
        if self
            .allocator
            .validate_assignment(number, pool, occupancy)
            .await?
        {
            return Ok(());
        }
        tracing::info!(pool = %pool, number, "Rejected manual slot pick");
        Err(StoreError::Validation {
            field: "location",
            message: format!(
                "slot {number} is not available; use a released slot or the next in sequence"
            ),
        })
    }

    /// Pick the slot for a new folder: the requested one if it is on offer,
    /// otherwise the allocator's next.
    async fn settle_new_slot(
        &self,
        pool: PoolType,
        requested: Option<u32>,
        occupancy: &BTreeSet<u32>,
    ) -> Result<u32, StoreError> {
        match requested {
            None => Ok(self.allocator.acquire_next(pool, occupancy).await?),
            Some(number) => {
                self.ensure_available(pool, number, occupancy).await?;
                self.allocator.consume(number, pool).await?;
                Ok(number)
            }
        }
    }

    async fn create_folder<F: Folder>(
        &self,
        requested: Option<u32>,
        conflict: impl Fn(&F) -> Option<String>,
        build: impl FnOnce(RecordId, u32) -> F,
    ) -> Result<F, StoreError> {
        let mut records = self.records.write().await;

        if let Some(reason) = F::table(&records).values().find_map(|f| conflict(f)) {
            return Err(StoreError::Conflict(reason));
        }

        let occupancy = records.occupancy(F::POOL);
        let slot = self.settle_new_slot(F::POOL, requested, &occupancy).await?;

        let (table, last_id) = F::split_mut(&mut records);
        let id = next_id(last_id);
        let folder = build(id, slot);
        table.insert(id, folder.clone());

        if let Err(e) = self.persist(&records) {
            let (table, _) = F::split_mut(&mut records);
            table.remove(&id);
            if let Err(release_err) = self.allocator.release(Some(slot), F::POOL).await {
                tracing::error!(pool = %F::POOL, slot, error = %release_err, "Failed to return slot after aborted create");
            }
            return Err(e);
        }

        tracing::info!(kind = F::KIND, id, pool = %F::POOL, slot, "Folder created");
        Ok(folder)
    }

    async fn update_folder<F: Folder>(
        &self,
        id: RecordId,
        new_slot: Option<u32>,
        conflict: impl Fn(&F) -> Option<String>,
        apply: impl FnOnce(&mut F),
    ) -> Result<F, StoreError> {
        let mut records = self.records.write().await;

        let previous = F::table(&records)
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(F::KIND, id))?;
        if let Some(reason) = F::table(&records)
            .iter()
            .filter(|(other, _)| **other != id)
            .find_map(|(_, f)| conflict(f))
        {
            return Err(StoreError::Conflict(reason));
        }

        let old_slot = previous.location();
        let moved = old_slot != new_slot;
        let mut new_from_ledger = false;
        if moved {
            let occupancy = records.occupancy(F::POOL);
            if let Some(number) = new_slot {
                self.ensure_available(F::POOL, number, &occupancy).await?;
                new_from_ledger = self.allocator.consume(number, F::POOL).await?;
            }
            if let Err(e) = self.allocator.release(old_slot, F::POOL).await {
                if new_from_ledger {
                    self.return_slot(F::POOL, new_slot).await;
                }
                return Err(e.into());
            }
        }

        let (table, _) = F::split_mut(&mut records);
        let folder = table.get_mut(&id).ok_or_else(|| not_found(F::KIND, id))?;
        apply(folder);
        folder.set_location(new_slot);
        let updated = folder.clone();

        if let Err(e) = self.persist(&records) {
            let (table, _) = F::split_mut(&mut records);
            table.insert(id, previous);
            if moved {
                self.undo_move(F::POOL, old_slot, new_slot, new_from_ledger)
                    .await;
            }
            return Err(e);
        }

        if moved {
            tracing::info!(kind = F::KIND, id, pool = %F::POOL, from = ?old_slot, to = ?new_slot, "Folder moved");
        }
        Ok(updated)
    }

    /// Put the ledger back the way it was before an aborted move.
    async fn undo_move(
        &self,
        pool: PoolType,
        old_slot: Option<u32>,
        new_slot: Option<u32>,
        new_from_ledger: bool,
    ) {
        if let Some(old) = old_slot
            && let Err(e) = self.allocator.consume(old, pool).await
        {
            tracing::error!(pool = %pool, slot = old, error = %e, "Failed to reclaim slot after aborted update");
        }
        if new_from_ledger {
            self.return_slot(pool, new_slot).await;
        }
    }

    async fn return_slot(&self, pool: PoolType, slot: Option<u32>) {
        if let Err(e) = self.allocator.release(slot, pool).await {
            tracing::error!(pool = %pool, slot = ?slot, error = %e, "Failed to return slot after aborted update");
        }
    }

    async fn delete_folder<F: Folder>(&self, id: RecordId) -> Result<F, StoreError> {
        let mut records = self.records.write().await;

        let folder = F::table(&records)
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found(F::KIND, id))?;

        self.allocator.release(folder.location(), F::POOL).await?;

        let (table, _) = F::split_mut(&mut records);
        table.remove(&id);

        if let Err(e) = self.persist(&records) {
            let (table, _) = F::split_mut(&mut records);
            table.insert(id, folder.clone());
            if let Some(slot) = folder.location()
                && let Err(consume_err) = self.allocator.consume(slot, F::POOL).await
            {
                tracing::error!(pool = %F::POOL, slot, error = %consume_err, "Failed to reclaim slot after aborted delete");
            }
            return Err(e);
        }

        tracing::info!(kind = F::KIND, id, pool = %F::POOL, slot = ?folder.location(), "Folder deleted");
        Ok(folder)
    }

    /// Run `f` against one folder and persist, restoring the folder if the write fails.
    async fn edit_folder<F: Folder, R>(
        &self,
        id: RecordId,
        f: impl FnOnce(&mut F, &mut RecordId) -> Result<R, StoreError>,
    ) -> Result<R, StoreError> {
        let mut records = self.records.write().await;
        let (table, last_id) = F::split_mut(&mut records);
        let folder = table.get_mut(&id).ok_or_else(|| not_found(F::KIND, id))?;
        let previous = folder.clone();
        let previous_id = *last_id;

        let result = f(folder, last_id)?;

        if let Err(e) = self.persist(&records) {
            let (table, last_id) = F::split_mut(&mut records);
            table.insert(id, previous);
            *last_id = previous_id;
            return Err(e);
        }
        Ok(result)
    }

    // ----- students -----

    pub async fn list_students(&self, query: &RecordQuery) -> Vec<StudentRecord> {
        let records = self.records.read().await;
        let hits = records
            .students
            .values()
            .filter(|s| query.matches(&s.name, s.location, s.status))
            .cloned()
            .collect();
        sorted_by_slot(hits, |s| s.id)
    }

    pub async fn student(&self, id: RecordId) -> Result<StudentRecord, StoreError> {
        self.records
            .read()
            .await
            .students
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("student", id))
    }

    pub async fn create_student(&self, draft: StudentDraft) -> Result<StudentRecord, StoreError> {
        draft.validate()?;
        let code = draft.system_code;
        let requested = draft.location;
        self.create_folder(
            requested,
            |s: &StudentRecord| {
                (s.system_code == code).then(|| format!("system code {code} already in use"))
            },
            |id, slot| draft.into_record(id, Some(slot)),
        )
        .await
    }

    /// Replace a student's fields. A `None` location clears the slot.
    pub async fn update_student(
        &self,
        id: RecordId,
        draft: StudentDraft,
    ) -> Result<StudentRecord, StoreError> {
        draft.validate()?;
        let code = draft.system_code;
        let new_slot = draft.location;
        self.update_folder(
            id,
            new_slot,
            |s: &StudentRecord| {
                (s.system_code == code).then(|| format!("system code {code} already in use"))
            },
            |s| draft.apply(s),
        )
        .await
    }

    pub async fn delete_student(&self, id: RecordId) -> Result<StudentRecord, StoreError> {
        self.delete_folder(id).await
    }

    pub async fn add_contact(
        &self,
        student_id: RecordId,
        draft: ContactDraft,
    ) -> Result<Contact, StoreError> {
        draft.validate()?;
        self.edit_folder(student_id, |s: &mut StudentRecord, last_id| {
            let contact = draft.into_contact(next_id(last_id));
            s.contacts.push(contact.clone());
            Ok(contact)
        })
        .await
    }

    pub async fn update_contact(
        &self,
        student_id: RecordId,
        contact_id: RecordId,
        draft: ContactDraft,
    ) -> Result<Contact, StoreError> {
        draft.validate()?;
        self.edit_folder(student_id, |s: &mut StudentRecord, _| {
            let entry = s
                .contacts
                .iter_mut()
                .find(|c| c.id == contact_id)
                .ok_or_else(|| not_found("contact", contact_id))?;
            *entry = draft.into_contact(contact_id);
            Ok(entry.clone())
        })
        .await
    }

    pub async fn delete_contact(
        &self,
        student_id: RecordId,
        contact_id: RecordId,
    ) -> Result<Contact, StoreError> {
        self.edit_folder(student_id, |s: &mut StudentRecord, _| {
            let pos = s
                .contacts
                .iter()
                .position(|c| c.id == contact_id)
                .ok_or_else(|| not_found("contact", contact_id))?;
            Ok(s.contacts.remove(pos))
        })
        .await
    }

    pub async fn add_pendency(
        &self,
        student_id: RecordId,
        draft: PendencyDraft,
    ) -> Result<Pendency, StoreError> {
        draft.validate()?;
        self.edit_folder(student_id, |s: &mut StudentRecord, last_id| {
            let pendency = draft.into_pendency(next_id(last_id));
            s.pendencies.push(pendency.clone());
            Ok(pendency)
        })
        .await
    }

    pub async fn update_pendency(
        &self,
        student_id: RecordId,
        pendency_id: RecordId,
        draft: PendencyDraft,
    ) -> Result<Pendency, StoreError> {
        draft.validate()?;
        self.edit_folder(student_id, |s: &mut StudentRecord, _| {
            let entry = s
                .pendencies
                .iter_mut()
                .find(|p| p.id == pendency_id)
                .ok_or_else(|| not_found("pendency", pendency_id))?;
            *entry = draft.into_pendency(pendency_id);
            Ok(entry.clone())
        })
        .await
    }

    pub async fn delete_pendency(
        &self,
        student_id: RecordId,
        pendency_id: RecordId,
    ) -> Result<Pendency, StoreError> {
        self.edit_folder(student_id, |s: &mut StudentRecord, _| {
            let pos = s
                .pendencies
                .iter()
                .position(|p| p.id == pendency_id)
                .ok_or_else(|| not_found("pendency", pendency_id))?;
            Ok(s.pendencies.remove(pos))
        })
        .await
    }

    pub async fn all_contacts(&self) -> Vec<ContactRow> {
        let records = self.records.read().await;
        records
            .students
            .values()
            .flat_map(|s| {
                s.contacts.iter().map(|c| ContactRow {
                    student_id: s.id,
                    student_name: s.name.clone(),
                    contact: c.clone(),
                })
            })
            .collect()
    }

    pub async fn all_pendencies(&self) -> Vec<PendencyRow> {
        let records = self.records.read().await;
        let mut rows: Vec<PendencyRow> = records
            .students
            .values()
            .flat_map(|s| {
                s.pendencies.iter().map(|p| PendencyRow {
                    student_id: s.id,
                    student_name: s.name.clone(),
                    pendency: p.clone(),
                })
            })
            .collect();
        rows.sort_by_key(|r| (r.pendency.posted_on, r.pendency.id));
        rows
    }

    // ----- staff -----

    pub async fn list_staff(&self, query: &RecordQuery) -> Vec<StaffRecord> {
        let records = self.records.read().await;
        let hits = records
            .staff
            .values()
            .filter(|s| query.matches(&s.name, s.location, s.status))
            .cloned()
            .collect();
        sorted_by_slot(hits, |s| s.id)
    }

    pub async fn staff_member(&self, id: RecordId) -> Result<StaffRecord, StoreError> {
        self.records
            .read()
            .await
            .staff
            .get(&id)
            .cloned()
            .ok_or_else(|| not_found("staff", id))
    }

    pub async fn create_staff(&self, draft: StaffDraft) -> Result<StaffRecord, StoreError> {
        draft.validate()?;
        let cpf = draft.cpf.trim().to_string();
        let requested = draft.location;
        self.create_folder(
            requested,
            |s: &StaffRecord| (s.cpf == cpf).then(|| format!("CPF {cpf} already registered")),
            |id, slot| draft.into_record(id, Some(slot)),
        )
        .await
    }

    /// Replace a staff member's fields. A `None` location clears the slot.
    pub async fn update_staff(
        &self,
        id: RecordId,
        draft: StaffDraft,
    ) -> Result<StaffRecord, StoreError> {
        draft.validate()?;
        let cpf = draft.cpf.trim().to_string();
        let new_slot = draft.location;
        self.update_folder(
            id,
            new_slot,
            |s: &StaffRecord| (s.cpf == cpf).then(|| format!("CPF {cpf} already registered")),
            |s| draft.apply(s),
        )
        .await
    }

    pub async fn delete_staff(&self, id: RecordId) -> Result<StaffRecord, StoreError> {
        self.delete_folder(id).await
    }

    pub async fn add_contract(
        &self,
        staff_id: RecordId,
        draft: ContractDraft,
    ) -> Result<Contract, StoreError> {
        draft.validate()?;
        self.edit_folder(staff_id, |s: &mut StaffRecord, last_id| {
            let contract = draft.into_contract(next_id(last_id));
            s.contracts.push(contract.clone());
            Ok(contract)
        })
        .await
    }

    pub async fn update_contract(
        &self,
        staff_id: RecordId,
        contract_id: RecordId,
        draft: ContractDraft,
    ) -> Result<Contract, StoreError> {
        draft.validate()?;
        self.edit_folder(staff_id, |s: &mut StaffRecord, _| {
            let entry = s
                .contracts
                .iter_mut()
                .find(|c| c.id == contract_id)
                .ok_or_else(|| not_found("contract", contract_id))?;
            *entry = draft.into_contract(contract_id);
            Ok(entry.clone())
        })
        .await
    }

    pub async fn delete_contract(
        &self,
        staff_id: RecordId,
        contract_id: RecordId,
    ) -> Result<Contract, StoreError> {
        self.edit_folder(staff_id, |s: &mut StaffRecord, _| {
            let pos = s
                .contracts
                .iter()
                .position(|c| c.id == contract_id)
                .ok_or_else(|| not_found("contract", contract_id))?;
            Ok(s.contracts.remove(pos))
        })
        .await
    }

    /// Contracts across all staff, most recent first.
    pub async fn all_contracts(&self) -> Vec<ContractRow> {
        let records = self.records.read().await;
        let mut rows: Vec<ContractRow> = records
            .staff
            .values()
            .flat_map(|s| {
                s.contracts.iter().map(|c| ContractRow {
                    staff_id: s.id,
                    staff_name: s.name.clone(),
                    contract: c.clone(),
                })
            })
            .collect();
        rows.sort_by(|a, b| b.contract.starts_on.cmp(&a.contract.starts_on));
        rows
    }

    // ----- shared -----

    pub async fn attach_document(
        &self,
        pool: PoolType,
        folder_id: RecordId,
        draft: DocumentDraft,
    ) -> Result<LinkedDocument, StoreError> {
        draft.validate()?;
        let attach = |docs: &mut Vec<LinkedDocument>, last_id: &mut RecordId| {
            let doc = draft.into_document(next_id(last_id), Utc::now());
            docs.push(doc.clone());
            doc
        };
        match pool {
            PoolType::Student => {
                self.edit_folder(folder_id, |s: &mut StudentRecord, id| {
                    Ok(attach(s.documents_mut(), id))
                })
                .await
            }
            PoolType::Staff => {
                self.edit_folder(folder_id, |s: &mut StaffRecord, id| {
                    Ok(attach(s.documents_mut(), id))
                })
                .await
            }
        }
    }

    pub async fn detach_document(
        &self,
        pool: PoolType,
        folder_id: RecordId,
        document_id: RecordId,
    ) -> Result<LinkedDocument, StoreError> {
        let detach = |docs: &mut Vec<LinkedDocument>| -> Result<LinkedDocument, StoreError> {
            let pos = docs
                .iter()
                .position(|d| d.id == document_id)
                .ok_or_else(|| not_found("document", document_id))?;
            Ok(docs.remove(pos))
        };
        match pool {
            PoolType::Student => {
                self.edit_folder(folder_id, |s: &mut StudentRecord, _| {
                    detach(s.documents_mut())
                })
                .await
            }
            PoolType::Staff => {
                self.edit_folder(folder_id, |s: &mut StaffRecord, _| detach(s.documents_mut()))
                    .await
            }
        }
    }

    /// Folders with linked documents whose holder name matches `name`
    /// (case-insensitive substring; empty matches everyone). Students first.
    pub async fn documents(&self, name: Option<&str>) -> Vec<DocumentHolder> {
        let query = RecordQuery {
            name: name.map(str::to_string),
            ..Default::default()
        };
        let records = self.records.read().await;
        let students = records
            .students
            .values()
            .filter(|s| !s.documents.is_empty() && query.matches(&s.name, s.location, s.status))
            .map(|s| DocumentHolder {
                pool: PoolType::Student,
                id: s.id,
                name: s.name.clone(),
                location: s.location,
                documents: s.documents.clone(),
            });
        let staff = records
            .staff
            .values()
            .filter(|s| !s.documents.is_empty() && query.matches(&s.name, s.location, s.status))
            .map(|s| DocumentHolder {
                pool: PoolType::Staff,
                id: s.id,
                name: s.name.clone(),
                location: s.location,
                documents: s.documents.clone(),
            });
        students.chain(staff).collect()
    }

    pub async fn cover_sheet(&self, pool: PoolType, id: RecordId) -> Result<CoverSheet, StoreError> {
        match pool {
            PoolType::Student => Ok(CoverSheet::for_student(&self.student(id).await?)),
            PoolType::Staff => Ok(CoverSheet::for_staff(&self.staff_member(id).await?)),
        }
    }

    /// Folder count per pool.
    pub async fn counts(&self) -> (usize, usize) {
        let records = self.records.read().await;
        (records.students.len(), records.staff.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slots::LedgerError;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn student(code: u32, name: &str, location: Option<u32>) -> StudentDraft {
        StudentDraft {
            status: FileStatus::Active,
            system_code: code,
            name: name.to_string(),
            cpf: None,
            location,
        }
    }

    fn staff(cpf: &str, name: &str, location: Option<u32>) -> StaffDraft {
        StaffDraft {
            status: FileStatus::Active,
            name: name.to_string(),
            cpf: cpf.to_string(),
            location,
            notes: None,
        }
    }

    #[tokio::test]
    async fn create_assigns_sequential_slots() {
        let store = RecordStore::in_memory();
        let a = store.create_student(student(1, "Ana", None)).await.unwrap();
        let b = store.create_student(student(2, "Bia", None)).await.unwrap();
        assert_eq!(a.location, Some(1));
        assert_eq!(b.location, Some(2));
        assert_eq!(
            store.available_slots(PoolType::Student).await.unwrap(),
            vec![3]
        );
    }

    #[tokio::test]
    async fn delete_releases_and_create_reuses() {
        let store = RecordStore::in_memory();
        let a = store.create_student(student(1, "Ana", None)).await.unwrap();
        store.create_student(student(2, "Bia", None)).await.unwrap();

        store.delete_student(a.id).await.unwrap();
        assert_eq!(
            store.available_slots(PoolType::Student).await.unwrap(),
            vec![1]
        );

        let c = store.create_student(student(3, "Caio", None)).await.unwrap();
        assert_eq!(c.location, Some(1));
        let d = store.create_student(student(4, "Davi", None)).await.unwrap();
        assert_eq!(d.location, Some(3));
    }

    #[tokio::test]
    async fn manual_pick_must_be_on_offer() {
        let store = RecordStore::in_memory();
        store.create_staff(staff("1", "Ana", None)).await.unwrap();

        let err = store
            .create_staff(staff("2", "Bia", Some(5)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { field: "location", .. }));

        let ok = store.create_staff(staff("2", "Bia", Some(2))).await.unwrap();
        assert_eq!(ok.location, Some(2));
    }

    #[tokio::test]
    async fn manual_pick_of_released_slot_consumes_it() {
        let store = RecordStore::in_memory();
        let mut ids = Vec::new();
        for code in 1..=4 {
            ids.push(
                store
                    .create_student(student(code, "Aluno", None))
                    .await
                    .unwrap()
                    .id,
            );
        }
        store.delete_student(ids[1]).await.unwrap();
        store.delete_student(ids[2]).await.unwrap();
        assert_eq!(
            store.available_slots(PoolType::Student).await.unwrap(),
            vec![2, 3]
        );

        // Next sequential is not offered while released slots exist.
        assert!(!store.validate_slot(PoolType::Student, 5).await.unwrap());

        store
            .create_student(student(9, "Manual", Some(3)))
            .await
            .unwrap();
        assert_eq!(
            store.available_slots(PoolType::Student).await.unwrap(),
            vec![2]
        );
    }

    #[tokio::test]
    async fn update_moves_between_slots() {
        let store = RecordStore::in_memory();
        let a = store.create_student(student(1, "Ana", None)).await.unwrap();
        store.create_student(student(2, "Bia", None)).await.unwrap();

        // Move Ana to the next sequential slot; her old one is released.
        let moved = store
            .update_student(a.id, student(1, "Ana", Some(3)))
            .await
            .unwrap();
        assert_eq!(moved.location, Some(3));
        assert_eq!(
            store.available_slots(PoolType::Student).await.unwrap(),
            vec![1]
        );

        // Move back onto the released slot; it is consumed.
        let back = store
            .update_student(a.id, student(1, "Ana", Some(1)))
            .await
            .unwrap();
        assert_eq!(back.location, Some(1));
        assert_eq!(
            store.available_slots(PoolType::Student).await.unwrap(),
            vec![3]
        );
    }

    #[tokio::test]
    async fn update_to_occupied_slot_is_rejected_without_side_effects() {
        let store = RecordStore::in_memory();
        let a = store.create_student(student(1, "Ana", None)).await.unwrap();
        store.create_student(student(2, "Bia", None)).await.unwrap();

        let err = store
            .update_student(a.id, student(1, "Ana", Some(2)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation { .. }));
        assert_eq!(store.student(a.id).await.unwrap().location, Some(1));
        assert_eq!(
            store.available_slots(PoolType::Student).await.unwrap(),
            vec![3]
        );
    }

    #[tokio::test]
    async fn unchanged_slot_needs_no_validation() {
        let store = RecordStore::in_memory();
        let a = store.create_student(student(1, "Ana", None)).await.unwrap();
        let renamed = store
            .update_student(a.id, student(1, "Ana Maria", Some(1)))
            .await
            .unwrap();
        assert_eq!(renamed.name, "Ana Maria");
        assert_eq!(renamed.location, Some(1));
    }

    #[tokio::test]
    async fn clearing_slot_releases_it() {
        let store = RecordStore::in_memory();
        let a = store.create_staff(staff("1", "Ana", None)).await.unwrap();
        store.create_staff(staff("2", "Bia", None)).await.unwrap();

        let cleared = store
            .update_staff(a.id, staff("1", "Ana", None))
            .await
            .unwrap();
        assert_eq!(cleared.location, None);
        assert_eq!(store.available_slots(PoolType::Staff).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn pools_are_independent() {
        let store = RecordStore::in_memory();
        let s = store.create_student(student(1, "Ana", None)).await.unwrap();
        let p = store.create_staff(staff("1", "Ana", None)).await.unwrap();
        assert_eq!(s.location, Some(1));
        assert_eq!(p.location, Some(1));

        store.delete_student(s.id).await.unwrap();
        assert_eq!(
            store.available_slots(PoolType::Student).await.unwrap(),
            vec![1]
        );
        assert_eq!(store.available_slots(PoolType::Staff).await.unwrap(), vec![2]);
    }

    #[tokio::test]
    async fn unique_keys_conflict() {
        let store = RecordStore::in_memory();
        store.create_student(student(10, "Ana", None)).await.unwrap();
        let err = store
            .create_student(student(10, "Bia", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));

        let a = store.create_staff(staff("123", "Ana", None)).await.unwrap();
        let b = store.create_staff(staff("456", "Bia", None)).await.unwrap();
        let err = store
            .update_staff(b.id, staff("123", "Bia", b.location))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
        // Updating a record with its own key is fine.
        store
            .update_staff(a.id, staff("123", "Ana L.", a.location))
            .await
            .unwrap();

        // Rejected creates do not burn slots.
        assert_eq!(
            store.available_slots(PoolType::Student).await.unwrap(),
            vec![2]
        );
    }

    #[tokio::test]
    async fn missing_records_are_not_found() {
        let store = RecordStore::in_memory();
        assert!(matches!(
            store.delete_student(99).await.unwrap_err(),
            StoreError::NotFound { kind: "student", id: 99 }
        ));
        assert!(matches!(
            store.update_staff(5, staff("1", "Ana", None)).await.unwrap_err(),
            StoreError::NotFound { kind: "staff", id: 5 }
        ));
    }

    #[tokio::test]
    async fn child_rows_round_trip() {
        let store = RecordStore::in_memory();
        let s = store.create_student(student(1, "Ana", None)).await.unwrap();

        let contact = store
            .add_contact(
                s.id,
                ContactDraft {
                    phone: "(11) 99999-0000".to_string(),
                    person: "Mãe".to_string(),
                },
            )
            .await
            .unwrap();
        let pendency = store
            .add_pendency(
                s.id,
                PendencyDraft {
                    posted_on: NaiveDate::from_ymd_opt(2024, 1, 15).unwrap(),
                    kind: "Documento".to_string(),
                    description: "RG".to_string(),
                },
            )
            .await
            .unwrap();

        assert_eq!(store.all_contacts().await.len(), 1);
        assert_eq!(store.all_pendencies().await[0].student_name, "Ana");

        let cover = store.cover_sheet(PoolType::Student, s.id).await.unwrap();
        assert_eq!(cover.notes, vec!["- Documento: RG"]);

        store.delete_contact(s.id, contact.id).await.unwrap();
        store.delete_pendency(s.id, pendency.id).await.unwrap();
        assert!(matches!(
            store.delete_pendency(s.id, pendency.id).await.unwrap_err(),
            StoreError::NotFound { kind: "pendency", .. }
        ));
        assert!(store.student(s.id).await.unwrap().contacts.is_empty());
    }

    #[tokio::test]
    async fn contracts_and_documents_follow_staff() {
        let store = RecordStore::in_memory();
        let p = store.create_staff(staff("1", "Ana", None)).await.unwrap();
        store
            .add_contract(
                p.id,
                ContractDraft {
                    registration: 77,
                    role: "Professora".to_string(),
                    starts_on: NaiveDate::from_ymd_opt(2000, 2, 1).unwrap(),
                    ends_on: NaiveDate::from_ymd_opt(2030, 2, 1).unwrap(),
                    kind: crate::records::ContractKind("e".to_string()),
                },
            )
            .await
            .unwrap();
        let doc = store
            .attach_document(
                PoolType::Staff,
                p.id,
                DocumentDraft {
                    file_name: "contrato.pdf".to_string(),
                    file_type: None,
                    description: None,
                },
            )
            .await
            .unwrap();
        assert_eq!(doc.file_type, "PDF");

        let cover = store.cover_sheet(PoolType::Staff, p.id).await.unwrap();
        assert_eq!(cover.fields[2].value, "01/02/2000; EFFECTIVE");

        store.delete_staff(p.id).await.unwrap();
        assert!(store.all_contracts().await.is_empty());
        assert!(
            store
                .detach_document(PoolType::Staff, p.id, doc.id)
                .await
                .is_err()
        );
    }

    #[tokio::test]
    async fn search_filters_and_orders_by_slot() {
        let store = RecordStore::in_memory();
        let a = store.create_student(student(1, "Ana Souza", None)).await.unwrap();
        store.create_student(student(2, "Bruno", None)).await.unwrap();
        store.create_student(student(3, "Mariana", None)).await.unwrap();
        store
            .update_student(a.id, student(1, "Ana Souza", None))
            .await
            .unwrap();

        let hits = store
            .list_students(&RecordQuery {
                name: Some("ANA".to_string()),
                ..Default::default()
            })
            .await;
        let names: Vec<_> = hits.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Mariana", "Ana Souza"]);

        let by_slot = store
            .list_students(&RecordQuery {
                location: Some(2),
                ..Default::default()
            })
            .await;
        assert_eq!(by_slot.len(), 1);
        assert_eq!(by_slot[0].name, "Bruno");
    }

    #[tokio::test]
    async fn concurrent_creates_get_distinct_slots() {
        let store = Arc::new(RecordStore::in_memory());
        let tasks: Vec<_> = (1..=20)
            .map(|code| {
                let store = Arc::clone(&store);
                tokio::spawn(async move { store.create_student(student(code, "Aluno", None)).await })
            })
            .collect();

        let slots: BTreeSet<u32> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap().location.unwrap())
            .collect();
        assert_eq!(slots, (1..=20).collect());
    }

    /// Memory ledger whose writes can be switched off.
    #[derive(Default)]
    struct FlakyLedger {
        inner: MemoryLedger,
        fail_insert: AtomicBool,
        fail_remove: AtomicBool,
    }

    fn ledger_down() -> LedgerError {
        LedgerError::Storage(PersistError::Io {
            path: "released_slots.json".to_string(),
            source: std::io::Error::other("disk unavailable"),
        })
    }

    #[async_trait]
    impl ReleasedLedger for FlakyLedger {
        async fn released(&self, pool: PoolType) -> Result<BTreeSet<u32>, LedgerError> {
            self.inner.released(pool).await
        }

        async fn insert(&self, number: u32, pool: PoolType) -> Result<bool, LedgerError> {
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(ledger_down());
            }
            self.inner.insert(number, pool).await
        }

        async fn remove(&self, number: u32, pool: PoolType) -> Result<bool, LedgerError> {
            if self.fail_remove.load(Ordering::SeqCst) {
                return Err(ledger_down());
            }
            self.inner.remove(number, pool).await
        }

        async fn take_smallest(&self, pool: PoolType) -> Result<Option<u32>, LedgerError> {
            if self.fail_remove.load(Ordering::SeqCst) {
                return Err(ledger_down());
            }
            self.inner.take_smallest(pool).await
        }
    }

    async fn two_students(store: &RecordStore) -> (StudentRecord, StudentRecord) {
        let a = store.create_student(student(1, "Ana", None)).await.unwrap();
        let b = store.create_student(student(2, "Bia", None)).await.unwrap();
        (a, b)
    }

    #[tokio::test]
    async fn failed_consume_leaves_move_undone() {
        let ledger = Arc::new(FlakyLedger::default());
        let store = RecordStore::with_ledger(ledger.clone());
        let (a, _) = two_students(&store).await;

        ledger.fail_remove.store(true, Ordering::SeqCst);
        let err = store
            .update_student(a.id, student(1, "Ana", Some(3)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));

        assert_eq!(store.student(a.id).await.unwrap().location, Some(1));
        assert!(ledger.released(PoolType::Student).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_release_returns_consumed_slot() {
        let ledger = Arc::new(FlakyLedger::default());
        let store = RecordStore::with_ledger(ledger.clone());
        let (a, _) = two_students(&store).await;
        let c = store.create_student(student(3, "Caio", None)).await.unwrap();
        store.delete_student(c.id).await.unwrap();

        // Move Ana onto released slot 3 while releases are failing.
        ledger.fail_insert.store(true, Ordering::SeqCst);
        let err = store
            .update_student(a.id, student(1, "Ana", Some(3)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));
        ledger.fail_insert.store(false, Ordering::SeqCst);

        assert_eq!(store.student(a.id).await.unwrap().location, Some(1));
        assert!(ledger.released(PoolType::Student).await.unwrap().is_empty());
        // Slot 3 is past every assignment, so it is still on offer.
        assert_eq!(store.available_slots(PoolType::Student).await.unwrap(), vec![3]);
    }

    /// Store persisted under `dir/records/` whose snapshot writes can be
    /// broken by turning that directory into a file.
    fn breakable_store(dir: &Path) -> (Arc<MemoryLedger>, RecordStore, PathBuf) {
        let snapshot_dir = dir.join("records");
        let ledger = Arc::new(MemoryLedger::new());
        let store =
            RecordStore::with_snapshot(ledger.clone(), snapshot_dir.join(RECORDS_FILE)).unwrap();
        (ledger, store, snapshot_dir)
    }

    fn break_snapshots(snapshot_dir: &Path) {
        std::fs::remove_dir_all(snapshot_dir).unwrap();
        std::fs::write(snapshot_dir, b"").unwrap();
    }

    #[tokio::test]
    async fn failed_snapshot_on_create_returns_slot() {
        let dir = tempfile::tempdir().unwrap();
        let (_, store, snapshot_dir) = breakable_store(dir.path());
        let (a, _) = two_students(&store).await;
        store.delete_student(a.id).await.unwrap();
        assert_eq!(store.available_slots(PoolType::Student).await.unwrap(), vec![1]);

        break_snapshots(&snapshot_dir);
        let err = store
            .create_student(student(3, "Caio", None))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));

        assert_eq!(store.counts().await, (1, 0));
        assert_eq!(store.available_slots(PoolType::Student).await.unwrap(), vec![1]);
    }

    #[tokio::test]
    async fn failed_snapshot_on_move_restores_slots() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, store, snapshot_dir) = breakable_store(dir.path());
        let (a, _) = two_students(&store).await;

        break_snapshots(&snapshot_dir);
        let err = store
            .update_student(a.id, student(1, "Ana", Some(3)))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));

        assert_eq!(store.student(a.id).await.unwrap().location, Some(1));
        assert!(ledger.released(PoolType::Student).await.unwrap().is_empty());
        assert_eq!(store.available_slots(PoolType::Student).await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn failed_snapshot_on_delete_keeps_slot_assigned() {
        let dir = tempfile::tempdir().unwrap();
        let (ledger, store, snapshot_dir) = breakable_store(dir.path());
        let (a, _) = two_students(&store).await;

        break_snapshots(&snapshot_dir);
        let err = store.delete_student(a.id).await.unwrap_err();
        assert!(matches!(err, StoreError::Storage(_)));

        assert_eq!(store.student(a.id).await.unwrap().location, Some(1));
        assert!(ledger.released(PoolType::Student).await.unwrap().is_empty());
        assert_eq!(store.available_slots(PoolType::Student).await.unwrap(), vec![3]);
    }

    #[tokio::test]
    async fn document_search_spans_both_pools() {
        let store = RecordStore::in_memory();
        let s = store.create_student(student(1, "Ana Souza", None)).await.unwrap();
        store.create_student(student(2, "Mariana", None)).await.unwrap();
        let p = store.create_staff(staff("9", "Joana", None)).await.unwrap();
        let doc = |name: &str| DocumentDraft {
            file_name: name.to_string(),
            file_type: None,
            description: None,
        };
        store
            .attach_document(PoolType::Student, s.id, doc("historico.pdf"))
            .await
            .unwrap();
        store
            .attach_document(PoolType::Staff, p.id, doc("portaria.jpg"))
            .await
            .unwrap();

        let everyone = store.documents(None).await;
        let holders: Vec<_> = everyone.iter().map(|h| (h.pool, h.name.as_str())).collect();
        assert_eq!(
            holders,
            vec![(PoolType::Student, "Ana Souza"), (PoolType::Staff, "Joana")]
        );

        // "ana" also matches Mariana, who has no documents.
        let hits = store.documents(Some("ANA")).await;
        let names: Vec<_> = hits.iter().map(|h| h.name.as_str()).collect();
        assert_eq!(names, vec!["Ana Souza", "Joana"]);
        assert_eq!(hits[0].documents[0].file_type, "PDF");

        assert!(store.documents(Some("Bruno")).await.is_empty());
    }

    #[tokio::test]
    async fn exhausted_pool_is_a_conflict() {
        let err: StoreError = AllocatorError::Exhausted {
            pool: PoolType::Student,
        }
        .into();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn persisted_store_reopens_consistently() {
        let dir = tempfile::tempdir().unwrap();
        {
            let store = RecordStore::open(dir.path()).unwrap();
            let a = store.create_student(student(1, "Ana", None)).await.unwrap();
            store.create_student(student(2, "Bia", None)).await.unwrap();
            store.delete_student(a.id).await.unwrap();
        }

        let store = RecordStore::open(dir.path()).unwrap();
        assert_eq!(store.counts().await, (1, 0));
        assert_eq!(
            store.available_slots(PoolType::Student).await.unwrap(),
            vec![1]
        );
        let c = store.create_student(student(3, "Caio", None)).await.unwrap();
        assert_eq!(c.location, Some(1));
        // Ids keep growing after reopen.
        assert_eq!(c.id, 3);
    }
}
