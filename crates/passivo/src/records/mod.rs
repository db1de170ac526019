//! Archive records: students and staff, plus the rows hanging off them.

mod document;
mod staff;
mod student;

use serde::{Deserialize, Serialize};

pub use document::{DocumentDraft, LinkedDocument};
pub use staff::{Contract, ContractDraft, ContractKind, StaffDraft, StaffRecord};
pub use student::{Contact, ContactDraft, Pendency, PendencyDraft, StudentDraft, StudentRecord};

pub type RecordId = u32;

/// Whether a folder is still in the active archive or moved to permanent storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileStatus {
    #[default]
    Active,
    Permanent,
}

/// A rejected input field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

pub(crate) fn require_text(field: &'static str, value: &str, max: usize) -> Result<(), FieldError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(FieldError::new(field, "must not be empty"));
    }
    check_len(field, trimmed, max)
}

pub(crate) fn check_len(field: &'static str, value: &str, max: usize) -> Result<(), FieldError> {
    if value.chars().count() > max {
        return Err(FieldError::new(
            field,
            format!("must be at most {max} characters"),
        ));
    }
    Ok(())
}
