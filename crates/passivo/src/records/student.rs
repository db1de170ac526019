//! Student folders, their contacts and pending issues.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{FieldError, FileStatus, LinkedDocument, RecordId, check_len, require_text};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentRecord {
    pub id: RecordId,
    pub status: FileStatus,
    /// Person code in the school management system. Unique among students.
    pub system_code: u32,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cpf: Option<String>,
    /// Passive-file slot in the student pool.
    pub location: Option<u32>,
    #[serde(default)]
    pub contacts: Vec<Contact>,
    #[serde(default)]
    pub pendencies: Vec<Pendency>,
    #[serde(default)]
    pub documents: Vec<LinkedDocument>,
}

/// Editable student fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StudentDraft {
    #[serde(default)]
    pub status: FileStatus,
    pub system_code: u32,
    pub name: String,
    #[serde(default)]
    pub cpf: Option<String>,
    /// Manual slot pick. `None` on create means "assign the next one".
    #[serde(default)]
    pub location: Option<u32>,
}

impl StudentDraft {
    pub fn validate(&self) -> Result<(), FieldError> {
        require_text("name", &self.name, 100)?;
        if let Some(cpf) = &self.cpf {
            check_len("cpf", cpf, 14)?;
        }
        if self.location == Some(0) {
            return Err(FieldError::new("location", "slot numbers start at 1"));
        }
        Ok(())
    }

    pub(crate) fn into_record(self, id: RecordId, location: Option<u32>) -> StudentRecord {
        StudentRecord {
            id,
            status: self.status,
            system_code: self.system_code,
            name: self.name.trim().to_string(),
            cpf: normalize(self.cpf),
            location,
            contacts: Vec::new(),
            pendencies: Vec::new(),
            documents: Vec::new(),
        }
    }

    /// Copy everything but the slot, which the store settles with the allocator.
    pub(crate) fn apply(self, record: &mut StudentRecord) {
        record.status = self.status;
        record.system_code = self.system_code;
        record.name = self.name.trim().to_string();
        record.cpf = normalize(self.cpf);
    }
}

fn normalize(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contact {
    pub id: RecordId,
    pub phone: String,
    pub person: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDraft {
    pub phone: String,
    pub person: String,
}

impl ContactDraft {
    pub fn validate(&self) -> Result<(), FieldError> {
        require_text("phone", &self.phone, 20)?;
        require_text("person", &self.person, 100)
    }

    pub(crate) fn into_contact(self, id: RecordId) -> Contact {
        Contact {
            id,
            phone: self.phone.trim().to_string(),
            person: self.person.trim().to_string(),
        }
    }
}

/// Something missing from a student's folder (a document, a signature, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pendency {
    pub id: RecordId,
    pub posted_on: NaiveDate,
    pub kind: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendencyDraft {
    pub posted_on: NaiveDate,
    pub kind: String,
    pub description: String,
}

impl PendencyDraft {
    pub fn validate(&self) -> Result<(), FieldError> {
        require_text("kind", &self.kind, 50)?;
        require_text("description", &self.description, 200)
    }

    pub(crate) fn into_pendency(self, id: RecordId) -> Pendency {
        Pendency {
            id,
            posted_on: self.posted_on,
            kind: self.kind.trim().to_string(),
            description: self.description.trim().to_string(),
        }
    }
}
