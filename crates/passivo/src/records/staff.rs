//! Staff folders and their employment contracts.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::{FieldError, FileStatus, LinkedDocument, RecordId, require_text};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaffRecord {
    pub id: RecordId,
    pub status: FileStatus,
    pub name: String,
    /// Unique among staff.
    pub cpf: String,
    /// Passive-file slot in the staff pool.
    pub location: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default)]
    pub contracts: Vec<Contract>,
    #[serde(default)]
    pub documents: Vec<LinkedDocument>,
}

impl StaffRecord {
    /// Contract with the latest start date.
    pub fn latest_contract(&self) -> Option<&Contract> {
        self.contracts.iter().max_by_key(|c| (c.starts_on, c.id))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaffDraft {
    #[serde(default)]
    pub status: FileStatus,
    pub name: String,
    pub cpf: String,
    #[serde(default)]
    pub location: Option<u32>,
    #[serde(default)]
    pub notes: Option<String>,
}

impl StaffDraft {
    pub fn validate(&self) -> Result<(), FieldError> {
        require_text("name", &self.name, 100)?;
        require_text("cpf", &self.cpf, 14)?;
        if self.location == Some(0) {
            return Err(FieldError::new("location", "slot numbers start at 1"));
        }
        Ok(())
    }

    pub(crate) fn into_record(self, id: RecordId, location: Option<u32>) -> StaffRecord {
        StaffRecord {
            id,
            status: self.status,
            name: self.name.trim().to_string(),
            cpf: self.cpf.trim().to_string(),
            location,
            notes: self.notes.filter(|n| !n.trim().is_empty()),
            contracts: Vec::new(),
            documents: Vec::new(),
        }
    }

    pub(crate) fn apply(self, record: &mut StaffRecord) {
        record.status = self.status;
        record.name = self.name.trim().to_string();
        record.cpf = self.cpf.trim().to_string();
        record.notes = self.notes.filter(|n| !n.trim().is_empty());
    }
}

/// Contract type code as recorded on the contract sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractKind(pub String);

impl ContractKind {
    /// Cover-sheet wording for the code: `E` effective, `T` temporary,
    /// anything else upper-cased as-is.
    pub fn label(&self) -> String {
        let code = self.0.trim().to_uppercase();
        match code.as_str() {
            "E" => "EFFECTIVE".to_string(),
            "T" => "TEMPORARY".to_string(),
            _ => code,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contract {
    pub id: RecordId,
    /// Employee registration number.
    pub registration: u32,
    pub role: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub kind: ContractKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractDraft {
    pub registration: u32,
    pub role: String,
    pub starts_on: NaiveDate,
    pub ends_on: NaiveDate,
    pub kind: ContractKind,
}

impl ContractDraft {
    pub fn validate(&self) -> Result<(), FieldError> {
        require_text("role", &self.role, 50)?;
        require_text("kind", &self.kind.0, 1)?;
        if self.ends_on < self.starts_on {
            return Err(FieldError::new("ends_on", "must not be before starts_on"));
        }
        Ok(())
    }

    pub(crate) fn into_contract(self, id: RecordId) -> Contract {
        Contract {
            id,
            registration: self.registration,
            role: self.role.trim().to_string(),
            starts_on: self.starts_on,
            ends_on: self.ends_on,
            kind: ContractKind(self.kind.0.trim().to_uppercase()),
        }
    }
}
