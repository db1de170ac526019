//! Scanned-document metadata linked to a folder.
//!
//! Only the metadata lives here; file bytes are stored elsewhere.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{FieldError, RecordId, check_len, require_text};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkedDocument {
    pub id: RecordId,
    pub file_name: String,
    /// Upper-cased extension, e.g. `PDF`. Empty when the name has none.
    pub file_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentDraft {
    pub file_name: String,
    #[serde(default)]
    pub file_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl DocumentDraft {
    pub fn validate(&self) -> Result<(), FieldError> {
        require_text("file_name", &self.file_name, 255)?;
        if let Some(file_type) = &self.file_type {
            check_len("file_type", file_type, 50)?;
        }
        Ok(())
    }

    pub(crate) fn into_document(self, id: RecordId, uploaded_at: DateTime<Utc>) -> LinkedDocument {
        let file_name = self.file_name.trim().to_string();
        let file_type = self
            .file_type
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| extension_type(&file_name));
        LinkedDocument {
            id,
            file_name,
            file_type,
            description: self.description.filter(|d| !d.trim().is_empty()),
            uploaded_at,
        }
    }
}

fn extension_type(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => ext.to_uppercase(),
        _ => String::new(),
    }
}
