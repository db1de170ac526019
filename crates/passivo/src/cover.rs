//! Folder cover sheets.
//!
//! A cover sheet is what gets printed and taped to the front of a passive
//! folder: the big slot number, the vertical "PASSIVO" label, a few key facts
//! and the holder's name. Page layout is left to whoever prints it; this
//! module only decides the content.

use serde::Serialize;

use crate::records::{StaffRecord, StudentRecord};
use crate::slots::PoolType;

const MISSING: &str = "N/A";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverField {
    pub label: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CoverSheet {
    pub pool: PoolType,
    /// Slot number as printed, or `N/A` for folders without a slot.
    pub location: String,
    pub heading: &'static str,
    pub fields: Vec<CoverField>,
    pub notes_label: &'static str,
    pub notes: Vec<String>,
    pub name: String,
    /// Suggested file name for the printed sheet.
    pub file_name: String,
}

fn or_missing(value: Option<impl ToString>) -> String {
    value
        .map(|v| v.to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| MISSING.to_string())
}

impl CoverSheet {
    pub fn for_student(student: &StudentRecord) -> Self {
        let notes = if student.pendencies.is_empty() {
            vec!["No pendencies.".to_string()]
        } else {
            student
                .pendencies
                .iter()
                .map(|p| format!("- {}: {}", p.kind, p.description))
                .collect()
        };

        Self {
            pool: PoolType::Student,
            location: or_missing(student.location),
            heading: "PASSIVO",
            fields: vec![
                CoverField {
                    label: "SYSTEM CODE",
                    value: student.system_code.to_string(),
                },
                CoverField {
                    label: "CPF",
                    value: or_missing(student.cpf.as_deref()),
                },
            ],
            notes_label: "PENDENCIES",
            notes,
            name: student.name.clone(),
            file_name: format!("cover_student_{}.txt", student.id),
        }
    }

    pub fn for_staff(staff: &StaffRecord) -> Self {
        let mut fields = vec![CoverField {
            label: "CPF",
            value: or_missing(Some(staff.cpf.as_str())),
        }];

        if let Some(contract) = staff.latest_contract() {
            fields.push(CoverField {
                label: "ROLE",
                value: contract.role.clone(),
            });
            fields.push(CoverField {
                label: "ADMISSION",
                value: format!(
                    "{}; {}",
                    contract.starts_on.format("%d/%m/%Y"),
                    contract.kind.label()
                ),
            });
        }

        let notes = match staff.notes.as_deref().map(str::trim) {
            Some(n) if !n.is_empty() => n.lines().map(str::to_string).collect(),
            _ => vec!["No notes.".to_string()],
        };

        Self {
            pool: PoolType::Staff,
            location: or_missing(staff.location),
            heading: "PASSIVO",
            fields,
            notes_label: "NOTES",
            notes,
            name: staff.name.clone(),
            file_name: format!("cover_staff_{}.txt", staff.id),
        }
    }

    /// Plain-text page, one block per section.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        out.push_str(&self.location);
        out.push('\n');
        out.push_str(self.heading);
        out.push_str("\n\n");
        for field in &self.fields {
            out.push_str(field.label);
            out.push('\n');
            out.push_str(&field.value);
            out.push_str("\n\n");
        }
        out.push_str(self.notes_label);
        out.push_str(":\n");
        for note in &self.notes {
            out.push_str(note);
            out.push('\n');
        }
        out.push('\n');
        out.push_str(&self.name.to_uppercase());
        out.push('\n');
        out
    }
}
