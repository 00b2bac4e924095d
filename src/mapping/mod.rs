//! Sheet and field mapping: schema declarations, slot resolution, readiness

pub mod resolver;
pub mod schema;

pub use resolver::{auto_match, FieldMapping, NameMatch, SheetMapping, SlotMapping};
pub use schema::{
    canon, tables, CategorySchema, ConditionalField, FieldKind, FieldSpec, LogicalSlot,
    OptionalField, Schema, SheetSchema, TableKey, TableRef, MASTER_SOURCE,
};

use serde::Serialize;
use thiserror::Error;

/// File extensions the workbook reader accepts
pub const SUPPORTED_EXTENSIONS: &[&str] = &["xlsx", "xlsm", "xlsb", "xls", "ods"];

/// Whether a declared upload name looks like a supported workbook.
/// An empty name carries no format claim and is accepted.
pub fn is_supported_workbook_name(name: &str) -> bool {
    if name.trim().is_empty() {
        return true;
    }
    let lowered = name.trim().to_lowercase();
    SUPPORTED_EXTENSIONS
        .iter()
        .any(|ext| lowered.ends_with(&format!(".{ext}")))
}

/// Why a scope cannot advance yet
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
pub enum Blocker {
    #[error("No workbook uploaded")]
    MissingWorkbook,

    #[error("'{0}' is not a supported spreadsheet (.xlsx, .xls, .xlsm, .xlsb, .ods)")]
    UnsupportedFormat(String),

    #[error("Workbook could not be read")]
    Unreadable,

    #[error("Workbook has fewer sheets than required ({found} found, {required} required)")]
    InsufficientSheets { found: usize, required: usize },

    #[error("Sheet '{0}' is not mapped")]
    SheetNotMapped(String),

    #[error("No columns found in sheet '{0}'")]
    NoColumns(String),

    #[error("Unmapped: {}", .0.join(", "))]
    Unresolved(Vec<String>),
}

/// Readiness of one mapping scope
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum Readiness {
    Ready,
    Blocked(Blocker),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready)
    }

    pub fn blocker(&self) -> Option<&Blocker> {
        match self {
            Readiness::Ready => None,
            Readiness::Blocked(b) => Some(b),
        }
    }
}

impl From<Blocker> for Readiness {
    fn from(blocker: Blocker) -> Self {
        Readiness::Blocked(blocker)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_workbook_names() {
        assert!(is_supported_workbook_name("loans.xlsx"));
        assert!(is_supported_workbook_name("LOANS.XLS"));
        assert!(is_supported_workbook_name(""));
        assert!(!is_supported_workbook_name("loans.csv"));
        assert!(!is_supported_workbook_name("report.pdf"));
    }

    #[test]
    fn test_blocker_messages() {
        let b = Blocker::InsufficientSheets { found: 1, required: 3 };
        assert!(b.to_string().starts_with("Workbook has fewer sheets than required"));
        let u = Blocker::Unresolved(vec!["PIN CODE".into(), "ASSET".into()]);
        assert_eq!(u.to_string(), "Unmapped: PIN CODE, ASSET");
        assert!(!Readiness::from(u).is_ready());
    }
}
