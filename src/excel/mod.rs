//! Excel input and output
//!
//! - Introspection: sheet names, header columns and raw sheet reads (calamine)
//! - Export: run report workbook (rust_xlsxwriter)

mod exporter;
mod introspector;

pub use exporter::{unique_sheet_name, ReportExporter, MAX_SHEET_NAME};
pub use introspector::{raw_value, sheet_names, Introspector, WorkbookHandle};
