//! Audit Bots - field-mapping resolution and rule execution for audit workbooks
//!
//! Auditors hand over spreadsheets whose sheets and columns are named however
//! the source system named them. This library resolves those names onto a
//! typed canonical schema, builds canonical tables from the workbooks and
//! runs a catalogue of independent exception-detection rules ("bots") over
//! them.
//!
//! # Features
//!
//! - Workbook introspection with a content-hash cache (calamine)
//! - Sheet and field mapping with auto-matching and a no-double-claim rule
//! - Canonical tables with declared column kinds and null back-fill
//! - Banking and enterprise (P2P, O2C, H2R) rule catalogues
//! - Per-rule failure isolation and category rollups
//! - Excel report export (rust_xlsxwriter)
//!
//! # Example
//!
//! ```no_run
//! use audit_bots::core::{Session, Suite};
//! use audit_bots::excel::WorkbookHandle;
//!
//! let mut session = Session::new(Suite::Banking);
//! session.upload("Banking", WorkbookHandle::from_path("dump.xlsx")?)?;
//! session.prepare_all()?;
//!
//! let report = session.run_all();
//! for outcome in report.outcomes() {
//!     println!("{}: {} ({} issues)", outcome.code, outcome.status, outcome.issues());
//! }
//! # Ok::<(), audit_bots::error::AuditError>(())
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod excel;
pub mod mapping;
pub mod types;

// Re-export commonly used types
pub use error::{AuditError, AuditResult};
pub use types::{Column, Table, Value};
