//! Workbook introspection: sheet names, header columns, raw sheet reads
//!
//! Every read opens a fresh cursor over the shared bytes, so a handle can be
//! queried any number of times. Results of `list_sheets` and `list_columns`
//! are cached by the SHA-256 digest of the bytes.

use crate::error::{AuditError, AuditResult};
use crate::types::{format_date, format_number, Column, Table, Value};
use calamine::{open_workbook_auto_from_rs, Data, Range, Reader};
use chrono::{NaiveDate, NaiveDateTime};
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Re-readable workbook bytes plus the name they were uploaded under
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkbookHandle {
    name: String,
    bytes: Arc<[u8]>,
    digest: String,
}

impl WorkbookHandle {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let digest = sha256_hex(&bytes);
        Self {
            name: name.into(),
            bytes: Arc::from(bytes),
            digest,
        }
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> AuditResult<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok(Self::new(name, bytes))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Hex SHA-256 of the bytes
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Cached, read-only query surface over workbook handles
#[derive(Debug, Default)]
pub struct Introspector {
    sheets: HashMap<String, Vec<String>>,
    columns: HashMap<(String, String, u32), Vec<String>>,
}

impl Introspector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Worksheet names in workbook order; empty when the bytes are unreadable
    pub fn list_sheets(&mut self, handle: &WorkbookHandle) -> Vec<String> {
        if let Some(hit) = self.sheets.get(handle.digest()) {
            debug!(workbook = handle.name(), "sheet list cache hit");
            return hit.clone();
        }

        let names = match sheet_names(handle.bytes()) {
            Ok(names) => names,
            Err(e) => {
                warn!(workbook = handle.name(), error = %e, "could not list sheets");
                Vec::new()
            }
        };
        self.sheets.insert(handle.digest().to_string(), names.clone());
        names
    }

    /// Header names of `sheet` at the zero-based `header_row`; empty when the
    /// workbook or sheet cannot be read
    pub fn list_columns(&mut self, handle: &WorkbookHandle, sheet: &str, header_row: u32) -> Vec<String> {
        let key = (handle.digest().to_string(), sheet.to_string(), header_row);
        if let Some(hit) = self.columns.get(&key) {
            debug!(workbook = handle.name(), sheet, "column list cache hit");
            return hit.clone();
        }

        let columns = match read_range(handle.bytes(), sheet) {
            Ok(range) => header_names(&range, header_row),
            Err(e) => {
                warn!(workbook = handle.name(), sheet, error = %e, "could not list columns");
                Vec::new()
            }
        };
        self.columns.insert(key, columns.clone());
        columns
    }

    /// Drop cached entries (e.g. after a re-upload)
    pub fn clear(&mut self) {
        self.sheets.clear();
        self.columns.clear();
    }

    /// Read `sheet` into a raw table: header at `header_row`, data below it
    pub fn read_sheet(&self, handle: &WorkbookHandle, sheet: &str, header_row: u32) -> AuditResult<Table> {
        let range = read_range(handle.bytes(), sheet)?;
        let table = range_to_table(&range, sheet, header_row);
        debug!(
            workbook = handle.name(),
            sheet,
            rows = table.row_count(),
            columns = table.columns.len(),
            "sheet read"
        );
        Ok(table)
    }
}

/// Uncached sheet listing
pub fn sheet_names(bytes: &[u8]) -> AuditResult<Vec<String>> {
    let workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| AuditError::Workbook(format!("Failed to open workbook: {e}")))?;
    Ok(workbook.sheet_names())
}

fn read_range(bytes: &[u8], sheet: &str) -> AuditResult<Range<Data>> {
    let mut workbook = open_workbook_auto_from_rs(Cursor::new(bytes))
        .map_err(|e| AuditError::Workbook(format!("Failed to open workbook: {e}")))?;
    workbook
        .worksheet_range(sheet)
        .map_err(|e| AuditError::Workbook(format!("Failed to read sheet '{sheet}': {e}")))
}

//==============================================================================
// Range -> Table
//==============================================================================

/// Header names at absolute worksheet row `header_row`. Blank headers become
/// `Unnamed: <i>`; repeats get `.1`, `.2`, ... suffixes.
fn header_names(range: &Range<Data>, header_row: u32) -> Vec<String> {
    let (Some((_, start_col)), Some((_, end_col))) = (range.start(), range.end()) else {
        return Vec::new();
    };

    let mut seen = HashSet::new();
    (start_col..=end_col)
        .enumerate()
        .map(|(i, col)| {
            let raw = range
                .get_value((header_row, col))
                .and_then(header_text)
                .unwrap_or_else(|| format!("Unnamed: {i}"));
            dedupe(raw, &mut seen)
        })
        .collect()
}

fn header_text(cell: &Data) -> Option<String> {
    let text = match cell {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => format_number(*f),
        Data::Bool(b) => if *b { "True".into() } else { "False".into() },
        Data::DateTime(dt) => dt.as_datetime().map(|d| format_date(&d))?,
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        Data::Error(_) | Data::Empty => return None,
    };
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

fn dedupe(name: String, seen: &mut HashSet<String>) -> String {
    if seen.insert(name.clone()) {
        return name;
    }
    let mut n = 1;
    loop {
        let candidate = format!("{name}.{n}");
        if seen.insert(candidate.clone()) {
            return candidate;
        }
        n += 1;
    }
}

fn range_to_table(range: &Range<Data>, sheet: &str, header_row: u32) -> Table {
    let names = header_names(range, header_row);
    let mut table = Table::new(sheet);
    let (Some((_, start_col)), Some((end_row, _))) = (range.start(), range.end()) else {
        return table;
    };

    let mut columns: Vec<Vec<Value>> = vec![Vec::new(); names.len()];
    for row in header_row.saturating_add(1)..=end_row {
        let cells: Vec<Value> = (0..names.len())
            .map(|i| {
                range
                    .get_value((row, start_col + i as u32))
                    .map_or(Value::Null, raw_value)
            })
            .collect();
        if cells.iter().all(Value::is_null) {
            continue;
        }
        for (column, cell) in columns.iter_mut().zip(cells) {
            column.push(cell);
        }
    }

    for (name, values) in names.into_iter().zip(columns) {
        table.columns.push(Column::new(name, values));
    }
    table
}

/// Workbook cell -> untyped value; canonical coercion happens in the builder
pub fn raw_value(cell: &Data) -> Value {
    match cell {
        Data::Int(i) => Value::Number(*i as f64),
        Data::Float(f) => Value::Number(*f),
        Data::String(s) if s.is_empty() => Value::Null,
        Data::String(s) => Value::Text(s.clone()),
        Data::Bool(b) => Value::Bool(*b),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(d) => Value::Date(d),
            None => Value::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) => parse_iso(s).map_or_else(|| Value::Text(s.clone()), Value::Date),
        Data::DurationIso(s) => Value::Text(s.clone()),
        Data::Error(_) | Data::Empty => Value::Null,
    }
}

fn parse_iso(s: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .or_else(|| NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S").ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
}
