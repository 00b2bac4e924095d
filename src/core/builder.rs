//! Canonical table builder
//!
//! Reads the physical sheet chosen for a logical sheet, renames mapped
//! columns to their canonical names, coerces every canonical column to its
//! declared kind and back-fills the ones nothing was mapped to. Rules can
//! therefore assume the full canonical schema is present.

use crate::excel::{Introspector, WorkbookHandle};
use crate::mapping::{CategorySchema, FieldKind, FieldMapping, NameMatch, SheetMapping, SheetSchema};
use crate::types::{format_date, format_number, parse_number, Column, Table, Value};
use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Build the canonical table for `sheet` of `category`.
///
/// Returns `None` when no workbook is supplied, the sheet is not mapped, the
/// field mapping is absent or not ready, or the sheet cannot be read.
pub fn build_table(
    introspector: &Introspector,
    category: &CategorySchema,
    sheet: &SheetSchema,
    sheet_mapping: &SheetMapping,
    field_mapping: Option<&FieldMapping>,
    workbook: Option<&WorkbookHandle>,
) -> Option<Table> {
    let workbook = workbook?;
    let physical = sheet_mapping.get(&sheet.name)?;
    let fields = field_mapping.filter(|m| m.is_ready())?;

    let raw = match introspector.read_sheet(workbook, physical, category.header_row) {
        Ok(table) => table,
        Err(e) => {
            warn!(category = %category.key, sheet = %sheet.name, error = %e, "could not read mapped sheet");
            return None;
        }
    };

    let mut table = canonicalize(raw, sheet, fields);
    table.name = sheet.name.clone();
    info!(
        category = %category.key,
        sheet = %sheet.name,
        physical,
        rows = table.row_count(),
        columns = table.columns.len(),
        "canonical table built"
    );
    Some(table)
}

/// Rename, coerce and back-fill an already-read table
pub fn canonicalize(raw: Table, sheet: &SheetSchema, fields: &FieldMapping) -> Table {
    let bound: Vec<(&str, &str)> = fields
        .pairs()
        .filter(|(_, column)| !column.is_empty())
        .filter_map(|(required, column)| {
            sheet
                .field(required)
                .map(|spec| (column, spec.canonical.as_str()))
        })
        .collect();
    // physical column -> canonical name; relies on the field mapping binding
    // each physical column to at most one field
    let renames: HashMap<&str, &str> = bound.iter().copied().collect();
    debug_assert_eq!(renames.len(), bound.len(), "physical column bound to several fields");
    let targeted: HashSet<&str> = renames.values().copied().collect();

    let row_count = raw.row_count();
    let mut table = Table::new(raw.name);
    for column in raw.columns {
        match renames.get(column.name.as_str()) {
            Some(canonical) => table.columns.push(Column::new(*canonical, column.values)),
            // An unmapped column must not shadow a canonical name
            None if targeted.contains(column.name.as_str()) => {
                debug!(column = %column.name, "dropping unmapped column that collides with a canonical name");
            }
            None => table.columns.push(column),
        }
    }

    // Optional columns are picked up by normalised name when unambiguous
    for extra in &sheet.optional {
        if table.column(&extra.canonical).is_some() {
            continue;
        }
        let wanted = NameMatch::Field.normalize(&extra.canonical);
        let matches: Vec<usize> = table
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| !targeted.contains(c.name.as_str()) && NameMatch::Field.normalize(&c.name) == wanted)
            .map(|(i, _)| i)
            .collect();
        if let [index] = matches[..] {
            debug!(column = %table.columns[index].name, canonical = %extra.canonical, "optional column matched");
            table.columns[index].name = extra.canonical.clone();
        }
    }

    for (canonical, kind) in sheet.canonical_columns() {
        match table.column_mut(canonical) {
            Some(column) => {
                for value in &mut column.values {
                    *value = coerce(value, kind);
                }
            }
            None => table.columns.push(Column::nulls(canonical, row_count)),
        }
    }
    table
}

//==============================================================================
// Coercion
//==============================================================================

/// Coerce a raw cell to `kind`, or null when it cannot be represented
pub fn coerce(value: &Value, kind: FieldKind) -> Value {
    match kind {
        FieldKind::Number => match value {
            Value::Number(n) if n.is_finite() => Value::Number(*n),
            Value::Text(s) => parse_number(s).map_or(Value::Null, Value::Number),
            Value::Bool(b) => Value::Number(if *b { 1.0 } else { 0.0 }),
            _ => Value::Null,
        },
        FieldKind::Date => match value {
            Value::Date(d) => Value::Date(*d),
            Value::Number(n) => excel_serial(*n).map_or(Value::Null, Value::Date),
            Value::Text(s) => parse_date_text(s).map_or(Value::Null, Value::Date),
            _ => Value::Null,
        },
        FieldKind::Text => {
            let text = match value {
                Value::Null => return Value::Null,
                Value::Text(s) => s.trim().to_string(),
                Value::Number(n) => format_number(*n),
                Value::Bool(_) => value.to_string(),
                Value::Date(d) => format_date(d),
            };
            if text.is_empty() {
                Value::Null
            } else {
                Value::Text(text)
            }
        }
    }
}

/// Excel serial day number (1900 date system) -> datetime
pub fn excel_serial(serial: f64) -> Option<NaiveDateTime> {
    if !serial.is_finite() || serial <= 0.0 || serial >= 2_958_466.0 {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_time(NaiveTime::MIN);
    let days = serial.trunc() as i64;
    let seconds = ((serial - serial.trunc()) * 86_400.0).round() as i64;
    Some(epoch + Duration::days(days) + Duration::seconds(seconds))
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%d-%m-%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
];

const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%d-%m-%Y",
    "%d/%m/%Y",
    "%d.%m.%Y",
    "%d-%b-%Y",
    "%d %b %Y",
    "%d %B %Y",
    "%d-%b-%y",
];

/// Parse a date written as text: ISO forms first, then day-first forms
pub fn parse_date_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(text, fmt).ok())
        .or_else(|| {
            DATE_FORMATS
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(text, fmt).ok())
                .map(|d| d.and_time(NaiveTime::MIN))
        })
}
