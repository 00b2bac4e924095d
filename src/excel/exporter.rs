//! Report exporter: run results -> .xlsx
//!
//! One summary sheet, then one sheet per executed rule. Rule sheets carry a
//! "Total Records" banner in the first row and the exception table from the
//! third row down. Only plain values are written.

use crate::core::{Registry, RunReport, RunStatus};
use crate::error::{AuditError, AuditResult};
use crate::types::{format_date, Table, Value};
use rust_xlsxwriter::{Format, Workbook, Worksheet};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

/// Excel caps worksheet names at 31 characters
pub const MAX_SHEET_NAME: usize = 31;

const SUMMARY_SHEET: &str = "Summary";

/// Row the rule table header is written to, below the banner
const TABLE_HEADER_ROW: u32 = 2;

pub struct ReportExporter {
    summary: Table,
    sheets: Vec<(String, Table)>,
}

impl ReportExporter {
    /// Collect the summary and every rule that produced a result table
    pub fn new(report: &RunReport, registry: &Registry) -> Self {
        let sheets = report
            .outcomes()
            .iter()
            .filter(|o| o.status == RunStatus::Complete)
            .filter_map(|o| o.result.as_ref().map(|t| (o.title.clone(), t.clone())))
            .collect();
        Self {
            summary: report.summary_table(registry),
            sheets,
        }
    }

    pub fn sheet_count(&self) -> usize {
        self.sheets.len() + 1
    }

    /// Export to an .xlsx file
    pub fn export(&self, output_path: &Path) -> AuditResult<()> {
        let mut workbook = self.build()?;
        workbook
            .save(output_path)
            .map_err(|e| AuditError::Export(format!("Failed to save report: {}", e)))?;
        info!(path = %output_path.display(), sheets = self.sheet_count(), "report written");
        Ok(())
    }

    /// Export to an in-memory .xlsx
    pub fn to_buffer(&self) -> AuditResult<Vec<u8>> {
        let mut workbook = self.build()?;
        workbook
            .save_to_buffer()
            .map_err(|e| AuditError::Export(format!("Failed to serialise report: {}", e)))
    }

    fn build(&self) -> AuditResult<Workbook> {
        let mut workbook = Workbook::new();
        let bold = Format::new().set_bold();
        let mut used = HashSet::new();

        let name = unique_sheet_name(SUMMARY_SHEET, &mut used);
        let worksheet = add_named(&mut workbook, &name)?;
        write_table(worksheet, &self.summary, 0, &bold)?;

        for (title, table) in &self.sheets {
            let name = unique_sheet_name(title, &mut used);
            let worksheet = add_named(&mut workbook, &name)?;
            worksheet
                .write_string_with_format(0, 0, format!("Total Records: {}", table.row_count()), &bold)
                .map_err(export_err)?;
            write_table(worksheet, table, TABLE_HEADER_ROW, &bold)?;
        }

        Ok(workbook)
    }
}

fn add_named<'a>(workbook: &'a mut Workbook, name: &str) -> AuditResult<&'a mut Worksheet> {
    let worksheet = workbook.add_worksheet();
    worksheet
        .set_name(name)
        .map_err(|e| AuditError::Export(format!("Failed to set worksheet name '{}': {}", name, e)))?;
    Ok(worksheet)
}

fn write_table(worksheet: &mut Worksheet, table: &Table, header_row: u32, bold: &Format) -> AuditResult<()> {
    for (col_idx, column) in table.columns.iter().enumerate() {
        let col = col_index(col_idx)?;
        worksheet
            .write_string_with_format(header_row, col, &column.name, bold)
            .map_err(export_err)?;

        for (row_idx, value) in column.values.iter().enumerate() {
            let row = header_row + 1 + row_idx as u32;
            match value {
                Value::Null => {}
                Value::Number(n) => {
                    worksheet.write_number(row, col, *n).map_err(export_err)?;
                }
                Value::Text(s) => {
                    worksheet.write_string(row, col, s).map_err(export_err)?;
                }
                Value::Bool(b) => {
                    worksheet.write_boolean(row, col, *b).map_err(export_err)?;
                }
                Value::Date(d) => {
                    worksheet.write_string(row, col, format_date(d)).map_err(export_err)?;
                }
            }
        }
    }
    Ok(())
}

fn col_index(idx: usize) -> AuditResult<u16> {
    u16::try_from(idx).map_err(|_| AuditError::Export(format!("Too many columns ({})", idx + 1)))
}

fn export_err(e: rust_xlsxwriter::XlsxError) -> AuditError {
    AuditError::Export(e.to_string())
}

/// Strip characters Excel rejects, truncate to 31 characters and make the
/// name unique (case-insensitively) among those already used
pub fn unique_sheet_name(title: &str, used: &mut HashSet<String>) -> String {
    let cleaned: String = title
        .chars()
        .map(|c| if "[]:*?/\\".contains(c) { '_' } else { c })
        .collect();
    let cleaned = cleaned.trim().trim_matches('\'').to_string();
    let base = if cleaned.is_empty() { "Sheet".to_string() } else { cleaned };

    let mut candidate: String = base.chars().take(MAX_SHEET_NAME).collect();
    let mut n = 2;
    while used.contains(&candidate.to_lowercase()) {
        let suffix = format!(" ({n})");
        let keep = MAX_SHEET_NAME - suffix.chars().count();
        candidate = base.chars().take(keep).collect::<String>() + &suffix;
        n += 1;
    }
    used.insert(candidate.to_lowercase());
    candidate
}
