use crate::error::{AuditError, AuditResult};
use chrono::{NaiveDateTime, NaiveTime};
use serde::Serialize;
use std::fmt;

//==============================================================================
// Cell Values
//==============================================================================

/// A single cell. Canonical columns only ever hold `Null` or the variant that
/// matches their declared kind; pass-through columns keep whatever the
/// workbook stored.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
    Bool(bool),
    Date(NaiveDateTime),
}

static NULL_VALUE: Value = Value::Null;

impl Value {
    pub fn text(s: impl Into<String>) -> Self {
        Value::Text(s.into())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Null, or text made of whitespace only
    pub fn is_blank(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.trim().is_empty(),
            _ => false,
        }
    }

    /// Numeric view; text is parsed with the same rules the table builder uses
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if n.is_finite() => Some(*n),
            Value::Text(s) => parse_number(s),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<NaiveDateTime> {
        match self {
            Value::Date(d) => Some(*d),
            _ => None,
        }
    }

    /// String view (`None` for null)
    pub fn as_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Text(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Trimmed string key used for joins, grouping and set membership.
    /// Blank cells have no key.
    pub fn key(&self) -> Option<String> {
        let text = self.as_text()?;
        let trimmed = text.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Text(s) => write!(f, "{s}"),
            Value::Bool(b) => write!(f, "{}", if *b { "True" } else { "False" }),
            Value::Date(d) => write!(f, "{}", format_date(d)),
        }
    }
}

/// Parse a numeric cell written as text ("1,250.50", " 7 ").
/// Blank cells and the dash placeholder are null.
pub fn parse_number(s: &str) -> Option<f64> {
    let cleaned: String = s.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() || cleaned == "-" {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|n| n.is_finite())
}

/// Integral values render without a fractional part (11.0 -> "11")
pub fn format_number(n: f64) -> String {
    if n.fract() == 0.0 && n.abs() < 1e15 {
        format!("{}", n as i64)
    } else {
        format!("{n}")
    }
}

pub fn format_date(d: &NaiveDateTime) -> String {
    if d.time() == NaiveTime::MIN {
        d.format("%Y-%m-%d").to_string()
    } else {
        d.format("%Y-%m-%d %H:%M:%S").to_string()
    }
}

//==============================================================================
// Columns and Tables
//==============================================================================

/// A named column of cells
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// An all-null column of the given length
    pub fn nulls(name: impl Into<String>, len: usize) -> Self {
        Self::new(name, vec![Value::Null; len])
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Cell at `row`, or null when out of range
    pub fn get(&self, row: usize) -> &Value {
        self.values.get(row).unwrap_or(&NULL_VALUE)
    }

    pub fn all_null(&self) -> bool {
        self.values.iter().all(Value::is_null)
    }
}

/// An ordered set of equal-length columns
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<Column>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            columns: Vec::new(),
        }
    }

    /// An empty table with the given header
    pub fn with_header<S: AsRef<str>>(name: impl Into<String>, header: &[S]) -> Self {
        let mut table = Self::new(name);
        for column in header {
            table.add_column(Column::new(column.as_ref(), Vec::new()));
        }
        table
    }

    /// Add a column, replacing any existing column with the same name in place
    pub fn add_column(&mut self, column: Column) {
        if let Some(existing) = self.columns.iter_mut().find(|c| c.name == column.name) {
            *existing = column;
        } else {
            self.columns.push(column);
        }
    }

    /// Insert a column at `index` (clamped), replacing any column with the same name
    pub fn insert_column(&mut self, index: usize, column: Column) {
        self.drop_column(&column.name);
        let index = index.min(self.columns.len());
        self.columns.insert(index, column);
    }

    pub fn drop_column(&mut self, name: &str) -> Option<Column> {
        let pos = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(pos))
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> bool {
        match self.columns.iter_mut().find(|c| c.name == from) {
            Some(column) => {
                column.name = to.to_string();
                true
            }
            None => false,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut Column> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column(name).is_some()
    }

    /// Column lookup that reports the table and column on failure
    pub fn require(&self, name: &str) -> AuditResult<&Column> {
        self.column(name).ok_or_else(|| AuditError::MissingColumn {
            table: self.name.clone(),
            column: name.to_string(),
        })
    }

    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Get the number of rows (length of first column, all should be same)
    pub fn row_count(&self) -> usize {
        self.columns.first().map_or(0, Column::len)
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Validate all columns have the same length
    pub fn validate_lengths(&self) -> Result<(), String> {
        let row_count = self.row_count();
        for column in &self.columns {
            if column.len() != row_count {
                return Err(format!(
                    "Column '{}' has {} rows, expected {} rows",
                    column.name,
                    column.len(),
                    row_count
                ));
            }
        }
        Ok(())
    }

    /// Append one row; `row` must supply a value for every column
    pub fn push_row(&mut self, row: Vec<Value>) -> AuditResult<()> {
        if row.len() != self.columns.len() {
            return Err(AuditError::Validation(format!(
                "Row has {} values, table '{}' has {} columns",
                row.len(),
                self.name,
                self.columns.len()
            )));
        }
        for (column, value) in self.columns.iter_mut().zip(row) {
            column.values.push(value);
        }
        Ok(())
    }

    /// Cells of one row paired with their column names
    pub fn row(&self, index: usize) -> Vec<(&str, &Value)> {
        self.columns
            .iter()
            .map(|c| (c.name.as_str(), c.get(index)))
            .collect()
    }

    /// New table holding the given rows, in the given order
    pub fn take_rows(&self, rows: &[usize]) -> Table {
        Table {
            name: self.name.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| Column::new(c.name.clone(), rows.iter().map(|&r| c.get(r).clone()).collect()))
                .collect(),
        }
    }

    /// New table holding the rows for which `keep` returns true
    pub fn filter_rows<F>(&self, mut keep: F) -> Table
    where
        F: FnMut(usize) -> bool,
    {
        let rows: Vec<usize> = (0..self.row_count()).filter(|&r| keep(r)).collect();
        self.take_rows(&rows)
    }

    /// Reorder so the named columns (those present) lead, in the given order
    pub fn move_to_front(&mut self, names: &[&str]) {
        let mut front = Vec::new();
        for name in names {
            if let Some(pos) = self.columns.iter().position(|c| c.name == *name) {
                front.push(self.columns.remove(pos));
            }
        }
        front.append(&mut self.columns);
        self.columns = front;
    }

    pub fn renamed(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}
