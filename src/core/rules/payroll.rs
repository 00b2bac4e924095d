//! Hire-to-retire checks over the employee master and attendance register
//!
//! Attendance registers carry one column per day of the month (`D1` ..
//! `D31`). A day counts as present unless the cell is blank or marked `A`.
//! A register may also carry a `Present_Days` total, which takes precedence
//! over the day columns where it is filled in.

use super::{input, CatalogRule, RuleContext};
use crate::core::builder::parse_date_text;
use crate::error::{AuditError, AuditResult};
use crate::mapping::canon::*;
use crate::mapping::{tables, TableRef};
use crate::types::{Column, Table, Value};
use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use regex::Regex;
use std::collections::{HashMap, HashSet};

pub const GROUP: &str = "H2R";

pub use crate::mapping::canon::PRESENT_DAYS;
pub const ATTENDED_ON: &str = "Date";
pub const DAY_STATUS: &str = "Status";

const DAY_COLUMN_PATTERN: &str = r"^D([1-9]|[12][0-9]|3[01])$";

const MASTER_AND_ATTENDANCE: &[TableRef] = &[tables::H2R_EMPLOYEE_MASTER, tables::ATTENDANCE_REGISTER];

pub fn catalogue() -> Vec<CatalogRule> {
    vec![
        CatalogRule {
            code: "H2R1",
            title: "Ghost employee detection",
            group: GROUP,
            inputs: MASTER_AND_ATTENDANCE,
            eval: ghost_employees,
        },
        CatalogRule {
            code: "H2R2",
            title: "Inactive Employees In Payroll",
            group: GROUP,
            inputs: MASTER_AND_ATTENDANCE,
            eval: attendance_after_exit,
        },
    ]
}

/// (column, day of month) for every D1..D31 column present
fn day_columns<'a>(table: &'a Table, code: &str) -> AuditResult<Vec<(&'a Column, i64)>> {
    let pattern = Regex::new(DAY_COLUMN_PATTERN)
        .map_err(|e| AuditError::rule(code, format!("Regex error: {}", e)))?;
    Ok(table
        .columns
        .iter()
        .filter_map(|c| {
            let day = pattern.captures(&c.name)?.get(1)?.as_str().parse::<i64>().ok()?;
            Some((c, day))
        })
        .collect())
}

fn is_present(mark: &Value) -> bool {
    mark.key().is_some_and(|k| !k.eq_ignore_ascii_case("A"))
}

/// Employees with attendance who are not on the employee master
pub fn ghost_employees(inputs: &[&Table], _ctx: &RuleContext) -> AuditResult<Table> {
    let master = input(inputs, 0, "H2R1")?;
    let attendance = input(inputs, 1, "H2R1")?;

    let known: HashSet<String> = master
        .require(EMPLOYEE_ID)?
        .values
        .iter()
        .filter_map(Value::key)
        .collect();
    let employee = attendance.require(EMPLOYEE_ID)?;
    let days = day_columns(attendance, "H2R1")?;

    let totals = attendance.column(PRESENT_DAYS);
    let present: Vec<f64> = (0..attendance.row_count())
        .map(|r| {
            totals
                .and_then(|c| c.get(r).as_number())
                .unwrap_or_else(|| days.iter().filter(|(c, _)| is_present(c.get(r))).count() as f64)
        })
        .collect();

    let rows: Vec<usize> = (0..attendance.row_count())
        .filter(|&r| present[r] > 0.0 && !employee.get(r).key().is_some_and(|id| known.contains(&id)))
        .collect();

    let mut out = attendance.take_rows(&rows);
    out.add_column(Column::new(
        PRESENT_DAYS,
        rows.iter().map(|&r| Value::Number(present[r])).collect(),
    ));
    out.move_to_front(&[EMPLOYEE_ID, PRESENT_DAYS]);
    Ok(out)
}

/// First day of the month named by a register's `Month` value
/// ("Jan 2025", "January 2025", "2025-01", "01/2025" or any full date)
pub fn month_start(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    if let Some(date) = parse_date_text(text) {
        return NaiveDate::from_ymd_opt(date.year(), date.month(), 1);
    }
    let prefixed = format!("1 {text}");
    ["%d %B %Y", "%d %b %Y", "%d %B-%Y", "%d %b-%Y", "%d %B, %Y", "%d %b, %Y"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&prefixed, fmt).ok())
        .or_else(|| NaiveDate::parse_from_str(&format!("{text}-01"), "%Y-%m-%d").ok())
        .or_else(|| NaiveDate::parse_from_str(&format!("01/{text}"), "%d/%m/%Y").ok())
        .or_else(|| NaiveDate::parse_from_str(&format!("01-{text}"), "%d-%m-%Y").ok())
}

/// Attendance marked on days after the employee's exit date
pub fn attendance_after_exit(inputs: &[&Table], _ctx: &RuleContext) -> AuditResult<Table> {
    let master = input(inputs, 0, "H2R2")?;
    let attendance = input(inputs, 1, "H2R2")?;

    let month = attendance.require(MONTH)?;
    let first_month = month
        .values
        .iter()
        .find_map(Value::key)
        .ok_or_else(|| AuditError::rule("H2R2", "attendance register has no Month value"))?;
    let base = month_start(&first_month)
        .ok_or_else(|| AuditError::rule("H2R2", format!("unable to parse month '{first_month}'")))?
        .and_time(NaiveTime::MIN);

    let header = [EMPLOYEE_ID, EMPLOYEE_NAME, MONTH, EXIT_DATE, ATTENDED_ON, DAY_STATUS];
    let mut out = Table::with_header("H2R2", &header);

    let days = day_columns(attendance, "H2R2")?;
    if days.is_empty() {
        return Ok(out);
    }

    let master_id = master.require(EMPLOYEE_ID)?;
    let master_name = master.require(EMPLOYEE_NAME)?;
    let exit = master.require(EXIT_DATE)?;
    let mut exits: HashMap<(String, String), Vec<NaiveDateTime>> = HashMap::new();
    for r in 0..master.row_count() {
        if let (Some(id), Some(name), Some(date)) =
            (master_id.get(r).key(), master_name.get(r).key(), exit.get(r).as_date())
        {
            exits.entry((id, name)).or_default().push(date);
        }
    }

    let id = attendance.require(EMPLOYEE_ID)?;
    let name = attendance.require(EMPLOYEE_NAME)?;
    let mut hits: Vec<(String, NaiveDateTime, Vec<Value>)> = Vec::new();
    for (column, day) in &days {
        let date = base + Duration::days(day - 1);
        for r in 0..attendance.row_count() {
            let mark = column.get(r);
            if !is_present(mark) {
                continue;
            }
            let (Some(emp_id), Some(emp_name)) = (id.get(r).key(), name.get(r).key()) else {
                continue;
            };
            let Some(exit_dates) = exits.get(&(emp_id.clone(), emp_name)) else {
                continue;
            };
            for exit_date in exit_dates.iter().filter(|e| date > **e) {
                hits.push((
                    emp_id.clone(),
                    date,
                    vec![
                        id.get(r).clone(),
                        name.get(r).clone(),
                        month.get(r).clone(),
                        Value::Date(*exit_date),
                        Value::Date(date),
                        mark.clone(),
                    ],
                ));
            }
        }
    }

    hits.sort_by(|a, b| (&a.0, a.1).cmp(&(&b.0, b.1)));
    for (_, _, row) in hits {
        out.push_row(row)?;
    }
    Ok(out)
}
