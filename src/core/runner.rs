//! Run orchestrator
//!
//! Executes the selected rules one after another, in selection order, over a
//! map of canonical tables. A rule that returns an error or panics is marked
//! Failed and the batch carries on.

use super::rules::{Registry, Rule, RuleContext};
use crate::mapping::TableKey;
use crate::types::{Column, Table, Value};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::{info, warn};

/// Per-rule execution state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RunStatus {
    Pending,
    Complete,
    Failed,
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RunStatus::Pending => "Pending",
            RunStatus::Complete => "Complete",
            RunStatus::Failed => "Failed",
        };
        write!(f, "{s}")
    }
}

/// Rollup of the rules in one group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CategoryStatus {
    Complete,
    Failed,
    /// Some rules failed, some completed
    Exceptions,
    Pending,
}

impl fmt::Display for CategoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CategoryStatus::Complete => "Complete",
            CategoryStatus::Failed => "Failed",
            CategoryStatus::Exceptions => "Exceptions",
            CategoryStatus::Pending => "Pending",
        };
        write!(f, "{s}")
    }
}

/// Outcome of one selected rule. `result` is present only when the rule
/// completed; a failed rule has an error message instead.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub code: String,
    pub title: String,
    pub group: String,
    pub status: RunStatus,
    pub result: Option<Table>,
    pub error: Option<String>,
}

impl RuleOutcome {
    fn complete(rule: &dyn Rule, table: Table) -> Self {
        Self {
            code: rule.code().to_string(),
            title: rule.title().to_string(),
            group: rule.group().to_string(),
            status: RunStatus::Complete,
            result: Some(table),
            error: None,
        }
    }

    fn failed(code: &str, title: &str, group: &str, error: String) -> Self {
        Self {
            code: code.to_string(),
            title: title.to_string(),
            group: group.to_string(),
            status: RunStatus::Failed,
            result: None,
            error: Some(error),
        }
    }

    /// Exception rows found; zero unless the rule completed
    pub fn issues(&self) -> usize {
        self.result.as_ref().map_or(0, Table::row_count)
    }
}

/// Results of one run, in selection order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunReport {
    outcomes: Vec<RuleOutcome>,
}

impl RunReport {
    pub fn outcomes(&self) -> &[RuleOutcome] {
        &self.outcomes
    }

    pub fn outcome(&self, code: &str) -> Option<&RuleOutcome> {
        self.outcomes.iter().find(|o| o.code == code)
    }

    /// Exception tables of the rules that completed
    pub fn results(&self) -> BTreeMap<String, &Table> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().map(|t| (o.code.clone(), t)))
            .collect()
    }

    /// Status of every selected rule
    pub fn statuses(&self) -> BTreeMap<String, RunStatus> {
        self.outcomes.iter().map(|o| (o.code.clone(), o.status)).collect()
    }

    /// Status of `code`; rules not in this run are Pending
    pub fn status(&self, code: &str) -> RunStatus {
        self.outcome(code).map_or(RunStatus::Pending, |o| o.status)
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.status == RunStatus::Failed).count()
    }

    pub fn total_issues(&self) -> usize {
        self.outcomes.iter().map(RuleOutcome::issues).sum()
    }

    /// Rollup over every catalogue rule in `group`
    pub fn category_status(&self, registry: &Registry, group: &str) -> CategoryStatus {
        let statuses: Vec<RunStatus> = registry
            .codes_in_group(group)
            .into_iter()
            .map(|code| self.status(code))
            .collect();
        if statuses.is_empty() {
            return CategoryStatus::Pending;
        }
        let all = |s: RunStatus| statuses.iter().all(|v| *v == s);
        let any = |s: RunStatus| statuses.iter().any(|v| *v == s);
        if all(RunStatus::Complete) {
            CategoryStatus::Complete
        } else if all(RunStatus::Failed) {
            CategoryStatus::Failed
        } else if any(RunStatus::Failed) && any(RunStatus::Complete) {
            CategoryStatus::Exceptions
        } else {
            CategoryStatus::Pending
        }
    }

    /// One row per catalogue rule: Bots, Category, Issues Found, Status
    pub fn summary_table(&self, registry: &Registry) -> Table {
        let mut bots = Vec::new();
        let mut categories = Vec::new();
        let mut issues = Vec::new();
        let mut statuses = Vec::new();
        for rule in registry.rules() {
            let outcome = self.outcome(rule.code());
            bots.push(Value::text(rule.title()));
            categories.push(Value::text(rule.group()));
            issues.push(Value::Number(outcome.map_or(0, RuleOutcome::issues) as f64));
            statuses.push(Value::text(self.status(rule.code()).to_string()));
        }

        let mut table = Table::new("Summary");
        table.add_column(Column::new("Bots", bots));
        table.add_column(Column::new("Category", categories));
        table.add_column(Column::new("Issues Found", issues));
        table.add_column(Column::new("Status", statuses));
        table
    }
}

/// Run `selected` rules against `tables`.
///
/// Unknown codes and rules whose input tables are absent are Failed without
/// being invoked. Every call recomputes from scratch.
pub fn run<S: AsRef<str>>(
    selected: &[S],
    tables: &BTreeMap<TableKey, Table>,
    registry: &Registry,
    ctx: &RuleContext,
) -> RunReport {
    let mut report = RunReport::default();

    for code in selected {
        let code = code.as_ref();
        if report.outcome(code).is_some() {
            continue;
        }

        let Some(rule) = registry.get(code) else {
            warn!(code, "unknown rule code");
            report
                .outcomes
                .push(RuleOutcome::failed(code, code, "", format!("Unknown rule '{code}'")));
            continue;
        };

        let missing: Vec<String> = rule
            .inputs()
            .iter()
            .map(|r| r.key())
            .filter(|key| !tables.contains_key(key))
            .map(|key| key.to_string())
            .collect();
        if !missing.is_empty() {
            warn!(code, ?missing, "rule inputs not available");
            report.outcomes.push(RuleOutcome::failed(
                code,
                rule.title(),
                rule.group(),
                format!("Missing input table(s): {}", missing.join(", ")),
            ));
            continue;
        }

        let inputs: Vec<&Table> = rule
            .inputs()
            .iter()
            .filter_map(|r| tables.get(&r.key()))
            .collect();

        let outcome = match catch_unwind(AssertUnwindSafe(|| rule.evaluate(&inputs, ctx))) {
            Ok(Ok(table)) => {
                info!(code, issues = table.row_count(), "rule complete");
                RuleOutcome::complete(rule, table)
            }
            Ok(Err(e)) => {
                warn!(code, error = %e, "rule failed");
                RuleOutcome::failed(code, rule.title(), rule.group(), e.to_string())
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(code, error = %message, "rule panicked");
                RuleOutcome::failed(code, rule.title(), rule.group(), message)
            }
        };
        report.outcomes.push(outcome);
    }

    report
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        format!("Rule panicked: {s}")
    } else if let Some(s) = payload.downcast_ref::<String>() {
        format!("Rule panicked: {s}")
    } else {
        "Rule panicked".to_string()
    }
}
