//! Rule catalogue
//!
//! A rule reads one or more canonical tables and returns the rows (or a
//! derived join) that violate its check. Rules receive shared references and
//! build fresh output tables, so no rule can disturb another rule's input.

pub mod banking;
pub mod order_to_cash;
pub mod payroll;
pub mod procurement;

use crate::config::RuleParameters;
use crate::error::{AuditError, AuditResult};
use crate::mapping::TableRef;
use crate::types::{Column, Table, Value};
use chrono::{Duration, NaiveDateTime};

/// Evaluation context shared by every rule in a run
#[derive(Debug, Clone)]
pub struct RuleContext {
    pub params: RuleParameters,
    /// "Now" for rolling date windows
    pub now: NaiveDateTime,
}

impl RuleContext {
    pub fn new(params: RuleParameters) -> Self {
        let now = params.reference_time();
        Self { params, now }
    }

    /// `now` minus `days`
    pub fn days_before(&self, days: i64) -> NaiveDateTime {
        self.now - Duration::days(days)
    }
}

impl Default for RuleContext {
    fn default() -> Self {
        Self::new(RuleParameters::default())
    }
}

/// An exception-detection rule ("bot")
pub trait Rule: Send + Sync {
    /// Stable identifier used for selection and in result maps
    fn code(&self) -> &str;

    fn title(&self) -> &str;

    /// Rollup group (category) the rule reports under
    fn group(&self) -> &str;

    /// Canonical tables the rule reads, in the order `evaluate` receives them
    fn inputs(&self) -> &[TableRef];

    fn evaluate(&self, inputs: &[&Table], ctx: &RuleContext) -> AuditResult<Table>;
}

pub type EvalFn = fn(&[&Table], &RuleContext) -> AuditResult<Table>;

/// Built-in rule backed by a plain function
#[derive(Clone, Copy)]
pub struct CatalogRule {
    pub code: &'static str,
    pub title: &'static str,
    pub group: &'static str,
    pub inputs: &'static [TableRef],
    pub eval: EvalFn,
}

impl std::fmt::Debug for CatalogRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogRule")
            .field("code", &self.code)
            .field("group", &self.group)
            .finish()
    }
}

impl Rule for CatalogRule {
    fn code(&self) -> &str {
        self.code
    }

    fn title(&self) -> &str {
        self.title
    }

    fn group(&self) -> &str {
        self.group
    }

    fn inputs(&self) -> &[TableRef] {
        self.inputs
    }

    fn evaluate(&self, inputs: &[&Table], ctx: &RuleContext) -> AuditResult<Table> {
        let table = (self.eval)(inputs, ctx)?;
        Ok(table.renamed(self.code))
    }
}

//==============================================================================
// Registry
//==============================================================================

/// Ordered collection of rules with unique codes
pub struct Registry {
    name: String,
    rules: Vec<Box<dyn Rule>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("name", &self.name)
            .field("codes", &self.codes())
            .finish()
    }
}

impl Registry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            rules: Vec::new(),
        }
    }

    fn from_catalogue(name: &str, catalogue: Vec<CatalogRule>) -> Self {
        let mut registry = Self::new(name);
        for rule in catalogue {
            registry.rules.push(Box::new(rule));
        }
        registry
    }

    /// Thirteen loan-portfolio checks
    pub fn banking() -> Self {
        Self::from_catalogue("banking", banking::catalogue())
    }

    /// Procure-to-pay, order-to-cash and hire-to-retire checks
    pub fn enterprise() -> Self {
        let mut catalogue = procurement::catalogue();
        catalogue.extend(order_to_cash::catalogue());
        catalogue.extend(payroll::catalogue());
        Self::from_catalogue("enterprise", catalogue)
    }

    /// Append a rule; codes must be unique
    pub fn register<R: Rule + 'static>(&mut self, rule: R) -> AuditResult<()> {
        if self.get(rule.code()).is_some() {
            return Err(AuditError::Validation(format!(
                "Rule code '{}' is already registered in '{}'",
                rule.code(),
                self.name
            )));
        }
        self.rules.push(Box::new(rule));
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, code: &str) -> Option<&dyn Rule> {
        self.rules.iter().find(|r| r.code() == code).map(|r| r.as_ref())
    }

    pub fn rules(&self) -> impl Iterator<Item = &dyn Rule> {
        self.rules.iter().map(|r| r.as_ref())
    }

    pub fn codes(&self) -> Vec<&str> {
        self.rules.iter().map(|r| r.code()).collect()
    }

    /// Distinct groups in first-seen order
    pub fn groups(&self) -> Vec<&str> {
        let mut groups: Vec<&str> = Vec::new();
        for rule in &self.rules {
            if !groups.contains(&rule.group()) {
                groups.push(rule.group());
            }
        }
        groups
    }

    pub fn codes_in_group(&self, group: &str) -> Vec<&str> {
        self.rules
            .iter()
            .filter(|r| r.group() == group)
            .map(|r| r.code())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}

//==============================================================================
// Shared helpers
//==============================================================================

/// The `index`-th input, or a rule error when the caller passed too few
pub(crate) fn input<'a>(inputs: &[&'a Table], index: usize, code: &str) -> AuditResult<&'a Table> {
    inputs
        .get(index)
        .copied()
        .ok_or_else(|| AuditError::rule(code, format!("expected input table #{}", index + 1)))
}

/// Trimmed text equals `expected`
pub(crate) fn text_is(value: &Value, expected: &str) -> bool {
    value.key().is_some_and(|k| k == expected)
}

/// Trimmed text is one of `codes`
pub(crate) fn one_of(value: &Value, codes: &[&str]) -> bool {
    value.key().is_some_and(|k| codes.contains(&k.as_str()))
}

/// A column repeating one label
pub(crate) fn label_column(name: &str, label: &str, len: usize) -> Column {
    Column::new(name, vec![Value::text(label); len])
}

/// Float equality within 1e-9
pub(crate) fn approx_eq(a: f64, b: f64) -> bool {
    (a - b).abs() <= 1e-9
}
