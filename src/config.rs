//! YAML configuration: rule thresholds and mapping overrides

use crate::error::{AuditError, AuditResult};
use chrono::{Local, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Tunable thresholds used by the rules. Every field has a default, so a
/// partial YAML file is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuleParameters {
    /// Provision / outstanding percentage below which NPA provisioning is short
    pub provision_threshold_pct: f64,
    /// Restructurings newer than this many days are reviewed
    pub restructuring_window_days: i64,
    /// FB accounts out of order for at least this many days are flagged
    pub overdue_window_days: i64,
    /// Outstanding may exceed the drawing limit by this fraction
    pub overdraw_ratio: f64,
    /// Agricultural outstanding may reach this multiple of the sanctioned limit
    pub agri_limit_multiplier: f64,
    /// Valid interest rates are multiples of this step
    pub interest_step: f64,
    /// Allowed PO vs GRN/invoice amount difference
    pub amount_tolerance: f64,
    /// Minimum combined invoice value for a split-order group
    pub split_order_threshold: f64,
    /// Maximum days between sales order and delivery
    pub overdue_delivery_days: i64,
    /// Pins "today" for rolling-window rules
    pub as_of: Option<NaiveDate>,
}

impl Default for RuleParameters {
    fn default() -> Self {
        Self {
            provision_threshold_pct: 15.0,
            restructuring_window_days: 730,
            overdue_window_days: 90,
            overdraw_ratio: 0.10,
            agri_limit_multiplier: 1.34,
            interest_step: 0.05,
            amount_tolerance: 1000.0,
            split_order_threshold: 10_000.0,
            overdue_delivery_days: 5,
            as_of: None,
        }
    }
}

impl RuleParameters {
    pub fn from_yaml_str(content: &str) -> AuditResult<Self> {
        let params: RuleParameters = serde_yaml::from_str(content)?;
        params.validate()?;
        Ok(params)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> AuditResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> AuditResult<()> {
        let non_negative = [
            ("provision_threshold_pct", self.provision_threshold_pct),
            ("overdraw_ratio", self.overdraw_ratio),
            ("agri_limit_multiplier", self.agri_limit_multiplier),
            ("amount_tolerance", self.amount_tolerance),
            ("split_order_threshold", self.split_order_threshold),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(AuditError::Config(format!("{name} must be a non-negative number, got {value}")));
            }
        }
        if !self.interest_step.is_finite() || self.interest_step <= 0.0 {
            return Err(AuditError::Config(format!(
                "interest_step must be positive, got {}",
                self.interest_step
            )));
        }
        for (name, days) in [
            ("restructuring_window_days", self.restructuring_window_days),
            ("overdue_window_days", self.overdue_window_days),
            ("overdue_delivery_days", self.overdue_delivery_days),
        ] {
            if days < 0 {
                return Err(AuditError::Config(format!("{name} must not be negative, got {days}")));
            }
        }
        Ok(())
    }

    /// Reference instant for rolling windows: `as_of` at midnight, or now
    pub fn reference_time(&self) -> NaiveDateTime {
        match self.as_of {
            Some(date) => date.and_time(NaiveTime::MIN),
            None => Local::now().naive_local(),
        }
    }
}

/// User mapping choices, applied to a session as if typed in by hand
///
/// ```yaml
/// sheets:
///   Banking:
///     Loan Dump: CCIS Dump
/// fields:
///   Banking:
///     Loan Dump:
///       AMT_OS: Outstanding Amount
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MappingOverrides {
    pub sheets: BTreeMap<String, BTreeMap<String, String>>,
    pub fields: BTreeMap<String, BTreeMap<String, BTreeMap<String, String>>>,
}

impl MappingOverrides {
    pub fn from_yaml_str(content: &str) -> AuditResult<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> AuditResult<Self> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml(&self) -> AuditResult<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn is_empty(&self) -> bool {
        self.sheets.is_empty() && self.fields.is_empty()
    }
}
