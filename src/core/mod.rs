//! Audit engine: canonical table building, the rule catalogue, the run
//! orchestrator and the per-workflow session that ties them together

pub mod builder;
pub mod rules;
pub mod runner;
pub mod session;

pub use builder::{build_table, canonicalize, coerce};
pub use rules::{CatalogRule, Registry, Rule, RuleContext};
pub use runner::{run, CategoryStatus, RuleOutcome, RunReport, RunStatus};
pub use session::Session;

use crate::mapping::Schema;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;

/// A built-in schema paired with its rule catalogue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Suite {
    Banking,
    Enterprise,
}

impl Suite {
    pub fn schema(self) -> Schema {
        match self {
            Suite::Banking => Schema::banking(),
            Suite::Enterprise => Schema::enterprise(),
        }
    }

    pub fn registry(self) -> Registry {
        match self {
            Suite::Banking => Registry::banking(),
            Suite::Enterprise => Registry::enterprise(),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Suite::Banking => "banking",
            Suite::Enterprise => "enterprise",
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for Suite {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "banking" | "bank" => Ok(Suite::Banking),
            "enterprise" | "p2p" | "o2c" | "h2r" => Ok(Suite::Enterprise),
            other => Err(format!("Unknown suite '{other}' (expected 'banking' or 'enterprise')")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_suite_parse() {
        assert_eq!("Banking".parse::<Suite>().unwrap(), Suite::Banking);
        assert_eq!("enterprise".parse::<Suite>().unwrap(), Suite::Enterprise);
        assert!("payroll".parse::<Suite>().is_err());
    }

    #[test]
    fn test_every_rule_input_is_declared_by_its_schema() {
        for suite in [Suite::Banking, Suite::Enterprise] {
            let keys = suite.schema().table_keys();
            for rule in suite.registry().rules() {
                for input in rule.inputs() {
                    assert!(keys.contains(&input.key()), "{} reads undeclared {}", rule.code(), input.key());
                }
            }
        }
    }
}
