use thiserror::Error;

pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Error, Debug)]
pub enum AuditError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Workbook error: {0}")]
    Workbook(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Mapping error: {0}")]
    Mapping(String),

    #[error("Unknown slot '{slot}' in {scope}")]
    UnknownSlot { scope: String, slot: String },

    #[error("Column '{column}' not found in table '{table}'")]
    MissingColumn { table: String, column: String },

    #[error("Rule '{code}' failed: {message}")]
    Rule { code: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl AuditError {
    /// Shorthand for a rule-level failure
    pub fn rule(code: &str, message: impl Into<String>) -> Self {
        AuditError::Rule {
            code: code.to_string(),
            message: message.into(),
        }
    }
}
