use rust_decimal::Decimal;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppraisalError {
    #[error("Invalid input: {field}: {reason}")]
    InvalidInput { field: String, reason: String },

    #[error("Convergence failure: {function} did not converge after {iterations} iterations (delta: {last_delta})")]
    ConvergenceFailure {
        function: String,
        iterations: u32,
        last_delta: Decimal,
    },

    #[error("Division by zero in {context}")]
    DivisionByZero { context: String },

    /// A compiled schedule or statement broke one of its defining identities.
    /// Always an engine defect, never a data problem.
    #[error("Consistency violation in {statement} (year {year}): {detail}")]
    ConsistencyViolation {
        statement: String,
        year: u32,
        detail: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl AppraisalError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        AppraisalError::InvalidInput {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn inconsistent(
        statement: impl Into<String>,
        year: u32,
        detail: impl Into<String>,
    ) -> Self {
        AppraisalError::ConsistencyViolation {
            statement: statement.into(),
            year,
            detail: detail.into(),
        }
    }

    /// True for errors that must abort a sensitivity sweep rather than be
    /// recorded against a single scenario.
    pub fn is_fatal(&self) -> bool {
        matches!(self, AppraisalError::ConsistencyViolation { .. })
    }
}

impl From<serde_json::Error> for AppraisalError {
    fn from(e: serde_json::Error) -> Self {
        AppraisalError::SerializationError(e.to_string())
    }
}

impl From<toml::de::Error> for AppraisalError {
    fn from(e: toml::de::Error) -> Self {
        AppraisalError::Config(e.to_string())
    }
}
