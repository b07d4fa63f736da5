//! Error types for couchorm

use thiserror::Error;

/// Result type alias for couchorm operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for statement construction and execution
#[derive(Debug, Error)]
pub enum OrmError {
    /// Malformed condition tree (operand count or operand shape)
    #[error("Invalid condition: {0}")]
    InvalidCondition(String),

    /// Malformed query specification (e.g. unknown join type)
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// Statement precondition failed
    #[error("Validation error: {0}")]
    Validation(String),

    /// Document or options encoding error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Failure reported by the statement executor
    #[error("Execution error: {0}")]
    Execution(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create an invalid condition error
    pub fn invalid_condition(message: impl Into<String>) -> Self {
        Self::InvalidCondition(message.into())
    }

    /// Create an invalid query error
    pub fn invalid_query(message: impl Into<String>) -> Self {
        Self::InvalidQuery(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Check if this error was raised while building a statement.
    ///
    /// Construction errors are deterministic: building the same input again
    /// fails the same way.
    pub fn is_construction_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidCondition(_) | Self::InvalidQuery(_) | Self::Validation(_)
        )
    }

    /// Check if this error came from the executor
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Self::Execution(_))
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for OrmError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
