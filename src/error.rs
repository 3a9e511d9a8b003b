use thiserror::Error;

use crate::ast::Operator;

/// Main error type for rewrite operations
///
/// Every variant is fatal to the rewrite that produced it. Nothing is retried
/// internally; callers may retry the whole rewrite when [`is_retriable`]
/// says so.
///
/// [`is_retriable`]: RewriteError::is_retriable
#[derive(Error, Debug)]
pub enum RewriteError {
    #[error("Parse error: {0}")]
    ParseDelegation(String),

    #[error("Rewrite error: {0}")]
    Rewrite(String),

    #[error("Unsupported operator {operator} for {kind} node")]
    UnsupportedOperator { operator: Operator, kind: &'static str },

    #[error("Attempt to use nested path '{path}' inside '{active}'")]
    NestedPathConflict { path: String, active: String },

    #[error("No metadata for index or field: {0}")]
    MissingMetadata(String),

    #[error("Invalid range spec: {0}")]
    InvalidRangeSpec(String),

    #[error("Don't know how to resolve {0} levels of indirection")]
    UnsupportedIndirection(usize),

    #[error("Field equivalency cannot be determined for {left} -> {middle} -> {right}")]
    EquivalenceUnresolved {
        left: String,
        middle: String,
        right: String,
    },

    #[error("{failed_shards} shards failed:\n{detail}")]
    RemoteExecution { failed_shards: usize, detail: String },

    #[error("Usage error: {0}")]
    Usage(String),
}

/// Result type alias for rewrite operations
pub type Result<T> = std::result::Result<T, RewriteError>;

impl RewriteError {
    /// Check if this error indicates a transient failure that could be retried
    ///
    /// Only remote scan failures qualify, and only at the granularity of the
    /// entire rewrite.
    pub fn is_retriable(&self) -> bool {
        matches!(self, RewriteError::RemoteExecution { .. })
    }
}

impl From<serde_json::Error> for RewriteError {
    fn from(err: serde_json::Error) -> Self {
        RewriteError::ParseDelegation(err.to_string())
    }
}
