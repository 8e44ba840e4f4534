//! Error types for shoal-query

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Query-model error type
#[derive(Error, Debug)]
pub enum Error {
    /// A variable is referenced but bound to no column
    #[error("Unbound variable: {0}")]
    UnboundVariable(i64),

    /// Result tables cannot be merged (layout mismatch)
    #[error("Merge error: {0}")]
    Merge(String),
}

impl Error {
    /// Create a merge error
    pub fn merge(msg: impl Into<String>) -> Self {
        Error::Merge(msg.into())
    }
}
