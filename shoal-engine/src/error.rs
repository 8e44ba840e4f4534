//! Error types for shoal-engine

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Engine error type
#[derive(Error, Debug)]
pub enum Error {
    /// Unsupported pattern shape or malformed plan; terminates the query
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Client-side wait exceeded its deadline
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Store-level failure
    #[error(transparent)]
    Store(#[from] shoal_store::Error),

    /// Load / graph failure
    #[error(transparent)]
    Graph(#[from] shoal_graph::Error),

    /// Query-model failure
    #[error(transparent)]
    Query(#[from] shoal_query::Error),
}

impl Error {
    /// Create a protocol error
    pub fn protocol(msg: impl Into<String>) -> Self {
        Error::Protocol(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::Timeout(msg.into())
    }
}
