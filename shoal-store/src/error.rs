//! Error types for shoal-store

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Store error type
#[derive(Error, Debug)]
pub enum Error {
    /// Arena zone exhausted (fatal: the kvstore budget is too small)
    #[error("Out of space: {0}")]
    OutOfSpace(String),

    /// An ID does not fit the packed key layout
    #[error("ID out of range: {0}")]
    IdRange(String),

    /// One-sided remote read/write failed
    #[error("Remote memory error: {0}")]
    Remote(String),

    /// Store invariant violated
    #[error("Store corruption: {0}")]
    Corrupt(String),
}

impl Error {
    /// Create an out-of-space error
    pub fn out_of_space(msg: impl Into<String>) -> Self {
        Error::OutOfSpace(msg.into())
    }

    /// Create an ID-range error
    pub fn id_range(msg: impl Into<String>) -> Self {
        Error::IdRange(msg.into())
    }

    /// Create a remote-memory error
    pub fn remote(msg: impl Into<String>) -> Self {
        Error::Remote(msg.into())
    }

    /// Create a corruption error
    pub fn corrupt(msg: impl Into<String>) -> Self {
        Error::Corrupt(msg.into())
    }
}
