//! Error types for shoal-core

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid configuration
    #[error("Config error: {0}")]
    Config(String),

    /// Malformed or unsupported attribute value
    #[error("Value error: {0}")]
    Value(String),

    /// Dictionary lookup failure
    #[error("Dictionary error: {0}")]
    Dict(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a value error
    pub fn value(msg: impl Into<String>) -> Self {
        Error::Value(msg.into())
    }

    /// Create a dictionary error
    pub fn dict(msg: impl Into<String>) -> Self {
        Error::Dict(msg.into())
    }

    /// Create an I/O error
    pub fn io(msg: impl Into<String>) -> Self {
        Error::Io(msg.into())
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Io(e.to_string())
    }
}
