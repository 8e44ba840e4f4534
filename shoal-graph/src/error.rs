//! Error types for shoal-graph

use thiserror::Error;

/// Result type alias using our Error
pub type Result<T> = std::result::Result<T, Error>;

/// Loader / graph error type
#[derive(Error, Debug)]
pub enum Error {
    /// Missing or unreadable input directory/file (fatal at startup)
    #[error("Load error: {0}")]
    Load(String),

    /// Store-level failure (staging overflow, arena exhaustion)
    #[error(transparent)]
    Store(#[from] shoal_store::Error),

    /// Core-level failure (bad attribute value, config)
    #[error(transparent)]
    Core(#[from] shoal_core::Error),

    /// I/O error with path context
    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

impl Error {
    /// Create a load error
    pub fn load(msg: impl Into<String>) -> Self {
        Error::Load(msg.into())
    }

    /// Create an I/O error with path context
    pub fn io(path: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}
