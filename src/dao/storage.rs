use std::{error::Error, path::PathBuf};
use thiserror::Error;

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Error raised by history storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backing file could not be read or written.
    #[error("history file `{path}` unavailable")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// The stored document is not a JSON array of entries.
    #[error("history file `{path}` is not a JSON array")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    /// Any other backend failure.
    #[error("storage unavailable: {message}")]
    Unavailable {
        message: String,
        #[source]
        source: Box<dyn Error + Send + Sync>,
    },
}

impl StorageError {
    /// Construct an unavailable error from any backend failure.
    pub fn unavailable(message: String, source: impl Error + Send + Sync + 'static) -> Self {
        StorageError::Unavailable {
            message,
            source: Box::new(source),
        }
    }
}
