//! Content store error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The key cannot be mapped to a store path.
    #[error("invalid store key: {0:?}")]
    InvalidKey(String),

    /// The requested entry is not in the store.
    #[error("not found in store: {0}")]
    NotFound(String),

    /// An I/O error occurred.
    #[error("store I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// A specialized Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
