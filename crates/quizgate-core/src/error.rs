//! Storage error types.
//!
//! Defined next to the [`Storage`](crate::traits::Storage) contract so the
//! assessment service can classify failures without string matching.

use thiserror::Error;

/// Errors a storage adapter can report.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The backend cannot be reached or refused the operation.
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("serialization failed for key {key}: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem failure in a file-backed adapter.
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure injected by a test adapter.
    #[error("injected failure on {op} {key}")]
    Injected { op: &'static str, key: String },
}

impl StorageError {
    /// Returns `true` if the same write may succeed when retried.
    pub fn is_transient(&self) -> bool {
        !matches!(self, StorageError::Serialization { .. })
    }
}
