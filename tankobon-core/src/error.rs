//! Error types for Tankobon Core

use thiserror::Error;

/// Result type alias using TankobonError
pub type Result<T> = std::result::Result<T, TankobonError>;

/// Top-level error type for all Tankobon operations
#[derive(Debug, Error)]
pub enum TankobonError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Chapter {id} is hosted externally at {url}")]
    NotReadable { id: String, url: String },

    #[error("Fetch failed: {0}")]
    Fetch(#[from] FetchError),

    #[error("Cache write failed for {key}: {source}")]
    CacheWrite {
        key: String,
        #[source]
        source: StorageError,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failures reported by an external fetch (catalog request, page download).
///
/// Timeouts are the fetcher's business; they arrive here as ordinary failures.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("missing remote resource: {0}")]
    Missing(String),

    #[error("{0}")]
    Other(String),
}

/// Errors that occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Backend error: {0}")]
    BackendError(String),
}

impl StorageError {
    pub(crate) fn from_io(path: &str, err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => StorageError::NotFound(path.to_string()),
            std::io::ErrorKind::PermissionDenied => {
                StorageError::PermissionDenied(format!("{}: {}", path, err))
            }
            _ => StorageError::BackendError(format!("{}: {}", path, err)),
        }
    }

    /// Whether the error means the object simply isn't there
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}
