//! Storage error types.

use blobpath_models::PathError;
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors that can occur during storage operations.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Missing credentials: {0}")]
    MissingCredentials(String),

    #[error("Failed to configure storage session: {0}")]
    Config(String),

    #[error("Invalid path: {0}")]
    InvalidPath(#[from] PathError),

    #[error("No storage client registered for scheme: {0}")]
    UnknownScheme(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Transfer failed for {path}: {message}")]
    TransferFailed { path: String, message: String },

    #[error("Presign failed: {0}")]
    PresignFailed(String),

    #[error("Store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn missing_credentials(msg: impl Into<String>) -> Self {
        Self::MissingCredentials(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn transfer_failed(path: impl Into<String>, msg: impl Into<String>) -> Self {
        Self::TransferFailed {
            path: path.into(),
            message: msg.into(),
        }
    }

    pub fn store(msg: impl Into<String>) -> Self {
        Self::Store(msg.into())
    }

    /// Whether this error reports an absent object or container.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(e) => e.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }
}
