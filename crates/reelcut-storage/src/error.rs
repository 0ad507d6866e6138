//! Storage collaborator errors.

use thiserror::Error;

pub type StorageResult<T> = Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    /// No stored object under the key.
    #[error("No stored object at {0}")]
    NotFound(String),

    /// The clip could not be handed over.
    #[error("Persist failed: {0}")]
    PersistFailed(String),

    /// Keys are relative, non-empty and stay below the storage root.
    #[error("Invalid storage key: {0}")]
    InvalidKey(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StorageError {
    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound(key.into())
    }

    pub fn persist_failed(msg: impl Into<String>) -> Self {
        Self::PersistFailed(msg.into())
    }
}
