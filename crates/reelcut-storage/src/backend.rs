//! Storage backend trait.

use async_trait::async_trait;
use std::path::{Path, PathBuf};

use reelcut_models::StorageRef;

use crate::error::{StorageError, StorageResult};

/// Persistent object storage for produced clips.
#[async_trait]
pub trait StorageBackend: Send + Sync + 'static {
    /// Take ownership of the file at `local_path` and store it under `key`.
    async fn persist(&self, local_path: &Path, key: &str) -> StorageResult<StorageRef>;

    /// Make a stored object available as a local file.
    async fn fetch(&self, location: &StorageRef) -> StorageResult<PathBuf>;

    /// Remove a stored object. Removing a missing object succeeds.
    async fn delete(&self, location: &StorageRef) -> StorageResult<()>;

    /// Whether the backend is reachable and writable.
    async fn health_check(&self) -> StorageResult<()>;
}

/// Reject keys that are empty, absolute or escape the storage root.
pub fn validate_key(key: &str) -> StorageResult<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(StorageError::InvalidKey(key.to_string()));
    }
    Ok(())
}
