//! Directory-backed storage.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::info;

use reelcut_models::StorageRef;

use crate::backend::{validate_key, StorageBackend};
use crate::error::{StorageError, StorageResult};
use crate::fs_utils::move_file;

/// Stores objects as files below a root directory.
#[derive(Debug, Clone)]
pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

#[async_trait]
impl StorageBackend for LocalStorage {
    async fn persist(&self, local_path: &Path, key: &str) -> StorageResult<StorageRef> {
        let dst = self.path_for(key)?;
        if !tokio::fs::try_exists(local_path).await.unwrap_or(false) {
            return Err(StorageError::persist_failed(format!(
                "source file missing: {}",
                local_path.display()
            )));
        }
        move_file(local_path, &dst).await?;
        info!("Stored {} at {}", key, dst.display());
        Ok(StorageRef {
            key: key.to_string(),
            uri: dst.to_string_lossy().to_string(),
        })
    }

    async fn fetch(&self, location: &StorageRef) -> StorageResult<PathBuf> {
        let path = self.path_for(&location.key)?;
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StorageError::not_found(&location.key));
        }
        Ok(path)
    }

    async fn delete(&self, location: &StorageRef) -> StorageResult<()> {
        let path = self.path_for(&location.key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => {
                info!("Deleted {}", location.key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn health_check(&self) -> StorageResult<()> {
        tokio::fs::create_dir_all(&self.root).await?;
        let marker = self.root.join(".reelcut-health");
        tokio::fs::write(&marker, b"ok").await?;
        tokio::fs::remove_file(&marker).await?;
        Ok(())
    }
}
