//! JSON snapshot of the job store.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::info;

use reelcut_models::Job;

use crate::error::{StoreError, StoreResult};
use crate::store::JobStore;

const SNAPSHOT_VERSION: u32 = 1;

/// On-disk form of every job record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub jobs: Vec<Job>,
}

impl StoreSnapshot {
    pub fn capture(store: &JobStore) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            jobs: store.list(),
        }
    }

    /// Write atomically: temp file in the same directory, then rename.
    pub async fn write_to(&self, path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        if let Err(e) = tokio::fs::rename(&tmp, path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Read a snapshot; `None` when the file does not exist.
    pub async fn read_from(path: &Path) -> StoreResult<Option<Self>> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let snapshot: StoreSnapshot = serde_json::from_slice(&bytes)?;
        if snapshot.version != SNAPSHOT_VERSION {
            return Err(StoreError::UnsupportedSnapshot(snapshot.version));
        }
        info!("Loaded {} jobs from {}", snapshot.jobs.len(), path.display());
        Ok(Some(snapshot))
    }
}
