//! Temporary artifact tracking and guaranteed removal.
//!
//! Every file or directory a job creates in the work dir is registered with
//! [`CleanupManager::track`] before it is written. [`ArtifactScope`] wraps one
//! job execution: [`ArtifactScope::release`] deletes everything still tracked,
//! and if the scope is dropped without it (a panic in the tool adapter) the
//! `Drop` impl removes the files synchronously.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use reelcut_models::JobId;
use reelcut_queue::{JobStore, StoreError};

use crate::metrics;
use crate::retry::{retry_async, Backoff, GaveUp};

/// Lifetime counters. `tracked == deleted + handed_off + failed` once every
/// job has been released.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    pub tracked: u64,
    pub deleted: u64,
    pub handed_off: u64,
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Counters {
    tracked: AtomicU64,
    deleted: AtomicU64,
    handed_off: AtomicU64,
    failed: AtomicU64,
}

/// Outcome of releasing one job's artifacts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReleaseReport {
    pub deleted: usize,
    pub failed: usize,
}

/// Tracks artifacts per job and deletes them exactly once.
///
/// Holds paths only; the job record in the [`JobStore`] mirrors the list so a
/// restored snapshot knows what an interrupted job left behind.
pub struct CleanupManager {
    store: Arc<JobStore>,
    tracked: Mutex<HashMap<JobId, Vec<PathBuf>>>,
    backoff: Backoff,
    counters: Counters,
}

impl std::fmt::Debug for CleanupManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CleanupManager").field("stats", &self.stats()).finish()
    }
}

impl CleanupManager {
    pub fn new(store: Arc<JobStore>, retries: u32, retry_delay: Duration) -> Self {
        Self {
            store,
            tracked: Mutex::new(HashMap::new()),
            backoff: Backoff::new("artifact removal", retries, retry_delay),
            counters: Counters::default(),
        }
    }

    /// Open a release scope for one job execution.
    pub fn scope(self: &Arc<Self>, job_id: &JobId) -> ArtifactScope {
        ArtifactScope {
            manager: Arc::clone(self),
            job_id: job_id.clone(),
            released: false,
        }
    }

    /// Register a temporary artifact owned by `job_id`.
    pub fn track(&self, job_id: &JobId, path: impl Into<PathBuf>) {
        let path = path.into();
        {
            let mut tracked = self.tracked.lock();
            let paths = tracked.entry(job_id.clone()).or_default();
            if paths.contains(&path) {
                return;
            }
            paths.push(path.clone());
        }
        self.counters.tracked.fetch_add(1, Ordering::Relaxed);
        debug!(job_id = %job_id, path = %path.display(), "Tracking artifact");
        self.mirror(job_id, |job| job.track_artifact(path));
    }

    /// Stop tracking an artifact that was handed to the storage collaborator.
    ///
    /// Returns `false` if the path was not tracked.
    pub fn hand_off(&self, job_id: &JobId, path: &Path) -> bool {
        let removed = {
            let mut tracked = self.tracked.lock();
            match tracked.get_mut(job_id) {
                Some(paths) => {
                    let before = paths.len();
                    paths.retain(|p| p != path);
                    paths.len() != before
                }
                None => false,
            }
        };
        if removed {
            self.counters.handed_off.fetch_add(1, Ordering::Relaxed);
            self.mirror(job_id, |job| job.untrack_artifact(path));
        }
        removed
    }

    /// Delete every artifact still tracked for `job_id`.
    ///
    /// Idempotent: a second call finds nothing to do, and files that are
    /// already gone count as deleted. Transient failures are retried a bounded
    /// number of times, then logged; they never fail the job.
    pub async fn release(&self, job_id: &JobId) -> ReleaseReport {
        let paths = self.tracked.lock().remove(job_id).unwrap_or_default();
        let mut report = ReleaseReport::default();

        // Reverse order: files before the directories that contain them.
        for path in paths.iter().rev() {
            match retry_async(&self.backoff, || remove_path(path)).await {
                Ok(()) => report.deleted += 1,
                Err(GaveUp { error, attempts }) => {
                    report.failed += 1;
                    warn!(
                        job_id = %job_id,
                        path = %path.display(),
                        attempts,
                        "Failed to delete artifact: {}",
                        error
                    );
                }
            }
        }

        if !paths.is_empty() {
            self.mirror(job_id, |job| job.artifacts.clear());
            self.record(job_id, report);
        }
        report
    }

    /// Release artifacts recorded by a previous process (snapshot restore).
    pub async fn release_paths(&self, job_id: &JobId, paths: &[PathBuf]) -> ReleaseReport {
        for path in paths {
            self.track(job_id, path.clone());
        }
        self.release(job_id).await
    }

    /// Drop bookkeeping for a job that left the store.
    pub fn forget(&self, job_id: &JobId) {
        if let Some(paths) = self.tracked.lock().remove(job_id) {
            if !paths.is_empty() {
                warn!(job_id = %job_id, count = paths.len(), "Forgetting unreleased artifacts");
            }
        }
    }

    /// Number of artifacts currently tracked for `job_id`.
    pub fn tracked_count(&self, job_id: &JobId) -> usize {
        self.tracked.lock().get(job_id).map_or(0, Vec::len)
    }

    pub fn stats(&self) -> CleanupStats {
        CleanupStats {
            tracked: self.counters.tracked.load(Ordering::Relaxed),
            deleted: self.counters.deleted.load(Ordering::Relaxed),
            handed_off: self.counters.handed_off.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Synchronous single-attempt release, for `Drop`.
    fn release_blocking(&self, job_id: &JobId) {
        let paths = self.tracked.lock().remove(job_id).unwrap_or_default();
        if paths.is_empty() {
            return;
        }
        let mut report = ReleaseReport::default();
        for path in paths.iter().rev() {
            match remove_path_blocking(path) {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    report.failed += 1;
                    warn!(job_id = %job_id, path = %path.display(), "Failed to delete artifact: {}", e);
                }
            }
        }
        self.mirror(job_id, |job| job.artifacts.clear());
        self.record(job_id, report);
    }

    fn record(&self, job_id: &JobId, report: ReleaseReport) {
        self.counters.deleted.fetch_add(report.deleted as u64, Ordering::Relaxed);
        self.counters.failed.fetch_add(report.failed as u64, Ordering::Relaxed);
        metrics::record_cleanup(report.deleted as u64, report.failed as u64);
        debug!(job_id = %job_id, deleted = report.deleted, failed = report.failed, "Released artifacts");
    }

    fn mirror(&self, job_id: &JobId, f: impl FnOnce(&mut reelcut_models::Job)) {
        let result = self.store.update(job_id, |job| {
            f(job);
            Ok::<(), StoreError>(())
        });
        if let Err(e) = result {
            debug!(job_id = %job_id, "Artifact list not mirrored: {}", e);
        }
    }
}

async fn remove_path(path: &Path) -> io::Result<()> {
    let result = match tokio::fs::symlink_metadata(path).await {
        Ok(meta) if meta.is_dir() => tokio::fs::remove_dir_all(path).await,
        Ok(_) => tokio::fs::remove_file(path).await,
        Err(e) => Err(e),
    };
    ignore_missing(result)
}

fn remove_path_blocking(path: &Path) -> io::Result<()> {
    let result = match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.is_dir() => std::fs::remove_dir_all(path),
        Ok(_) => std::fs::remove_file(path),
        Err(e) => Err(e),
    };
    ignore_missing(result)
}

fn ignore_missing(result: io::Result<()>) -> io::Result<()> {
    match result {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

/// Guard over one job execution's artifacts.
///
/// Call [`release`](Self::release) on every normal exit. If the guard is
/// dropped unreleased, the artifacts are removed synchronously.
#[derive(Debug)]
pub struct ArtifactScope {
    manager: Arc<CleanupManager>,
    job_id: JobId,
    released: bool,
}

impl ArtifactScope {
    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    /// Register a path before creating it.
    pub fn track(&self, path: impl Into<PathBuf>) {
        self.manager.track(&self.job_id, path);
    }

    /// Mark a path as owned by the storage collaborator.
    pub fn hand_off(&self, path: &Path) -> bool {
        self.manager.hand_off(&self.job_id, path)
    }

    pub async fn release(mut self) -> ReleaseReport {
        self.released = true;
        self.manager.release(&self.job_id).await
    }
}

impl Drop for ArtifactScope {
    fn drop(&mut self) {
        if !self.released {
            warn!(job_id = %self.job_id, "Artifact scope dropped without release, removing synchronously");
            self.manager.release_blocking(&self.job_id);
        }
    }
}
