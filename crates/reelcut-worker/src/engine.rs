//! Engine facade: owns the store, pool and watchdog for one process.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use reelcut_media::MediaTool;
use reelcut_models::{ErrorDetail, ErrorKind, JobStatus};
use reelcut_queue::StoreSnapshot;
use reelcut_storage::StorageBackend;

use crate::active::AbortReason;
use crate::cleanup::CleanupStats;
use crate::config::WorkerConfig;
use crate::context::ProcessingContext;
use crate::dispatcher::Dispatcher;
use crate::error::WorkerResult;
use crate::pool::WorkerPool;
use crate::watchdog;

/// Running clip engine.
pub struct ClipEngine {
    ctx: Arc<ProcessingContext>,
    dispatcher: Dispatcher,
    pool: WorkerPool,
    watchdog: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

impl std::fmt::Debug for ClipEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClipEngine")
            .field("ctx", &self.ctx)
            .field("slots", &self.pool.slots())
            .finish()
    }
}

impl ClipEngine {
    /// Prepare the work dir, restore the last snapshot if configured, and
    /// start the worker slots and watchdog.
    pub async fn start(
        config: WorkerConfig,
        tool: Arc<dyn MediaTool>,
        storage: Arc<dyn StorageBackend>,
    ) -> WorkerResult<Self> {
        tokio::fs::create_dir_all(&config.work_dir).await?;
        let snapshot_path = config.snapshot_path.clone();
        let ctx = Arc::new(ProcessingContext::new(config, tool, storage));

        if let Some(path) = snapshot_path {
            restore(&ctx, &path).await?;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let pool = WorkerPool::spawn(Arc::clone(&ctx));
        let watchdog = watchdog::spawn(Arc::clone(&ctx), shutdown_rx);
        info!(
            work_dir = %ctx.config.work_dir.display(),
            slots = pool.slots(),
            "Clip engine started"
        );

        Ok(Self {
            dispatcher: Dispatcher::new(Arc::clone(&ctx)),
            ctx,
            pool,
            watchdog,
            shutdown,
        })
    }

    /// Client entry point.
    pub fn dispatcher(&self) -> Dispatcher {
        self.dispatcher.clone()
    }

    /// Lifetime artifact counters.
    pub fn cleanup_stats(&self) -> CleanupStats {
        self.ctx.cleanup.stats()
    }

    /// Jobs currently holding a slot.
    pub fn running(&self) -> usize {
        self.ctx.active.len()
    }

    pub fn config(&self) -> &WorkerConfig {
        &self.ctx.config
    }

    /// Stop accepting work, abort in-flight invocations, wait for the slots
    /// to drain, then write a final snapshot.
    ///
    /// Jobs still queued stay `queued` in the snapshot and are re-enqueued on
    /// the next start.
    pub async fn shutdown(self) -> WorkerResult<()> {
        info!("Shutting down clip engine");
        self.ctx.intake.close();
        let _ = self.shutdown.send(true);

        let aborted = self.ctx.active.abort_all(AbortReason::Shutdown);
        if aborted > 0 {
            info!("Aborted {} in-flight jobs", aborted);
        }
        if !self.pool.join(self.ctx.config.shutdown_timeout).await {
            warn!("Shutdown timed out with jobs still running");
        }
        if let Err(e) = self.watchdog.await {
            warn!("Watchdog task ended abnormally: {}", e);
        }

        if let Some(path) = &self.ctx.config.snapshot_path {
            StoreSnapshot::capture(&self.ctx.store).write_to(path).await?;
            info!("Wrote final job snapshot to {}", path.display());
        }
        info!("Clip engine stopped");
        Ok(())
    }
}

/// Load a snapshot into a fresh store.
async fn restore(ctx: &ProcessingContext, path: &Path) -> WorkerResult<()> {
    let Some(snapshot) = StoreSnapshot::read_from(path).await? else {
        return Ok(());
    };

    let mut requeued = 0;
    let mut interrupted = 0;
    let mut jobs = snapshot.jobs;
    jobs.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));

    for mut job in jobs {
        let artifacts = std::mem::take(&mut job.artifacts);
        let transition = match job.status {
            JobStatus::Running => {
                interrupted += 1;
                job.fail(ErrorDetail::new(
                    ErrorKind::Interrupted,
                    "worker restarted while the job was running",
                ))
            }
            JobStatus::Canceling => job.cancel(),
            _ => Ok(()),
        };
        if let Err(e) = transition {
            warn!(job_id = %job.id, "Skipping restored job: {}", e);
            continue;
        }

        let id = job.id.clone();
        let queued = job.status == JobStatus::Queued;
        ctx.store.insert(job)?;
        if !artifacts.is_empty() {
            ctx.cleanup.release_paths(&id, &artifacts).await;
        }
        if queued {
            ctx.intake.push(id)?;
            requeued += 1;
        }
    }

    info!(
        restored = ctx.store.len(),
        requeued,
        interrupted,
        "Restored jobs from {}",
        path.display()
    );
    Ok(())
}
