//! Periodic housekeeping: stalled jobs, retention and snapshots.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use reelcut_models::JobStatus;
use reelcut_queue::StoreSnapshot;

use crate::active::AbortReason;
use crate::context::ProcessingContext;
use crate::metrics;
use crate::retry::LogThrottle;

/// Spawn the watchdog loop. It exits when `shutdown` becomes `true`.
pub fn spawn(ctx: Arc<ProcessingContext>, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(ctx.config.watchdog_interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut snapshot_log = LogThrottle::new("job snapshot", 3);

        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        debug!("Watchdog stopping");
                        break;
                    }
                }
                _ = interval.tick() => {
                    tick(&ctx, &mut snapshot_log).await;
                }
            }
        }
    })
}

/// One housekeeping pass.
pub async fn tick(ctx: &ProcessingContext, snapshot_log: &mut LogThrottle) {
    abort_stalled(ctx);
    evict_expired(ctx);

    if let Some(path) = &ctx.config.snapshot_path {
        match StoreSnapshot::capture(&ctx.store).write_to(path).await {
            Ok(()) => snapshot_log.succeeded(),
            Err(e) => {
                if snapshot_log.failed() {
                    warn!("Failed to write job snapshot to {}: {}", path.display(), e);
                }
            }
        }
    }

    metrics::set_queued_jobs(ctx.intake.len());
    metrics::set_running_jobs(ctx.active.len());
}

/// Abort running jobs that reported no progress within the stall timeout.
pub fn abort_stalled(ctx: &ProcessingContext) -> usize {
    let Ok(stall) = chrono::Duration::from_std(ctx.config.stall_timeout) else {
        return 0;
    };
    let cutoff = Utc::now() - stall;
    let mut aborted = 0;

    for job in ctx.store.with_status(JobStatus::Running) {
        let last = job.last_progress_at.or(job.started_at).unwrap_or(job.updated_at);
        if last > cutoff {
            continue;
        }
        if ctx.active.abort(&job.id, AbortReason::Stalled) {
            warn!(
                job_id = %job.id,
                last_progress = %last,
                progress = job.progress,
                "Job stalled, aborting invocation"
            );
            metrics::record_stalled_job();
            aborted += 1;
        }
    }
    aborted
}

fn evict_expired(ctx: &ProcessingContext) {
    let Ok(retention) = chrono::Duration::from_std(ctx.config.retention) else {
        return;
    };
    let evicted = ctx.store.evict_expired(retention, Utc::now());
    if evicted.is_empty() {
        return;
    }
    for id in &evicted {
        ctx.cleanup.forget(id);
    }
    metrics::record_evicted(evicted.len());
    info!("Evicted {} jobs past retention", evicted.len());
}
