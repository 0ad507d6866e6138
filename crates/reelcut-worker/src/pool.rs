//! Fixed-size pool of worker slots consuming the intake queue.

use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, error, info, warn, Instrument};

use reelcut_media::{ProgressSender, ToolContext};
use reelcut_models::{ErrorDetail, ErrorKind, JobId, JobOutput, JobStatus};
use reelcut_queue::StoreError;

use crate::active::AbortReason;
use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::metrics;
use crate::pipeline;

/// Worker slot tasks. Each slot runs one job at a time, so at most
/// `max_concurrent_jobs` jobs are running.
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `config.max_concurrent_jobs` slots.
    pub fn spawn(ctx: Arc<ProcessingContext>) -> Self {
        let slots = ctx.config.max_concurrent_jobs.max(1);
        info!("Starting worker pool with {} slots", slots);
        let handles = (0..slots)
            .map(|slot| tokio::spawn(slot_loop(Arc::clone(&ctx), slot)))
            .collect();
        Self { handles }
    }

    pub fn slots(&self) -> usize {
        self.handles.len()
    }

    /// Wait for every slot to exit. Slots still running after `timeout` are
    /// aborted; returns whether all exited in time.
    pub async fn join(self, timeout: Duration) -> bool {
        let aborts: Vec<_> = self.handles.iter().map(|h| h.abort_handle()).collect();
        match tokio::time::timeout(timeout, futures::future::join_all(self.handles)).await {
            Ok(_) => true,
            Err(_) => {
                warn!("Worker slots did not drain within {:?}, aborting", timeout);
                for abort in aborts {
                    abort.abort();
                }
                false
            }
        }
    }
}

async fn slot_loop(ctx: Arc<ProcessingContext>, slot: usize) {
    debug!(slot, "Worker slot started");
    while let Some(id) = ctx.intake.pop().await {
        metrics::set_queued_jobs(ctx.intake.len());
        run_one(&ctx, slot, id).await;
    }
    debug!(slot, "Worker slot stopped");
}

async fn run_one(ctx: &Arc<ProcessingContext>, slot: usize, id: JobId) {
    // Registered before the claim so a cancel that sees `running` always
    // finds a handle to signal.
    let Some(cancel) = ctx.active.register(&id) else {
        error!(job_id = %id, slot, "Job dispatched while already active, skipping");
        metrics::record_invariant_violation("double_dispatch");
        return;
    };

    let claimed = ctx.store.update(&id, |job| {
        if job.status != JobStatus::Queued {
            return Ok(None);
        }
        job.start()?;
        Ok::<_, WorkerError>(Some(job.clone()))
    });
    let job = match claimed {
        Ok(Some(job)) => job,
        Ok(None) => {
            ctx.active.unregister(&id);
            debug!(job_id = %id, "Job no longer queued, skipping");
            return;
        }
        Err(e) => {
            ctx.active.unregister(&id);
            warn!(job_id = %id, "Failed to claim job: {}", e);
            return;
        }
    };

    let logger = JobLogger::new(&id, job.kind);
    logger.log_start(slot);
    metrics::set_running_jobs(ctx.active.len());
    let started = Instant::now();

    let (progress, mut progress_rx) = ProgressSender::channel();
    let forwarder = {
        let store = Arc::clone(&ctx.store);
        let id = id.clone();
        // Ends once every progress sender is dropped.
        tokio::spawn(async move {
            while progress_rx.changed().await.is_ok() {
                let fraction = *progress_rx.borrow_and_update();
                let _ = store.update(&id, |job| {
                    job.record_progress(fraction);
                    Ok::<(), StoreError>(())
                });
            }
        })
    };

    let tool_ctx = ToolContext::new(cancel, progress);
    let task_ctx = Arc::clone(ctx);
    let handle = tokio::spawn(
        async move {
            let scope = task_ctx.cleanup.scope(&job.id);
            let result = pipeline::run(&task_ctx, &job, &scope, &tool_ctx).await;
            drop(tool_ctx);
            scope.release().await;
            result
        }
        .instrument(logger.span()),
    );

    // A panic in the pipeline surfaces here as a JoinError.
    let outcome = handle.await;
    if forwarder.await.is_err() {
        warn!(job_id = %id, "Progress forwarder stopped unexpectedly");
    }
    ctx.cleanup.release(&id).await;
    let reason = ctx.active.unregister(&id);

    finalize(ctx, &logger, &id, outcome, reason, started).await;
    metrics::set_running_jobs(ctx.active.len());
}

/// Terminal transition the pipeline outcome asks for.
enum Verdict {
    Complete(JobOutput),
    Cancel,
    Fail(ErrorDetail),
}

fn verdict(
    ctx: &ProcessingContext,
    logger: &JobLogger,
    outcome: Result<WorkerResult<JobOutput>, JoinError>,
    reason: Option<AbortReason>,
) -> Verdict {
    match outcome {
        Ok(Ok(output)) => Verdict::Complete(output),
        Ok(Err(e)) if e.is_canceled() => match reason {
            Some(AbortReason::Stalled) => {
                logger.log_error("stalled, invocation aborted");
                Verdict::Fail(ErrorDetail::new(
                    ErrorKind::Timeout,
                    format!("no progress for {}s", ctx.config.stall_timeout.as_secs()),
                ))
            }
            Some(AbortReason::Shutdown) => Verdict::Fail(ErrorDetail::new(
                ErrorKind::Interrupted,
                "engine shut down while the job was running",
            )),
            _ => Verdict::Cancel,
        },
        Ok(Err(e)) => {
            if matches!(e, WorkerError::InternalInvariantViolation(_)) {
                metrics::record_invariant_violation("pipeline");
            }
            logger.log_error(&e.to_string());
            Verdict::Fail(e.error_detail())
        }
        Err(join_error) => {
            logger.log_error(&format!("pipeline task aborted: {}", join_error));
            Verdict::Fail(ErrorDetail::new(
                ErrorKind::Internal,
                format!("media pipeline crashed: {}", join_error),
            ))
        }
    }
}

/// Record the terminal state. A job in `canceling` always ends `canceled`;
/// clips a completed pipeline already stored are then deleted again.
async fn finalize(
    ctx: &ProcessingContext,
    logger: &JobLogger,
    id: &JobId,
    outcome: Result<WorkerResult<JobOutput>, JoinError>,
    reason: Option<AbortReason>,
    started: Instant,
) {
    let verdict = verdict(ctx, logger, outcome, reason);
    let result = ctx.store.update(id, |job| {
        if job.status == JobStatus::Canceling {
            job.cancel()?;
            let discarded = match verdict {
                Verdict::Complete(output) => Some(output),
                _ => None,
            };
            return Ok((job.status, job.kind, discarded));
        }
        match verdict {
            Verdict::Complete(output) => job.complete(output)?,
            Verdict::Cancel => job.cancel()?,
            Verdict::Fail(detail) => job.fail(detail)?,
        }
        Ok::<_, WorkerError>((job.status, job.kind, None))
    });

    let elapsed = started.elapsed().as_secs_f64();
    match result {
        Ok((status, kind, discarded)) => {
            if let Some(output) = discarded {
                info!(job_id = %id, clips = output.clips.len(), "Canceled after completion, discarding output");
                pipeline::discard_clips(ctx, id, &output.clips).await;
            }
            logger.log_finished(status.as_str(), elapsed);
            metrics::record_job_finished(kind.as_str(), status.as_str(), elapsed);
        }
        Err(e) => {
            error!(job_id = %id, "Failed to record terminal state: {}", e);
            metrics::record_invariant_violation("finalize");
        }
    }
}
