//! Job submission, cancellation and status queries.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use reelcut_models::{
    ClipRequest, InputRef, Job, JobId, JobStatus, StatusReport, ValidatedRequest, ValidationError,
};

use crate::active::AbortReason;
use crate::context::ProcessingContext;
use crate::error::{WorkerError, WorkerResult};
use crate::metrics;

/// Result of a successful cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// The job never ran and is now `canceled`.
    Canceled,
    /// The job is running; its tool invocation was signaled.
    Canceling,
}

/// Client-facing entry point. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    ctx: Arc<ProcessingContext>,
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher").finish_non_exhaustive()
    }
}

impl Dispatcher {
    pub fn new(ctx: Arc<ProcessingContext>) -> Self {
        Self { ctx }
    }

    /// Validate the upload collaborator's file and describe it as an input.
    pub async fn accept_upload(
        &self,
        local_path: impl AsRef<Path>,
        declared_type: &str,
        size_bytes: u64,
    ) -> WorkerResult<InputRef> {
        let mime_type = declared_type.trim().to_ascii_lowercase();
        if !self.ctx.config.accepted_mime_types.iter().any(|m| *m == mime_type) {
            return Err(ValidationError::UnsupportedMimeType(declared_type.to_string()).into());
        }
        let input = InputRef {
            path: local_path.as_ref().to_path_buf(),
            size_bytes,
            mime_type,
        };
        check_input_file(&input).await?;
        Ok(input)
    }

    /// Validate and enqueue a request.
    ///
    /// Nothing is created when validation fails.
    pub async fn submit(&self, request: ClipRequest) -> WorkerResult<JobId> {
        let validated = match self.validate(&request).await {
            Ok(v) => v,
            Err(e) => {
                metrics::record_job_rejected();
                debug!(kind = request.kind.as_str(), "Rejected request: {}", e);
                return Err(e);
            }
        };
        if self.ctx.intake.is_closed() {
            return Err(WorkerError::ShuttingDown);
        }

        let mut job = Job::new(validated.kind, validated.input).with_scene_options(validated.options);
        if let Some(range) = validated.range {
            job = job.with_range(range);
        }
        if let Some(prefix) = validated.output_prefix {
            job = job.with_output_prefix(prefix);
        }
        let id = job.id.clone();
        let kind = job.kind;

        self.ctx.store.insert(job)?;
        if let Err(e) = self.ctx.intake.push(id.clone()) {
            // Closed between the check and the push; leave no trace.
            let _ = self.ctx.store.update(&id, |job| job.cancel().map_err(WorkerError::from));
            let _ = self.ctx.store.remove_terminal(&id);
            return Err(e.into());
        }

        metrics::record_job_submitted(kind.as_str());
        metrics::set_queued_jobs(self.ctx.intake.len());
        info!(job_id = %id, kind = kind.as_str(), "Job submitted");
        Ok(id)
    }

    async fn validate(&self, request: &ClipRequest) -> WorkerResult<ValidatedRequest> {
        let validated = request.validate(&self.ctx.config.accepted_mime_types, &self.ctx.config.scene_defaults)?;
        check_input_file(&validated.input).await?;
        Ok(validated)
    }

    /// Request cancellation.
    ///
    /// A queued job is canceled immediately and never dispatched. A running
    /// job moves to `canceling` and reaches `canceled` once its tool
    /// invocation returns.
    pub fn cancel(&self, id: &JobId) -> WorkerResult<CancelOutcome> {
        let (status, kind) = self.ctx.store.update(id, |job| {
            match job.status {
                JobStatus::Queued => job.cancel()?,
                JobStatus::Running => job.request_cancel()?,
                JobStatus::Canceling => {}
                _ => return Err(WorkerError::AlreadyTerminal(job.id.clone())),
            }
            Ok((job.status, job.kind))
        })?;

        match status {
            JobStatus::Canceled => {
                self.ctx.intake.remove(id);
                metrics::record_job_finished(kind.as_str(), status.as_str(), 0.0);
                info!(job_id = %id, "Queued job canceled");
                Ok(CancelOutcome::Canceled)
            }
            _ => {
                if !self.ctx.active.abort(id, AbortReason::User) {
                    // Claimed but not yet registered, or already returning;
                    // the slot finalizes `canceling` as `canceled`.
                    warn!(job_id = %id, "No active invocation to signal");
                }
                info!(job_id = %id, "Cancellation requested");
                Ok(CancelOutcome::Canceling)
            }
        }
    }

    /// Current snapshot of a job.
    pub fn status(&self, id: &JobId) -> WorkerResult<Job> {
        Ok(self.ctx.store.get(id)?)
    }

    /// Current status report of a job.
    pub fn report(&self, id: &JobId) -> WorkerResult<StatusReport> {
        Ok(StatusReport::from(&self.ctx.store.get(id)?))
    }

    /// Every committed change to a job, starting from its current state.
    pub fn subscribe(&self, id: &JobId) -> WorkerResult<watch::Receiver<Job>> {
        Ok(self.ctx.store.subscribe(id)?)
    }

    /// All jobs, oldest first.
    pub fn list(&self) -> Vec<Job> {
        self.ctx.store.list()
    }

    /// Evict a terminal job now instead of waiting for retention.
    pub fn acknowledge(&self, id: &JobId) -> WorkerResult<Job> {
        let job = self.ctx.store.remove_terminal(id)?;
        self.ctx.cleanup.forget(id);
        debug!(job_id = %id, "Job acknowledged");
        Ok(job)
    }

    /// Number of jobs waiting for a slot.
    pub fn queued(&self) -> usize {
        self.ctx.intake.len()
    }

    /// Whether submissions are still accepted.
    pub fn is_accepting(&self) -> bool {
        !self.ctx.intake.is_closed()
    }
}

async fn check_input_file(input: &InputRef) -> Result<(), ValidationError> {
    let display = input.path.display().to_string();
    let meta = match tokio::fs::metadata(&input.path).await {
        Ok(meta) => meta,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(ValidationError::InputNotFound(display))
        }
        Err(_) => return Err(ValidationError::InputUnreadable(display)),
    };
    if !meta.is_file() {
        return Err(ValidationError::InputUnreadable(display));
    }
    if meta.len() == 0 {
        return Err(ValidationError::EmptyInput(display));
    }
    if input.size_bytes > 0 && input.size_bytes != meta.len() {
        return Err(ValidationError::SizeMismatch {
            declared: input.size_bytes,
            actual: meta.len(),
        });
    }
    tokio::fs::File::open(&input.path)
        .await
        .map_err(|_| ValidationError::InputUnreadable(display))?;
    Ok(())
}
