//! Store error types.

use thiserror::Error;

use reelcut_models::{JobId, JobStatus, TransitionError};

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job already exists: {0}")]
    AlreadyExists(JobId),

    #[error("Job {0} is {1}, not terminal")]
    NotTerminal(JobId, JobStatus),

    #[error(transparent)]
    InvalidTransition(#[from] TransitionError),

    #[error("Intake queue is closed")]
    Closed,

    #[error("Snapshot version {0} is not supported")]
    UnsupportedSnapshot(u32),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoreError {
    pub fn not_found(id: &JobId) -> Self {
        Self::NotFound(id.clone())
    }
}
