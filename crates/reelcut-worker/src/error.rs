//! Worker error types.

use thiserror::Error;

use reelcut_media::ToolError;
use reelcut_models::{ErrorDetail, ErrorKind, JobId, JobStatus, TransitionError, ValidationError};
use reelcut_queue::StoreError;
use reelcut_storage::StorageError;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Invalid request: {0}")]
    InvalidRequest(#[from] ValidationError),

    #[error("Job not found: {0}")]
    NotFound(JobId),

    #[error("Job {0} already reached a terminal state")]
    AlreadyTerminal(JobId),

    #[error("Job {0} is {1}; only terminal jobs can be acknowledged")]
    NotTerminal(JobId, JobStatus),

    #[error("Clip range out of bounds: {0}")]
    InvalidRange(String),

    #[error("Internal invariant violated: {0}")]
    InternalInvariantViolation(String),

    #[error("Engine is shutting down")]
    ShuttingDown,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error("Media tool error: {0}")]
    Media(#[from] ToolError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Store error: {0}")]
    Store(StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for WorkerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => WorkerError::NotFound(id),
            StoreError::NotTerminal(id, status) => WorkerError::NotTerminal(id, status),
            StoreError::InvalidTransition(t) => WorkerError::Transition(t),
            StoreError::Closed => WorkerError::ShuttingDown,
            other => WorkerError::Store(other),
        }
    }
}

impl WorkerError {
    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InternalInvariantViolation(msg.into())
    }

    pub fn invalid_range(msg: impl Into<String>) -> Self {
        Self::InvalidRange(msg.into())
    }

    /// Whether the error is the tool observing a cancellation request.
    pub fn is_canceled(&self) -> bool {
        matches!(self, WorkerError::Media(ToolError::Canceled))
    }

    /// Error detail recorded on a failed job.
    pub fn error_detail(&self) -> ErrorDetail {
        let kind = match self {
            WorkerError::Media(ToolError::Timeout(_)) => ErrorKind::Timeout,
            WorkerError::Media(_) => ErrorKind::ExecutionFailed,
            WorkerError::Storage(_) => ErrorKind::Storage,
            WorkerError::InvalidRange(_) => ErrorKind::InvalidRange,
            _ => ErrorKind::Internal,
        };
        let message = match self {
            WorkerError::Media(e) => e.detail(),
            other => other.to_string(),
        };
        ErrorDetail::new(kind, message)
    }
}
