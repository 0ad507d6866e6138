//! Job status and the transitions allowed between states.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Job processing status.
///
/// ```text
/// queued ──► running ──► done | failed | canceled
///    │          │
///    │          └──► canceling ──► canceled
///    └──► canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting in the intake queue for a worker slot
    #[default]
    Queued,
    /// Claimed by a worker slot and executing
    Running,
    /// Cancellation signalled, waiting for the tool to stop
    Canceling,
    /// Completed successfully
    Done,
    /// Failed with an error detail
    Failed,
    /// Canceled before or during execution
    Canceled,
}

impl JobStatus {
    /// Get string representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Canceling => "canceling",
            JobStatus::Done => "done",
            JobStatus::Failed => "failed",
            JobStatus::Canceled => "canceled",
        }
    }

    /// Check if this is a terminal state (no more updates expected).
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Failed | JobStatus::Canceled)
    }

    /// Check if a worker slot currently owns the job.
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Running | JobStatus::Canceling)
    }

    /// Whether the state machine permits moving from `self` to `next`.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Queued, Running)
                | (Queued, Canceled)
                | (Running, Canceling)
                | (Running, Done)
                | (Running, Failed)
                | (Running, Canceled)
                | (Canceling, Canceled)
        )
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Rejected state transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Invalid job transition {from} -> {to}")]
pub struct TransitionError {
    pub from: JobStatus,
    pub to: JobStatus,
}
