//! Status snapshot handed to presentation collaborators.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ErrorDetail, Job, JobId, JobKind, JobOutput, JobStatus};

/// Pull/push status view of a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StatusReport {
    pub job_id: JobId,
    pub kind: JobKind,
    pub state: JobStatus,
    pub progress: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,
    pub updated_at: DateTime<Utc>,
    pub event_seq: u64,
}

impl From<&Job> for StatusReport {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.id.clone(),
            kind: job.kind,
            state: job.status,
            progress: job.progress,
            error: job.error.clone(),
            output: job.output.clone(),
            updated_at: job.updated_at,
            event_seq: job.event_seq,
        }
    }
}
