//! Engine metrics. Recorded through the `metrics` facade; a binary installs
//! the exporter.

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const JOBS_SUBMITTED_TOTAL: &str = "reelcut_jobs_submitted_total";
    pub const JOBS_REJECTED_TOTAL: &str = "reelcut_jobs_rejected_total";
    pub const JOBS_FINISHED_TOTAL: &str = "reelcut_jobs_finished_total";
    pub const JOBS_RUNNING: &str = "reelcut_jobs_running";
    pub const JOBS_QUEUED: &str = "reelcut_jobs_queued";
    pub const JOB_DURATION_SECONDS: &str = "reelcut_job_duration_seconds";
    pub const TOOL_DURATION_SECONDS: &str = "reelcut_tool_duration_seconds";
    pub const CLEANUP_DELETIONS_TOTAL: &str = "reelcut_cleanup_deletions_total";
    pub const CLEANUP_FAILURES_TOTAL: &str = "reelcut_cleanup_failures_total";
    pub const STALLED_JOBS_TOTAL: &str = "reelcut_stalled_jobs_total";
    pub const JOBS_EVICTED_TOTAL: &str = "reelcut_jobs_evicted_total";
    pub const INVARIANT_VIOLATIONS_TOTAL: &str = "reelcut_invariant_violations_total";
}

pub fn record_job_submitted(kind: &str) {
    counter!(names::JOBS_SUBMITTED_TOTAL, "kind" => kind.to_string()).increment(1);
}

pub fn record_job_rejected() {
    counter!(names::JOBS_REJECTED_TOTAL).increment(1);
}

/// Record a job reaching `state` after `duration_secs` of execution.
pub fn record_job_finished(kind: &str, state: &str, duration_secs: f64) {
    let labels = [("kind", kind.to_string()), ("state", state.to_string())];
    counter!(names::JOBS_FINISHED_TOTAL, &labels).increment(1);
    histogram!(names::JOB_DURATION_SECONDS, &labels).record(duration_secs);
}

pub fn set_running_jobs(count: usize) {
    gauge!(names::JOBS_RUNNING).set(count as f64);
}

pub fn set_queued_jobs(count: usize) {
    gauge!(names::JOBS_QUEUED).set(count as f64);
}

pub fn record_tool_duration(operation: &str, duration_secs: f64) {
    histogram!(names::TOOL_DURATION_SECONDS, "operation" => operation.to_string()).record(duration_secs);
}

pub fn record_cleanup(deleted: u64, failed: u64) {
    if deleted > 0 {
        counter!(names::CLEANUP_DELETIONS_TOTAL).increment(deleted);
    }
    if failed > 0 {
        counter!(names::CLEANUP_FAILURES_TOTAL).increment(failed);
    }
}

pub fn record_stalled_job() {
    counter!(names::STALLED_JOBS_TOTAL).increment(1);
}

pub fn record_evicted(count: usize) {
    counter!(names::JOBS_EVICTED_TOTAL).increment(count as u64);
}

pub fn record_invariant_violation(what: &'static str) {
    counter!(names::INVARIANT_VIOLATIONS_TOTAL, "what" => what).increment(1);
}
