//! Job definitions and the transitions that mutate them.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

use crate::{JobOutput, JobStatus, TransitionError};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type of job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    /// Trim one explicit `[start, end)` range
    ManualClip,
    /// Detect scene boundaries only
    SceneDetect,
    /// Detect scenes, then trim one clip per selected scene
    SceneClip,
}

impl JobKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobKind::ManualClip => "manual-clip",
            JobKind::SceneDetect => "scene-detect",
            JobKind::SceneClip => "scene-clip",
        }
    }

    /// Whether the kind needs a scene detection pass.
    pub fn detects_scenes(&self) -> bool {
        matches!(self, JobKind::SceneDetect | JobKind::SceneClip)
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validated reference to a local input file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InputRef {
    pub path: PathBuf,
    pub size_bytes: u64,
    pub mime_type: String,
}

/// Manual clip bounds in seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipRange {
    pub start: f64,
    pub end: f64,
}

impl ClipRange {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Default scene change threshold passed to the detector.
pub const DEFAULT_SCENE_SENSITIVITY: f64 = 0.3;

/// Scene detection and selection options.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneOptions {
    /// Scene change threshold in `(0, 1)`; lower finds more cuts
    #[serde(default = "default_sensitivity")]
    pub sensitivity: f64,

    /// Scenes shorter than this (seconds) are merged into their predecessor
    #[serde(default)]
    pub min_scene_len: f64,

    /// Clip only the K longest scenes (scene-clip)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_scenes: Option<usize>,
}

fn default_sensitivity() -> f64 {
    DEFAULT_SCENE_SENSITIVITY
}

impl Default for SceneOptions {
    fn default() -> Self {
        Self {
            sensitivity: DEFAULT_SCENE_SENSITIVITY,
            min_scene_len: 0.0,
            max_scenes: None,
        }
    }
}

/// Classification of a job failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Clip bounds fall outside the probed source
    InvalidRange,
    /// Tool invocation or stall timeout
    Timeout,
    /// Tool exited non-zero or produced malformed output
    ExecutionFailed,
    /// Storage collaborator failure
    Storage,
    /// Process stopped while the job was running
    Interrupted,
    /// Invariant violation or unexpected panic
    Internal,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidRange => "invalid_range",
            ErrorKind::Timeout => "timeout",
            ErrorKind::ExecutionFailed => "execution_failed",
            ErrorKind::Storage => "storage",
            ErrorKind::Interrupted => "interrupted",
            ErrorKind::Internal => "internal",
        }
    }
}

/// Error detail carried by a failed job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ErrorDetail {
    pub kind: ErrorKind,
    pub message: String,
}

impl ErrorDetail {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ErrorDetail {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind.as_str(), self.message)
    }
}

/// A unit of clip work tracked by the job store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Job {
    /// Unique job ID
    pub id: JobId,

    /// Job kind
    pub kind: JobKind,

    /// Source file
    pub input: InputRef,

    /// Clip bounds (manual-clip only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub range: Option<ClipRange>,

    /// Scene options (scene kinds only)
    #[serde(default)]
    pub scene_options: SceneOptions,

    /// Storage key prefix for produced clips
    pub output_prefix: String,

    /// Current status
    #[serde(default)]
    pub status: JobStatus,

    /// Progress fraction in `[0, 1]`
    #[serde(default)]
    pub progress: f64,

    /// Present only when `status == failed`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,

    /// Present only when `status == done`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<JobOutput>,

    /// Probed source duration in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_duration: Option<f64>,

    /// Temporary files owned by this job
    #[serde(default)]
    pub artifacts: Vec<PathBuf>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Last time the running job reported progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_progress_at: Option<DateTime<Utc>>,

    /// Incremented on every store write to this record
    #[serde(default)]
    pub event_seq: u64,
}

impl Job {
    /// Create a queued job.
    pub fn new(kind: JobKind, input: InputRef) -> Self {
        let id = JobId::new();
        let now = Utc::now();
        Self {
            output_prefix: id.to_string(),
            id,
            kind,
            input,
            range: None,
            scene_options: SceneOptions::default(),
            status: JobStatus::Queued,
            progress: 0.0,
            error: None,
            output: None,
            source_duration: None,
            artifacts: Vec::new(),
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            last_progress_at: None,
            event_seq: 0,
        }
    }

    /// Set the manual clip range.
    pub fn with_range(mut self, range: ClipRange) -> Self {
        self.range = Some(range);
        self
    }

    /// Set scene options.
    pub fn with_scene_options(mut self, options: SceneOptions) -> Self {
        self.scene_options = options;
        self
    }

    /// Override the output key prefix.
    pub fn with_output_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.output_prefix = prefix.into();
        self
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    fn transition(&mut self, next: JobStatus) -> Result<(), TransitionError> {
        if !self.status.can_transition_to(next) {
            return Err(TransitionError {
                from: self.status,
                to: next,
            });
        }
        let now = Utc::now();
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.finished_at = Some(now);
        }
        Ok(())
    }

    /// Claim the job for a worker slot.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(self.updated_at);
        self.last_progress_at = Some(self.updated_at);
        Ok(())
    }

    /// Record progress. Values are clamped to `[0, 1]` and never move backwards.
    ///
    /// Returns whether the stored progress changed.
    pub fn record_progress(&mut self, fraction: f64) -> bool {
        if !self.status.is_active() || fraction.is_nan() {
            return false;
        }
        let now = Utc::now();
        self.last_progress_at = Some(now);
        let fraction = fraction.clamp(0.0, 1.0);
        if fraction > self.progress {
            self.progress = fraction;
            self.updated_at = now;
            true
        } else {
            false
        }
    }

    /// Move a running job to `canceling`.
    pub fn request_cancel(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Canceling)
    }

    /// Mark as done with its output.
    pub fn complete(&mut self, output: JobOutput) -> Result<(), TransitionError> {
        self.transition(JobStatus::Done)?;
        self.progress = 1.0;
        self.output = Some(output);
        Ok(())
    }

    /// Mark as failed with an error detail.
    pub fn fail(&mut self, detail: ErrorDetail) -> Result<(), TransitionError> {
        self.transition(JobStatus::Failed)?;
        self.error = Some(detail);
        Ok(())
    }

    /// Mark as canceled.
    pub fn cancel(&mut self) -> Result<(), TransitionError> {
        self.transition(JobStatus::Canceled)
    }

    /// Register a temporary artifact owned by this job.
    pub fn track_artifact(&mut self, path: PathBuf) {
        if !self.artifacts.contains(&path) {
            self.artifacts.push(path);
        }
    }

    /// Forget an artifact once it has been removed.
    pub fn untrack_artifact(&mut self, path: &std::path::Path) {
        self.artifacts.retain(|p| p != path);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ClipOutput, StorageRef};

    fn input() -> InputRef {
        InputRef {
            path: PathBuf::from("/tmp/in.mp4"),
            size_bytes: 1024,
            mime_type: "video/mp4".to_string(),
        }
    }

    #[test]
    fn test_job_id_generation() {
        let id1 = JobId::new();
        let id2 = JobId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn test_new_job_is_queued() {
        let job = Job::new(JobKind::ManualClip, input());
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.progress, 0.0);
        assert_eq!(job.output_prefix, job.id.to_string());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_progress_is_monotonic_and_clamped() {
        let mut job = Job::new(JobKind::SceneDetect, input());
        assert!(!job.record_progress(0.5), "queued jobs ignore progress");
        job.start().unwrap();
        assert!(job.record_progress(0.4));
        assert!(!job.record_progress(0.2));
        assert_eq!(job.progress, 0.4);
        assert!(!job.record_progress(f64::NAN));
        assert!(job.record_progress(7.0));
        assert_eq!(job.progress, 1.0);
    }

    #[test]
    fn test_complete_sets_output_and_full_progress() {
        let mut job = Job::new(JobKind::ManualClip, input());
        job.start().unwrap();
        let clip = ClipOutput {
            scene_index: None,
            start: 2.0,
            end: 5.0,
            location: StorageRef {
                key: "a/clip.mp4".into(),
                uri: "/out/a/clip.mp4".into(),
            },
        };
        job.complete(JobOutput::single_clip(clip)).unwrap();
        assert_eq!(job.status, JobStatus::Done);
        assert_eq!(job.progress, 1.0);
        assert!(job.output.is_some());
        assert!(job.finished_at.is_some());
    }

    #[test]
    fn test_terminal_job_rejects_transitions() {
        let mut job = Job::new(JobKind::ManualClip, input());
        job.cancel().unwrap();
        let err = job.start().unwrap_err();
        assert_eq!(err.from, JobStatus::Canceled);
        assert!(job
            .fail(ErrorDetail::new(ErrorKind::Internal, "late"))
            .is_err());
        assert!(job.error.is_none());
    }

    #[test]
    fn test_cancel_path_through_canceling() {
        let mut job = Job::new(JobKind::SceneClip, input());
        job.start().unwrap();
        job.request_cancel().unwrap();
        assert!(job.record_progress(0.3), "canceling still accepts progress");
        job.cancel().unwrap();
        assert_eq!(job.status, JobStatus::Canceled);
    }

    #[test]
    fn test_job_serde_round_trip_keeps_error_detail() {
        let mut job = Job::new(JobKind::ManualClip, input()).with_range(ClipRange { start: 1.0, end: 2.5 });
        job.track_artifact(PathBuf::from("/tmp/work/a.mp4"));
        job.start().unwrap();
        job.fail(ErrorDetail::new(ErrorKind::Timeout, "no progress for 300s"))
            .unwrap();

        let json = serde_json::to_string(&job).unwrap();
        let back: Job = serde_json::from_str(&json).unwrap();
        assert_eq!(back, job);
        assert!(json.contains("\"manual-clip\""));
        assert!(json.contains("\"timeout\""));
    }
}
