//! Shared data models for the reelcut clip pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Jobs, their kinds and the job state machine
//! - Submission requests and their validation
//! - Detected scenes
//! - Job outputs and storage references
//! - Encoding configuration and timestamp parsing

pub mod encoding;
pub mod job;
pub mod job_status;
pub mod output;
pub mod report;
pub mod request;
pub mod scene;
pub mod timestamp;

// Re-export common types
pub use encoding::EncodingConfig;
pub use job::{ClipRange, ErrorDetail, ErrorKind, InputRef, Job, JobId, JobKind, SceneOptions};
pub use job_status::{JobStatus, TransitionError};
pub use output::{ClipOutput, JobOutput, StorageRef};
pub use report::StatusReport;
pub use request::{ClipRequest, SceneOverrides, TimestampInput, ValidatedRequest, ValidationError, DEFAULT_ACCEPTED_MIME_TYPES};
pub use scene::{scenes_from_cuts, select_longest, validate_scene_list, Scene, SceneError};
pub use timestamp::{format_seconds, parse_timestamp, TimestampError};
