//! FFmpeg CLI adapter for clip jobs.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - A process runner with hard timeout and cancellation
//! - Progress parsing from `-progress pipe:2`
//! - Probing, trimming and scene boundary scanning
//! - The [`MediaTool`] trait the worker pool executes against

pub mod cancel;
pub mod command;
pub mod error;
pub mod probe;
pub mod progress;
pub mod scene;
pub mod tool;
pub mod trim;

pub use cancel::{CancelHandle, CancelSignal};
pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, ToolRunner};
pub use error::{ToolError, ToolResult};
pub use probe::{probe_video, VideoInfo};
pub use progress::{FfmpegProgress, ProgressSender};
pub use tool::{FfmpegTool, MediaTool, SceneRequest, TimeoutPolicy, ToolContext, TrimRequest};
