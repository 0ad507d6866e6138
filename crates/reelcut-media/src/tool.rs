//! The media tool adapter seam used by the worker pool.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use tracing::{debug, info};

use reelcut_models::{scenes_from_cuts, validate_scene_list, EncodingConfig, Scene, SceneOptions};

use crate::cancel::CancelSignal;
use crate::command::ToolRunner;
use crate::error::{ToolError, ToolResult};
use crate::probe::{probe_video, VideoInfo};
use crate::progress::{parse_progress_line, FfmpegProgress, ProgressSender};
use crate::scene::{parse_showinfo_pts, scene_scan_command};
use crate::trim::trim_command;

/// Wall-clock limit for one invocation, scaled from the media duration it covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimeoutPolicy {
    /// Multiple of the expected real-time duration
    pub multiplier: f64,
    /// Lower bound for short media
    pub floor: Duration,
}

impl Default for TimeoutPolicy {
    fn default() -> Self {
        Self {
            multiplier: 10.0,
            floor: Duration::from_secs(60),
        }
    }
}

impl TimeoutPolicy {
    pub fn for_media(&self, media_secs: f64) -> Duration {
        let scaled = media_secs * self.multiplier;
        if !scaled.is_finite() || scaled <= 0.0 {
            return self.floor;
        }
        Duration::from_secs_f64(scaled).max(self.floor)
    }
}

/// Per-invocation handles: cancellation in, progress out.
#[derive(Debug, Clone)]
pub struct ToolContext {
    pub cancel: CancelSignal,
    pub progress: ProgressSender,
}

impl ToolContext {
    pub fn new(cancel: CancelSignal, progress: ProgressSender) -> Self {
        Self { cancel, progress }
    }

    /// Same cancellation, progress scoped to a sub-range.
    pub fn scoped(&self, offset: f64, span: f64) -> Self {
        Self {
            cancel: self.cancel.clone(),
            progress: self.progress.scoped(offset, span),
        }
    }
}

/// One trim invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct TrimRequest {
    pub input: PathBuf,
    pub start: f64,
    pub end: f64,
    pub output: PathBuf,
}

/// One scene scan invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneRequest {
    pub input: PathBuf,
    /// Source duration in seconds, from a prior probe
    pub duration: f64,
    pub options: SceneOptions,
}

/// Long-running, cancelable media operations.
#[async_trait]
pub trait MediaTool: Send + Sync + 'static {
    /// Read duration and stream information.
    async fn probe(&self, input: &Path, cancel: &CancelSignal) -> ToolResult<VideoInfo>;

    /// Trim `[start, end)` of the input into `output`.
    async fn run_trim(&self, request: &TrimRequest, ctx: &ToolContext) -> ToolResult<PathBuf>;

    /// Detect scenes; the result is sorted and non-overlapping.
    async fn run_scene_detect(&self, request: &SceneRequest, ctx: &ToolContext) -> ToolResult<Vec<Scene>>;
}

/// [`MediaTool`] backed by the ffmpeg and ffprobe executables.
#[derive(Debug, Clone)]
pub struct FfmpegTool {
    ffmpeg: String,
    ffprobe: String,
    encoding: EncodingConfig,
    timeouts: TimeoutPolicy,
}

impl Default for FfmpegTool {
    fn default() -> Self {
        Self::new(EncodingConfig::default(), TimeoutPolicy::default())
    }
}

impl FfmpegTool {
    pub fn new(encoding: EncodingConfig, timeouts: TimeoutPolicy) -> Self {
        Self {
            ffmpeg: "ffmpeg".to_string(),
            ffprobe: "ffprobe".to_string(),
            encoding,
            timeouts,
        }
    }

    /// Use explicit executable names or paths.
    pub fn with_programs(mut self, ffmpeg: impl Into<String>, ffprobe: impl Into<String>) -> Self {
        self.ffmpeg = ffmpeg.into();
        self.ffprobe = ffprobe.into();
        self
    }

    fn runner(&self, media_secs: f64, cancel: &CancelSignal) -> ToolRunner {
        ToolRunner::new(self.ffmpeg.clone())
            .with_timeout(self.timeouts.for_media(media_secs))
            .with_cancel(cancel.clone())
    }
}

#[async_trait]
impl MediaTool for FfmpegTool {
    async fn probe(&self, input: &Path, cancel: &CancelSignal) -> ToolResult<VideoInfo> {
        probe_video(&self.ffprobe, input, self.timeouts.floor, cancel).await
    }

    async fn run_trim(&self, request: &TrimRequest, ctx: &ToolContext) -> ToolResult<PathBuf> {
        let length = request.end - request.start;
        if !(length > 0.0) || request.start < 0.0 {
            return Err(ToolError::execution_failed(
                format!("invalid trim range {:.3}..{:.3}", request.start, request.end),
                None,
                None,
            ));
        }
        if !tokio::fs::try_exists(&request.input).await.unwrap_or(false) {
            return Err(ToolError::FileNotFound(request.input.clone()));
        }
        if let Some(parent) = request.output.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        info!(
            "Trimming {} [{:.2}s..{:.2}s] -> {}",
            request.input.display(),
            request.start,
            request.end,
            request.output.display()
        );

        let started = Instant::now();
        let cmd = trim_command(&request.input, &request.output, request.start, request.end, &self.encoding);
        let mut current = FfmpegProgress::default();
        self.runner(length, &ctx.cancel)
            .run_ffmpeg(&cmd, |line| {
                if let Some(p) = parse_progress_line(line, &mut current) {
                    ctx.progress.report(p.fraction(length));
                }
            })
            .await?;

        let written = tokio::fs::metadata(&request.output)
            .await
            .map(|m| m.len())
            .unwrap_or(0);
        if written == 0 {
            return Err(ToolError::malformed_output("trim produced no output"));
        }

        ctx.progress.finish();
        debug!("Trim finished in {:?} ({} bytes)", started.elapsed(), written);
        Ok(request.output.clone())
    }

    async fn run_scene_detect(&self, request: &SceneRequest, ctx: &ToolContext) -> ToolResult<Vec<Scene>> {
        if !(request.duration > 0.0) || !request.duration.is_finite() {
            return Err(ToolError::malformed_output("source duration is unknown"));
        }
        if !tokio::fs::try_exists(&request.input).await.unwrap_or(false) {
            return Err(ToolError::FileNotFound(request.input.clone()));
        }

        info!(
            "Scanning {} for scenes (threshold {:.2})",
            request.input.display(),
            request.options.sensitivity
        );

        let duration = request.duration;
        let cmd = scene_scan_command(&request.input, request.options.sensitivity);
        let mut cuts = Vec::new();
        let mut current = FfmpegProgress::default();
        self.runner(duration, &ctx.cancel)
            .run_ffmpeg(&cmd, |line| {
                if let Some(pts) = parse_showinfo_pts(line) {
                    cuts.push(pts);
                } else if let Some(p) = parse_progress_line(line, &mut current) {
                    ctx.progress.report(p.fraction(duration));
                }
            })
            .await?;

        let scenes = scenes_from_cuts(&cuts, duration, request.options.min_scene_len);
        validate_scene_list(&scenes).map_err(|e| ToolError::malformed_output(e.to_string()))?;

        ctx.progress.finish();
        info!("Detected {} scenes from {} cuts", scenes.len(), cuts.len());
        Ok(scenes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelHandle;

    #[test]
    fn test_timeout_policy_scales_with_floor() {
        let policy = TimeoutPolicy {
            multiplier: 10.0,
            floor: Duration::from_secs(30),
        };
        assert_eq!(policy.for_media(1.0), Duration::from_secs(30));
        assert_eq!(policy.for_media(60.0), Duration::from_secs(600));
        assert_eq!(policy.for_media(f64::NAN), Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_trim_rejects_empty_range() {
        let tool = FfmpegTool::default();
        let (_handle, cancel) = CancelHandle::new();
        let ctx = ToolContext::new(cancel, ProgressSender::disabled());
        let req = TrimRequest {
            input: PathBuf::from("/nonexistent.mp4"),
            start: 5.0,
            end: 5.0,
            output: PathBuf::from("/tmp/out.mp4"),
        };
        assert!(matches!(
            tool.run_trim(&req, &ctx).await,
            Err(ToolError::ExecutionFailed { .. })
        ));
    }

    #[tokio::test]
    async fn test_scene_detect_requires_duration() {
        let tool = FfmpegTool::default();
        let ctx = ToolContext::new(CancelSignal::never(), ProgressSender::disabled());
        let req = SceneRequest {
            input: PathBuf::from("/nonexistent.mp4"),
            duration: 0.0,
            options: SceneOptions::default(),
        };
        assert!(matches!(
            tool.run_scene_detect(&req, &ctx).await,
            Err(ToolError::ExecutionFailed { .. })
        ));
    }

    /// Builds a 10s test pattern, trims 2..5 and checks the clip duration.
    #[tokio::test]
    #[ignore = "requires ffmpeg"]
    async fn test_trim_produces_expected_duration() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = dir.path().join("source.mp4");
        let status = tokio::process::Command::new("ffmpeg")
            .args(["-y", "-v", "error", "-f", "lavfi", "-i", "testsrc=duration=10:size=320x240:rate=25"])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .arg(&source)
            .status()
            .await
            .unwrap();
        assert!(status.success());

        let tool = FfmpegTool::default();
        let (sender, progress) = ProgressSender::channel();
        let ctx = ToolContext::new(CancelSignal::never(), sender);
        let output = dir.path().join("clip.mp4");
        let req = TrimRequest {
            input: source,
            start: 2.0,
            end: 5.0,
            output: output.clone(),
        };
        tool.run_trim(&req, &ctx).await.unwrap();

        let info = tool.probe(&output, &CancelSignal::never()).await.unwrap();
        assert!((info.duration - 3.0).abs() <= info.frame_duration() + 0.05, "got {}", info.duration);
        assert_eq!(*progress.borrow(), 1.0);
    }
}
