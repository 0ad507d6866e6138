//! FFmpeg command builder and process runner.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Split};
use tokio::process::{ChildStderr, Command};
use tracing::{debug, info, warn};

use crate::cancel::CancelSignal;
use crate::error::{ToolError, ToolResult};

/// Number of stderr lines kept for error reports.
const STDERR_TAIL_LINES: usize = 20;

/// Deadline used when no timeout is configured.
const NO_DEADLINE: Duration = Duration::from_secs(365 * 24 * 3600);

/// Builder for FFmpeg commands.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    input: PathBuf,
    /// Output path, or `-` for the null muxer
    output: String,
    /// Arguments placed before `-i`
    input_args: Vec<String>,
    /// Arguments placed after `-i`
    output_args: Vec<String>,
    /// Forced output format (`-f`)
    format: Option<String>,
    overwrite: bool,
    log_level: String,
}

impl FfmpegCommand {
    /// Create a command writing to a file.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self::with_output(input, output.as_ref().to_string_lossy().to_string())
    }

    /// Create a command that decodes the input and discards the result.
    pub fn null_sink(input: impl AsRef<Path>) -> Self {
        Self::with_output(input, "-".to_string()).format("null")
    }

    fn with_output(input: impl AsRef<Path>, output: String) -> Self {
        Self {
            input: input.as_ref().to_path_buf(),
            output,
            input_args: Vec::new(),
            output_args: Vec::new(),
            format: None,
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Add input arguments (before -i).
    pub fn input_arg(mut self, arg: impl Into<String>) -> Self {
        self.input_args.push(arg.into());
        self
    }

    /// Add output arguments (after -i).
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set seek position (before input).
    pub fn seek(self, seconds: f64) -> Self {
        self.input_arg("-ss").input_arg(format!("{:.3}", seconds))
    }

    /// Limit the amount of input read.
    pub fn duration(self, seconds: f64) -> Self {
        self.input_arg("-t").input_arg(format!("{:.3}", seconds))
    }

    /// Set video filter.
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Set video codec.
    pub fn video_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:v").output_arg(codec)
    }

    /// Set audio codec.
    pub fn audio_codec(self, codec: impl Into<String>) -> Self {
        self.output_arg("-c:a").output_arg(codec)
    }

    /// Set CRF (quality).
    pub fn crf(self, crf: u8) -> Self {
        self.output_arg("-crf").output_arg(crf.to_string())
    }

    /// Set preset.
    pub fn preset(self, preset: impl Into<String>) -> Self {
        self.output_arg("-preset").output_arg(preset)
    }

    /// Set audio bitrate.
    pub fn audio_bitrate(self, bitrate: impl Into<String>) -> Self {
        self.output_arg("-b:a").output_arg(bitrate)
    }

    /// Drop the audio stream.
    pub fn no_audio(self) -> Self {
        self.output_arg("-an")
    }

    /// Force the output format.
    pub fn format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }
        args.push("-nostdin".to_string());
        args.push("-hide_banner".to_string());

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        // Progress output to stderr
        args.push("-progress".to_string());
        args.push("pipe:2".to_string());

        args.extend(self.input_args.iter().cloned());

        args.push("-i".to_string());
        args.push(self.input.to_string_lossy().to_string());

        args.extend(self.output_args.iter().cloned());

        if let Some(format) = &self.format {
            args.push("-f".to_string());
            args.push(format.clone());
        }
        args.push(self.output.clone());
        args
    }
}

/// Runs external tool processes with a hard timeout and cooperative cancellation.
///
/// Every stderr line is handed to the caller as it arrives; the last lines are
/// kept for the error report when the process exits non-zero. The child is
/// killed when the timeout elapses, when cancellation is requested, or when the
/// run future is dropped.
#[derive(Debug, Clone)]
pub struct ToolRunner {
    program: String,
    cancel: Option<CancelSignal>,
    timeout: Option<Duration>,
}

enum Wake {
    /// `None` once stderr is closed or unreadable
    Line(Option<String>),
    Exited(std::io::Result<ExitStatus>),
    TimedOut,
    Canceled,
}

impl ToolRunner {
    /// Runner for the given executable.
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            cancel: None,
            timeout: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel: CancelSignal) -> Self {
        self.cancel = Some(cancel);
        self
    }

    /// Set wall-clock timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Run an FFmpeg command, handing each stderr line to `on_line`.
    pub async fn run_ffmpeg<F>(&self, cmd: &FfmpegCommand, on_line: F) -> ToolResult<()>
    where
        F: FnMut(&str) + Send,
    {
        self.run(cmd.build_args(), on_line).await
    }

    /// Run the program with `args`, handing each stderr line to `on_line`.
    pub async fn run<F>(&self, args: Vec<String>, mut on_line: F) -> ToolResult<()>
    where
        F: FnMut(&str) + Send,
    {
        let mut cancel = self.cancel.clone();
        if cancel.as_ref().is_some_and(CancelSignal::is_canceled) {
            return Err(ToolError::Canceled);
        }

        let program =
            which::which(&self.program).map_err(|_| ToolError::ToolNotFound(self.program.clone()))?;
        debug!("Running {} {}", self.program, args.join(" "));

        let mut child = Command::new(program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ToolError::execution_failed("stderr not captured", None, None))?;
        // Raw segments: ffmpeg echoes container tags in whatever encoding the
        // file carries, so lines are decoded lossily.
        let mut lines = Some(BufReader::new(stderr).split(b'\n'));
        let mut tail: VecDeque<String> = VecDeque::with_capacity(STDERR_TAIL_LINES);

        let deadline = tokio::time::sleep(self.timeout.unwrap_or(NO_DEADLINE));
        tokio::pin!(deadline);

        loop {
            let wake = tokio::select! {
                segment = next_segment(lines.as_mut()), if lines.is_some() => Wake::Line(segment),
                status = child.wait(), if lines.is_none() => Wake::Exited(status),
                _ = &mut deadline, if self.timeout.is_some() => Wake::TimedOut,
                _ = wait_canceled(cancel.as_mut()) => Wake::Canceled,
            };

            match wake {
                Wake::Line(Some(line)) => {
                    on_line(&line);
                    if tail.len() == STDERR_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line);
                }
                Wake::Line(None) => lines = None,
                Wake::Exited(status) => {
                    let status = status?;
                    if status.success() {
                        return Ok(());
                    }
                    let stderr = Vec::from(tail).join("\n");
                    return Err(ToolError::execution_failed(
                        format!("{} exited with {}", self.program, status),
                        Some(stderr),
                        status.code(),
                    ));
                }
                Wake::TimedOut => {
                    let secs = self.timeout.map(|t| t.as_secs()).unwrap_or_default();
                    warn!("{} timed out after {} seconds, killing process", self.program, secs);
                    let _ = child.kill().await;
                    return Err(ToolError::Timeout(secs));
                }
                Wake::Canceled => {
                    info!("{} canceled, killing process", self.program);
                    let _ = child.kill().await;
                    return Err(ToolError::Canceled);
                }
            }
        }
    }
}

async fn next_segment(lines: Option<&mut Split<BufReader<ChildStderr>>>) -> Option<String> {
    let lines = lines?;
    match lines.next_segment().await {
        Ok(Some(mut bytes)) => {
            if bytes.last() == Some(&b'\r') {
                bytes.pop();
            }
            Some(String::from_utf8_lossy(&bytes).into_owned())
        }
        Ok(None) => None,
        Err(e) => {
            debug!("stderr read failed, closing pipe: {}", e);
            None
        }
    }
}

async fn wait_canceled(cancel: Option<&mut CancelSignal>) {
    match cancel {
        Some(signal) => signal.canceled().await,
        None => std::future::pending().await,
    }
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> ToolResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| ToolError::ToolNotFound("ffmpeg".to_string()))
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> ToolResult<PathBuf> {
    which::which("ffprobe").map_err(|_| ToolError::ToolNotFound("ffprobe".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cancel::CancelHandle;

    #[test]
    fn test_command_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.mp4")
            .seek(10.0)
            .duration(30.0)
            .video_codec("libx264")
            .crf(18);

        let args = cmd.build_args();
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        let i = args.iter().position(|a| a == "-i").unwrap();
        assert!(ss < i, "seek must precede the input");
        assert_eq!(args[ss + 1], "10.000");
        assert!(args.contains(&"libx264".to_string()));
        assert_eq!(args.last().unwrap(), "output.mp4");
    }

    #[test]
    fn test_null_sink_builder() {
        let args = FfmpegCommand::null_sink("in.mp4").video_filter("showinfo").build_args();
        let tail: Vec<&str> = args.iter().rev().take(3).map(String::as_str).collect();
        assert_eq!(tail, vec!["-", "null", "-f"]);
    }

    fn sh(script: &str) -> Vec<String> {
        vec!["-c".to_string(), script.to_string()]
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_streams_stderr_lines() {
        let mut seen = Vec::new();
        ToolRunner::new("sh")
            .run(sh("echo one >&2; echo two >&2"), |l| seen.push(l.to_string()))
            .await
            .unwrap();
        assert_eq!(seen, vec!["one", "two"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_keeps_draining_after_invalid_utf8() {
        // One undecodable line, then well over a pipe buffer of output.
        let script = "printf '\\377\\376 tag\\n' >&2; i=0; \
            while [ $i -lt 4000 ]; do \
            echo 'frame=1 fps=25 q=28.0 size=1kB time=00:00:01.00 x' >&2; \
            i=$((i+1)); done; exit 0";
        let mut count = 0usize;
        let mut first = None;
        let started = std::time::Instant::now();
        ToolRunner::new("sh")
            .with_timeout(Duration::from_secs(5))
            .run(sh(script), |l| {
                if first.is_none() {
                    first = Some(l.to_string());
                }
                count += 1;
            })
            .await
            .unwrap();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert_eq!(count, 4001);
        let first = first.unwrap();
        assert!(first.contains('\u{FFFD}'));
        assert!(first.ends_with(" tag"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_reports_exit_code_and_stderr() {
        let err = ToolRunner::new("sh")
            .run(sh("echo broken input >&2; exit 3"), |_| {})
            .await
            .unwrap_err();
        match err {
            ToolError::ExecutionFailed { exit_code, stderr, .. } => {
                assert_eq!(exit_code, Some(3));
                assert!(stderr.unwrap().contains("broken input"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_times_out() {
        let err = ToolRunner::new("sh")
            .with_timeout(Duration::from_millis(100))
            .run(sh("sleep 5"), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout(_)));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_runner_cancel_kills_process() {
        let (handle, signal) = CancelHandle::new();
        let runner = ToolRunner::new("sh").with_cancel(signal);
        let task = tokio::spawn(async move { runner.run(sh("sleep 5"), |_| {}).await });
        tokio::time::sleep(Duration::from_millis(50)).await;
        handle.cancel();
        let res = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert!(res.unwrap_err().is_canceled());
    }

    #[tokio::test]
    async fn test_runner_precanceled_never_spawns() {
        let (handle, signal) = CancelHandle::new();
        handle.cancel();
        let err = ToolRunner::new("definitely-not-a-real-tool")
            .with_cancel(signal)
            .run(Vec::new(), |_| {})
            .await
            .unwrap_err();
        assert!(err.is_canceled());
    }

    #[tokio::test]
    async fn test_missing_program() {
        let err = ToolRunner::new("definitely-not-a-real-tool")
            .run(Vec::new(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::ToolNotFound(_)));
    }
}
