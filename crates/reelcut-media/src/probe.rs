//! FFprobe video information.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use crate::cancel::CancelSignal;
use crate::error::{ToolError, ToolResult};

/// Video file information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Frame rate (fps)
    pub fps: f64,
    /// Video codec
    pub codec: String,
    /// File size in bytes
    pub size: u64,
}

impl VideoInfo {
    /// Duration of one frame in seconds.
    pub fn frame_duration(&self) -> f64 {
        if self.fps > 0.0 {
            1.0 / self.fps
        } else {
            1.0 / 30.0
        }
    }
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
}

/// Probe a video file with `ffprobe`.
pub async fn probe_video(
    program: &str,
    path: &Path,
    timeout: Duration,
    cancel: &CancelSignal,
) -> ToolResult<VideoInfo> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Err(ToolError::FileNotFound(path.to_path_buf()));
    }
    if cancel.is_canceled() {
        return Err(ToolError::Canceled);
    }

    let program = which::which(program).map_err(|_| ToolError::ToolNotFound(program.to_string()))?;

    let child = Command::new(program)
        .args(["-v", "quiet", "-print_format", "json", "-show_format", "-show_streams"])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .output();

    let mut cancel = cancel.clone();
    let output = tokio::select! {
        res = tokio::time::timeout(timeout, child) => match res {
            Ok(output) => output?,
            Err(_) => return Err(ToolError::Timeout(timeout.as_secs())),
        },
        _ = cancel.canceled() => return Err(ToolError::Canceled),
    };

    if !output.status.success() {
        return Err(ToolError::execution_failed(
            "ffprobe failed",
            Some(String::from_utf8_lossy(&output.stderr).to_string()),
            output.status.code(),
        ));
    }

    parse_probe_output(&output.stdout)
}

/// Interpret ffprobe's JSON output.
pub fn parse_probe_output(stdout: &[u8]) -> ToolResult<VideoInfo> {
    let probe: FfprobeOutput = serde_json::from_slice(stdout)
        .map_err(|e| ToolError::malformed_output(format!("unreadable ffprobe output: {}", e)))?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| ToolError::malformed_output("No video stream found"))?;

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    let fps = video_stream
        .avg_frame_rate
        .as_deref()
        .and_then(parse_frame_rate)
        .or_else(|| video_stream.r_frame_rate.as_deref().and_then(parse_frame_rate))
        .unwrap_or(30.0);

    Ok(VideoInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        fps,
        codec: video_stream.codec_name.clone().unwrap_or_default(),
        size,
    })
}

/// Parse frame rate string (e.g., "30/1" or "29.97").
fn parse_frame_rate(s: &str) -> Option<f64> {
    let rate = if let Some((num, den)) = s.split_once('/') {
        let num: f64 = num.parse().ok()?;
        let den: f64 = den.parse().ok()?;
        if den <= 0.0 {
            return None;
        }
        num / den
    } else {
        s.parse().ok()?
    };
    (rate > 0.0 && rate.is_finite()).then_some(rate)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_frame_rate() {
        assert!((parse_frame_rate("30/1").unwrap() - 30.0).abs() < 0.01);
        assert!((parse_frame_rate("30000/1001").unwrap() - 29.97).abs() < 0.01);
        assert!((parse_frame_rate("29.97").unwrap() - 29.97).abs() < 0.01);
        assert!(parse_frame_rate("0/0").is_none());
    }

    #[test]
    fn test_parse_probe_output() {
        let json = br#"{
            "streams": [
                {"codec_type": "audio", "codec_name": "aac"},
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720,
                 "avg_frame_rate": "0/0", "r_frame_rate": "25/1"}
            ],
            "format": {"duration": "10.040000", "size": "123456"}
        }"#;
        let info = parse_probe_output(json).unwrap();
        assert!((info.duration - 10.04).abs() < 1e-9);
        assert_eq!(info.codec, "h264");
        assert!((info.fps - 25.0).abs() < 1e-9);
        assert!((info.frame_duration() - 0.04).abs() < 1e-9);
    }

    #[test]
    fn test_probe_output_without_video_is_malformed() {
        let json = br#"{"streams": [{"codec_type": "audio"}], "format": {}}"#;
        assert!(matches!(
            parse_probe_output(json),
            Err(ToolError::ExecutionFailed { .. })
        ));
        assert!(parse_probe_output(b"not json").is_err());
    }
}
