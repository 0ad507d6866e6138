//! FFmpeg progress parsing and fractional progress reporting.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::watch;

/// Progress information from FFmpeg's `-progress` output.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FfmpegProgress {
    /// Current frame number
    pub frame: u64,
    /// Current FPS
    pub fps: f64,
    /// Output time in milliseconds
    pub out_time_ms: i64,
    /// Encoding speed (e.g., 1.5 = 1.5x realtime)
    pub speed: f64,
    /// Whether encoding is complete
    pub is_complete: bool,
}

impl FfmpegProgress {
    /// Fraction of `total_secs` processed, in `[0, 1]`.
    pub fn fraction(&self, total_secs: f64) -> f64 {
        if total_secs <= 0.0 || !total_secs.is_finite() {
            return 0.0;
        }
        if self.is_complete {
            return 1.0;
        }
        (self.out_time_ms as f64 / 1000.0 / total_secs).clamp(0.0, 1.0)
    }

    /// Estimate time remaining in seconds.
    pub fn eta_seconds(&self, total_secs: f64) -> Option<f64> {
        if self.speed <= 0.0 || self.out_time_ms <= 0 {
            return None;
        }
        let remaining = total_secs - self.out_time_ms as f64 / 1000.0;
        if remaining <= 0.0 {
            return Some(0.0);
        }
        Some(remaining / self.speed)
    }
}

/// Parse one line of `-progress pipe:2` output into `current`.
///
/// Returns a snapshot at the end of each progress block.
pub fn parse_progress_line(line: &str, current: &mut FfmpegProgress) -> Option<FfmpegProgress> {
    let (key, value) = line.trim().split_once('=')?;
    match key {
        "out_time_us" | "out_time_ms" => {
            // ffmpeg reports microseconds under both keys.
            if let Ok(us) = value.parse::<i64>() {
                current.out_time_ms = us / 1000;
            }
        }
        "frame" => {
            if let Ok(frame) = value.parse() {
                current.frame = frame;
            }
        }
        "fps" => {
            if let Ok(fps) = value.parse() {
                current.fps = fps;
            }
        }
        "speed" => {
            if let Some(speed) = value.strip_suffix('x').and_then(|s| s.trim().parse().ok()) {
                current.speed = speed;
            }
        }
        "progress" => {
            if value == "end" {
                current.is_complete = true;
            }
            return Some(current.clone());
        }
        _ => {}
    }
    None
}

/// Sends fractional progress on a watch channel.
///
/// A sender covers a sub-range `[offset, offset + span]` of the overall job
/// progress, so a multi-step pipeline can hand each step its own scoped
/// sender. Published values never decrease.
#[derive(Debug, Clone)]
pub struct ProgressSender {
    tx: Arc<watch::Sender<f64>>,
    offset: f64,
    span: f64,
}

impl ProgressSender {
    /// Create a sender covering the full `[0, 1]` range.
    pub fn new(tx: watch::Sender<f64>) -> Self {
        Self {
            tx: Arc::new(tx),
            offset: 0.0,
            span: 1.0,
        }
    }

    /// Sender and receiver pair starting at zero.
    pub fn channel() -> (Self, watch::Receiver<f64>) {
        let (tx, rx) = watch::channel(0.0);
        (Self::new(tx), rx)
    }

    /// A sender that publishes nowhere.
    pub fn disabled() -> Self {
        Self::channel().0
    }

    /// Child sender mapping its `[0, 1]` onto `[offset, offset + span]` of this one.
    pub fn scoped(&self, offset: f64, span: f64) -> Self {
        let offset = offset.clamp(0.0, 1.0);
        let span = span.clamp(0.0, 1.0 - offset);
        Self {
            tx: Arc::clone(&self.tx),
            offset: self.offset + offset * self.span,
            span: span * self.span,
        }
    }

    /// Report progress of this step as a fraction in `[0, 1]`.
    pub fn report(&self, fraction: f64) {
        if fraction.is_nan() {
            return;
        }
        let overall = (self.offset + fraction.clamp(0.0, 1.0) * self.span).clamp(0.0, 1.0);
        self.tx.send_if_modified(|current| {
            if overall > *current {
                *current = overall;
                true
            } else {
                false
            }
        });
    }

    /// Mark this step complete.
    pub fn finish(&self) {
        self.report(1.0);
    }

    /// Last published overall value.
    pub fn current(&self) -> f64 {
        *self.tx.borrow()
    }
}
