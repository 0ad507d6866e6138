//! Scene boundary scan using ffmpeg's scene score and `showinfo`.

use std::path::Path;

use crate::command::FfmpegCommand;

/// Build the scan command: frames whose scene score exceeds `threshold` are
/// logged by `showinfo`; decoded output is discarded.
pub fn scene_scan_command(input: &Path, threshold: f64) -> FfmpegCommand {
    FfmpegCommand::null_sink(input)
        .log_level("info")
        .video_filter(format!("select='gt(scene,{:.3})',showinfo", threshold))
        .no_audio()
}

/// Extract the `pts_time` of a frame reported by `showinfo`.
pub fn parse_showinfo_pts(line: &str) -> Option<f64> {
    if !line.contains("Parsed_showinfo") {
        return None;
    }
    let rest = &line[line.find("pts_time:")? + "pts_time:".len()..];
    let value = rest.split_whitespace().next()?;
    value.parse::<f64>().ok().filter(|v| v.is_finite())
}
