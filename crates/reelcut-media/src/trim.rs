//! Trim and re-encode a time range into a standalone clip.

use std::path::Path;

use reelcut_models::EncodingConfig;

use crate::command::FfmpegCommand;

/// Build the trim command for `[start, end)` of `input`.
///
/// Seeking happens before `-i` so decoding starts at the nearest keyframe and
/// output timestamps begin at zero; re-encoding makes the cut frame-accurate.
pub fn trim_command(
    input: &Path,
    output: &Path,
    start: f64,
    end: f64,
    encoding: &EncodingConfig,
) -> FfmpegCommand {
    FfmpegCommand::new(input, output)
        .seek(start)
        .duration(end - start)
        .video_codec(&encoding.codec)
        .preset(&encoding.preset)
        .crf(encoding.crf)
        .audio_codec(&encoding.audio_codec)
        .audio_bitrate(&encoding.audio_bitrate)
        .output_args(["-avoid_negative_ts", "make_zero", "-movflags", "+faststart"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_command_bounds() {
        let args = trim_command(
            Path::new("in.mp4"),
            Path::new("out.mp4"),
            2.0,
            5.0,
            &EncodingConfig::default(),
        )
        .build_args();

        let t = args.iter().position(|a| a == "-t").unwrap();
        assert_eq!(args[t + 1], "3.000");
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "2.000");
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"+faststart".to_string()));
    }
}
