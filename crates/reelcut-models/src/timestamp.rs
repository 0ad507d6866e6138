//! Timestamp parsing for clip bounds.
//!
//! Clip requests may carry bounds either as plain seconds or as text in
//! `HH:MM:SS`, `HH:MM:SS.mmm`, `MM:SS` or `SS` form.

use thiserror::Error;

/// Maximum accepted source duration (24 hours in seconds).
pub const MAX_VIDEO_DURATION_SECS: f64 = 86400.0;

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Timestamp must be a finite number")]
    NotFinite,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, HH:MM:SS.mmm, MM:SS or SS")]
    InvalidFormat(String),

    #[error("Timestamp exceeds maximum allowed duration ({} hours)", MAX_VIDEO_DURATION_SECS / 3600.0)]
    ExceedsMaxDuration,
}

/// Parse a timestamp string to total seconds.
///
/// # Examples
/// ```
/// use reelcut_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("05:30").unwrap(), 330.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [s] => ("0", "0", *s),
        [m, s] => ("0", *m, *s),
        [h, m, s] => (*h, *m, *s),
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    let hours = parse_component("hours", hours)?;
    let minutes = parse_component("minutes", minutes)?;
    let seconds = parse_component("seconds", seconds)?;

    check_seconds(hours * 3600.0 + minutes * 60.0 + seconds)
}

/// Validate a bound already expressed in seconds.
pub fn check_seconds(secs: f64) -> Result<f64, TimestampError> {
    if !secs.is_finite() {
        return Err(TimestampError::NotFinite);
    }
    if secs < 0.0 {
        return Err(TimestampError::Negative);
    }
    if secs > MAX_VIDEO_DURATION_SECS {
        return Err(TimestampError::ExceedsMaxDuration);
    }
    Ok(secs)
}

fn parse_component(name: &'static str, raw: &str) -> Result<f64, TimestampError> {
    let value: f64 = raw
        .parse()
        .map_err(|_| TimestampError::InvalidValue(name, raw.to_string()))?;
    if !value.is_finite() {
        return Err(TimestampError::NotFinite);
    }
    if value < 0.0 {
        return Err(TimestampError::Negative);
    }
    Ok(value)
}

/// Format seconds into HH:MM:SS or HH:MM:SS.mmm string.
pub fn format_seconds(total_secs: f64) -> String {
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;

    if (secs - secs.floor()).abs() > 0.0001 {
        format!("{:02}:{:02}:{:06.3}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, mins, secs.floor() as u32)
    }
}
