//! Submission requests and their validation.
//!
//! Validation here is pure: it checks the request shape, MIME type, timestamps
//! and scene options. Filesystem checks (existence, readability) are done by
//! the dispatcher before a job is created.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::timestamp::{check_seconds, parse_timestamp};
use crate::{ClipRange, InputRef, JobKind, SceneOptions, TimestampError};

/// MIME types accepted when none are configured.
pub const DEFAULT_ACCEPTED_MIME_TYPES: &[&str] = &[
    "video/mp4",
    "video/quicktime",
    "video/x-matroska",
    "video/webm",
    "video/x-msvideo",
    "video/mpeg",
];

/// A clip bound given either as seconds or as a timestamp string.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum TimestampInput {
    Seconds(f64),
    Text(String),
}

impl TimestampInput {
    /// Resolve to seconds.
    pub fn to_seconds(&self) -> Result<f64, TimestampError> {
        match self {
            TimestampInput::Seconds(s) => check_seconds(*s),
            TimestampInput::Text(t) => parse_timestamp(t),
        }
    }
}

impl From<f64> for TimestampInput {
    fn from(secs: f64) -> Self {
        TimestampInput::Seconds(secs)
    }
}

impl From<&str> for TimestampInput {
    fn from(text: &str) -> Self {
        TimestampInput::Text(text.to_string())
    }
}

/// Job submission request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipRequest {
    pub kind: JobKind,
    pub input: InputRef,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start: Option<TimestampInput>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end: Option<TimestampInput>,
    #[serde(default)]
    pub options: SceneOverrides,
    /// Storage key prefix; defaults to the job ID
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output_prefix: Option<String>,
}

impl ClipRequest {
    /// Manual clip request.
    pub fn manual(input: InputRef, start: impl Into<TimestampInput>, end: impl Into<TimestampInput>) -> Self {
        Self {
            kind: JobKind::ManualClip,
            input,
            start: Some(start.into()),
            end: Some(end.into()),
            options: SceneOverrides::default(),
            output_prefix: None,
        }
    }

    /// Scene detection or scene clip request.
    pub fn scenes(kind: JobKind, input: InputRef, options: impl Into<SceneOverrides>) -> Self {
        Self {
            kind,
            input,
            start: None,
            end: None,
            options: options.into(),
            output_prefix: None,
        }
    }

    /// Check the request without touching the filesystem. Scene options the
    /// request leaves unset come from `scene_defaults`.
    pub fn validate<S: AsRef<str>>(
        &self,
        accepted_mime: &[S],
        scene_defaults: &SceneOptions,
    ) -> Result<ValidatedRequest, ValidationError> {
        let mime = self.input.mime_type.trim().to_ascii_lowercase();
        if !accepted_mime.iter().any(|m| m.as_ref().eq_ignore_ascii_case(&mime)) {
            return Err(ValidationError::UnsupportedMimeType(self.input.mime_type.clone()));
        }

        if let Some(prefix) = &self.output_prefix {
            if prefix.is_empty() || prefix.contains("..") || prefix.starts_with('/') {
                return Err(ValidationError::InvalidOutputPrefix(prefix.clone()));
            }
        }

        let options = self.options.resolve(scene_defaults);
        let range = match self.kind {
            JobKind::ManualClip => {
                let start = self
                    .start
                    .as_ref()
                    .ok_or(ValidationError::MissingTimestamp("start"))?
                    .to_seconds()
                    .map_err(|e| ValidationError::InvalidTimestamp("start", e))?;
                let end = self
                    .end
                    .as_ref()
                    .ok_or(ValidationError::MissingTimestamp("end"))?
                    .to_seconds()
                    .map_err(|e| ValidationError::InvalidTimestamp("end", e))?;
                if start >= end {
                    return Err(ValidationError::EmptyRange { start, end });
                }
                Some(ClipRange { start, end })
            }
            JobKind::SceneDetect | JobKind::SceneClip => {
                if self.start.is_some() || self.end.is_some() {
                    return Err(ValidationError::UnexpectedTimestamps(self.kind));
                }
                validate_scene_options(&options)?;
                None
            }
        };

        Ok(ValidatedRequest {
            kind: self.kind,
            input: self.input.clone(),
            range,
            options,
            output_prefix: self.output_prefix.clone(),
        })
    }
}

/// Scene options as submitted. Unset fields fall back to the worker's
/// configured defaults.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct SceneOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensitivity: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_scene_len: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_scenes: Option<usize>,
}

impl SceneOverrides {
    pub fn resolve(&self, defaults: &SceneOptions) -> SceneOptions {
        SceneOptions {
            sensitivity: self.sensitivity.unwrap_or(defaults.sensitivity),
            min_scene_len: self.min_scene_len.unwrap_or(defaults.min_scene_len),
            max_scenes: self.max_scenes.or(defaults.max_scenes),
        }
    }
}

impl From<SceneOptions> for SceneOverrides {
    fn from(options: SceneOptions) -> Self {
        Self {
            sensitivity: Some(options.sensitivity),
            min_scene_len: Some(options.min_scene_len),
            max_scenes: options.max_scenes,
        }
    }
}

fn validate_scene_options(options: &SceneOptions) -> Result<(), ValidationError> {
    if !(options.sensitivity > 0.0 && options.sensitivity < 1.0) {
        return Err(ValidationError::InvalidSceneOptions(format!(
            "sensitivity must be in (0, 1), got {}",
            options.sensitivity
        )));
    }
    if !options.min_scene_len.is_finite() || options.min_scene_len < 0.0 {
        return Err(ValidationError::InvalidSceneOptions(format!(
            "min_scene_len must be non-negative, got {}",
            options.min_scene_len
        )));
    }
    if options.max_scenes == Some(0) {
        return Err(ValidationError::InvalidSceneOptions(
            "max_scenes must be at least 1".to_string(),
        ));
    }
    Ok(())
}

/// A request that passed validation and can become a job.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedRequest {
    pub kind: JobKind,
    pub input: InputRef,
    pub range: Option<ClipRange>,
    pub options: SceneOptions,
    pub output_prefix: Option<String>,
}

/// Reason a request was rejected before any job was created.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    #[error("Missing {0} timestamp for manual-clip")]
    MissingTimestamp(&'static str),

    #[error("Invalid {0} timestamp: {1}")]
    InvalidTimestamp(&'static str, TimestampError),

    #[error("Start ({start}) must be before end ({end})")]
    EmptyRange { start: f64, end: f64 },

    #[error("Timestamps are only accepted for manual-clip, not {0}")]
    UnexpectedTimestamps(JobKind),

    #[error("Invalid scene options: {0}")]
    InvalidSceneOptions(String),

    #[error("Unsupported MIME type: {0}")]
    UnsupportedMimeType(String),

    #[error("Invalid output prefix: {0}")]
    InvalidOutputPrefix(String),

    #[error("Input file not found: {0}")]
    InputNotFound(String),

    #[error("Input file is not readable: {0}")]
    InputUnreadable(String),

    #[error("Input file is empty: {0}")]
    EmptyInput(String),

    #[error("Declared size {declared} does not match file size {actual}")]
    SizeMismatch { declared: u64, actual: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn input(mime: &str) -> InputRef {
        InputRef {
            path: PathBuf::from("/tmp/in.mp4"),
            size_bytes: 10,
            mime_type: mime.to_string(),
        }
    }

    #[test]
    fn test_manual_clip_valid() {
        let req = ClipRequest::manual(input("video/mp4"), 2.0, "00:00:05");
        let validated = req.validate(DEFAULT_ACCEPTED_MIME_TYPES, &SceneOptions::default()).unwrap();
        assert_eq!(validated.range, Some(ClipRange { start: 2.0, end: 5.0 }));
    }

    #[test]
    fn test_manual_clip_equal_bounds_rejected() {
        let req = ClipRequest::manual(input("video/mp4"), 5.0, 5.0);
        assert!(matches!(
            req.validate(DEFAULT_ACCEPTED_MIME_TYPES, &SceneOptions::default()),
            Err(ValidationError::EmptyRange { .. })
        ));
    }

    #[test]
    fn test_manual_clip_missing_or_malformed() {
        let mut req = ClipRequest::manual(input("video/mp4"), 1.0, 2.0);
        req.end = None;
        assert_eq!(
            req.validate(DEFAULT_ACCEPTED_MIME_TYPES, &SceneOptions::default()),
            Err(ValidationError::MissingTimestamp("end"))
        );

        let req = ClipRequest::manual(input("video/mp4"), "abc", 2.0);
        assert!(matches!(
            req.validate(DEFAULT_ACCEPTED_MIME_TYPES, &SceneOptions::default()),
            Err(ValidationError::InvalidTimestamp("start", _))
        ));

        let req = ClipRequest::manual(input("video/mp4"), -1.0, 2.0);
        assert!(matches!(
            req.validate(DEFAULT_ACCEPTED_MIME_TYPES, &SceneOptions::default()),
            Err(ValidationError::InvalidTimestamp("start", TimestampError::Negative))
        ));
    }

    #[test]
    fn test_mime_type_checked_case_insensitively() {
        let req = ClipRequest::scenes(JobKind::SceneDetect, input("Video/MP4"), SceneOptions::default());
        assert!(req.validate(DEFAULT_ACCEPTED_MIME_TYPES, &SceneOptions::default()).is_ok());

        let req = ClipRequest::scenes(JobKind::SceneDetect, input("image/png"), SceneOptions::default());
        assert!(matches!(
            req.validate(DEFAULT_ACCEPTED_MIME_TYPES, &SceneOptions::default()),
            Err(ValidationError::UnsupportedMimeType(_))
        ));
    }

    #[test]
    fn test_scene_kinds_reject_timestamps_and_bad_options() {
        let mut req = ClipRequest::scenes(JobKind::SceneClip, input("video/mp4"), SceneOptions::default());
        req.start = Some(1.0.into());
        assert!(matches!(
            req.validate(DEFAULT_ACCEPTED_MIME_TYPES, &SceneOptions::default()),
            Err(ValidationError::UnexpectedTimestamps(JobKind::SceneClip))
        ));

        let options = SceneOptions {
            sensitivity: 1.5,
            ..SceneOptions::default()
        };
        let req = ClipRequest::scenes(JobKind::SceneClip, input("video/mp4"), options);
        assert!(matches!(
            req.validate(DEFAULT_ACCEPTED_MIME_TYPES, &SceneOptions::default()),
            Err(ValidationError::InvalidSceneOptions(_))
        ));
    }

    #[test]
    fn test_request_deserializes_mixed_timestamps() {
        let json = r#"{
            "kind": "manual-clip",
            "input": {"path": "/tmp/a.mp4", "size_bytes": 5, "mime_type": "video/mp4"},
            "start": 2,
            "end": "00:05"
        }"#;
        let req: ClipRequest = serde_json::from_str(json).unwrap();
        let validated = req.validate(DEFAULT_ACCEPTED_MIME_TYPES, &SceneOptions::default()).unwrap();
        assert_eq!(validated.range, Some(ClipRange { start: 2.0, end: 5.0 }));
    }

    #[test]
    fn test_unset_scene_options_take_defaults() {
        let defaults = SceneOptions {
            sensitivity: 0.45,
            min_scene_len: 1.5,
            max_scenes: Some(4),
        };
        let json = r#"{
            "kind": "scene-clip",
            "input": {"path": "/tmp/a.mp4", "size_bytes": 5, "mime_type": "video/mp4"},
            "options": {"max_scenes": 2}
        }"#;
        let req: ClipRequest = serde_json::from_str(json).unwrap();
        let validated = req.validate(DEFAULT_ACCEPTED_MIME_TYPES, &defaults).unwrap();
        assert_eq!(
            validated.options,
            SceneOptions {
                sensitivity: 0.45,
                min_scene_len: 1.5,
                max_scenes: Some(2),
            }
        );

        let req = ClipRequest::scenes(JobKind::SceneDetect, input("video/mp4"), SceneOverrides::default());
        let validated = req.validate(DEFAULT_ACCEPTED_MIME_TYPES, &defaults).unwrap();
        assert_eq!(validated.options, defaults);
    }
}
