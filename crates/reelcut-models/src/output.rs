//! Job outputs and storage references.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Scene;

/// Reference to an object held by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct StorageRef {
    /// Storage key (e.g. `<job-id>/clip-001.mp4`)
    pub key: String,
    /// Backend-specific locator (file path, URL)
    pub uri: String,
}

impl std::fmt::Display for StorageRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.uri)
    }
}

/// One produced clip.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ClipOutput {
    /// Index of the source scene (scene-clip jobs only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scene_index: Option<usize>,
    /// Clip start in source seconds
    pub start: f64,
    /// Clip end in source seconds
    pub end: f64,
    /// Where the clip was persisted
    pub location: StorageRef,
}

impl ClipOutput {
    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Output reference carried by a `done` job.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize, JsonSchema)]
pub struct JobOutput {
    /// Persisted clips (empty for scene-detect)
    #[serde(default)]
    pub clips: Vec<ClipOutput>,
    /// Detected scenes (empty for manual-clip)
    #[serde(default)]
    pub scenes: Vec<Scene>,
}

impl JobOutput {
    /// Output of a single clip.
    pub fn single_clip(clip: ClipOutput) -> Self {
        Self {
            clips: vec![clip],
            scenes: Vec::new(),
        }
    }

    /// Output of a detection-only job.
    pub fn scenes(scenes: Vec<Scene>) -> Self {
        Self {
            clips: Vec::new(),
            scenes,
        }
    }
}
