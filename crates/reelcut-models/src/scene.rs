//! Detected scenes and the ordering rules they obey.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A contiguous time range representing one shot within a source video.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// Start in seconds (inclusive)
    pub start: f64,
    /// End in seconds (exclusive)
    pub end: f64,
}

impl Scene {
    /// Create a scene, rejecting empty or inverted ranges.
    pub fn new(start: f64, end: f64) -> Result<Self, SceneError> {
        if !start.is_finite() || !end.is_finite() || start < 0.0 || start >= end {
            return Err(SceneError::InvalidRange { start, end });
        }
        Ok(Self { start, end })
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Scene list violation.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SceneError {
    #[error("Invalid scene range {start:.3}..{end:.3}")]
    InvalidRange { start: f64, end: f64 },

    #[error("Scene {index} starts before the previous scene ends")]
    Overlap { index: usize },
}

/// Check that scenes are well-formed, sorted by start and pairwise non-overlapping.
pub fn validate_scene_list(scenes: &[Scene]) -> Result<(), SceneError> {
    for scene in scenes {
        Scene::new(scene.start, scene.end)?;
    }
    for (index, pair) in scenes.windows(2).enumerate() {
        if pair[1].start < pair[0].end {
            return Err(SceneError::Overlap { index: index + 1 });
        }
    }
    Ok(())
}

/// Build scenes covering `[0, duration)` from detected cut timestamps.
///
/// Cuts closer than `min_scene_len` to the previous boundary are dropped, and
/// a short trailing scene is merged into its predecessor. With no usable cuts
/// the whole range becomes a single scene. Returns an empty list only when
/// `duration` is not positive.
pub fn scenes_from_cuts(cuts: &[f64], duration: f64, min_scene_len: f64) -> Vec<Scene> {
    if !duration.is_finite() || duration <= 0.0 {
        return Vec::new();
    }

    let mut sorted: Vec<f64> = cuts
        .iter()
        .copied()
        .filter(|c| c.is_finite() && *c > 0.0 && *c < duration)
        .collect();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let min_len = min_scene_len.max(0.0);
    let mut bounds = vec![0.0];
    for cut in sorted {
        let last = bounds[bounds.len() - 1];
        if cut > last && cut - last >= min_len {
            bounds.push(cut);
        }
    }

    let last = bounds[bounds.len() - 1];
    if bounds.len() > 1 && duration - last < min_len {
        // Short tail: extend the previous scene to the end.
        if let Some(tail) = bounds.last_mut() {
            *tail = duration;
        }
    } else {
        bounds.push(duration);
    }

    bounds
        .windows(2)
        .map(|w| Scene { start: w[0], end: w[1] })
        .collect()
}

/// Pick the `k` longest scenes, returned with their original indices in start order.
pub fn select_longest(scenes: &[Scene], k: usize) -> Vec<(usize, Scene)> {
    let mut indexed: Vec<(usize, Scene)> = scenes.iter().copied().enumerate().collect();
    indexed.sort_by(|a, b| b.1.duration().total_cmp(&a.1.duration()).then(a.0.cmp(&b.0)));
    indexed.truncate(k);
    indexed.sort_by_key(|(index, _)| *index);
    indexed
}
