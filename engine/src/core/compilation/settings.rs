//! Compilation Settings
//!
//! Pacing and preference parameters for a scene distribution request.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{CameraIndex, CoreError, CoreResult, TimeSec};

/// Default mean scene length in seconds
pub const DEFAULT_AVERAGE_SCENE_DURATION: TimeSec = 3.0;
/// Default shortest allowed scene in seconds
pub const DEFAULT_MIN_SEGMENT_LENGTH: TimeSec = 0.5;
/// Default longest allowed scene in seconds
pub const DEFAULT_MAX_SEGMENT_LENGTH: TimeSec = 10.0;
/// Default probability of forcing a switch when a pick repeats (≈4/7)
pub const DEFAULT_CAMERA_CHANGE_FREQUENCY: f64 = 0.57;
/// Default probability of picking the main camera
pub const DEFAULT_MAIN_CAMERA_PROB: f64 = 0.5;

/// Upper bound on the number of scenes one request may produce
pub const MAX_SCENES: usize = 100_000;

fn default_average_scene_duration() -> TimeSec {
    DEFAULT_AVERAGE_SCENE_DURATION
}

fn default_min_segment_length() -> TimeSec {
    DEFAULT_MIN_SEGMENT_LENGTH
}

fn default_max_segment_length() -> TimeSec {
    DEFAULT_MAX_SEGMENT_LENGTH
}

fn default_camera_change_frequency() -> f64 {
    DEFAULT_CAMERA_CHANGE_FREQUENCY
}

fn default_main_camera_prob() -> f64 {
    DEFAULT_MAIN_CAMERA_PROB
}

/// Input configuration for scene distribution, passed by value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationSettings {
    /// Length of the compilation in seconds (required, > 0)
    pub target_duration: TimeSec,

    #[serde(default = "default_average_scene_duration")]
    pub average_scene_duration: TimeSec,

    #[serde(default = "default_min_segment_length")]
    pub min_segment_length: TimeSec,

    #[serde(default = "default_max_segment_length")]
    pub max_segment_length: TimeSec,

    /// Probability (0..1) of forcing a switch when a pick repeats the previous camera
    #[serde(default = "default_camera_change_frequency")]
    pub camera_change_frequency: f64,

    #[serde(default)]
    pub main_camera: Option<CameraIndex>,

    /// Probability (0..1) of picking the main camera for a scene
    #[serde(default = "default_main_camera_prob")]
    pub main_camera_prob: f64,

    #[serde(default)]
    pub num_cameras: u32,
}

impl CompilationSettings {
    /// Settings with documented defaults for everything but the target and camera count
    pub fn new(target_duration: TimeSec, num_cameras: u32) -> Self {
        Self::from_defaults(&CompilationDefaults::default(), target_duration, num_cameras)
    }

    /// Settings seeded from configured defaults
    pub fn from_defaults(
        defaults: &CompilationDefaults,
        target_duration: TimeSec,
        num_cameras: u32,
    ) -> Self {
        Self {
            target_duration,
            average_scene_duration: defaults.average_scene_duration,
            min_segment_length: defaults.min_segment_length,
            max_segment_length: defaults.max_segment_length,
            camera_change_frequency: defaults.camera_change_frequency,
            main_camera: None,
            main_camera_prob: defaults.main_camera_prob,
            num_cameras,
        }
    }

    /// Sets the preferred camera and how often it is picked
    pub fn with_main_camera(mut self, camera: CameraIndex, probability: f64) -> Self {
        self.main_camera = Some(camera);
        self.main_camera_prob = probability;
        self
    }

    /// Sets the scene pacing
    pub fn with_pacing(mut self, average: TimeSec, min: TimeSec, max: TimeSec) -> Self {
        self.average_scene_duration = average;
        self.min_segment_length = min;
        self.max_segment_length = max;
        self
    }

    pub fn with_camera_change_frequency(mut self, frequency: f64) -> Self {
        self.camera_change_frequency = frequency;
        self
    }

    /// Reason the request cannot produce any scene, if any
    pub fn empty_input_reason(&self) -> Option<String> {
        if self.num_cameras == 0 {
            return Some("no cameras available".to_string());
        }
        if !self.target_duration.is_finite() || self.target_duration <= 0.0 {
            return Some(format!(
                "target duration must be positive, got {}",
                self.target_duration
            ));
        }
        None
    }

    /// Strict validation, for callers that want pacing mistakes reported
    pub fn validate(&self) -> CoreResult<()> {
        if let Some(reason) = self.empty_input_reason() {
            return Err(CoreError::EmptyInput(reason));
        }

        let positive = |v: f64| v.is_finite() && v > 0.0;
        if !positive(self.average_scene_duration) {
            return Err(CoreError::InvalidSettings(
                "averageSceneDuration must be positive".to_string(),
            ));
        }
        if !positive(self.min_segment_length) || !positive(self.max_segment_length) {
            return Err(CoreError::InvalidSettings(
                "segment lengths must be positive".to_string(),
            ));
        }
        if self.min_segment_length > self.max_segment_length {
            return Err(CoreError::InvalidSettings(format!(
                "minSegmentLength {} exceeds maxSegmentLength {}",
                self.min_segment_length, self.max_segment_length
            )));
        }
        let unit = |v: f64| (0.0..=1.0).contains(&v);
        if !unit(self.camera_change_frequency) || !unit(self.main_camera_prob) {
            return Err(CoreError::InvalidSettings(
                "probabilities must be within 0..1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns a copy with pacing values corrected instead of rejected.
    ///
    /// Tolerant like configuration loading: bad values fall back to defaults,
    /// swapped bounds are reordered and probabilities clamped.
    pub fn normalized(&self) -> Self {
        let mut s = self.clone();

        let positive_or = |v: f64, fallback: f64| if v.is_finite() && v > 0.0 { v } else { fallback };
        s.min_segment_length = positive_or(s.min_segment_length, DEFAULT_MIN_SEGMENT_LENGTH);
        s.max_segment_length = positive_or(s.max_segment_length, DEFAULT_MAX_SEGMENT_LENGTH);
        if s.min_segment_length > s.max_segment_length {
            warn!(
                "minSegmentLength {} > maxSegmentLength {}, swapping",
                s.min_segment_length, s.max_segment_length
            );
            std::mem::swap(&mut s.min_segment_length, &mut s.max_segment_length);
        }

        if s.target_duration.is_finite() && s.target_duration > 0.0 {
            let floor = s.target_duration / MAX_SCENES as f64;
            if s.min_segment_length < floor {
                warn!(
                    "minSegmentLength raised to {:.3}s to stay under {} scenes",
                    floor, MAX_SCENES
                );
                s.min_segment_length = floor;
                s.max_segment_length = s.max_segment_length.max(floor);
            }
        }

        s.average_scene_duration = positive_or(s.average_scene_duration, DEFAULT_AVERAGE_SCENE_DURATION)
            .clamp(s.min_segment_length, s.max_segment_length);

        let unit_or = |v: f64, fallback: f64| if v.is_finite() { v.clamp(0.0, 1.0) } else { fallback };
        s.camera_change_frequency = unit_or(s.camera_change_frequency, DEFAULT_CAMERA_CHANGE_FREQUENCY);
        s.main_camera_prob = unit_or(s.main_camera_prob, DEFAULT_MAIN_CAMERA_PROB);

        s
    }
}

/// Configurable defaults for the optional pacing fields
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompilationDefaults {
    #[serde(default = "default_average_scene_duration")]
    pub average_scene_duration: TimeSec,
    #[serde(default = "default_min_segment_length")]
    pub min_segment_length: TimeSec,
    #[serde(default = "default_max_segment_length")]
    pub max_segment_length: TimeSec,
    #[serde(default = "default_camera_change_frequency")]
    pub camera_change_frequency: f64,
    #[serde(default = "default_main_camera_prob")]
    pub main_camera_prob: f64,
}

impl Default for CompilationDefaults {
    fn default() -> Self {
        Self {
            average_scene_duration: DEFAULT_AVERAGE_SCENE_DURATION,
            min_segment_length: DEFAULT_MIN_SEGMENT_LENGTH,
            max_segment_length: DEFAULT_MAX_SEGMENT_LENGTH,
            camera_change_frequency: DEFAULT_CAMERA_CHANGE_FREQUENCY,
            main_camera_prob: DEFAULT_MAIN_CAMERA_PROB,
        }
    }
}

impl CompilationDefaults {
    /// Clamps defaults into usable ranges
    pub fn normalize(&mut self) {
        let clamped = CompilationSettings::from_defaults(self, 1.0, 1).normalized();
        self.average_scene_duration = clamped.average_scene_duration;
        self.min_segment_length = clamped.min_segment_length;
        self.max_segment_length = clamped.max_segment_length;
        self.camera_change_frequency = clamped.camera_change_frequency;
        self.main_camera_prob = clamped.main_camera_prob;
    }
}
