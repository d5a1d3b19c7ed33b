//! Scene Resolution
//!
//! Maps abstract scenes onto concrete clips of the recording. Runs downstream
//! of distribution; a scene with no footage is dropped with a warning.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::distributor::Scene;
use crate::core::catalog::Track;
use crate::core::sectors::Sector;
use crate::core::{CameraIndex, ClipId, TimeRange, TimeSec, TrackId};

// =============================================================================
// Source Window
// =============================================================================

/// Stretch of the recording a compilation is drawn from.
///
/// When the window is longer than the compilation, scene times are scaled
/// proportionally so the compilation samples the whole window.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceWindow {
    pub range: TimeRange,
    pub target_duration: TimeSec,
}

impl SourceWindow {
    pub fn new(range: TimeRange, target_duration: TimeSec) -> Self {
        Self {
            range,
            target_duration,
        }
    }

    /// Window spanning every track
    pub fn for_tracks(tracks: &[Track], target_duration: TimeSec) -> Option<Self> {
        let ranges: Vec<TimeRange> = tracks.iter().filter_map(Track::range).collect();
        let start = ranges.iter().map(|r| r.start_sec).reduce(f64::min)?;
        let end = ranges.iter().map(|r| r.end_sec).reduce(f64::max)?;
        Some(Self::new(TimeRange::new(start, end), target_duration))
    }

    /// Window spanning one sector
    pub fn for_sector(sector: &Sector, target_duration: TimeSec) -> Self {
        Self::new(sector.range(), target_duration)
    }

    /// Source seconds per compilation second
    pub fn scale(&self) -> f64 {
        let span = self.range.duration();
        if self.target_duration > 0.0 && span > self.target_duration {
            span / self.target_duration
        } else {
            1.0
        }
    }

    /// Compilation-relative time to absolute recording time
    pub fn to_source(&self, relative: TimeSec) -> TimeSec {
        self.range.start_sec + relative * self.scale()
    }

    /// Absolute recording time to compilation-relative time
    pub fn to_compilation(&self, absolute: TimeSec) -> TimeSec {
        (absolute - self.range.start_sec) / self.scale()
    }
}

// =============================================================================
// Resolution Output
// =============================================================================

/// A scene bound to the clip that plays it
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolvedScene {
    pub scene: Scene,
    pub track_id: TrackId,
    pub clip_id: ClipId,
    pub path: String,
    /// Absolute recording time the scene starts at
    pub source_start: TimeSec,
    /// Clip-local in point
    pub local_in: TimeSec,
    /// Clip-local out point, cut short at the clip's end
    pub local_out: TimeSec,
}

impl ResolvedScene {
    pub fn truncated(&self) -> bool {
        self.local_out - self.local_in < self.scene.duration - crate::core::TIME_EPSILON
    }
}

/// Why a scene could not be resolved
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ResolutionIssue {
    /// No track records the picked camera
    NoTrack,
    /// The camera has no clip at the picked time
    NoClip,
}

/// Non-fatal report for a dropped scene
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolutionWarning {
    pub scene_index: usize,
    pub camera_index: CameraIndex,
    pub source_time: TimeSec,
    pub issue: ResolutionIssue,
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let what = match self.issue {
            ResolutionIssue::NoTrack => "no track for camera",
            ResolutionIssue::NoClip => "no clip for camera",
        };
        write!(
            f,
            "scene {}: {} {} at {:.3}s",
            self.scene_index, what, self.camera_index, self.source_time
        )
    }
}

/// Resolved scenes plus the warnings for the dropped ones
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneResolution {
    pub resolved: Vec<ResolvedScene>,
    pub warnings: Vec<ResolutionWarning>,
}

// =============================================================================
// Resolution
// =============================================================================

/// Finds the clip for every scene; unresolvable scenes are dropped
pub fn resolve_scenes(
    scenes: &[Scene],
    tracks: &[Track],
    window: &SourceWindow,
    tolerance: TimeSec,
) -> SceneResolution {
    let mut resolution = SceneResolution::default();

    for (index, scene) in scenes.iter().enumerate() {
        let source_time = window.to_source(scene.start_time);
        let track = tracks
            .iter()
            .find(|t| t.camera_index() == scene.camera_index);

        let clip = match track {
            Some(track) => track.clip_at(source_time, tolerance).map(|clip| (track, clip)),
            None => None,
        };

        match clip {
            Some((track, clip)) => {
                let local_in = clip.local_time(source_time);
                let local_out = (local_in + scene.duration).min(clip.duration());
                resolution.resolved.push(ResolvedScene {
                    scene: scene.clone(),
                    track_id: track.id().to_string(),
                    clip_id: clip.id().to_string(),
                    path: clip.path().to_string(),
                    source_start: source_time,
                    local_in,
                    local_out,
                });
            }
            None => {
                let warning = ResolutionWarning {
                    scene_index: index,
                    camera_index: scene.camera_index,
                    source_time,
                    issue: if track.is_some() {
                        ResolutionIssue::NoClip
                    } else {
                        ResolutionIssue::NoTrack
                    },
                };
                warn!("Dropping scene: {}", warning);
                resolution.warnings.push(warning);
            }
        }
    }

    debug!(
        resolved = resolution.resolved.len(),
        dropped = resolution.warnings.len(),
        "Scene resolution finished"
    );
    resolution
}
