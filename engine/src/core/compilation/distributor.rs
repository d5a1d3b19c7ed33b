//! Scene Distributor
//!
//! Generates a gapless sequence of camera picks covering a target duration.
//! Pure apart from the injected random source.

use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::bitrate::BitrateTable;
use super::durations::scene_durations;
use super::settings::CompilationSettings;
use crate::core::{CameraIndex, CoreError, CoreResult, TimeSec};

// =============================================================================
// Output Types
// =============================================================================

/// One camera pick in a compilation, relative to the compilation start
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scene {
    pub camera_index: CameraIndex,
    pub start_time: TimeSec,
    pub duration: TimeSec,
}

impl Scene {
    pub fn end_time(&self) -> TimeSec {
        self.start_time + self.duration
    }
}

/// Non-fatal condition reported alongside a distribution
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "reason", rename_all = "camelCase")]
pub enum DistributionIssue {
    EmptyInput(String),
}

/// Scenes plus the condition that emptied them, if any
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SceneDistribution {
    pub scenes: Vec<Scene>,
    pub issue: Option<DistributionIssue>,
}

impl SceneDistribution {
    fn empty(reason: String) -> Self {
        Self {
            scenes: vec![],
            issue: Some(DistributionIssue::EmptyInput(reason)),
        }
    }

    pub fn is_empty_input(&self) -> bool {
        matches!(self.issue, Some(DistributionIssue::EmptyInput(_)))
    }

    pub fn total_duration(&self) -> TimeSec {
        self.scenes.iter().map(|s| s.duration).sum()
    }

    /// Converts the reported condition into an error for `?` callers
    pub fn into_result(self) -> CoreResult<Vec<Scene>> {
        match self.issue {
            Some(DistributionIssue::EmptyInput(reason)) => Err(CoreError::EmptyInput(reason)),
            None => Ok(self.scenes),
        }
    }
}

// =============================================================================
// Distribution
// =============================================================================

/// Distributes scenes over the available cameras.
///
/// An empty `available_cameras` means cameras `1..=num_cameras`. Each scene
/// picks the main camera with `main_camera_prob`, otherwise draws among the
/// other cameras weighted by `bitrate` (uniform without it). A draw that
/// repeats the previous camera is redrawn among the remaining cameras with
/// probability `camera_change_frequency`.
pub fn distribute<R: Rng + ?Sized>(
    settings: &CompilationSettings,
    available_cameras: &[CameraIndex],
    bitrate: Option<&BitrateTable>,
    rng: &mut R,
) -> SceneDistribution {
    if let Some(reason) = settings.empty_input_reason() {
        warn!("Scene distribution skipped: {}", reason);
        return SceneDistribution::empty(reason);
    }

    let pool = camera_pool(settings.num_cameras, available_cameras);
    if pool.is_empty() {
        let reason = "no usable camera indices".to_string();
        warn!("Scene distribution skipped: {}", reason);
        return SceneDistribution::empty(reason);
    }

    let settings = settings.normalized();
    let main = settings.main_camera.filter(|m| pool.contains(m));
    let others: Vec<CameraIndex> = pool.iter().copied().filter(|c| Some(*c) != main).collect();
    let bitrate = bitrate.filter(|t| !t.is_empty());

    let durations = scene_durations(&settings, rng);
    let mut scenes: Vec<Scene> = Vec::with_capacity(durations.len());
    let mut start = 0.0;
    let mut previous: Option<CameraIndex> = None;

    for duration in durations {
        let midpoint = start + duration / 2.0;

        let mut camera = match main {
            Some(main) if others.is_empty() || rng.gen::<f64>() < settings.main_camera_prob => main,
            _ => pick_weighted(&others, bitrate, midpoint, rng),
        };

        if let Some(prev) = previous {
            if camera == prev && pool.len() > 1 && rng.gen::<f64>() < settings.camera_change_frequency
            {
                let alternatives: Vec<CameraIndex> =
                    pool.iter().copied().filter(|c| *c != prev).collect();
                camera = pick_weighted(&alternatives, bitrate, midpoint, rng);
            }
        }

        scenes.push(Scene {
            camera_index: camera,
            start_time: start,
            duration,
        });
        start += duration;
        previous = Some(camera);
    }

    // absorb accumulated rounding so the last scene ends on the target
    if let Some(last) = scenes.last_mut() {
        last.duration = settings.target_duration - last.start_time;
    }

    debug!(
        scenes = scenes.len(),
        target = settings.target_duration,
        cameras = pool.len(),
        "Distributed scenes"
    );

    SceneDistribution {
        scenes,
        issue: None,
    }
}

/// Distributes with a generator seeded from `seed`, for reproducible runs
pub fn distribute_seeded(
    settings: &CompilationSettings,
    available_cameras: &[CameraIndex],
    bitrate: Option<&BitrateTable>,
    seed: u64,
) -> SceneDistribution {
    let mut rng = StdRng::seed_from_u64(seed);
    distribute(settings, available_cameras, bitrate, &mut rng)
}

fn camera_pool(num_cameras: u32, available: &[CameraIndex]) -> Vec<CameraIndex> {
    if available.is_empty() {
        return (1..=num_cameras).collect();
    }
    let mut pool: Vec<CameraIndex> = available.iter().copied().filter(|c| *c >= 1).collect();
    pool.sort_unstable();
    pool.dedup();
    pool
}

fn pick_weighted<R: Rng + ?Sized>(
    candidates: &[CameraIndex],
    bitrate: Option<&BitrateTable>,
    time: TimeSec,
    rng: &mut R,
) -> CameraIndex {
    if let Some(table) = bitrate {
        let weights = table.weights(candidates, time);
        if let Ok(dist) = WeightedIndex::new(&weights) {
            return candidates[dist.sample(rng)];
        }
    }
    candidates[rng.gen_range(0..candidates.len())]
}
