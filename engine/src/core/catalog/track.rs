//! Track Definitions
//!
//! A Track is the ordered, non-overlapping sequence of clips recorded by
//! one camera.

use std::collections::BTreeMap;

use serde::Serialize;
use tracing::debug;

use super::MediaClip;
use crate::core::{CameraIndex, CoreError, CoreResult, TimeRange, TimeSec, TrackId, TIME_EPSILON};

/// Ordered clips of a single camera
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    id: TrackId,
    camera_index: CameraIndex,
    clips: Vec<MediaClip>,
}

impl Track {
    /// Track identifier for a camera
    pub fn id_for_camera(camera_index: CameraIndex) -> TrackId {
        format!("T{}", camera_index)
    }

    /// Builds a track from clips of one camera.
    ///
    /// Clips are sorted by start time. Contiguous clips are accepted,
    /// overlapping ones are rejected.
    pub fn from_clips(camera_index: CameraIndex, mut clips: Vec<MediaClip>) -> CoreResult<Self> {
        let id = Self::id_for_camera(camera_index);

        if let Some(foreign) = clips.iter().find(|c| c.camera_index() != camera_index) {
            return Err(CoreError::InvalidClip {
                clip_id: foreign.id().to_string(),
                reason: format!(
                    "camera {} clip placed on track {}",
                    foreign.camera_index(),
                    id
                ),
            });
        }

        clips.sort_by(|a, b| a.start_time().total_cmp(&b.start_time()));

        for pair in clips.windows(2) {
            let (prev, next) = (&pair[0], &pair[1]);
            if next.start_time() < prev.end_time() - TIME_EPSILON {
                return Err(CoreError::ClipOverlap {
                    track_id: id,
                    existing_clip_id: prev.id().to_string(),
                    new_start: next.start_time(),
                    new_end: next.end_time(),
                });
            }
        }

        Ok(Self {
            id,
            camera_index,
            clips,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn camera_index(&self) -> CameraIndex {
        self.camera_index
    }

    pub fn clips(&self) -> &[MediaClip] {
        &self.clips
    }

    pub fn is_empty(&self) -> bool {
        self.clips.is_empty()
    }

    /// Effective range `[first.start, last.end]`
    pub fn range(&self) -> Option<TimeRange> {
        let first = self.clips.first()?;
        let last = self.clips.last()?;
        Some(TimeRange::new(first.start_time(), last.end_time()))
    }

    /// Gets a clip by ID
    pub fn get_clip(&self, clip_id: &str) -> Option<&MediaClip> {
        self.clips.iter().find(|c| c.id() == clip_id)
    }

    /// Finds the clip covering `time`.
    ///
    /// An exact hit wins; otherwise the first clip within `tolerance` is
    /// returned so lookups at clip seams still resolve.
    pub fn clip_at(&self, time: TimeSec, tolerance: TimeSec) -> Option<&MediaClip> {
        self.clips
            .iter()
            .find(|c| c.contains(time, 0.0))
            .or_else(|| self.clips.iter().find(|c| c.contains(time, tolerance)))
    }

    /// Clip closest to `time` (distance to its range, earlier clip on ties)
    pub fn nearest_clip(&self, time: TimeSec) -> Option<&MediaClip> {
        self.clips.iter().min_by(|a, b| {
            a.range()
                .distance_to(time)
                .total_cmp(&b.range().distance_to(time))
        })
    }

    /// Merges clips separated by at most `gap_tolerance` into coverage ranges
    pub fn coverage(&self, gap_tolerance: TimeSec) -> Vec<TimeRange> {
        let mut ranges: Vec<TimeRange> = Vec::new();

        for clip in &self.clips {
            match ranges.last_mut() {
                Some(last) if clip.start_time() - last.end_sec <= gap_tolerance => {
                    last.end_sec = last.end_sec.max(clip.end_time());
                }
                _ => ranges.push(clip.range()),
            }
        }

        ranges
    }
}

/// Groups clips by camera into tracks, ordered by camera index
pub fn build_tracks(clips: &[MediaClip]) -> CoreResult<Vec<Track>> {
    let mut by_camera: BTreeMap<CameraIndex, Vec<MediaClip>> = BTreeMap::new();
    for clip in clips {
        by_camera
            .entry(clip.camera_index())
            .or_default()
            .push(clip.clone());
    }

    let tracks = by_camera
        .into_iter()
        .map(|(camera, clips)| Track::from_clips(camera, clips))
        .collect::<CoreResult<Vec<_>>>()?;

    debug!(
        tracks = tracks.len(),
        clips = clips.len(),
        "Built tracks from catalog"
    );
    Ok(tracks)
}
