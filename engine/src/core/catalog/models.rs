//! Media Clip Definitions
//!
//! Defines the probed media items consumed from ingestion.
//! A `MediaClip` is immutable once built; re-probing produces a new value.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::{CameraIndex, ClipId, CoreError, CoreResult, TimeRange, TimeSec};

// =============================================================================
// Probe Data
// =============================================================================

/// Stream metadata reported by the (external) file probe
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProbeInfo {
    #[serde(default)]
    pub codec: Option<String>,
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub frame_rate: Option<f64>,
    /// Overall bitrate in bits/s
    #[serde(default)]
    pub bitrate: Option<u64>,
}

/// One bitrate measurement
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BitrateSample {
    /// Timestamp in seconds; clip-local on clips, compilation-relative in tables
    pub time: TimeSec,
    /// Bitrate in bits/s
    pub bitrate: f64,
}

impl BitrateSample {
    pub fn new(time: TimeSec, bitrate: f64) -> Self {
        Self { time, bitrate }
    }
}

// =============================================================================
// Media Clip
// =============================================================================

/// Wire shape of a catalog entry
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MediaClipRecord {
    #[serde(default)]
    id: Option<ClipId>,
    path: String,
    start_time: TimeSec,
    duration: TimeSec,
    camera_index: CameraIndex,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    probe: Option<ProbeInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    bitrate_samples: Vec<BitrateSample>,
}

/// A recorded media file placed on the absolute (real-world) timeline
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "MediaClipRecord", into = "MediaClipRecord")]
pub struct MediaClip {
    id: ClipId,
    path: String,
    start_time: TimeSec,
    duration: TimeSec,
    camera_index: CameraIndex,
    probe: Option<ProbeInfo>,
    bitrate_samples: Vec<BitrateSample>,
}

impl TryFrom<MediaClipRecord> for MediaClip {
    type Error = CoreError;

    fn try_from(record: MediaClipRecord) -> Result<Self, Self::Error> {
        let id = record
            .id
            .filter(|id| !id.trim().is_empty())
            .unwrap_or_else(|| ulid::Ulid::new().to_string());

        let clip = MediaClip::new(
            &id,
            &record.path,
            record.start_time,
            record.duration,
            record.camera_index,
        )?
        .with_bitrate_samples(record.bitrate_samples);

        Ok(match record.probe {
            Some(probe) => clip.with_probe(probe),
            None => clip,
        })
    }
}

impl From<MediaClip> for MediaClipRecord {
    fn from(clip: MediaClip) -> Self {
        Self {
            id: Some(clip.id),
            path: clip.path,
            start_time: clip.start_time,
            duration: clip.duration,
            camera_index: clip.camera_index,
            probe: clip.probe,
            bitrate_samples: clip.bitrate_samples,
        }
    }
}

impl MediaClip {
    /// Creates a validated clip without probe data
    pub fn new(
        id: &str,
        path: &str,
        start_time: TimeSec,
        duration: TimeSec,
        camera_index: CameraIndex,
    ) -> CoreResult<Self> {
        let invalid = |reason: &str| CoreError::InvalidClip {
            clip_id: id.to_string(),
            reason: reason.to_string(),
        };

        if !start_time.is_finite() {
            return Err(invalid("start time is not finite"));
        }
        if !duration.is_finite() || duration < 0.0 {
            return Err(invalid("duration must be a finite, non-negative number"));
        }
        if camera_index == 0 {
            return Err(invalid("camera index is 1-based"));
        }

        Ok(Self {
            id: id.to_string(),
            path: path.to_string(),
            start_time,
            duration,
            camera_index,
            probe: None,
            bitrate_samples: vec![],
        })
    }

    /// Attaches probe data during ingestion
    pub fn with_probe(mut self, probe: ProbeInfo) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Attaches a clip-local bitrate series during ingestion.
    ///
    /// Non-finite samples are discarded and the rest sorted by time.
    pub fn with_bitrate_samples(mut self, samples: Vec<BitrateSample>) -> Self {
        let total = samples.len();
        let mut samples: Vec<BitrateSample> = samples
            .into_iter()
            .filter(|s| s.time.is_finite() && s.bitrate.is_finite() && s.bitrate >= 0.0)
            .collect();
        if samples.len() < total {
            warn!(
                clip_id = %self.id,
                dropped = total - samples.len(),
                "Discarded invalid bitrate samples"
            );
        }
        samples.sort_by(|a, b| a.time.total_cmp(&b.time));
        self.bitrate_samples = samples;
        self
    }

    /// Returns a new clip carrying fresh probe data; `self` is left untouched
    pub fn reprobed(&self, probe: ProbeInfo) -> Self {
        self.clone().with_probe(probe)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Absolute start time (unix seconds)
    pub fn start_time(&self) -> TimeSec {
        self.start_time
    }

    pub fn duration(&self) -> TimeSec {
        self.duration
    }

    /// Absolute end time (unix seconds)
    pub fn end_time(&self) -> TimeSec {
        self.start_time + self.duration
    }

    pub fn camera_index(&self) -> CameraIndex {
        self.camera_index
    }

    pub fn probe(&self) -> Option<&ProbeInfo> {
        self.probe.as_ref()
    }

    pub fn bitrate_samples(&self) -> &[BitrateSample] {
        &self.bitrate_samples
    }

    /// Absolute range covered by the clip
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time())
    }

    /// Checks if an absolute time falls inside the clip (widened by `tolerance`)
    pub fn contains(&self, time: TimeSec, tolerance: TimeSec) -> bool {
        self.range().contains_with_tolerance(time, tolerance)
    }

    /// Maps an absolute time to a clip-local playback position in `[0, duration]`
    pub fn local_time(&self, time: TimeSec) -> TimeSec {
        (time - self.start_time).clamp(0.0, self.duration)
    }

    /// Bitrate at a clip-local time.
    ///
    /// Uses the latest sample at or before `local` (the first sample before
    /// the series starts), falling back to the probe's overall bitrate.
    pub fn bitrate_at(&self, local: TimeSec) -> Option<f64> {
        if let Some(first) = self.bitrate_samples.first() {
            let sample = self
                .bitrate_samples
                .iter()
                .take_while(|s| s.time <= local)
                .last()
                .unwrap_or(first);
            return Some(sample.bitrate);
        }

        self.probe
            .as_ref()
            .and_then(|p| p.bitrate)
            .map(|b| b as f64)
    }
}
