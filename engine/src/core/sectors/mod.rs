//! Sector Partitioner
//!
//! Groups track clips into calendar-day sectors. Each sector has its own
//! time range; zoom and last-visited position are kept by the timeline
//! clock, keyed by the sector date.
//!
//! Partitioning is pure and deterministic. A clip spanning midnight belongs
//! to the sector of its start time; a track with clips on several days is
//! split logically per sector without touching the track itself.

use std::collections::BTreeMap;

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::catalog::Track;
use crate::core::{CameraIndex, ClipId, SectorDate, TimeRange, TimeSec, TrackId};

// =============================================================================
// Sector
// =============================================================================

/// The part of one track that falls into a sector
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorTrack {
    pub track_id: TrackId,
    pub camera_index: CameraIndex,
    /// Clips of the track starting on the sector date, in time order
    pub clip_ids: Vec<ClipId>,
    /// Range spanned by those clips
    pub range: TimeRange,
}

/// Calendar-day grouping of tracks
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sector {
    /// ISO date, used as sector identity
    pub date: SectorDate,
    pub start_time: TimeSec,
    pub end_time: TimeSec,
    pub tracks: Vec<SectorTrack>,
}

impl Sector {
    pub fn range(&self) -> TimeRange {
        TimeRange::new(self.start_time, self.end_time)
    }

    pub fn duration(&self) -> TimeSec {
        self.end_time - self.start_time
    }

    pub fn contains(&self, time: TimeSec) -> bool {
        self.range().contains(time)
    }

    /// Gets the sector slice of a track
    pub fn track(&self, track_id: &str) -> Option<&SectorTrack> {
        self.tracks.iter().find(|t| t.track_id == track_id)
    }

    /// Returns true if the clip starts inside this sector
    pub fn has_clip(&self, clip_id: &str) -> bool {
        self.tracks
            .iter()
            .any(|t| t.clip_ids.iter().any(|id| id == clip_id))
    }
}

/// Per-sector view state, owned by the timeline clock
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorState {
    pub zoom_level: f64,
    pub last_visited_time: TimeSec,
}

impl SectorState {
    /// Initial state: global zoom, playback position at the sector start
    pub fn for_sector(sector: &Sector, default_zoom: f64) -> Self {
        Self {
            zoom_level: default_zoom,
            last_visited_time: sector.start_time,
        }
    }
}

// =============================================================================
// Partitioner
// =============================================================================

/// Splits tracks into calendar-day sectors in a configured timezone
#[derive(Clone, Debug, PartialEq)]
pub struct SectorPartitioner {
    offset: FixedOffset,
}

impl Default for SectorPartitioner {
    fn default() -> Self {
        Self::utc()
    }
}

impl SectorPartitioner {
    /// Partitioner for a fixed UTC offset in minutes (east positive)
    pub fn new(utc_offset_minutes: i32) -> Self {
        let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60))
            .unwrap_or_else(|| {
                warn!(
                    "UTC offset of {} minutes is out of range, using UTC",
                    utc_offset_minutes
                );
                Utc.fix()
            });
        Self { offset }
    }

    pub fn utc() -> Self {
        Self { offset: Utc.fix() }
    }

    /// Calendar date (`YYYY-MM-DD`) of an absolute time in this timezone
    pub fn date_of(&self, time: TimeSec) -> Option<SectorDate> {
        if !time.is_finite() {
            return None;
        }
        let secs = time.floor();
        let nanos = ((time - secs) * 1e9).clamp(0.0, 999_999_999.0) as u32;
        let instant = DateTime::<Utc>::from_timestamp(secs as i64, nanos)?;
        Some(
            instant
                .with_timezone(&self.offset)
                .date_naive()
                .format("%Y-%m-%d")
                .to_string(),
        )
    }

    /// Groups every clip by the date of its start time.
    ///
    /// Sectors come back sorted by start time; an empty track list yields
    /// no sectors.
    pub fn partition(&self, tracks: &[Track]) -> Vec<Sector> {
        let mut by_date: BTreeMap<SectorDate, Vec<SectorTrack>> = BTreeMap::new();

        for track in tracks {
            let mut per_date: BTreeMap<SectorDate, SectorTrack> = BTreeMap::new();

            for clip in track.clips() {
                let Some(date) = self.date_of(clip.start_time()) else {
                    warn!(
                        clip_id = %clip.id(),
                        "Clip start time cannot be placed on a calendar, skipping"
                    );
                    continue;
                };

                per_date
                    .entry(date)
                    .and_modify(|slice| {
                        slice.clip_ids.push(clip.id().to_string());
                        slice.range.start_sec = slice.range.start_sec.min(clip.start_time());
                        slice.range.end_sec = slice.range.end_sec.max(clip.end_time());
                    })
                    .or_insert_with(|| SectorTrack {
                        track_id: track.id().to_string(),
                        camera_index: track.camera_index(),
                        clip_ids: vec![clip.id().to_string()],
                        range: clip.range(),
                    });
            }

            for (date, slice) in per_date {
                by_date.entry(date).or_default().push(slice);
            }
        }

        let mut sectors: Vec<Sector> = by_date
            .into_iter()
            .map(|(date, tracks)| {
                let start_time = tracks
                    .iter()
                    .map(|t| t.range.start_sec)
                    .fold(f64::INFINITY, f64::min);
                let end_time = tracks
                    .iter()
                    .map(|t| t.range.end_sec)
                    .fold(f64::NEG_INFINITY, f64::max);
                Sector {
                    date,
                    start_time,
                    end_time,
                    tracks,
                }
            })
            .collect();

        sectors.sort_by(|a, b| a.start_time.total_cmp(&b.start_time));
        sectors
    }

    /// Finds the sector owning `time`.
    ///
    /// When sectors overlap (a clip ran past midnight) the sector whose date
    /// matches `time` wins, then the earliest containing sector.
    pub fn owning_sector<'a>(&self, sectors: &'a [Sector], time: TimeSec) -> Option<&'a Sector> {
        let date = self.date_of(time);
        let containing: Vec<&'a Sector> = sectors.iter().filter(|s| s.contains(time)).collect();

        containing
            .iter()
            .find(|s| Some(&s.date) == date.as_ref())
            .or(containing.first())
            .copied()
    }

    /// Sector owning `time`, or the nearest sector when `time` falls between
    /// or outside all of them
    pub fn nearest_sector<'a>(&self, sectors: &'a [Sector], time: TimeSec) -> Option<&'a Sector> {
        self.owning_sector(sectors, time).or_else(|| {
            sectors.iter().min_by(|a, b| {
                a.range()
                    .distance_to(time)
                    .total_cmp(&b.range().distance_to(time))
            })
        })
    }
}
