//! Multicam Core Type Definitions
//!
//! Defines fundamental types used throughout the engine.

use serde::{Deserialize, Serialize};
use tracing::warn;

// =============================================================================
// ID Types
// =============================================================================

/// Media clip unique identifier (ULID when generated locally)
pub type ClipId = String;

/// Track unique identifier (`T{cameraIndex}`)
pub type TrackId = String;

/// Sector identity: ISO calendar date (`YYYY-MM-DD`)
pub type SectorDate = String;

/// Camera index, 1-based
pub type CameraIndex = u32;

// =============================================================================
// Time Types
// =============================================================================

/// Time in seconds (floating point).
///
/// Absolute times are unix seconds; clip-local and compilation-relative
/// times start at zero.
pub type TimeSec = f64;

/// Tolerance used when comparing accumulated floating point times
pub const TIME_EPSILON: f64 = 1e-6;

/// Returns true if two times are equal within [`TIME_EPSILON`]
pub fn approx_eq(a: TimeSec, b: TimeSec) -> bool {
    (a - b).abs() <= TIME_EPSILON
}

// =============================================================================
// Time Range
// =============================================================================

/// Closed time range `[start_sec, end_sec]`
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRange {
    pub start_sec: TimeSec,
    pub end_sec: TimeSec,
}

impl TimeRange {
    pub fn new(start_sec: TimeSec, end_sec: TimeSec) -> Self {
        if start_sec > end_sec {
            warn!(
                "TimeRange created with start > end ({} > {}), swapping",
                start_sec, end_sec
            );
            return Self {
                start_sec: end_sec,
                end_sec: start_sec,
            };
        }
        Self { start_sec, end_sec }
    }

    /// Returns duration in seconds
    pub fn duration(&self) -> TimeSec {
        self.end_sec - self.start_sec
    }

    /// Checks if a given time is within range
    pub fn contains(&self, time: TimeSec) -> bool {
        time >= self.start_sec && time <= self.end_sec
    }

    /// Checks if a time is within range, widened by `tolerance` on both ends
    pub fn contains_with_tolerance(&self, time: TimeSec, tolerance: TimeSec) -> bool {
        time >= self.start_sec - tolerance && time <= self.end_sec + tolerance
    }

    /// Checks if two ranges overlap (touching ranges do not overlap)
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start_sec < other.end_sec && self.end_sec > other.start_sec
    }

    /// Clamps a time into the range
    pub fn clamp(&self, time: TimeSec) -> TimeSec {
        time.clamp(self.start_sec, self.end_sec)
    }

    /// Distance from `time` to the nearest point of the range (0 if inside)
    pub fn distance_to(&self, time: TimeSec) -> TimeSec {
        if time < self.start_sec {
            self.start_sec - time
        } else if time > self.end_sec {
            time - self.end_sec
        } else {
            0.0
        }
    }
}
