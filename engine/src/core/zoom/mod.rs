//! Zoom/Scale Mapper
//!
//! Converts between time and pixel space for a sector. Zoom is driven
//! logarithmically: a linear slider position maps to an exponential zoom
//! factor, and the zoom buttons move by one logarithmic step.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::core::sectors::Sector;
use crate::core::{TimeRange, TimeSec};

/// Upper bound on ruler ticks produced for one window
pub const MAX_TICKS: usize = 5_000;

/// Slider range used by [`ZoomMapper::to_slider`]
pub const SLIDER_MAX: f64 = 100.0;

// =============================================================================
// Zoom Mapper
// =============================================================================

/// Logarithmic zoom controller
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ZoomMapper {
    min_zoom: f64,
    max_zoom: f64,
    steps: u32,
}

impl Default for ZoomMapper {
    fn default() -> Self {
        Self {
            min_zoom: 0.001,
            max_zoom: 18.0,
            steps: 100,
        }
    }
}

impl ZoomMapper {
    /// Creates a mapper, falling back to defaults for unusable bounds
    pub fn new(min_zoom: f64, max_zoom: f64, steps: u32) -> Self {
        let defaults = Self::default();
        let valid = min_zoom.is_finite() && max_zoom.is_finite() && min_zoom > 0.0 && max_zoom > min_zoom;
        if !valid {
            warn!(
                "Invalid zoom bounds {}..{}, using defaults",
                min_zoom, max_zoom
            );
            return Self {
                steps: steps.max(1),
                ..defaults
            };
        }
        Self {
            min_zoom,
            max_zoom,
            steps: steps.max(1),
        }
    }

    pub fn min_zoom(&self) -> f64 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> f64 {
        self.max_zoom
    }

    /// Clamps a zoom factor into bounds; non-finite input maps to 1.0
    pub fn clamp(&self, zoom: f64) -> f64 {
        let zoom = if zoom.is_finite() && zoom > 0.0 { zoom } else { 1.0 };
        zoom.clamp(self.min_zoom, self.max_zoom)
    }

    fn log_span(&self) -> (f64, f64) {
        (self.min_zoom.ln(), self.max_zoom.ln())
    }

    fn log_step(&self) -> f64 {
        let (lo, hi) = self.log_span();
        (hi - lo) / self.steps as f64
    }

    /// Slider position in `[0, 100]` for a zoom factor
    pub fn to_slider(&self, zoom: f64) -> f64 {
        let (lo, hi) = self.log_span();
        ((self.clamp(zoom).ln() - lo) / (hi - lo)) * SLIDER_MAX
    }

    /// Zoom factor for a slider position in `[0, 100]`
    pub fn from_slider(&self, position: f64) -> f64 {
        let (lo, hi) = self.log_span();
        let position = if position.is_finite() {
            position.clamp(0.0, SLIDER_MAX)
        } else {
            0.0
        };
        self.clamp((lo + (position / SLIDER_MAX) * (hi - lo)).exp())
    }

    /// One logarithmic step closer
    pub fn zoom_in(&self, zoom: f64) -> f64 {
        self.clamp((self.clamp(zoom).ln() + self.log_step()).exp())
    }

    /// One logarithmic step further out
    pub fn zoom_out(&self, zoom: f64) -> f64 {
        self.clamp((self.clamp(zoom).ln() - self.log_step()).exp())
    }

    /// Scale for drawing a sector at `zoom`
    pub fn scale_for(&self, sector: &Sector, zoom: f64, pixels_per_second: f64) -> SectorScale {
        SectorScale::new(sector.range(), self.clamp(zoom), pixels_per_second)
    }
}

// =============================================================================
// Sector Scale
// =============================================================================

/// Time/pixel mapping for one sector at one zoom level
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SectorScale {
    range: TimeRange,
    zoom: f64,
    pixels_per_second: f64,
}

impl SectorScale {
    pub fn new(range: TimeRange, zoom: f64, pixels_per_second: f64) -> Self {
        let pixels_per_second = if pixels_per_second.is_finite() && pixels_per_second > 0.0 {
            pixels_per_second
        } else {
            1.0
        };
        Self {
            range,
            zoom,
            pixels_per_second,
        }
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    /// Effective pixels per second at the current zoom
    pub fn px_per_sec(&self) -> f64 {
        self.pixels_per_second * self.zoom
    }

    /// Total width of the sector in pixels
    pub fn width_px(&self) -> f64 {
        self.range.duration() * self.px_per_sec()
    }

    pub fn time_to_px(&self, time: TimeSec) -> f64 {
        (self.range.clamp(time) - self.range.start_sec) * self.px_per_sec()
    }

    pub fn px_to_time(&self, px: f64) -> TimeSec {
        self.range.clamp(self.range.start_sec + px / self.px_per_sec())
    }

    /// Position of `time` as a percentage of the sector
    pub fn time_to_percent(&self, time: TimeSec) -> f64 {
        let duration = self.range.duration();
        if duration <= 0.0 {
            return 0.0;
        }
        (self.range.clamp(time) - self.range.start_sec) / duration * 100.0
    }

    pub fn percent_to_time(&self, percent: f64) -> TimeSec {
        let percent = percent.clamp(0.0, 100.0);
        self.range.start_sec + self.range.duration() * percent / 100.0
    }

    /// Ruler ticks for the part of `window` inside the sector
    pub fn ticks(&self, window: TimeRange) -> Vec<Tick> {
        let start = window.start_sec.max(self.range.start_sec);
        let end = window.end_sec.min(self.range.end_sec);
        if start > end {
            return vec![];
        }

        let spacing = TickSpacing::for_zoom(self.zoom);
        let mut index = (start / spacing.minor).ceil() as i64;
        let mut ticks = Vec::new();

        loop {
            let time = index as f64 * spacing.minor;
            if time > end {
                break;
            }
            if ticks.len() >= MAX_TICKS {
                warn!(
                    "Tick limit reached for window {:.1}~{:.1}s",
                    window.start_sec, window.end_sec
                );
                break;
            }
            let ratio = time / spacing.major;
            ticks.push(Tick {
                time,
                major: (ratio - ratio.round()).abs() < 1e-9,
            });
            index += 1;
        }

        ticks
    }
}

/// Ruler spacing in seconds
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickSpacing {
    pub major: TimeSec,
    pub minor: TimeSec,
}

impl TickSpacing {
    /// Coarser labels as the view zooms out
    pub fn for_zoom(zoom: f64) -> Self {
        let major = if zoom > 5.0 {
            1.0
        } else if zoom > 2.0 {
            5.0
        } else if zoom > 1.0 {
            10.0
        } else if zoom > 0.5 {
            30.0
        } else {
            60.0
        };
        let minor = major / if zoom > 1.0 { 5.0 } else { 2.0 };
        Self { major, minor }
    }
}

/// One ruler mark
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tick {
    pub time: TimeSec,
    pub major: bool,
}
