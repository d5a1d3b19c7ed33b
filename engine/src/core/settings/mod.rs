//! Engine Configuration
//!
//! JSON configuration for the timeline, playback synchronization and
//! compilation defaults, with:
//! - Schema version and serde defaults for every field
//! - Tolerant normalization (bad values are clamped, never fatal)
//! - Accessors that build the component configurations
//!
//! Writing configuration back to disk is left to the host application.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::core::compilation::{CompilationDefaults, CompilationSettings};
use crate::core::playback::SyncConfig;
use crate::core::sectors::SectorPartitioner;
use crate::core::zoom::ZoomMapper;
use crate::core::{CoreResult, TimeSec};

/// Configuration schema version
pub const CONFIG_VERSION: u32 = 1;

/// Largest UTC offset accepted, in minutes (±14h)
pub const MAX_UTC_OFFSET_MINUTES: i32 = 14 * 60;

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    /// Schema version for migrations
    #[serde(default = "default_version")]
    pub version: u32,

    /// Timeline and sector view settings
    #[serde(default)]
    pub timeline: TimelineConfig,

    /// Clock/media synchronization settings
    #[serde(default)]
    pub playback: PlaybackConfig,

    /// Defaults for compilation requests
    #[serde(default)]
    pub compilation: CompilationDefaults,
}

fn default_version() -> u32 {
    CONFIG_VERSION
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            timeline: TimelineConfig::default(),
            playback: PlaybackConfig::default(),
            compilation: CompilationDefaults::default(),
        }
    }
}

impl EngineConfig {
    /// Parses and normalizes a configuration document
    pub fn from_json_str(json: &str) -> CoreResult<Self> {
        let mut config: EngineConfig = serde_json::from_str(json)?;
        config.normalize();
        Ok(config)
    }

    /// Loads configuration from disk, returning defaults if the file is
    /// missing or unreadable
    pub fn load(path: &Path) -> Self {
        if !path.exists() {
            info!("Config file {} not found, using defaults", path.display());
            return Self::default();
        }

        let result = fs::read_to_string(path)
            .map_err(crate::core::CoreError::from)
            .and_then(|content| Self::from_json_str(&content));

        match result {
            Ok(config) => {
                info!("Loaded engine config from {}", path.display());
                config
            }
            Err(e) => {
                warn!("Failed to load engine config, using defaults: {}", e);
                Self::default()
            }
        }
    }

    /// Clamps out-of-range values in place
    pub fn normalize(&mut self) {
        if self.version > CONFIG_VERSION {
            warn!(
                "Config version {} is newer than supported {}",
                self.version, CONFIG_VERSION
            );
        }
        self.version = CONFIG_VERSION;

        let t = &mut self.timeline;
        t.utc_offset_minutes = t
            .utc_offset_minutes
            .clamp(-MAX_UTC_OFFSET_MINUTES, MAX_UTC_OFFSET_MINUTES);
        t.min_zoom = clamp_f64(t.min_zoom, 1e-6, 1_000.0, default_min_zoom());
        t.max_zoom = clamp_f64(t.max_zoom, 1e-6, 1_000.0, default_max_zoom());
        if t.min_zoom >= t.max_zoom {
            warn!("minZoom must be below maxZoom, restoring zoom bounds");
            t.min_zoom = default_min_zoom();
            t.max_zoom = default_max_zoom();
        }
        t.default_zoom = clamp_f64(t.default_zoom, t.min_zoom, t.max_zoom, 1.0);
        t.zoom_steps = t.zoom_steps.clamp(2, 10_000);
        t.pixels_per_second = clamp_f64(t.pixels_per_second, 0.01, 10_000.0, 1.0);

        let p = &mut self.playback;
        p.tick_hz = p.tick_hz.clamp(1, 240);
        p.drift_threshold_ms = p.drift_threshold_ms.clamp(1, 5_000);
        p.resync_threshold_ms = p.resync_threshold_ms.clamp(p.drift_threshold_ms, 60_000);
        p.media_update_hz = p.media_update_hz.clamp(1, 240);
        p.ready_timeout_ms = p.ready_timeout_ms.clamp(500, 1_500);
        p.ready_retries = p.ready_retries.min(5);
        p.clip_tolerance_ms = p.clip_tolerance_ms.min(5_000);

        self.compilation.normalize();
    }

    /// Sector partitioner in the configured timezone
    pub fn partitioner(&self) -> SectorPartitioner {
        SectorPartitioner::new(self.timeline.utc_offset_minutes)
    }

    pub fn zoom_mapper(&self) -> ZoomMapper {
        ZoomMapper::new(
            self.timeline.min_zoom,
            self.timeline.max_zoom,
            self.timeline.zoom_steps,
        )
    }

    pub fn sync_config(&self) -> SyncConfig {
        let p = &self.playback;
        SyncConfig {
            drift_threshold: millis_to_sec(p.drift_threshold_ms),
            resync_threshold: millis_to_sec(p.resync_threshold_ms),
            media_update_hz: f64::from(p.media_update_hz),
            ready_timeout: Duration::from_millis(p.ready_timeout_ms),
            ready_retries: p.ready_retries,
            clip_tolerance: millis_to_sec(p.clip_tolerance_ms),
        }
    }

    /// Compilation request seeded with the configured defaults
    pub fn compilation_settings(&self, target_duration: TimeSec, num_cameras: u32) -> CompilationSettings {
        CompilationSettings::from_defaults(&self.compilation, target_duration, num_cameras)
    }
}

fn clamp_f64(value: f64, min: f64, max: f64, fallback: f64) -> f64 {
    if !value.is_finite() {
        return fallback;
    }
    value.clamp(min, max)
}

fn millis_to_sec(ms: u64) -> TimeSec {
    ms as f64 / 1000.0
}

// =============================================================================
// Timeline
// =============================================================================

/// Timeline and sector view settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TimelineConfig {
    /// Timezone used for sector dates, minutes east of UTC
    #[serde(default)]
    pub utc_offset_minutes: i32,

    /// Zoom a sector starts with
    #[serde(default = "default_zoom")]
    pub default_zoom: f64,

    #[serde(default = "default_min_zoom")]
    pub min_zoom: f64,

    #[serde(default = "default_max_zoom")]
    pub max_zoom: f64,

    /// Logarithmic steps between min and max zoom
    #[serde(default = "default_zoom_steps")]
    pub zoom_steps: u32,

    /// Pixels per second at zoom 1.0
    #[serde(default = "default_pixels_per_second")]
    pub pixels_per_second: f64,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
            default_zoom: default_zoom(),
            min_zoom: default_min_zoom(),
            max_zoom: default_max_zoom(),
            zoom_steps: default_zoom_steps(),
            pixels_per_second: default_pixels_per_second(),
        }
    }
}

fn default_zoom() -> f64 {
    1.0
}

fn default_min_zoom() -> f64 {
    0.001
}

fn default_max_zoom() -> f64 {
    18.0
}

fn default_zoom_steps() -> u32 {
    100
}

fn default_pixels_per_second() -> f64 {
    1.0
}

// =============================================================================
// Playback
// =============================================================================

/// Clock/media synchronization settings
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackConfig {
    /// Frame ticks per second while playing
    #[serde(default = "default_tick_hz")]
    pub tick_hz: u32,

    /// Clock-to-media pushes only beyond this drift
    #[serde(default = "default_drift_threshold_ms")]
    pub drift_threshold_ms: u64,

    /// Drift that forces the media back to the clock
    #[serde(default = "default_resync_threshold_ms")]
    pub resync_threshold_ms: u64,

    /// Upper bound on media-to-clock writes per second
    #[serde(default = "default_media_update_hz")]
    pub media_update_hz: u32,

    /// Readiness backstop per load attempt
    #[serde(default = "default_ready_timeout_ms")]
    pub ready_timeout_ms: u64,

    #[serde(default = "default_ready_retries")]
    pub ready_retries: u32,

    /// Slack for clip-at-time lookups
    #[serde(default = "default_clip_tolerance_ms")]
    pub clip_tolerance_ms: u64,
}

impl Default for PlaybackConfig {
    fn default() -> Self {
        Self {
            tick_hz: default_tick_hz(),
            drift_threshold_ms: default_drift_threshold_ms(),
            resync_threshold_ms: default_resync_threshold_ms(),
            media_update_hz: default_media_update_hz(),
            ready_timeout_ms: default_ready_timeout_ms(),
            ready_retries: default_ready_retries(),
            clip_tolerance_ms: default_clip_tolerance_ms(),
        }
    }
}

fn default_tick_hz() -> u32 {
    60
}

fn default_drift_threshold_ms() -> u64 {
    100
}

fn default_resync_threshold_ms() -> u64 {
    2_000
}

fn default_media_update_hz() -> u32 {
    60
}

fn default_ready_timeout_ms() -> u64 {
    1_000
}

fn default_ready_retries() -> u32 {
    1
}

fn default_clip_tolerance_ms() -> u64 {
    300
}
