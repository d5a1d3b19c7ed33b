//! Playback Messages
//!
//! Everything that flows through the playback engine's single ordered queue,
//! and everything it emits in return.

use serde::{Deserialize, Serialize};

use super::montage::RecordedCut;
use crate::core::catalog::Track;
use crate::core::{ClipId, SectorDate, TimeSec, TrackId};

// =============================================================================
// Inbound
// =============================================================================

/// User-facing playback commands
#[derive(Clone, Debug)]
pub enum PlaybackCommand {
    Play,
    Pause,
    Seek { time: TimeSec },
    SwitchCamera { track_id: TrackId },
    SetZoom { date: SectorDate, zoom: f64 },
    SetTracks(Vec<Track>),
    StartRecording,
    StopRecording,
}

/// Notifications from the media backends
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MediaEvent {
    /// The element's own playback position moved
    TimeAdvanced {
        track_id: TrackId,
        clip_id: ClipId,
        local_time: TimeSec,
    },
    /// The element loaded metadata for the load with this generation and can seek
    Ready { track_id: TrackId, generation: u64 },
    /// The element reported a playback failure
    Error { track_id: TrackId, code: String },
}

/// One entry of the engine queue
#[derive(Clone, Debug)]
pub enum PlaybackMessage {
    Command(PlaybackCommand),
    Media(MediaEvent),
    /// Frame tick carrying the wall-clock delta since the previous one
    Tick { delta: TimeSec },
}

impl From<PlaybackCommand> for PlaybackMessage {
    fn from(command: PlaybackCommand) -> Self {
        Self::Command(command)
    }
}

impl From<MediaEvent> for PlaybackMessage {
    fn from(event: MediaEvent) -> Self {
        Self::Media(event)
    }
}

// =============================================================================
// Outbound
// =============================================================================

/// Instructions for the media backends
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum MediaCommand {
    /// Load a clip and report `Ready` with the same generation
    Load {
        track_id: TrackId,
        clip_id: ClipId,
        path: String,
        local_time: TimeSec,
        generation: u64,
    },
    Seek { track_id: TrackId, local_time: TimeSec },
    Play { track_id: TrackId },
    Pause { track_id: TrackId },
}

impl MediaCommand {
    pub fn track_id(&self) -> &str {
        match self {
            Self::Load { track_id, .. }
            | Self::Seek { track_id, .. }
            | Self::Play { track_id }
            | Self::Pause { track_id } => track_id,
        }
    }
}

/// Non-fatal conditions surfaced to the caller
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Diagnostic {
    /// Media and clock disagreed beyond the resync threshold; the clock won
    SyncDrift {
        track_id: TrackId,
        clock_time: TimeSec,
        media_time: TimeSec,
        drift: TimeSec,
    },
    /// A backend failed; the clock was paused
    MediaError { track_id: TrackId, code: String },
    /// A backend never reported ready; the load was completed anyway
    ReadyTimeout { track_id: TrackId, generation: u64 },
    /// A ready report for a superseded load was ignored
    StaleReady { track_id: TrackId, generation: u64 },
}

/// Output of one engine step
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "camelCase")]
pub enum EngineOutput {
    Media(MediaCommand),
    Diagnostic(Diagnostic),
    MontageRecorded(Vec<RecordedCut>),
}
