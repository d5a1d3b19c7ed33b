//! Multicam Error Definitions
//!
//! Defines error types used throughout the engine.
//!
//! Only synchronous input rejection is modelled as an error. Conditions the
//! caller is expected to surface while work continues (dropped scenes, sync
//! drift, backend failures) are carried as values next to the result.

use thiserror::Error;

use super::{ClipId, TimeSec, TrackId};

/// Core engine error types
#[derive(Error, Debug)]
pub enum CoreError {
    // =========================================================================
    // Catalog Errors
    // =========================================================================
    #[error("Invalid clip {clip_id}: {reason}")]
    InvalidClip { clip_id: ClipId, reason: String },

    #[error(
        "Clip overlap on track {track_id}: {new_start:.3}~{new_end:.3}s conflicts with clip {existing_clip_id}"
    )]
    ClipOverlap {
        track_id: TrackId,
        existing_clip_id: ClipId,
        new_start: TimeSec,
        new_end: TimeSec,
    },

    // =========================================================================
    // Timeline Errors
    // =========================================================================
    #[error("Track not found: {0}")]
    TrackNotFound(TrackId),

    #[error("Track has no clips: {0}")]
    EmptyTrack(TrackId),

    #[error("Sector not found: {0}")]
    SectorNotFound(String),

    #[error("Invalid time: {0}")]
    InvalidTime(TimeSec),

    // =========================================================================
    // Compilation Errors
    // =========================================================================
    #[error("Empty input: {0}")]
    EmptyInput(String),

    #[error("Invalid settings: {0}")]
    InvalidSettings(String),

    // =========================================================================
    // Playback Errors
    // =========================================================================
    #[error("Playback engine is closed")]
    EngineClosed,

    // =========================================================================
    // General Errors
    // =========================================================================
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON parsing error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Core engine result type
pub type CoreResult<T> = Result<T, CoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_overlap_message() {
        let err = CoreError::ClipOverlap {
            track_id: "T1".to_string(),
            existing_clip_id: "clip_a".to_string(),
            new_start: 1.5,
            new_end: 4.25,
        };

        assert_eq!(
            err.to_string(),
            "Clip overlap on track T1: 1.500~4.250s conflicts with clip clip_a"
        );
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{");
        let err: CoreError = parse.unwrap_err().into();
        assert!(matches!(err, CoreError::JsonError(_)));
    }
}
