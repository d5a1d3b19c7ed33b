//! Montage Recorder
//!
//! Records camera switches made during playback as a list of cuts.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::{CameraIndex, TimeSec, TrackId, TIME_EPSILON};

/// One recorded stretch on a single camera, in timeline time
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedCut {
    pub track_id: TrackId,
    pub camera_index: CameraIndex,
    pub start: TimeSec,
    pub duration: TimeSec,
}

#[derive(Clone, Debug)]
struct OpenCut {
    track_id: TrackId,
    camera_index: CameraIndex,
    start: TimeSec,
}

#[derive(Clone, Debug, Default)]
pub struct MontageRecorder {
    open: Option<OpenCut>,
    cuts: Vec<RecordedCut>,
}

impl MontageRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_recording(&self) -> bool {
        self.open.is_some()
    }

    /// Starts a recording on the given camera; an ongoing one is discarded
    pub fn start(&mut self, track_id: &str, camera_index: CameraIndex, time: TimeSec) {
        self.cuts.clear();
        self.open = Some(OpenCut {
            track_id: track_id.to_string(),
            camera_index,
            start: time,
        });
        info!(track_id, time, "Montage recording started");
    }

    /// Closes the current cut at `time` and opens one on the new camera
    pub fn on_switch(&mut self, track_id: &str, camera_index: CameraIndex, time: TimeSec) {
        if !self.is_recording() {
            return;
        }
        self.close(time);
        self.open = Some(OpenCut {
            track_id: track_id.to_string(),
            camera_index,
            start: time,
        });
    }

    /// Ends the recording and returns the cuts in recording order
    pub fn stop(&mut self, time: TimeSec) -> Vec<RecordedCut> {
        self.close(time);
        let cuts = std::mem::take(&mut self.cuts);
        info!(cuts = cuts.len(), "Montage recording stopped");
        cuts
    }

    fn close(&mut self, time: TimeSec) {
        let Some(open) = self.open.take() else {
            return;
        };
        let duration = time - open.start;
        // empty or backwards (after a seek) stretches are not cuts
        if duration <= TIME_EPSILON {
            debug!(track_id = %open.track_id, "Skipping empty montage cut");
            return;
        }
        self.cuts.push(RecordedCut {
            track_id: open.track_id,
            camera_index: open.camera_index,
            start: open.start,
            duration,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_cut_per_switch() {
        let mut recorder = MontageRecorder::new();
        recorder.start("T1", 1, 100.0);
        recorder.on_switch("T2", 2, 104.0);
        recorder.on_switch("T1", 1, 110.5);

        let cuts = recorder.stop(112.0);

        assert_eq!(cuts.len(), 3);
        assert_eq!(cuts[0].track_id, "T1");
        assert_eq!(cuts[0].duration, 4.0);
        assert_eq!(cuts[1].camera_index, 2);
        assert_eq!(cuts[1].start, 104.0);
        assert_eq!(cuts[1].duration, 6.5);
        assert_eq!(cuts[2].duration, 1.5);
        assert!(!recorder.is_recording());
    }

    #[test]
    fn test_switch_without_recording_is_ignored() {
        let mut recorder = MontageRecorder::new();
        recorder.on_switch("T2", 2, 5.0);

        assert!(!recorder.is_recording());
        assert!(recorder.stop(10.0).is_empty());
    }

    #[test]
    fn test_empty_cuts_are_skipped() {
        let mut recorder = MontageRecorder::new();
        recorder.start("T1", 1, 50.0);
        recorder.on_switch("T2", 2, 50.0);
        recorder.on_switch("T3", 3, 40.0);

        let cuts = recorder.stop(45.0);

        assert_eq!(cuts.len(), 1);
        assert_eq!(cuts[0].track_id, "T3");
        assert_eq!(cuts[0].duration, 5.0);
    }
}
