//! Playback Synchronizer
//!
//! Binds the timeline clock to the media elements, one per track. Only one
//! direction is authoritative per update:
//!
//! - clock to media: after clock-sourced changes, push the clip-local
//!   position when the element drifted past `drift_threshold`
//! - media to clock: the active element's own position is written back while
//!   playing, rate limited to `media_update_hz`. Only positions at or ahead
//!   of the clock are written; a lagging element gets a seek instead
//!
//! A write that came from media marks the next clock-to-media pass as an
//! echo and skips it. Each load carries a generation; the element reports
//! ready with it, and reports for superseded loads are ignored.

use std::collections::BTreeMap;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::clock::{CameraSwitch, SwitchCompleted, TimelineClock};
use super::events::{Diagnostic, EngineOutput, MediaCommand};
use crate::core::{ClipId, TimeSec, TrackId};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Clone, Debug, PartialEq)]
pub struct SyncConfig {
    /// Clock-to-media pushes only happen past this drift (seconds)
    pub drift_threshold: TimeSec,
    /// Media/clock disagreement that triggers a forced resync (seconds)
    pub resync_threshold: TimeSec,
    /// Upper bound on media-to-clock writes per second
    pub media_update_hz: f64,
    /// Backstop for elements that never report ready
    pub ready_timeout: Duration,
    /// Load retries before a switch is completed without readiness
    pub ready_retries: u32,
    /// Slack when looking up the clip at a time (seconds)
    pub clip_tolerance: TimeSec,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            drift_threshold: 0.1,
            resync_threshold: 2.0,
            media_update_hz: 60.0,
            ready_timeout: Duration::from_millis(1000),
            ready_retries: 1,
            clip_tolerance: 0.3,
        }
    }
}

impl SyncConfig {
    pub fn media_update_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.media_update_hz.max(1.0))
    }
}

// =============================================================================
// Media Slots
// =============================================================================

/// What the synchronizer knows about one track's media element
#[derive(Clone, Debug, Default)]
struct MediaSlot {
    clip_id: Option<ClipId>,
    path: String,
    generation: u64,
    ready: bool,
    playing: bool,
    /// Estimated clip-local position of the element
    position: TimeSec,
    /// Camera switch waiting on this load
    switch_generation: Option<u64>,
    deadline: Option<Instant>,
    retries_left: u32,
}

// =============================================================================
// Synchronizer
// =============================================================================

#[derive(Clone, Debug)]
pub struct PlaybackSynchronizer {
    config: SyncConfig,
    slots: BTreeMap<TrackId, MediaSlot>,
    next_generation: u64,
    /// Set by a media-sourced clock write; the next push is an echo
    media_origin: bool,
    last_media_write: Option<Instant>,
}

impl PlaybackSynchronizer {
    pub fn new(config: SyncConfig) -> Self {
        Self {
            config,
            slots: BTreeMap::new(),
            next_generation: 0,
            media_origin: false,
            last_media_write: None,
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// True while any element still owes a ready report
    pub fn has_pending_loads(&self) -> bool {
        self.slots.values().any(|s| !s.ready)
    }

    pub fn is_ready(&self, track_id: &str) -> bool {
        self.slots.get(track_id).is_some_and(|s| s.ready)
    }

    /// Drops elements of tracks that no longer exist
    pub fn retain_tracks(&mut self, track_ids: &[&str]) {
        self.slots.retain(|id, _| track_ids.contains(&id.as_str()));
    }

    /// Moves the position estimate of playing elements forward
    pub fn advance_estimates(&mut self, delta: TimeSec) {
        for slot in self.slots.values_mut().filter(|s| s.ready && s.playing) {
            slot.position += delta;
        }
    }

    // -------------------------------------------------------------------------
    // Camera switching and readiness
    // -------------------------------------------------------------------------

    /// Loads the switch target. The previous element is paused and any
    /// in-flight switch load is abandoned.
    pub fn begin_switch(
        &mut self,
        switch: &CameraSwitch,
        previous_track: Option<&str>,
        now: Instant,
        out: &mut Vec<EngineOutput>,
    ) {
        if let Some(previous) = previous_track.filter(|p| *p != switch.track_id) {
            self.pause_slot(previous, out);
        }

        self.slots.retain(|id, slot| {
            let abandoned = *id != switch.track_id && !slot.ready && slot.switch_generation.is_some();
            if abandoned {
                debug!(track_id = %id, "Abandoning superseded camera switch load");
            }
            !abandoned
        });

        self.issue_load(
            &switch.track_id,
            &switch.clip_id,
            &switch.path,
            switch.local_time,
            now,
            out,
        );
        if let Some(slot) = self.slots.get_mut(&switch.track_id) {
            slot.switch_generation = Some(switch.generation);
        }
    }

    /// Handles a ready report; completes the camera switch waiting on it
    pub fn on_media_ready(
        &mut self,
        track_id: &str,
        generation: u64,
        clock: &mut TimelineClock,
        out: &mut Vec<EngineOutput>,
    ) -> Option<SwitchCompleted> {
        let Some(slot) = self
            .slots
            .get_mut(track_id)
            .filter(|s| s.generation == generation && !s.ready)
        else {
            debug!(track_id, generation, "Ignoring stale ready report");
            out.push(EngineOutput::Diagnostic(Diagnostic::StaleReady {
                track_id: track_id.to_string(),
                generation,
            }));
            return None;
        };

        slot.ready = true;
        slot.deadline = None;
        let switch = slot.switch_generation.take();
        debug!(track_id, generation, "Media ready");

        switch.and_then(|g| clock.complete_camera_switch(g))
    }

    /// Retries or force-completes loads whose ready report is overdue
    pub fn poll_timeouts(
        &mut self,
        now: Instant,
        clock: &mut TimelineClock,
        out: &mut Vec<EngineOutput>,
    ) -> Vec<SwitchCompleted> {
        let overdue: Vec<TrackId> = self
            .slots
            .iter()
            .filter(|(_, s)| !s.ready && s.deadline.is_some_and(|d| now >= d))
            .map(|(id, _)| id.clone())
            .collect();

        let timeout = self.config.ready_timeout;
        let mut completed = Vec::new();
        for track_id in overdue {
            let Some(slot) = self.slots.get_mut(&track_id) else {
                continue;
            };

            if slot.retries_left > 0 {
                slot.retries_left -= 1;
                slot.deadline = Some(now + timeout);
                if let Some(clip_id) = slot.clip_id.clone() {
                    warn!(track_id = %track_id, generation = slot.generation, "Media not ready, retrying load");
                    out.push(EngineOutput::Media(MediaCommand::Load {
                        track_id: track_id.clone(),
                        clip_id,
                        path: slot.path.clone(),
                        local_time: slot.position,
                        generation: slot.generation,
                    }));
                }
                continue;
            }

            let generation = slot.generation;
            warn!(track_id = %track_id, generation, "Media never became ready, continuing without it");
            out.push(EngineOutput::Diagnostic(Diagnostic::ReadyTimeout {
                track_id: track_id.clone(),
                generation,
            }));
            if let Some(done) = self.on_media_ready(&track_id, generation, clock, out) {
                completed.push(done);
            }
        }
        completed
    }

    // -------------------------------------------------------------------------
    // Media to clock
    // -------------------------------------------------------------------------

    /// Handles an element's own time report. Returns true if it was written
    /// into the clock.
    pub fn on_media_time(
        &mut self,
        track_id: &str,
        clip_id: &str,
        local_time: TimeSec,
        now: Instant,
        clock: &mut TimelineClock,
        out: &mut Vec<EngineOutput>,
    ) -> bool {
        if clock.active_track_id() != Some(track_id) {
            return false;
        }
        if clock.is_changing_camera() || !clock.is_playing() || !local_time.is_finite() {
            debug!(track_id, "Ignoring media time while the clock is not playing");
            return false;
        }

        let Some(slot) = self.slots.get_mut(track_id) else {
            return false;
        };
        if !slot.ready || slot.clip_id.as_deref() != Some(clip_id) {
            return false;
        }

        // throttled reports are dropped whole; the estimate keeps following the clock
        let interval = self.config.media_update_interval();
        if self
            .last_media_write
            .is_some_and(|last| now.saturating_duration_since(last) < interval)
        {
            return false;
        }

        let Some(clip) = clock.active_clip().filter(|c| c.id() == clip_id) else {
            return false;
        };
        let clock_time = clock.current_time();
        let media_time = clip.start_time() + local_time.clamp(0.0, clip.duration());
        let expected = clip.local_time(clock_time);
        let drift = (media_time - clock_time).abs();
        slot.position = local_time;

        if media_time < clock_time {
            // the clock only moves forward while playing; a lagging element is pushed instead
            if drift > self.config.drift_threshold {
                debug!(track_id, drift, "Media behind the clock, seeking it forward");
                if drift > self.config.resync_threshold {
                    out.push(EngineOutput::Diagnostic(Diagnostic::SyncDrift {
                        track_id: track_id.to_string(),
                        clock_time,
                        media_time,
                        drift,
                    }));
                }
                out.push(EngineOutput::Media(MediaCommand::Seek {
                    track_id: track_id.to_string(),
                    local_time: expected,
                }));
                slot.position = expected;
            }
            return false;
        }

        if drift > self.config.resync_threshold {
            warn!(track_id, drift, "Media drifted from the clock, resyncing");
            out.push(EngineOutput::Diagnostic(Diagnostic::SyncDrift {
                track_id: track_id.to_string(),
                clock_time,
                media_time,
                drift,
            }));
            out.push(EngineOutput::Media(MediaCommand::Seek {
                track_id: track_id.to_string(),
                local_time: expected,
            }));
            slot.position = expected;
            return false;
        }

        if clock.apply_media_time(clip_id, local_time).is_some() {
            self.media_origin = true;
            self.last_media_write = Some(now);
            return true;
        }
        false
    }

    /// Handles a backend failure: the clock pauses until play() or a switch
    pub fn on_media_error(
        &mut self,
        track_id: &str,
        code: &str,
        clock: &mut TimelineClock,
        out: &mut Vec<EngineOutput>,
    ) {
        warn!(track_id, code, "Media backend error");
        out.push(EngineOutput::Diagnostic(Diagnostic::MediaError {
            track_id: track_id.to_string(),
            code: code.to_string(),
        }));

        if clock.active_track_id() == Some(track_id) {
            clock.pause();
            info!(track_id, "Playback paused after media error");
        }
        self.pause_slot(track_id, out);
    }

    // -------------------------------------------------------------------------
    // Clock to media
    // -------------------------------------------------------------------------

    /// Brings the elements in line with the clock after a clock-sourced change.
    ///
    /// Skipped once after a media-sourced write and entirely while changing
    /// camera. Loads the active clip when the element holds another one,
    /// seeks past the drift threshold and mirrors play/pause.
    pub fn reconcile(&mut self, clock: &TimelineClock, now: Instant, out: &mut Vec<EngineOutput>) {
        if std::mem::take(&mut self.media_origin) {
            return;
        }
        if clock.is_changing_camera() {
            return;
        }
        let Some(track_id) = clock.active_track_id() else {
            return;
        };

        for (id, slot) in self.slots.iter_mut() {
            if id != track_id && slot.playing {
                slot.playing = false;
                out.push(EngineOutput::Media(MediaCommand::Pause {
                    track_id: id.clone(),
                }));
            }
        }

        let Some(clip) = clock.active_clip() else {
            // no footage at the playhead on this camera
            self.pause_slot(track_id, out);
            return;
        };
        let expected = clip.local_time(clock.current_time());

        let loaded = self
            .slots
            .get(track_id)
            .is_some_and(|s| s.clip_id.as_deref() == Some(clip.id()));
        if !loaded {
            self.issue_load(track_id, clip.id(), clip.path(), expected, now, out);
            return;
        }

        let Some(slot) = self.slots.get_mut(track_id) else {
            return;
        };
        if !slot.ready {
            return;
        }

        if (expected - slot.position).abs() > self.config.drift_threshold {
            out.push(EngineOutput::Media(MediaCommand::Seek {
                track_id: track_id.to_string(),
                local_time: expected,
            }));
            slot.position = expected;
        }

        if clock.is_playing() != slot.playing {
            slot.playing = clock.is_playing();
            let track_id = track_id.to_string();
            out.push(EngineOutput::Media(if slot.playing {
                MediaCommand::Play { track_id }
            } else {
                MediaCommand::Pause { track_id }
            }));
        }
    }

    fn issue_load(
        &mut self,
        track_id: &str,
        clip_id: &str,
        path: &str,
        local_time: TimeSec,
        now: Instant,
        out: &mut Vec<EngineOutput>,
    ) -> u64 {
        self.next_generation += 1;
        let generation = self.next_generation;

        self.slots.insert(
            track_id.to_string(),
            MediaSlot {
                clip_id: Some(clip_id.to_string()),
                path: path.to_string(),
                generation,
                ready: false,
                playing: false,
                position: local_time,
                switch_generation: None,
                deadline: Some(now + self.config.ready_timeout),
                retries_left: self.config.ready_retries,
            },
        );

        debug!(track_id, clip_id, generation, "Loading clip");
        out.push(EngineOutput::Media(MediaCommand::Load {
            track_id: track_id.to_string(),
            clip_id: clip_id.to_string(),
            path: path.to_string(),
            local_time,
            generation,
        }));
        generation
    }

    fn pause_slot(&mut self, track_id: &str, out: &mut Vec<EngineOutput>) {
        if let Some(slot) = self.slots.get_mut(track_id).filter(|s| s.playing) {
            slot.playing = false;
            out.push(EngineOutput::Media(MediaCommand::Pause {
                track_id: track_id.to_string(),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::playback::fixtures::{two_day_clock, DAY};

    fn loads(out: &[EngineOutput]) -> Vec<(String, u64)> {
        out.iter()
            .filter_map(|o| match o {
                EngineOutput::Media(MediaCommand::Load {
                    track_id,
                    generation,
                    ..
                }) => Some((track_id.clone(), *generation)),
                _ => None,
            })
            .collect()
    }

    /// Clock playing on camera 1 with its element loaded and ready
    fn playing_setup() -> (TimelineClock, PlaybackSynchronizer, Instant) {
        let mut clock = two_day_clock();
        let mut sync = PlaybackSynchronizer::new(SyncConfig::default());
        let now = Instant::now();
        let mut out = vec![];

        clock.seek(DAY + 3800.0).unwrap();
        sync.reconcile(&clock, now, &mut out);
        let (track, generation) = loads(&out)[0].clone();
        sync.on_media_ready(&track, generation, &mut clock, &mut out);
        assert!(clock.play());
        sync.reconcile(&clock, now, &mut out);

        (clock, sync, now)
    }

    #[test]
    fn test_initial_reconcile_loads_active_clip() {
        let clock = two_day_clock();
        let mut sync = PlaybackSynchronizer::new(SyncConfig::default());
        let mut out = vec![];

        sync.reconcile(&clock, Instant::now(), &mut out);

        assert_eq!(
            out,
            vec![EngineOutput::Media(MediaCommand::Load {
                track_id: "T1".to_string(),
                clip_id: "a1".to_string(),
                path: "/media/a1.mp4".to_string(),
                local_time: 0.0,
                generation: 1,
            })]
        );
        assert!(sync.has_pending_loads());
    }

    #[test]
    fn test_play_after_ready() {
        let (_clock, sync, _now) = playing_setup();
        assert!(sync.is_ready("T1"));
        assert!(!sync.has_pending_loads());
    }

    #[test]
    fn test_push_only_past_drift_threshold() {
        let (mut clock, mut sync, now) = playing_setup();
        let mut out = vec![];

        clock.advance(0.05);
        sync.advance_estimates(0.05);
        sync.reconcile(&clock, now, &mut out);
        assert!(out.is_empty());

        // a seek that moves less than the threshold is not pushed
        clock.seek(clock.current_time() + 0.05).unwrap();
        sync.reconcile(&clock, now, &mut out);
        assert!(out.is_empty());

        clock.seek(DAY + 3900.0).unwrap();
        sync.reconcile(&clock, now, &mut out);
        assert_eq!(
            out,
            vec![EngineOutput::Media(MediaCommand::Seek {
                track_id: "T1".to_string(),
                local_time: 300.0,
            })]
        );
    }

    #[test]
    fn test_media_write_is_not_echoed() {
        let (mut clock, mut sync, now) = playing_setup();
        let mut out = vec![];

        assert!(sync.on_media_time("T1", "a1", 201.0, now, &mut clock, &mut out));
        assert_eq!(clock.current_time(), DAY + 3801.0);

        sync.reconcile(&clock, now, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_lagging_media_never_rewinds_clock() {
        let (mut clock, mut sync, now) = playing_setup();
        let mut out = vec![];
        clock.advance(0.5);
        sync.advance_estimates(0.5);

        assert!(!sync.on_media_time("T1", "a1", 200.1, now, &mut clock, &mut out));
        assert_eq!(clock.current_time(), DAY + 3800.5);
        assert!(clock.is_playing());
        assert_eq!(
            out,
            vec![EngineOutput::Media(MediaCommand::Seek {
                track_id: "T1".to_string(),
                local_time: 200.5,
            })]
        );
        out.clear();

        // within the drift threshold the element is left alone
        let later = now + Duration::from_millis(100);
        assert!(!sync.on_media_time("T1", "a1", 200.45, later, &mut clock, &mut out));
        sync.reconcile(&clock, later, &mut out);
        assert!(out.is_empty());
        assert_eq!(clock.current_time(), DAY + 3800.5);
    }

    #[test]
    fn test_throttled_report_is_not_echoed() {
        let (mut clock, mut sync, now) = playing_setup();
        let mut out = vec![];

        assert!(sync.on_media_time("T1", "a1", 200.0, now, &mut clock, &mut out));
        sync.reconcile(&clock, now, &mut out);
        assert!(out.is_empty());

        let soon = now + Duration::from_millis(5);
        assert!(!sync.on_media_time("T1", "a1", 200.3, soon, &mut clock, &mut out));
        sync.reconcile(&clock, soon, &mut out);

        assert!(out.is_empty());
        assert_eq!(clock.current_time(), DAY + 3800.0);
    }

    #[test]
    fn test_no_clock_writes_while_changing_camera() {
        let (mut clock, mut sync, now) = playing_setup();
        let mut out = vec![];
        let switch = clock.begin_camera_switch("T2").unwrap();
        sync.begin_switch(&switch, Some("T1"), now, &mut out);
        let before = clock.current_time();

        for i in 1..=20 {
            let at = now + Duration::from_millis(100 * i);
            assert!(!sync.on_media_time("T2", "b1", 5.0 * i as f64, at, &mut clock, &mut out));
            assert!(!sync.on_media_time("T1", "a1", 5.0 * i as f64, at, &mut clock, &mut out));
        }

        assert_eq!(clock.current_time(), before);
    }

    #[test]
    fn test_media_writes_are_rate_limited() {
        let (mut clock, mut sync, now) = playing_setup();
        let mut out = vec![];

        assert!(sync.on_media_time("T1", "a1", 200.5, now, &mut clock, &mut out));
        let soon = now + Duration::from_millis(2);
        assert!(!sync.on_media_time("T1", "a1", 200.6, soon, &mut clock, &mut out));
        assert_eq!(clock.current_time(), DAY + 3800.5);

        let later = now + Duration::from_millis(20);
        assert!(sync.on_media_time("T1", "a1", 200.7, later, &mut clock, &mut out));
    }

    #[test]
    fn test_large_drift_resyncs_media_to_clock() {
        let (mut clock, mut sync, now) = playing_setup();
        let mut out = vec![];

        assert!(!sync.on_media_time("T1", "a1", 260.0, now, &mut clock, &mut out));

        assert_eq!(clock.current_time(), DAY + 3800.0);
        assert!(matches!(
            out[0],
            EngineOutput::Diagnostic(Diagnostic::SyncDrift { .. })
        ));
        assert_eq!(
            out[1],
            EngineOutput::Media(MediaCommand::Seek {
                track_id: "T1".to_string(),
                local_time: 200.0,
            })
        );
    }

    #[test]
    fn test_switch_completes_on_ready() {
        let (mut clock, mut sync, now) = playing_setup();
        let mut out = vec![];

        let switch = clock.begin_camera_switch("T2").unwrap();
        sync.begin_switch(&switch, Some("T1"), now, &mut out);

        assert_eq!(
            out[0],
            EngineOutput::Media(MediaCommand::Pause {
                track_id: "T1".to_string()
            })
        );
        let (track, generation) = loads(&out)[0].clone();
        assert_eq!(track, "T2");

        out.clear();
        sync.reconcile(&clock, now, &mut out);
        assert!(out.is_empty());

        let done = sync.on_media_ready("T2", generation, &mut clock, &mut out);
        assert_eq!(done.map(|d| d.generation), Some(switch.generation));
        assert!(clock.is_playing());

        sync.reconcile(&clock, now, &mut out);
        assert_eq!(
            out,
            vec![EngineOutput::Media(MediaCommand::Play {
                track_id: "T2".to_string()
            })]
        );
    }

    #[test]
    fn test_superseded_switch_ready_is_stale() {
        let (mut clock, mut sync, now) = playing_setup();
        let mut out = vec![];

        let first = clock.begin_camera_switch("T2").unwrap();
        sync.begin_switch(&first, Some("T1"), now, &mut out);
        let second = clock.begin_camera_switch("T1").unwrap();
        sync.begin_switch(&second, Some("T2"), now, &mut out);
        let generations = loads(&out);
        out.clear();

        assert!(sync
            .on_media_ready("T2", generations[0].1, &mut clock, &mut out)
            .is_none());
        assert!(matches!(
            out[0],
            EngineOutput::Diagnostic(Diagnostic::StaleReady { .. })
        ));
        assert!(clock.is_changing_camera());

        let done = sync.on_media_ready("T1", generations[1].1, &mut clock, &mut out);
        assert_eq!(done.map(|d| d.generation), Some(second.generation));
        assert!(!clock.is_changing_camera());
    }

    #[test]
    fn test_ready_timeout_retries_then_completes() {
        let (mut clock, mut sync, now) = playing_setup();
        let mut out = vec![];

        let switch = clock.begin_camera_switch("T2").unwrap();
        sync.begin_switch(&switch, Some("T1"), now, &mut out);
        let (_, generation) = loads(&out)[0].clone();
        out.clear();

        assert!(sync
            .poll_timeouts(now + Duration::from_millis(500), &mut clock, &mut out)
            .is_empty());
        assert!(out.is_empty());

        let retry_at = now + Duration::from_millis(1100);
        assert!(sync.poll_timeouts(retry_at, &mut clock, &mut out).is_empty());
        assert_eq!(loads(&out), vec![("T2".to_string(), generation)]);
        assert!(clock.is_changing_camera());
        out.clear();

        let completed = sync.poll_timeouts(retry_at + Duration::from_millis(1100), &mut clock, &mut out);
        assert_eq!(completed.len(), 1);
        assert!(matches!(
            out[0],
            EngineOutput::Diagnostic(Diagnostic::ReadyTimeout { .. })
        ));
        assert!(clock.is_playing());
    }

    #[test]
    fn test_media_error_pauses_clock() {
        let (mut clock, mut sync, _now) = playing_setup();
        let mut out = vec![];

        sync.on_media_error("T1", "decode", &mut clock, &mut out);

        assert!(!clock.is_playing());
        assert!(matches!(
            out[0],
            EngineOutput::Diagnostic(Diagnostic::MediaError { .. })
        ));
        assert_eq!(
            out[1],
            EngineOutput::Media(MediaCommand::Pause {
                track_id: "T1".to_string()
            })
        );
        // explicit play resumes
        assert!(clock.play());
    }

    #[test]
    fn test_local_time_stays_inside_clip() {
        let clock = two_day_clock();
        let clip = clock.active_clip().unwrap();

        for step in -10..=70 {
            let time = clip.start_time() + step as f64 * 10.0;
            let local = clip.local_time(time);
            assert!(local >= 0.0 && local <= clip.duration());
            if clip.range().contains(time) {
                assert!((local - (time - clip.start_time())).abs() < 1e-9);
            }
        }
    }
}
