//! Timeline Clock
//!
//! Single source of truth for the playback position. Owns the per-sector
//! view state (zoom, last visited position) and the camera-switch guard.
//!
//! States: `Idle`, `Playing`, `Seeking` (transient inside `seek`) and
//! `ChangingCamera`, which lasts until the synchronizer acknowledges that the
//! new media element is ready. While changing camera, media-sourced time is
//! never written and seeks are held back, keeping only the latest.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::catalog::{MediaClip, Track};
use crate::core::sectors::{Sector, SectorPartitioner, SectorState};
use crate::core::{ClipId, CoreError, CoreResult, SectorDate, TimeSec, TrackId};

// =============================================================================
// Types
// =============================================================================

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ClockState {
    #[default]
    Idle,
    Playing,
    Seeking,
    ChangingCamera,
}

/// Observable clock state
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClockSnapshot {
    pub current_time: TimeSec,
    pub state: ClockState,
    /// Playing, or changing camera with playback to resume afterwards
    pub is_playing: bool,
    pub is_changing_camera: bool,
    pub active_track_id: Option<TrackId>,
    pub active_clip_id: Option<ClipId>,
    pub active_sector_date: Option<SectorDate>,
    pub switch_generation: u64,
}

/// A camera switch waiting for media readiness
#[derive(Clone, Debug, PartialEq)]
pub struct CameraSwitch {
    pub generation: u64,
    pub track_id: TrackId,
    pub clip_id: ClipId,
    pub path: String,
    /// Timeline position the switch resolved to
    pub time: TimeSec,
    /// Position inside the clip
    pub local_time: TimeSec,
}

/// Result of acknowledging a camera switch
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SwitchCompleted {
    pub generation: u64,
    /// Seek held back during the switch and applied on completion
    pub applied_seek: Option<TimeSec>,
}

/// Result of one playback step
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Advance {
    pub time: TimeSec,
    pub clip_changed: bool,
    /// Playback stopped at the end of the sector
    pub reached_end: bool,
}

// =============================================================================
// Clock
// =============================================================================

#[derive(Clone, Debug)]
pub struct TimelineClock {
    tracks: Vec<Track>,
    sectors: Vec<Sector>,
    partitioner: SectorPartitioner,
    sector_states: BTreeMap<SectorDate, SectorState>,
    current_time: TimeSec,
    state: ClockState,
    /// Whether to play once the pending camera switch completes
    resume_playing: bool,
    active_track_id: Option<TrackId>,
    active_clip_id: Option<ClipId>,
    active_sector_date: Option<SectorDate>,
    switch_generation: u64,
    pending_seek: Option<TimeSec>,
    default_zoom: f64,
    clip_tolerance: TimeSec,
}

impl TimelineClock {
    /// Creates a clock parked at the start of the first sector
    pub fn new(
        tracks: Vec<Track>,
        partitioner: SectorPartitioner,
        default_zoom: f64,
        clip_tolerance: TimeSec,
    ) -> Self {
        let mut clock = Self {
            tracks: vec![],
            sectors: vec![],
            partitioner,
            sector_states: BTreeMap::new(),
            current_time: 0.0,
            state: ClockState::Idle,
            resume_playing: false,
            active_track_id: None,
            active_clip_id: None,
            active_sector_date: None,
            switch_generation: 0,
            pending_seek: None,
            default_zoom,
            clip_tolerance: clip_tolerance.max(0.0),
        };
        clock.set_tracks(tracks);
        clock
    }

    /// Replaces the track set and rebuilds sectors.
    ///
    /// Sector state survives for dates that still exist. The active track is
    /// kept when it still exists, otherwise the first track becomes active.
    pub fn set_tracks(&mut self, tracks: Vec<Track>) {
        self.sectors = self.partitioner.partition(&tracks);
        self.tracks = tracks;

        let mut states = BTreeMap::new();
        for sector in &self.sectors {
            let state = match self.sector_states.get(&sector.date) {
                Some(previous) => SectorState {
                    zoom_level: previous.zoom_level,
                    last_visited_time: sector.range().clamp(previous.last_visited_time),
                },
                None => SectorState::for_sector(sector, self.default_zoom),
            };
            states.insert(sector.date.clone(), state);
        }
        self.sector_states = states;

        let active_exists = self
            .active_track_id
            .as_deref()
            .is_some_and(|id| self.tracks.iter().any(|t| t.id() == id));
        if !active_exists {
            self.active_track_id = self.tracks.first().map(|t| t.id().to_string());
        }

        match self
            .partitioner
            .nearest_sector(&self.sectors, self.current_time)
        {
            Some(sector) => {
                self.current_time = sector.range().clamp(self.current_time);
                self.active_sector_date = Some(sector.date.clone());
            }
            None => self.active_sector_date = None,
        }

        self.refresh_active_clip();
        if self.state == ClockState::Playing && self.active_clip_id.is_none() {
            warn!("Active clip disappeared with the track change, stopping playback");
            self.state = ClockState::Idle;
        }

        info!(
            tracks = self.tracks.len(),
            sectors = self.sectors.len(),
            "Timeline tracks updated"
        );
    }

    // -------------------------------------------------------------------------
    // Accessors
    // -------------------------------------------------------------------------

    pub fn current_time(&self) -> TimeSec {
        self.current_time
    }

    pub fn state(&self) -> ClockState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == ClockState::Playing
    }

    pub fn is_changing_camera(&self) -> bool {
        self.state == ClockState::ChangingCamera
    }

    pub fn switch_generation(&self) -> u64 {
        self.switch_generation
    }

    pub fn pending_seek(&self) -> Option<TimeSec> {
        self.pending_seek
    }

    pub fn clip_tolerance(&self) -> TimeSec {
        self.clip_tolerance
    }

    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn sectors(&self) -> &[Sector] {
        &self.sectors
    }

    pub fn track(&self, track_id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id() == track_id)
    }

    pub fn active_track_id(&self) -> Option<&str> {
        self.active_track_id.as_deref()
    }

    pub fn active_clip_id(&self) -> Option<&str> {
        self.active_clip_id.as_deref()
    }

    pub fn active_sector_date(&self) -> Option<&str> {
        self.active_sector_date.as_deref()
    }

    pub fn active_track(&self) -> Option<&Track> {
        self.active_track_id().and_then(|id| self.track(id))
    }

    pub fn active_clip(&self) -> Option<&MediaClip> {
        let clip_id = self.active_clip_id()?;
        self.active_track()?.get_clip(clip_id)
    }

    pub fn active_sector(&self) -> Option<&Sector> {
        let date = self.active_sector_date()?;
        self.sectors.iter().find(|s| s.date == date)
    }

    pub fn sector_state(&self, date: &str) -> Option<SectorState> {
        self.sector_states.get(date).copied()
    }

    pub fn snapshot(&self) -> ClockSnapshot {
        ClockSnapshot {
            current_time: self.current_time,
            state: self.state,
            is_playing: self.is_playing() || (self.is_changing_camera() && self.resume_playing),
            is_changing_camera: self.is_changing_camera(),
            active_track_id: self.active_track_id.clone(),
            active_clip_id: self.active_clip_id.clone(),
            active_sector_date: self.active_sector_date.clone(),
            switch_generation: self.switch_generation,
        }
    }

    // -------------------------------------------------------------------------
    // Commands
    // -------------------------------------------------------------------------

    /// Starts playback. Returns false (and stays idle) when the active track
    /// has no clip at the current time.
    pub fn play(&mut self) -> bool {
        match self.state {
            ClockState::Playing => true,
            ClockState::ChangingCamera => {
                self.resume_playing = true;
                true
            }
            ClockState::Idle | ClockState::Seeking => {
                let covered = self
                    .active_track()
                    .and_then(|t| t.clip_at(self.current_time, self.clip_tolerance))
                    .is_some();
                if !covered {
                    debug!(
                        "play() ignored: no clip on the active track at {:.3}s",
                        self.current_time
                    );
                    return false;
                }
                self.refresh_active_clip();
                self.state = ClockState::Playing;
                info!(time = self.current_time, "Playback started");
                true
            }
        }
    }

    pub fn pause(&mut self) {
        match self.state {
            ClockState::Playing => {
                self.state = ClockState::Idle;
                self.remember_current();
                info!(time = self.current_time, "Playback paused");
            }
            ClockState::ChangingCamera => self.resume_playing = false,
            ClockState::Idle | ClockState::Seeking => {}
        }
    }

    /// Moves the playhead, clamped into the nearest sector.
    ///
    /// During a camera switch the seek is held until the switch completes;
    /// a later seek replaces an earlier held one.
    pub fn seek(&mut self, time: TimeSec) -> CoreResult<TimeSec> {
        if !time.is_finite() {
            return Err(CoreError::InvalidTime(time));
        }
        if self.state == ClockState::ChangingCamera {
            if let Some(previous) = self.pending_seek.replace(time) {
                debug!(previous, time, "Coalesced seek held during camera switch");
            }
            return Ok(time);
        }
        Ok(self.apply_seek(time))
    }

    fn apply_seek(&mut self, time: TimeSec) -> TimeSec {
        let previous = self.state;
        self.state = ClockState::Seeking;

        let target = match self.partitioner.nearest_sector(&self.sectors, time) {
            Some(sector) => {
                self.active_sector_date = Some(sector.date.clone());
                sector.range().clamp(time)
            }
            None => time,
        };
        self.current_time = target;
        self.remember_current();
        self.refresh_active_clip();

        self.state = previous;
        debug!(requested = time, time = target, "Seek applied");
        target
    }

    /// Makes `track_id` the active track and enters `ChangingCamera`.
    ///
    /// The position is kept when the track has a clip there. Otherwise the
    /// nearest clip decides: if it lies in another sector, the current sector
    /// remembers the playhead and playback resumes where the target sector
    /// was last visited; in the same sector, the clip's start is used.
    /// A switch issued during another one supersedes it.
    pub fn begin_camera_switch(&mut self, track_id: &str) -> CoreResult<CameraSwitch> {
        let index = self
            .tracks
            .iter()
            .position(|t| t.id() == track_id)
            .ok_or_else(|| CoreError::TrackNotFound(track_id.to_string()))?;
        if self.tracks[index].is_empty() {
            warn!(track_id, "Cannot switch to a track without clips");
            return Err(CoreError::EmptyTrack(track_id.to_string()));
        }

        // held seeks apply only once the switch is accepted
        if let Some(time) = self.pending_seek.take() {
            self.apply_seek(time);
        }

        let resume = match self.state {
            ClockState::ChangingCamera => self.resume_playing,
            ClockState::Playing => true,
            ClockState::Idle | ClockState::Seeking => false,
        };

        let tolerance = self.clip_tolerance;
        let now = self.current_time;
        let track = &self.tracks[index];

        let (time, leaving_sector) = if track.clip_at(now, tolerance).is_some() {
            (now, false)
        } else {
            let nearest = track
                .nearest_clip(now)
                .ok_or_else(|| CoreError::EmptyTrack(track_id.to_string()))?;

            match self
                .partitioner
                .nearest_sector(&self.sectors, nearest.start_time())
            {
                Some(sector) if self.active_sector_date.as_ref() != Some(&sector.date) => {
                    let remembered = self
                        .sector_states
                        .get(&sector.date)
                        .map_or(sector.start_time, |s| s.last_visited_time);
                    let time = match track.clip_at(remembered, tolerance) {
                        Some(_) => remembered,
                        None => track
                            .nearest_clip(remembered)
                            .map_or(nearest.start_time(), |c| c.start_time()),
                    };
                    (time, true)
                }
                _ => (nearest.start_time(), false),
            }
        };

        let clip = track
            .clip_at(time, tolerance)
            .or_else(|| track.nearest_clip(time))
            .ok_or_else(|| CoreError::Internal(format!("no clip on {} at {}", track_id, time)))?;
        let clip_id = clip.id().to_string();
        let path = clip.path().to_string();
        let local_time = clip.local_time(time);

        if leaving_sector {
            self.remember_current();
        }

        self.current_time = time;
        self.active_track_id = Some(track_id.to_string());
        self.active_clip_id = Some(clip_id.clone());
        if let Some(sector) = self.partitioner.nearest_sector(&self.sectors, time) {
            self.active_sector_date = Some(sector.date.clone());
        }
        self.switch_generation += 1;
        self.resume_playing = resume;
        self.state = ClockState::ChangingCamera;

        info!(
            track_id,
            generation = self.switch_generation,
            time,
            "Camera switch started"
        );

        Ok(CameraSwitch {
            generation: self.switch_generation,
            track_id: track_id.to_string(),
            clip_id,
            path,
            time,
            local_time,
        })
    }

    /// Leaves `ChangingCamera` for the switch with `generation`.
    ///
    /// Returns `None` for a superseded switch. A seek held during the switch
    /// is applied now.
    pub fn complete_camera_switch(&mut self, generation: u64) -> Option<SwitchCompleted> {
        if self.state != ClockState::ChangingCamera || generation != self.switch_generation {
            debug!(
                generation,
                current = self.switch_generation,
                "Ignoring stale camera switch acknowledgment"
            );
            return None;
        }

        self.state = if self.resume_playing {
            ClockState::Playing
        } else {
            ClockState::Idle
        };
        self.resume_playing = false;

        let applied_seek = self.pending_seek.take().map(|time| self.apply_seek(time));
        info!(generation, "Camera switch completed");

        Some(SwitchCompleted {
            generation,
            applied_seek,
        })
    }

    /// Advances the playhead by a wall-clock delta while playing.
    ///
    /// Reaching the end of the active sector stops playback there.
    pub fn advance(&mut self, delta: TimeSec) -> Option<Advance> {
        if self.state != ClockState::Playing || !delta.is_finite() || delta <= 0.0 {
            return None;
        }

        let mut time = self.current_time + delta;
        let mut reached_end = false;
        if let Some(sector) = self.active_sector() {
            if time >= sector.end_time {
                time = sector.end_time;
                reached_end = true;
            }
            time = time.max(sector.start_time);
        }
        self.current_time = time;

        if reached_end {
            self.state = ClockState::Idle;
            self.remember_current();
            info!(time, "Reached end of sector, playback stopped");
        }

        let clip_changed = self.refresh_active_clip();
        Some(Advance {
            time,
            clip_changed,
            reached_end,
        })
    }

    /// Writes a media-reported position back into the clock.
    ///
    /// Only accepted while playing (never while seeking or changing camera)
    /// and only for the active clip. The clock never moves backwards here: a
    /// report behind the playhead is rejected.
    pub fn apply_media_time(&mut self, clip_id: &str, local_time: TimeSec) -> Option<TimeSec> {
        if self.state != ClockState::Playing || !local_time.is_finite() {
            return None;
        }
        if self.active_clip_id() != Some(clip_id) {
            return None;
        }

        let clip = self.active_clip()?;
        let mut time = clip.start_time() + local_time.clamp(0.0, clip.duration());
        if let Some(sector) = self.active_sector() {
            time = sector.range().clamp(time);
        }
        if time < self.current_time {
            return None;
        }
        self.current_time = time;
        Some(time)
    }

    pub fn set_zoom(&mut self, date: &str, zoom: f64) -> CoreResult<()> {
        let state = self
            .sector_states
            .get_mut(date)
            .ok_or_else(|| CoreError::SectorNotFound(date.to_string()))?;
        state.zoom_level = zoom;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn remember_current(&mut self) {
        let time = self.current_time;
        if let Some(state) = self
            .active_sector_date
            .as_ref()
            .and_then(|date| self.sector_states.get_mut(date))
        {
            state.last_visited_time = time;
        }
    }

    /// Re-resolves the active clip at the current time; true if it changed
    fn refresh_active_clip(&mut self) -> bool {
        let clip_id = self
            .active_track()
            .and_then(|t| t.clip_at(self.current_time, self.clip_tolerance))
            .map(|c| c.id().to_string());
        let changed = clip_id != self.active_clip_id;
        self.active_clip_id = clip_id;
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::playback::fixtures::{two_day_clock, two_day_tracks, DAY, NEXT};

    #[test]
    fn test_new_parks_at_first_sector() {
        let clock = two_day_clock();

        assert_eq!(clock.sectors().len(), 2);
        assert_eq!(clock.current_time(), DAY + 3600.0);
        assert_eq!(clock.state(), ClockState::Idle);
        assert_eq!(clock.active_track_id(), Some("T1"));
        assert_eq!(clock.active_clip_id(), Some("a1"));
        assert_eq!(clock.active_sector_date(), Some("2024-03-10"));
    }

    #[test]
    fn test_play_requires_covering_clip() {
        let mut clock = two_day_clock();
        clock.seek(DAY + 4250.0).unwrap();

        assert!(!clock.play());
        assert_eq!(clock.state(), ClockState::Idle);

        clock.seek(DAY + 4000.0).unwrap();
        assert!(clock.play());
        assert!(clock.is_playing());
    }

    #[test]
    fn test_advance_stops_at_sector_end() {
        let mut clock = two_day_clock();
        clock.seek(DAY + 4150.0).unwrap();
        assert!(clock.play());

        let step = clock.advance(100.0).unwrap();
        assert_eq!(step.time, DAY + 4250.0);
        assert!(!step.reached_end);
        assert!(step.clip_changed);
        assert!(clock.active_clip_id().is_none());

        let step = clock.advance(100.0).unwrap();
        assert_eq!(step.time, DAY + 4300.0);
        assert!(step.reached_end);
        assert_eq!(clock.state(), ClockState::Idle);
        assert_eq!(
            clock.sector_state("2024-03-10").unwrap().last_visited_time,
            DAY + 4300.0
        );

        assert!(clock.advance(1.0).is_none());
    }

    #[test]
    fn test_seek_clamps_and_records_last_visited() {
        let mut clock = two_day_clock();

        assert_eq!(clock.seek(DAY).unwrap(), DAY + 3600.0);
        assert_eq!(clock.seek(NEXT + 7100.0).unwrap(), NEXT + 7100.0);
        assert_eq!(clock.active_sector_date(), Some("2024-03-11"));
        assert_eq!(
            clock.sector_state("2024-03-11").unwrap().last_visited_time,
            NEXT + 7100.0
        );
        assert_eq!(clock.state(), ClockState::Idle);
    }

    #[test]
    fn test_seek_rejects_non_finite() {
        let mut clock = two_day_clock();
        assert!(matches!(
            clock.seek(f64::NAN),
            Err(CoreError::InvalidTime(_))
        ));
        assert_eq!(clock.current_time(), DAY + 3600.0);
    }

    #[test]
    fn test_switch_keeps_time_when_covered() {
        let mut clock = two_day_clock();
        clock.seek(DAY + 3800.0).unwrap();

        let switch = clock.begin_camera_switch("T2").unwrap();

        assert_eq!(switch.time, DAY + 3800.0);
        assert_eq!(switch.clip_id, "b1");
        assert!((switch.local_time - 100.0).abs() < 1e-9);
        assert!(clock.is_changing_camera());
        assert_eq!(clock.active_track_id(), Some("T2"));
    }

    #[test]
    fn test_sector_memory_across_switches() {
        let mut clock = two_day_clock();
        let t = DAY + 3900.0;
        clock.seek(t).unwrap();

        // camera 3 only recorded on day two
        let into_b = clock.begin_camera_switch("T3").unwrap();
        assert_eq!(into_b.time, NEXT + 7000.0);
        assert_eq!(clock.active_sector_date(), Some("2024-03-11"));
        clock.complete_camera_switch(into_b.generation).unwrap();

        let back = clock.begin_camera_switch("T1").unwrap();
        clock.complete_camera_switch(back.generation).unwrap();

        assert_eq!(clock.current_time(), t);
        assert_eq!(clock.active_sector_date(), Some("2024-03-10"));
        assert_eq!(
            clock.sector_state("2024-03-11").unwrap().last_visited_time,
            NEXT + 7000.0
        );
    }

    #[test]
    fn test_switch_in_same_sector_moves_to_nearest_clip_start() {
        let mut clock = two_day_clock();
        clock.seek(NEXT + 7050.0).unwrap();
        clock.begin_camera_switch("T3").unwrap();

        let switch = clock.begin_camera_switch("T2").unwrap();
        assert_eq!(switch.clip_id, "b2");
        assert_eq!(switch.time, NEXT + 7200.0);
        assert_eq!(switch.local_time, 0.0);
    }

    #[test]
    fn test_seeks_during_switch_are_coalesced() {
        let mut clock = two_day_clock();
        // camera 2 starts later the same day, so the switch lands on its first clip
        let switch = clock.begin_camera_switch("T2").unwrap();
        assert_eq!(switch.time, DAY + 3700.0);

        clock.seek(DAY + 3750.0).unwrap();
        clock.seek(DAY + 3950.0).unwrap();
        assert_eq!(clock.current_time(), DAY + 3700.0);
        assert_eq!(clock.pending_seek(), Some(DAY + 3950.0));

        let done = clock.complete_camera_switch(switch.generation).unwrap();
        assert_eq!(done.applied_seek, Some(DAY + 3950.0));
        assert_eq!(clock.current_time(), DAY + 3950.0);
        assert_eq!(clock.active_clip_id(), Some("b1"));
    }

    #[test]
    fn test_superseded_switch_acknowledgment_is_ignored() {
        let mut clock = two_day_clock();
        clock.seek(DAY + 3800.0).unwrap();

        let first = clock.begin_camera_switch("T2").unwrap();
        let second = clock.begin_camera_switch("T1").unwrap();
        assert!(second.generation > first.generation);

        assert!(clock.complete_camera_switch(first.generation).is_none());
        assert!(clock.is_changing_camera());

        assert!(clock.complete_camera_switch(second.generation).is_some());
        assert_eq!(clock.active_track_id(), Some("T1"));
        assert_eq!(clock.state(), ClockState::Idle);
    }

    #[test]
    fn test_switch_resumes_playback() {
        let mut clock = two_day_clock();
        clock.seek(DAY + 3800.0).unwrap();
        clock.play();

        let switch = clock.begin_camera_switch("T2").unwrap();
        assert!(clock.snapshot().is_playing);
        assert!(clock.advance(0.5).is_none());

        clock.complete_camera_switch(switch.generation).unwrap();
        assert!(clock.is_playing());
    }

    #[test]
    fn test_pause_during_switch_cancels_resume() {
        let mut clock = two_day_clock();
        clock.seek(DAY + 3800.0).unwrap();
        clock.play();

        let switch = clock.begin_camera_switch("T2").unwrap();
        clock.pause();
        clock.complete_camera_switch(switch.generation).unwrap();

        assert_eq!(clock.state(), ClockState::Idle);
    }

    #[test]
    fn test_media_time_ignored_while_changing_camera() {
        let mut clock = two_day_clock();
        clock.seek(DAY + 3800.0).unwrap();
        clock.play();
        clock.begin_camera_switch("T2").unwrap();

        for i in 0..10 {
            assert!(clock.apply_media_time("b1", 150.0 + i as f64).is_none());
        }
        assert_eq!(clock.current_time(), DAY + 3800.0);
    }

    #[test]
    fn test_media_time_applies_for_active_clip() {
        let mut clock = two_day_clock();
        clock.seek(DAY + 3800.0).unwrap();
        clock.play();

        assert_eq!(clock.apply_media_time("a1", 250.0), Some(DAY + 3850.0));
        assert!(clock.apply_media_time("b1", 10.0).is_none());
        // local time is clamped into the clip
        assert_eq!(clock.apply_media_time("a1", 9_999.0), Some(DAY + 4200.0));
    }

    #[test]
    fn test_unknown_track_is_rejected() {
        let mut clock = two_day_clock();
        assert!(matches!(
            clock.begin_camera_switch("T9"),
            Err(CoreError::TrackNotFound(_))
        ));
        assert_eq!(clock.state(), ClockState::Idle);
    }

    #[test]
    fn test_media_time_never_moves_clock_back() {
        let mut clock = two_day_clock();
        clock.seek(DAY + 3800.0).unwrap();
        clock.play();
        clock.advance(0.5).unwrap();

        assert!(clock.apply_media_time("a1", 200.1).is_none());
        assert_eq!(clock.current_time(), DAY + 3800.5);
        assert!(clock.is_playing());

        assert_eq!(clock.apply_media_time("a1", 200.5), Some(DAY + 3800.5));
    }

    #[test]
    fn test_switch_to_track_without_clips() {
        let mut tracks = two_day_tracks();
        tracks.push(Track::from_clips(5, vec![]).unwrap());
        let mut clock = TimelineClock::new(tracks, SectorPartitioner::utc(), 1.0, 0.3);

        assert!(matches!(
            clock.begin_camera_switch("T5"),
            Err(CoreError::EmptyTrack(id)) if id == "T5"
        ));
        assert_eq!(clock.active_track_id(), Some("T1"));
        assert_eq!(clock.state(), ClockState::Idle);
    }

    #[test]
    fn test_rejected_switch_keeps_held_seek() {
        let mut clock = two_day_clock();
        let switch = clock.begin_camera_switch("T2").unwrap();
        clock.seek(DAY + 3950.0).unwrap();

        assert!(clock.begin_camera_switch("T9").is_err());

        assert_eq!(clock.current_time(), DAY + 3700.0);
        assert_eq!(clock.pending_seek(), Some(DAY + 3950.0));
        assert!(clock.is_changing_camera());

        let done = clock.complete_camera_switch(switch.generation).unwrap();
        assert_eq!(done.applied_seek, Some(DAY + 3950.0));
    }

    #[test]
    fn test_set_tracks_keeps_sector_state() {
        let mut clock = two_day_clock();
        clock.set_zoom("2024-03-10", 4.0).unwrap();
        clock.seek(DAY + 3900.0).unwrap();

        let tracks = clock.tracks().to_vec();
        clock.set_tracks(tracks);

        let state = clock.sector_state("2024-03-10").unwrap();
        assert_eq!(state.zoom_level, 4.0);
        assert_eq!(state.last_visited_time, DAY + 3900.0);
        assert_eq!(clock.current_time(), DAY + 3900.0);

        assert!(matches!(
            clock.set_zoom("1999-01-01", 2.0),
            Err(CoreError::SectorNotFound(_))
        ));
    }

    #[test]
    fn test_empty_timeline() {
        let mut clock = TimelineClock::new(vec![], SectorPartitioner::utc(), 1.0, 0.3);

        assert!(clock.sectors().is_empty());
        assert!(clock.active_track_id().is_none());
        assert!(!clock.play());
        assert_eq!(clock.seek(42.0).unwrap(), 42.0);
    }
}
