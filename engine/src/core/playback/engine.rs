//! Playback Engine
//!
//! Confines the clock, synchronizer and montage recorder to one owner.
//! `PlaybackCore` handles one message at a time; `PlaybackEngine` runs it on
//! a tokio task fed by a single ordered channel, with a frame interval that
//! only ticks while something needs it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use super::clock::{ClockSnapshot, TimelineClock};
use super::events::{EngineOutput, MediaEvent, PlaybackCommand, PlaybackMessage};
use super::montage::MontageRecorder;
use super::sync::{PlaybackSynchronizer, SyncConfig};
use crate::core::catalog::Track;
use crate::core::settings::EngineConfig;
use crate::core::zoom::ZoomMapper;
use crate::core::{CoreError, CoreResult, SectorDate, TimeSec, TrackId};

// =============================================================================
// Core
// =============================================================================

/// Synchronous owner of all playback state
#[derive(Clone, Debug)]
pub struct PlaybackCore {
    clock: TimelineClock,
    sync: PlaybackSynchronizer,
    montage: MontageRecorder,
    zoom: ZoomMapper,
}

impl PlaybackCore {
    pub fn new(clock: TimelineClock, sync_config: SyncConfig, zoom: ZoomMapper) -> Self {
        Self {
            clock,
            sync: PlaybackSynchronizer::new(sync_config),
            montage: MontageRecorder::new(),
            zoom,
        }
    }

    pub fn from_config(config: &EngineConfig, tracks: Vec<Track>) -> Self {
        let sync_config = config.sync_config();
        let clock = TimelineClock::new(
            tracks,
            config.partitioner(),
            config.timeline.default_zoom,
            sync_config.clip_tolerance,
        );
        Self::new(clock, sync_config, config.zoom_mapper())
    }

    pub fn clock(&self) -> &TimelineClock {
        &self.clock
    }

    pub fn is_recording(&self) -> bool {
        self.montage.is_recording()
    }

    /// True while frame ticks are needed: playing, or waiting on a load
    pub fn wants_ticks(&self) -> bool {
        self.clock.is_playing() || self.sync.has_pending_loads()
    }

    /// Processes one message and returns what the outside world must do
    pub fn handle(&mut self, message: PlaybackMessage, now: Instant) -> Vec<EngineOutput> {
        let mut out = Vec::new();

        match message {
            PlaybackMessage::Command(command) => self.handle_command(command, now, &mut out),
            PlaybackMessage::Media(event) => self.handle_media(event, now, &mut out),
            PlaybackMessage::Tick { delta } => {
                let completed = self.sync.poll_timeouts(now, &mut self.clock, &mut out);
                for _ in completed {
                    self.record_switch();
                }
                if self.clock.advance(delta).is_some() {
                    self.sync.advance_estimates(delta);
                }
            }
        }

        self.sync.reconcile(&self.clock, now, &mut out);
        out
    }

    fn handle_command(&mut self, command: PlaybackCommand, now: Instant, out: &mut Vec<EngineOutput>) {
        match command {
            PlaybackCommand::Play => {
                if !self.clock.play() {
                    info!("Nothing to play at {:.3}s", self.clock.current_time());
                }
            }
            PlaybackCommand::Pause => self.clock.pause(),
            PlaybackCommand::Seek { time } => {
                if let Err(e) = self.clock.seek(time) {
                    warn!("Seek rejected: {}", e);
                }
            }
            PlaybackCommand::SwitchCamera { track_id } => {
                let previous = self.clock.active_track_id().map(str::to_string);
                match self.clock.begin_camera_switch(&track_id) {
                    Ok(switch) => self.sync.begin_switch(&switch, previous.as_deref(), now, out),
                    Err(e) => warn!("Camera switch rejected: {}", e),
                }
            }
            PlaybackCommand::SetZoom { date, zoom } => {
                let zoom = self.zoom.clamp(zoom);
                if let Err(e) = self.clock.set_zoom(&date, zoom) {
                    warn!("Zoom change rejected: {}", e);
                }
            }
            PlaybackCommand::SetTracks(tracks) => {
                self.clock.set_tracks(tracks);
                let ids: Vec<&str> = self.clock.tracks().iter().map(Track::id).collect();
                self.sync.retain_tracks(&ids);
            }
            PlaybackCommand::StartRecording => match self.clock.active_track() {
                Some(track) => {
                    self.montage
                        .start(track.id(), track.camera_index(), self.clock.current_time())
                }
                None => warn!("Cannot record a montage without an active track"),
            },
            PlaybackCommand::StopRecording => {
                if self.montage.is_recording() {
                    let cuts = self.montage.stop(self.clock.current_time());
                    out.push(EngineOutput::MontageRecorded(cuts));
                }
            }
        }
    }

    fn handle_media(&mut self, event: MediaEvent, now: Instant, out: &mut Vec<EngineOutput>) {
        match event {
            MediaEvent::TimeAdvanced {
                track_id,
                clip_id,
                local_time,
            } => {
                self.sync
                    .on_media_time(&track_id, &clip_id, local_time, now, &mut self.clock, out);
            }
            MediaEvent::Ready {
                track_id,
                generation,
            } => {
                if self
                    .sync
                    .on_media_ready(&track_id, generation, &mut self.clock, out)
                    .is_some()
                {
                    self.record_switch();
                }
            }
            MediaEvent::Error { track_id, code } => {
                self.sync.on_media_error(&track_id, &code, &mut self.clock, out);
            }
        }
    }

    fn record_switch(&mut self) {
        if let Some(track) = self.clock.active_track() {
            self.montage
                .on_switch(track.id(), track.camera_index(), self.clock.current_time());
        }
    }
}

// =============================================================================
// Engine Task
// =============================================================================

pub struct PlaybackEngine;

impl PlaybackEngine {
    /// Spawns the engine on the current tokio runtime.
    ///
    /// Returns the command handle, the output stream and the task handle. The
    /// task ends on `shutdown()` or once every handle is dropped.
    pub fn spawn(
        core: PlaybackCore,
        tick_hz: u32,
    ) -> (
        PlaybackHandle,
        mpsc::UnboundedReceiver<EngineOutput>,
        JoinHandle<()>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(core.clock().snapshot());
        let shutdown = Arc::new(Notify::new());
        let frame = Duration::from_secs_f64(1.0 / f64::from(tick_hz.max(1)));

        let task = tokio::spawn(run(
            core,
            rx,
            out_tx,
            snapshot_tx,
            Arc::clone(&shutdown),
            frame,
        ));

        let handle = PlaybackHandle {
            tx,
            snapshot_rx,
            shutdown,
        };
        (handle, out_rx, task)
    }
}

async fn run(
    mut core: PlaybackCore,
    mut rx: mpsc::UnboundedReceiver<PlaybackMessage>,
    out_tx: mpsc::UnboundedSender<EngineOutput>,
    snapshot_tx: watch::Sender<ClockSnapshot>,
    shutdown: Arc<Notify>,
    frame: Duration,
) {
    let mut frames = tokio::time::interval(frame);
    frames.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_frame = Instant::now();
    let mut ticking = false;

    info!(frame_ms = frame.as_millis() as u64, "Playback engine started");

    loop {
        let wants_ticks = core.wants_ticks();
        if wants_ticks && !ticking {
            frames.reset();
            last_frame = Instant::now();
        }
        ticking = wants_ticks;

        let outputs = tokio::select! {
            _ = shutdown.notified() => {
                debug!("Playback engine shutdown requested");
                break;
            }
            message = rx.recv() => match message {
                Some(message) => core.handle(message, Instant::now()),
                None => break,
            },
            now = frames.tick(), if ticking => {
                let delta = now.saturating_duration_since(last_frame).as_secs_f64();
                last_frame = now;
                core.handle(PlaybackMessage::Tick { delta }, now)
            }
        };

        for output in outputs {
            // nobody listening is fine; state still goes out through the snapshot
            let _ = out_tx.send(output);
        }
        snapshot_tx.send_replace(core.clock().snapshot());
    }

    info!("Playback engine stopped");
}

// =============================================================================
// Handle
// =============================================================================

/// Cloneable command surface of a running engine
#[derive(Clone, Debug)]
pub struct PlaybackHandle {
    tx: mpsc::UnboundedSender<PlaybackMessage>,
    snapshot_rx: watch::Receiver<ClockSnapshot>,
    shutdown: Arc<Notify>,
}

impl PlaybackHandle {
    pub fn send(&self, message: impl Into<PlaybackMessage>) -> CoreResult<()> {
        self.tx
            .send(message.into())
            .map_err(|_| CoreError::EngineClosed)
    }

    pub fn play(&self) -> CoreResult<()> {
        self.send(PlaybackCommand::Play)
    }

    pub fn pause(&self) -> CoreResult<()> {
        self.send(PlaybackCommand::Pause)
    }

    /// Queues a seek; non-finite times are rejected here
    pub fn seek(&self, time: TimeSec) -> CoreResult<()> {
        if !time.is_finite() {
            return Err(CoreError::InvalidTime(time));
        }
        self.send(PlaybackCommand::Seek { time })
    }

    pub fn switch_camera(&self, track_id: impl Into<TrackId>) -> CoreResult<()> {
        self.send(PlaybackCommand::SwitchCamera {
            track_id: track_id.into(),
        })
    }

    pub fn set_zoom(&self, date: impl Into<SectorDate>, zoom: f64) -> CoreResult<()> {
        self.send(PlaybackCommand::SetZoom {
            date: date.into(),
            zoom,
        })
    }

    pub fn set_tracks(&self, tracks: Vec<Track>) -> CoreResult<()> {
        self.send(PlaybackCommand::SetTracks(tracks))
    }

    pub fn start_recording(&self) -> CoreResult<()> {
        self.send(PlaybackCommand::StartRecording)
    }

    pub fn stop_recording(&self) -> CoreResult<()> {
        self.send(PlaybackCommand::StopRecording)
    }

    pub fn media_time_advanced(
        &self,
        track_id: impl Into<TrackId>,
        clip_id: impl Into<String>,
        local_time: TimeSec,
    ) -> CoreResult<()> {
        self.send(MediaEvent::TimeAdvanced {
            track_id: track_id.into(),
            clip_id: clip_id.into(),
            local_time,
        })
    }

    pub fn media_ready(&self, track_id: impl Into<TrackId>, generation: u64) -> CoreResult<()> {
        self.send(MediaEvent::Ready {
            track_id: track_id.into(),
            generation,
        })
    }

    pub fn media_error(&self, track_id: impl Into<TrackId>, code: impl Into<String>) -> CoreResult<()> {
        self.send(MediaEvent::Error {
            track_id: track_id.into(),
            code: code.into(),
        })
    }

    /// Latest published clock state
    pub fn snapshot(&self) -> ClockSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ClockSnapshot> {
        self.snapshot_rx.clone()
    }

    /// Asks the engine task to stop after the current message
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::playback::events::MediaCommand;
    use crate::core::playback::fixtures::{two_day_clock, two_day_tracks, DAY};
    use tokio::time::timeout;

    fn core() -> PlaybackCore {
        PlaybackCore::new(two_day_clock(), SyncConfig::default(), ZoomMapper::default())
    }

    fn command(core: &mut PlaybackCore, command: PlaybackCommand) -> Vec<EngineOutput> {
        core.handle(PlaybackMessage::Command(command), Instant::now())
    }

    fn media(core: &mut PlaybackCore, event: MediaEvent) -> Vec<EngineOutput> {
        core.handle(PlaybackMessage::Media(event), Instant::now())
    }

    fn load_of(outputs: &[EngineOutput]) -> (String, u64) {
        outputs
            .iter()
            .find_map(|o| match o {
                EngineOutput::Media(MediaCommand::Load {
                    track_id,
                    generation,
                    ..
                }) => Some((track_id.clone(), *generation)),
                _ => None,
            })
            .expect("no load issued")
    }

    #[test]
    fn test_core_switch_records_montage() {
        let mut core = core();
        let out = command(&mut core, PlaybackCommand::Seek { time: DAY + 3800.0 });
        let (track, generation) = load_of(&out);
        media(&mut core, MediaEvent::Ready { track_id: track, generation });

        command(&mut core, PlaybackCommand::StartRecording);
        assert!(core.is_recording());
        command(&mut core, PlaybackCommand::Seek { time: DAY + 3850.0 });

        let out = command(
            &mut core,
            PlaybackCommand::SwitchCamera {
                track_id: "T2".to_string(),
            },
        );
        let (track, generation) = load_of(&out);
        assert_eq!(track, "T2");
        media(&mut core, MediaEvent::Ready { track_id: track, generation });
        assert!(!core.clock().is_changing_camera());

        command(&mut core, PlaybackCommand::Seek { time: DAY + 3900.0 });
        let out = command(&mut core, PlaybackCommand::StopRecording);

        let cuts = out
            .iter()
            .find_map(|o| match o {
                EngineOutput::MontageRecorded(cuts) => Some(cuts),
                _ => None,
            })
            .expect("no montage output");
        assert_eq!(cuts.len(), 2);
        assert_eq!(cuts[0].track_id, "T1");
        assert_eq!(cuts[0].start, DAY + 3800.0);
        assert_eq!(cuts[0].duration, 50.0);
        assert_eq!(cuts[1].camera_index, 2);
        assert_eq!(cuts[1].duration, 50.0);
    }

    #[test]
    fn test_core_ignores_bad_commands() {
        let mut core = core();
        let before = core.clock().snapshot();

        command(
            &mut core,
            PlaybackCommand::SwitchCamera {
                track_id: "T9".to_string(),
            },
        );
        command(&mut core, PlaybackCommand::Seek { time: f64::INFINITY });
        command(
            &mut core,
            PlaybackCommand::SetZoom {
                date: "1999-01-01".to_string(),
                zoom: 2.0,
            },
        );

        let after = core.clock().snapshot();
        assert_eq!(after.current_time, before.current_time);
        assert_eq!(after.active_track_id, before.active_track_id);
    }

    #[test]
    fn test_core_clamps_zoom() {
        let mut core = core();
        command(
            &mut core,
            PlaybackCommand::SetZoom {
                date: "2024-03-10".to_string(),
                zoom: 1_000.0,
            },
        );

        let state = core.clock().sector_state("2024-03-10").unwrap();
        assert_eq!(state.zoom_level, 18.0);
    }

    #[test]
    fn test_core_media_error_pauses() {
        let mut core = core();
        let out = command(&mut core, PlaybackCommand::Seek { time: DAY + 3800.0 });
        let (track, generation) = load_of(&out);
        media(&mut core, MediaEvent::Ready { track_id: track, generation });
        command(&mut core, PlaybackCommand::Play);
        assert!(core.clock().is_playing());

        media(
            &mut core,
            MediaEvent::Error {
                track_id: "T1".to_string(),
                code: "network".to_string(),
            },
        );
        assert!(!core.clock().is_playing());
        assert!(!core.wants_ticks());
    }

    #[test]
    fn test_core_set_tracks_reloads() {
        let mut core = core();
        command(&mut core, PlaybackCommand::SetTracks(vec![]));
        assert!(core.clock().sectors().is_empty());

        let out = command(&mut core, PlaybackCommand::SetTracks(two_day_tracks()));
        assert_eq!(load_of(&out).0, "T1");
    }

    // -------------------------------------------------------------------------
    // Engine task
    // -------------------------------------------------------------------------

    async fn next_media(outputs: &mut mpsc::UnboundedReceiver<EngineOutput>) -> MediaCommand {
        loop {
            match timeout(Duration::from_secs(2), outputs.recv()).await {
                Ok(Some(EngineOutput::Media(command))) => return command,
                Ok(Some(_)) => continue,
                other => panic!("no media command: {:?}", other),
            }
        }
    }

    async fn wait_for(
        handle: &PlaybackHandle,
        condition: impl Fn(&ClockSnapshot) -> bool,
    ) -> ClockSnapshot {
        let mut rx = handle.subscribe();
        timeout(Duration::from_secs(2), async move {
            loop {
                let snapshot = rx.borrow_and_update().clone();
                if condition(&snapshot) {
                    return snapshot;
                }
                rx.changed().await.expect("engine stopped");
            }
        })
        .await
        .expect("condition not reached")
    }

    #[tokio::test]
    async fn test_engine_publishes_seek() {
        let (handle, _outputs, _task) = PlaybackEngine::spawn(core(), 60);

        handle.seek(DAY + 3900.0).unwrap();
        let snapshot = wait_for(&handle, |s| s.current_time == DAY + 3900.0).await;

        assert_eq!(snapshot.active_sector_date.as_deref(), Some("2024-03-10"));
        assert!(matches!(
            handle.seek(f64::NAN),
            Err(CoreError::InvalidTime(_))
        ));
    }

    #[tokio::test]
    async fn test_engine_camera_switch_flow() {
        let (handle, mut outputs, _task) = PlaybackEngine::spawn(core(), 60);

        handle.seek(DAY + 3800.0).unwrap();
        let MediaCommand::Load {
            track_id,
            generation,
            ..
        } = next_media(&mut outputs).await
        else {
            panic!("expected initial load");
        };
        handle.media_ready(track_id, generation).unwrap();
        handle.play().unwrap();
        assert_eq!(
            next_media(&mut outputs).await,
            MediaCommand::Play {
                track_id: "T1".to_string()
            }
        );

        handle.switch_camera("T2").unwrap();
        assert_eq!(
            next_media(&mut outputs).await,
            MediaCommand::Pause {
                track_id: "T1".to_string()
            }
        );
        let MediaCommand::Load {
            track_id,
            generation,
            ..
        } = next_media(&mut outputs).await
        else {
            panic!("expected switch load");
        };
        assert_eq!(track_id, "T2");

        let during = wait_for(&handle, |s| s.is_changing_camera).await;
        handle.media_time_advanced("T2", "b1", 500.0).unwrap();
        handle.media_ready("T2", generation).unwrap();

        let after = wait_for(&handle, |s| !s.is_changing_camera).await;
        assert_eq!(after.active_track_id.as_deref(), Some("T2"));
        assert!(after.is_playing);
        // the report made during the switch (local 500s) never reached the clock
        assert!(after.current_time - during.current_time < 1.0);

        handle.pause().unwrap();
        wait_for(&handle, |s| !s.is_playing).await;
    }

    #[tokio::test]
    async fn test_engine_closed_after_shutdown() {
        let (handle, _outputs, task) = PlaybackEngine::spawn(core(), 60);

        handle.shutdown();
        timeout(Duration::from_secs(2), task)
            .await
            .expect("engine did not stop")
            .unwrap();

        assert!(handle.is_closed());
        assert!(matches!(handle.play(), Err(CoreError::EngineClosed)));
    }

    #[tokio::test]
    async fn test_engine_stops_when_handles_drop() {
        let (handle, _outputs, task) = PlaybackEngine::spawn(core(), 60);
        let clone = handle.clone();
        drop(handle);
        drop(clone);

        timeout(Duration::from_secs(2), task)
            .await
            .expect("engine did not stop")
            .unwrap();
    }
}
