//! Studio Module
//!
//! `StudioContext` owns one open session together with the timeline, the
//! engine, the recorder, the player and the bouncer, and exposes the
//! control surface a host drives. Hosts create it explicitly and pass it
//! where it is needed; there is no global instance.

pub mod bouncer;
pub mod player;
pub mod recorder;

use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::StudioConfig;
use crate::engine::io::ExportFormat;
use crate::engine::{AudioEngine, EngineDiagnostics, EngineEvent, OutputDriver, Timeline, TransportState};
use crate::error::{FourTrackError, Result};
use crate::state::{Mix, Session, TrackFx, TrackIndex, TRACK_COUNT};

pub use bouncer::{BounceError, BounceHandle, BounceProgress, SessionBouncer};
pub use player::{PlaybackReport, SessionPlayer, SkippedRegion};
pub use recorder::{InputPort, MicrophonePermission, Recorder, RecordingOutcome, StaticPermission};

/// Everything a host displays, read in one call
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StudioTelemetry {
    /// Seconds
    pub playhead: f64,
    pub state: TransportState,
    /// Held microphone peak in [0, 1]
    pub input_level: f32,
    /// Seconds captured in the current take
    pub recording_duration: f64,
    pub master_peak: f32,
    pub track_peaks: [f32; TRACK_COUNT],
}

pub struct StudioContext {
    config: StudioConfig,
    session: Session,
    timeline: Timeline,
    engine: AudioEngine,
    recorder: Recorder,
    player: SessionPlayer,
    bouncer: SessionBouncer,
}

impl StudioContext {
    /// Build a context around `session`; call `start_engine` to attach output
    pub fn new(
        config: StudioConfig,
        session: Session,
        permission: Box<dyn MicrophonePermission>,
    ) -> Result<Self> {
        config.validate()?;
        session.validate()?;
        let mut engine = AudioEngine::new(config.engine.clone())?;
        for track in &session.tracks {
            engine.set_track_fx(track.index, track.fx);
            engine.set_track_muted(track.index, track.muted);
        }
        let recorder = Recorder::new(
            permission,
            config.recordings_dir.clone(),
            config.engine.input_ring_secs,
        );
        let bouncer = SessionBouncer::new(ExportFormat::new(config.bounce_bit_depth));
        Ok(Self {
            timeline: Timeline::new(engine.sample_rate()),
            config,
            session,
            engine,
            recorder,
            player: SessionPlayer::new(),
            bouncer,
        })
    }

    pub fn config(&self) -> &StudioConfig {
        &self.config
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Edit the session; region edits reach the engine on the next `play`
    pub fn session_mut(&mut self) -> &mut Session {
        &mut self.session
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn engine(&self) -> &AudioEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut AudioEngine {
        &mut self.engine
    }

    pub fn recorder(&self) -> &Recorder {
        &self.recorder
    }

    // ========================================================================
    // Engine lifecycle
    // ========================================================================

    pub fn start_engine(&mut self, driver: Box<dyn OutputDriver>) -> Result<()> {
        self.halt_transport()?;
        self.engine.start(driver)?;
        self.timeline.set_sample_rate(self.engine.sample_rate());
        Ok(())
    }

    /// Stop the transport (finishing any take) and close the output route
    pub fn suspend_engine(&mut self) -> Result<Option<RecordingOutcome>> {
        let outcome = self.halt_transport()?;
        self.engine.suspend()?;
        Ok(outcome)
    }

    pub fn resume_engine(&mut self) -> Result<()> {
        self.engine.resume()?;
        self.timeline.set_sample_rate(self.engine.sample_rate());
        Ok(())
    }

    fn halt_transport(&mut self) -> Result<Option<RecordingOutcome>> {
        if self.recorder.is_recording() {
            return self.stop_recording().map(Some);
        }
        if self.timeline.state().is_running() {
            self.player.stop(&mut self.timeline, &mut self.engine, false)?;
        }
        Ok(None)
    }

    // ========================================================================
    // Recording
    // ========================================================================

    pub fn arm(&mut self, track: TrackIndex) -> Result<()> {
        self.recorder.arm(track)
    }

    pub fn disarm(&mut self) -> Result<()> {
        self.recorder.disarm()
    }

    /// Start a take on the armed track; the other tracks play along
    ///
    /// Input frames go into the returned port.
    pub fn start_recording(&mut self) -> Result<InputPort> {
        let track = self.recorder.armed().ok_or(FourTrackError::NoTrackArmed)?;
        let (backing, skipped) = self.player.backing_schedule(
            &self.session,
            self.timeline.playhead(),
            self.engine.sample_rate(),
            track,
        );
        if !skipped.is_empty() {
            warn!(skipped = skipped.len(), "Recording without some backing regions");
        }
        self.recorder
            .start_recording(&self.session, &mut self.timeline, &mut self.engine, backing)
    }

    pub fn stop_recording(&mut self) -> Result<RecordingOutcome> {
        self.recorder
            .stop_recording(&mut self.session, &mut self.timeline, &mut self.engine)
    }

    // ========================================================================
    // Playback
    // ========================================================================

    pub fn play(&mut self) -> Result<PlaybackReport> {
        self.player
            .play(&self.session, &mut self.timeline, &mut self.engine)
    }

    /// Stop playback or recording; a running take is finished
    pub fn stop(&mut self, reset_playhead: bool) -> Result<Option<RecordingOutcome>> {
        let outcome = self.halt_transport()?;
        // Idempotent: a stopped transport only honours the reset
        if reset_playhead {
            self.timeline.stop(true);
        }
        Ok(outcome)
    }

    pub fn seek(&mut self, time: f64) -> Result<()> {
        if self.player.seek(&mut self.timeline, time) {
            Ok(())
        } else {
            Err(FourTrackError::InvalidTransition {
                operation: "seek",
                state: self.timeline.state().to_string(),
            })
        }
    }

    pub fn set_loop(&mut self, enabled: bool, start: f64, end: f64) -> Result<()> {
        if self.timeline.set_loop(enabled, start, end) {
            Ok(())
        } else {
            Err(FourTrackError::InvalidLoop { start, end })
        }
    }

    pub fn disable_loop(&mut self) {
        self.timeline.disable_loop();
    }

    // ========================================================================
    // Effects
    // ========================================================================

    /// Store FX on the session and apply them live
    pub fn set_track_fx(&mut self, track: TrackIndex, fx: TrackFx) {
        let fx = fx.clamped();
        self.session.track_mut(track).fx = fx;
        self.engine.set_track_fx(track, fx);
    }

    pub fn set_track_muted(&mut self, track: TrackIndex, muted: bool) {
        self.session.track_mut(track).muted = muted;
        self.engine.set_track_muted(track, muted);
    }

    // ========================================================================
    // Bounce
    // ========================================================================

    /// Mix the session down to `output` on the calling thread
    pub fn bounce<F>(&self, output: &Path, progress: F) -> Result<Mix>
    where
        F: FnMut(BounceProgress),
    {
        Ok(self.bouncer.bounce(&self.session, output, progress)?)
    }

    /// Mix down a snapshot of the session on a worker thread
    pub fn spawn_bounce<F>(&self, output: &Path, progress: F) -> Result<BounceHandle>
    where
        F: FnMut(BounceProgress) + Send + 'static,
    {
        Ok(self
            .bouncer
            .spawn(self.session.clone(), output.to_path_buf(), progress)?)
    }

    // ========================================================================
    // Session
    // ========================================================================

    /// Replace the open session
    ///
    /// Any transport is stopped first (a running take lands on the old
    /// session) and the timeline starts over at 0.
    pub fn load_session(&mut self, session: Session) -> Result<Option<RecordingOutcome>> {
        session.validate()?;
        let outcome = self.halt_transport()?;
        for track in &session.tracks {
            self.engine.set_track_fx(track.index, track.fx);
            self.engine.set_track_muted(track.index, track.muted);
        }
        self.timeline.reset_for_session();
        self.player.clear_cache();
        info!(session = %session.name, regions = session.region_count(), "Session loaded");
        self.session = session;
        Ok(outcome)
    }

    // ========================================================================
    // Control tick and telemetry
    // ========================================================================

    /// Control-domain housekeeping; call regularly (e.g. every UI frame)
    ///
    /// Drains recorder input, follows the engine playhead, releases retired
    /// schedules and finishes takes the engine stopped at the session limit.
    pub fn poll(&mut self) -> Result<Option<RecordingOutcome>> {
        self.recorder.pump();
        self.engine.collect_garbage();

        for event in self.engine.poll_events() {
            match event {
                EngineEvent::ReachedEnd { position } => {
                    debug!(position, "Transport reached the end of the timeline")
                }
                EngineEvent::NonFiniteOutput => warn!("Engine silenced a non-finite block"),
                EngineEvent::Looped { count } => debug!(count, "Loop wrapped"),
                EngineEvent::Started { .. } | EngineEvent::Stopped { .. } => {}
            }
        }

        let was_recording = self.timeline.is_recording();
        self.timeline.sync(&self.engine.telemetry());
        if was_recording && self.timeline.is_stopped() && self.recorder.is_recording() {
            info!("Recording stopped at the session limit");
            return self.stop_recording().map(Some);
        }
        Ok(None)
    }

    pub fn telemetry(&self) -> StudioTelemetry {
        let engine = self.engine.telemetry();
        StudioTelemetry {
            playhead: self.timeline.playhead(),
            state: self.timeline.state(),
            input_level: self.recorder.input_level(),
            recording_duration: self.recorder.recorded_duration(),
            master_peak: engine.master_peak,
            track_peaks: engine.track_peaks,
        }
    }

    pub fn diagnostics(&self) -> EngineDiagnostics {
        self.engine.diagnostics(&self.session)
    }
}
