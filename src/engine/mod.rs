//! Audio Engine Module
//!
//! Control-domain handle over the render domain:
//! - Lifecycle (running, suspended, shut down) and the output driver
//! - Per-track FX snapshots, pushed to the renderer as commands
//! - Transport start/stop with acknowledged sequence numbers
//! - Telemetry, events and diagnostics read back from the renderer

pub mod buffer;
pub mod bus;
#[cfg(feature = "device")]
pub mod device;
pub mod diagnostics;
pub mod driver;
pub mod io;
pub mod renderer;
pub mod telemetry;
pub mod transport;

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{FourTrackError, Result};
use crate::state::{DelaySettings, ReverbSettings, SaturationSettings, Session, TrackFx, TrackIndex, TRACK_COUNT};

pub use buffer::{AudioBuffer, ChannelLayout, INTERNAL_SAMPLE_RATE};
pub use bus::{MasterBus, TrackBus};
#[cfg(feature = "device")]
pub use device::{CpalInputCapture, CpalOutputDriver};
pub use diagnostics::{DiagnosticIssue, EngineDiagnostics, EngineLifecycle};
pub use driver::{ManualClock, ManualDriver, OutputDriver};
pub use io::{export_audio, import_audio, probe_duration, validate_riff, ExportFormat};
pub use renderer::{EngineCommand, EngineEvent, Renderer, Schedule, ScheduledRegion};
pub use telemetry::{Telemetry, TelemetrySnapshot};
pub use transport::{AdvanceOutcome, FrameLoop, LoopRange, Timeline, TransportState};

/// Control handle for the real-time engine
pub struct AudioEngine {
    config: EngineConfig,
    lifecycle: EngineLifecycle,
    driver: Option<Box<dyn OutputDriver>>,
    commands: Option<Sender<EngineCommand>>,
    events: Option<Receiver<EngineEvent>>,
    telemetry: Arc<Telemetry>,
    sample_rate: u32,
    fx: [TrackFx; TRACK_COUNT],
    muted: [bool; TRACK_COUNT],
    /// Tracks whose last update did not fit in the command queue
    pending: [bool; TRACK_COUNT],
    /// Tracks whose last update found the renderer gone
    disconnected: [bool; TRACK_COUNT],
    /// Schedules sent to the renderer; released once it lets go of them
    in_flight: Vec<Arc<Schedule>>,
    seq: u64,
}

impl AudioEngine {
    /// Create a suspended engine; attach output with `start`
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate().map_err(|e| FourTrackError::EngineConstruction {
            reason: e.to_string(),
        })?;
        Ok(Self {
            sample_rate: config.sample_rate,
            config,
            lifecycle: EngineLifecycle::Suspended,
            driver: None,
            commands: None,
            events: None,
            telemetry: Arc::new(Telemetry::new()),
            fx: [TrackFx::default(); TRACK_COUNT],
            muted: [false; TRACK_COUNT],
            pending: [false; TRACK_COUNT],
            disconnected: [false; TRACK_COUNT],
            in_flight: Vec::new(),
            seq: 0,
        })
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Attach an output driver and start rendering
    ///
    /// Replaces any previously attached driver.
    pub fn start(&mut self, driver: Box<dyn OutputDriver>) -> Result<()> {
        if self.lifecycle == EngineLifecycle::Shutdown {
            return Err(self.invalid("start"));
        }
        self.suspend()?;
        info!(driver = driver.name(), "Attaching output driver");
        self.driver = Some(driver);
        self.resume()
    }

    /// Close the output route; FX snapshots are kept for `resume`
    pub fn suspend(&mut self) -> Result<()> {
        if self.lifecycle != EngineLifecycle::Running {
            return Ok(());
        }
        if let Some(driver) = self.driver.as_mut() {
            driver.close()?;
        }
        self.commands = None;
        self.events = None;

        // The renderer is gone; its last transport state is final
        let playhead = self.telemetry.snapshot().playhead_frames;
        self.telemetry.publish_transport(TransportState::Stopped, playhead);
        self.telemetry.acknowledge(self.seq);
        self.collect_garbage();

        self.lifecycle = EngineLifecycle::Suspended;
        info!("Audio engine suspended");
        Ok(())
    }

    /// Rebuild the renderer and reopen the output route
    pub fn resume(&mut self) -> Result<()> {
        match self.lifecycle {
            EngineLifecycle::Running => return Ok(()),
            EngineLifecycle::Shutdown => return Err(self.invalid("resume")),
            EngineLifecycle::Suspended => {}
        }
        let Some(driver) = self.driver.as_mut() else {
            return Err(FourTrackError::EngineUnavailable {
                reason: "no output driver attached".to_string(),
            });
        };

        let sample_rate = driver.sample_rate().unwrap_or(self.config.sample_rate);
        let (command_tx, command_rx) = crossbeam_channel::bounded(self.config.command_capacity);
        let (event_tx, event_rx) = crossbeam_channel::bounded(self.config.command_capacity);

        let mut renderer = Renderer::new(
            &self.config,
            sample_rate,
            command_rx,
            event_tx,
            self.telemetry.clone(),
        );
        for track in TrackIndex::ALL {
            let i = track.zero_based();
            renderer.apply_fx_immediate(track, &self.fx[i]);
            renderer.set_track_muted_immediate(track, self.muted[i]);
        }

        driver.open(renderer)?;

        self.sample_rate = sample_rate;
        self.commands = Some(command_tx);
        self.events = Some(event_rx);
        self.pending = [false; TRACK_COUNT];
        self.disconnected = [false; TRACK_COUNT];
        self.lifecycle = EngineLifecycle::Running;
        info!(sample_rate, driver = driver.name(), "Audio engine running");
        Ok(())
    }

    /// Close the route and drop the driver; the engine cannot be resumed
    pub fn shutdown(&mut self) -> Result<()> {
        if self.lifecycle == EngineLifecycle::Shutdown {
            return Ok(());
        }
        self.suspend()?;
        self.driver = None;
        self.in_flight.clear();
        self.lifecycle = EngineLifecycle::Shutdown;
        info!("Audio engine shut down");
        Ok(())
    }

    pub fn lifecycle(&self) -> EngineLifecycle {
        self.lifecycle
    }

    pub fn is_running(&self) -> bool {
        self.lifecycle == EngineLifecycle::Running
    }

    /// Rate the render domain runs at (the driver's, or the configured one)
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn invalid(&self, operation: &'static str) -> FourTrackError {
        FourTrackError::InvalidTransition {
            operation,
            state: format!("engine is {}", self.lifecycle),
        }
    }

    // ========================================================================
    // Track buses
    // ========================================================================

    pub fn fx(&self, track: TrackIndex) -> &TrackFx {
        &self.fx[track.zero_based()]
    }

    pub fn is_muted(&self, track: TrackIndex) -> bool {
        self.muted[track.zero_based()]
    }

    /// Store a track's FX and send it to the renderer
    ///
    /// Values are clamped. While suspended the snapshot is applied on the
    /// next resume.
    pub fn set_track_fx(&mut self, track: TrackIndex, fx: TrackFx) {
        let fx = fx.clamped();
        self.fx[track.zero_based()] = fx;
        self.send_track(track, EngineCommand::SetTrackFx { track, fx });
    }

    pub fn set_track_muted(&mut self, track: TrackIndex, muted: bool) {
        self.muted[track.zero_based()] = muted;
        self.send_track(track, EngineCommand::SetTrackMuted { track, muted });
    }

    /// Handle for editing one track's FX
    pub fn bus(&mut self, track: TrackIndex) -> TrackBusHandle<'_> {
        TrackBusHandle { engine: self, track }
    }

    fn send_track(&mut self, track: TrackIndex, command: EngineCommand) {
        let i = track.zero_based();
        let Some(commands) = &self.commands else {
            return;
        };
        match commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                debug!(%track, "Command queue full; update deferred");
                self.pending[i] = true;
            }
            Err(TrySendError::Disconnected(_)) => {
                warn!(%track, "Renderer unreachable; bus update lost");
                self.disconnected[i] = true;
            }
        }
    }

    // ========================================================================
    // Transport
    // ========================================================================

    /// Start the render-domain transport; returns the command's sequence number
    pub fn start_transport(
        &mut self,
        state: TransportState,
        position: u64,
        schedule: Arc<Schedule>,
        looping: Option<FrameLoop>,
        end: Option<u64>,
    ) -> Result<u64> {
        let commands = self.commands.as_ref().ok_or_else(|| FourTrackError::EngineUnavailable {
            reason: format!("engine is {}", self.lifecycle),
        })?;
        let seq = self.seq + 1;
        let command = EngineCommand::Start {
            seq,
            state,
            position,
            schedule: schedule.clone(),
            looping,
            end,
        };
        commands.try_send(command).map_err(|e| FourTrackError::EngineUnavailable {
            reason: match e {
                TrySendError::Full(_) => "command queue full".to_string(),
                TrySendError::Disconnected(_) => "renderer unreachable".to_string(),
            },
        })?;
        self.seq = seq;
        self.in_flight.push(schedule);
        debug!(seq, position, %state, "Transport start sent");
        Ok(seq)
    }

    /// Stop the render-domain transport
    ///
    /// Stopping a suspended engine is a no-op.
    pub fn stop_transport(&mut self) -> Result<u64> {
        let Some(commands) = &self.commands else {
            return Ok(self.seq);
        };
        let seq = self.seq + 1;
        commands
            .try_send(EngineCommand::Stop { seq })
            .map_err(|e| FourTrackError::EngineUnavailable {
                reason: match e {
                    TrySendError::Full(_) => "command queue full".to_string(),
                    TrySendError::Disconnected(_) => "renderer unreachable".to_string(),
                },
            })?;
        self.seq = seq;
        debug!(seq, "Transport stop sent");
        Ok(seq)
    }

    /// Sequence number of the last transport command sent
    pub fn transport_seq(&self) -> u64 {
        self.seq
    }

    // ========================================================================
    // Telemetry
    // ========================================================================

    /// Latest render-domain telemetry
    ///
    /// `settled` is true once the renderer has applied every transport
    /// command sent so far.
    pub fn telemetry(&self) -> TelemetrySnapshot {
        let mut snapshot = self.telemetry.snapshot();
        snapshot.settled = snapshot.transport_seq == self.seq;
        snapshot
    }

    pub fn telemetry_handle(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    /// Drain pending render-domain events
    pub fn poll_events(&mut self) -> Vec<EngineEvent> {
        match &self.events {
            Some(events) => events.try_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Release schedules the renderer is done with and retry deferred updates
    pub fn collect_garbage(&mut self) {
        let before = self.in_flight.len();
        self.in_flight.retain(|schedule| Arc::strong_count(schedule) > 1);
        let freed = before - self.in_flight.len();
        if freed > 0 {
            debug!(freed, "Released retired schedules");
        }

        for track in TrackIndex::ALL {
            let i = track.zero_based();
            if self.pending[i] {
                self.pending[i] = false;
                let fx = self.fx[i];
                let muted = self.muted[i];
                self.send_track(track, EngineCommand::SetTrackFx { track, fx });
                self.send_track(track, EngineCommand::SetTrackMuted { track, muted });
            }
        }
    }

    /// Schedules still referenced by the render domain
    pub fn schedules_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn diagnostics(&self, session: &Session) -> EngineDiagnostics {
        let mut issues = Vec::new();
        match self.lifecycle {
            EngineLifecycle::Suspended => issues.push(DiagnosticIssue::EngineSuspended),
            EngineLifecycle::Shutdown => issues.push(DiagnosticIssue::EngineShutdown),
            EngineLifecycle::Running => {
                if !self.telemetry.route_active() {
                    issues.push(DiagnosticIssue::InactiveOutputRoute);
                }
                for track in TrackIndex::ALL {
                    if self.disconnected[track.zero_based()] {
                        issues.push(DiagnosticIssue::DisconnectedBus(track));
                    }
                }
            }
        }
        if session.sample_rate != self.sample_rate {
            issues.push(DiagnosticIssue::SampleRateMismatch {
                engine: self.sample_rate,
                session: session.sample_rate,
            });
        }
        let blocks = self.telemetry.snapshot().nonfinite_blocks;
        if blocks > 0 {
            issues.push(DiagnosticIssue::NonFiniteOutput { blocks });
        }
        EngineDiagnostics {
            lifecycle: self.lifecycle,
            sample_rate: self.sample_rate,
            issues,
        }
    }
}

impl Drop for AudioEngine {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(error = %e, "Audio engine did not shut down cleanly");
        }
    }
}

/// One track's FX controls
pub struct TrackBusHandle<'a> {
    engine: &'a mut AudioEngine,
    track: TrackIndex,
}

impl TrackBusHandle<'_> {
    pub fn track(&self) -> TrackIndex {
        self.track
    }

    pub fn fx(&self) -> TrackFx {
        *self.engine.fx(self.track)
    }

    /// Replace the whole settings snapshot
    pub fn apply(&mut self, fx: TrackFx) -> &mut Self {
        self.engine.set_track_fx(self.track, fx);
        self
    }

    fn update(&mut self, edit: impl FnOnce(&mut TrackFx)) -> &mut Self {
        let mut fx = self.fx();
        edit(&mut fx);
        self.apply(fx)
    }

    pub fn set_volume_db(&mut self, db: f32) -> &mut Self {
        self.update(|fx| fx.set_volume_db(db))
    }

    pub fn set_pan(&mut self, pan: f32) -> &mut Self {
        self.update(|fx| fx.set_pan(pan))
    }

    pub fn set_reverb(&mut self, reverb: ReverbSettings) -> &mut Self {
        self.update(|fx| fx.set_reverb(reverb))
    }

    pub fn set_delay(&mut self, delay: DelaySettings) -> &mut Self {
        self.update(|fx| fx.set_delay(delay))
    }

    pub fn set_saturation(&mut self, saturation: SaturationSettings) -> &mut Self {
        self.update(|fx| fx.set_saturation(saturation))
    }

    pub fn set_muted(&mut self, muted: bool) -> &mut Self {
        self.engine.set_track_muted(self.track, muted);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn running_engine() -> (AudioEngine, ManualClock) {
        let mut engine = AudioEngine::new(EngineConfig {
            sample_rate: 1000,
            smoothing_ms: 0.0,
            ..EngineConfig::default()
        })
        .unwrap();
        let (driver, clock) = ManualDriver::new();
        engine.start(Box::new(driver)).unwrap();
        (engine, clock)
    }

    fn track(n: usize) -> TrackIndex {
        TrackIndex::new(n).unwrap()
    }

    /// Driver that accepts the renderer and immediately drops it
    struct LossyDriver;

    impl OutputDriver for LossyDriver {
        fn open(&mut self, _renderer: Renderer) -> Result<()> {
            Ok(())
        }
        fn close(&mut self) -> Result<()> {
            Ok(())
        }
        fn is_open(&self) -> bool {
            false
        }
        fn sample_rate(&self) -> Option<u32> {
            None
        }
        fn name(&self) -> &str {
            "lossy"
        }
    }

    #[test]
    fn test_lifecycle_transitions_are_idempotent() {
        let (mut engine, mut clock) = running_engine();
        assert!(engine.is_running());

        engine.suspend().unwrap();
        engine.suspend().unwrap();
        assert_eq!(engine.lifecycle(), EngineLifecycle::Suspended);
        assert_eq!(clock.pull(16), 0);

        engine.resume().unwrap();
        engine.resume().unwrap();
        assert_eq!(clock.pull(16), 16);

        engine.shutdown().unwrap();
        engine.shutdown().unwrap();
        let err = engine.resume().unwrap_err();
        assert_eq!(err.error_code(), "INVALID_TRANSITION");
    }

    #[test]
    fn test_resume_without_driver() {
        let mut engine = AudioEngine::new(EngineConfig::default()).unwrap();
        let err = engine.resume().unwrap_err();
        assert_eq!(err.error_code(), "ENGINE_UNAVAILABLE");
    }

    #[test]
    fn test_driver_rate_wins() {
        let mut engine = AudioEngine::new(EngineConfig::default()).unwrap();
        let (driver, _clock) = ManualDriver::with_sample_rate(44100);
        engine.start(Box::new(driver)).unwrap();
        assert_eq!(engine.sample_rate(), 44100);

        let session = Session::new("rates");
        let diagnostics = engine.diagnostics(&session);
        assert!(diagnostics.has(&DiagnosticIssue::SampleRateMismatch {
            engine: 44100,
            session: 48000,
        }));
    }

    #[test]
    fn test_transport_settles_after_render() {
        let (mut engine, mut clock) = running_engine();
        let seq = engine
            .start_transport(TransportState::Playing, 100, Arc::new(Schedule::default()), None, None)
            .unwrap();
        assert!(!engine.telemetry().settled);

        clock.pull(10);
        let snap = engine.telemetry();
        assert!(snap.settled);
        assert_eq!(snap.transport_seq, seq);
        assert_eq!(snap.playhead_frames, 110);
        assert_eq!(
            engine.poll_events(),
            vec![EngineEvent::Started { seq, position: 100 }]
        );
    }

    #[test]
    fn test_schedules_released_after_stop() {
        let (mut engine, mut clock) = running_engine();
        engine
            .start_transport(TransportState::Playing, 0, Arc::new(Schedule::default()), None, None)
            .unwrap();
        clock.pull(8);
        engine.collect_garbage();
        assert_eq!(engine.schedules_in_flight(), 1);

        engine.stop_transport().unwrap();
        clock.pull(8);
        engine.collect_garbage();
        assert_eq!(engine.schedules_in_flight(), 0);
    }

    #[test]
    fn test_fx_snapshot_survives_resume() {
        let (mut engine, _clock) = running_engine();
        engine.bus(track(2)).set_volume_db(-6.0).set_pan(0.5);
        engine.suspend().unwrap();
        engine.bus(track(2)).set_volume_db(-12.0);
        engine.resume().unwrap();

        let fx = engine.fx(track(2));
        assert_eq!(fx.volume_db, -12.0);
        assert_eq!(fx.pan, 0.5);
    }

    #[test]
    fn test_fx_values_are_clamped() {
        let (mut engine, _clock) = running_engine();
        engine.bus(track(1)).set_volume_db(40.0);
        assert_eq!(engine.fx(track(1)).volume_db, crate::state::fx::MAX_VOLUME_DB);
    }

    #[test]
    fn test_transport_refused_while_suspended() {
        let mut engine = AudioEngine::new(EngineConfig::default()).unwrap();
        let err = engine
            .start_transport(TransportState::Playing, 0, Arc::new(Schedule::default()), None, None)
            .unwrap_err();
        assert_eq!(err.error_code(), "ENGINE_UNAVAILABLE");
        assert!(engine.stop_transport().is_ok());
    }

    #[test]
    fn test_diagnostics_report_lost_route() {
        let mut engine = AudioEngine::new(EngineConfig::default()).unwrap();
        engine.start(Box::new(LossyDriver)).unwrap();
        engine.set_track_fx(track(3), TrackFx::default());

        let diagnostics = engine.diagnostics(&Session::new("lost"));
        assert!(diagnostics.has(&DiagnosticIssue::InactiveOutputRoute));
        assert!(diagnostics.has(&DiagnosticIssue::DisconnectedBus(track(3))));
        assert!(!diagnostics.has(&DiagnosticIssue::DisconnectedBus(track(1))));
    }

    #[test]
    fn test_suspended_diagnostics() {
        let engine = AudioEngine::new(EngineConfig::default()).unwrap();
        let diagnostics = engine.diagnostics(&Session::new("idle"));
        assert_eq!(diagnostics.issues, vec![DiagnosticIssue::EngineSuspended]);
    }
}
