//! Render domain
//!
//! The `Renderer` is the audio graph that runs inside the output callback:
//! it drains control commands without blocking, mixes the scheduled regions
//! into the track buses sample-accurately, runs each bus through its chain,
//! sums into the master bus and advances the playhead by the frames it
//! rendered. Everything it touches is preallocated; schedules arrive as
//! `Arc`s whose last owner is always the control domain.
//!
//! The same type renders offline for bounces, driven directly instead of
//! through commands.

use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender, TrySendError};

use crate::config::EngineConfig;
use crate::engine::buffer::AudioBuffer;
use crate::engine::bus::{MasterBus, TrackBus};
use crate::engine::telemetry::Telemetry;
use crate::engine::transport::{advance_position, AdvanceOutcome, FrameLoop, TransportState};
use crate::state::{TrackFx, TrackIndex, TRACK_COUNT};

// ============================================================================
// Schedule
// ============================================================================

/// A region resolved to frames and decoded audio
#[derive(Debug, Clone)]
pub struct ScheduledRegion {
    pub track: TrackIndex,
    /// First timeline frame the region sounds on
    pub start_frame: u64,
    /// One past the last timeline frame
    pub end_frame: u64,
    /// Source frame heard at `start_frame`
    pub source_offset: u64,
    /// Decoded source at the render sample rate
    pub audio: Arc<AudioBuffer>,
}

impl ScheduledRegion {
    #[inline]
    fn overlaps(&self, start: u64, end: u64) -> bool {
        self.start_frame < end && start < self.end_frame
    }
}

/// Everything the renderer plays for one transport run
#[derive(Debug, Clone, Default)]
pub struct Schedule {
    regions: Vec<ScheduledRegion>,
}

impl Schedule {
    pub fn new(mut regions: Vec<ScheduledRegion>) -> Self {
        regions.sort_by_key(|r| r.start_frame);
        Self { regions }
    }

    pub fn regions(&self) -> &[ScheduledRegion] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Last frame any region sounds on
    pub fn end_frame(&self) -> u64 {
        self.regions.iter().map(|r| r.end_frame).max().unwrap_or(0)
    }
}

// ============================================================================
// Commands and events
// ============================================================================

/// Control -> render messages
#[derive(Debug, Clone)]
pub enum EngineCommand {
    /// Start the transport at `position` with a new schedule
    Start {
        seq: u64,
        state: TransportState,
        position: u64,
        schedule: Arc<Schedule>,
        looping: Option<FrameLoop>,
        end: Option<u64>,
    },
    /// Stop the transport and drop the schedule
    Stop { seq: u64 },
    SetTrackFx { track: TrackIndex, fx: TrackFx },
    SetTrackMuted { track: TrackIndex, muted: bool },
}

/// Render -> control notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineEvent {
    Started { seq: u64, position: u64 },
    Stopped { seq: u64, position: u64 },
    /// The playhead hit the end bound and the transport stopped itself
    ReachedEnd { position: u64 },
    /// The playhead wrapped from loop end to loop start
    Looped { count: u32 },
    /// A block produced NaN or infinity and was replaced with silence
    NonFiniteOutput,
}

// ============================================================================
// Renderer
// ============================================================================

pub struct Renderer {
    sample_rate: u32,
    max_block: usize,
    commands: Option<Receiver<EngineCommand>>,
    events: Option<Sender<EngineEvent>>,
    telemetry: Arc<Telemetry>,
    buses: Vec<TrackBus>,
    master: MasterBus,
    schedule: Option<Arc<Schedule>>,
    state: TransportState,
    position: u64,
    looping: Option<FrameLoop>,
    end: Option<u64>,
    seq: u64,
}

impl Renderer {
    /// Renderer fed by the engine's command channel
    pub fn new(
        config: &EngineConfig,
        sample_rate: u32,
        commands: Receiver<EngineCommand>,
        events: Sender<EngineEvent>,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        let mut renderer = Self::build(
            sample_rate,
            config.max_block_frames,
            config.smoothing_frames(sample_rate),
            telemetry,
        );
        renderer.commands = Some(commands);
        renderer.events = Some(events);
        renderer
    }

    /// Standalone renderer for offline work; driven through its methods
    pub fn offline(sample_rate: u32, max_block: usize, smoothing_frames: usize) -> Self {
        Self::build(sample_rate, max_block, smoothing_frames, Arc::new(Telemetry::new()))
    }

    fn build(sample_rate: u32, max_block: usize, smoothing_frames: usize, telemetry: Arc<Telemetry>) -> Self {
        let max_block = max_block.max(1);
        Self {
            sample_rate,
            max_block,
            commands: None,
            events: None,
            telemetry,
            buses: TrackIndex::ALL
                .iter()
                .map(|&index| TrackBus::new(index, sample_rate, max_block, smoothing_frames))
                .collect(),
            master: MasterBus::new(max_block),
            schedule: None,
            state: TransportState::Stopped,
            position: 0,
            looping: None,
            end: None,
            seq: 0,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn max_block(&self) -> usize {
        self.max_block
    }

    pub fn telemetry(&self) -> &Arc<Telemetry> {
        &self.telemetry
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Jump a track's chain to `fx` without ramping
    pub fn apply_fx_immediate(&mut self, track: TrackIndex, fx: &TrackFx) {
        self.buses[track.zero_based()].apply_fx_immediate(fx);
    }

    pub fn set_track_fx(&mut self, track: TrackIndex, fx: &TrackFx) {
        self.buses[track.zero_based()].apply_fx(fx);
    }

    pub fn set_track_muted(&mut self, track: TrackIndex, muted: bool) {
        self.buses[track.zero_based()].set_muted(muted);
    }

    /// Mute or unmute a track without fading
    pub fn set_track_muted_immediate(&mut self, track: TrackIndex, muted: bool) {
        self.buses[track.zero_based()].set_muted_immediate(muted);
    }

    /// Start the transport directly (offline use)
    pub fn start(
        &mut self,
        state: TransportState,
        position: u64,
        schedule: Arc<Schedule>,
        looping: Option<FrameLoop>,
        end: Option<u64>,
    ) {
        self.schedule = Some(schedule);
        self.state = state;
        self.position = position;
        self.looping = looping.filter(|r| r.end > r.start);
        self.end = end;
        self.telemetry.publish_transport(self.state, self.position);
    }

    pub fn stop(&mut self) {
        self.state = TransportState::Stopped;
        self.schedule = None;
        self.telemetry.publish_transport(self.state, self.position);
    }

    fn emit(&self, event: EngineEvent) {
        if let Some(events) = &self.events {
            if let Err(TrySendError::Full(_)) = events.try_send(event) {
                self.telemetry.add_dropped_event();
            }
        }
    }

    fn drain_commands(&mut self) {
        let Some(commands) = self.commands.take() else {
            return;
        };
        while let Ok(command) = commands.try_recv() {
            match command {
                EngineCommand::Start {
                    seq,
                    state,
                    position,
                    schedule,
                    looping,
                    end,
                } => {
                    self.start(state, position, schedule, looping, end);
                    self.seq = seq;
                    self.telemetry.acknowledge(seq);
                    self.emit(EngineEvent::Started { seq, position });
                }
                EngineCommand::Stop { seq } => {
                    self.stop();
                    self.seq = seq;
                    self.telemetry.acknowledge(seq);
                    self.emit(EngineEvent::Stopped {
                        seq,
                        position: self.position,
                    });
                }
                EngineCommand::SetTrackFx { track, fx } => self.set_track_fx(track, &fx),
                EngineCommand::SetTrackMuted { track, muted } => self.set_track_muted(track, muted),
            }
        }
        self.commands = Some(commands);
    }

    /// Render `left.len()` frames of stereo output
    ///
    /// Blocks longer than the preallocated size are split internally.
    pub fn render(&mut self, left: &mut [f32], right: &mut [f32]) {
        self.drain_commands();
        let frames = left.len().min(right.len());
        let mut done = 0;
        while done < frames {
            let len = (frames - done).min(self.max_block);
            self.render_block(len);
            let (l, r) = self.master.output(len);
            left[done..done + len].copy_from_slice(l);
            right[done..done + len].copy_from_slice(r);
            done += len;
        }
    }

    /// Render into an interleaved buffer of `channels` channels
    ///
    /// Channels beyond two receive silence; mono receives the left channel.
    pub fn render_interleaved(&mut self, output: &mut [f32], channels: usize) {
        self.drain_commands();
        let channels = channels.max(1);
        let frames = output.len() / channels;
        let mut done = 0;
        while done < frames {
            let len = (frames - done).min(self.max_block);
            self.render_block(len);
            let (l, r) = self.master.output(len);
            let block = &mut output[done * channels..(done + len) * channels];
            for (i, frame) in block.chunks_exact_mut(channels).enumerate() {
                frame[0] = l[i];
                if channels > 1 {
                    frame[1] = r[i];
                }
                for extra in frame.iter_mut().skip(2) {
                    *extra = 0.0;
                }
            }
            done += len;
        }
    }

    fn render_block(&mut self, len: usize) {
        for bus in &mut self.buses {
            bus.clear(len);
        }

        if self.state.is_running() {
            self.fill_running(len);
        }

        for bus in &mut self.buses {
            bus.process(len);
        }
        self.master.mix(&self.buses, len);

        if !self.master.is_finite(len) {
            self.master.silence(len);
            for bus in &mut self.buses {
                bus.flush();
            }
            self.telemetry.add_nonfinite_block();
            self.emit(EngineEvent::NonFiniteOutput);
        }

        let mut peaks = [0.0; TRACK_COUNT];
        for (peak, bus) in peaks.iter_mut().zip(&self.buses) {
            *peak = bus.peak();
        }
        self.telemetry.publish_levels(self.master.peak(), &peaks);
        self.telemetry.publish_transport(self.state, self.position);
        self.telemetry.add_frames(len as u64);
    }

    /// Mix scheduled audio for a running transport, honoring loop and end
    fn fill_running(&mut self, len: usize) {
        let looping = if self.state == TransportState::Playing {
            self.looping
        } else {
            None
        };

        let mut written = 0usize;
        while written < len {
            let mut segment = (len - written) as u64;
            if let Some(range) = looping {
                if self.position < range.end {
                    segment = segment.min(range.end - self.position);
                }
            }
            if let Some(end) = self.end {
                segment = segment.min(end.saturating_sub(self.position));
            }

            if segment > 0 {
                self.mix_segment(self.position, written, segment as usize);
            }

            let (position, outcome) = advance_position(self.position, segment, looping, self.end);
            self.position = position;
            written += segment as usize;

            match outcome {
                AdvanceOutcome::Continued => {}
                AdvanceOutcome::Wrapped { count } => {
                    for _ in 0..count {
                        self.telemetry.add_loop();
                    }
                    self.emit(EngineEvent::Looped { count });
                }
                AdvanceOutcome::ReachedEnd => {
                    self.state = TransportState::Stopped;
                    self.schedule = None;
                    self.emit(EngineEvent::ReachedEnd {
                        position: self.position,
                    });
                    return;
                }
            }
        }
    }

    /// Add every region sounding in `[from, from + frames)` to its bus
    fn mix_segment(&mut self, from: u64, offset: usize, frames: usize) {
        let Some(schedule) = &self.schedule else {
            return;
        };
        let to = from + frames as u64;
        for region in schedule.regions() {
            if region.start_frame >= to {
                break;
            }
            if !region.overlaps(from, to) {
                continue;
            }
            let bus = &mut self.buses[region.track.zero_based()];
            let first = region.start_frame.max(from);
            let last = region.end_frame.min(to);
            for t in first..last {
                let source = (region.source_offset + (t - region.start_frame)) as usize;
                if source >= region.audio.len() {
                    break;
                }
                let (l, r) = region.audio.stereo_frame(source);
                bus.accumulate(offset + (t - from) as usize, l, r);
            }
        }
    }
}
