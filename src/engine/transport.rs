//! Transport State Machine
//!
//! The `Timeline` is the control domain's view of the transport: state,
//! playhead and loop range. Positions are kept in whole frames so loop
//! wrapping and end-of-timeline checks never drift; seconds are derived on
//! read.
//!
//! While the engine runs, the render domain owns the real playhead and the
//! timeline follows it through `sync`.

use std::fmt;

use tracing::debug;

use crate::engine::buffer::{frames_to_secs, secs_to_frames, INTERNAL_SAMPLE_RATE};
use crate::engine::telemetry::TelemetrySnapshot;

/// Transport states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
    Recording,
}

impl TransportState {
    pub fn is_running(self) -> bool {
        !matches!(self, TransportState::Stopped)
    }

    pub(crate) fn to_u8(self) -> u8 {
        match self {
            TransportState::Stopped => 0,
            TransportState::Playing => 1,
            TransportState::Recording => 2,
        }
    }

    pub(crate) fn from_u8(value: u8) -> Self {
        match value {
            1 => TransportState::Playing,
            2 => TransportState::Recording,
            _ => TransportState::Stopped,
        }
    }
}

impl fmt::Display for TransportState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportState::Stopped => write!(f, "Stopped"),
            TransportState::Playing => write!(f, "Playing"),
            TransportState::Recording => write!(f, "Recording"),
        }
    }
}

/// Loop bounds in seconds, `start < end`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopRange {
    pub start: f64,
    pub end: f64,
}

impl LoopRange {
    pub fn new(start: f64, end: f64) -> Option<Self> {
        if start.is_finite() && end.is_finite() && start >= 0.0 && start < end {
            Some(Self { start, end })
        } else {
            None
        }
    }

    pub fn contains(&self, time: f64) -> bool {
        time >= self.start && time < self.end
    }

    pub fn duration(&self) -> f64 {
        self.end - self.start
    }
}

/// Loop bounds in frames, as the render domain sees them
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLoop {
    pub start: u64,
    pub end: u64,
}

/// Result of moving the playhead forward
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// Playhead moved without hitting a boundary
    Continued,
    /// Playhead crossed the loop end `count` times and wrapped
    Wrapped { count: u32 },
    /// Playhead hit the end bound; the transport is now stopped
    ReachedEnd,
}

/// Frame-accurate loop/end arithmetic shared with the renderer
///
/// Returns the new position and what happened on the way.
pub fn advance_position(
    position: u64,
    frames: u64,
    looping: Option<FrameLoop>,
    end: Option<u64>,
) -> (u64, AdvanceOutcome) {
    let target = position.saturating_add(frames);

    if let Some(range) = looping.filter(|r| r.end > r.start) {
        if position < range.end && target >= range.end {
            let len = range.end - range.start;
            let over = target - range.end;
            let count = 1 + over / len;
            return (
                range.start + over % len,
                AdvanceOutcome::Wrapped {
                    count: count.min(u32::MAX as u64) as u32,
                },
            );
        }
    }

    match end {
        Some(end) if target >= end => (end, AdvanceOutcome::ReachedEnd),
        _ => (target, AdvanceOutcome::Continued),
    }
}

/// Control-domain transport: state, playhead, loop
#[derive(Debug, Clone)]
pub struct Timeline {
    state: TransportState,
    playhead_frames: u64,
    sample_rate: u32,
    loop_enabled: bool,
    loop_range: Option<LoopRange>,
    end_frame: Option<u64>,
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new(INTERNAL_SAMPLE_RATE)
    }
}

impl Timeline {
    /// Create a stopped timeline at 0
    ///
    /// # Example
    /// ```
    /// use fourtrack::engine::Timeline;
    /// let timeline = Timeline::new(48000);
    /// assert!(timeline.is_stopped());
    /// assert_eq!(timeline.playhead(), 0.0);
    /// ```
    pub fn new(sample_rate: u32) -> Self {
        Self {
            state: TransportState::Stopped,
            playhead_frames: 0,
            sample_rate: sample_rate.max(1),
            loop_enabled: false,
            loop_range: None,
            end_frame: None,
        }
    }

    // ========================================================================
    // Transport Controls
    // ========================================================================

    /// Stopped -> Playing
    ///
    /// In loop mode a playhead outside the loop range is moved to the loop
    /// start first.
    pub fn play(&mut self) -> bool {
        if self.state != TransportState::Stopped {
            debug!(state = %self.state, "Rejected play");
            return false;
        }
        if let Some(range) = self.active_loop() {
            if !range.contains(self.playhead()) {
                self.playhead_frames = secs_to_frames(range.start, self.sample_rate);
            }
        }
        self.state = TransportState::Playing;
        true
    }

    /// Stopped -> Recording
    pub fn record(&mut self) -> bool {
        if self.state != TransportState::Stopped {
            debug!(state = %self.state, "Rejected record");
            return false;
        }
        self.state = TransportState::Recording;
        true
    }

    /// Stop playback or recording
    ///
    /// Idempotent; returns whether the transport was running.
    pub fn stop(&mut self, reset_playhead: bool) -> bool {
        let was_running = self.state.is_running();
        self.state = TransportState::Stopped;
        self.end_frame = None;
        if reset_playhead {
            self.playhead_frames = 0;
        }
        was_running
    }

    /// Move the playhead; only while stopped
    pub fn seek(&mut self, time: f64) -> bool {
        if self.state != TransportState::Stopped || time.is_nan() {
            debug!(state = %self.state, time, "Rejected seek");
            return false;
        }
        self.playhead_frames = secs_to_frames(time.max(0.0), self.sample_rate);
        true
    }

    /// Configure looping
    ///
    /// Rejects `start >= end` and negative bounds, leaving the previous
    /// loop settings in place.
    pub fn set_loop(&mut self, enabled: bool, start: f64, end: f64) -> bool {
        match LoopRange::new(start, end) {
            Some(range) => {
                self.loop_range = Some(range);
                self.loop_enabled = enabled;
                true
            }
            None => {
                debug!(start, end, "Rejected loop range");
                false
            }
        }
    }

    pub fn disable_loop(&mut self) {
        self.loop_enabled = false;
    }

    /// Bound for `advance`: reaching it stops the transport
    pub fn set_end(&mut self, end: Option<f64>) {
        self.end_frame = end.map(|t| secs_to_frames(t, self.sample_rate));
    }

    /// Move the playhead forward by `frames` of rendered output
    ///
    /// Only running transports move. Looping applies to playback; recording
    /// runs straight through to the end bound.
    pub fn advance(&mut self, frames: u64) -> AdvanceOutcome {
        if !self.state.is_running() {
            return AdvanceOutcome::Continued;
        }
        let looping = if self.state == TransportState::Playing {
            self.frame_loop()
        } else {
            None
        };
        let (position, outcome) =
            advance_position(self.playhead_frames, frames, looping, self.end_frame);
        self.playhead_frames = position;
        if outcome == AdvanceOutcome::ReachedEnd {
            self.state = TransportState::Stopped;
            self.end_frame = None;
        }
        outcome
    }

    /// Follow the render domain's playhead
    ///
    /// Snapshots taken before the engine applied the latest transport
    /// command are ignored.
    pub fn sync(&mut self, snapshot: &TelemetrySnapshot) {
        if !snapshot.settled || !self.state.is_running() {
            return;
        }
        self.playhead_frames = snapshot.playhead_frames;
        if snapshot.state == TransportState::Stopped {
            debug!(playhead = self.playhead(), "Engine reached the end of the timeline");
            self.state = TransportState::Stopped;
            self.end_frame = None;
        }
    }

    /// Back to a fresh state for a newly loaded session
    pub fn reset_for_session(&mut self) {
        self.state = TransportState::Stopped;
        self.playhead_frames = 0;
        self.loop_enabled = false;
        self.loop_range = None;
        self.end_frame = None;
    }

    // ========================================================================
    // State Queries
    // ========================================================================

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn is_playing(&self) -> bool {
        self.state == TransportState::Playing
    }

    pub fn is_recording(&self) -> bool {
        self.state == TransportState::Recording
    }

    pub fn is_stopped(&self) -> bool {
        self.state == TransportState::Stopped
    }

    /// Playhead in seconds
    pub fn playhead(&self) -> f64 {
        frames_to_secs(self.playhead_frames, self.sample_rate)
    }

    pub fn playhead_frames(&self) -> u64 {
        self.playhead_frames
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Change the frame rate, keeping the playhead at the same time
    pub fn set_sample_rate(&mut self, sample_rate: u32) {
        let time = self.playhead();
        self.sample_rate = sample_rate.max(1);
        self.playhead_frames = secs_to_frames(time, self.sample_rate);
    }

    pub fn loop_enabled(&self) -> bool {
        self.loop_enabled
    }

    pub fn loop_range(&self) -> Option<LoopRange> {
        self.loop_range
    }

    /// The loop range, when looping is on
    pub fn active_loop(&self) -> Option<LoopRange> {
        self.loop_range.filter(|_| self.loop_enabled)
    }

    /// The active loop in frames
    pub fn frame_loop(&self) -> Option<FrameLoop> {
        self.active_loop().map(|range| FrameLoop {
            start: secs_to_frames(range.start, self.sample_rate),
            end: secs_to_frames(range.end, self.sample_rate),
        })
    }
}

// ============================================================================
// Unit Tests
// ============================================================================
