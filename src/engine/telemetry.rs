//! Render-to-control telemetry
//!
//! The render domain publishes its state through plain atomics: the latest
//! value wins and nothing ever blocks. Levels are stored as `f32` bit
//! patterns in `AtomicU32`. The control domain reads a coherent-enough
//! `TelemetrySnapshot` whenever it polls.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, Ordering};

use crate::engine::transport::TransportState;
use crate::state::TRACK_COUNT;

#[inline]
fn store_f32(cell: &AtomicU32, value: f32) {
    cell.store(value.to_bits(), Ordering::Relaxed);
}

#[inline]
fn load_f32(cell: &AtomicU32) -> f32 {
    f32::from_bits(cell.load(Ordering::Relaxed))
}

/// Shared atomics written by the renderer
#[derive(Debug, Default)]
pub struct Telemetry {
    playhead_frames: AtomicU64,
    state: AtomicU8,
    /// Sequence number of the last transport command the renderer applied
    transport_seq: AtomicU64,
    master_peak: AtomicU32,
    track_peaks: [AtomicU32; TRACK_COUNT],
    loop_count: AtomicU64,
    frames_rendered: AtomicU64,
    route_active: AtomicBool,
    dropped_events: AtomicU64,
    nonfinite_blocks: AtomicU64,
}

impl Telemetry {
    pub fn new() -> Self {
        Self::default()
    }

    // Render side

    pub(crate) fn publish_transport(&self, state: TransportState, playhead_frames: u64) {
        self.playhead_frames.store(playhead_frames, Ordering::Release);
        self.state.store(state.to_u8(), Ordering::Release);
    }

    /// Mark transport command `seq` as applied
    ///
    /// Must follow the `publish_transport` of the command, so a reader that
    /// sees `seq` also sees that transport.
    pub(crate) fn acknowledge(&self, seq: u64) {
        self.transport_seq.store(seq, Ordering::Release);
    }

    pub(crate) fn publish_levels(&self, master: f32, tracks: &[f32; TRACK_COUNT]) {
        store_f32(&self.master_peak, master);
        for (cell, &peak) in self.track_peaks.iter().zip(tracks.iter()) {
            store_f32(cell, peak);
        }
    }

    pub(crate) fn add_loop(&self) {
        self.loop_count.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_frames(&self, frames: u64) {
        self.frames_rendered.fetch_add(frames, Ordering::Relaxed);
    }

    pub(crate) fn add_dropped_event(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn add_nonfinite_block(&self) {
        self.nonfinite_blocks.fetch_add(1, Ordering::Relaxed);
    }

    /// Set by drivers while an output route is open
    pub fn set_route_active(&self, active: bool) {
        self.route_active.store(active, Ordering::Release);
    }

    // Control side

    pub fn route_active(&self) -> bool {
        self.route_active.load(Ordering::Acquire)
    }

    pub fn transport_seq(&self) -> u64 {
        self.transport_seq.load(Ordering::Acquire)
    }

    /// Read every counter
    ///
    /// `settled` is left false; the engine fills it in by comparing the
    /// acknowledged sequence with the last command it sent. The sequence is
    /// read first so the transport fields are never older than it.
    pub fn snapshot(&self) -> TelemetrySnapshot {
        let transport_seq = self.transport_seq.load(Ordering::Acquire);
        let state = TransportState::from_u8(self.state.load(Ordering::Acquire));
        let playhead_frames = self.playhead_frames.load(Ordering::Acquire);
        let mut track_peaks = [0.0; TRACK_COUNT];
        for (peak, cell) in track_peaks.iter_mut().zip(self.track_peaks.iter()) {
            *peak = load_f32(cell);
        }
        TelemetrySnapshot {
            playhead_frames,
            state,
            transport_seq,
            settled: false,
            master_peak: load_f32(&self.master_peak),
            track_peaks,
            loop_count: self.loop_count.load(Ordering::Relaxed),
            frames_rendered: self.frames_rendered.load(Ordering::Relaxed),
            route_active: self.route_active(),
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            nonfinite_blocks: self.nonfinite_blocks.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of the render domain's telemetry
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TelemetrySnapshot {
    pub playhead_frames: u64,
    pub state: TransportState,
    pub transport_seq: u64,
    /// The renderer has applied the most recent transport command
    pub settled: bool,
    pub master_peak: f32,
    pub track_peaks: [f32; TRACK_COUNT],
    pub loop_count: u64,
    pub frames_rendered: u64,
    pub route_active: bool,
    pub dropped_events: u64,
    pub nonfinite_blocks: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_published_values() {
        let telemetry = Telemetry::new();
        telemetry.publish_transport(TransportState::Playing, 4800);
        telemetry.publish_levels(0.5, &[0.1, 0.2, 0.3, 0.4]);
        telemetry.acknowledge(7);
        telemetry.add_loop();
        telemetry.add_frames(512);
        telemetry.set_route_active(true);

        let snap = telemetry.snapshot();
        assert_eq!(snap.state, TransportState::Playing);
        assert_eq!(snap.playhead_frames, 4800);
        assert_eq!(snap.master_peak, 0.5);
        assert_eq!(snap.track_peaks[3], 0.4);
        assert_eq!(snap.transport_seq, 7);
        assert_eq!(snap.loop_count, 1);
        assert_eq!(snap.frames_rendered, 512);
        assert!(snap.route_active);
        assert!(!snap.settled);
    }

    #[test]
    fn test_snapshot_never_pairs_new_seq_with_old_transport() {
        use std::sync::atomic::AtomicBool;

        const RUNS: u64 = 200_000;
        let telemetry = Telemetry::new();
        let done = AtomicBool::new(false);

        std::thread::scope(|scope| {
            scope.spawn(|| {
                // Each command publishes its transport, then acknowledges
                for seq in 1..=RUNS {
                    let state = if seq % 2 == 0 {
                        TransportState::Stopped
                    } else {
                        TransportState::Playing
                    };
                    telemetry.publish_transport(state, seq);
                    telemetry.acknowledge(seq);
                }
                done.store(true, Ordering::Release);
            });

            while !done.load(Ordering::Acquire) {
                let snap = telemetry.snapshot();
                assert!(
                    snap.playhead_frames >= snap.transport_seq,
                    "seq {} read with the transport of command {}",
                    snap.transport_seq,
                    snap.playhead_frames
                );
            }
        });

        let snap = telemetry.snapshot();
        assert_eq!(snap.transport_seq, RUNS);
        assert_eq!(snap.state, TransportState::Stopped);
    }

    #[test]
    fn test_default_is_silent_and_stopped() {
        let snap = Telemetry::new().snapshot();
        assert_eq!(snap.state, TransportState::Stopped);
        assert_eq!(snap.master_peak, 0.0);
    }
}
