//! Track and master buses
//!
//! Each track owns a bus: a pair of preallocated scratch channels the
//! renderer mixes scheduled regions into, followed by the track's effect
//! chain. The master bus sums the four track buses.

use crate::dsp::{SmoothedParam, TrackChain};
use crate::engine::buffer::peak_of;
use crate::state::{TrackFx, TrackIndex};

/// One track's summing point and effect chain
#[derive(Debug, Clone)]
pub struct TrackBus {
    index: TrackIndex,
    chain: TrackChain,
    left: Vec<f32>,
    right: Vec<f32>,
    muted: bool,
    /// 1.0 open, 0.0 muted; ramps with the chain's smoothing
    mute_gain: SmoothedParam,
    peak: f32,
}

impl TrackBus {
    pub fn new(index: TrackIndex, sample_rate: u32, max_block: usize, smoothing_frames: usize) -> Self {
        Self {
            index,
            chain: TrackChain::prepared(sample_rate, max_block, smoothing_frames),
            left: vec![0.0; max_block],
            right: vec![0.0; max_block],
            muted: false,
            mute_gain: {
                let mut gain = SmoothedParam::new(1.0);
                gain.set_ramp_frames(smoothing_frames);
                gain
            },
            peak: 0.0,
        }
    }

    pub fn index(&self) -> TrackIndex {
        self.index
    }

    pub fn apply_fx(&mut self, fx: &TrackFx) {
        self.chain.apply(fx);
    }

    /// Apply settings without ramping (fresh renderer, offline render)
    pub fn apply_fx_immediate(&mut self, fx: &TrackFx) {
        self.chain.apply_immediate(fx);
    }

    pub fn fx(&self) -> &TrackFx {
        self.chain.fx()
    }

    /// Fade the bus out or back in over the smoothing time
    pub fn set_muted(&mut self, muted: bool) {
        self.muted = muted;
        self.mute_gain.set_target(if muted { 0.0 } else { 1.0 });
    }

    /// Mute or unmute without fading (fresh renderer, offline render)
    pub fn set_muted_immediate(&mut self, muted: bool) {
        self.muted = muted;
        self.mute_gain.snap(if muted { 0.0 } else { 1.0 });
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Zero the first `frames` of scratch
    #[inline]
    pub(crate) fn clear(&mut self, frames: usize) {
        self.left[..frames].fill(0.0);
        self.right[..frames].fill(0.0);
    }

    /// Add one stereo frame of source audio at `offset`
    #[inline]
    pub(crate) fn accumulate(&mut self, offset: usize, left: f32, right: f32) {
        self.left[offset] += left;
        self.right[offset] += right;
    }

    /// Run the chain over the first `frames` of scratch and meter it
    pub(crate) fn process(&mut self, frames: usize) {
        let (left, right) = (&mut self.left[..frames], &mut self.right[..frames]);
        self.chain.process(left, right);

        if self.mute_gain.is_smoothing() {
            for (l, r) in left.iter_mut().zip(right.iter_mut()) {
                let gain = self.mute_gain.next_value();
                *l *= gain;
                *r *= gain;
            }
        } else if self.mute_gain.current() == 0.0 {
            left.fill(0.0);
            right.fill(0.0);
        }
        self.peak = peak_of(left).max(peak_of(right));
    }

    pub(crate) fn output(&self, frames: usize) -> (&[f32], &[f32]) {
        (&self.left[..frames], &self.right[..frames])
    }

    /// Clear the chain's internal state after a non-finite block
    pub(crate) fn flush(&mut self) {
        self.chain.reset();
        self.mute_gain.snap(self.mute_gain.target());
        self.peak = 0.0;
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }
}

/// Sum of all track buses
#[derive(Debug, Clone)]
pub struct MasterBus {
    left: Vec<f32>,
    right: Vec<f32>,
    peak: f32,
}

impl MasterBus {
    pub fn new(max_block: usize) -> Self {
        Self {
            left: vec![0.0; max_block],
            right: vec![0.0; max_block],
            peak: 0.0,
        }
    }

    /// Sum the first `frames` of every bus
    pub(crate) fn mix(&mut self, buses: &[TrackBus], frames: usize) {
        self.left[..frames].fill(0.0);
        self.right[..frames].fill(0.0);
        for bus in buses {
            let (l, r) = bus.output(frames);
            for (out, s) in self.left[..frames].iter_mut().zip(l) {
                *out += s;
            }
            for (out, s) in self.right[..frames].iter_mut().zip(r) {
                *out += s;
            }
        }
        self.peak = peak_of(&self.left[..frames]).max(peak_of(&self.right[..frames]));
    }

    /// True when every sample in the block is finite
    pub(crate) fn is_finite(&self, frames: usize) -> bool {
        self.left[..frames].iter().chain(&self.right[..frames]).all(|s| s.is_finite())
    }

    pub(crate) fn silence(&mut self, frames: usize) {
        self.left[..frames].fill(0.0);
        self.right[..frames].fill(0.0);
        self.peak = 0.0;
    }

    pub(crate) fn output(&self, frames: usize) -> (&[f32], &[f32]) {
        (&self.left[..frames], &self.right[..frames])
    }

    pub fn peak(&self) -> f32 {
        self.peak
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bus(n: usize) -> TrackBus {
        TrackBus::new(TrackIndex::new(n).unwrap(), 48000, 64, 0)
    }

    #[test]
    fn test_master_sums_buses() {
        let mut buses = vec![bus(1), bus(2)];
        buses[0].accumulate(0, 0.25, 0.25);
        buses[1].accumulate(0, 0.5, -0.25);
        for b in &mut buses {
            b.process(4);
        }
        let mut master = MasterBus::new(64);
        master.mix(&buses, 4);
        let (l, r) = master.output(4);
        assert_eq!(l[0], 0.75);
        assert_eq!(r[0], 0.0);
        assert_eq!(master.peak(), 0.75);
    }

    #[test]
    fn test_muted_bus_is_silent() {
        let mut b = bus(3);
        b.set_muted(true);
        b.accumulate(1, 1.0, 1.0);
        b.process(4);
        assert_eq!(b.peak(), 0.0);
    }

    #[test]
    fn test_mute_fades_without_a_step() {
        let mut b = TrackBus::new(TrackIndex::new(1).unwrap(), 48000, 256, 960);
        let mut previous = 0.5f32;
        let mut max_step = 0.0f32;
        for block in 0..8 {
            if block == 1 {
                b.set_muted(true);
            }
            if block == 6 {
                b.set_muted(false);
            }
            b.clear(256);
            for i in 0..256 {
                b.accumulate(i, 0.5, 0.5);
            }
            b.process(256);
            for &s in b.output(256).0 {
                max_step = max_step.max((s - previous).abs());
                previous = s;
            }
            if block == 5 {
                // 960 frames after muting the bus is silent
                assert_eq!(b.peak(), 0.0);
            }
        }
        assert!(max_step < 0.05, "step of {}", max_step);
        assert!(b.output(256).0[255] > 0.0);
    }

    #[test]
    fn test_immediate_mute_is_silent_at_once() {
        let mut b = TrackBus::new(TrackIndex::new(2).unwrap(), 48000, 64, 960);
        b.set_muted_immediate(true);
        b.accumulate(0, 1.0, 1.0);
        b.process(4);
        assert_eq!(b.peak(), 0.0);
        assert!(b.is_muted());
    }

    #[test]
    fn test_volume_applies_on_bus() {
        let mut b = bus(1);
        b.apply_fx_immediate(&TrackFx {
            volume_db: -60.0,
            ..TrackFx::default()
        });
        b.accumulate(0, 1.0, 1.0);
        b.process(1);
        assert_eq!(b.output(1).0[0], 0.0);
    }
}
