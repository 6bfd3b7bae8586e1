//! Reverb Effect
//!
//! Freeverb: eight parallel damped comb filters per channel feeding four
//! series allpass filters, with a small stereo spread between the channels.
//! Two room models map onto the comb feedback and damping.
//!
//! The tank is always fed, even at 0 % wet, so turning the reverb up during
//! playback fades in a tail that is already there instead of starting cold.

use serde_json::{json, Value};

use crate::dsp::effect::{crossfade, Effect};
use crate::dsp::smoothing::SmoothedParam;
use crate::impl_effect_common;
use crate::state::fx::RoomSize;

// ============================================================================
// Freeverb Constants
// ============================================================================

/// Sample rate the tuning constants were designed for
const REFERENCE_SAMPLE_RATE: f64 = 44100.0;

/// Comb filter delay lengths at the reference rate
const COMB_DELAYS: [usize; 8] = [1116, 1188, 1277, 1356, 1422, 1491, 1557, 1617];

/// Allpass filter delay lengths at the reference rate
const ALLPASS_DELAYS: [usize; 4] = [556, 441, 341, 225];

/// Extra delay for the right channel
const STEREO_SPREAD: usize = 23;

const ALLPASS_GAIN: f32 = 0.5;
const ROOM_SCALE: f32 = 0.28;
const ROOM_OFFSET: f32 = 0.7;
const DAMP_SCALE: f32 = 0.4;

/// Input attenuation into the comb bank
const FIXED_GAIN: f32 = 0.015;

/// Output make-up for the wet signal
const WET_SCALE: f32 = 3.0;

/// Room size and damping (both 0-1) for a room model
fn room_parameters(room: RoomSize) -> (f32, f32) {
    match room {
        RoomSize::Small => (0.5, 0.5),
        RoomSize::Large => (0.85, 0.3),
    }
}

// ============================================================================
// Filter Components
// ============================================================================

#[derive(Debug, Clone)]
struct CombFilter {
    buffer: Vec<f32>,
    pos: usize,
    filter_state: f32,
}

impl CombFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            pos: 0,
            filter_state: 0.0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let output = self.buffer[self.pos];
        self.filter_state = output * (1.0 - damp) + self.filter_state * damp;
        self.buffer[self.pos] = input + self.filter_state * feedback;
        self.pos += 1;
        if self.pos == self.buffer.len() {
            self.pos = 0;
        }
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.filter_state = 0.0;
        self.pos = 0;
    }
}

#[derive(Debug, Clone)]
struct AllpassFilter {
    buffer: Vec<f32>,
    pos: usize,
}

impl AllpassFilter {
    fn new(size: usize) -> Self {
        Self {
            buffer: vec![0.0; size.max(1)],
            pos: 0,
        }
    }

    #[inline]
    fn process(&mut self, input: f32) -> f32 {
        let delayed = self.buffer[self.pos];
        let output = delayed - input;
        self.buffer[self.pos] = input + delayed * ALLPASS_GAIN;
        self.pos += 1;
        if self.pos == self.buffer.len() {
            self.pos = 0;
        }
        output
    }

    fn clear(&mut self) {
        self.buffer.fill(0.0);
        self.pos = 0;
    }
}

#[derive(Debug, Clone)]
struct Tank {
    combs: [CombFilter; 8],
    allpasses: [AllpassFilter; 4],
}

impl Tank {
    fn new(scale: f64, spread: usize) -> Self {
        let scaled = |len: usize| (((len + spread) as f64 * scale) as usize).max(1);
        Self {
            combs: std::array::from_fn(|i| CombFilter::new(scaled(COMB_DELAYS[i]))),
            allpasses: std::array::from_fn(|i| AllpassFilter::new(scaled(ALLPASS_DELAYS[i]))),
        }
    }

    #[inline]
    fn process(&mut self, input: f32, feedback: f32, damp: f32) -> f32 {
        let mut out = 0.0;
        for comb in &mut self.combs {
            out += comb.process(input, feedback, damp);
        }
        for allpass in &mut self.allpasses {
            out = allpass.process(out);
        }
        out
    }

    fn clear(&mut self) {
        self.combs.iter_mut().for_each(CombFilter::clear);
        self.allpasses.iter_mut().for_each(AllpassFilter::clear);
    }
}

// ============================================================================
// Main Reverb Effect
// ============================================================================

#[derive(Debug, Clone)]
pub struct Reverb {
    wet_percent: f32,
    room: RoomSize,
    mix: SmoothedParam,
    feedback: SmoothedParam,
    damp: SmoothedParam,
    left: Tank,
    right: Tank,
}

impl Reverb {
    pub fn new() -> Self {
        let (room_size, damping) = room_parameters(RoomSize::Small);
        Self {
            wet_percent: 0.0,
            room: RoomSize::Small,
            mix: SmoothedParam::new(0.0),
            feedback: SmoothedParam::new(room_size * ROOM_SCALE + ROOM_OFFSET),
            damp: SmoothedParam::new(damping * DAMP_SCALE),
            left: Tank::new(1.0, 0),
            right: Tank::new(1.0, STEREO_SPREAD),
        }
    }

    /// Set the wet/dry mix in percent (0-100)
    pub fn set_mix_percent(&mut self, percent: f32) {
        self.wet_percent = percent.clamp(0.0, 100.0);
        self.mix.set_target(self.wet_percent / 100.0);
    }

    pub fn set_room(&mut self, room: RoomSize) {
        self.room = room;
        let (room_size, damping) = room_parameters(room);
        self.feedback.set_target(room_size * ROOM_SCALE + ROOM_OFFSET);
        self.damp.set_target(damping * DAMP_SCALE);
    }

    pub fn mix_percent(&self) -> f32 {
        self.wet_percent
    }

    pub fn room(&self) -> RoomSize {
        self.room
    }
}

impl Default for Reverb {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Reverb {
    impl_effect_common!("reverb", "Reverb");

    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let mix = self.mix.next_value();
            let feedback = self.feedback.next_value();
            let damp = self.damp.next_value();

            let input = (*l + *r) * FIXED_GAIN;
            let wet_l = self.left.process(input, feedback, damp) * WET_SCALE;
            let wet_r = self.right.process(input, feedback, damp) * WET_SCALE;

            *l = crossfade(*l, wet_l, mix);
            *r = crossfade(*r, wet_r, mix);
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        let scale = sample_rate as f64 / REFERENCE_SAMPLE_RATE;
        self.left = Tank::new(scale, 0);
        self.right = Tank::new(scale, STEREO_SPREAD);
    }

    fn reset(&mut self) {
        self.left.clear();
        self.right.clear();
        self.mix.snap(self.mix.target());
        self.feedback.snap(self.feedback.target());
        self.damp.snap(self.damp.target());
    }

    fn set_smoothing(&mut self, frames: usize) {
        self.mix.set_ramp_frames(frames);
        self.feedback.set_ramp_frames(frames);
        self.damp.set_ramp_frames(frames);
    }

    fn get_params(&self) -> Value {
        json!({
            "wet_mix": self.wet_percent,
            "room": format!("{:?}", self.room),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse_response(room: RoomSize, frames: usize) -> Vec<f32> {
        let mut reverb = Reverb::new();
        reverb.prepare(48000, frames);
        reverb.set_room(room);
        reverb.set_mix_percent(100.0);
        let mut left = vec![0.0; frames];
        let mut right = vec![0.0; frames];
        left[0] = 1.0;
        right[0] = 1.0;
        reverb.process(&mut left, &mut right);
        left
    }

    #[test]
    fn test_dry_passthrough_at_zero_wet() {
        let mut reverb = Reverb::new();
        reverb.prepare(48000, 512);
        let mut left: Vec<f32> = (0..512).map(|i| (i as f32 * 0.01).sin()).collect();
        let mut right = left.clone();
        let expected = left.clone();
        reverb.process(&mut left, &mut right);
        assert_eq!(left, expected);
    }

    #[test]
    fn test_tail_exists() {
        let ir = impulse_response(RoomSize::Small, 48000);
        let late_energy: f32 = ir[24000..].iter().map(|s| s * s).sum();
        assert!(late_energy > 0.0);
        assert!(ir.iter().all(|s| s.is_finite()));
    }

    #[test]
    fn test_large_room_rings_longer() {
        let small = impulse_response(RoomSize::Small, 96000);
        let large = impulse_response(RoomSize::Large, 96000);
        let tail = |ir: &[f32]| ir[72000..].iter().map(|s| s * s).sum::<f32>();
        assert!(tail(&large) > tail(&small));
    }

    #[test]
    fn test_reset_clears_tail() {
        let mut reverb = Reverb::new();
        reverb.prepare(48000, 4096);
        reverb.set_mix_percent(100.0);
        let mut left = vec![1.0; 4096];
        let mut right = vec![1.0; 4096];
        reverb.process(&mut left, &mut right);

        reverb.reset();
        let mut left = vec![0.0; 4096];
        let mut right = vec![0.0; 4096];
        reverb.process(&mut left, &mut right);
        assert!(left.iter().all(|&s| s == 0.0));
    }
}
