//! Delay Effect
//!
//! Stereo feedback delay. The delay line is sized once in `prepare` for the
//! longest allowed time, so time changes never reallocate; the read head
//! glides to a new time with linear interpolation between taps. A one-pole
//! low-pass in the feedback path darkens each repeat.

use std::f32::consts::PI;

use serde_json::{json, Value};

use crate::dsp::effect::{crossfade, Effect};
use crate::dsp::smoothing::SmoothedParam;
use crate::engine::buffer::INTERNAL_SAMPLE_RATE;
use crate::impl_effect_common;
use crate::state::fx::{MAX_DELAY_SECS, MAX_FEEDBACK_PERCENT, MIN_DELAY_SECS};

// ============================================================================
// Constants
// ============================================================================

/// Cutoff of the feedback low-pass
const FEEDBACK_FILTER_HZ: f32 = 8000.0;

/// Extra headroom in the delay line, in frames
const LINE_MARGIN: usize = 16;

// ============================================================================
// Delay Effect
// ============================================================================

#[derive(Debug, Clone)]
pub struct Delay {
    time_secs: f32,
    feedback_percent: f32,
    wet_percent: f32,
    sample_rate: f32,

    mix: SmoothedParam,
    feedback: SmoothedParam,
    /// Delay time in frames
    delay_frames: SmoothedParam,

    line_l: Vec<f32>,
    line_r: Vec<f32>,
    write_pos: usize,
    filter_coeff: f32,
    filter_state_l: f32,
    filter_state_r: f32,
}

impl Delay {
    pub fn new() -> Self {
        let mut delay = Self {
            time_secs: 0.25,
            feedback_percent: 30.0,
            wet_percent: 0.0,
            sample_rate: INTERNAL_SAMPLE_RATE as f32,
            mix: SmoothedParam::new(0.0),
            feedback: SmoothedParam::new(0.3),
            delay_frames: SmoothedParam::new(0.0),
            line_l: Vec::new(),
            line_r: Vec::new(),
            write_pos: 0,
            filter_coeff: 0.0,
            filter_state_l: 0.0,
            filter_state_r: 0.0,
        };
        delay.delay_frames.snap(delay.time_secs * delay.sample_rate);
        delay
    }

    /// Set the delay time in seconds (0.01 to 2.0)
    pub fn set_time_secs(&mut self, secs: f32) {
        self.time_secs = secs.clamp(MIN_DELAY_SECS, MAX_DELAY_SECS);
        self.delay_frames.set_target(self.time_secs * self.sample_rate);
    }

    /// Set the feedback in percent (0 to 95)
    pub fn set_feedback_percent(&mut self, percent: f32) {
        self.feedback_percent = percent.clamp(0.0, MAX_FEEDBACK_PERCENT);
        self.feedback.set_target(self.feedback_percent / 100.0);
    }

    /// Set the wet/dry mix in percent (0-100)
    pub fn set_mix_percent(&mut self, percent: f32) {
        self.wet_percent = percent.clamp(0.0, 100.0);
        self.mix.set_target(self.wet_percent / 100.0);
    }

    pub fn time_secs(&self) -> f32 {
        self.time_secs
    }

    pub fn feedback_percent(&self) -> f32 {
        self.feedback_percent
    }

    pub fn mix_percent(&self) -> f32 {
        self.wet_percent
    }

    /// Linear-interpolated read `delay` frames behind the write head
    #[inline]
    fn read(line: &[f32], write_pos: usize, delay: f32) -> f32 {
        let len = line.len();
        let whole = delay.floor();
        let frac = delay - whole;
        let whole = whole as usize;
        let a = line[(write_pos + len - whole % len) % len];
        let b = line[(write_pos + len - (whole + 1) % len) % len];
        a + (b - a) * frac
    }
}

impl Default for Delay {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Delay {
    impl_effect_common!("delay", "Delay");

    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        if self.line_l.is_empty() {
            return;
        }
        let max_delay = (self.line_l.len() - 2) as f32;

        // The line is fed even when fully dry so raising the mix never
        // starts from an empty buffer.
        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let mix = self.mix.next_value();
            let feedback = self.feedback.next_value();
            let delay = self.delay_frames.next_value().clamp(1.0, max_delay);

            let delayed_l = Self::read(&self.line_l, self.write_pos, delay);
            let delayed_r = Self::read(&self.line_r, self.write_pos, delay);

            self.filter_state_l += self.filter_coeff * (delayed_l * feedback - self.filter_state_l);
            self.filter_state_r += self.filter_coeff * (delayed_r * feedback - self.filter_state_r);

            self.line_l[self.write_pos] = *l + self.filter_state_l;
            self.line_r[self.write_pos] = *r + self.filter_state_r;
            self.write_pos = (self.write_pos + 1) % self.line_l.len();

            *l = crossfade(*l, delayed_l, mix);
            *r = crossfade(*r, delayed_r, mix);
        }
    }

    fn prepare(&mut self, sample_rate: u32, _max_block_size: usize) {
        self.sample_rate = sample_rate as f32;
        let size = (MAX_DELAY_SECS * self.sample_rate).ceil() as usize + LINE_MARGIN;
        self.line_l = vec![0.0; size];
        self.line_r = vec![0.0; size];
        self.write_pos = 0;
        self.filter_coeff = 1.0 - (-2.0 * PI * FEEDBACK_FILTER_HZ / self.sample_rate).exp();
        self.delay_frames.snap(self.time_secs * self.sample_rate);
    }

    fn reset(&mut self) {
        self.line_l.fill(0.0);
        self.line_r.fill(0.0);
        self.write_pos = 0;
        self.filter_state_l = 0.0;
        self.filter_state_r = 0.0;
        self.mix.snap(self.mix.target());
        self.feedback.snap(self.feedback.target());
        self.delay_frames.snap(self.delay_frames.target());
    }

    fn set_smoothing(&mut self, frames: usize) {
        self.mix.set_ramp_frames(frames);
        self.feedback.set_ramp_frames(frames);
        self.delay_frames.set_ramp_frames(frames);
    }

    fn get_params(&self) -> Value {
        json!({
            "wet_mix": self.wet_percent,
            "time_secs": self.time_secs,
            "feedback": self.feedback_percent,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn prepared(time_secs: f32) -> Delay {
        let mut delay = Delay::new();
        delay.prepare(1000, 256);
        delay.set_time_secs(time_secs);
        delay
    }

    #[test]
    fn test_impulse_repeats_after_delay_time() {
        let mut delay = prepared(0.1);
        delay.set_mix_percent(100.0);
        delay.set_feedback_percent(0.0);

        let mut left = vec![0.0; 256];
        let mut right = vec![0.0; 256];
        left[0] = 1.0;
        right[0] = 1.0;
        delay.process(&mut left, &mut right);

        // 0.1 s at 1 kHz
        assert_relative_eq!(left[100], 1.0, epsilon = 1e-6);
        assert_eq!(left[0], 0.0);
        assert_eq!(left[200], 0.0);
    }

    #[test]
    fn test_feedback_decays() {
        let mut delay = prepared(0.05);
        delay.set_mix_percent(100.0);
        delay.set_feedback_percent(50.0);

        let mut left = vec![0.0; 256];
        let mut right = vec![0.0; 256];
        left[0] = 1.0;
        delay.process(&mut left, &mut right);

        assert!(left[100].abs() > 0.0);
        assert!(left[100].abs() < left[50].abs());
        assert!(right.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_dry_passthrough() {
        let mut delay = prepared(0.1);
        let mut left = vec![0.3; 64];
        let mut right = vec![0.3; 64];
        delay.process(&mut left, &mut right);
        assert!(left.iter().all(|&s| s == 0.3));
    }

    #[test]
    fn test_parameter_clamping() {
        let mut delay = Delay::new();
        delay.set_time_secs(10.0);
        delay.set_feedback_percent(200.0);
        assert_eq!(delay.time_secs(), MAX_DELAY_SECS);
        assert_eq!(delay.feedback_percent(), MAX_FEEDBACK_PERCENT);
    }

    #[test]
    fn test_unprepared_is_noop() {
        let mut delay = Delay::new();
        delay.set_mix_percent(100.0);
        let mut left = vec![0.5; 8];
        let mut right = vec![0.5; 8];
        delay.process(&mut left, &mut right);
        assert_eq!(left[0], 0.5);
    }
}
