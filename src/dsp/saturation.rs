//! Saturation Effect
//!
//! Tape-style soft clipping: the signal is driven into a `tanh` curve by a
//! pre-gain and crossfaded with the dry signal.

use serde_json::{json, Value};

use crate::dsp::effect::{crossfade, Effect};
use crate::dsp::smoothing::SmoothedParam;
use crate::engine::buffer::db_to_linear;
use crate::impl_effect_common;
use crate::state::fx::{MAX_PRE_GAIN_DB, MIN_PRE_GAIN_DB};

// ============================================================================
// Waveshaping
// ============================================================================

/// Tape saturation curve
#[inline]
pub fn waveshape_tape(x: f32, drive: f32) -> f32 {
    (x * drive).tanh()
}

// ============================================================================
// Saturation Effect
// ============================================================================

#[derive(Debug, Clone)]
pub struct Saturation {
    wet_percent: f32,
    pre_gain_db: f32,
    mix: SmoothedParam,
    drive: SmoothedParam,
}

impl Saturation {
    pub fn new() -> Self {
        Self {
            wet_percent: 0.0,
            pre_gain_db: 0.0,
            mix: SmoothedParam::new(0.0),
            drive: SmoothedParam::new(1.0),
        }
    }

    /// Set the wet/dry mix in percent (0-100)
    pub fn set_mix_percent(&mut self, percent: f32) {
        self.wet_percent = percent.clamp(0.0, 100.0);
        self.mix.set_target(self.wet_percent / 100.0);
    }

    /// Set the drive into the curve in dB (-40 to +20)
    pub fn set_pre_gain_db(&mut self, db: f32) {
        self.pre_gain_db = db.clamp(MIN_PRE_GAIN_DB, MAX_PRE_GAIN_DB);
        self.drive.set_target(db_to_linear(self.pre_gain_db));
    }

    pub fn mix_percent(&self) -> f32 {
        self.wet_percent
    }

    pub fn pre_gain_db(&self) -> f32 {
        self.pre_gain_db
    }
}

impl Default for Saturation {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for Saturation {
    impl_effect_common!("saturation", "Saturation");

    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        // Stateless: fully dry is a no-op
        if self.mix.current() <= 0.0 && !self.mix.is_smoothing() {
            self.drive.skip(left.len());
            return;
        }

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let mix = self.mix.next_value();
            let drive = self.drive.next_value();
            *l = crossfade(*l, waveshape_tape(*l, drive), mix);
            *r = crossfade(*r, waveshape_tape(*r, drive), mix);
        }
    }

    fn prepare(&mut self, _sample_rate: u32, _max_block_size: usize) {}

    fn reset(&mut self) {
        self.mix.snap(self.mix.target());
        self.drive.snap(self.drive.target());
    }

    fn set_smoothing(&mut self, frames: usize) {
        self.mix.set_ramp_frames(frames);
        self.drive.set_ramp_frames(frames);
    }

    fn get_params(&self) -> Value {
        json!({
            "wet_mix": self.wet_percent,
            "pre_gain_db": self.pre_gain_db,
        })
    }
}
