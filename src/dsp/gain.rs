//! Gain and Pan
//!
//! First stage of every track chain: channel volume in dB and a balance
//! pan. Both are smoothed so fader moves during playback never step.

use serde_json::{json, Value};

use crate::dsp::effect::Effect;
use crate::dsp::smoothing::SmoothedParam;
use crate::engine::buffer::db_to_linear;
use crate::impl_effect_common;
use crate::state::fx::{MAX_VOLUME_DB, MIN_VOLUME_DB};

// ============================================================================
// Helper Functions
// ============================================================================

/// Left/right gains for a balance pan position
///
/// Centre leaves both channels at unity; moving right attenuates the left
/// channel linearly down to silence at hard right, and vice versa.
#[inline]
pub fn balance_gains(pan: f32) -> (f32, f32) {
    let pan = pan.clamp(-1.0, 1.0);
    ((1.0 - pan).min(1.0), (1.0 + pan).min(1.0))
}

// ============================================================================
// GainPan Effect
// ============================================================================

/// Volume and pan stage
///
/// # Example
/// ```ignore
/// use fourtrack::dsp::{Effect, GainPan};
///
/// let mut stage = GainPan::new();
/// stage.prepare(48000, 512);
/// stage.set_volume_db(-6.0);
/// stage.set_pan(-0.5);
/// stage.process(&mut left, &mut right);
/// ```
#[derive(Debug, Clone)]
pub struct GainPan {
    volume_db: f32,
    pan_position: f32,
    gain: SmoothedParam,
    pan: SmoothedParam,
}

impl GainPan {
    pub fn new() -> Self {
        Self {
            volume_db: 0.0,
            pan_position: 0.0,
            gain: SmoothedParam::new(1.0),
            pan: SmoothedParam::new(0.0),
        }
    }

    /// Set the channel volume in dB (-60 to +12, clamped)
    pub fn set_volume_db(&mut self, db: f32) {
        self.volume_db = db.clamp(MIN_VOLUME_DB, MAX_VOLUME_DB);
        let linear = if self.volume_db <= MIN_VOLUME_DB {
            0.0
        } else {
            db_to_linear(self.volume_db)
        };
        self.gain.set_target(linear);
    }

    pub fn volume_db(&self) -> f32 {
        self.volume_db
    }

    /// Set the pan position (-1 hard left, 1 hard right)
    pub fn set_pan(&mut self, pan: f32) {
        self.pan_position = pan.clamp(-1.0, 1.0);
        self.pan.set_target(self.pan_position);
    }

    pub fn pan(&self) -> f32 {
        self.pan_position
    }
}

impl Default for GainPan {
    fn default() -> Self {
        Self::new()
    }
}

impl Effect for GainPan {
    impl_effect_common!("gain_pan", "Volume / Pan");

    fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        let unity = (self.gain.current() - 1.0).abs() < f32::EPSILON
            && self.pan.current() == 0.0;
        if unity && !self.gain.is_smoothing() && !self.pan.is_smoothing() {
            return;
        }

        for (l, r) in left.iter_mut().zip(right.iter_mut()) {
            let gain = self.gain.next_value();
            let (gl, gr) = balance_gains(self.pan.next_value());
            *l *= gain * gl;
            *r *= gain * gr;
        }
    }

    fn prepare(&mut self, _sample_rate: u32, _max_block_size: usize) {}

    fn reset(&mut self) {
        self.gain.snap(self.gain.target());
        self.pan.snap(self.pan.target());
    }

    fn set_smoothing(&mut self, frames: usize) {
        self.gain.set_ramp_frames(frames);
        self.pan.set_ramp_frames(frames);
    }

    fn get_params(&self) -> Value {
        json!({
            "volume_db": self.volume_db,
            "pan": self.pan_position,
        })
    }
}
