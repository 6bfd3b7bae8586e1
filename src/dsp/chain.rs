//! Track effect chain
//!
//! Every track runs the same fixed chain, in this order:
//! 1. Gain / pan
//! 2. Saturation
//! 3. Delay
//! 4. Reverb
//!
//! The chain is built and prepared in the control domain, then moved into
//! the render domain where `apply` and `process` never allocate.

use serde_json::{json, Value};

use super::{Delay, Effect, GainPan, Reverb, Saturation};
use crate::state::fx::TrackFx;

/// Position of a stage in the chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChainStage {
    GainPan = 0,
    Saturation = 1,
    Delay = 2,
    Reverb = 3,
}

impl ChainStage {
    pub const ORDER: [ChainStage; 4] = [
        ChainStage::GainPan,
        ChainStage::Saturation,
        ChainStage::Delay,
        ChainStage::Reverb,
    ];
}

/// Fixed per-track processing chain
#[derive(Debug, Clone)]
pub struct TrackChain {
    gain_pan: GainPan,
    saturation: Saturation,
    delay: Delay,
    reverb: Reverb,
    fx: TrackFx,
}

impl TrackChain {
    pub fn new() -> Self {
        Self {
            gain_pan: GainPan::new(),
            saturation: Saturation::new(),
            delay: Delay::new(),
            reverb: Reverb::new(),
            fx: TrackFx::default(),
        }
    }

    /// Build a chain ready for the render domain
    pub fn prepared(sample_rate: u32, max_block_size: usize, smoothing_frames: usize) -> Self {
        let mut chain = Self::new();
        chain.prepare(sample_rate, max_block_size);
        chain.set_smoothing(smoothing_frames);
        chain
    }

    fn stage_mut(&mut self, stage: ChainStage) -> &mut dyn Effect {
        match stage {
            ChainStage::GainPan => &mut self.gain_pan,
            ChainStage::Saturation => &mut self.saturation,
            ChainStage::Delay => &mut self.delay,
            ChainStage::Reverb => &mut self.reverb,
        }
    }

    fn stage(&self, stage: ChainStage) -> &dyn Effect {
        match stage {
            ChainStage::GainPan => &self.gain_pan,
            ChainStage::Saturation => &self.saturation,
            ChainStage::Delay => &self.delay,
            ChainStage::Reverb => &self.reverb,
        }
    }

    pub fn prepare(&mut self, sample_rate: u32, max_block_size: usize) {
        for stage in ChainStage::ORDER {
            self.stage_mut(stage).prepare(sample_rate, max_block_size);
        }
    }

    pub fn set_smoothing(&mut self, frames: usize) {
        for stage in ChainStage::ORDER {
            self.stage_mut(stage).set_smoothing(frames);
        }
    }

    pub fn reset(&mut self) {
        for stage in ChainStage::ORDER {
            self.stage_mut(stage).reset();
        }
    }

    /// Retarget every stage from a settings snapshot
    ///
    /// Targets ramp from the current values, so this is safe to call
    /// mid-playback.
    pub fn apply(&mut self, fx: &TrackFx) {
        let fx = fx.clamped();
        self.gain_pan.set_volume_db(fx.volume_db);
        self.gain_pan.set_pan(fx.pan);
        self.saturation.set_mix_percent(fx.saturation.wet_mix);
        self.saturation.set_pre_gain_db(fx.saturation.pre_gain_db);
        self.delay.set_mix_percent(fx.delay.wet_mix);
        self.delay.set_time_secs(fx.delay.time_secs);
        self.delay.set_feedback_percent(fx.delay.feedback);
        self.reverb.set_mix_percent(fx.reverb.wet_mix);
        self.reverb.set_room(fx.reverb.room);
        self.fx = fx;
    }

    /// Apply settings and jump straight to them, clearing effect history
    pub fn apply_immediate(&mut self, fx: &TrackFx) {
        self.apply(fx);
        self.reset();
    }

    pub fn fx(&self) -> &TrackFx {
        &self.fx
    }

    /// Run the chain over one stereo block in place
    pub fn process(&mut self, left: &mut [f32], right: &mut [f32]) {
        for stage in ChainStage::ORDER {
            self.stage_mut(stage).process(left, right);
        }
    }

    /// Parameter dump of every stage, in chain order
    pub fn describe(&self) -> Value {
        let stages: Vec<Value> = ChainStage::ORDER
            .iter()
            .map(|&stage| {
                let effect = self.stage(stage);
                json!({
                    "type": effect.effect_type(),
                    "name": effect.display_name(),
                    "params": effect.get_params(),
                })
            })
            .collect();
        Value::Array(stages)
    }
}

impl Default for TrackChain {
    fn default() -> Self {
        Self::new()
    }
}
