//! Effect trait definition
//!
//! Base trait for the per-track processors. Effects run inside the render
//! callback, so `process` works on preallocated stereo slices in place and
//! must never allocate, lock or block.

use serde_json::Value;

/// Base trait for all track effects
pub trait Effect: Send {
    /// Process one block of stereo audio in place
    ///
    /// `left` and `right` always have the same length, at most the
    /// `max_block_size` given to `prepare`.
    fn process(&mut self, left: &mut [f32], right: &mut [f32]);

    /// Allocate internal state for a sample rate and block size
    ///
    /// Called from the control domain before the effect is handed to the
    /// render domain.
    fn prepare(&mut self, sample_rate: u32, max_block_size: usize);

    /// Clear delay lines and filter history
    fn reset(&mut self);

    /// Set how many frames parameter changes ramp over
    fn set_smoothing(&mut self, frames: usize);

    /// Effect type identifier
    fn effect_type(&self) -> &'static str;

    /// Human-readable display name
    fn display_name(&self) -> &str;

    /// Current parameter targets as JSON (for diagnostics)
    fn get_params(&self) -> Value;
}

/// Implement the naming methods shared by every effect
#[macro_export]
macro_rules! impl_effect_common {
    ($effect_type:expr, $display_name:expr) => {
        fn effect_type(&self) -> &'static str {
            $effect_type
        }

        fn display_name(&self) -> &str {
            $display_name
        }
    };
}

/// Crossfade between a dry and a wet sample
#[inline]
pub(crate) fn crossfade(dry: f32, wet: f32, mix: f32) -> f32 {
    dry * (1.0 - mix) + wet * mix
}
