//! DSP Effects Library
//!
//! The per-track processors and the fixed chain that runs them.
//! All effects implement the `Effect` trait for uniform processing.

mod chain;
mod delay;
mod effect;
mod gain;
mod reverb;
mod saturation;
mod smoothing;

pub use chain::{ChainStage, TrackChain};
pub use delay::Delay;
pub use effect::Effect;
pub use gain::{balance_gains, GainPan};
pub use reverb::Reverb;
pub use saturation::{waveshape_tape, Saturation};
pub use smoothing::SmoothedParam;
