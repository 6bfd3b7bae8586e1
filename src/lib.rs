//! fourtrack - Four-Track Tape Recorder Core
//!
//! A session holds exactly four tracks of non-overlapping regions. Tracks
//! are recorded from a microphone, played back in sync through per-track
//! effects, and bounced offline to one stereo WAV file.
//!
//! # Architecture
//!
//! The system is split into two domains:
//! - Control domain: `StudioContext`, `Timeline`, `AudioEngine` and the
//!   session data model; may allocate, block and log
//! - Render domain: `Renderer` inside the output callback; drains commands
//!   without blocking and reports back through atomics

pub mod cli;
pub mod config;
pub mod dsp;
pub mod engine;
pub mod error;
pub mod state;
pub mod studio;

pub use config::{EngineConfig, StudioConfig};
pub use engine::{AudioEngine, ManualClock, ManualDriver, OutputDriver, Timeline, TransportState};
pub use error::{ErrorKind, FourTrackError, Result};
pub use state::{Mix, Region, Session, Track, TrackFx, TrackIndex};
pub use studio::{BounceError, StudioContext, StudioTelemetry};
