//! Session State Module
//!
//! The plain-value data model (sessions, tracks, regions, effect settings,
//! mixes) and its JSON persistence.

pub mod fx;
pub mod mix;
pub mod session;
pub mod store;
pub mod track;

pub use fx::{DelaySettings, ReverbSettings, RoomSize, SaturationSettings, TrackFx};
pub use mix::Mix;
pub use session::{Session, Tier, TimeSignature};
pub use store::{JsonFileStore, SessionStore};
pub use track::{Region, Track, TrackIndex, TRACK_COUNT};
