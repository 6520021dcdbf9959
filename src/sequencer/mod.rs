//! Playback scheduling: control channel, deadline waits and the playback thread

pub mod control;
pub mod playback_engine;
pub mod wait;

pub use control::{ControlError, PlaybackEvent, PlaybackStatus};
pub use playback_engine::{EngineOptions, PlaybackEngine, NOTE_GATE};
