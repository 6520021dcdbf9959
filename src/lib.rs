//! # Drumbeat
//!
//! Drumbeat drives an external drum machine over MIDI from 16-step patterns.
//! It keeps a steady clock on a dedicated playback thread, applies swing to
//! off-beat steps and accepts pattern, tempo and swing changes while playing
//! without restarting the bar.
//!
//! ## Modules
//!
//! - `sequencer`: The playback engine, its control channel and the deadline
//!   wait used by the playback thread.
//! - `midi`: MIDI message encoding, the `MidiSink` output seam and the
//!   threaded `midir` output handle.
//! - `config`: Environment-driven runtime settings.
//! - `commands` / `repl`: The interactive command line.
//!
//! Patterns, the instrument map and step timing live in `drumbeat-core`.

pub mod commands;
pub mod config;
pub mod midi;
pub mod repl;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use crate::config::Config;
pub use crate::midi::{MidiMessage, MidiOutputHandle, MidiSink, OutputError};
pub use crate::sequencer::{
    ControlError, EngineOptions, PlaybackEngine, PlaybackEvent, PlaybackStatus,
};
pub use drumbeat_core::{InstrumentId, InstrumentMap, Pattern, PatternError};
