//! Runtime settings read from the environment
//!
//! | Variable                       | Default | Meaning                          |
//! |--------------------------------|---------|----------------------------------|
//! | `DRUMBEAT_MIDI_PORT`           | `TR-8S` | Output port name (partial match) |
//! | `DRUMBEAT_MIDI_CHANNEL`        | `10`    | Drum channel, 1-16               |
//! | `DRUMBEAT_EXPLICIT_NOTE_OFF`   | off     | Send a Note Off after each hit   |
//! | `DRUMBEAT_SUBSCRIBER_CAPACITY` | `64`    | Event queue length per listener  |
//!
//! Invalid values fall back to defaults.

use crate::sequencer::playback_engine::DEFAULT_SUBSCRIBER_CAPACITY;
use drumbeat_core::types::{InstrumentMap, DRUM_CHANNEL};
use tracing::warn;

pub const DEFAULT_PORT: &str = "TR-8S";

const PORT_VAR: &str = "DRUMBEAT_MIDI_PORT";
const CHANNEL_VAR: &str = "DRUMBEAT_MIDI_CHANNEL";
const NOTE_OFF_VAR: &str = "DRUMBEAT_EXPLICIT_NOTE_OFF";
const CAPACITY_VAR: &str = "DRUMBEAT_SUBSCRIBER_CAPACITY";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    pub midi_port: String,
    /// Zero-based MIDI channel
    pub channel: u8,
    pub explicit_note_off: bool,
    pub subscriber_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            midi_port: DEFAULT_PORT.to_string(),
            channel: DRUM_CHANNEL,
            explicit_note_off: false,
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(port) = lookup(PORT_VAR) {
            let port = port.trim();
            if !port.is_empty() {
                config.midi_port = port.to_string();
            }
        }

        if let Some(raw) = lookup(CHANNEL_VAR) {
            match raw.trim().parse::<u8>() {
                Ok(ch @ 1..=16) => config.channel = ch - 1,
                _ => warn!(value = %raw, "{} must be 1-16, using default", CHANNEL_VAR),
            }
        }

        if let Some(raw) = lookup(NOTE_OFF_VAR) {
            match parse_flag(&raw) {
                Some(flag) => config.explicit_note_off = flag,
                None => warn!(value = %raw, "{} is not a boolean, using default", NOTE_OFF_VAR),
            }
        }

        if let Some(raw) = lookup(CAPACITY_VAR) {
            match raw.trim().parse::<usize>() {
                Ok(n) if n > 0 => config.subscriber_capacity = n,
                _ => warn!(value = %raw, "{} must be a positive integer, using default", CAPACITY_VAR),
            }
        }

        config
    }

    /// Instrument table for the configured channel and note-off policy
    pub fn instrument_map(&self) -> InstrumentMap {
        InstrumentMap::tr8s(self.channel).with_explicit_note_off(self.explicit_note_off)
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}
