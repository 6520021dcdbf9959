//! Drum instrument identifiers and their MIDI mappings
//!
//! Provides `InstrumentId` for the eleven voices of a TR-8S style drum
//! machine and `InstrumentMap`, the read-only table that turns an instrument
//! into a (channel, note) pair.

use std::fmt;
use std::str::FromStr;

use crate::types::pattern::PatternError;

/// Default drum channel (channel 10 in 1-indexed MIDI terms)
pub const DRUM_CHANNEL: u8 = 9;

/// Drum voice of the target machine
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum InstrumentId {
    /// Bass drum
    BD,
    /// Snare drum
    SD,
    /// Low tom
    LT,
    /// Mid tom
    MT,
    /// Hi tom
    HT,
    /// Rim shot
    RS,
    /// Hand clap
    CP,
    /// Closed hi-hat
    CH,
    /// Open hi-hat
    OH,
    /// Crash cymbal
    CC,
    /// Ride cymbal
    RC,
}

impl InstrumentId {
    /// Every instrument, in table order
    pub const ALL: [InstrumentId; 11] = [
        InstrumentId::BD,
        InstrumentId::SD,
        InstrumentId::LT,
        InstrumentId::MT,
        InstrumentId::HT,
        InstrumentId::RS,
        InstrumentId::CP,
        InstrumentId::CH,
        InstrumentId::OH,
        InstrumentId::CC,
        InstrumentId::RC,
    ];

    /// Parse an instrument from its short code or a common long name
    pub fn from_name(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "bd" | "kick" | "bass" => Some(InstrumentId::BD),
            "sd" | "snare" => Some(InstrumentId::SD),
            "lt" | "lowtom" => Some(InstrumentId::LT),
            "mt" | "midtom" => Some(InstrumentId::MT),
            "ht" | "hitom" => Some(InstrumentId::HT),
            "rs" | "rim" | "rimshot" => Some(InstrumentId::RS),
            "cp" | "clap" => Some(InstrumentId::CP),
            "ch" | "hh" | "hihat" => Some(InstrumentId::CH),
            "oh" | "openhat" => Some(InstrumentId::OH),
            "cc" | "crash" => Some(InstrumentId::CC),
            "rc" | "ride" => Some(InstrumentId::RC),
            _ => None,
        }
    }

    /// Short code used in pattern documents
    pub fn code(&self) -> &'static str {
        match self {
            InstrumentId::BD => "BD",
            InstrumentId::SD => "SD",
            InstrumentId::LT => "LT",
            InstrumentId::MT => "MT",
            InstrumentId::HT => "HT",
            InstrumentId::RS => "RS",
            InstrumentId::CP => "CP",
            InstrumentId::CH => "CH",
            InstrumentId::OH => "OH",
            InstrumentId::CC => "CC",
            InstrumentId::RC => "RC",
        }
    }

    /// TR-8S default note assignment
    pub fn default_note(&self) -> u8 {
        match self {
            InstrumentId::BD => 36, // C1
            InstrumentId::SD => 38, // D1
            InstrumentId::LT => 43, // G1
            InstrumentId::MT => 47, // B1
            InstrumentId::HT => 50, // D2
            InstrumentId::RS => 37, // C#1
            InstrumentId::CP => 39, // D#1
            InstrumentId::CH => 42, // F#1
            InstrumentId::OH => 46, // A#1
            InstrumentId::CC => 49, // C#2
            InstrumentId::RC => 51, // D#2
        }
    }
}

impl fmt::Display for InstrumentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

impl FromStr for InstrumentId {
    type Err = PatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstrumentId::from_name(s).ok_or_else(|| PatternError::UnknownInstrument(s.to_string()))
    }
}

/// Where an instrument's hits are sent
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Mapping {
    /// MIDI channel (0-15)
    pub channel: u8,
    /// MIDI note number (0-127)
    pub note: u8,
    /// Device sustains notes until it receives a note-off
    pub explicit_note_off: bool,
}

/// Static instrument → (channel, note) table
///
/// Built once at startup and never mutated afterwards, so the playback thread
/// can own a copy without synchronisation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InstrumentMap {
    entries: [Mapping; 11],
}

impl InstrumentMap {
    /// TR-8S layout, every voice on the given channel
    pub fn tr8s(channel: u8) -> Self {
        let channel = channel & 0x0F;
        let entries = InstrumentId::ALL.map(|id| Mapping {
            channel,
            note: id.default_note(),
            explicit_note_off: false,
        });
        Self { entries }
    }

    /// Require an explicit note-off after every hit
    pub fn with_explicit_note_off(mut self, enabled: bool) -> Self {
        for entry in &mut self.entries {
            entry.explicit_note_off = enabled;
        }
        self
    }

    /// Override the mapping of a single instrument
    pub fn with_mapping(mut self, id: InstrumentId, mapping: Mapping) -> Self {
        self.entries[id as usize] = Mapping {
            channel: mapping.channel & 0x0F,
            note: mapping.note & 0x7F,
            explicit_note_off: mapping.explicit_note_off,
        };
        self
    }

    pub fn get(&self, id: InstrumentId) -> Mapping {
        self.entries[id as usize]
    }

    /// Iterate over every (instrument, mapping) pair in table order
    pub fn iter(&self) -> impl Iterator<Item = (InstrumentId, Mapping)> + '_ {
        InstrumentId::ALL.iter().map(move |&id| (id, self.get(id)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for InstrumentMap {
    fn default() -> Self {
        InstrumentMap::tr8s(DRUM_CHANNEL)
    }
}
