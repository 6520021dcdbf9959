// drumbeat-core/src/types/mod.rs

#[cfg(feature = "serde")]
pub mod document;
pub mod instrument;
pub mod pattern;

#[cfg(feature = "serde")]
pub use document::{PatternDocument, TrackDocument};
pub use instrument::{InstrumentId, InstrumentMap, Mapping, DRUM_CHANNEL};
pub use pattern::{
    validate_tempo, Pattern, PatternError, StepArray, MAX_SWING_PERCENT, MAX_TEMPO_BPM,
    MAX_VELOCITY, MIN_TEMPO_BPM, STEPS_PER_BAR,
};
