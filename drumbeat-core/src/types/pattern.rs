//! One-bar drum pattern
//!
//! A `Pattern` is an immutable value: the playback thread receives whole
//! patterns and swaps them in one assignment, so it can never observe a
//! half-updated bar.

use std::collections::BTreeMap;

use crate::types::instrument::InstrumentId;

/// Number of 16th-note steps in one bar
pub const STEPS_PER_BAR: usize = 16;

/// Lower tempo bound (exclusive for patterns)
pub const MIN_TEMPO_BPM: f64 = 20.0;

/// Upper tempo bound (inclusive)
pub const MAX_TEMPO_BPM: f64 = 300.0;

pub const MAX_SWING_PERCENT: u8 = 100;

pub const MAX_VELOCITY: u8 = 127;

/// Velocity per step; 0 is a rest
pub type StepArray = [u8; STEPS_PER_BAR];

/// Rejected pattern or parameter
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PatternError {
    #[error("unknown instrument '{0}'")]
    UnknownInstrument(String),

    #[error("tempo {0} BPM is outside (20, 300]")]
    TempoOutOfRange(f64),

    #[error("swing {0}% is outside 0-100")]
    SwingOutOfRange(i64),

    #[error("velocity {velocity} at step {step} of {instrument} exceeds 127")]
    VelocityOutOfRange {
        instrument: InstrumentId,
        step: usize,
        velocity: u8,
    },

    #[error("invalid pattern document: {0}")]
    Document(String),
}

/// Check a pattern tempo against the (20, 300] range
pub fn validate_tempo(bpm: f64) -> Result<f64, PatternError> {
    if bpm.is_finite() && bpm > MIN_TEMPO_BPM && bpm <= MAX_TEMPO_BPM {
        Ok(bpm)
    } else {
        Err(PatternError::TempoOutOfRange(bpm))
    }
}

/// One bar of per-instrument velocity grids plus tempo and swing
#[derive(Clone, Debug, PartialEq)]
pub struct Pattern {
    tempo_bpm: f64,
    swing_percent: u8,
    tracks: BTreeMap<InstrumentId, StepArray>,
    metadata: String,
}

impl Pattern {
    /// Create an empty pattern at the given tempo
    pub fn new(tempo_bpm: f64) -> Result<Self, PatternError> {
        Ok(Self {
            tempo_bpm: validate_tempo(tempo_bpm)?,
            swing_percent: 0,
            tracks: BTreeMap::new(),
            metadata: String::new(),
        })
    }

    /// Set the swing amount (0 = straight)
    pub fn with_swing(mut self, swing_percent: u8) -> Result<Self, PatternError> {
        if swing_percent > MAX_SWING_PERCENT {
            return Err(PatternError::SwingOutOfRange(swing_percent as i64));
        }
        self.swing_percent = swing_percent;
        Ok(self)
    }

    /// Add or replace an instrument's step grid
    pub fn with_track(mut self, id: InstrumentId, steps: StepArray) -> Result<Self, PatternError> {
        if let Some((step, &velocity)) = steps.iter().enumerate().find(|(_, v)| **v > MAX_VELOCITY)
        {
            return Err(PatternError::VelocityOutOfRange {
                instrument: id,
                step,
                velocity,
            });
        }
        self.tracks.insert(id, steps);
        Ok(self)
    }

    /// Attach informational metadata (e.g. a suggested kit)
    pub fn with_metadata(mut self, metadata: impl Into<String>) -> Self {
        self.metadata = metadata.into();
        self
    }

    pub fn tempo_bpm(&self) -> f64 {
        self.tempo_bpm
    }

    pub fn swing_percent(&self) -> u8 {
        self.swing_percent
    }

    pub fn metadata(&self) -> &str {
        &self.metadata
    }

    pub fn track(&self, id: InstrumentId) -> Option<&StepArray> {
        self.tracks.get(&id)
    }

    /// All tracks in instrument order
    pub fn tracks(&self) -> impl Iterator<Item = (InstrumentId, &StepArray)> {
        self.tracks.iter().map(|(id, steps)| (*id, steps))
    }

    /// Velocity of an instrument at a step (0 when absent)
    pub fn velocity(&self, id: InstrumentId, step: usize) -> u8 {
        self.tracks
            .get(&id)
            .map(|steps| steps[step % STEPS_PER_BAR])
            .unwrap_or(0)
    }

    /// Instruments that sound at `step`, with their velocities
    pub fn hits_at(&self, step: usize) -> impl Iterator<Item = (InstrumentId, u8)> + '_ {
        let step = step % STEPS_PER_BAR;
        self.tracks
            .iter()
            .filter(move |(_, steps)| steps[step] > 0)
            .map(move |(id, steps)| (*id, steps[step]))
    }

    /// True when no step of any track sounds
    pub fn is_silent(&self) -> bool {
        self.tracks.values().all(|steps| steps.iter().all(|v| *v == 0))
    }
}
