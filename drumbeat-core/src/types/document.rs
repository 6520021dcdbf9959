//! JSON pattern documents
//!
//! The shape produced by the pattern generator:
//!
//! ```json
//! {
//!   "bpm": 120,
//!   "swing": 0,
//!   "kit_suggestion": "909",
//!   "instruments": {
//!     "BD": {"steps": [127,0,0,0,127,0,0,0,127,0,0,0,127,0,0,0]}
//!   }
//! }
//! ```
//!
//! Parsing normalises the step grids the same way the generator does (pad or
//! truncate to 16 steps, clamp velocities) and rejects what cannot be
//! repaired: unknown instruments and tempos outside (20, 300].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::instrument::InstrumentId;
use crate::types::pattern::{
    Pattern, PatternError, StepArray, MAX_SWING_PERCENT, MAX_VELOCITY, STEPS_PER_BAR,
};

const DEFAULT_BPM: f64 = 120.0;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TrackDocument {
    #[serde(default)]
    pub steps: Vec<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PatternDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bpm: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub swing: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kit_suggestion: Option<String>,
    #[serde(default)]
    pub instruments: BTreeMap<String, TrackDocument>,
}

fn normalize_steps(raw: &[f64]) -> StepArray {
    let mut steps = [0u8; STEPS_PER_BAR];
    for (slot, value) in steps.iter_mut().zip(raw.iter()) {
        // NaN saturates to 0 in the cast
        *slot = (*value as i64).clamp(0, MAX_VELOCITY as i64) as u8;
    }
    steps
}

impl TryFrom<PatternDocument> for Pattern {
    type Error = PatternError;

    fn try_from(doc: PatternDocument) -> Result<Self, Self::Error> {
        let swing = doc
            .swing
            .map(|s| if s.is_finite() { s.round() } else { 0.0 })
            .unwrap_or(0.0)
            .clamp(0.0, MAX_SWING_PERCENT as f64) as u8;

        let mut pattern = Pattern::new(doc.bpm.unwrap_or(DEFAULT_BPM))?.with_swing(swing)?;
        if let Some(kit) = doc.kit_suggestion {
            pattern = pattern.with_metadata(kit);
        }
        for (name, track) in doc.instruments {
            let id: InstrumentId = name.parse()?;
            pattern = pattern.with_track(id, normalize_steps(&track.steps))?;
        }
        Ok(pattern)
    }
}

impl From<&Pattern> for PatternDocument {
    fn from(pattern: &Pattern) -> Self {
        let instruments = pattern
            .tracks()
            .filter(|(_, steps)| steps.iter().any(|v| *v > 0))
            .map(|(id, steps)| {
                (
                    id.code().to_string(),
                    TrackDocument {
                        steps: steps.iter().map(|v| *v as f64).collect(),
                    },
                )
            })
            .collect();
        let kit = pattern.metadata();
        PatternDocument {
            bpm: Some(pattern.tempo_bpm()),
            swing: Some(pattern.swing_percent() as f64),
            kit_suggestion: (!kit.is_empty()).then(|| kit.to_string()),
            instruments,
        }
    }
}

impl Pattern {
    /// Parse and normalise a JSON pattern document
    pub fn from_json(json: &str) -> Result<Self, PatternError> {
        let doc: PatternDocument =
            serde_json::from_str(json).map_err(|e| PatternError::Document(e.to_string()))?;
        Pattern::try_from(doc)
    }

    /// Serialise to the document format (non-empty tracks only)
    pub fn to_json(&self) -> Result<String, PatternError> {
        serde_json::to_string_pretty(&PatternDocument::from(self))
            .map_err(|e| PatternError::Document(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_generator_output() {
        let json = r#"{
            "bpm": 96,
            "swing": 40,
            "kit_suggestion": "808",
            "instruments": {
                "BD": {"steps": [127,0,0,0,127,0,0,0,127,0,0,0,127,0,0,0]},
                "CH": {"steps": [80,0,80,0,80,0,80,0,80,0,80,0,80,0,80,0]}
            }
        }"#;
        let p = Pattern::from_json(json).unwrap();
        assert_eq!(p.tempo_bpm(), 96.0);
        assert_eq!(p.swing_percent(), 40);
        assert_eq!(p.metadata(), "808");
        assert_eq!(p.velocity(InstrumentId::BD, 12), 127);
        assert_eq!(p.velocity(InstrumentId::CH, 2), 80);
        assert_eq!(p.velocity(InstrumentId::CH, 3), 0);
    }

    #[test]
    fn test_defaults() {
        let p = Pattern::from_json("{}").unwrap();
        assert_eq!(p.tempo_bpm(), 120.0);
        assert_eq!(p.swing_percent(), 0);
        assert!(p.is_silent());
    }

    #[test]
    fn test_steps_are_normalised() {
        let json = r#"{"instruments": {
            "SD": {"steps": [0, 0, 0, 0, 300]},
            "OH": {"steps": [-5,1,2,3,4,5,6,7,8,9,10,11,12,13,14,15,16,17]}
        }}"#;
        let p = Pattern::from_json(json).unwrap();
        let sd = p.track(InstrumentId::SD).unwrap();
        assert_eq!(sd[4], 127);
        assert!(sd[5..].iter().all(|v| *v == 0));
        let oh = p.track(InstrumentId::OH).unwrap();
        assert_eq!(oh[0], 0);
        assert_eq!(oh[15], 15);
    }

    #[test]
    fn test_swing_is_clamped() {
        let p = Pattern::from_json(r#"{"swing": 250}"#).unwrap();
        assert_eq!(p.swing_percent(), 100);
        let p = Pattern::from_json(r#"{"swing": -3}"#).unwrap();
        assert_eq!(p.swing_percent(), 0);
    }

    #[test]
    fn test_rejects_unknown_instrument() {
        let err = Pattern::from_json(r#"{"instruments": {"COWBELL": {"steps": []}}}"#).unwrap_err();
        assert_eq!(err, PatternError::UnknownInstrument("COWBELL".to_string()));
    }

    #[test]
    fn test_rejects_bad_tempo() {
        assert_eq!(
            Pattern::from_json(r#"{"bpm": 400}"#).unwrap_err(),
            PatternError::TempoOutOfRange(400.0)
        );
        assert!(matches!(
            Pattern::from_json("not json").unwrap_err(),
            PatternError::Document(_)
        ));
    }

    #[test]
    fn test_json_keeps_sounding_tracks_only() {
        let mut kick = [0u8; STEPS_PER_BAR];
        kick[0] = 127;
        let p = Pattern::new(110.0)
            .unwrap()
            .with_swing(20)
            .unwrap()
            .with_track(InstrumentId::BD, kick)
            .unwrap()
            .with_track(InstrumentId::SD, [0; STEPS_PER_BAR])
            .unwrap()
            .with_metadata("909");
        let json = p.to_json().unwrap();
        assert!(json.contains("\"BD\""));
        assert!(!json.contains("\"SD\""));

        let back = Pattern::from_json(&json).unwrap();
        assert_eq!(back.velocity(InstrumentId::BD, 0), 127);
        assert_eq!(back.swing_percent(), 20);
        assert_eq!(back.metadata(), "909");
    }
}
