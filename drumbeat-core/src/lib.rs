//! # Drumbeat Core
//!
//! Pure data and timing for the drumbeat sequencer, with no MIDI or thread
//! dependencies.
//!
//! - `types`: the one-bar `Pattern`, instrument identifiers and the static
//!   instrument → MIDI mapping table.
//! - `timing`: step deadlines from tempo and swing, anchored to a fixed
//!   origin so scheduling jitter never accumulates.
//!
//! ## Features
//!
//! - **serde**: JSON pattern documents (`Pattern::from_json` / `to_json`)
//!
//! ## Example
//!
//! ```
//! use drumbeat_core::timing::StepTimer;
//! use drumbeat_core::types::{InstrumentId, Pattern};
//! use std::time::{Duration, Instant};
//!
//! let mut kick = [0u8; 16];
//! kick[0] = 127;
//! let pattern = Pattern::new(120.0)?.with_track(InstrumentId::BD, kick)?;
//!
//! let start = Instant::now();
//! let timer = StepTimer::new(start, pattern.tempo_bpm(), pattern.swing_percent());
//! assert_eq!(timer.deadline(1) - start, Duration::from_millis(125));
//! # Ok::<(), drumbeat_core::types::PatternError>(())
//! ```

pub mod timing;
pub mod types;

pub use timing::{step_duration, LinearSwing, StepTimer, SwingCurve};
pub use types::{InstrumentId, InstrumentMap, Pattern, PatternError, StepArray};
