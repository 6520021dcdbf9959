//! Step timing for a 16-step sequencer
//!
//! Deadlines are always derived from a fixed anchor instant, never by adding
//! a step duration to "now". Sleeping past a deadline therefore delays that
//! one step but does not push every later step back:
//!
//! ```text
//! deadline(n) = anchor + (n - anchor_tick) * step_duration + swing_offset(n)
//! ```
//!
//! Swing delays odd (off-beat) steps only; even steps stay on the straight
//! grid, so the bar length is unchanged by swing.

use std::time::{Duration, Instant};

use crate::types::pattern::{MAX_SWING_PERCENT, STEPS_PER_BAR};

/// Largest swing delay of `LinearSwing`, as a fraction of one step
pub const MAX_SWING_FRACTION: f64 = 0.33;

/// Upper bound applied to any curve so an off-beat never reaches the next step
const SWING_FRACTION_LIMIT: f64 = 0.9;

/// Duration of one 16th note at the given tempo
pub fn step_duration(tempo_bpm: f64) -> Duration {
    Duration::from_secs_f64(60.0 / tempo_bpm / 4.0)
}

/// Position of an absolute step count within the bar
pub fn bar_step(tick: u64) -> usize {
    (tick % STEPS_PER_BAR as u64) as usize
}

/// Maps a swing percentage to the delay of off-beat steps
///
/// Implementations should return 0.0 for 0% and grow monotonically with the
/// percentage. The result is a fraction of the step duration.
pub trait SwingCurve {
    fn delay_fraction(&self, swing_percent: u8) -> f64;
}

/// Straight line from 0 to `MAX_SWING_FRACTION` of a step
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LinearSwing;

impl SwingCurve for LinearSwing {
    fn delay_fraction(&self, swing_percent: u8) -> f64 {
        swing_percent.min(MAX_SWING_PERCENT) as f64 / 100.0 * MAX_SWING_FRACTION
    }
}

impl<T: SwingCurve + ?Sized> SwingCurve for Box<T> {
    fn delay_fraction(&self, swing_percent: u8) -> f64 {
        (**self).delay_fraction(swing_percent)
    }
}

impl<T: SwingCurve + ?Sized> SwingCurve for std::sync::Arc<T> {
    fn delay_fraction(&self, swing_percent: u8) -> f64 {
        (**self).delay_fraction(swing_percent)
    }
}

/// Earlier segments kept for looking up deadlines of past steps
const MAX_SEGMENTS: usize = 64;

/// Stretch of the timeline with constant tempo and swing
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Segment {
    /// First tick played with these parameters
    anchor_tick: u64,
    /// Straight-grid instant of `anchor_tick`
    anchor: Instant,
    step: Duration,
    swing_percent: u8,
}

impl Segment {
    fn grid_time(&self, tick: u64) -> Instant {
        if tick >= self.anchor_tick {
            let steps = (tick - self.anchor_tick).min(u32::MAX as u64) as u32;
            self.anchor + self.step.saturating_mul(steps)
        } else {
            let steps = (self.anchor_tick - tick).min(u32::MAX as u64) as u32;
            self.anchor
                .checked_sub(self.step.saturating_mul(steps))
                .unwrap_or(self.anchor)
        }
    }
}

/// Computes absolute step deadlines from tempo and swing
///
/// Every re-anchor starts a new segment; ticks before it keep the times they
/// had, so deadlines never move backwards for steps already dispatched.
#[derive(Clone, Debug)]
pub struct StepTimer<C = LinearSwing> {
    curve: C,
    tempo_bpm: f64,
    current: Segment,
    /// Older segments, ordered by `anchor_tick`
    history: Vec<Segment>,
}

impl StepTimer<LinearSwing> {
    /// Start a timer whose step 0 falls on `start`
    pub fn new(start: Instant, tempo_bpm: f64, swing_percent: u8) -> Self {
        StepTimer::with_curve(start, tempo_bpm, swing_percent, LinearSwing)
    }
}

impl<C: SwingCurve> StepTimer<C> {
    pub fn with_curve(start: Instant, tempo_bpm: f64, swing_percent: u8, curve: C) -> Self {
        Self {
            curve,
            tempo_bpm,
            current: Segment {
                anchor_tick: 0,
                anchor: start,
                step: step_duration(tempo_bpm),
                swing_percent: swing_percent.min(MAX_SWING_PERCENT),
            },
            history: Vec::new(),
        }
    }

    pub fn tempo_bpm(&self) -> f64 {
        self.tempo_bpm
    }

    pub fn swing_percent(&self) -> u8 {
        self.current.swing_percent
    }

    /// Straight (unswung) duration of one step
    pub fn step_duration(&self) -> Duration {
        self.current.step
    }

    fn segment_for(&self, tick: u64) -> &Segment {
        if tick >= self.current.anchor_tick {
            return &self.current;
        }
        self.history
            .iter()
            .rev()
            .find(|s| s.anchor_tick <= tick)
            .or(self.history.first())
            .unwrap_or(&self.current)
    }

    /// Delay applied to `tick`; zero for on-beat steps
    pub fn swing_offset(&self, tick: u64) -> Duration {
        if tick % 2 == 0 {
            return Duration::ZERO;
        }
        let segment = self.segment_for(tick);
        let fraction = self.curve.delay_fraction(segment.swing_percent);
        if !fraction.is_finite() {
            return Duration::ZERO;
        }
        segment
            .step
            .mul_f64(fraction.clamp(0.0, SWING_FRACTION_LIMIT))
    }

    /// Straight-grid instant of `tick`
    pub fn grid_time(&self, tick: u64) -> Instant {
        self.segment_for(tick).grid_time(tick)
    }

    /// Instant at which `tick` must fire
    pub fn deadline(&self, tick: u64) -> Instant {
        self.grid_time(tick) + self.swing_offset(tick)
    }

    fn start_segment(&mut self, anchor_tick: u64, anchor: Instant, step: Duration, swing: u8) {
        self.history.push(self.current);
        self.history.retain(|s| s.anchor_tick < anchor_tick);
        if self.history.len() > MAX_SEGMENTS {
            self.history.remove(0);
        }
        self.current = Segment {
            anchor_tick,
            anchor,
            step,
            swing_percent: swing.min(MAX_SWING_PERCENT),
        };
    }

    /// Apply new tempo/swing from `next_tick` onwards
    ///
    /// The grid position of `next_tick` is kept, so steps already dispatched
    /// keep their times and only the spacing after `next_tick` changes.
    pub fn retime(&mut self, next_tick: u64, tempo_bpm: f64, swing_percent: u8) {
        let anchor = self.grid_time(next_tick);
        self.tempo_bpm = tempo_bpm;
        self.start_segment(next_tick, anchor, step_duration(tempo_bpm), swing_percent);
    }

    /// Re-anchor so that `tick` sits on the grid at `now`
    ///
    /// Used after an overrun: the timeline moves forward instead of trying to
    /// catch up on missed steps.
    pub fn resync(&mut self, tick: u64, now: Instant) {
        let Segment {
            step,
            swing_percent,
            ..
        } = self.current;
        self.start_segment(tick, now, step, swing_percent);
    }

    /// Number of steps starting at `tick` whose deadline is more than one
    /// step in the past at `now`
    pub fn missed_steps(&self, tick: u64, now: Instant) -> u64 {
        let mut missed = 0;
        while now.saturating_duration_since(self.deadline(tick + missed)) > self.current.step {
            missed += 1;
        }
        missed
    }
}
