//! Real-time step sequencer
//!
//! `PlaybackEngine` is the caller-facing handle. It owns a dedicated,
//! long-lived playback thread that is the only code allowed to wait on the
//! clock. Everything crosses the thread boundary by value: patterns and
//! parameter changes go in through the control channel, step positions and
//! status changes come out as `PlaybackEvent`s, and a few atomics hold
//! published copies for synchronous queries.
//!
//! Per step, the playback thread:
//! 1. applies pending commands (latest value per kind wins),
//! 2. waits for the step deadline (coarse sleep, then a short spin),
//! 3. applies anything that arrived during the wait, so a pattern swap
//!    lands on the very next step,
//! 4. skips ahead instead of bursting when it fell more than a step behind,
//! 5. sends a Note On for every sounding instrument and publishes the step.

use crate::midi::{MidiMessage, MidiSink};
use crate::sequencer::control::{
    ControlCommand, ControlError, PendingCommands, PlaybackEvent, PlaybackStatus, Publisher,
    Transport,
};
use crate::sequencer::wait::{wait_until, WaitOutcome};
use anyhow::Result;
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use drumbeat_core::timing::{bar_step, LinearSwing, StepTimer, SwingCurve};
use drumbeat_core::types::{InstrumentMap, Pattern, MAX_SWING_PERCENT, MAX_TEMPO_BPM, MIN_TEMPO_BPM};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// How long a note is held before its explicit Note Off
pub const NOTE_GATE: Duration = Duration::from_millis(10);

/// Tempo used before any pattern has been loaded
const IDLE_TEMPO_BPM: f64 = 120.0;

pub const DEFAULT_SUBSCRIBER_CAPACITY: usize = 64;

type SharedCurve = Arc<dyn SwingCurve + Send + Sync>;

/// Setup for a `PlaybackEngine`
pub struct EngineOptions {
    /// Read-only instrument → MIDI table
    pub instruments: InstrumentMap,
    /// Queue length of each subscriber; updates beyond it are dropped
    pub subscriber_capacity: usize,
    pub swing_curve: SharedCurve,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            instruments: InstrumentMap::default(),
            subscriber_capacity: DEFAULT_SUBSCRIBER_CAPACITY,
            swing_curve: Arc::new(LinearSwing),
        }
    }
}

/// Copies published by the playback thread for synchronous queries
#[derive(Debug, Default)]
struct SharedState {
    status: AtomicU8,
    current_step: AtomicUsize,
    /// Effective tempo stored as bits for atomic operations
    tempo_bits: AtomicU64,
    swing: AtomicU8,
}

impl SharedState {
    fn store_params(&self, tempo_bpm: f64, swing_percent: u8) {
        self.tempo_bits.store(tempo_bpm.to_bits(), Ordering::Relaxed);
        self.swing.store(swing_percent, Ordering::Relaxed);
    }
}

/// Clamp a live tempo change into the supported range
///
/// Non-finite and non-positive values are configuration errors.
pub fn clamp_tempo(bpm: f64) -> Result<f64, ControlError> {
    if !bpm.is_finite() || bpm <= 0.0 {
        return Err(ControlError::InvalidTempo(bpm));
    }
    Ok(bpm.clamp(MIN_TEMPO_BPM, MAX_TEMPO_BPM))
}

/// Clamp a live swing change into 0-100
pub fn clamp_swing(percent: i32) -> u8 {
    percent.clamp(0, MAX_SWING_PERCENT as i32) as u8
}

/// Handle to the playback thread
pub struct PlaybackEngine {
    command_tx: Sender<ControlCommand>,
    shared: Arc<SharedState>,
    subscriber_capacity: usize,
    thread: Option<JoinHandle<()>>,
}

impl PlaybackEngine {
    /// Spawn the playback thread with default options
    pub fn new(sink: impl MidiSink + 'static) -> Result<Self> {
        PlaybackEngine::with_options(sink, EngineOptions::default())
    }

    pub fn with_options(sink: impl MidiSink + 'static, options: EngineOptions) -> Result<Self> {
        let (command_tx, command_rx) = unbounded();
        let shared = Arc::new(SharedState::default());
        shared.store_params(IDLE_TEMPO_BPM, 0);

        let shared_clone = shared.clone();
        let instruments = options.instruments;
        let curve = options.swing_curve;
        let thread = thread::Builder::new()
            .name("drumbeat-playback".to_string())
            .spawn(move || {
                PlaybackLoop::new(Box::new(sink), instruments, curve, command_rx, shared_clone)
                    .run();
            })?;

        Ok(PlaybackEngine {
            command_tx,
            shared,
            subscriber_capacity: options.subscriber_capacity.max(1),
            thread: Some(thread),
        })
    }

    fn send(&self, cmd: ControlCommand) -> Result<(), ControlError> {
        self.command_tx
            .send(cmd)
            .map_err(|_| ControlError::Disconnected)
    }

    /// Start playing `pattern`, or swap it in place if already playing
    ///
    /// The bar position is kept across swaps; calling this repeatedly with
    /// the same pattern does not restart the bar.
    pub fn play(&self, pattern: Pattern) -> Result<(), ControlError> {
        self.send(ControlCommand::Play {
            pattern,
            restart: false,
        })
    }

    /// Start playing `pattern` from step 0, even when already playing
    pub fn play_from_start(&self, pattern: Pattern) -> Result<(), ControlError> {
        self.send(ControlCommand::Play {
            pattern,
            restart: true,
        })
    }

    /// Stop playback; honoured within one step, followed by a Note Off sweep
    pub fn stop(&self) -> Result<(), ControlError> {
        self.send(ControlCommand::Stop)
    }

    /// Change tempo live without replacing the pattern
    pub fn set_tempo(&self, bpm: f64) -> Result<(), ControlError> {
        let bpm = clamp_tempo(bpm)?;
        self.send(ControlCommand::SetTempo(bpm))
    }

    /// Change swing live without replacing the pattern
    pub fn set_swing(&self, percent: i32) -> Result<(), ControlError> {
        self.send(ControlCommand::SetSwing(clamp_swing(percent)))
    }

    /// Replace the active pattern (and its tempo/swing) at the next step
    pub fn replace_pattern(&self, pattern: Pattern) -> Result<(), ControlError> {
        self.send(ControlCommand::ReplacePattern(pattern))
    }

    /// Receive step and status events
    ///
    /// The queue is bounded; a subscriber that falls behind misses events
    /// rather than slowing playback down.
    pub fn subscribe(&self) -> Result<Receiver<PlaybackEvent>, ControlError> {
        let (tx, rx) = bounded(self.subscriber_capacity);
        self.send(ControlCommand::Subscribe(tx))?;
        Ok(rx)
    }

    pub fn status(&self) -> PlaybackStatus {
        PlaybackStatus::from_u8(self.shared.status.load(Ordering::Relaxed))
    }

    pub fn is_playing(&self) -> bool {
        self.status() == PlaybackStatus::Playing
    }

    /// Last dispatched step (0-15)
    pub fn current_step(&self) -> usize {
        self.shared.current_step.load(Ordering::Relaxed)
    }

    /// Effective tempo (pattern tempo or live override)
    pub fn tempo_bpm(&self) -> f64 {
        f64::from_bits(self.shared.tempo_bits.load(Ordering::Relaxed))
    }

    /// Effective swing (pattern swing or live override)
    pub fn swing_percent(&self) -> u8 {
        self.shared.swing.load(Ordering::Relaxed)
    }
}

impl Drop for PlaybackEngine {
    fn drop(&mut self) {
        let _ = self.command_tx.send(ControlCommand::Shutdown);
        if let Some(thread) = self.thread.take() {
            let _ = thread.join();
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum LoopAction {
    Continue,
    Shutdown,
}

/// A Note Off waiting for its gate to close
#[derive(Clone, Copy, Debug)]
struct PendingNoteOff {
    due: Instant,
    channel: u8,
    note: u8,
}

/// State owned by the playback thread
struct PlaybackLoop {
    sink: Box<dyn MidiSink>,
    instruments: InstrumentMap,
    curve: SharedCurve,
    command_rx: Receiver<ControlCommand>,
    shared: Arc<SharedState>,
    publisher: Publisher,
    pending: PendingCommands,

    status: PlaybackStatus,
    pattern: Option<Pattern>,
    tempo_override: Option<f64>,
    swing_override: Option<u8>,
    timer: StepTimer<SharedCurve>,
    /// Absolute step count since playback started
    tick: u64,
    /// Ordered by due time (every gate has the same length)
    note_offs: VecDeque<PendingNoteOff>,
}

impl PlaybackLoop {
    fn new(
        sink: Box<dyn MidiSink>,
        instruments: InstrumentMap,
        curve: SharedCurve,
        command_rx: Receiver<ControlCommand>,
        shared: Arc<SharedState>,
    ) -> Self {
        let timer = StepTimer::with_curve(Instant::now(), IDLE_TEMPO_BPM, 0, curve.clone());
        Self {
            sink,
            instruments,
            curve,
            command_rx,
            shared,
            publisher: Publisher::default(),
            pending: PendingCommands::default(),
            status: PlaybackStatus::Stopped,
            pattern: None,
            tempo_override: None,
            swing_override: None,
            timer,
            tick: 0,
            note_offs: VecDeque::new(),
        }
    }

    fn run(&mut self) {
        debug!("playback thread started");
        loop {
            if self.status == PlaybackStatus::Stopped && self.pending.is_empty() {
                // Idle: nothing to time, block until a command arrives
                match self.command_rx.recv() {
                    Ok(cmd) => self.pending.push(cmd),
                    Err(_) => break,
                }
            }
            if self.apply_commands() == LoopAction::Shutdown {
                break;
            }
            if self.status == PlaybackStatus::Stopped {
                continue;
            }

            let deadline = self.timer.deadline(self.tick);
            if self.wait_for(deadline) == WaitOutcome::Interrupted {
                continue;
            }

            // Commands that arrived during the wait apply to this step
            if self.apply_commands() == LoopAction::Shutdown {
                break;
            }
            if self.status == PlaybackStatus::Stopped {
                continue;
            }
            if self.skip_missed_steps(Instant::now()) {
                continue;
            }

            self.dispatch_step();
            self.tick += 1;
        }

        if self.status == PlaybackStatus::Playing {
            self.stop_playback();
        }
        debug!("playback thread stopped");
    }

    /// Drain the control channel and apply everything collected so far
    fn apply_commands(&mut self) -> LoopAction {
        loop {
            match self.command_rx.try_recv() {
                Ok(cmd) => self.pending.push(cmd),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.pending.push(ControlCommand::Shutdown);
                    break;
                }
            }
        }

        let pending = self.pending.take();
        if !pending.subscribers.is_empty() {
            for tx in pending.subscribers {
                self.publisher.add(tx);
            }
            debug!(subscribers = self.publisher.len(), "subscriber added");
        }

        if pending.stop_requested && self.status == PlaybackStatus::Playing {
            self.stop_playback();
        }

        if let Some(pattern) = pending.pattern {
            debug!(
                tempo = pattern.tempo_bpm(),
                swing = pattern.swing_percent(),
                "pattern replaced"
            );
            self.pattern = Some(pattern);
        }
        if pending.clear_overrides {
            self.tempo_override = None;
            self.swing_override = None;
        }
        if let Some(bpm) = pending.tempo {
            self.tempo_override = Some(bpm);
        }
        if let Some(percent) = pending.swing {
            self.swing_override = Some(percent);
        }

        if pending.transport == Some(Transport::Play) {
            if self.pattern.is_none() {
                warn!("play requested without a pattern");
            } else if self.status == PlaybackStatus::Stopped || pending.restart {
                self.start_playback();
            }
        }

        let (tempo, swing) = self.effective_params();
        if self.status == PlaybackStatus::Playing
            && (tempo != self.timer.tempo_bpm() || swing != self.timer.swing_percent())
        {
            info!(tempo, swing, step = bar_step(self.tick), "timing changed");
            self.timer.retime(self.tick, tempo, swing);
        }
        self.shared.store_params(tempo, swing);

        if pending.shutdown {
            LoopAction::Shutdown
        } else {
            LoopAction::Continue
        }
    }

    fn effective_params(&self) -> (f64, u8) {
        let tempo = self
            .tempo_override
            .or(self.pattern.as_ref().map(|p| p.tempo_bpm()))
            .unwrap_or(IDLE_TEMPO_BPM);
        let swing = self
            .swing_override
            .or(self.pattern.as_ref().map(|p| p.swing_percent()))
            .unwrap_or(0);
        (tempo, swing)
    }

    fn start_playback(&mut self) {
        let (tempo, swing) = self.effective_params();
        self.tick = 0;
        self.timer = StepTimer::with_curve(Instant::now(), tempo, swing, self.curve.clone());
        self.set_status(PlaybackStatus::Playing);
        info!(tempo, swing, "playback started");
    }

    fn stop_playback(&mut self) {
        // Release gated notes, then sweep every mapped note regardless
        while let Some(off) = self.note_offs.pop_front() {
            self.send(MidiMessage::NoteOff {
                channel: off.channel,
                note: off.note,
            });
        }
        let sweep: Vec<MidiMessage> = self
            .instruments
            .iter()
            .map(|(_, m)| MidiMessage::NoteOff {
                channel: m.channel,
                note: m.note,
            })
            .collect();
        for message in sweep {
            self.send(message);
        }
        self.forward_output_errors();

        self.tick = 0;
        self.shared.current_step.store(0, Ordering::Relaxed);
        self.set_status(PlaybackStatus::Stopped);
        info!("playback stopped");
    }

    fn set_status(&mut self, status: PlaybackStatus) {
        self.status = status;
        self.shared.status.store(status as u8, Ordering::Relaxed);
        self.publisher.publish(PlaybackEvent::StatusChanged(status));
    }

    /// Wait for `deadline`, releasing gated notes that fall due meanwhile
    fn wait_for(&mut self, deadline: Instant) -> WaitOutcome {
        loop {
            let target = match self.note_offs.front() {
                Some(off) if off.due < deadline => off.due,
                _ => deadline,
            };
            if wait_until(target, &self.command_rx, &mut self.pending) == WaitOutcome::Interrupted
            {
                return WaitOutcome::Interrupted;
            }
            let now = Instant::now();
            self.release_due_notes(now);
            if now >= deadline {
                return WaitOutcome::Reached;
            }
        }
    }

    fn release_due_notes(&mut self, now: Instant) {
        while let Some(off) = self.note_offs.front().copied() {
            if off.due > now {
                break;
            }
            self.note_offs.pop_front();
            self.send(MidiMessage::NoteOff {
                channel: off.channel,
                note: off.note,
            });
        }
    }

    /// Lost-step policy: never burst-replay steps that are over a step late
    ///
    /// Returns true when steps were skipped; the caller then waits for the
    /// re-anchored deadline.
    fn skip_missed_steps(&mut self, now: Instant) -> bool {
        let missed = self.timer.missed_steps(self.tick, now);
        if missed == 0 {
            return false;
        }
        warn!(
            missed,
            from_step = bar_step(self.tick),
            "playback overrun, skipping late steps"
        );
        self.tick += missed;
        self.timer.resync(self.tick, now);
        true
    }

    fn dispatch_step(&mut self) {
        let step = bar_step(self.tick);
        let now = Instant::now();

        let hits: Vec<_> = match &self.pattern {
            Some(pattern) => pattern.hits_at(step).collect(),
            None => Vec::new(),
        };
        for (id, velocity) in hits {
            let mapping = self.instruments.get(id);
            self.send(MidiMessage::NoteOn {
                channel: mapping.channel,
                note: mapping.note,
                velocity,
            });
            if mapping.explicit_note_off {
                self.note_offs.push_back(PendingNoteOff {
                    due: now + NOTE_GATE,
                    channel: mapping.channel,
                    note: mapping.note,
                });
            }
        }

        self.shared.current_step.store(step, Ordering::Relaxed);
        self.publisher.publish(PlaybackEvent::StepChanged(step));
        self.forward_output_errors();
    }

    fn send(&mut self, message: MidiMessage) {
        if let Err(e) = self.sink.send(message) {
            debug!("MIDI send failed: {}", e);
            self.publisher
                .publish(PlaybackEvent::OutputError(e.to_string()));
        }
    }

    fn forward_output_errors(&mut self) {
        for e in self.sink.drain_errors() {
            self.publisher
                .publish(PlaybackEvent::OutputError(e.to_string()));
        }
    }
}

impl Drop for PlaybackLoop {
    fn drop(&mut self) {
        // Reached with Playing only when the thread is unwinding
        if self.status == PlaybackStatus::Playing {
            error!("playback thread died while playing");
            self.status = PlaybackStatus::Stopped;
            self.shared
                .status
                .store(PlaybackStatus::Stopped as u8, Ordering::Relaxed);
            self.publisher
                .publish(PlaybackEvent::StatusChanged(PlaybackStatus::Stopped));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::OutputError;

    struct NullSink;

    impl MidiSink for NullSink {
        fn send(&mut self, _message: MidiMessage) -> Result<(), OutputError> {
            Ok(())
        }
    }

    #[test]
    fn test_clamp_tempo() {
        assert_eq!(clamp_tempo(120.0), Ok(120.0));
        assert_eq!(clamp_tempo(5.0), Ok(MIN_TEMPO_BPM));
        assert_eq!(clamp_tempo(999.0), Ok(MAX_TEMPO_BPM));
        assert_eq!(clamp_tempo(0.0), Err(ControlError::InvalidTempo(0.0)));
        assert!(clamp_tempo(f64::NAN).is_err());
        assert!(clamp_tempo(f64::INFINITY).is_err());
    }

    #[test]
    fn test_clamp_swing() {
        assert_eq!(clamp_swing(-10), 0);
        assert_eq!(clamp_swing(55), 55);
        assert_eq!(clamp_swing(250), 100);
    }

    #[test]
    fn test_engine_creation() {
        let engine = PlaybackEngine::new(NullSink).unwrap();
        assert_eq!(engine.status(), PlaybackStatus::Stopped);
        assert!(!engine.is_playing());
        assert_eq!(engine.current_step(), 0);
        assert_eq!(engine.tempo_bpm(), IDLE_TEMPO_BPM);
    }

    #[test]
    fn test_rejected_tempo_leaves_state() {
        let engine = PlaybackEngine::new(NullSink).unwrap();
        assert_eq!(
            engine.set_tempo(-1.0),
            Err(ControlError::InvalidTempo(-1.0))
        );
        assert_eq!(engine.tempo_bpm(), IDLE_TEMPO_BPM);
    }

    #[test]
    fn test_stop_while_stopped_is_harmless() {
        let engine = PlaybackEngine::new(NullSink).unwrap();
        assert!(engine.stop().is_ok());
        assert!(engine.stop().is_ok());
        assert!(!engine.is_playing());
    }
}
