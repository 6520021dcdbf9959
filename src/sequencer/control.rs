//! Control channel between callers and the playback thread
//!
//! Inbound commands travel over an unbounded channel, so submitting one never
//! blocks the caller. The playback thread folds everything it drains into a
//! `PendingCommands` where the latest value of each kind wins. Outbound events
//! go to bounded per-subscriber queues and are dropped when a queue is full.

use crossbeam_channel::{Sender, TrySendError};
use drumbeat_core::types::Pattern;

/// Transport state of the sequencer
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum PlaybackStatus {
    Stopped = 0,
    Playing = 1,
}

impl PlaybackStatus {
    pub(crate) fn from_u8(value: u8) -> Self {
        if value == PlaybackStatus::Playing as u8 {
            PlaybackStatus::Playing
        } else {
            PlaybackStatus::Stopped
        }
    }
}

/// Notification published by the playback thread
#[derive(Clone, Debug, PartialEq)]
pub enum PlaybackEvent {
    /// A step (0-15) has just been dispatched
    StepChanged(usize),
    StatusChanged(PlaybackStatus),
    /// A MIDI message could not be delivered; playback continues
    OutputError(String),
}

/// Rejected control operation
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ControlError {
    #[error("tempo {0} is not a usable BPM value")]
    InvalidTempo(f64),

    #[error("playback engine is not running")]
    Disconnected,
}

#[derive(Debug)]
pub(crate) enum ControlCommand {
    Play { pattern: Pattern, restart: bool },
    Stop,
    SetTempo(f64),
    SetSwing(u8),
    ReplacePattern(Pattern),
    Subscribe(Sender<PlaybackEvent>),
    Shutdown,
}

impl ControlCommand {
    /// Commands that must cut a deadline wait short
    pub(crate) fn interrupts_wait(&self) -> bool {
        matches!(self, ControlCommand::Stop | ControlCommand::Shutdown)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum Transport {
    Play,
    Stop,
}

/// Commands received since the last step boundary, coalesced per kind
#[derive(Debug, Default)]
pub(crate) struct PendingCommands {
    /// Last transport request
    pub transport: Option<Transport>,
    /// A stop was requested at some point, even if a play followed it
    pub stop_requested: bool,
    /// Start the bar from step 0 even if already playing
    pub restart: bool,
    pub pattern: Option<Pattern>,
    /// The new pattern's tempo/swing replace any live overrides
    pub clear_overrides: bool,
    pub tempo: Option<f64>,
    pub swing: Option<u8>,
    pub subscribers: Vec<Sender<PlaybackEvent>>,
    pub shutdown: bool,
}

impl PendingCommands {
    pub fn push(&mut self, cmd: ControlCommand) {
        match cmd {
            ControlCommand::Play { pattern, restart } => {
                // Stop followed by play behaves like a fresh start
                self.restart |= restart || self.transport == Some(Transport::Stop);
                self.transport = Some(Transport::Play);
                self.set_pattern(pattern);
            }
            ControlCommand::Stop => {
                self.transport = Some(Transport::Stop);
                self.stop_requested = true;
                self.restart = false;
            }
            ControlCommand::SetTempo(bpm) => self.tempo = Some(bpm),
            ControlCommand::SetSwing(percent) => self.swing = Some(percent),
            ControlCommand::ReplacePattern(pattern) => self.set_pattern(pattern),
            ControlCommand::Subscribe(tx) => self.subscribers.push(tx),
            ControlCommand::Shutdown => self.shutdown = true,
        }
    }

    fn set_pattern(&mut self, pattern: Pattern) {
        self.pattern = Some(pattern);
        self.clear_overrides = true;
        // Overrides queued before the pattern are superseded by it
        self.tempo = None;
        self.swing = None;
    }

    pub fn is_empty(&self) -> bool {
        self.transport.is_none()
            && !self.stop_requested
            && self.pattern.is_none()
            && self.tempo.is_none()
            && self.swing.is_none()
            && self.subscribers.is_empty()
            && !self.shutdown
    }

    pub fn take(&mut self) -> Self {
        std::mem::take(self)
    }
}

/// Fan-out of playback events to subscribers
#[derive(Debug, Default)]
pub(crate) struct Publisher {
    subscribers: Vec<Sender<PlaybackEvent>>,
}

impl Publisher {
    pub fn add(&mut self, tx: Sender<PlaybackEvent>) {
        self.subscribers.push(tx);
    }

    /// Deliver without blocking; full queues miss this event, closed ones are removed
    pub fn publish(&mut self, event: PlaybackEvent) {
        self.subscribers
            .retain(|tx| match tx.try_send(event.clone()) {
                Ok(()) | Err(TrySendError::Full(_)) => true,
                Err(TrySendError::Disconnected(_)) => false,
            });
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }
}
