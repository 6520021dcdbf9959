//! Command registry for REPL commands
//!
//! Provides a clean, extensible pattern for handling REPL commands.

pub mod general;
pub mod midi;
pub mod transport;

use crate::midi::MidiOutputHandle;
use crate::sequencer::PlaybackEngine;
use drumbeat_core::types::{InstrumentMap, Pattern};
use std::sync::Arc;

/// Result of executing a command
#[derive(Debug)]
pub enum CommandResult {
    /// Command executed successfully, continue REPL
    Success,
    /// Command executed, show this message
    Message(String),
    /// Exit the REPL
    Exit,
    /// No command matches the input
    NotACommand,
    /// Error occurred
    Error(String),
    /// Watch a pattern file for changes
    Watch(String),
}

/// Context passed to command handlers
pub struct CommandContext {
    pub engine: Arc<PlaybackEngine>,
    pub midi_handle: Option<MidiOutputHandle>,
    pub instruments: InstrumentMap,
    /// Last pattern loaded from a file, replayed by `play`/`restart`
    pub pattern: Option<Pattern>,
}

impl CommandContext {
    pub fn new(engine: Arc<PlaybackEngine>, instruments: InstrumentMap) -> Self {
        Self {
            engine,
            midi_handle: None,
            instruments,
            pattern: None,
        }
    }

    /// Create a new context with MIDI support
    pub fn new_with_midi(
        engine: Arc<PlaybackEngine>,
        instruments: InstrumentMap,
        midi_handle: MidiOutputHandle,
    ) -> Self {
        Self {
            engine,
            midi_handle: Some(midi_handle),
            instruments,
            pattern: None,
        }
    }
}

/// A command handler function
pub type CommandHandler = fn(&str, &mut CommandContext) -> CommandResult;

/// Registry of available commands
pub struct CommandRegistry {
    /// Sorted by prefix length descending for longest-match-first lookup
    commands: Vec<(String, CommandHandler)>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self {
            commands: Vec::new(),
        }
    }

    /// Register a command with its prefix
    pub fn register(&mut self, prefix: &str, handler: CommandHandler) {
        self.commands.push((prefix.to_string(), handler));
        self.commands.sort_by(|a, b| b.0.len().cmp(&a.0.len()));
    }

    /// Execute a command, returning NotACommand if no match found
    pub fn execute(&self, input: &str, ctx: &mut CommandContext) -> CommandResult {
        for (prefix, handler) in &self.commands {
            if input == prefix || input.starts_with(&format!("{} ", prefix)) {
                let args = input[prefix.len()..].trim();
                return handler(args, ctx);
            }
        }
        CommandResult::NotACommand
    }

    pub fn list_commands(&self) -> Vec<&str> {
        self.commands.iter().map(|(p, _)| p.as_str()).collect()
    }
}

impl Default for CommandRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a fully populated command registry with all built-in commands
pub fn create_registry() -> CommandRegistry {
    let mut registry = CommandRegistry::new();

    // Transport
    registry.register("load", transport::cmd_load);
    registry.register("swap", transport::cmd_swap);
    registry.register("play", transport::cmd_play);
    registry.register("restart", transport::cmd_restart);
    registry.register("stop", transport::cmd_stop);
    registry.register("tempo", transport::cmd_tempo);
    registry.register("swing", transport::cmd_swing);
    registry.register("status", transport::cmd_status);

    // MIDI commands
    registry.register("midi devices", midi::cmd_midi_devices);
    registry.register("midi connect", midi::cmd_midi_connect);
    registry.register("midi disconnect", midi::cmd_midi_disconnect);
    registry.register("midi status", midi::cmd_midi_status);
    registry.register("midi test", midi::cmd_midi_test);

    // General commands
    registry.register("help", general::cmd_help);
    registry.register("quit", general::cmd_quit);
    registry.register("exit", general::cmd_quit);
    registry.register("watch", general::cmd_watch);

    registry
}
