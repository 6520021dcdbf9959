//! MIDI REPL commands

use crate::commands::{CommandContext, CommandResult};
use crate::midi::MidiOutputHandle;
use colored::*;
use drumbeat_core::types::InstrumentId;

/// Handle `midi devices` command - list available MIDI output ports
pub fn cmd_midi_devices(_args: &str, _ctx: &mut CommandContext) -> CommandResult {
    match MidiOutputHandle::list_ports() {
        Ok(ports) => {
            if ports.is_empty() {
                CommandResult::Message(
                    "No MIDI output ports found. Make sure the drum machine is connected."
                        .yellow()
                        .to_string(),
                )
            } else {
                let mut output = format!("{}\n", "🎹 Available MIDI Output Ports:".bold());
                for (i, port) in ports.iter().enumerate() {
                    output.push_str(&format!("  {}. {}\n", i + 1, port.cyan()));
                }
                output.push_str(&format!(
                    "\n{} {}",
                    "Use".dimmed(),
                    "midi connect <port name>".green()
                ));
                CommandResult::Message(output)
            }
        }
        Err(e) => CommandResult::Error(format!("Failed to list MIDI ports: {}", e)),
    }
}

/// Handle `midi connect <port>` command - connect to a MIDI output port
pub fn cmd_midi_connect(args: &str, ctx: &mut CommandContext) -> CommandResult {
    if args.is_empty() {
        return CommandResult::Error(
            "Usage: midi connect <port name>\nUse 'midi devices' to see available ports"
                .to_string(),
        );
    }

    match &ctx.midi_handle {
        Some(handle) => match handle.connect(args) {
            Ok(name) => {
                CommandResult::Message(format!("🎹 Connected to MIDI port: {}", name.green()))
            }
            Err(e) => CommandResult::Error(format!("Failed to connect to '{}': {}", args, e)),
        },
        None => CommandResult::Error("MIDI output not initialized".to_string()),
    }
}

/// Handle `midi disconnect` command
pub fn cmd_midi_disconnect(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    match &ctx.midi_handle {
        Some(handle) => match handle.disconnect() {
            Ok(()) => CommandResult::Message("🎹 Disconnected from MIDI".to_string()),
            Err(e) => CommandResult::Error(format!("Failed to disconnect: {}", e)),
        },
        None => CommandResult::Error("MIDI output not initialized".to_string()),
    }
}

/// Handle `midi status` command
pub fn cmd_midi_status(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    match &ctx.midi_handle {
        Some(handle) => match handle.connected_port() {
            Some(port) if handle.is_connected() => {
                CommandResult::Message(format!("🎹 Connected to {}", port.green()))
            }
            _ => CommandResult::Message("🎹 Not connected".yellow().to_string()),
        },
        None => CommandResult::Error("MIDI output not initialized".to_string()),
    }
}

/// Handle `midi test <instrument> [velocity]` - fire a single hit
pub fn cmd_midi_test(args: &str, ctx: &mut CommandContext) -> CommandResult {
    let mut parts = args.split_whitespace();
    let instrument = match parts.next().map(str::parse::<InstrumentId>) {
        Some(Ok(id)) => id,
        Some(Err(e)) => return CommandResult::Error(e.to_string()),
        None => InstrumentId::BD,
    };
    let velocity = match parts.next().map(str::parse::<u8>) {
        Some(Ok(v)) if (1..=127).contains(&v) => v,
        Some(_) => return CommandResult::Error("Velocity must be 1-127".to_string()),
        None => 100,
    };

    match &ctx.midi_handle {
        Some(handle) => {
            if !handle.is_connected() {
                return CommandResult::Error(
                    "Not connected to MIDI. Use 'midi connect <port>' first.".to_string(),
                );
            }
            let mapping = ctx.instruments.get(instrument);
            match handle.send_test_note(&ctx.instruments, instrument, velocity) {
                Ok(()) => CommandResult::Message(format!(
                    "🥁 Sent {} (note {}, channel {}, velocity {})",
                    instrument.code().cyan(),
                    mapping.note,
                    mapping.channel + 1,
                    velocity
                )),
                Err(e) => CommandResult::Error(format!("Failed to send test note: {}", e)),
            }
        }
        None => CommandResult::Error("MIDI output not initialized".to_string()),
    }
}
