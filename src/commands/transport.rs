//! Transport REPL commands (load, play, stop, tempo, swing, status)

use crate::commands::{CommandContext, CommandResult};
use crate::sequencer::PlaybackStatus;
use anyhow::{Context, Result};
use colored::*;
use drumbeat_core::types::Pattern;
use std::path::Path;

/// Read and validate a JSON pattern file
pub fn read_pattern_file(path: impl AsRef<Path>) -> Result<Pattern> {
    let path = path.as_ref();
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let pattern = Pattern::from_json(&json)
        .with_context(|| format!("invalid pattern in {}", path.display()))?;
    Ok(pattern)
}

fn describe(pattern: &Pattern) -> String {
    let names: Vec<String> = pattern
        .tracks()
        .filter(|(_, steps)| steps.iter().any(|&v| v > 0))
        .map(|(id, _)| id.to_string())
        .collect();
    format!(
        "{:.1} BPM, swing {}%, [{}]",
        pattern.tempo_bpm(),
        pattern.swing_percent(),
        names.join(" ")
    )
}

/// Handle `load <file>` - read a pattern and start playing it
pub fn cmd_load(args: &str, ctx: &mut CommandContext) -> CommandResult {
    if args.is_empty() {
        return CommandResult::Error("Usage: load <pattern.json>".to_string());
    }
    let pattern = match read_pattern_file(args) {
        Ok(p) => p,
        Err(e) => return CommandResult::Error(format!("{:#}", e)),
    };
    let summary = describe(&pattern);
    if let Err(e) = ctx.engine.play(pattern.clone()) {
        return CommandResult::Error(e.to_string());
    }
    ctx.pattern = Some(pattern);
    CommandResult::Message(format!("▶ Playing {} ({})", args.green(), summary))
}

/// Handle `swap <file>` - replace the running pattern without restarting the bar
pub fn cmd_swap(args: &str, ctx: &mut CommandContext) -> CommandResult {
    if args.is_empty() {
        return CommandResult::Error("Usage: swap <pattern.json>".to_string());
    }
    let pattern = match read_pattern_file(args) {
        Ok(p) => p,
        Err(e) => return CommandResult::Error(format!("{:#}", e)),
    };
    let summary = describe(&pattern);
    if let Err(e) = ctx.engine.replace_pattern(pattern.clone()) {
        return CommandResult::Error(e.to_string());
    }
    ctx.pattern = Some(pattern);
    CommandResult::Message(format!("⇄ Swapped in {} ({})", args.green(), summary))
}

fn play_loaded(ctx: &mut CommandContext, from_start: bool) -> CommandResult {
    let Some(pattern) = ctx.pattern.clone() else {
        return CommandResult::Error("No pattern loaded. Use 'load <file>' first.".to_string());
    };
    let sent = if from_start {
        ctx.engine.play_from_start(pattern)
    } else {
        ctx.engine.play(pattern)
    };
    match sent {
        Ok(()) => CommandResult::Success,
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

/// Handle `play` - resume the loaded pattern
pub fn cmd_play(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    play_loaded(ctx, false)
}

/// Handle `restart` - play the loaded pattern from step 1
pub fn cmd_restart(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    play_loaded(ctx, true)
}

/// Handle `stop`
pub fn cmd_stop(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    match ctx.engine.stop() {
        Ok(()) => CommandResult::Message("■ Stopped".to_string()),
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

/// Handle `tempo [bpm]`
pub fn cmd_tempo(args: &str, ctx: &mut CommandContext) -> CommandResult {
    if args.is_empty() {
        return CommandResult::Message(format!(
            "Current tempo: {:.1} BPM",
            ctx.engine.tempo_bpm()
        ));
    }
    let Ok(bpm) = args.parse::<f64>() else {
        return CommandResult::Error("Usage: tempo <bpm>".to_string());
    };
    match ctx.engine.set_tempo(bpm) {
        Ok(()) => CommandResult::Message(
            format!("Tempo set to {:.1} BPM", bpm.clamp(20.0, 300.0))
                .bright_green()
                .to_string(),
        ),
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

/// Handle `swing [0-100]`
pub fn cmd_swing(args: &str, ctx: &mut CommandContext) -> CommandResult {
    if args.is_empty() {
        return CommandResult::Message(format!(
            "Current swing: {}%",
            ctx.engine.swing_percent()
        ));
    }
    let Ok(percent) = args.trim_end_matches('%').parse::<i32>() else {
        return CommandResult::Error("Usage: swing <0-100>".to_string());
    };
    match ctx.engine.set_swing(percent) {
        Ok(()) => CommandResult::Message(
            format!("Swing set to {}%", percent.clamp(0, 100))
                .bright_green()
                .to_string(),
        ),
        Err(e) => CommandResult::Error(e.to_string()),
    }
}

/// Handle `status`
pub fn cmd_status(_args: &str, ctx: &mut CommandContext) -> CommandResult {
    let engine = &ctx.engine;
    let transport = match engine.status() {
        PlaybackStatus::Playing => "▶ playing".bright_green(),
        PlaybackStatus::Stopped => "■ stopped".yellow(),
    };
    CommandResult::Message(format!(
        "{}  step {:>2}/16  {:.1} BPM  swing {}%",
        transport,
        engine.current_step() + 1,
        engine.tempo_bpm(),
        engine.swing_percent()
    ))
}
