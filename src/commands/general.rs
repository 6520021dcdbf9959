//! General REPL commands (help, quit, watch)

use crate::commands::{CommandContext, CommandResult};
use colored::*;

/// Handle `help` command
pub fn cmd_help(_args: &str, _ctx: &mut CommandContext) -> CommandResult {
    print_help();
    CommandResult::Success
}

/// Handle `quit` or `exit` command
pub fn cmd_quit(_args: &str, _ctx: &mut CommandContext) -> CommandResult {
    CommandResult::Exit
}

/// Handle `watch <file>` command
pub fn cmd_watch(args: &str, _ctx: &mut CommandContext) -> CommandResult {
    if args.is_empty() {
        return CommandResult::Error("Usage: watch <pattern.json>".to_string());
    }
    CommandResult::Watch(args.to_string())
}

fn print_help() {
    println!("{}", "🥁 Drumbeat Help".bold());
    println!("{}", "================".bold());
    println!();
    println!("{}", "Patterns:".green());
    println!("  {}   - Load a JSON pattern and play it", "load <file>".cyan());
    println!(
        "  {}   - Replace the playing pattern at the next step",
        "swap <file>".cyan()
    );
    println!(
        "  {}  - Swap in the file every time it changes",
        "watch <file>".cyan()
    );
    println!();
    println!("{}", "Transport:".green());
    println!("  {}          - Play the loaded pattern", "play".cyan());
    println!("  {}       - Play from step 1", "restart".cyan());
    println!("  {}          - Stop and silence all notes", "stop".cyan());
    println!("  {}   - Show or set tempo (20-300)", "tempo [bpm]".cyan());
    println!("  {} - Show or set swing (0-100)", "swing [0-100]".cyan());
    println!("  {}        - Transport, step, tempo and swing", "status".cyan());
    println!();
    println!("{}", "MIDI:".green());
    println!("  {}            - List MIDI output ports", "midi devices".cyan());
    println!("  {}     - Connect to a port", "midi connect <port>".cyan());
    println!("  {}         - Disconnect", "midi disconnect".cyan());
    println!("  {}             - Show connection", "midi status".cyan());
    println!(
        "  {} - Fire one hit (e.g. midi test BD 100)",
        "midi test <inst> [vel]".cyan()
    );
    println!();
    println!(
        "{} BD SD LT MT HT RS CP CH OH CC RC",
        "Instruments:".green()
    );
    println!();
    println!("{}", "Pattern file:".green());
    println!(
        "  {}",
        r#"{"bpm": 120, "swing": 20, "instruments": {"BD": {"steps": [100,0,0,0,...]}}}"#.dimmed()
    );
    println!();
    println!("  {} / {}  - Leave", "quit".cyan(), "exit".cyan());
}
