//! Interactive command line for the drum sequencer

use crate::commands::transport::read_pattern_file;
use crate::commands::{create_registry, CommandContext, CommandResult};
use crate::config::Config;
use crate::midi::MidiOutputHandle;
use crate::repl::watcher::FileWatcher;
use crate::sequencer::{EngineOptions, PlaybackEngine, PlaybackEvent};
use anyhow::{anyhow, Result};
use colored::*;
use crossbeam_channel::{unbounded, Receiver, Sender};
use drumbeat_core::types::{InstrumentMap, Pattern};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use tracing::{info, warn};

pub mod watcher;

/// Types of events the REPL loop handles
enum ReplEvent {
    Input(Result<String, ReadlineError>),
}

pub struct Repl {
    editor: Option<DefaultEditor>,
    engine: Arc<PlaybackEngine>,
    midi_handle: MidiOutputHandle,
    instruments: InstrumentMap,
    /// Engine notifications; only output errors are shown
    events: Receiver<PlaybackEvent>,

    tx_input: Sender<ReplEvent>,
    rx_input: Receiver<ReplEvent>,
    tx_watcher: Sender<PathBuf>,
    rx_watcher: Receiver<PathBuf>,

    watcher: Option<FileWatcher>,
    /// Played as soon as the loop starts
    initial_pattern: Option<Pattern>,
}

impl Repl {
    pub fn new(config: &Config) -> Result<Self> {
        let editor = DefaultEditor::new()?;
        let instruments = config.instrument_map();

        // A missing port is not fatal: the output thread keeps retrying
        let midi_handle = MidiOutputHandle::open(Some(&config.midi_port))?;
        let engine = PlaybackEngine::with_options(
            midi_handle.clone(),
            EngineOptions {
                instruments: instruments.clone(),
                subscriber_capacity: config.subscriber_capacity,
                ..EngineOptions::default()
            },
        )?;
        let events = engine.subscribe()?;

        let (tx_input, rx_input) = unbounded();
        let (tx_watcher, rx_watcher) = unbounded();

        Ok(Repl {
            editor: Some(editor),
            engine: Arc::new(engine),
            midi_handle,
            instruments,
            events,
            tx_input,
            rx_input,
            tx_watcher,
            rx_watcher,
            watcher: None,
            initial_pattern: None,
        })
    }

    /// Load a pattern file to start playing when the REPL starts
    pub fn preload(&mut self, path: impl AsRef<Path>) -> Result<()> {
        self.initial_pattern = Some(read_pattern_file(path)?);
        Ok(())
    }

    fn start_watching(&mut self, path: &str) {
        if self.watcher.is_none() {
            match FileWatcher::new(self.tx_watcher.clone()) {
                Ok(w) => self.watcher = Some(w),
                Err(e) => {
                    println!("{} Failed to create watcher: {}", "Error:".red(), e);
                    return;
                }
            }
        }
        if let Some(w) = &mut self.watcher {
            match w.watch(path) {
                Ok(()) => {
                    println!(
                        "{} Watching {} for changes...",
                        "👀".bright_cyan(),
                        path.bright_green()
                    );
                }
                Err(e) => println!("{} Failed to watch {}: {}", "Error:".red(), path, e),
            }
        }
    }

    /// Swap in a changed pattern file without restarting the bar
    fn reload(&self, path: &Path, ctx: &mut CommandContext) {
        println!("{} File changed: {}", "⚡".bright_yellow(), path.display());
        match read_pattern_file(path) {
            Ok(pattern) => match ctx.engine.replace_pattern(pattern.clone()) {
                Ok(()) => {
                    info!(path = %path.display(), "pattern reloaded");
                    ctx.pattern = Some(pattern);
                    println!("{} Reloaded successfully", "✓".bright_green());
                }
                Err(e) => println!("{} {}", "Error:".red(), e),
            },
            // The previous pattern keeps playing
            Err(e) => println!("{} {:#}", "Error:".red(), e),
        }
    }

    /// Start the REPL loop
    pub fn run(&mut self) -> Result<()> {
        println!(
            "{} {}",
            "🥁".bright_yellow(),
            "Drumbeat MIDI Sequencer".bright_cyan().bold()
        );
        println!(
            "Type '{}' for commands, '{}' or {} to exit.\n",
            "help".bright_green(),
            "quit".bright_red(),
            "Ctrl+C".bright_red()
        );

        let mut editor = self
            .editor
            .take()
            .ok_or_else(|| anyhow!("REPL is already running"))?;
        let tx_input = self.tx_input.clone();

        thread::spawn(move || loop {
            let prompt = format!("{} ", "drumbeat>".bright_magenta().bold());
            match editor.readline(&prompt) {
                Ok(line) => {
                    let line = line.trim().to_string();
                    if !line.is_empty() {
                        let _ = editor.add_history_entry(&line);
                    }
                    if tx_input.send(ReplEvent::Input(Ok(line))).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    let _ = tx_input.send(ReplEvent::Input(Err(err)));
                    break;
                }
            }
        });

        let registry = create_registry();
        let mut ctx = CommandContext::new_with_midi(
            self.engine.clone(),
            self.instruments.clone(),
            self.midi_handle.clone(),
        );
        if let Some(pattern) = self.initial_pattern.take() {
            self.engine.play(pattern.clone())?;
            ctx.pattern = Some(pattern);
        }

        loop {
            crossbeam_channel::select! {
                recv(self.rx_input) -> msg => match msg {
                    Ok(ReplEvent::Input(Ok(line))) => {
                        if line.is_empty() {
                            continue;
                        }
                        match registry.execute(&line, &mut ctx) {
                            CommandResult::Success => {}
                            CommandResult::Message(msg) => println!("{}", msg),
                            CommandResult::Exit => {
                                println!("{} 🥁", "Goodbye!".bright_cyan());
                                break;
                            }
                            CommandResult::Error(e) => {
                                println!("{} {}", "Error:".bright_red().bold(), e.red());
                            }
                            CommandResult::Watch(path) => self.start_watching(&path),
                            CommandResult::NotACommand => println!(
                                "{} Unknown command '{}'. Type 'help' for a list.",
                                "Error:".bright_red().bold(),
                                line
                            ),
                        }
                    }
                    Ok(ReplEvent::Input(Err(ReadlineError::Interrupted)))
                    | Ok(ReplEvent::Input(Err(ReadlineError::Eof))) => {
                        println!("{} 🥁", "Goodbye!".bright_cyan());
                        break;
                    }
                    Ok(ReplEvent::Input(Err(err))) => {
                        println!(
                            "{} {}",
                            "Error reading input:".bright_red().bold(),
                            err.to_string().red()
                        );
                        break;
                    }
                    Err(_) => break,
                },

                recv(self.rx_watcher) -> msg => match msg {
                    Ok(path) => self.reload(&path, &mut ctx),
                    Err(_) => break,
                },

                recv(self.events) -> msg => match msg {
                    Ok(PlaybackEvent::OutputError(e)) => warn!("MIDI output: {}", e),
                    Ok(_) => {}
                    Err(_) => break,
                }
            }
        }

        if let Some(w) = &mut self.watcher {
            w.unwatch_all();
        }
        self.engine.stop()?;
        Ok(())
    }
}

/// Convenience function to start the REPL
pub fn start(config: &Config, pattern_file: Option<&Path>) -> Result<()> {
    let mut repl = Repl::new(config)?;
    if let Some(path) = pattern_file {
        repl.preload(path)?;
    }
    let result = repl.run();
    let midi_handle = repl.midi_handle.clone();
    // Dropping the engine joins the playback thread before the output closes
    drop(repl);
    midi_handle.shutdown();
    result
}
