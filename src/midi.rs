//! MIDI output for drumbeat
//!
//! The playback thread never touches a MIDI port directly. It hands messages
//! to a `MidiSink`; the midir-backed `MidiOutputHandle` forwards them over a
//! channel to a dedicated output thread that owns the connection, so a slow
//! or missing device can never stall step timing.

use anyhow::{anyhow, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use drumbeat_core::types::{InstrumentId, InstrumentMap};
use midir::{MidiOutput, MidiOutputConnection, MidiOutputPort};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const CLIENT_NAME: &str = "drumbeat";

/// Minimum time between reconnect attempts while the port is missing
const RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Queued output errors kept for `drain_errors`
const ERROR_QUEUE_CAPACITY: usize = 64;

/// A channel voice message understood by drum machines
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MidiMessage {
    /// Note On: channel (0-15), note (0-127), velocity (1-127)
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Note Off: channel (0-15), note (0-127)
    NoteOff { channel: u8, note: u8 },
    /// All Notes Off (CC 123) on a channel
    AllNotesOff { channel: u8 },
}

impl MidiMessage {
    /// Raw three-byte encoding
    pub fn to_bytes(&self) -> [u8; 3] {
        match *self {
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => [0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOff { channel, note } => [0x80 | (channel & 0x0F), note & 0x7F, 0],
            MidiMessage::AllNotesOff { channel } => [0xB0 | (channel & 0x0F), 123, 0],
        }
    }
}

/// Failure to deliver a MIDI message
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OutputError {
    #[error("no MIDI output port configured")]
    NoPort,

    #[error("MIDI port '{0}' is not connected")]
    NotConnected(String),

    #[error("MIDI send failed: {0}")]
    Send(String),

    #[error("MIDI output thread has shut down")]
    Closed,
}

/// Destination for the playback thread's MIDI messages
///
/// `send` must return promptly: implementations queue or drop, never block
/// on the device.
pub trait MidiSink: Send {
    fn send(&mut self, message: MidiMessage) -> Result<(), OutputError>;

    /// Failures that happened after `send` returned (asynchronous delivery)
    fn drain_errors(&mut self) -> Vec<OutputError> {
        Vec::new()
    }
}

/// Commands that can be sent to the MIDI output thread
#[derive(Debug, Clone)]
enum MidiCommand {
    /// Connect to a MIDI port by name (partial match)
    Connect { port_name: String },
    Send(MidiMessage),
    /// Disconnect and forget the wanted port
    Disconnect,
    Shutdown,
}

#[derive(Debug, Default)]
struct OutputState {
    connected: AtomicBool,
    port_name: Mutex<Option<String>>,
}

fn find_port(midi_out: &MidiOutput, port_name: &str) -> Option<(MidiOutputPort, String)> {
    midi_out.ports().into_iter().find_map(|p| {
        let name = midi_out.port_name(&p).ok()?;
        name.contains(port_name).then_some((p, name))
    })
}

/// Internal MIDI output handler that owns the connection
struct MidiOutputInternal {
    connection: Option<MidiOutputConnection>,
    wanted_port: Option<String>,
    last_attempt: Option<Instant>,
    command_rx: Receiver<MidiCommand>,
    error_tx: Sender<OutputError>,
    state: Arc<OutputState>,
}

impl MidiOutputInternal {
    fn connect(&mut self, port_name: &str) -> Result<()> {
        self.last_attempt = Some(Instant::now());
        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        let (port, actual_name) = find_port(&midi_out, port_name)
            .ok_or_else(|| anyhow!("MIDI port '{}' not found", port_name))?;

        let connection = midi_out
            .connect(&port, "drumbeat-out")
            .map_err(|e| anyhow!("{}", e))?;
        self.connection = Some(connection);
        self.state.connected.store(true, Ordering::Relaxed);
        if let Ok(mut name) = self.state.port_name.lock() {
            *name = Some(actual_name.clone());
        }
        info!(port = %actual_name, "MIDI output connected");
        Ok(())
    }

    fn drop_connection(&mut self) {
        self.connection = None;
        self.state.connected.store(false, Ordering::Relaxed);
        if let Ok(mut name) = self.state.port_name.lock() {
            *name = None;
        }
    }

    fn retry_due(&self) -> bool {
        self.last_attempt
            .map(|t| t.elapsed() >= RETRY_INTERVAL)
            .unwrap_or(true)
    }

    fn report(&self, error: OutputError) {
        // A full queue means nobody is draining; dropping is fine
        let _ = self.error_tx.try_send(error);
    }

    fn send(&mut self, message: MidiMessage) {
        if self.connection.is_none() {
            match self.wanted_port.clone() {
                None => return self.report(OutputError::NoPort),
                Some(port) if self.retry_due() => {
                    if let Err(e) = self.connect(&port) {
                        debug!(port = %port, "MIDI reconnect failed: {}", e);
                    }
                }
                Some(_) => {}
            }
        }

        let Some(conn) = &mut self.connection else {
            let port = self.wanted_port.clone().unwrap_or_default();
            return self.report(OutputError::NotConnected(port));
        };
        if let Err(e) = conn.send(&message.to_bytes()) {
            warn!("MIDI send failed, dropping connection: {}", e);
            self.report(OutputError::Send(e.to_string()));
            self.drop_connection();
        }
    }

    fn all_notes_off(&mut self) {
        if let Some(conn) = &mut self.connection {
            for channel in 0..16u8 {
                let _ = conn.send(&MidiMessage::AllNotesOff { channel }.to_bytes());
            }
        }
    }

    fn run(&mut self) {
        while let Ok(cmd) = self.command_rx.recv() {
            match cmd {
                MidiCommand::Connect { port_name } => {
                    self.wanted_port = Some(port_name.clone());
                    if let Err(e) = self.connect(&port_name) {
                        warn!("MIDI connect error (will retry on send): {}", e);
                    }
                }
                MidiCommand::Send(message) => self.send(message),
                MidiCommand::Disconnect => {
                    self.wanted_port = None;
                    self.drop_connection();
                    info!("MIDI output disconnected");
                }
                MidiCommand::Shutdown => break,
            }
        }
        self.all_notes_off();
        self.drop_connection();
        debug!("MIDI output thread stopped");
    }
}

/// Cloneable handle to the MIDI output thread
///
/// Sending is fire-and-forget: messages are queued for the output thread,
/// and delivery failures come back through `drain_errors`.
#[derive(Clone)]
pub struct MidiOutputHandle {
    command_tx: Sender<MidiCommand>,
    error_rx: Receiver<OutputError>,
    state: Arc<OutputState>,
    thread: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MidiOutputHandle {
    /// Start the output thread, optionally connecting to a port
    ///
    /// A port that cannot be opened yet is not an error: the output thread
    /// keeps retrying as messages arrive.
    pub fn open(port_name: Option<&str>) -> Result<Self> {
        let (command_tx, command_rx) = unbounded();
        let (error_tx, error_rx) = bounded(ERROR_QUEUE_CAPACITY);
        let state = Arc::new(OutputState::default());

        let mut internal = MidiOutputInternal {
            connection: None,
            wanted_port: None,
            last_attempt: None,
            command_rx,
            error_tx,
            state: state.clone(),
        };
        let thread = thread::Builder::new()
            .name("drumbeat-midi".to_string())
            .spawn(move || internal.run())?;

        let handle = Self {
            command_tx,
            error_rx,
            state,
            thread: Arc::new(Mutex::new(Some(thread))),
        };
        if let Some(port) = port_name {
            handle.queue(MidiCommand::Connect {
                port_name: port.to_string(),
            })?;
        }
        Ok(handle)
    }

    fn queue(&self, cmd: MidiCommand) -> Result<(), OutputError> {
        self.command_tx.send(cmd).map_err(|_| OutputError::Closed)
    }

    /// List available MIDI output ports
    pub fn list_ports() -> Result<Vec<String>> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        Ok(midi_out
            .ports()
            .iter()
            .filter_map(|p| midi_out.port_name(p).ok())
            .collect())
    }

    /// Connect to a MIDI output port by name (partial match supported)
    ///
    /// Fails immediately when no such port exists.
    pub fn connect(&self, port_name: &str) -> Result<String> {
        let midi_out = MidiOutput::new(CLIENT_NAME)?;
        let (_, actual_name) = find_port(&midi_out, port_name)
            .ok_or_else(|| anyhow!("MIDI port '{}' not found", port_name))?;
        self.queue(MidiCommand::Connect {
            port_name: port_name.to_string(),
        })?;
        Ok(actual_name)
    }

    pub fn disconnect(&self) -> Result<(), OutputError> {
        self.queue(MidiCommand::Disconnect)
    }

    pub fn is_connected(&self) -> bool {
        self.state.connected.load(Ordering::Relaxed)
    }

    /// Name of the connected port
    pub fn connected_port(&self) -> Option<String> {
        self.state.port_name.lock().ok().and_then(|name| name.clone())
    }

    /// Fire a single hit outside of playback
    pub fn send_test_note(
        &self,
        instruments: &InstrumentMap,
        id: InstrumentId,
        velocity: u8,
    ) -> Result<(), OutputError> {
        let mapping = instruments.get(id);
        self.queue(MidiCommand::Send(MidiMessage::NoteOn {
            channel: mapping.channel,
            note: mapping.note,
            velocity: velocity.clamp(1, 127),
        }))
    }

    /// Send All Notes Off on every channel, then stop the output thread
    pub fn shutdown(&self) {
        let _ = self.command_tx.send(MidiCommand::Shutdown);
        let handle = self.thread.lock().ok().and_then(|mut t| t.take());
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }
}

impl MidiSink for MidiOutputHandle {
    fn send(&mut self, message: MidiMessage) -> Result<(), OutputError> {
        self.queue(MidiCommand::Send(message))
    }

    fn drain_errors(&mut self) -> Vec<OutputError> {
        self.error_rx.try_iter().collect()
    }
}
