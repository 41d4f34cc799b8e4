// MIDI output - the `send` capability used by the sequencer
// Device adapter on top of midir plus in-process sinks

use crate::midi::event::MidiMessage;
use midir::{MidiOutput as MidirOutputClient, MidiOutputConnection};
use std::sync::{Arc, Mutex};

const CLIENT_NAME: &str = "MIDI Orchestrator Output";
const CONNECTION_NAME: &str = "midi-orchestrator-out";

#[derive(Debug, thiserror::Error)]
pub enum OutputError {
    #[error("Failed to initialize MIDI output: {0}")]
    Init(String),

    #[error("No MIDI output ports available")]
    NoPorts,

    #[error("MIDI output port '{0}' not found")]
    PortNotFound(String),

    #[error("Failed to connect to MIDI output: {0}")]
    Connect(String),

    #[error("Failed to send MIDI message: {0}")]
    Send(String),
}

/// Destination for translated messages
///
/// Implementations may block or fail; the sequencer logs failures and keeps
/// its timing state intact.
pub trait MidiOutput: Send {
    fn send(&mut self, message: &MidiMessage) -> Result<(), OutputError>;
}

/// Hardware/virtual port output backed by midir
pub struct MidirOutput {
    connection: MidiOutputConnection,
    port_name: String,
}

impl MidirOutput {
    /// Connect to the first available output port
    pub fn connect_default() -> Result<Self, OutputError> {
        let midi_out =
            MidirOutputClient::new(CLIENT_NAME).map_err(|e| OutputError::Init(e.to_string()))?;

        let ports = midi_out.ports();
        let port = ports.first().ok_or(OutputError::NoPorts)?;
        let port_name = midi_out
            .port_name(port)
            .unwrap_or_else(|_| "Unknown".to_string());

        let connection = midi_out
            .connect(port, CONNECTION_NAME)
            .map_err(|e| OutputError::Connect(e.to_string()))?;

        log::info!("MIDI output connected: {}", port_name);
        Ok(Self {
            connection,
            port_name,
        })
    }

    /// Connect to the output port with exactly this name
    pub fn connect(device_name: &str) -> Result<Self, OutputError> {
        let midi_out =
            MidirOutputClient::new(CLIENT_NAME).map_err(|e| OutputError::Init(e.to_string()))?;

        let ports = midi_out.ports();
        let port = ports
            .iter()
            .find(|p| {
                midi_out
                    .port_name(p)
                    .map(|name| name == device_name)
                    .unwrap_or(false)
            })
            .ok_or_else(|| OutputError::PortNotFound(device_name.to_string()))?;

        let connection = midi_out
            .connect(port, CONNECTION_NAME)
            .map_err(|e| OutputError::Connect(e.to_string()))?;

        log::info!("MIDI output connected: {}", device_name);
        Ok(Self {
            connection,
            port_name: device_name.to_string(),
        })
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }
}

impl MidiOutput for MidirOutput {
    fn send(&mut self, message: &MidiMessage) -> Result<(), OutputError> {
        self.connection
            .send(&message.to_bytes())
            .map_err(|e| OutputError::Send(e.to_string()))
    }
}

/// Names of all output ports currently visible to midir
pub fn list_output_ports() -> Result<Vec<String>, OutputError> {
    let midi_out = MidirOutputClient::new("MIDI Orchestrator Scanner")
        .map_err(|e| OutputError::Init(e.to_string()))?;

    Ok(midi_out
        .ports()
        .iter()
        .filter_map(|port| midi_out.port_name(port).ok())
        .collect())
}

/// Output that drops every message
#[derive(Debug, Default, Clone, Copy)]
pub struct NullOutput;

impl MidiOutput for NullOutput {
    fn send(&mut self, _message: &MidiMessage) -> Result<(), OutputError> {
        Ok(())
    }
}

/// In-memory output keeping every message in send order
/// Clones share the same buffer, so a handle can be kept while the
/// sequencer owns another one.
#[derive(Debug, Default, Clone)]
pub struct RecordingOutput {
    messages: Arc<Mutex<Vec<MidiMessage>>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything sent so far
    pub fn messages(&self) -> Vec<MidiMessage> {
        self.messages
            .lock()
            .map(|messages| messages.clone())
            .unwrap_or_default()
    }

    /// Remove and return everything sent so far
    pub fn take(&self) -> Vec<MidiMessage> {
        self.messages
            .lock()
            .map(|mut messages| std::mem::take(&mut *messages))
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.messages.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MidiOutput for RecordingOutput {
    fn send(&mut self, message: &MidiMessage) -> Result<(), OutputError> {
        let mut messages = self
            .messages
            .lock()
            .map_err(|_| OutputError::Send("recording buffer poisoned".to_string()))?;
        messages.push(message.clone());
        Ok(())
    }
}
