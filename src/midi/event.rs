// MIDI types events
// Parsed sequence events and the output messages they translate to

/// One parsed sequence event
///
/// Voice events carry their channel (0-15). Meta events the player does not
/// act on are folded into `Other` by the loader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    PolyphonicPressure { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    /// 14-bit value, 8192 = centre
    PitchBend { channel: u8, value: u16 },
    /// Payload without the F0/F7 framing
    SystemExclusive(Vec<u8>),
    TrackName(String),
    Marker(String),
    /// Microseconds per quarter note
    Tempo(u32),
    /// Denominator is stored as a power of two, as in the file
    TimeSignature { numerator: u8, denominator_pow: u8 },
    EndOfTrack,
    Other,
}

impl Event {
    /// Channel of a voice event, `None` for sysex and meta events
    pub fn channel(&self) -> Option<u8> {
        match *self {
            Event::NoteOn { channel, .. }
            | Event::NoteOff { channel, .. }
            | Event::PolyphonicPressure { channel, .. }
            | Event::ControlChange { channel, .. }
            | Event::ProgramChange { channel, .. }
            | Event::ChannelPressure { channel, .. }
            | Event::PitchBend { channel, .. } => Some(channel),
            _ => None,
        }
    }

    /// Translate to the message sent to the output device
    /// Meta events have no wire representation and return `None`
    pub fn to_message(&self) -> Option<MidiMessage> {
        let message = match *self {
            Event::NoteOn {
                channel,
                note,
                velocity,
            } => MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            },
            Event::NoteOff {
                channel,
                note,
                velocity,
            } => MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            },
            Event::PolyphonicPressure {
                channel,
                note,
                pressure,
            } => MidiMessage::PolyphonicKeyPressure {
                channel,
                note,
                pressure,
            },
            Event::ControlChange {
                channel,
                controller,
                value,
            } => MidiMessage::ControlChange {
                channel,
                controller,
                value,
            },
            Event::ProgramChange { channel, program } => {
                MidiMessage::ProgramChange { channel, program }
            }
            Event::ChannelPressure { channel, pressure } => {
                MidiMessage::ChannelPressure { channel, pressure }
            }
            Event::PitchBend { channel, value } => MidiMessage::PitchBend { channel, value },
            Event::SystemExclusive(ref data) => MidiMessage::SystemExclusive(data.clone()),
            Event::TrackName(_)
            | Event::Marker(_)
            | Event::Tempo(_)
            | Event::TimeSignature { .. }
            | Event::EndOfTrack
            | Event::Other => return None,
        };
        Some(message)
    }
}

/// Message handed to the `send` capability
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MidiMessage {
    NoteOn { channel: u8, note: u8, velocity: u8 },
    NoteOff { channel: u8, note: u8, velocity: u8 },
    PolyphonicKeyPressure { channel: u8, note: u8, pressure: u8 },
    ControlChange { channel: u8, controller: u8, value: u8 },
    ProgramChange { channel: u8, program: u8 },
    ChannelPressure { channel: u8, pressure: u8 },
    PitchBend { channel: u8, value: u16 },
    SystemExclusive(Vec<u8>),
}

impl MidiMessage {
    /// Encode as raw MIDI bytes
    /// Data bytes are masked to 7 bits, channel to 4 bits
    pub fn to_bytes(&self) -> Vec<u8> {
        match *self {
            MidiMessage::NoteOff {
                channel,
                note,
                velocity,
            } => vec![0x80 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::NoteOn {
                channel,
                note,
                velocity,
            } => vec![0x90 | (channel & 0x0F), note & 0x7F, velocity & 0x7F],
            MidiMessage::PolyphonicKeyPressure {
                channel,
                note,
                pressure,
            } => vec![0xA0 | (channel & 0x0F), note & 0x7F, pressure & 0x7F],
            MidiMessage::ControlChange {
                channel,
                controller,
                value,
            } => vec![0xB0 | (channel & 0x0F), controller & 0x7F, value & 0x7F],
            MidiMessage::ProgramChange { channel, program } => {
                vec![0xC0 | (channel & 0x0F), program & 0x7F]
            }
            MidiMessage::ChannelPressure { channel, pressure } => {
                vec![0xD0 | (channel & 0x0F), pressure & 0x7F]
            }
            MidiMessage::PitchBend { channel, value } => {
                let lsb = (value & 0x7F) as u8;
                let msb = ((value >> 7) & 0x7F) as u8;
                vec![0xE0 | (channel & 0x0F), lsb, msb]
            }
            MidiMessage::SystemExclusive(ref data) => {
                let mut bytes = Vec::with_capacity(data.len() + 2);
                bytes.push(0xF0);
                bytes.extend_from_slice(data);
                // Some parsers keep the terminator in the payload
                if data.last() != Some(&0xF7) {
                    bytes.push(0xF7);
                }
                bytes
            }
        }
    }
}
