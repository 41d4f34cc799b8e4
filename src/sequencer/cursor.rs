// Track cursor - walks one track's events in file order
// Sends translated messages, stages tempo changes and keeps the note table
// needed to silence the track

use crate::midi::event::{Event, MidiMessage};
use crate::midi::output::MidiOutput;
use crate::sequencer::sequence::Track;
use crate::sequencer::tempo::TempoModel;
use std::sync::Arc;

/// Delta returned once a track has no events left
pub const NO_MORE_EVENTS: u64 = u64::MAX;

const NOTE_COUNT: usize = 128;

// Controller numbers mirrored for display
const CC_VOLUME: u8 = 7;
const CC_PAN: u8 = 10;
const CC_EXPRESSION: u8 = 11;

const DEFAULT_VOLUME: u8 = 100;
const DEFAULT_EXPRESSION: u8 = 127;
const DEFAULT_PAN: u8 = 64;

/// Where processed events go
pub(crate) enum Dispatch<'a> {
    Send(&'a mut dyn MidiOutput),
    /// Fast-forward: mirrors and tempo follow, nothing is sent or held
    Discard,
}

pub struct TrackCursor {
    track: Arc<Track>,
    position: usize,
    velocities: [u8; NOTE_COUNT],

    /// Channel of the first voice event, used when silencing
    channel: Option<u8>,

    name: String,
    volume: u8,
    expression: u8,
    pan: u8,
    program: u8,
    last_marker: Option<String>,
}

impl TrackCursor {
    pub fn new(track: Arc<Track>) -> Self {
        let channel = track.events.iter().find_map(|e| e.event.channel());
        Self {
            track,
            position: 0,
            velocities: [0; NOTE_COUNT],
            channel,
            name: String::new(),
            volume: DEFAULT_VOLUME,
            expression: DEFAULT_EXPRESSION,
            pan: DEFAULT_PAN,
            program: 0,
            last_marker: None,
        }
    }

    /// Delta before the first event, `NO_MORE_EVENTS` for an empty track
    pub fn first_delta(&self) -> u64 {
        self.track
            .events
            .first()
            .map_or(NO_MORE_EVENTS, |e| e.delta as u64)
    }

    /// Process the current event and every following event tied to it
    /// (delta 0), then return the delta to the next unprocessed event.
    pub fn run(&mut self, output: &mut dyn MidiOutput, tempo: &mut TempoModel) -> u64 {
        self.run_with(&mut Dispatch::Send(output), tempo)
    }

    pub(crate) fn run_with(&mut self, dispatch: &mut Dispatch<'_>, tempo: &mut TempoModel) -> u64 {
        let track = Arc::clone(&self.track);
        let events = &track.events;

        if self.position >= events.len() {
            return NO_MORE_EVENTS;
        }

        loop {
            self.process(&events[self.position].event, dispatch, tempo);
            self.position += 1;
            if self.position >= events.len() || events[self.position].delta != 0 {
                break;
            }
        }

        events
            .get(self.position)
            .map_or(NO_MORE_EVENTS, |e| e.delta as u64)
    }

    fn process(&mut self, event: &Event, dispatch: &mut Dispatch<'_>, tempo: &mut TempoModel) {
        if let Dispatch::Send(output) = dispatch {
            if let Some(message) = event.to_message() {
                if let Err(e) = output.send(&message) {
                    log::warn!("Track '{}': {}", self.name, e);
                }
            }
        }

        match *event {
            Event::NoteOn { note, velocity, .. } => {
                if matches!(dispatch, Dispatch::Send(_)) {
                    self.velocities[(note & 0x7F) as usize] = velocity;
                }
            }
            Event::NoteOff { note, .. } => {
                self.velocities[(note & 0x7F) as usize] = 0;
            }
            Event::ControlChange {
                controller, value, ..
            } => match controller {
                CC_VOLUME => self.volume = value,
                CC_EXPRESSION => self.expression = value,
                CC_PAN => self.pan = value,
                _ => {}
            },
            Event::ProgramChange { program, .. } => self.program = program,
            Event::PolyphonicPressure { .. }
            | Event::ChannelPressure { .. }
            | Event::PitchBend { .. }
            | Event::SystemExclusive(_) => {}
            Event::TrackName(ref text) => self.name = text.clone(),
            Event::Marker(ref text) => self.last_marker = Some(text.clone()),
            Event::Tempo(us_per_quarter) => tempo.request_tempo(us_per_quarter),
            Event::TimeSignature {
                numerator,
                denominator_pow,
            } => tempo.request_time_signature(numerator, denominator_pow),
            Event::EndOfTrack => {}
            Event::Other => log::debug!("Track '{}': skipping unrecognized event", self.name),
        }
    }

    /// NoteOn velocity 0 for every held note
    /// A second call in a row sends nothing.
    pub fn stop_all_notes(&mut self, output: &mut dyn MidiOutput) {
        let channel = self.channel.unwrap_or(0);
        for (note, velocity) in self.velocities.iter_mut().enumerate() {
            if *velocity > 0 {
                let message = MidiMessage::NoteOn {
                    channel,
                    note: note as u8,
                    velocity: 0,
                };
                if let Err(e) = output.send(&message) {
                    log::warn!("Track '{}': {}", self.name, e);
                }
                *velocity = 0;
            }
        }
    }

    /// Back to the first event with fresh mirrors
    /// Held notes are forgotten without being silenced.
    pub fn rewind(&mut self) {
        self.position = 0;
        self.velocities = [0; NOTE_COUNT];
        self.name.clear();
        self.volume = DEFAULT_VOLUME;
        self.expression = DEFAULT_EXPRESSION;
        self.pan = DEFAULT_PAN;
        self.program = 0;
        self.last_marker = None;
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn is_finished(&self) -> bool {
        self.position >= self.track.events.len()
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn channel(&self) -> Option<u8> {
        self.channel
    }

    /// True when the track carries any channel message
    pub fn is_voice_track(&self) -> bool {
        self.channel.is_some()
    }

    pub fn volume(&self) -> u8 {
        self.volume
    }

    pub fn expression(&self) -> u8 {
        self.expression
    }

    pub fn pan(&self) -> u8 {
        self.pan
    }

    pub fn program(&self) -> u8 {
        self.program
    }

    pub fn last_marker(&self) -> Option<&str> {
        self.last_marker.as_deref()
    }

    /// Notes currently held, ascending
    pub fn active_notes(&self) -> Vec<u8> {
        self.velocities
            .iter()
            .enumerate()
            .filter(|(_, v)| **v > 0)
            .map(|(note, _)| note as u8)
            .collect()
    }

    /// 0-100 level from the RMS of held velocities
    pub fn vu_meter(&self) -> u8 {
        let held: Vec<f64> = self
            .velocities
            .iter()
            .filter(|v| **v > 0)
            .map(|v| *v as f64)
            .collect();
        if held.is_empty() {
            return 0;
        }
        let mean_square = held.iter().map(|v| v * v).sum::<f64>() / held.len() as f64;
        (100.0 * mean_square.sqrt() / 127.0) as u8
    }
}
