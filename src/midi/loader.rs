// Standard MIDI file loading
// Decodes a file into per-track delta-timed events with midly

use crate::midi::event::Event;
use crate::sequencer::sequence::{ParsedSequence, Track, TrackEvent};
use midly::{MetaMessage, MidiMessage as SmfMessage, Smf, Timing, TrackEventKind};
use std::path::Path;

/// Resolution used when the file is timed in SMPTE frames
pub const FALLBACK_TICKS_PER_QUARTER: u16 = 96;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse MIDI file: {0}")]
    Parse(#[from] midly::Error),

    #[error("Sequence contains no tracks")]
    NoTracks,

    #[error("Invalid resolution: 0 ticks per quarter note")]
    ZeroResolution,
}

/// Decode raw file bytes
pub fn load_sequence(bytes: &[u8]) -> Result<ParsedSequence, LoadError> {
    load_sequence_with_fallback(bytes, FALLBACK_TICKS_PER_QUARTER)
}

/// Decode raw file bytes, using `fallback_tpq` for timecode-based files
pub fn load_sequence_with_fallback(
    bytes: &[u8],
    fallback_tpq: u16,
) -> Result<ParsedSequence, LoadError> {
    let smf = Smf::parse(bytes)?;

    let ticks_per_quarter = match smf.header.timing {
        Timing::Metrical(tpq) => tpq.as_int(),
        Timing::Timecode(fps, subframes) => {
            log::warn!(
                "Timecode timing ({:?}, {} subframes) not supported, using {} ticks per quarter",
                fps,
                subframes,
                fallback_tpq
            );
            fallback_tpq
        }
    };
    if ticks_per_quarter == 0 {
        return Err(LoadError::ZeroResolution);
    }
    if smf.tracks.is_empty() {
        return Err(LoadError::NoTracks);
    }

    let tracks: Vec<Track> = smf
        .tracks
        .iter()
        .map(|events| {
            Track::new(
                events
                    .iter()
                    .map(|e| TrackEvent::new(e.delta.as_int(), convert_event(&e.kind)))
                    .collect(),
            )
        })
        .collect();

    log::debug!(
        "Parsed {} tracks, {} events",
        tracks.len(),
        tracks.iter().map(Track::len).sum::<usize>()
    );
    Ok(ParsedSequence::new(ticks_per_quarter, tracks))
}

/// Read and decode a file from disk
pub fn load_file(path: impl AsRef<Path>, fallback_tpq: u16) -> Result<ParsedSequence, LoadError> {
    let bytes = std::fs::read(path.as_ref())?;
    load_sequence_with_fallback(&bytes, fallback_tpq)
}

fn convert_event(kind: &TrackEventKind<'_>) -> Event {
    match *kind {
        TrackEventKind::Midi { channel, message } => {
            let channel = channel.as_int();
            match message {
                SmfMessage::NoteOff { key, vel } => Event::NoteOff {
                    channel,
                    note: key.as_int(),
                    velocity: vel.as_int(),
                },
                SmfMessage::NoteOn { key, vel } => Event::NoteOn {
                    channel,
                    note: key.as_int(),
                    velocity: vel.as_int(),
                },
                SmfMessage::Aftertouch { key, vel } => Event::PolyphonicPressure {
                    channel,
                    note: key.as_int(),
                    pressure: vel.as_int(),
                },
                SmfMessage::Controller { controller, value } => Event::ControlChange {
                    channel,
                    controller: controller.as_int(),
                    value: value.as_int(),
                },
                SmfMessage::ProgramChange { program } => Event::ProgramChange {
                    channel,
                    program: program.as_int(),
                },
                SmfMessage::ChannelAftertouch { vel } => Event::ChannelPressure {
                    channel,
                    pressure: vel.as_int(),
                },
                SmfMessage::PitchBend { bend } => Event::PitchBend {
                    channel,
                    value: bend.0.as_int(),
                },
            }
        }
        TrackEventKind::SysEx(data) => Event::SystemExclusive(data.to_vec()),
        TrackEventKind::Escape(_) => Event::Other,
        TrackEventKind::Meta(meta) => match meta {
            MetaMessage::TrackName(name) => {
                Event::TrackName(String::from_utf8_lossy(name).into_owned())
            }
            MetaMessage::Marker(text) => Event::Marker(String::from_utf8_lossy(text).into_owned()),
            MetaMessage::Tempo(us) => Event::Tempo(us.as_int()),
            MetaMessage::TimeSignature(numerator, denominator_pow, _, _) => Event::TimeSignature {
                numerator,
                denominator_pow,
            },
            MetaMessage::EndOfTrack => Event::EndOfTrack,
            _ => Event::Other,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Format 1 file: conductor track + one note track, 96 tpq
    fn sample_file() -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(b"MThd");
        bytes.extend_from_slice(&[0, 0, 0, 6, 0, 1, 0, 2, 0, 96]);

        let conductor: &[u8] = &[
            0x00, 0xFF, 0x03, 0x04, b'S', b'o', b'n', b'g', // track name
            0x00, 0xFF, 0x51, 0x03, 0x07, 0xA1, 0x20, // tempo 500000
            0x00, 0xFF, 0x58, 0x04, 0x03, 0x02, 0x18, 0x08, // 3/4
            0x83, 0x00, 0xFF, 0x2F, 0x00, // end of track at 384
        ];
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(conductor.len() as u32).to_be_bytes());
        bytes.extend_from_slice(conductor);

        let notes: &[u8] = &[
            0x00, 0xC1, 0x05, // program 5, channel 1
            0x00, 0x91, 0x3C, 0x64, // note on 60
            0x60, 0x81, 0x3C, 0x40, // note off after 96
            0x00, 0xE1, 0x00, 0x40, // pitch bend centre
            0x00, 0xFF, 0x2F, 0x00,
        ];
        bytes.extend_from_slice(b"MTrk");
        bytes.extend_from_slice(&(notes.len() as u32).to_be_bytes());
        bytes.extend_from_slice(notes);
        bytes
    }

    #[test]
    fn test_load_sample_file() {
        let seq = load_sequence(&sample_file()).unwrap();
        assert_eq!(seq.ticks_per_quarter, 96);
        assert_eq!(seq.tracks.len(), 2);

        let conductor = &seq.tracks[0].events;
        assert_eq!(conductor[0].event, Event::TrackName("Song".to_string()));
        assert_eq!(conductor[1].event, Event::Tempo(500_000));
        assert_eq!(
            conductor[2].event,
            Event::TimeSignature {
                numerator: 3,
                denominator_pow: 2
            }
        );
        assert_eq!(conductor[3].delta, 384);
        assert_eq!(conductor[3].event, Event::EndOfTrack);

        let notes = &seq.tracks[1].events;
        assert_eq!(
            notes[1].event,
            Event::NoteOn {
                channel: 1,
                note: 60,
                velocity: 100
            }
        );
        assert_eq!(notes[2].delta, 96);
        assert_eq!(
            notes[3].event,
            Event::PitchBend {
                channel: 1,
                value: 8192
            }
        );
    }

    #[test]
    fn test_garbage_is_rejected() {
        assert!(matches!(
            load_sequence(b"not a midi file"),
            Err(LoadError::Parse(_))
        ));
        assert!(load_sequence(&[]).is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_file("/definitely/not/here.mid", 96);
        assert!(matches!(result, Err(LoadError::Io(_))));
    }
}
