//! Playback properties over randomly generated sequences
//!
//! The clock must fire every event exactly at its timeline tick, in file
//! order, whatever tempo changes the tracks carry.

use midi_orchestrator::sequencer::{Timeline, Track, TrackEvent};
use midi_orchestrator::{
    Event, MidiMessage, ParsedSequence, RecordingOutput, SequencerClock, TempoModel,
};
use rand::Rng;
use std::collections::BTreeSet;
use std::time::Duration;

fn random_track(rng: &mut impl Rng, channel: u8, with_tempo: bool) -> Track {
    let count = rng.gen_range(0..40);
    let mut events = Vec::with_capacity(count);
    for _ in 0..count {
        // Plenty of zero deltas to exercise tied events
        let delta = if rng.gen_bool(0.3) {
            0
        } else {
            rng.gen_range(1..500)
        };
        let event = match rng.gen_range(0..6) {
            0 if with_tempo => Event::Tempo(rng.gen_range(200_000..1_500_000)),
            1 => Event::NoteOff {
                channel,
                note: rng.gen_range(0..128),
                velocity: 0,
            },
            2 => Event::ControlChange {
                channel,
                controller: 7,
                value: rng.gen_range(0..128),
            },
            _ => Event::NoteOn {
                channel,
                note: rng.gen_range(0..128),
                velocity: rng.gen_range(1..128),
            },
        };
        events.push(TrackEvent::new(delta, event));
    }
    Track::new(events)
}

fn random_sequence(rng: &mut impl Rng) -> ParsedSequence {
    let track_count = rng.gen_range(1..6);
    let tracks = (0..track_count)
        .map(|i| random_track(&mut *rng, i as u8, i == 0))
        .collect();
    ParsedSequence::new(rng.gen_range(24..=960), tracks)
}

/// Distinct ticks at which each track has events
fn timeline_ticks(sequence: &ParsedSequence) -> Vec<BTreeSet<u64>> {
    sequence
        .timelines()
        .iter()
        .map(|timeline: &Timeline| timeline.entries().iter().map(|e| e.tick).collect())
        .collect()
}

#[test]
fn prop_tracks_fire_at_timeline_ticks() {
    let mut rng = rand::thread_rng();

    for _ in 0..200 {
        let sequence = random_sequence(&mut rng);
        let expected = timeline_ticks(&sequence);

        let mut clock = SequencerClock::new(&sequence);
        let mut out = RecordingOutput::new();
        let mut fired: Vec<BTreeSet<u64>> = vec![BTreeSet::new(); sequence.tracks.len()];
        let mut last_tick = 0;

        while let Some(report) = clock.step(&mut out) {
            assert!(report.tick >= last_tick, "Tick counter went backwards");
            last_tick = report.tick;
            for index in report.fired_tracks {
                assert!(
                    fired[index].insert(report.tick),
                    "Track {} fired twice at tick {}",
                    index,
                    report.tick
                );
            }
        }

        assert_eq!(fired, expected);
        assert!(clock.cursors().iter().all(|c| c.is_finished()));
    }
}

#[test]
fn prop_messages_follow_file_order() {
    let mut rng = rand::thread_rng();

    for _ in 0..100 {
        // Single track: sent messages are exactly its channel events in order
        let track = random_track(&mut rng, 3, true);
        let expected: Vec<MidiMessage> =
            track.events.iter().filter_map(|e| e.event.to_message()).collect();
        let sequence = ParsedSequence::new(96, vec![track]);

        let mut clock = SequencerClock::new(&sequence);
        let mut out = RecordingOutput::new();
        while clock.step(&mut out).is_some() {}

        assert_eq!(out.messages(), expected);
    }
}

#[test]
fn prop_playback_is_deterministic() {
    let mut rng = rand::thread_rng();

    for _ in 0..50 {
        let sequence = random_sequence(&mut rng);

        let run = || {
            let mut clock = SequencerClock::new(&sequence);
            let mut out = RecordingOutput::new();
            let mut waits = Vec::new();
            while let Some(delta) = clock.next_delta() {
                waits.push(clock.wait_for(delta));
                clock.advance(delta, &mut out);
            }
            (waits, out.take())
        };

        let first = run();
        let second = run();
        assert_eq!(first, second);
    }
}

#[test]
fn prop_logical_time_matches_summary() {
    let mut rng = rand::thread_rng();

    for _ in 0..100 {
        let sequence = random_sequence(&mut rng);
        let summary = sequence.summary();

        let mut clock = SequencerClock::new(&sequence);
        let mut out = RecordingOutput::new();
        let mut elapsed = Duration::ZERO;
        while let Some(delta) = clock.next_delta() {
            elapsed += clock.wait_for(delta);
            clock.advance(delta, &mut out);
        }

        assert_eq!(clock.ticks(), summary.last_tick);
        assert_eq!(elapsed, summary.duration);
    }
}

#[test]
fn prop_silence_leaves_no_held_notes() {
    let mut rng = rand::thread_rng();

    for _ in 0..100 {
        let sequence = random_sequence(&mut rng);
        let mut clock = SequencerClock::new(&sequence);
        let mut out = RecordingOutput::new();

        // Stop somewhere in the middle
        let steps = rng.gen_range(0..30);
        for _ in 0..steps {
            if clock.step(&mut out).is_none() {
                break;
            }
        }
        let held: usize = clock.cursors().iter().map(|c| c.active_notes().len()).sum();
        out.take();

        clock.silence(&mut out);
        let released = out.take();
        assert_eq!(released.len(), held);
        assert!(released.iter().all(|m| matches!(
            m,
            MidiMessage::NoteOn { velocity: 0, .. }
        )));
        assert!(clock.cursors().iter().all(|c| c.active_notes().is_empty()));

        // Second silence is a no-op
        clock.silence(&mut out);
        assert!(out.is_empty());
    }
}

#[test]
fn test_default_tempo_at_96_ticks_per_quarter() {
    let tempo = TempoModel::new(96);
    assert_eq!(tempo.ticks_per_measure(), 384);
    assert_eq!(tempo.ticks_per_beat(), 96);
    assert_eq!(tempo.us_per_tick(), 5208);
    assert_eq!(tempo.position(0), (1, 1));
    assert_eq!(tempo.position(96), (1, 2));
    assert_eq!(tempo.position(384), (2, 1));
    assert_eq!(tempo.tick_at(2, 1), Some(384));
}

#[test]
fn test_tempo_change_applies_after_its_tick() {
    // Tempo doubles at tick 96; the first wait still uses 120 BPM
    let sequence = ParsedSequence::new(
        96,
        vec![Track::new(vec![
            TrackEvent::new(96, Event::Tempo(250_000)),
            TrackEvent::new(
                96,
                Event::NoteOn {
                    channel: 0,
                    note: 60,
                    velocity: 100,
                },
            ),
        ])],
    );
    let mut clock = SequencerClock::new(&sequence);
    let mut out = RecordingOutput::new();

    let first = clock.next_delta().unwrap();
    assert_eq!(clock.wait_for(first), Duration::from_micros(96 * 5208));
    let report = clock.advance(first, &mut out);
    assert!(report.tempo_changed);

    let second = clock.next_delta().unwrap();
    assert_eq!(clock.wait_for(second), Duration::from_micros(96 * 2604));
}
