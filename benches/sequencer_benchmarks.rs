use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use midi_orchestrator::sequencer::{Track, TrackEvent};
use midi_orchestrator::{Event, NullOutput, ParsedSequence, SequencerClock, load_sequence};

/// Dense sequence: every track has a note on/off pair each eighth note
fn dense_sequence(tracks: usize, notes_per_track: usize) -> ParsedSequence {
    let tracks = (0..tracks)
        .map(|t| {
            let channel = (t % 16) as u8;
            let mut events = vec![TrackEvent::new(0, Event::Tempo(500_000))];
            for n in 0..notes_per_track {
                let note = 36 + (n % 48) as u8;
                events.push(TrackEvent::new(
                    24,
                    Event::NoteOn {
                        channel,
                        note,
                        velocity: 100,
                    },
                ));
                events.push(TrackEvent::new(
                    24,
                    Event::NoteOff {
                        channel,
                        note,
                        velocity: 0,
                    },
                ));
            }
            Track::new(events)
        })
        .collect();
    ParsedSequence::new(96, tracks)
}

/// Benchmark stepping the clock through a whole sequence without waiting
fn bench_clock_stepping(c: &mut Criterion) {
    let mut group = c.benchmark_group("clock_stepping");

    for tracks in [1usize, 16, 64] {
        let sequence = dense_sequence(tracks, 1000);
        group.bench_with_input(BenchmarkId::from_parameter(tracks), &sequence, |b, seq| {
            b.iter(|| {
                let mut clock = SequencerClock::new(seq);
                let mut out = NullOutput;
                while let Some(report) = clock.step(&mut out) {
                    black_box(report.tick);
                }
            });
        });
    }
    group.finish();
}

/// Benchmark locating deep into a sequence (silent fast-forward)
fn bench_locate(c: &mut Criterion) {
    let sequence = dense_sequence(16, 1000);

    c.bench_function("locate_measure_100", |b| {
        let mut clock = SequencerClock::new(&sequence);
        b.iter(|| black_box(clock.locate(100, 1)));
    });
}

/// Benchmark timeline building and the duration estimate
fn bench_summary(c: &mut Criterion) {
    let sequence = dense_sequence(16, 1000);

    c.bench_function("sequence_summary", |b| {
        b.iter(|| black_box(sequence.summary()));
    });
}

/// Benchmark decoding a file
fn bench_load(c: &mut Criterion) {
    let mut track = Vec::new();
    for n in 0..2000u32 {
        let note = 36 + (n % 48) as u8;
        track.extend_from_slice(&[0x18, 0x90, note, 0x64, 0x18, 0x80, note, 0x00]);
    }
    track.extend_from_slice(&[0x00, 0xFF, 0x2F, 0x00]);

    let mut bytes = Vec::new();
    bytes.extend_from_slice(b"MThd");
    bytes.extend_from_slice(&[0, 0, 0, 6, 0, 0, 0, 1, 0, 96]);
    bytes.extend_from_slice(b"MTrk");
    bytes.extend_from_slice(&(track.len() as u32).to_be_bytes());
    bytes.extend_from_slice(&track);

    c.bench_function("load_sequence_4000_events", |b| {
        b.iter(|| black_box(load_sequence(black_box(&bytes))))
    });
}

criterion_group!(
    benches,
    bench_clock_stepping,
    bench_locate,
    bench_summary,
    bench_load,
);
criterion_main!(benches);
