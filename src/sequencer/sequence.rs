// Sequence - parsed tracks and their absolute-tick timelines
// Tracks are immutable once loaded and shared by reference with the cursors

use crate::midi::event::Event;
use crate::sequencer::tempo::{DEFAULT_US_PER_QUARTER, TimeSignature};
use std::sync::Arc;
use std::time::Duration;

/// One event with its offset from the previous event of the same track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackEvent {
    pub delta: u32,
    pub event: Event,
}

impl TrackEvent {
    pub fn new(delta: u32, event: Event) -> Self {
        Self { delta, event }
    }
}

/// Ordered list of delta-timed events
/// A track with no events is legal and never fires.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Track {
    pub events: Vec<TrackEvent>,
}

impl Track {
    pub fn new(events: Vec<TrackEvent>) -> Self {
        Self { events }
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Absolute-tick entry of a timeline
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimelineEntry {
    pub tick: u64,
    pub event: Event,
}

/// Track events with prefix-summed ticks, in file order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Timeline {
    entries: Vec<TimelineEntry>,
}

impl Timeline {
    /// Single forward pass accumulating deltas
    pub fn from_track(track: &Track) -> Self {
        let mut tick = 0u64;
        let entries = track
            .events
            .iter()
            .map(|e| {
                tick += e.delta as u64;
                TimelineEntry {
                    tick,
                    event: e.event.clone(),
                }
            })
            .collect();
        Self { entries }
    }

    pub fn entries(&self) -> &[TimelineEntry] {
        &self.entries
    }

    /// Tick of the last event, `None` for an empty track
    pub fn last_tick(&self) -> Option<u64> {
        self.entries.last().map(|e| e.tick)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Decoded sequence handed over by the loader
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedSequence {
    pub ticks_per_quarter: u16,
    pub tracks: Vec<Arc<Track>>,
}

impl ParsedSequence {
    pub fn new(ticks_per_quarter: u16, tracks: Vec<Track>) -> Self {
        Self {
            ticks_per_quarter,
            tracks: tracks.into_iter().map(Arc::new).collect(),
        }
    }

    /// Build one timeline per track; the clock keeps its own copy
    pub fn timelines(&self) -> Vec<Timeline> {
        self.tracks.iter().map(|t| Timeline::from_track(t)).collect()
    }

    /// Length and playing time of the whole sequence
    pub fn summary(&self) -> SequenceSummary {
        SequenceSummary::from_timelines(self.ticks_per_quarter, &self.timelines())
    }
}

/// Length of a sequence in ticks, musical units and wall-clock time
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequenceSummary {
    pub last_tick: u64,
    pub measures: u64,
    pub beats: u64,
    pub duration: Duration,
}

impl SequenceSummary {
    /// Walk the merged tempo map of all tracks
    ///
    /// Each tempo segment is timed with the truncated µs-per-tick the player
    /// itself uses, so the estimate matches logical playback time.
    pub fn from_timelines(ticks_per_quarter: u16, timelines: &[Timeline]) -> Self {
        let tpq = ticks_per_quarter.max(1) as u64;
        let last_tick = timelines
            .iter()
            .filter_map(Timeline::last_tick)
            .max()
            .unwrap_or(0);

        let mut tempo_changes: Vec<(u64, u32)> = Vec::new();
        let mut signature = None;
        for timeline in timelines {
            for entry in timeline.entries() {
                match entry.event {
                    Event::Tempo(us) => tempo_changes.push((entry.tick, us)),
                    Event::TimeSignature {
                        numerator,
                        denominator_pow,
                    } if signature.is_none() => {
                        signature = Some(TimeSignature::from_midi(numerator, denominator_pow));
                    }
                    _ => {}
                }
            }
        }
        // Stable: ties keep track order, the later track wins like in playback
        tempo_changes.sort_by_key(|(tick, _)| *tick);

        let mut total_us = 0u64;
        let mut segment_start = 0u64;
        let mut us_per_tick = (DEFAULT_US_PER_QUARTER as u64 / tpq).max(1);
        for (tick, us) in tempo_changes {
            if tick >= last_tick {
                break;
            }
            total_us =
                total_us.saturating_add((tick - segment_start).saturating_mul(us_per_tick));
            segment_start = tick;
            us_per_tick = (us as u64 / tpq).max(1);
        }
        total_us =
            total_us.saturating_add((last_tick - segment_start).saturating_mul(us_per_tick));

        let signature = signature.unwrap_or_default();
        let ticks_per_measure = signature.ticks_per_measure(ticks_per_quarter);
        let ticks_per_beat = signature.ticks_per_beat(ticks_per_quarter);

        Self {
            last_tick,
            measures: last_tick / ticks_per_measure,
            beats: last_tick / ticks_per_beat,
            duration: Duration::from_micros(total_us),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(delta: u32, note: u8) -> TrackEvent {
        TrackEvent::new(
            delta,
            Event::NoteOn {
                channel: 0,
                note,
                velocity: 100,
            },
        )
    }

    #[test]
    fn test_timeline_prefix_sum() {
        let track = Track::new(vec![note(0, 60), note(96, 62), note(0, 64), note(48, 65)]);
        let timeline = Timeline::from_track(&track);

        let ticks: Vec<u64> = timeline.entries().iter().map(|e| e.tick).collect();
        assert_eq!(ticks, vec![0, 96, 96, 144]);
        assert_eq!(timeline.last_tick(), Some(144));
    }

    #[test]
    fn test_timeline_keeps_tie_order() {
        let track = Track::new(vec![note(10, 1), note(0, 2), note(0, 3)]);
        let timeline = Timeline::from_track(&track);

        let notes: Vec<Event> = timeline.entries().iter().map(|e| e.event.clone()).collect();
        assert_eq!(
            notes,
            vec![note(0, 1).event, note(0, 2).event, note(0, 3).event]
        );
    }

    #[test]
    fn test_empty_track_timeline() {
        let timeline = Timeline::from_track(&Track::default());
        assert!(timeline.is_empty());
        assert_eq!(timeline.last_tick(), None);
    }

    #[test]
    fn test_summary_default_tempo() {
        // 2 bars of 4/4 at 96 tpq, 120 BPM: 768 ticks * 5208 µs
        let seq = ParsedSequence::new(96, vec![Track::new(vec![note(768, 60)])]);
        let summary = seq.summary();

        assert_eq!(summary.last_tick, 768);
        assert_eq!(summary.measures, 2);
        assert_eq!(summary.beats, 8);
        assert_eq!(summary.duration, Duration::from_micros(768 * 5208));
    }

    #[test]
    fn test_summary_with_tempo_change_on_other_track() {
        let conductor = Track::new(vec![TrackEvent::new(96, Event::Tempo(1_000_000))]);
        let melody = Track::new(vec![note(192, 60)]);
        let seq = ParsedSequence::new(96, vec![conductor, melody]);

        // 96 ticks at 5208 µs, then 96 ticks at 10416 µs
        let summary = seq.summary();
        assert_eq!(
            summary.duration,
            Duration::from_micros(96 * 5208 + 96 * 10416)
        );
    }

    #[test]
    fn test_summary_three_four() {
        let track = Track::new(vec![
            TrackEvent::new(
                0,
                Event::TimeSignature {
                    numerator: 3,
                    denominator_pow: 2,
                },
            ),
            note(288 * 4, 60),
        ]);
        let seq = ParsedSequence::new(96, vec![track]);
        assert_eq!(seq.summary().measures, 4);
    }

    #[test]
    fn test_summary_saturates_on_huge_sequences() {
        // Slowest tempo at 1 tpq, then very long deltas
        let mut events = vec![TrackEvent::new(0, Event::Tempo(0xFF_FFFF))];
        events.extend((0..1000).map(|_| note(u32::MAX, 60)));
        let seq = ParsedSequence::new(1, vec![Track::new(events)]);

        let summary = seq.summary();
        assert_eq!(summary.last_tick, 1000 * u32::MAX as u64);
        assert_eq!(summary.duration, Duration::from_micros(u64::MAX));
    }
}
