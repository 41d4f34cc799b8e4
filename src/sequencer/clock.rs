// Sequencer clock - shared tick counter and the per-tick scheduling step
// Owns every track cursor and the tempo model of the loaded sequence

use crate::midi::output::MidiOutput;
use crate::sequencer::cursor::{Dispatch, NO_MORE_EVENTS, TrackCursor};
use crate::sequencer::sequence::{ParsedSequence, SequenceSummary, Timeline};
use crate::sequencer::tempo::{TempoModel, TimeSignature};
use crate::sequencer::transport::{TransportError, TransportState};
use std::time::Duration;

/// What one scheduling step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepReport {
    /// Tick counter after the step
    pub tick: u64,
    /// Indices of the tracks that ran, ascending
    pub fired_tracks: Vec<usize>,
    /// Whether a staged tempo/signature change was committed
    pub tempo_changed: bool,
}

/// Read-only view of one track for a presentation layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSnapshot {
    pub index: usize,
    pub name: String,
    pub channel: Option<u8>,
    pub is_voice_track: bool,
    pub active_notes: usize,
    pub vu_meter: u8,
    pub volume: u8,
    pub expression: u8,
    pub pan: u8,
    pub program: u8,
    pub last_marker: Option<String>,
}

/// Read-only view of the whole player
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackSnapshot {
    pub state: TransportState,
    pub ticks: u64,
    pub measure: u64,
    pub beat: u64,
    pub bpm: f64,
    pub us_per_quarter: u32,
    pub time_signature: TimeSignature,
    pub tracks: Vec<TrackSnapshot>,
}

/// Tick counter, track cursors and tempo of one loaded sequence
///
/// The clock itself never sleeps: `next_delta` and `wait_for` tell the
/// caller how long to wait, `advance` does the work of one tick boundary.
/// All mutation goes through `&mut self`, so whoever drives the clock is
/// its only writer.
pub struct SequencerClock {
    tempo: TempoModel,
    cursors: Vec<TrackCursor>,
    /// Ticks until each track's next event, `NO_MORE_EVENTS` once exhausted
    next_deltas: Vec<u64>,
    ticks: u64,
    /// Built once per loaded sequence
    timelines: Vec<Timeline>,
    summary: SequenceSummary,
}

impl SequencerClock {
    pub fn new(sequence: &ParsedSequence) -> Self {
        let cursors: Vec<TrackCursor> = sequence
            .tracks
            .iter()
            .map(|track| TrackCursor::new(track.clone()))
            .collect();
        let next_deltas = cursors.iter().map(TrackCursor::first_delta).collect();
        let timelines = sequence.timelines();
        let summary = SequenceSummary::from_timelines(sequence.ticks_per_quarter, &timelines);

        Self {
            tempo: TempoModel::new(sequence.ticks_per_quarter),
            cursors,
            next_deltas,
            ticks: 0,
            timelines,
            summary,
        }
    }

    /// Smallest pending delta across tracks, `None` once every track is exhausted
    pub fn next_delta(&self) -> Option<u64> {
        self.next_deltas
            .iter()
            .copied()
            .filter(|d| *d != NO_MORE_EVENTS)
            .min()
    }

    pub fn is_finished(&self) -> bool {
        self.next_delta().is_none()
    }

    /// Wall-clock length of `delta` ticks at the current tempo
    pub fn wait_for(&self, delta: u64) -> Duration {
        Duration::from_micros(delta.saturating_mul(self.tempo.us_per_tick()))
    }

    /// Move the tick counter forward by `delta`, run every track that is now
    /// due, then commit staged tempo changes once
    ///
    /// `delta` should come from `next_delta`; a larger value is clamped so
    /// no event is ever skipped.
    pub fn advance(&mut self, delta: u64, output: &mut dyn MidiOutput) -> StepReport {
        self.advance_with(delta, &mut Dispatch::Send(output))
    }

    /// `next_delta` + `advance` without any waiting
    pub fn step(&mut self, output: &mut dyn MidiOutput) -> Option<StepReport> {
        let delta = self.next_delta()?;
        Some(self.advance(delta, output))
    }

    fn advance_with(&mut self, delta: u64, dispatch: &mut Dispatch<'_>) -> StepReport {
        let delta = match self.next_delta() {
            Some(min) => delta.min(min),
            None => 0,
        };
        self.ticks += delta;

        for next in self.next_deltas.iter_mut() {
            if *next != NO_MORE_EVENTS {
                *next -= delta;
            }
        }

        let mut fired_tracks = Vec::new();
        for (index, cursor) in self.cursors.iter_mut().enumerate() {
            if self.next_deltas[index] == 0 {
                self.next_deltas[index] = cursor.run_with(dispatch, &mut self.tempo);
                fired_tracks.push(index);
            }
        }

        // Every track saw the same tempo for this tick
        let tempo_changed = self.tempo.apply_pending();

        StepReport {
            tick: self.ticks,
            fired_tracks,
            tempo_changed,
        }
    }

    /// Release every held note on every track
    pub fn silence(&mut self, output: &mut dyn MidiOutput) {
        for cursor in &mut self.cursors {
            cursor.stop_all_notes(output);
        }
    }

    /// Tick 0, cursors at their first event, default tempo
    pub fn rewind(&mut self) {
        self.ticks = 0;
        self.tempo.reset();
        for (cursor, next) in self.cursors.iter_mut().zip(self.next_deltas.iter_mut()) {
            cursor.rewind();
            *next = cursor.first_delta();
        }
    }

    /// Reposition the tick counter only
    ///
    /// Cursors keep their position, so the next start resumes from the
    /// events they point at. Use `locate` to move the cursors as well.
    pub fn seek(&mut self, measure: u64, beat: u64) -> Result<u64, TransportError> {
        self.ticks = self.tick_at(measure, beat)?;
        Ok(self.ticks)
    }

    /// Reposition tick counter and cursors
    ///
    /// Rewinds, then replays every event before the target tick without
    /// sending anything, so tempo, signature and track mirrors are those in
    /// effect at the target. Events exactly at the target fire on the next
    /// step. The target is computed with the tempo in effect before the call.
    pub fn locate(&mut self, measure: u64, beat: u64) -> Result<u64, TransportError> {
        let target = self.tick_at(measure, beat)?;

        self.rewind();
        while let Some(delta) = self.next_delta() {
            if self.ticks + delta >= target {
                break;
            }
            self.advance_with(delta, &mut Dispatch::Discard);
        }

        let remaining = target.saturating_sub(self.ticks);
        for next in self.next_deltas.iter_mut() {
            if *next != NO_MORE_EVENTS {
                *next -= remaining;
            }
        }
        self.ticks = target;
        Ok(target)
    }

    fn tick_at(&self, measure: u64, beat: u64) -> Result<u64, TransportError> {
        let beats_per_measure = self.tempo.time_signature().numerator as u64;
        if measure == 0 || beat == 0 || beat > beats_per_measure {
            return Err(TransportError::InvalidPosition { measure, beat });
        }
        self.tempo
            .tick_at(measure, beat)
            .ok_or(TransportError::InvalidPosition { measure, beat })
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn tempo(&self) -> &TempoModel {
        &self.tempo
    }

    /// Stage a user tempo; committed at the next tick boundary
    pub fn request_bpm(&mut self, bpm: f64) {
        self.tempo.request_bpm(bpm);
    }

    /// Commit staged changes outside of playback
    pub fn apply_pending(&mut self) -> bool {
        self.tempo.apply_pending()
    }

    pub fn cursors(&self) -> &[TrackCursor] {
        &self.cursors
    }

    pub fn next_deltas(&self) -> &[u64] {
        &self.next_deltas
    }

    /// Absolute-tick view of each track, in track order
    pub fn timelines(&self) -> &[Timeline] {
        &self.timelines
    }

    pub fn summary(&self) -> &SequenceSummary {
        &self.summary
    }

    /// 1-based (measure, beat) of the tick counter
    pub fn position(&self) -> (u64, u64) {
        self.tempo.position(self.ticks)
    }

    pub fn snapshot(&self, state: TransportState) -> PlaybackSnapshot {
        let (measure, beat) = self.position();
        PlaybackSnapshot {
            state,
            ticks: self.ticks,
            measure,
            beat,
            bpm: self.tempo.bpm(),
            us_per_quarter: self.tempo.us_per_quarter(),
            time_signature: self.tempo.time_signature(),
            tracks: self
                .cursors
                .iter()
                .enumerate()
                .map(|(index, c)| TrackSnapshot {
                    index,
                    name: c.name().to_string(),
                    channel: c.channel(),
                    is_voice_track: c.is_voice_track(),
                    active_notes: c.active_notes().len(),
                    vu_meter: c.vu_meter(),
                    volume: c.volume(),
                    expression: c.expression(),
                    pan: c.pan(),
                    program: c.program(),
                    last_marker: c.last_marker().map(str::to_string),
                })
                .collect(),
        }
    }
}
