// Tempo model - tempo and time signature resolution
// Converts ticks to wall-clock time; changes are staged and only committed
// at a tick boundary by the clock

use std::fmt;

/// 120 BPM in a quarter-note beat
pub const DEFAULT_US_PER_QUARTER: u32 = 500_000;

const US_PER_MINUTE: f64 = 60_000_000.0;

/// Largest denominator exponent accepted (1/128 notes)
const MAX_DENOMINATOR_POW: u8 = 7;

/// Time signature (numerator/denominator)
/// Example: 4/4 time = TimeSignature { numerator: 4, denominator: 4 }
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSignature {
    pub numerator: u8,   // Beats per measure
    pub denominator: u8, // Note value of one beat (4 = quarter note, 8 = eighth note)
}

impl TimeSignature {
    /// Creates a new time signature
    pub fn new(numerator: u8, denominator: u8) -> Self {
        assert!(numerator > 0, "Time signature numerator must be > 0");
        assert!(
            denominator.is_power_of_two(),
            "Time signature denominator must be power of 2"
        );
        Self {
            numerator,
            denominator,
        }
    }

    /// Build from the file encoding (denominator as a power of two)
    /// Degenerate values are clamped instead of rejected.
    pub fn from_midi(numerator: u8, denominator_pow: u8) -> Self {
        if numerator == 0 || denominator_pow > MAX_DENOMINATOR_POW {
            log::warn!(
                "Clamping degenerate time signature {}/2^{}",
                numerator,
                denominator_pow
            );
        }
        Self::new(
            numerator.max(1),
            1u8 << denominator_pow.min(MAX_DENOMINATOR_POW),
        )
    }

    /// Common 4/4 time signature
    pub fn four_four() -> Self {
        Self::new(4, 4)
    }

    /// Beats per quarter note
    /// Example: 4/4 = 1.0, 6/8 = 2.0 (eighth notes), 2/2 = 0.5
    pub fn beats_per_quarter(&self) -> f64 {
        self.denominator as f64 / 4.0
    }

    /// Ticks in one measure, truncated, never below 1
    pub fn ticks_per_measure(&self, ticks_per_quarter: u16) -> u64 {
        let ticks = ticks_per_quarter as u64 * self.numerator as u64 * 4 / self.denominator as u64;
        ticks.max(1)
    }

    /// Ticks in one beat, truncated, never below 1
    pub fn ticks_per_beat(&self, ticks_per_quarter: u16) -> u64 {
        (self.ticks_per_measure(ticks_per_quarter) / self.numerator as u64).max(1)
    }
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self::four_four()
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.numerator, self.denominator)
    }
}

/// Current and pending tempo/signature with derived tick durations
///
/// Derived values are recomputed on every commit and never read stale.
#[derive(Debug, Clone)]
pub struct TempoModel {
    ticks_per_quarter: u16,
    us_per_quarter: u32,
    time_signature: TimeSignature,

    pending_us_per_quarter: Option<u32>,
    pending_time_signature: Option<TimeSignature>,

    // Derived
    ticks_per_measure: u64,
    ticks_per_beat: u64,
    us_per_tick: u64,
}

impl TempoModel {
    /// 120 BPM, 4/4 at the given resolution
    pub fn new(ticks_per_quarter: u16) -> Self {
        let mut model = Self {
            ticks_per_quarter: ticks_per_quarter.max(1),
            us_per_quarter: DEFAULT_US_PER_QUARTER,
            time_signature: TimeSignature::default(),
            pending_us_per_quarter: None,
            pending_time_signature: None,
            ticks_per_measure: 0,
            ticks_per_beat: 0,
            us_per_tick: 0,
        };
        model.recompute();
        model
    }

    /// Back to defaults, dropping anything pending
    pub fn reset(&mut self) {
        *self = Self::new(self.ticks_per_quarter);
    }

    /// Stage a new quarter-note duration; last request before the next
    /// commit wins
    pub fn request_tempo(&mut self, us_per_quarter: u32) {
        self.pending_us_per_quarter = Some(us_per_quarter);
    }

    /// Stage a new time signature (denominator as a power of two)
    pub fn request_time_signature(&mut self, numerator: u8, denominator_pow: u8) {
        self.pending_time_signature = Some(TimeSignature::from_midi(numerator, denominator_pow));
    }

    /// Stage a tempo expressed in beats per minute of the current signature
    pub fn request_bpm(&mut self, bpm: f64) {
        if !bpm.is_finite() || bpm <= 0.0 {
            log::warn!("Ignoring invalid tempo {} BPM", bpm);
            return;
        }
        let beats_per_quarter = self
            .pending_time_signature
            .unwrap_or(self.time_signature)
            .beats_per_quarter();
        let us = (US_PER_MINUTE * beats_per_quarter / bpm).clamp(1.0, u32::MAX as f64);
        self.request_tempo(us as u32);
    }

    pub fn has_pending(&self) -> bool {
        self.pending_us_per_quarter.is_some() || self.pending_time_signature.is_some()
    }

    /// Commit pending values and recompute derived ones
    /// Returns true when something was committed.
    pub fn apply_pending(&mut self) -> bool {
        if !self.has_pending() {
            return false;
        }
        if let Some(us) = self.pending_us_per_quarter.take() {
            self.us_per_quarter = us;
        }
        if let Some(signature) = self.pending_time_signature.take() {
            self.time_signature = signature;
        }
        self.recompute();
        log::debug!(
            "Tempo now {} µs/quarter, {} ({} µs/tick)",
            self.us_per_quarter,
            self.time_signature,
            self.us_per_tick
        );
        true
    }

    fn recompute(&mut self) {
        self.ticks_per_measure = self.time_signature.ticks_per_measure(self.ticks_per_quarter);
        self.ticks_per_beat = self.time_signature.ticks_per_beat(self.ticks_per_quarter);
        // A zero tick duration would stall the loop
        self.us_per_tick = (self.us_per_quarter as u64 / self.ticks_per_quarter as u64).max(1);
    }

    pub fn ticks_per_quarter(&self) -> u16 {
        self.ticks_per_quarter
    }

    pub fn us_per_quarter(&self) -> u32 {
        self.us_per_quarter
    }

    pub fn time_signature(&self) -> TimeSignature {
        self.time_signature
    }

    pub fn ticks_per_measure(&self) -> u64 {
        self.ticks_per_measure
    }

    pub fn ticks_per_beat(&self) -> u64 {
        self.ticks_per_beat
    }

    pub fn us_per_tick(&self) -> u64 {
        self.us_per_tick
    }

    /// Beats per minute, counted in the signature's beat unit
    pub fn bpm(&self) -> f64 {
        US_PER_MINUTE * self.time_signature.beats_per_quarter() / self.us_per_quarter.max(1) as f64
    }

    /// 1-based (measure, beat in measure) of an absolute tick
    pub fn position(&self, ticks: u64) -> (u64, u64) {
        let measure = 1 + ticks / self.ticks_per_measure;
        let beat = 1 + (ticks % self.ticks_per_measure) / self.ticks_per_beat;
        (measure, beat)
    }

    /// Absolute tick of a 1-based (measure, beat in measure)
    /// `None` when the position does not fit in a tick counter.
    pub fn tick_at(&self, measure: u64, beat: u64) -> Option<u64> {
        let measure_ticks = measure.saturating_sub(1).checked_mul(self.ticks_per_measure)?;
        let beat_ticks = beat.saturating_sub(1).checked_mul(self.ticks_per_beat)?;
        measure_ticks.checked_add(beat_ticks)
    }
}
