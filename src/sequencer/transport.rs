// Transport - Playback control and state management
// Runs the clock on its own thread and exposes start/pause/stop/seek

use crate::messaging::channels::NotificationProducer;
use crate::messaging::notification::{Notification, NotificationCategory};
use crate::midi::event::MidiMessage;
use crate::midi::output::{MidiOutput, OutputError};
use crate::sequencer::clock::{PlaybackSnapshot, SequencerClock};
use crate::sequencer::sequence::ParsedSequence;
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use ringbuf::traits::Producer;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Instant;

/// Transport state (play/pause/stop)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped = 0,
    Playing = 1,
    Paused = 2,
}

impl TransportState {
    pub fn is_playing(&self) -> bool {
        matches!(self, TransportState::Playing)
    }

    /// Check if transport is stopped or paused
    pub fn is_stopped(&self) -> bool {
        matches!(self, TransportState::Stopped | TransportState::Paused)
    }
}

impl From<u8> for TransportState {
    fn from(value: u8) -> Self {
        match value {
            1 => TransportState::Playing,
            2 => TransportState::Paused,
            _ => TransportState::Stopped,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("No sequence loaded")]
    NoSequence,

    #[error("Cannot seek while playing")]
    SeekWhilePlaying,

    #[error("Invalid position: measure {measure}, beat {beat}")]
    InvalidPosition { measure: u64, beat: u64 },

    #[error("Failed to spawn playback thread: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("Playback loop panicked")]
    LoopPanicked,

    #[error("Sequencer state poisoned")]
    Poisoned,
}

/// State published by the playback loop
/// Readers never block the loop: it only `try_lock`s the snapshot slot.
#[derive(Debug, Default)]
pub struct SharedPlaybackState {
    state: AtomicU8,
    ticks: AtomicU64,
    snapshot: Mutex<Option<PlaybackSnapshot>>,
}

impl SharedPlaybackState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn state(&self) -> TransportState {
        TransportState::from(self.state.load(Ordering::Acquire))
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    /// Latest full snapshot, `None` before the first load
    pub fn snapshot(&self) -> Option<PlaybackSnapshot> {
        let snapshot = self.snapshot.lock().ok()?.clone();
        snapshot.map(|mut s| {
            s.state = self.state();
            s
        })
    }

    fn set_state(&self, state: TransportState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Called from outside the loop; may wait for a reader
    fn publish(&self, clock: &SequencerClock) {
        self.ticks.store(clock.ticks(), Ordering::Relaxed);
        if let Ok(mut slot) = self.snapshot.lock() {
            *slot = Some(clock.snapshot(self.state()));
        }
    }

    /// Called from the loop; skips the snapshot when a reader holds it
    fn try_publish(&self, clock: &SequencerClock) {
        self.ticks.store(clock.ticks(), Ordering::Relaxed);
        if let Ok(mut slot) = self.snapshot.try_lock() {
            *slot = Some(clock.snapshot(self.state()));
        }
    }
}

/// Everything the loop mutates, behind one lock held for a single step
struct Engine {
    clock: Option<SequencerClock>,
    output: Box<dyn MidiOutput>,
}

struct LoopHandle {
    cancel: Sender<()>,
    thread: thread::JoinHandle<()>,
}

type Notifications = Arc<Mutex<NotificationProducer>>;

/// Playback controller for one output
///
/// Transport commands are serialized with the loop: pause and stop cancel
/// the loop's wait and join its thread before touching cursors or tempo.
pub struct Sequencer {
    engine: Arc<Mutex<Engine>>,
    shared: Arc<SharedPlaybackState>,
    notifications: Notifications,
    loop_handle: Option<LoopHandle>,
}

impl Sequencer {
    pub fn new(output: Box<dyn MidiOutput>, notification_tx: NotificationProducer) -> Self {
        Self {
            engine: Arc::new(Mutex::new(Engine {
                clock: None,
                output,
            })),
            shared: SharedPlaybackState::new(),
            notifications: Arc::new(Mutex::new(notification_tx)),
            loop_handle: None,
        }
    }

    /// Shared state handle (for a presentation layer)
    pub fn shared_state(&self) -> Arc<SharedPlaybackState> {
        Arc::clone(&self.shared)
    }

    pub fn state(&self) -> TransportState {
        self.shared.state()
    }

    pub fn ticks(&self) -> u64 {
        self.shared.ticks()
    }

    pub fn snapshot(&self) -> Option<PlaybackSnapshot> {
        self.shared.snapshot()
    }

    /// Replace the loaded sequence
    /// Playback is stopped first; the new sequence starts at tick 0.
    pub fn load(&mut self, sequence: &ParsedSequence) -> Result<(), TransportError> {
        if self.shared.state() != TransportState::Stopped {
            self.stop()?;
        }
        let clock = SequencerClock::new(sequence);

        let mut engine = self.lock_engine()?;
        let Engine { clock: current, output } = &mut *engine;
        if let Some(old) = current.as_mut() {
            old.silence(output.as_mut());
        }
        log::info!(
            "Loaded sequence: {} tracks, {} ticks per quarter",
            sequence.tracks.len(),
            sequence.ticks_per_quarter
        );
        *current = Some(clock);
        self.shared.set_state(TransportState::Stopped);
        if let Some(clock) = current.as_ref() {
            self.shared.publish(clock);
            notify(
                &self.notifications,
                Notification::info(
                    NotificationCategory::Load,
                    format!(
                        "Loaded {} tracks, {} measures",
                        sequence.tracks.len(),
                        clock.summary().measures
                    ),
                ),
            );
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<(), TransportError> {
        self.reap_finished_loop()?;
        if self.loop_handle.is_some() {
            return Ok(());
        }
        {
            let engine = self.lock_engine()?;
            if engine.clock.is_none() {
                return Err(TransportError::NoSequence);
            }
        }

        let (cancel, cancel_rx) = crossbeam_channel::bounded(1);
        let engine = Arc::clone(&self.engine);
        let shared = Arc::clone(&self.shared);
        let notifications = Arc::clone(&self.notifications);

        let previous = self.shared.state();
        self.shared.set_state(TransportState::Playing);
        let spawned = thread::Builder::new()
            .name("sequencer-clock".to_string())
            .spawn(move || run_loop(engine, shared, cancel_rx, notifications));
        let thread = match spawned {
            Ok(thread) => thread,
            Err(e) => {
                self.shared.set_state(previous);
                return Err(TransportError::Spawn(e));
            }
        };

        log::info!("Playback started at tick {}", self.shared.ticks());
        self.loop_handle = Some(LoopHandle { cancel, thread });
        Ok(())
    }

    /// Stop the loop, keep the position and release held notes
    pub fn pause(&mut self) -> Result<(), TransportError> {
        self.halt_loop()?;
        // Nothing to pause, or the loop already reached the end
        if self.shared.state() == TransportState::Stopped {
            return Ok(());
        }

        let mut engine = self.lock_engine()?;
        let Engine { clock, output } = &mut *engine;
        if let Some(clock) = clock.as_mut() {
            clock.silence(output.as_mut());
            self.shared.set_state(TransportState::Paused);
            self.shared.publish(clock);
            log::info!("Playback paused at tick {}", clock.ticks());
        }
        Ok(())
    }

    /// Pause, then rewind to tick 0
    pub fn stop(&mut self) -> Result<(), TransportError> {
        self.halt_loop()?;

        let mut engine = self.lock_engine()?;
        let Engine { clock, output } = &mut *engine;
        self.shared.set_state(TransportState::Stopped);
        if let Some(clock) = clock.as_mut() {
            clock.silence(output.as_mut());
            clock.rewind();
            self.shared.publish(clock);
            log::info!("Playback stopped");
        }
        Ok(())
    }

    /// Move the tick counter to a 1-based measure/beat, cursors untouched
    pub fn seek(&mut self, measure: u64, beat: u64) -> Result<u64, TransportError> {
        self.reposition(|clock| clock.seek(measure, beat))
    }

    /// Move the tick counter and every cursor to a 1-based measure/beat
    pub fn locate(&mut self, measure: u64, beat: u64) -> Result<u64, TransportError> {
        self.reposition(|clock| clock.locate(measure, beat))
    }

    fn reposition(
        &mut self,
        f: impl FnOnce(&mut SequencerClock) -> Result<u64, TransportError>,
    ) -> Result<u64, TransportError> {
        self.reap_finished_loop()?;
        if self.loop_handle.is_some() {
            return Err(TransportError::SeekWhilePlaying);
        }
        let mut engine = self.lock_engine()?;
        let clock = engine.clock.as_mut().ok_or(TransportError::NoSequence)?;
        let tick = f(clock)?;
        if self.shared.state() == TransportState::Stopped && tick > 0 {
            self.shared.set_state(TransportState::Paused);
        }
        self.shared.publish(clock);
        Ok(tick)
    }

    /// User tempo override, in beats per minute
    /// While playing it takes effect at the next tick boundary.
    pub fn set_bpm(&mut self, bpm: f64) -> Result<(), TransportError> {
        self.reap_finished_loop()?;
        let mut engine = self.lock_engine()?;
        // The loop changes state only while holding the engine, so this
        // also covers a loop that just reached the end
        let playing = self.shared.state().is_playing();
        let clock = engine.clock.as_mut().ok_or(TransportError::NoSequence)?;
        clock.request_bpm(bpm);
        if !playing {
            clock.apply_pending();
            self.shared.publish(clock);
        }
        Ok(())
    }

    /// Block until the loop reaches the end of the sequence
    /// Returns immediately when nothing is playing.
    pub fn wait_until_finished(&mut self) -> Result<(), TransportError> {
        match self.loop_handle.take() {
            Some(handle) => handle.thread.join().map_err(|_| TransportError::LoopPanicked),
            None => Ok(()),
        }
    }

    /// Cancel and join the loop; true if it was running
    fn halt_loop(&mut self) -> Result<bool, TransportError> {
        match self.loop_handle.take() {
            Some(handle) => {
                // Full or disconnected both mean the loop is on its way out
                let _ = handle.cancel.try_send(());
                handle
                    .thread
                    .join()
                    .map_err(|_| TransportError::LoopPanicked)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Join a loop that ended on its own at the end of the sequence
    fn reap_finished_loop(&mut self) -> Result<(), TransportError> {
        if self
            .loop_handle
            .as_ref()
            .is_some_and(|h| h.thread.is_finished())
        {
            self.halt_loop()?;
        }
        Ok(())
    }

    fn lock_engine(&self) -> Result<MutexGuard<'_, Engine>, TransportError> {
        self.engine.lock().map_err(|_| TransportError::Poisoned)
    }
}

impl Drop for Sequencer {
    fn drop(&mut self) {
        if self.loop_handle.is_some() {
            if let Err(e) = self.pause() {
                log::error!("Failed to halt playback on drop: {}", e);
            }
        }
    }
}

/// Output wrapper counting failed sends during one step
struct CountingOutput<'a> {
    inner: &'a mut dyn MidiOutput,
    failures: usize,
}

impl MidiOutput for CountingOutput<'_> {
    fn send(&mut self, message: &MidiMessage) -> Result<(), OutputError> {
        let result = self.inner.send(message);
        if result.is_err() {
            self.failures += 1;
        }
        result
    }
}

fn notify(notifications: &Notifications, notification: Notification) {
    if let Ok(mut tx) = notifications.try_lock() {
        // Dropped when the reader falls behind
        let _ = tx.try_push(notification);
    }
}

fn report_poisoned(notifications: &Notifications) {
    log::error!("Sequencer state poisoned, playback loop exiting");
    notify(
        notifications,
        Notification::error(
            NotificationCategory::Playback,
            "Playback stopped: sequencer state poisoned".to_string(),
        ),
    );
}

/// The scheduling loop
///
/// Sleeps for the smallest pending delta at the current tempo, minus the
/// time already spent since the last tick boundary, then advances the clock.
/// The wait is the only blocking point and ends early on cancel.
fn run_loop(
    engine: Arc<Mutex<Engine>>,
    shared: Arc<SharedPlaybackState>,
    cancel: Receiver<()>,
    notifications: Notifications,
) {
    let mut last_boundary = Instant::now();

    loop {
        let (delta, wait) = {
            let Ok(mut guard) = engine.lock() else {
                report_poisoned(&notifications);
                return;
            };
            let Engine { clock, output } = &mut *guard;
            let Some(clock) = clock.as_mut() else {
                return;
            };

            match clock.next_delta() {
                Some(delta) => (delta, clock.wait_for(delta)),
                None => {
                    clock.silence(output.as_mut());
                    clock.rewind();
                    shared.set_state(TransportState::Stopped);
                    shared.publish(clock);
                    log::info!("Playback finished");
                    notify(
                        &notifications,
                        Notification::info(
                            NotificationCategory::Playback,
                            "Playback finished".to_string(),
                        ),
                    );
                    return;
                }
            }
        };

        let owed = wait.saturating_sub(last_boundary.elapsed());
        if owed.is_zero() {
            match cancel.try_recv() {
                Err(TryRecvError::Empty) => {}
                Ok(()) | Err(TryRecvError::Disconnected) => return,
            }
        } else {
            match cancel.recv_timeout(owed) {
                Err(RecvTimeoutError::Timeout) => {}
                Ok(()) | Err(RecvTimeoutError::Disconnected) => return,
            }
        }
        last_boundary = Instant::now();

        let Ok(mut guard) = engine.lock() else {
            report_poisoned(&notifications);
            return;
        };
        let Engine { clock, output } = &mut *guard;
        let Some(clock) = clock.as_mut() else {
            return;
        };

        let mut counting = CountingOutput {
            inner: output.as_mut(),
            failures: 0,
        };
        let report = clock.advance(delta, &mut counting);
        if counting.failures > 0 {
            notify(
                &notifications,
                Notification::warning(
                    NotificationCategory::Output,
                    format!(
                        "{} MIDI message(s) failed at tick {}",
                        counting.failures, report.tick
                    ),
                ),
            );
        }
        if report.tempo_changed {
            log::debug!(
                "Tick {}: tempo {:.1} BPM, {}",
                report.tick,
                clock.tempo().bpm(),
                clock.tempo().time_signature()
            );
        }
        shared.try_publish(clock);
    }
}
