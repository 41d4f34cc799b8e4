// MIDI Orchestrator - Library exports for the player binary, tests and benchmarks

pub mod config;
pub mod messaging;
pub mod midi;
pub mod sequencer;

// Re-export commonly used types for convenience
pub use config::{ConfigError, PlayerConfig};
pub use messaging::channels::create_notification_channel;
pub use midi::event::{Event, MidiMessage};
pub use midi::loader::{LoadError, load_file, load_sequence};
pub use midi::output::{MidiOutput, MidirOutput, NullOutput, OutputError, RecordingOutput};
pub use sequencer::{
    ParsedSequence, PlaybackSnapshot, Sequencer, SequencerClock, StepReport, TempoModel,
    TimeSignature, TrackCursor, TransportError, TransportState,
};
