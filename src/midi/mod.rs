// MIDI module - file loading, event model and output ports

pub mod event;
pub mod loader;
pub mod output;

pub use event::{Event, MidiMessage};
pub use loader::{LoadError, load_file, load_sequence, load_sequence_with_fallback};
pub use output::{MidiOutput, MidirOutput, NullOutput, OutputError, RecordingOutput};
