// Sequencer module
// Track timelines, tempo model, the tick clock and transport control

pub mod clock;
pub mod cursor;
pub mod sequence;
pub mod tempo;
pub mod transport;

pub use clock::{PlaybackSnapshot, SequencerClock, StepReport, TrackSnapshot};
pub use cursor::TrackCursor;
pub use sequence::{ParsedSequence, SequenceSummary, Timeline, TimelineEntry, Track, TrackEvent};
pub use tempo::{TempoModel, TimeSignature};
pub use transport::{Sequencer, SharedPlaybackState, TransportError, TransportState};
