// src/lib.rs
//
// Falling-bar score visualization engine: playback synchronization
// plus instanced-rendering state, driven one frame per display
// refresh. MIDI decoding, audio synthesis, and the rendering backend
// are external collaborators behind the traits in `audio`, `render`,
// and `instrument`.

mod config;
mod instances;
mod instrument;
mod keyboard;
mod note_index;
mod player;
mod score;
mod synchronizer;
mod transport;

pub mod audio;
pub mod render;

#[cfg(test)]
mod testing;

// Re-export the public surface.
pub use config::EngineConfig;
pub use instances::{InstanceStore, NoteInstance, NoteVisualState};
pub use instrument::{
    resolve_instrument, InstrumentSource, ResourceLoadError, ResourceResult, SampleBankId,
    SampleLibrary, Waveform,
};
pub use keyboard::KeyboardState;
pub use note_index::{ChannelGroup, EmptyScoreError, IndexResult, NoteIndex};
pub use player::{LoadError, LoadResult, LoadToken, Player, Progress};
pub use score::{NoteEvent, NoteKey, Score, ScoreError, ScoreNote, ScoreResult, ScoreTrack};
pub use synchronizer::{ActiveNoteSet, NoteStats, PlaybackSynchronizer};
pub use transport::{PlaybackState, Transport, TransportTick};
