// src/audio.rs
//
// Audio seam.
//
// The audio engine is an external collaborator; the synchronizer
// drives it through this trait. Note triggering is fire-and-forget
// (future timestamps on the audio clock, never blocking), and the
// trait is also the engine's only clock source: the transport consumes
// `clock_time()` exclusively, so visual position and audible note-on
// timing live in the same clock domain.

use crate::instrument::InstrumentSource;

/// Audio backend driven by the playback synchronizer.
pub trait AudioSink {
    /// Start a note. When `match_duration` is true the backend
    /// schedules its own stop at `duration` seconds and no explicit
    /// `stop_note` will follow.
    fn trigger_note(
        &mut self,
        pitch: u8,
        channel: u8,
        velocity: f32,
        duration: f64,
        match_duration: bool,
    );

    /// Stop a sounding note.
    fn stop_note(&mut self, pitch: u8);

    /// Stop everything (seek, stop, teardown).
    fn stop_all(&mut self);

    /// Current audio-clock time in seconds. Monotonic.
    fn clock_time(&self) -> f64;

    /// Per-channel gain (0.0 - 1.0).
    fn set_channel_volume(&mut self, channel: u8, level: f32);

    /// Assign a resolved instrument source to a channel.
    fn set_instrument(&mut self, channel: u8, source: InstrumentSource);
}
