// src/config.rs
//
// Engine configuration.
//
// Every policy constant the engine depends on lives here so tests (and
// hosts) can override them: percussion exclusion, visible pitch range,
// time-to-depth scaling, the culling window, and the color treatment
// of active/finished notes.

use crate::render::Color;

/// Default per-channel base colors. Channels beyond the palette wrap.
pub const DEFAULT_PALETTE: [Color; 8] = [
    Color::rgb(0.22, 0.56, 0.89), // blue
    Color::rgb(0.89, 0.45, 0.19), // orange
    Color::rgb(0.30, 0.75, 0.38), // green
    Color::rgb(0.82, 0.26, 0.30), // red
    Color::rgb(0.58, 0.40, 0.82), // purple
    Color::rgb(0.36, 0.70, 0.70), // teal
    Color::rgb(0.85, 0.68, 0.22), // gold
    Color::rgb(0.78, 0.42, 0.62), // magenta
];

/// Engine-wide configuration.
///
/// Constructed once and shared read-only by the index, the instance
/// store, and the synchronizer. `Default` matches the converged
/// behavior of the visualizer this engine models.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// MIDI channel excluded from visualization and playback
    /// (channel 9 is percussion by convention).
    pub percussion_channel: u8,

    /// Lowest pitch the visual keyboard can represent (A0 = 21).
    pub min_pitch: u8,

    /// Highest pitch the visual keyboard can represent (C8 = 108).
    pub max_pitch: u8,

    /// Seconds-to-world-units scale for bar depth and length.
    pub time_scale: f32,

    /// Seconds of already-played material kept visible behind the
    /// playhead.
    pub lookbehind: f64,

    /// Seconds of upcoming material kept visible ahead of the playhead.
    pub lookahead: f64,

    /// Additive brightness applied to a note's base color while it is
    /// sounding.
    pub active_brightness: f32,

    /// Multiplicative darkening applied once a note has finished.
    pub played_darken: f32,

    /// Per-channel base colors (wraps for channels past the end).
    pub channel_palette: Vec<Color>,

    /// When true the audio layer self-terminates notes at
    /// `start + duration` and the off-sweep skips explicit stops.
    pub self_terminating_audio: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            percussion_channel: 9,
            min_pitch: 21,
            max_pitch: 108,
            time_scale: 4.0,
            lookbehind: 5.0,
            lookahead: 15.0,
            active_brightness: 0.5,
            played_darken: 0.4,
            channel_palette: DEFAULT_PALETTE.to_vec(),
            self_terminating_audio: false,
        }
    }
}

impl EngineConfig {
    /// Base color for a channel's notes.
    #[inline]
    pub fn channel_color(&self, channel: u8) -> Color {
        self.channel_palette[channel as usize % self.channel_palette.len()]
    }

    /// Whether a pitch fits on the visual keyboard.
    #[inline]
    pub fn pitch_in_range(&self, pitch: u8) -> bool {
        (self.min_pitch..=self.max_pitch).contains(&pitch)
    }
}
