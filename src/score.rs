// src/score.rs
//
// Input score data model.
//
// This is the surface the external MIDI decoder hands us: tracks of
// timed notes plus a total duration. The engine never mutates a score;
// it validates it once and derives its own structures from it.
//
// Key concepts:
// - ScoreNote / ScoreTrack / Score: the decoded input
// - NoteEvent: one immutable playable note (score note + channel)
// - NoteKey: hashable identity for active-set membership and diffing

/// A single decoded note as produced by the MIDI decoder.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScoreNote {
    /// MIDI note number (0-127).
    pub midi: u8,

    /// Start position in seconds from score start.
    pub time: f64,

    /// Duration in seconds.
    pub duration: f64,

    /// Velocity (0.0 - 1.0).
    pub velocity: f32,
}

impl ScoreNote {
    pub fn new(midi: u8, time: f64, duration: f64, velocity: f32) -> Self {
        Self {
            midi,
            time,
            duration,
            velocity: velocity.clamp(0.0, 1.0),
        }
    }
}

/// One decoded track: a channel plus its notes.
#[derive(Debug, Clone, Default)]
pub struct ScoreTrack {
    /// MIDI channel (0-15).
    pub channel: u8,

    /// Notes on this track (decoder order; not necessarily sorted).
    pub notes: Vec<ScoreNote>,
}

impl ScoreTrack {
    pub fn new(channel: u8) -> Self {
        Self {
            channel,
            notes: Vec::new(),
        }
    }

    pub fn add_note(&mut self, note: ScoreNote) {
        self.notes.push(note);
    }
}

/// A complete decoded score.
#[derive(Debug, Clone, Default)]
pub struct Score {
    /// All decoded tracks.
    pub tracks: Vec<ScoreTrack>,

    /// Total score length in seconds.
    pub duration: f64,
}

impl Score {
    pub fn new(duration: f64) -> Self {
        Self {
            tracks: Vec::new(),
            duration,
        }
    }

    pub fn add_track(&mut self, track: ScoreTrack) {
        self.tracks.push(track);
    }

    /// Total note count across all tracks.
    pub fn note_count(&self) -> usize {
        self.tracks.iter().map(|t| t.notes.len()).sum()
    }

    /// Structural validation of decoder output.
    ///
    /// Checks ranges, per-note sanity, identity-key uniqueness, and
    /// that the declared duration covers the note content. Runs once
    /// at load time; nothing downstream re-checks these.
    pub fn validate(&self) -> ScoreResult<()> {
        let mut seen = std::collections::HashSet::new();
        let mut content_end: f64 = 0.0;

        for (track_ix, track) in self.tracks.iter().enumerate() {
            if track.channel > 15 {
                return Err(ScoreError::InvalidChannel {
                    track: track_ix,
                    channel: track.channel,
                });
            }

            for (note_ix, note) in track.notes.iter().enumerate() {
                if note.midi > 127 {
                    return Err(ScoreError::InvalidPitch {
                        track: track_ix,
                        index: note_ix,
                        pitch: note.midi,
                    });
                }
                if !note.time.is_finite() || note.time < 0.0 {
                    return Err(ScoreError::InvalidStart {
                        track: track_ix,
                        index: note_ix,
                    });
                }
                if !note.duration.is_finite() || note.duration <= 0.0 {
                    return Err(ScoreError::InvalidDuration {
                        track: track_ix,
                        index: note_ix,
                    });
                }

                let key = NoteKey::new(note.midi, track.channel, note.time);
                if !seen.insert(key) {
                    return Err(ScoreError::DuplicateNote {
                        pitch: note.midi,
                        channel: track.channel,
                        start: note.time,
                    });
                }

                content_end = content_end.max(note.time + note.duration);
            }
        }

        if self.duration < content_end {
            return Err(ScoreError::TruncatedDuration {
                declared: self.duration,
                content: content_end,
            });
        }

        Ok(())
    }
}

/// One immutable playable note: a score note bound to its channel.
///
/// Created once per loaded score and never mutated afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoteEvent {
    /// MIDI note number (0-127).
    pub pitch: u8,

    /// MIDI channel (0-15).
    pub channel: u8,

    /// Start position in seconds.
    pub start: f64,

    /// Duration in seconds.
    pub duration: f64,

    /// Velocity (0.0 - 1.0).
    pub velocity: f32,
}

impl NoteEvent {
    pub fn new(pitch: u8, channel: u8, start: f64, duration: f64, velocity: f32) -> Self {
        Self {
            pitch,
            channel,
            start,
            duration,
            velocity: velocity.clamp(0.0, 1.0),
        }
    }

    /// End position in seconds.
    #[inline]
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Whether this note is sounding at `time` (half-open interval:
    /// active at `start`, finished at `start + duration`).
    #[inline]
    pub fn is_sounding_at(&self, time: f64) -> bool {
        self.start <= time && time < self.end()
    }

    /// Identity key for set membership.
    #[inline]
    pub fn key(&self) -> NoteKey {
        NoteKey::new(self.pitch, self.channel, self.start)
    }
}

/// Hashable identity of a note within a score.
///
/// `(pitch, channel, start)` must be unique in a loaded score; the
/// start time is carried as its bit pattern so the key can be hashed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NoteKey {
    pub pitch: u8,
    pub channel: u8,
    start_bits: u64,
}

impl NoteKey {
    pub fn new(pitch: u8, channel: u8, start: f64) -> Self {
        Self {
            pitch,
            channel,
            start_bits: start.to_bits(),
        }
    }

    /// Start time in seconds.
    #[inline]
    pub fn start(&self) -> f64 {
        f64::from_bits(self.start_bits)
    }
}

/// Error for malformed decoder output.
#[derive(Debug, Clone, PartialEq)]
pub enum ScoreError {
    /// A track carries a channel outside 0-15.
    InvalidChannel { track: usize, channel: u8 },

    /// A note carries a pitch outside 0-127.
    InvalidPitch { track: usize, index: usize, pitch: u8 },

    /// A note starts before zero (or at a non-finite time).
    InvalidStart { track: usize, index: usize },

    /// A note has a non-positive (or non-finite) duration.
    InvalidDuration { track: usize, index: usize },

    /// Two notes share the same (pitch, channel, start) identity.
    DuplicateNote { pitch: u8, channel: u8, start: f64 },

    /// The declared score duration ends before the note content does.
    TruncatedDuration { declared: f64, content: f64 },
}

impl std::fmt::Display for ScoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ScoreError::InvalidChannel { track, channel } => {
                write!(f, "Track {} has invalid channel {}", track, channel)
            }
            ScoreError::InvalidPitch { track, index, pitch } => {
                write!(f, "Note {}:{} has invalid pitch {}", track, index, pitch)
            }
            ScoreError::InvalidStart { track, index } => {
                write!(f, "Note {}:{} has an invalid start time", track, index)
            }
            ScoreError::InvalidDuration { track, index } => {
                write!(f, "Note {}:{} has an invalid duration", track, index)
            }
            ScoreError::DuplicateNote {
                pitch,
                channel,
                start,
            } => {
                write!(
                    f,
                    "Duplicate note: pitch {} channel {} at {:.3}s",
                    pitch, channel, start
                )
            }
            ScoreError::TruncatedDuration { declared, content } => {
                write!(
                    f,
                    "Declared duration {:.3}s ends before note content at {:.3}s",
                    declared, content
                )
            }
        }
    }
}

impl std::error::Error for ScoreError {}

/// Result of score validation.
pub type ScoreResult<T> = Result<T, ScoreError>;
