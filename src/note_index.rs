// src/note_index.rs
//
// Chronological note index.
//
// Built once per loaded score, the index is the shared read-only view
// both audio scheduling and visual culling work from:
// - a flat, stably start-sorted sequence of playable notes (the
//   synchronizer's cursor walks this)
// - per-channel groups in channel order (one GPU batch each)
//
// Percussion is filtered out here; everything downstream only ever
// sees playable notes.

use crate::config::EngineConfig;
use crate::score::{NoteEvent, Score};

/// All playable notes of one channel, start-sorted.
#[derive(Debug, Clone)]
pub struct ChannelGroup {
    /// MIDI channel.
    pub channel: u8,

    /// Notes on this channel, sorted by start time (stable).
    pub notes: Vec<NoteEvent>,
}

/// Immutable index over a loaded score's playable notes.
#[derive(Debug, Clone)]
pub struct NoteIndex {
    /// All playable notes, sorted by start time (stable; ties keep
    /// score order for determinism).
    notes: Vec<NoteEvent>,

    /// Per-channel groups in ascending channel order.
    channels: Vec<ChannelGroup>,

    /// Total score length in seconds.
    total_duration: f64,
}

impl NoteIndex {
    /// Build the index from a decoded score.
    ///
    /// Filters out the percussion channel. Fails with
    /// `EmptyScoreError` when no playable notes remain — callers may
    /// treat that as a benign empty state rather than a fatal error.
    pub fn build(score: &Score, config: &EngineConfig) -> IndexResult<Self> {
        let mut notes: Vec<NoteEvent> = Vec::with_capacity(score.note_count());

        for track in &score.tracks {
            if track.channel == config.percussion_channel {
                continue;
            }
            for note in &track.notes {
                notes.push(NoteEvent::new(
                    note.midi,
                    track.channel,
                    note.time,
                    note.duration,
                    note.velocity,
                ));
            }
        }

        if notes.is_empty() {
            return Err(EmptyScoreError);
        }

        // Stable sort: simultaneous notes keep score order.
        notes.sort_by(|a, b| a.start.total_cmp(&b.start));

        // Group by channel, channels in ascending order so batch
        // allocation is deterministic across loads.
        let mut channels: Vec<ChannelGroup> = Vec::new();
        for note in &notes {
            match channels.iter_mut().find(|g| g.channel == note.channel) {
                Some(group) => group.notes.push(*note),
                None => channels.push(ChannelGroup {
                    channel: note.channel,
                    notes: vec![*note],
                }),
            }
        }
        channels.sort_by_key(|g| g.channel);

        Ok(Self {
            notes,
            channels,
            total_duration: score.duration,
        })
    }

    /// All playable notes in chronological order.
    #[inline]
    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    /// Per-channel groups in ascending channel order.
    #[inline]
    pub fn channels(&self) -> &[ChannelGroup] {
        &self.channels
    }

    /// Number of playable notes.
    #[inline]
    pub fn len(&self) -> usize {
        self.notes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Total score length in seconds.
    #[inline]
    pub fn total_duration(&self) -> f64 {
        self.total_duration
    }

    /// Index of the first note with `start >= time`.
    ///
    /// Used to recompute the playback cursor after a seek; `len()`
    /// when every note starts before `time`.
    pub fn first_at_or_after(&self, time: f64) -> usize {
        self.notes.partition_point(|n| n.start < time)
    }
}

/// No playable notes remain after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmptyScoreError;

impl std::fmt::Display for EmptyScoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Score contains no playable notes")
    }
}

impl std::error::Error for EmptyScoreError {}

/// Result of index construction.
pub type IndexResult<T> = Result<T, EmptyScoreError>;
