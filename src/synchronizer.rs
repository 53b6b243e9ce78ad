// src/synchronizer.rs
//
// Playback synchronizer.
//
// The per-frame driver: given the transport's elapsed time, it decides
// which notes start and stop this frame, drives the audio sink and the
// keyboard, and maintains the active-note set everything else reads.
//
// Two-speed design:
// - advance(): cheap incremental sweeps, valid only while elapsed is
//   non-decreasing (normal forward playback)
// - resync(): full rescan after any discontinuity (seek/skip/load/
//   end-of-score) — stops audio, rebuilds the active set, and
//   re-admits already-sounding notes silently (no audio re-trigger)
//
// The cursor and active set are owned here exclusively; the instance
// store and keyboard only ever receive reads/diffs.

use std::collections::HashSet;

use crate::audio::AudioSink;
use crate::config::EngineConfig;
use crate::keyboard::KeyboardState;
use crate::note_index::NoteIndex;
use crate::score::NoteKey;

/// The set of notes currently sounding.
///
/// Owned and mutated only by the synchronizer; the instance store gets
/// a shared reference each frame for membership tests.
#[derive(Debug, Default)]
pub struct ActiveNoteSet {
    keys: HashSet<NoteKey>,
}

impl ActiveNoteSet {
    #[inline]
    pub fn contains(&self, key: &NoteKey) -> bool {
        self.keys.contains(key)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NoteKey> {
        self.keys.iter()
    }

    fn insert(&mut self, key: NoteKey) {
        self.keys.insert(key);
    }

    fn remove(&mut self, key: &NoteKey) {
        self.keys.remove(key);
    }

    fn clear(&mut self) {
        self.keys.clear();
    }
}

/// Played/total note counters for the UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct NoteStats {
    /// Notes whose start time has passed.
    pub played: usize,

    /// Total playable notes in the score.
    pub total: usize,
}

/// One sounding note tracked for its note-off.
#[derive(Debug, Clone, Copy)]
struct ActiveEntry {
    key: NoteKey,
    pitch: u8,
    end: f64,
}

/// Per-frame playback driver.
///
/// Responsibilities:
/// - advance the next-note cursor and fire note-ons
/// - sweep ended notes and fire note-offs
/// - keep the active set and keyboard consistent with elapsed time
///
/// Does NOT:
/// - read clocks (elapsed comes from the transport)
/// - touch instance colors/transforms (the store does, from the set)
pub struct PlaybackSynchronizer {
    /// Index of the next note to trigger. Monotonic while advancing;
    /// recomputed (never incremented) on resync.
    cursor: usize,

    /// Sounding notes awaiting their note-off.
    active: Vec<ActiveEntry>,

    /// Membership view of `active`, kept in lockstep.
    active_keys: ActiveNoteSet,

    /// When true the audio layer self-terminates notes and the
    /// off-sweep skips explicit stops.
    self_terminating: bool,
}

impl PlaybackSynchronizer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            cursor: 0,
            active: Vec::with_capacity(32),
            active_keys: ActiveNoteSet::default(),
            self_terminating: config.self_terminating_audio,
        }
    }

    /// Forget all playback state (new score, teardown).
    pub fn reset(&mut self) {
        self.cursor = 0;
        self.active.clear();
        self.active_keys.clear();
    }

    /// One normal forward frame.
    ///
    /// Requires elapsed to be non-decreasing since the previous call;
    /// any discontinuity must go through `resync` instead. Off- and
    /// on-sweeps both evaluate the same `elapsed`; the off-sweep runs
    /// first so a repeated pitch ending and restarting this frame
    /// leaves its key lit.
    pub fn advance(
        &mut self,
        index: &NoteIndex,
        elapsed: f64,
        audio: &mut dyn AudioSink,
        keyboard: &mut KeyboardState,
        config: &EngineConfig,
    ) {
        // Notes-off sweep.
        let mut i = 0;
        while i < self.active.len() {
            if self.active[i].end <= elapsed {
                let entry = self.active.swap_remove(i);
                self.active_keys.remove(&entry.key);
                if !self.self_terminating {
                    audio.stop_note(entry.pitch);
                }
                keyboard.release_key(entry.pitch);
                // Don't advance i: check the swapped-in element.
            } else {
                i += 1;
            }
        }

        // Notes-on sweep.
        let notes = index.notes();
        while self.cursor < notes.len() && notes[self.cursor].start <= elapsed {
            let note = notes[self.cursor];
            self.cursor += 1;

            audio.trigger_note(
                note.pitch,
                note.channel,
                note.velocity,
                note.duration,
                self.self_terminating,
            );
            keyboard.press_key(note.pitch, press_color(config, note.channel));
            self.active.push(ActiveEntry {
                key: note.key(),
                pitch: note.pitch,
                end: note.end(),
            });
            self.active_keys.insert(note.key());
        }
    }

    /// Full re-synchronization after a discontinuity.
    ///
    /// Stops all audio, releases the keyboard, recomputes the cursor,
    /// and re-admits notes already sounding at `elapsed` with a key
    /// press but WITHOUT re-triggering their audio — restarting a
    /// mid-flight note is audible, silence is not.
    ///
    /// Re-admission is strict (`start < elapsed`): a note starting
    /// exactly at the seek point is left to the next `advance`, which
    /// triggers it with audio like any other fresh note. Callers that
    /// are playing should advance at the same `elapsed` right after.
    pub fn resync(
        &mut self,
        index: &NoteIndex,
        elapsed: f64,
        audio: &mut dyn AudioSink,
        keyboard: &mut KeyboardState,
        config: &EngineConfig,
    ) {
        audio.stop_all();
        keyboard.release_all();
        self.active.clear();
        self.active_keys.clear();

        self.cursor = index.first_at_or_after(elapsed);

        // Already-sounding notes can start anywhere before the cursor,
        // so this scans the whole index, not just around it. Runs only
        // on discontinuities.
        for note in index.notes() {
            if note.start >= elapsed {
                break;
            }
            if note.end() > elapsed {
                keyboard.press_key(note.pitch, press_color(config, note.channel));
                self.active.push(ActiveEntry {
                    key: note.key(),
                    pitch: note.pitch,
                    end: note.end(),
                });
                self.active_keys.insert(note.key());
            }
        }
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    /// The current active-note set.
    #[inline]
    pub fn active(&self) -> &ActiveNoteSet {
        &self.active_keys
    }

    /// Number of sounding notes.
    #[inline]
    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Played/total counters for the UI.
    pub fn stats(&self, index: &NoteIndex) -> NoteStats {
        NoteStats {
            played: self.cursor,
            total: index.len(),
        }
    }
}

/// Key color for a sounding note: the channel color with the same
/// brightening the note's bar gets.
fn press_color(config: &EngineConfig, channel: u8) -> crate::render::Color {
    config.channel_color(channel).brightened(config.active_brightness)
}
