// src/player.rs
//
// Player facade.
//
// Wires the transport, synchronizer, keyboard, and instance store
// together and exposes the surface the UI layer drives: load, play,
// pause, seek, skip, progress, per-channel volume/mute/instrument, and
// the note-stats callback.
//
// One `frame()` call per display refresh. The audio backend's clock is
// the only clock read anywhere, and it is read exactly once per frame;
// the off-sweep, on-sweep, and instance update all see that same
// elapsed value.

use std::collections::HashMap;

use log::{info, warn};

use crate::audio::AudioSink;
use crate::config::EngineConfig;
use crate::instances::InstanceStore;
use crate::instrument::{resolve_instrument, SampleLibrary, Waveform};
use crate::keyboard::KeyboardState;
use crate::note_index::NoteIndex;
use crate::render::{InstancedRenderer, KeyLayout, KeySurface};
use crate::score::{Score, ScoreError};
use crate::synchronizer::{NoteStats, PlaybackSynchronizer};
use crate::transport::{PlaybackState, Transport};

/// Batch opacity applied to a visually muted channel.
const MUTED_OPACITY: f32 = 0.25;

/// Playback position for the UI.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Progress {
    pub elapsed: f64,
    pub total: f64,
}

/// Ticket for an asynchronous score load.
///
/// Issued by `begin_load`; a newer `begin_load` (or a direct
/// `load_score`) invalidates all earlier tickets, so a slow load that
/// finishes after a newer one started cannot clobber engine state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoadToken {
    generation: u64,
}

/// The playback engine facade.
pub struct Player {
    audio: Box<dyn AudioSink>,
    layout: Box<dyn KeyLayout>,
    keyboard: KeyboardState,
    instances: InstanceStore,
    transport: Transport,
    sync: PlaybackSynchronizer,
    index: Option<NoteIndex>,
    config: EngineConfig,

    /// Set on any time discontinuity (load, seek, skip, end-of-score);
    /// the next frame runs the full re-sync path instead of the
    /// incremental sweeps.
    pending_resync: bool,

    /// Bumped on every load; stale `LoadToken`s are ignored.
    generation: u64,

    /// Per-channel volume remembered across mute/unmute.
    channel_volumes: HashMap<u8, f32>,
    muted_channels: Vec<u8>,

    stats: NoteStats,
    stats_callback: Option<Box<dyn FnMut(NoteStats)>>,
}

impl Player {
    pub fn new(
        audio: Box<dyn AudioSink>,
        renderer: Box<dyn InstancedRenderer>,
        surface: Box<dyn KeySurface>,
        layout: Box<dyn KeyLayout>,
        config: EngineConfig,
    ) -> Self {
        Self {
            audio,
            layout,
            keyboard: KeyboardState::new(surface),
            instances: InstanceStore::new(renderer, config.clone()),
            transport: Transport::new(),
            sync: PlaybackSynchronizer::new(&config),
            index: None,
            config,
            pending_resync: false,
            generation: 0,
            channel_volumes: HashMap::new(),
            muted_channels: Vec::new(),
            stats: NoteStats::default(),
            stats_callback: None,
        }
    }

    // -------------------------------
    // MARK: Score loading
    // -------------------------------

    /// Load a decoded score, replacing the current one.
    ///
    /// Malformed scores are rejected and leave the current score
    /// untouched. An empty score (nothing playable after percussion
    /// filtering) unloads to the empty state and reports
    /// `LoadError::EmptyScore`, which callers may treat as benign.
    pub fn load_score(&mut self, score: &Score) -> LoadResult<()> {
        self.generation += 1;

        score.validate().map_err(LoadError::Malformed)?;

        let index = match NoteIndex::build(score, &self.config) {
            Ok(index) => index,
            Err(_) => {
                self.unload();
                return Err(LoadError::EmptyScore);
            }
        };

        self.audio.stop_all();
        self.keyboard.release_all();
        self.instances.build(&index, self.layout.as_ref());
        self.transport.load(index.total_duration());
        self.sync.reset();
        self.pending_resync = true;

        info!(
            "score loaded: {} notes on {} channels, {:.1}s",
            index.len(),
            index.channels().len(),
            index.total_duration()
        );

        self.index = Some(index);
        self.emit_stats();
        Ok(())
    }

    /// Start an asynchronous load, invalidating any in-flight one.
    pub fn begin_load(&mut self) -> LoadToken {
        self.generation += 1;
        LoadToken {
            generation: self.generation,
        }
    }

    /// Complete an asynchronous load. Returns Ok(false) — without
    /// touching any state — when the token has been superseded.
    pub fn complete_load(&mut self, token: LoadToken, score: &Score) -> LoadResult<bool> {
        if token.generation != self.generation {
            warn!(
                "ignoring stale score load (generation {} < {})",
                token.generation, self.generation
            );
            return Ok(false);
        }
        self.load_score(score)?;
        Ok(true)
    }

    /// Drop the current score and all of its state.
    pub fn unload(&mut self) {
        self.audio.stop_all();
        self.keyboard.release_all();
        self.instances.dispose();
        self.transport.unload();
        self.sync.reset();
        self.index = None;
        self.pending_resync = false;
        self.emit_stats();
    }

    // -------------------------------
    // MARK: Transport controls
    // -------------------------------

    /// Start or resume playback. No-op when no score is loaded.
    pub fn play(&mut self) {
        let now = self.audio.clock_time();
        self.transport.play(now);
    }

    /// Freeze playback. Sounding notes are silenced but stay in the
    /// active set; resuming continues them visually without an audio
    /// re-trigger, same as resuming from a seek.
    pub fn pause(&mut self) {
        if !self.transport.is_playing() {
            return;
        }
        let now = self.audio.clock_time();
        self.transport.pause(now);
        self.audio.stop_all();
    }

    /// Halt playback and rewind to the start.
    pub fn stop(&mut self) {
        if !self.transport.is_loaded() {
            return;
        }
        self.transport.stop();
        self.pending_resync = true;
    }

    /// Jump to an absolute position (seconds). Out-of-bounds targets
    /// are clamped silently. Returns the clamped position.
    pub fn seek(&mut self, target: f64) -> f64 {
        if !self.transport.is_loaded() {
            return 0.0;
        }
        let now = self.audio.clock_time();
        let clamped = self.transport.seek(target, now);
        self.pending_resync = true;
        clamped
    }

    /// Jump relative to the current position (seconds).
    pub fn skip(&mut self, delta: f64) -> f64 {
        if !self.transport.is_loaded() {
            return 0.0;
        }
        let now = self.audio.clock_time();
        let clamped = self.transport.skip(delta, now);
        self.pending_resync = true;
        clamped
    }

    // -------------------------------
    // MARK: Per-frame drive
    // -------------------------------

    /// Run one frame: advance the transport, synchronize audio and
    /// keyboard, and update instance visuals. Call once per display
    /// refresh. Cheap no-op when no score is loaded.
    pub fn frame(&mut self) {
        let Some(index) = self.index.as_ref() else {
            return;
        };

        let now = self.audio.clock_time();
        let tick = self.transport.tick(now);
        if tick.reached_end {
            // Transport already stopped and reset; treat the jump back
            // to zero as a discontinuity.
            self.pending_resync = true;
        }
        let elapsed = if tick.reached_end { 0.0 } else { tick.elapsed };

        if self.pending_resync {
            self.instances.reset_visuals();
            self.sync.resync(
                index,
                elapsed,
                self.audio.as_mut(),
                &mut self.keyboard,
                &self.config,
            );
            self.pending_resync = false;
            // Notes starting exactly at the new position are not
            // re-admitted by the rescan; while playing they get their
            // real trigger from an advance at the same elapsed.
            if self.transport.is_playing() {
                self.sync.advance(
                    index,
                    elapsed,
                    self.audio.as_mut(),
                    &mut self.keyboard,
                    &self.config,
                );
            }
        } else if self.transport.is_playing() {
            self.sync.advance(
                index,
                elapsed,
                self.audio.as_mut(),
                &mut self.keyboard,
                &self.config,
            );
        }

        // Always, even while paused at a fresh seek position.
        self.instances.update(elapsed, self.sync.active());
        self.emit_stats();
    }

    // -------------------------------
    // MARK: Channels & instruments
    // -------------------------------

    /// Per-channel audio gain. Remembered across mute/unmute.
    pub fn set_channel_volume(&mut self, channel: u8, level: f32) {
        let level = level.clamp(0.0, 1.0);
        self.channel_volumes.insert(channel, level);
        if !self.muted_channels.contains(&channel) {
            self.audio.set_channel_volume(channel, level);
        }
    }

    /// Mute or unmute a channel, audibly and visually: muted channels
    /// play at zero gain and their bars dim to a fixed opacity.
    pub fn set_channel_muted(&mut self, channel: u8, muted: bool) {
        if muted {
            if !self.muted_channels.contains(&channel) {
                self.muted_channels.push(channel);
            }
            self.audio.set_channel_volume(channel, 0.0);
            self.instances.set_channel_opacity(channel, MUTED_OPACITY);
        } else {
            self.muted_channels.retain(|c| *c != channel);
            let level = self.channel_volumes.get(&channel).copied().unwrap_or(1.0);
            self.audio.set_channel_volume(channel, level);
            self.instances.set_channel_opacity(channel, 1.0);
        }
    }

    /// Assign an instrument to a channel, resolving it once. A failed
    /// sample fetch degrades to the fallback oscillator.
    pub fn assign_instrument(
        &mut self,
        channel: u8,
        instrument_id: u32,
        library: &mut dyn SampleLibrary,
        fallback: Waveform,
    ) {
        let source = resolve_instrument(library, channel, instrument_id, fallback);
        self.audio.set_instrument(channel, source);
    }

    // -------------------------------
    // MARK: Readback
    // -------------------------------

    /// Elapsed/total playback position.
    pub fn progress(&self) -> Progress {
        Progress {
            elapsed: self.transport.position(self.audio.clock_time()),
            total: self.transport.total_duration(),
        }
    }

    /// Register the played/total counter callback. Fired whenever the
    /// counts change (including on load).
    pub fn on_stats_changed(&mut self, callback: impl FnMut(NoteStats) + 'static) {
        self.stats_callback = Some(Box::new(callback));
    }

    #[inline]
    pub fn playback_state(&self) -> PlaybackState {
        self.transport.state()
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.transport.is_playing()
    }

    #[inline]
    pub fn has_score(&self) -> bool {
        self.index.is_some()
    }

    /// Current note counters.
    #[inline]
    pub fn stats(&self) -> NoteStats {
        self.stats
    }

    fn emit_stats(&mut self) {
        let stats = match self.index.as_ref() {
            Some(index) => self.sync.stats(index),
            None => NoteStats::default(),
        };
        if stats != self.stats {
            self.stats = stats;
            if let Some(callback) = self.stats_callback.as_mut() {
                callback(stats);
            }
        }
    }
}

/// Error loading a score.
#[derive(Debug, Clone, PartialEq)]
pub enum LoadError {
    /// The decoder output is structurally invalid. The previously
    /// loaded score, if any, is untouched.
    Malformed(ScoreError),

    /// Nothing playable after filtering. The player is now empty;
    /// callers may treat this as a benign empty state.
    EmptyScore,
}

impl std::fmt::Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::Malformed(err) => write!(f, "Malformed score: {}", err),
            LoadError::EmptyScore => write!(f, "Score contains no playable notes"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::Malformed(err) => Some(err),
            LoadError::EmptyScore => None,
        }
    }
}

/// Result of a score load.
pub type LoadResult<T> = Result<T, LoadError>;

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::*;
    use crate::score::{ScoreNote, ScoreTrack};
    use crate::testing::{
        AudioCall, AudioLog, LinearLayout, RenderLog, SharedAudio, SharedRenderer, SharedSurface,
        SurfaceLog,
    };

    struct Fixture {
        player: Player,
        audio: Rc<RefCell<AudioLog>>,
        render: Rc<RefCell<RenderLog>>,
        surface: Rc<RefCell<SurfaceLog>>,
    }

    fn make_player() -> Fixture {
        let (audio, audio_log) = SharedAudio::new();
        let (renderer, render_log) = SharedRenderer::new();
        let (surface, surface_log) = SharedSurface::new();
        let player = Player::new(
            Box::new(audio),
            Box::new(renderer),
            Box::new(surface),
            Box::new(LinearLayout::default()),
            EngineConfig::default(),
        );
        Fixture {
            player,
            audio: audio_log,
            render: render_log,
            surface: surface_log,
        }
    }

    fn make_score() -> Score {
        let mut score = Score::new(3.0);
        let mut track = ScoreTrack::new(0);
        track.add_note(ScoreNote::new(60, 0.0, 1.0, 0.8));
        track.add_note(ScoreNote::new(62, 0.5, 1.0, 0.8));
        track.add_note(ScoreNote::new(64, 2.0, 0.5, 0.8));
        score.add_track(track);
        score
    }

    fn set_clock(fixture: &Fixture, t: f64) {
        fixture.audio.borrow_mut().clock = t;
    }

    #[test]
    fn test_play_without_score_is_noop() {
        let mut fx = make_player();
        fx.player.play();
        assert!(!fx.player.is_playing());
        fx.player.frame();
        assert_eq!(fx.player.progress().total, 0.0);
    }

    #[test]
    fn test_load_builds_batches_and_reports_stats() {
        let mut fx = make_player();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        fx.player
            .on_stats_changed(move |stats| sink.borrow_mut().push(stats));

        fx.player.load_score(&make_score()).unwrap();
        assert!(fx.player.has_score());
        assert_eq!(fx.render.borrow().batch_sizes, vec![3]);
        assert_eq!(
            seen.borrow().last().copied(),
            Some(NoteStats { played: 0, total: 3 })
        );
    }

    #[test]
    fn test_malformed_score_keeps_current_one() {
        let mut fx = make_player();
        fx.player.load_score(&make_score()).unwrap();

        let mut bad = make_score();
        bad.tracks[0].notes[0].duration = -1.0;
        assert!(matches!(
            fx.player.load_score(&bad),
            Err(LoadError::Malformed(_))
        ));
        assert!(fx.player.has_score());
        assert_eq!(fx.player.progress().total, 3.0);
    }

    #[test]
    fn test_empty_score_unloads() {
        let mut fx = make_player();
        fx.player.load_score(&make_score()).unwrap();

        let mut drums_only = Score::new(1.0);
        let mut drums = ScoreTrack::new(9);
        drums.add_note(ScoreNote::new(36, 0.0, 0.1, 1.0));
        drums_only.add_track(drums);

        assert_eq!(
            fx.player.load_score(&drums_only),
            Err(LoadError::EmptyScore)
        );
        assert!(!fx.player.has_score());
    }

    #[test]
    fn test_playback_triggers_and_finishes_notes() {
        let mut fx = make_player();
        fx.player.load_score(&make_score()).unwrap();

        set_clock(&fx, 100.0);
        fx.player.frame(); // resync at 0 while stopped
        fx.player.play();
        fx.player.frame();
        assert_eq!(fx.audio.borrow().triggered_pitches(), vec![60]);
        assert!(fx.surface.borrow().lit.contains_key(&60));

        set_clock(&fx, 100.6);
        fx.player.frame();
        assert_eq!(fx.audio.borrow().triggered_pitches(), vec![60, 62]);

        set_clock(&fx, 101.1);
        fx.player.frame();
        assert_eq!(fx.audio.borrow().stopped_pitches(), vec![60]);
        assert!(!fx.surface.borrow().lit.contains_key(&60));
        assert_eq!(fx.player.stats().played, 2);
    }

    #[test]
    fn test_seek_resyncs_without_retrigger() {
        let mut fx = make_player();
        fx.player.load_score(&make_score()).unwrap();
        set_clock(&fx, 100.0);
        fx.player.frame();

        let calls_before = fx.audio.borrow().calls.len();
        fx.player.seek(0.75);
        fx.player.frame();

        // Only a StopAll; sounding notes resume silently.
        let calls = fx.audio.borrow().calls[calls_before..].to_vec();
        assert_eq!(calls, vec![AudioCall::StopAll]);
        assert!(fx.surface.borrow().lit.contains_key(&60));
        assert!(fx.surface.borrow().lit.contains_key(&62));
        assert_eq!(fx.player.stats().played, 2);
    }

    #[test]
    fn test_seek_clamps_and_is_deterministic() {
        let mut fx = make_player();
        fx.player.load_score(&make_score()).unwrap();
        set_clock(&fx, 100.0);

        assert_eq!(fx.player.seek(99.0), 3.0);
        fx.player.frame();

        fx.player.seek(0.75);
        fx.player.frame();
        let lit_first: Vec<u8> = {
            let mut v: Vec<u8> = fx.surface.borrow().lit.keys().copied().collect();
            v.sort();
            v
        };

        fx.player.seek(0.75);
        fx.player.frame();
        let lit_second: Vec<u8> = {
            let mut v: Vec<u8> = fx.surface.borrow().lit.keys().copied().collect();
            v.sort();
            v
        };
        assert_eq!(lit_first, lit_second);
        assert_eq!(lit_first, vec![60, 62]);
    }

    #[test]
    fn test_skip_is_relative_to_position() {
        let mut fx = make_player();
        fx.player.load_score(&make_score()).unwrap();
        set_clock(&fx, 100.0);

        fx.player.seek(2.0);
        assert_eq!(fx.player.skip(-0.5), 1.5);
        assert_eq!(fx.player.progress().elapsed, 1.5);
    }

    #[test]
    fn test_end_of_score_auto_stops() {
        let mut fx = make_player();
        fx.player.load_score(&make_score()).unwrap();

        set_clock(&fx, 100.0);
        fx.player.frame();
        fx.player.play();
        set_clock(&fx, 103.5); // past the 3.0s score
        fx.player.frame();

        assert_eq!(fx.player.playback_state(), PlaybackState::Stopped);
        assert_eq!(fx.player.progress().elapsed, 0.0);
        assert!(fx.surface.borrow().lit.is_empty());
        assert!(fx
            .audio
            .borrow()
            .calls
            .contains(&AudioCall::StopAll));
    }

    #[test]
    fn test_pause_silences_and_resume_continues() {
        let mut fx = make_player();
        fx.player.load_score(&make_score()).unwrap();
        set_clock(&fx, 100.0);
        fx.player.frame();
        fx.player.play();
        set_clock(&fx, 100.7);
        fx.player.frame();

        fx.player.pause();
        assert_eq!(fx.audio.borrow().calls.last(), Some(&AudioCall::StopAll));

        // Clock keeps running while paused; position does not.
        set_clock(&fx, 105.0);
        fx.player.frame();
        assert!((fx.player.progress().elapsed - 0.7).abs() < 1e-9);

        fx.player.play();
        set_clock(&fx, 105.4);
        fx.player.frame();
        assert!((fx.player.progress().elapsed - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_stale_load_token_ignored() {
        let mut fx = make_player();
        let stale = fx.player.begin_load();
        let fresh = fx.player.begin_load();

        assert_eq!(fx.player.complete_load(stale, &make_score()), Ok(false));
        assert!(!fx.player.has_score());

        assert_eq!(fx.player.complete_load(fresh, &make_score()), Ok(true));
        assert!(fx.player.has_score());
    }

    #[test]
    fn test_direct_load_invalidates_inflight_token() {
        let mut fx = make_player();
        let token = fx.player.begin_load();
        fx.player.load_score(&make_score()).unwrap();
        assert_eq!(fx.player.complete_load(token, &make_score()), Ok(false));
    }

    #[test]
    fn test_channel_mute_dims_and_silences() {
        let mut fx = make_player();
        fx.player.load_score(&make_score()).unwrap();
        fx.player.set_channel_volume(0, 0.8);

        fx.player.set_channel_muted(0, true);
        assert!(fx.audio.borrow().calls.contains(&AudioCall::Volume {
            channel: 0,
            level: 0.0
        }));
        assert_eq!(fx.render.borrow().opacities.get(&0), Some(&MUTED_OPACITY));

        fx.player.set_channel_muted(0, false);
        assert_eq!(fx.audio.borrow().calls.last(), Some(&AudioCall::Volume {
            channel: 0,
            level: 0.8
        }));
        assert_eq!(fx.render.borrow().opacities.get(&0), Some(&1.0));
    }

    #[test]
    fn test_assign_instrument_resolves_once() {
        use crate::instrument::{InstrumentSource, ResourceLoadError, ResourceResult, SampleBankId};

        struct CountingLibrary {
            loads: usize,
        }
        impl SampleLibrary for CountingLibrary {
            fn load(&mut self, instrument_id: u32) -> ResourceResult<SampleBankId> {
                self.loads += 1;
                Err(ResourceLoadError::UnknownInstrument { instrument_id })
            }
        }

        let mut fx = make_player();
        let mut library = CountingLibrary { loads: 0 };
        fx.player
            .assign_instrument(3, 17, &mut library, Waveform::Square);

        assert_eq!(library.loads, 1);
        assert_eq!(
            fx.audio.borrow().calls.last(),
            Some(&AudioCall::Instrument {
                channel: 3,
                source: InstrumentSource::Oscillator(Waveform::Square)
            })
        );
    }
}
