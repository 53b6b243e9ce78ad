// src/transport.rs
//
// Playback transport.
//
// The authoritative clock state machine: stopped -> playing <-> paused,
// with reaching end-of-score transitioning playing -> stopped and
// resetting to zero.
//
// The transport never reads a clock itself. Every method takes the
// current clock reading (`now`, seconds) as a parameter; the caller
// sources it from the audio backend so visual position and audio
// scheduling share one clock domain.

use log::{debug, info};

/// Transport state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Stopped,
    Playing,
    Paused,
}

/// Result of one transport tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransportTick {
    /// Elapsed time for this frame, in `[0, total]`.
    pub elapsed: f64,

    /// True when this tick crossed end-of-score. The transport has
    /// already stopped and reset itself; the caller must treat this as
    /// a discontinuity (stop audio, release keys, re-sync at zero).
    pub reached_end: bool,
}

/// The playback clock.
///
/// This struct:
/// - owns play/pause/seek/skip state transitions
/// - converts clock readings into a clamped `elapsed` value
/// - holds NO note logic
#[derive(Debug)]
pub struct Transport {
    state: PlaybackState,

    /// Elapsed seconds; authoritative while not playing.
    elapsed: f64,

    /// Clock timestamp corresponding to `elapsed == 0` for the current
    /// play segment. Only meaningful while playing; recomputed on
    /// every play/seek.
    origin: f64,

    /// Total score length in seconds. Zero when nothing is loaded.
    total: f64,

    loaded: bool,
}

impl Default for Transport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport {
    pub fn new() -> Self {
        Self {
            state: PlaybackState::Stopped,
            elapsed: 0.0,
            origin: 0.0,
            total: 0.0,
            loaded: false,
        }
    }

    // -------------------------------
    // MARK: Score lifecycle
    // -------------------------------

    /// Attach a score of the given length. Resets to zero, stopped.
    pub fn load(&mut self, total_duration: f64) {
        self.state = PlaybackState::Stopped;
        self.elapsed = 0.0;
        self.origin = 0.0;
        self.total = total_duration.max(0.0);
        self.loaded = true;
    }

    /// Detach the current score.
    pub fn unload(&mut self) {
        self.state = PlaybackState::Stopped;
        self.elapsed = 0.0;
        self.total = 0.0;
        self.loaded = false;
    }

    // -------------------------------
    // MARK: State transitions
    // -------------------------------

    /// Start or resume playback. No-op while already playing or when
    /// no score is loaded.
    pub fn play(&mut self, now: f64) {
        if !self.loaded {
            debug!("play ignored: no score loaded");
            return;
        }
        if self.state == PlaybackState::Playing {
            return;
        }

        self.origin = now - self.elapsed;
        self.state = PlaybackState::Playing;
        debug!("transport playing from {:.3}s", self.elapsed);
    }

    /// Freeze playback at the current position. Only valid while
    /// playing.
    pub fn pause(&mut self, now: f64) {
        if self.state != PlaybackState::Playing {
            return;
        }

        self.elapsed = (now - self.origin).clamp(0.0, self.total);
        self.state = PlaybackState::Paused;
        debug!("transport paused at {:.3}s", self.elapsed);
    }

    /// Halt playback and reset to zero. Valid from any state.
    pub fn stop(&mut self) {
        if !self.loaded {
            return;
        }
        self.state = PlaybackState::Stopped;
        self.elapsed = 0.0;
        debug!("transport stopped");
    }

    /// Jump to `target` seconds, clamped to `[0, total]`. Keeps the
    /// play/pause state; while playing the origin is recomputed so
    /// time continues from the new position. Returns the clamped
    /// target.
    ///
    /// Out-of-bounds targets are clamped silently, never an error.
    pub fn seek(&mut self, target: f64, now: f64) -> f64 {
        if !self.loaded {
            return 0.0;
        }

        let clamped = if target.is_finite() {
            target.clamp(0.0, self.total)
        } else {
            0.0
        };

        self.elapsed = clamped;
        if self.state == PlaybackState::Playing {
            self.origin = now - self.elapsed;
        }
        debug!("transport seek to {:.3}s", clamped);
        clamped
    }

    /// Jump by `delta` seconds relative to the current position.
    pub fn skip(&mut self, delta: f64, now: f64) -> f64 {
        let current = self.position(now);
        self.seek(current + delta, now)
    }

    // -------------------------------
    // MARK: Per-frame advancement
    // -------------------------------

    /// Advance one frame. While playing, derives elapsed from the
    /// clock; crossing end-of-score clamps, stops, and resets to zero.
    pub fn tick(&mut self, now: f64) -> TransportTick {
        if self.state != PlaybackState::Playing {
            return TransportTick {
                elapsed: self.elapsed,
                reached_end: false,
            };
        }

        let elapsed = (now - self.origin).max(0.0);
        if elapsed >= self.total {
            info!("end of score reached at {:.3}s", self.total);
            self.state = PlaybackState::Stopped;
            self.elapsed = 0.0;
            return TransportTick {
                elapsed: self.total,
                reached_end: true,
            };
        }

        self.elapsed = elapsed;
        TransportTick {
            elapsed,
            reached_end: false,
        }
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    /// Current position without advancing state.
    pub fn position(&self, now: f64) -> f64 {
        match self.state {
            PlaybackState::Playing => (now - self.origin).clamp(0.0, self.total),
            _ => self.elapsed,
        }
    }

    #[inline]
    pub fn state(&self) -> PlaybackState {
        self.state
    }

    #[inline]
    pub fn is_playing(&self) -> bool {
        self.state == PlaybackState::Playing
    }

    #[inline]
    pub fn total_duration(&self) -> f64 {
        self.total
    }

    #[inline]
    pub fn is_loaded(&self) -> bool {
        self.loaded
    }
}
