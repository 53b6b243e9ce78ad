// src/main.rs
//
// Offline smoke run: loads a synthetic score into a Player wired to
// stub collaborators and steps simulated frames through a seek and on
// to end-of-score, printing what the engine does.

use std::cell::Cell;
use std::rc::Rc;

use notefall::audio::AudioSink;
use notefall::render::{
    BatchId, Color, InstanceTransform, InstancedRenderer, KeyLayout, KeySlot, KeySurface,
};
use notefall::{EngineConfig, InstrumentSource, Player, Score, ScoreNote, ScoreTrack};

/// ===============================
/// Stub collaborators
/// ===============================

struct PrintingAudio {
    clock: Rc<Cell<f64>>,
}

impl AudioSink for PrintingAudio {
    fn trigger_note(
        &mut self,
        pitch: u8,
        channel: u8,
        velocity: f32,
        duration: f64,
        _match_duration: bool,
    ) {
        println!(
            "  audio: note-on  pitch={} ch={} vel={:.2} dur={:.2}s",
            pitch, channel, velocity, duration
        );
    }

    fn stop_note(&mut self, pitch: u8) {
        println!("  audio: note-off pitch={}", pitch);
    }

    fn stop_all(&mut self) {
        println!("  audio: stop-all");
    }

    fn clock_time(&self) -> f64 {
        self.clock.get()
    }

    fn set_channel_volume(&mut self, channel: u8, level: f32) {
        println!("  audio: channel {} volume {:.2}", channel, level);
    }

    fn set_instrument(&mut self, channel: u8, source: InstrumentSource) {
        println!("  audio: channel {} instrument {:?}", channel, source);
    }
}

#[derive(Default)]
struct CountingRenderer {
    batches: u32,
    writes: usize,
}

impl InstancedRenderer for CountingRenderer {
    fn allocate_batch(&mut self, count: usize) -> BatchId {
        let id = self.batches;
        self.batches += 1;
        println!("  render: batch {} allocated ({} instances)", id, count);
        id
    }

    fn set_instance_transform(&mut self, _: BatchId, _: usize, _: InstanceTransform) {
        self.writes += 1;
    }

    fn set_instance_color(&mut self, _: BatchId, _: usize, _: Color) {
        self.writes += 1;
    }

    fn set_batch_opacity(&mut self, batch: BatchId, opacity: f32) {
        println!("  render: batch {} opacity {:.2}", batch, opacity);
    }

    fn dispose_batch(&mut self, batch: BatchId) {
        println!("  render: batch {} disposed", batch);
    }
}

struct SilentSurface;

impl KeySurface for SilentSurface {
    fn light_key(&mut self, _pitch: u8, _color: Color) {}
    fn restore_key(&mut self, _pitch: u8) {}
}

struct PianoLayout;

impl KeyLayout for PianoLayout {
    fn slot_for_pitch(&self, pitch: u8) -> Option<KeySlot> {
        if !(21..=108).contains(&pitch) {
            return None;
        }
        // Semitone index as lateral position; good enough for a demo.
        Some(KeySlot {
            position: (pitch as f32 - 64.0) * 0.6,
            width: 0.55,
            accidental: matches!(pitch % 12, 1 | 3 | 6 | 8 | 10),
        })
    }
}

fn make_demo_score() -> Score {
    let mut score = Score::new(4.0);

    let mut melody = ScoreTrack::new(0);
    for (i, pitch) in [60u8, 62, 64, 65, 67, 65, 64, 62].iter().enumerate() {
        melody.add_note(ScoreNote::new(*pitch, i as f64 * 0.5, 0.45, 0.8));
    }
    score.add_track(melody);

    let mut bass = ScoreTrack::new(1);
    bass.add_note(ScoreNote::new(36, 0.0, 2.0, 0.9));
    bass.add_note(ScoreNote::new(43, 2.0, 2.0, 0.9));
    score.add_track(bass);

    score
}

fn main() {
    env_logger::init();

    // --------------------------------
    // Player wiring
    // --------------------------------

    let clock = Rc::new(Cell::new(0.0));
    let mut player = Player::new(
        Box::new(PrintingAudio {
            clock: clock.clone(),
        }),
        Box::new(CountingRenderer::default()),
        Box::new(SilentSurface),
        Box::new(PianoLayout),
        EngineConfig::default(),
    );

    player.on_stats_changed(|stats| {
        println!("  stats: {}/{} notes played", stats.played, stats.total)
    });

    // --------------------------------
    // Load + play
    // --------------------------------

    println!("loading score");
    if let Err(err) = player.load_score(&make_demo_score()) {
        eprintln!("score rejected: {}", err);
        return;
    }

    println!("playing");
    player.play();

    // 20 fps simulated frames.
    let mut frames = 0u32;
    while player.is_playing() {
        player.frame();
        frames += 1;
        if frames == 20 {
            let progress = player.progress();
            println!("seeking to 3.0s (at {:.2}s)", progress.elapsed);
            player.seek(3.0);
        }
        clock.set(frames as f64 * 0.05);
    }

    player.frame();
    let progress = player.progress();
    println!(
        "stopped: position {:.2}/{:.2}s",
        progress.elapsed, progress.total
    );
}
