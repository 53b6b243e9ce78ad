// src/testing.rs
//
// Shared test doubles for the seam traits.
//
// Each double records the calls it receives into an Rc<RefCell<..>>
// log the test keeps a handle to, since the engine takes ownership of
// the boxed collaborator.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::audio::AudioSink;
use crate::instrument::InstrumentSource;
use crate::render::{
    BatchId, Color, InstanceTransform, InstancedRenderer, KeyLayout, KeySlot, KeySurface,
};

// ═══════════════════════════════════════════════════════════════════════════
// Key surface
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct SurfaceLog {
    /// Currently lit keys and their colors.
    pub lit: HashMap<u8, Color>,

    /// Total restore_key calls received.
    pub restores: usize,
}

pub struct SharedSurface(Rc<RefCell<SurfaceLog>>);

impl SharedSurface {
    pub fn new() -> (Self, Rc<RefCell<SurfaceLog>>) {
        let log = Rc::new(RefCell::new(SurfaceLog::default()));
        (Self(log.clone()), log)
    }
}

impl KeySurface for SharedSurface {
    fn light_key(&mut self, pitch: u8, color: Color) {
        self.0.borrow_mut().lit.insert(pitch, color);
    }

    fn restore_key(&mut self, pitch: u8) {
        let mut log = self.0.borrow_mut();
        log.lit.remove(&pitch);
        log.restores += 1;
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Instanced renderer
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Default)]
pub struct RenderLog {
    /// Size of each allocated batch, indexed by BatchId.
    pub batch_sizes: Vec<usize>,

    /// Batches that have been disposed.
    pub disposed: Vec<BatchId>,

    /// Last written transform per (batch, instance).
    pub transforms: HashMap<(BatchId, usize), InstanceTransform>,

    /// Last written color per (batch, instance).
    pub colors: HashMap<(BatchId, usize), Color>,

    /// Whole-batch opacities.
    pub opacities: HashMap<BatchId, f32>,

    /// Total attribute writes (for change-gating assertions).
    pub transform_writes: usize,
    pub color_writes: usize,
}

pub struct SharedRenderer(Rc<RefCell<RenderLog>>);

impl SharedRenderer {
    pub fn new() -> (Self, Rc<RefCell<RenderLog>>) {
        let log = Rc::new(RefCell::new(RenderLog::default()));
        (Self(log.clone()), log)
    }
}

impl InstancedRenderer for SharedRenderer {
    fn allocate_batch(&mut self, count: usize) -> BatchId {
        let mut log = self.0.borrow_mut();
        let id = log.batch_sizes.len() as BatchId;
        log.batch_sizes.push(count);
        id
    }

    fn set_instance_transform(
        &mut self,
        batch: BatchId,
        index: usize,
        transform: InstanceTransform,
    ) {
        let mut log = self.0.borrow_mut();
        log.transforms.insert((batch, index), transform);
        log.transform_writes += 1;
    }

    fn set_instance_color(&mut self, batch: BatchId, index: usize, color: Color) {
        let mut log = self.0.borrow_mut();
        log.colors.insert((batch, index), color);
        log.color_writes += 1;
    }

    fn set_batch_opacity(&mut self, batch: BatchId, opacity: f32) {
        self.0.borrow_mut().opacities.insert(batch, opacity);
    }

    fn dispose_batch(&mut self, batch: BatchId) {
        self.0.borrow_mut().disposed.push(batch);
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Key layout
// ═══════════════════════════════════════════════════════════════════════════

/// Trivial layout: one unit of width per pitch, no accidental offsets.
pub struct LinearLayout {
    pub min_pitch: u8,
    pub max_pitch: u8,
}

impl Default for LinearLayout {
    fn default() -> Self {
        Self {
            min_pitch: 21,
            max_pitch: 108,
        }
    }
}

impl KeyLayout for LinearLayout {
    fn slot_for_pitch(&self, pitch: u8) -> Option<KeySlot> {
        if (self.min_pitch..=self.max_pitch).contains(&pitch) {
            Some(KeySlot {
                position: pitch as f32,
                width: 1.0,
                accidental: false,
            })
        } else {
            None
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Audio sink
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub enum AudioCall {
    Trigger {
        pitch: u8,
        channel: u8,
        velocity: f32,
        duration: f64,
        match_duration: bool,
    },
    Stop {
        pitch: u8,
    },
    StopAll,
    Volume {
        channel: u8,
        level: f32,
    },
    Instrument {
        channel: u8,
        source: InstrumentSource,
    },
}

#[derive(Default)]
pub struct AudioLog {
    pub calls: Vec<AudioCall>,

    /// The monotonic clock value `clock_time()` returns; tests advance
    /// it directly.
    pub clock: f64,
}

impl AudioLog {
    pub fn triggered_pitches(&self) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                AudioCall::Trigger { pitch, .. } => Some(*pitch),
                _ => None,
            })
            .collect()
    }

    pub fn stopped_pitches(&self) -> Vec<u8> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                AudioCall::Stop { pitch } => Some(*pitch),
                _ => None,
            })
            .collect()
    }
}

pub struct SharedAudio(Rc<RefCell<AudioLog>>);

impl SharedAudio {
    pub fn new() -> (Self, Rc<RefCell<AudioLog>>) {
        let log = Rc::new(RefCell::new(AudioLog::default()));
        (Self(log.clone()), log)
    }
}

impl AudioSink for SharedAudio {
    fn trigger_note(
        &mut self,
        pitch: u8,
        channel: u8,
        velocity: f32,
        duration: f64,
        match_duration: bool,
    ) {
        self.0.borrow_mut().calls.push(AudioCall::Trigger {
            pitch,
            channel,
            velocity,
            duration,
            match_duration,
        });
    }

    fn stop_note(&mut self, pitch: u8) {
        self.0.borrow_mut().calls.push(AudioCall::Stop { pitch });
    }

    fn stop_all(&mut self) {
        self.0.borrow_mut().calls.push(AudioCall::StopAll);
    }

    fn clock_time(&self) -> f64 {
        self.0.borrow().clock
    }

    fn set_channel_volume(&mut self, channel: u8, level: f32) {
        self.0
            .borrow_mut()
            .calls
            .push(AudioCall::Volume { channel, level });
    }

    fn set_instrument(&mut self, channel: u8, source: InstrumentSource) {
        self.0
            .borrow_mut()
            .calls
            .push(AudioCall::Instrument { channel, source });
    }
}
