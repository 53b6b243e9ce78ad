// src/instances.rs
//
// GPU instance store.
//
// Owns one instanced batch per note channel and keeps every bar's
// transform and color consistent with the transport's elapsed time:
// - state recoloring (normal / active / finished) gated on change, so
//   per-frame work is proportional to the active set plus boundary
//   crossings, never the full note count
// - visibility culling to a sliding time window around the playhead;
//   culled instances collapse to a degenerate zero-scale transform
//   instead of being removed from their batch
//
// Transforms are computed once at build time and stored; per-frame
// writes reuse them. Nothing here allocates after build.

use log::debug;

use crate::config::EngineConfig;
use crate::note_index::NoteIndex;
use crate::render::{BatchId, Color, InstanceTransform, InstancedRenderer, KeyLayout};
use crate::score::NoteEvent;
use crate::synchronizer::ActiveNoteSet;

/// Bar thickness in world units (vertical extent of a note box).
const BAR_THICKNESS: f32 = 0.4;

/// Vertical lift applied to accidental (black-key) bars.
const ACCIDENTAL_LIFT: f32 = 0.3;

/// Visual state of one note's bar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoteVisualState {
    /// Not yet reached.
    Normal,

    /// Currently sounding.
    Active,

    /// Start and duration have fully passed.
    Finished,
}

/// One note's GPU instance bookkeeping.
///
/// Owned exclusively by the store; everything mutable about a bar
/// (state, visibility) lives here.
#[derive(Debug, Clone)]
pub struct NoteInstance {
    note: NoteEvent,

    /// Base color derived from the channel palette.
    base_color: Color,

    /// Static transform computed at build time; restored whenever the
    /// instance re-enters the visible window.
    transform: InstanceTransform,

    state: NoteVisualState,

    visible: bool,

    /// False when the pitch has no key slot; the batch slot exists but
    /// is never written after build.
    on_keyboard: bool,
}

impl NoteInstance {
    #[inline]
    pub fn note(&self) -> &NoteEvent {
        &self.note
    }

    #[inline]
    pub fn state(&self) -> NoteVisualState {
        self.state
    }

    #[inline]
    pub fn visible(&self) -> bool {
        self.visible
    }

    #[inline]
    pub fn on_keyboard(&self) -> bool {
        self.on_keyboard
    }

    #[inline]
    pub fn base_color(&self) -> Color {
        self.base_color
    }
}

/// One channel's batch plus its sliding culling window.
struct ChannelBatch {
    channel: u8,
    batch: BatchId,

    /// Instances in start order (the channel group's order).
    instances: Vec<NoteInstance>,

    /// Candidate range `[lo, hi)` of instances that may overlap the
    /// current window. `lo` advances linearly (it can never pass a
    /// still-sounding note); `hi` is found by binary search on start.
    lo: usize,
    hi: usize,

    /// False until the first update (or after a reset) forces a full
    /// pass to establish visibility.
    window_valid: bool,
}

/// Store of all per-note GPU instances.
pub struct InstanceStore {
    renderer: Box<dyn InstancedRenderer>,
    batches: Vec<ChannelBatch>,
    config: EngineConfig,
}

impl InstanceStore {
    pub fn new(renderer: Box<dyn InstancedRenderer>, config: EngineConfig) -> Self {
        Self {
            renderer,
            batches: Vec::new(),
            config,
        }
    }

    // -------------------------------
    // MARK: Build / teardown
    // -------------------------------

    /// Build batches for a freshly indexed score, replacing (and
    /// disposing) any prior batches. A full rebuild: note count and
    /// channel set differ per score, so nothing is reusable.
    ///
    /// Notes whose pitch has no key slot are skipped silently — their
    /// batch slot stays permanently hidden, but they remain in the
    /// note index for audio.
    pub fn build(&mut self, index: &NoteIndex, layout: &dyn KeyLayout) {
        self.dispose();

        for group in index.channels() {
            let batch = self.renderer.allocate_batch(group.notes.len());
            let base_color = self.config.channel_color(group.channel);
            let mut instances = Vec::with_capacity(group.notes.len());

            for (i, note) in group.notes.iter().enumerate() {
                let slot = if self.config.pitch_in_range(note.pitch) {
                    layout.slot_for_pitch(note.pitch)
                } else {
                    None
                };

                match slot {
                    Some(slot) => {
                        let transform = bar_transform(note, &slot, self.config.time_scale);
                        self.renderer.set_instance_transform(batch, i, transform);
                        self.renderer.set_instance_color(batch, i, base_color);
                        instances.push(NoteInstance {
                            note: *note,
                            base_color,
                            transform,
                            state: NoteVisualState::Normal,
                            visible: true,
                            on_keyboard: true,
                        });
                    }
                    None => {
                        self.renderer
                            .set_instance_transform(batch, i, InstanceTransform::HIDDEN);
                        instances.push(NoteInstance {
                            note: *note,
                            base_color,
                            transform: InstanceTransform::HIDDEN,
                            state: NoteVisualState::Normal,
                            visible: false,
                            on_keyboard: false,
                        });
                    }
                }
            }

            self.batches.push(ChannelBatch {
                channel: group.channel,
                batch,
                instances,
                lo: 0,
                hi: 0,
                window_valid: false,
            });
        }

        debug!(
            "instance store built: {} channels, {} instances",
            self.batches.len(),
            index.len()
        );
    }

    /// Release every batch. Required before building for a new score
    /// and on teardown; idempotent.
    pub fn dispose(&mut self) {
        for cb in self.batches.drain(..) {
            self.renderer.dispose_batch(cb.batch);
        }
    }

    // -------------------------------
    // MARK: Per-frame update
    // -------------------------------

    /// Bring every instance's state, color, and visibility in line
    /// with `elapsed` and the active set. Called every frame, normal
    /// and re-sync alike.
    pub fn update(&mut self, elapsed: f64, active: &ActiveNoteSet) {
        let window_start = elapsed - self.config.lookbehind;
        let window_end = elapsed + self.config.lookahead;

        let renderer = &mut *self.renderer;
        let config = &self.config;

        for cb in &mut self.batches {
            if cb.window_valid {
                update_incremental(renderer, config, cb, elapsed, window_start, window_end, active);
            } else {
                update_full(renderer, config, cb, elapsed, window_start, window_end, active);
            }
        }
    }

    /// Force every instance back to normal state, base color, and full
    /// visibility. Used on seek and stop; idempotent.
    pub fn reset_visuals(&mut self) {
        let renderer = &mut *self.renderer;

        for cb in &mut self.batches {
            for (i, inst) in cb.instances.iter_mut().enumerate() {
                if !inst.on_keyboard {
                    continue;
                }
                if inst.state != NoteVisualState::Normal {
                    inst.state = NoteVisualState::Normal;
                    renderer.set_instance_color(cb.batch, i, inst.base_color);
                }
                if !inst.visible {
                    inst.visible = true;
                    renderer.set_instance_transform(cb.batch, i, inst.transform);
                }
            }
            cb.lo = 0;
            cb.hi = 0;
            cb.window_valid = false;
        }
    }

    // -------------------------------
    // MARK: Channel controls
    // -------------------------------

    /// Whole-batch transparency for one channel (visual mute).
    /// Independent of per-instance state. No-op for unknown channels.
    pub fn set_channel_opacity(&mut self, channel: u8, opacity: f32) {
        if let Some(cb) = self.batches.iter().find(|cb| cb.channel == channel) {
            self.renderer
                .set_batch_opacity(cb.batch, opacity.clamp(0.0, 1.0));
        }
    }

    // -------------------------------
    // MARK: Accessors
    // -------------------------------

    /// Instances of one channel, in start order.
    pub fn channel_instances(&self, channel: u8) -> Option<&[NoteInstance]> {
        self.batches
            .iter()
            .find(|cb| cb.channel == channel)
            .map(|cb| cb.instances.as_slice())
    }

    /// Total instance count across all batches.
    pub fn instance_count(&self) -> usize {
        self.batches.iter().map(|cb| cb.instances.len()).sum()
    }

    /// Number of channel batches.
    pub fn batch_count(&self) -> usize {
        self.batches.len()
    }
}

impl Drop for InstanceStore {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Static bar transform for one note: lateral position from its key
/// slot, depth and length from its start time and duration.
fn bar_transform(note: &NoteEvent, slot: &crate::render::KeySlot, time_scale: f32) -> InstanceTransform {
    let depth = (note.start + note.duration * 0.5) as f32 * time_scale;
    let lift = if slot.accidental { ACCIDENTAL_LIFT } else { 0.0 };
    InstanceTransform::new(
        [slot.position, lift, depth],
        [slot.width, BAR_THICKNESS, note.duration as f32 * time_scale],
    )
}

/// Recompute one instance inside the candidate range, writing only
/// attributes that changed.
#[inline]
fn refresh_instance(
    renderer: &mut dyn InstancedRenderer,
    config: &EngineConfig,
    batch: BatchId,
    i: usize,
    inst: &mut NoteInstance,
    elapsed: f64,
    window_start: f64,
    window_end: f64,
    active: &ActiveNoteSet,
) {
    if !inst.on_keyboard {
        return;
    }

    let visible = inst.note.start <= window_end && inst.note.end() >= window_start;
    if visible != inst.visible {
        inst.visible = visible;
        let transform = if visible {
            inst.transform
        } else {
            InstanceTransform::HIDDEN
        };
        renderer.set_instance_transform(batch, i, transform);
    }

    let state = if active.contains(&inst.note.key()) {
        NoteVisualState::Active
    } else if inst.note.end() <= elapsed {
        NoteVisualState::Finished
    } else {
        NoteVisualState::Normal
    };

    if state != inst.state {
        inst.state = state;
        let color = match state {
            NoteVisualState::Normal => inst.base_color,
            NoteVisualState::Active => inst.base_color.brightened(config.active_brightness),
            NoteVisualState::Finished => inst.base_color.darkened(config.played_darken),
        };
        renderer.set_instance_color(batch, i, color);
    }
}

/// Full pass over a channel: first frame after build or reset. Also
/// establishes the candidate range for later incremental frames.
fn update_full(
    renderer: &mut dyn InstancedRenderer,
    config: &EngineConfig,
    cb: &mut ChannelBatch,
    elapsed: f64,
    window_start: f64,
    window_end: f64,
    active: &ActiveNoteSet,
) {
    for (i, inst) in cb.instances.iter_mut().enumerate() {
        refresh_instance(
            renderer,
            config,
            cb.batch,
            i,
            inst,
            elapsed,
            window_start,
            window_end,
            active,
        );
    }

    cb.hi = cb.instances.partition_point(|n| n.note.start <= window_end);
    cb.lo = 0;
    while cb.lo < cb.hi && cb.instances[cb.lo].note.end() < window_start {
        cb.lo += 1;
    }
    cb.window_valid = true;
}

/// Incremental pass: touch only the union of the previous and current
/// candidate ranges. Valid while the window slides forward; any
/// backward jump goes through reset_visuals -> full pass instead.
fn update_incremental(
    renderer: &mut dyn InstancedRenderer,
    config: &EngineConfig,
    cb: &mut ChannelBatch,
    elapsed: f64,
    window_start: f64,
    window_end: f64,
    active: &ActiveNoteSet,
) {
    let new_hi = cb.instances.partition_point(|n| n.note.start <= window_end);

    // lo can only be blocked by a note still overlapping the window;
    // short notes past their end inside [lo, hi) are hidden by the
    // per-instance check below.
    let mut new_lo = cb.lo;
    while new_lo < new_hi && cb.instances[new_lo].note.end() < window_start {
        new_lo += 1;
    }

    let from = cb.lo.min(new_lo);
    let to = cb.hi.max(new_hi);

    for (i, inst) in cb.instances[from..to].iter_mut().enumerate() {
        refresh_instance(
            renderer,
            config,
            cb.batch,
            from + i,
            inst,
            elapsed,
            window_start,
            window_end,
            active,
        );
    }

    cb.lo = new_lo;
    cb.hi = new_hi;
}
