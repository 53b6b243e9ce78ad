// src/render.rs
//
// Rendering seam.
//
// The actual rendering backend is an external collaborator; this
// module defines the narrow surface the engine drives it through:
// - InstancedRenderer: batch allocation and per-instance writes
// - KeyLayout: pitch -> key-slot geometry
// - KeySurface: visual keyboard press/release coloring
//
// Plain POD types cross the seam so any backend (wgpu, scene graph,
// test double) can implement it without pulling engine internals in.

/// RGBA color, components in 0.0 - 1.0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Color {
    pub r: f32,
    pub g: f32,
    pub b: f32,
    pub a: f32,
}

impl Color {
    pub const fn rgb(r: f32, g: f32, b: f32) -> Self {
        Self { r, g, b, a: 1.0 }
    }

    pub const WHITE: Color = Color::rgb(1.0, 1.0, 1.0);

    /// Additive brighten, clamped per component.
    pub fn brightened(self, amount: f32) -> Self {
        Self {
            r: (self.r + amount).min(1.0),
            g: (self.g + amount).min(1.0),
            b: (self.b + amount).min(1.0),
            a: self.a,
        }
    }

    /// Multiplicative darken of the color components only.
    pub fn darkened(self, factor: f32) -> Self {
        Self {
            r: self.r * factor,
            g: self.g * factor,
            b: self.b * factor,
            a: self.a,
        }
    }

    /// Same color with a different alpha.
    pub fn with_alpha(self, alpha: f32) -> Self {
        Self { a: alpha, ..self }
    }
}

/// Per-instance transform: translation plus axis-aligned scale.
///
/// Bars never rotate, so a full matrix is unnecessary; backends expand
/// this into whatever their instance attribute layout needs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstanceTransform {
    pub position: [f32; 3],
    pub scale: [f32; 3],
}

impl InstanceTransform {
    pub fn new(position: [f32; 3], scale: [f32; 3]) -> Self {
        Self { position, scale }
    }

    /// Degenerate zero-scale transform used to hide a culled instance
    /// without removing it from its batch.
    pub const HIDDEN: InstanceTransform = InstanceTransform {
        position: [0.0; 3],
        scale: [0.0; 3],
    };

    /// Whether this is the degenerate hidden transform.
    pub fn is_hidden(&self) -> bool {
        self.scale == [0.0; 3]
    }
}

/// Opaque handle to one allocated instance batch.
pub type BatchId = u32;

/// Instanced-draw backend.
///
/// The engine:
/// - allocates one batch per note channel
/// - writes transforms/colors only for instances that changed
/// - collapses culled instances to `InstanceTransform::HIDDEN`
///
/// Implementations must tolerate writes in any order and must not
/// retain references into engine state.
pub trait InstancedRenderer {
    /// Allocate a batch of `count` instances, returning its handle.
    fn allocate_batch(&mut self, count: usize) -> BatchId;

    /// Write one instance's transform.
    fn set_instance_transform(&mut self, batch: BatchId, index: usize, transform: InstanceTransform);

    /// Write one instance's color.
    fn set_instance_color(&mut self, batch: BatchId, index: usize, color: Color);

    /// Set whole-batch opacity (visual channel mute).
    fn set_batch_opacity(&mut self, batch: BatchId, opacity: f32);

    /// Release a batch's GPU resources.
    fn dispose_batch(&mut self, batch: BatchId);
}

/// Geometry of one visual keyboard key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeySlot {
    /// Horizontal center of the key in world units.
    pub position: f32,

    /// Key width in world units.
    pub width: f32,

    /// Whether this is a black key.
    pub accidental: bool,
}

/// Pitch -> key geometry mapping provided by the scene.
pub trait KeyLayout {
    /// Slot for a pitch, or None when the pitch is off the keyboard.
    fn slot_for_pitch(&self, pitch: u8) -> Option<KeySlot>;
}

/// Visual keyboard coloring surface provided by the scene.
pub trait KeySurface {
    /// Light a key with the given color.
    fn light_key(&mut self, pitch: u8, color: Color);

    /// Restore a key to its idle color.
    fn restore_key(&mut self, pitch: u8);
}
