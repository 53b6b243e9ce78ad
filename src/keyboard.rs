// src/keyboard.rs
//
// Visual keyboard state.
//
// Tracks which keys are lit and pushes color changes to the scene's
// key surface. Keyed by pitch only: two simultaneous notes of the same
// pitch on different channels share one key, so the last note-on wins
// the color and the first note-off releases the key.

use std::collections::HashMap;

use crate::render::{Color, KeySurface};

/// Pressed/released state of the visual keyboard.
///
/// Responsibilities:
/// - map pitch -> lit key color
/// - push press/release color changes to the key surface
///
/// Does NOT:
/// - know about channels, notes, or time
/// - talk to audio
pub struct KeyboardState {
    surface: Box<dyn KeySurface>,

    /// Currently lit keys and their colors.
    pressed: HashMap<u8, Color>,
}

impl KeyboardState {
    pub fn new(surface: Box<dyn KeySurface>) -> Self {
        Self {
            surface,
            pressed: HashMap::with_capacity(16),
        }
    }

    /// Light a key. Re-pressing an already-lit key overwrites its
    /// color (re-trigger support).
    pub fn press_key(&mut self, pitch: u8, color: Color) {
        self.pressed.insert(pitch, color);
        self.surface.light_key(pitch, color);
    }

    /// Restore a key to its idle color. No-op if the key is not lit.
    pub fn release_key(&mut self, pitch: u8) {
        if self.pressed.remove(&pitch).is_some() {
            self.surface.restore_key(pitch);
        }
    }

    /// Restore every lit key. Used on seek and stop.
    pub fn release_all(&mut self) {
        for pitch in self.pressed.keys() {
            self.surface.restore_key(*pitch);
        }
        self.pressed.clear();
    }

    /// Whether a key is currently lit.
    pub fn is_pressed(&self, pitch: u8) -> bool {
        self.pressed.contains_key(&pitch)
    }

    /// The color a key is currently lit with, if any.
    pub fn pressed_color(&self, pitch: u8) -> Option<Color> {
        self.pressed.get(&pitch).copied()
    }

    /// Number of lit keys.
    pub fn pressed_count(&self) -> usize {
        self.pressed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::SharedSurface;

    #[test]
    fn test_press_and_release() {
        let (surface, log) = SharedSurface::new();
        let mut keyboard = KeyboardState::new(Box::new(surface));

        keyboard.press_key(60, Color::rgb(1.0, 0.0, 0.0));
        assert!(keyboard.is_pressed(60));
        assert_eq!(keyboard.pressed_count(), 1);

        keyboard.release_key(60);
        assert!(!keyboard.is_pressed(60));
        assert_eq!(log.borrow().lit.get(&60), None);
    }

    #[test]
    fn test_release_unpressed_is_noop() {
        let (surface, log) = SharedSurface::new();
        let mut keyboard = KeyboardState::new(Box::new(surface));

        keyboard.release_key(64);
        assert_eq!(log.borrow().restores, 0);
    }

    #[test]
    fn test_retrigger_overwrites_color() {
        let (surface, log) = SharedSurface::new();
        let mut keyboard = KeyboardState::new(Box::new(surface));

        let red = Color::rgb(1.0, 0.0, 0.0);
        let blue = Color::rgb(0.0, 0.0, 1.0);
        keyboard.press_key(60, red);
        keyboard.press_key(60, blue);

        // Last note-on wins.
        assert_eq!(keyboard.pressed_color(60), Some(blue));
        assert_eq!(log.borrow().lit.get(&60), Some(&blue));
        assert_eq!(keyboard.pressed_count(), 1);

        // First note-off releases.
        keyboard.release_key(60);
        assert!(!keyboard.is_pressed(60));
    }

    #[test]
    fn test_release_all() {
        let (surface, log) = SharedSurface::new();
        let mut keyboard = KeyboardState::new(Box::new(surface));

        keyboard.press_key(60, Color::WHITE);
        keyboard.press_key(64, Color::WHITE);
        keyboard.press_key(67, Color::WHITE);
        keyboard.release_all();

        assert_eq!(keyboard.pressed_count(), 0);
        assert!(log.borrow().lit.is_empty());
        assert_eq!(log.borrow().restores, 3);
    }
}
