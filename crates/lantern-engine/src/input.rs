//! Keyboard state tracking.

use hashbrown::HashSet;
use winit::event::{ElementState, KeyEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Held-key state, rebuilt from window events.
///
/// The camera polls this once per frame; only held/released matters, so no
/// per-frame edge transitions are tracked.
#[derive(Debug, Default)]
pub struct KeyboardState {
    pressed: HashSet<KeyCode>,
}

impl KeyboardState {
    /// Create an empty state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Process a key event.
    pub fn process_key_event(&mut self, event: &KeyEvent) {
        let PhysicalKey::Code(key_code) = event.physical_key else {
            return;
        };

        match event.state {
            ElementState::Pressed => {
                self.pressed.insert(key_code);
            }
            ElementState::Released => {
                self.pressed.remove(&key_code);
            }
        }
    }

    /// Returns `true` if the key is currently held.
    pub fn is_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    /// Clear all key states.
    pub fn clear(&mut self) {
        self.pressed.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn press_and_release() {
        let mut keyboard = KeyboardState::new();
        assert!(!keyboard.is_pressed(KeyCode::KeyW));

        keyboard.pressed.insert(KeyCode::KeyW);
        assert!(keyboard.is_pressed(KeyCode::KeyW));
        assert!(!keyboard.is_pressed(KeyCode::KeyS));

        keyboard.pressed.remove(&KeyCode::KeyW);
        assert!(!keyboard.is_pressed(KeyCode::KeyW));

        keyboard.pressed.insert(KeyCode::KeyA);
        keyboard.clear();
        assert!(!keyboard.is_pressed(KeyCode::KeyA));
    }
}
