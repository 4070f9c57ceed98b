//! Devices for running without a window.
use chip8::{keypad_with, Devices, Framebuffer, KeyCode, Keypad};
use log::{info, trace};

/// Collects frames in memory, holds a fixed set of keys, and logs the buzzer.
pub struct Headless {
    keypad: Keypad,
    frame: Framebuffer,
    frame_count: usize,
    buzz_count: usize,
}

impl Headless {
    pub fn new(held_keys: &[KeyCode]) -> Self {
        Self {
            keypad: keypad_with(held_keys),
            frame: Framebuffer::new(),
            frame_count: 0,
            buzz_count: 0,
        }
    }

    /// Most recently presented frame.
    pub fn frame(&self) -> &Framebuffer {
        &self.frame
    }

    pub fn frame_count(&self) -> usize {
        self.frame_count
    }

    /// Number of times the buzzer was switched on.
    pub fn buzz_count(&self) -> usize {
        self.buzz_count
    }
}

impl Devices for Headless {
    fn keypad(&mut self) -> Keypad {
        self.keypad
    }

    fn draw(&mut self, display: &Framebuffer) {
        self.frame.clone_from(display);
        self.frame_count += 1;
        trace!("frame {}", self.frame_count);
    }

    fn buzz(&mut self, state: bool) {
        if state {
            self.buzz_count += 1;
        }
        info!("buzzer {}", if state { "on" } else { "off" });
    }
}
