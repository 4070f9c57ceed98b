//! Monochrome display buffer.
use std::fmt::{self, Write};

use crate::constants::*;

/// Screen buffer that sprites are drawn to, stored row-major.
#[derive(Clone)]
pub struct Framebuffer {
    pixels: Box<[bool; DISPLAY_BUFFER_SIZE]>,
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self {
            pixels: Box::new([false; DISPLAY_BUFFER_SIZE]),
        }
    }
}

impl Framebuffer {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn clear(&mut self) {
        self.pixels.fill(false);
    }

    /// XOR a sprite onto the buffer, returning whether any pixel was erased.
    ///
    /// The origin wraps around the edges of the screen, but the sprite itself
    /// is clipped. Drawing stops at the first row below the bottom edge.
    pub fn draw(&mut self, x: usize, y: usize, sprite: &[u8]) -> bool {
        let (x, y) = (x % DISPLAY_WIDTH, y % DISPLAY_HEIGHT);
        let mut is_erased = false;

        for (r, row) in sprite.iter().enumerate() {
            let py = y + r;
            if py >= DISPLAY_HEIGHT {
                break;
            }

            // Each row is 8 bits representing the 8 pixels of the sprite.
            for c in 0..SPRITE_WIDTH {
                let px = x + c;
                if px >= DISPLAY_WIDTH {
                    break;
                }

                if (row >> (7 - c)) & 1 == 0 {
                    continue;
                }

                let d = px + py * DISPLAY_WIDTH;
                let old_px = self.pixels[d];

                // XOR erases a pixel when the old value was set.
                is_erased |= old_px;

                self.pixels[d] = !old_px;
            }
        }

        is_erased
    }

    #[inline]
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < DISPLAY_WIDTH && y < DISPLAY_HEIGHT && self.pixels[x + y * DISPLAY_WIDTH]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[bool]> + '_ {
        self.pixels.chunks(DISPLAY_WIDTH)
    }

    pub fn as_slice(&self) -> &[bool] {
        &self.pixels[..]
    }

    pub fn is_blank(&self) -> bool {
        self.pixels.iter().all(|px| !px)
    }

    /// Render the buffer as text, one line per row.
    pub fn dump(&self) -> Result<String, fmt::Error> {
        let mut buf = String::with_capacity(DISPLAY_BUFFER_SIZE + DISPLAY_HEIGHT);

        for row in self.rows() {
            for px in row {
                buf.write_char(if *px { '#' } else { '.' })?;
            }
            writeln!(buf)?;
        }

        Ok(buf)
    }
}

impl fmt::Debug for Framebuffer {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let lit = self.pixels.iter().filter(|px| **px).count();
        f.debug_struct("Framebuffer").field("lit", &lit).finish()
    }
}
