//! Monochrome framebuffer.
use std::fmt::{self, Write};

use crate::constants::*;

/// Read-only view of the display, row-major at `x + y * DISPLAY_WIDTH`.
pub type Chip8DisplayBuffer<'a> = &'a [bool; DISPLAY_BUFFER_SIZE];

/// Screen buffer that sprites are drawn to.
pub struct Display {
    pixels: Box<[bool; DISPLAY_BUFFER_SIZE]>,
}

impl Default for Display {
    fn default() -> Self {
        Self {
            pixels: Box::new([false; DISPLAY_BUFFER_SIZE]),
        }
    }
}

impl Display {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn clear(&mut self) {
        self.pixels.fill(false);
    }

    pub fn snapshot(&self) -> Chip8DisplayBuffer {
        &self.pixels
    }

    /// State of a single pixel. Coordinates outside the display are off.
    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < DISPLAY_WIDTH && y < DISPLAY_HEIGHT && self.pixels[x + y * DISPLAY_WIDTH]
    }

    /// XOR a sprite onto the display, clipping at the right and bottom edges.
    ///
    /// Returns `true` when any pixel was switched off.
    pub fn draw(&mut self, x: u8, y: u8, sprite: &[u8]) -> bool {
        self.draw_with(x, y, sprite, false)
    }

    /// XOR a sprite onto the display.
    ///
    /// The starting coordinate always wraps around the screen. Pixels that
    /// fall off the right or bottom edge are either discarded, or wrapped
    /// to the opposite edge when `wrap` is set.
    ///
    /// Each row is 8 bits representing the 8 pixels of the sprite,
    /// most significant bit on the left.
    pub fn draw_with(&mut self, x: u8, y: u8, sprite: &[u8], wrap: bool) -> bool {
        let x0 = x as usize & DISPLAY_WIDTH_MASK;
        let y0 = y as usize & DISPLAY_HEIGHT_MASK;
        let mut is_erased = false;

        for (r, row) in sprite.iter().enumerate() {
            let mut py = y0 + r;
            if py >= DISPLAY_HEIGHT {
                if !wrap {
                    break;
                }
                py &= DISPLAY_HEIGHT_MASK;
            }

            for c in 0..SPRITE_WIDTH {
                let mut px = x0 + c;
                if px >= DISPLAY_WIDTH {
                    if !wrap {
                        break;
                    }
                    px &= DISPLAY_WIDTH_MASK;
                }

                let new_px = (row >> (7 - c)) & 1 != 0;
                if !new_px {
                    continue;
                }

                let d = px + py * DISPLAY_WIDTH;
                let old_px = self.pixels[d];

                // XOR erases a pixel when both the old and new values are both 1.
                is_erased |= old_px;
                self.pixels[d] = !old_px;
            }
        }

        is_erased
    }

    /// Render the display as text, `#` for on and `.` for off.
    pub fn dump(&self) -> Result<String, fmt::Error> {
        let mut buf = String::with_capacity((DISPLAY_WIDTH + 1) * DISPLAY_HEIGHT);

        for row in self.pixels.chunks(DISPLAY_WIDTH) {
            for px in row {
                buf.write_char(if *px { '#' } else { '.' })?;
            }
            writeln!(buf)?;
        }

        Ok(buf)
    }
}
