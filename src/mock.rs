//! # Mock camera
//!
//! A synthetic side-by-side camera for exercising the pipeline without hardware. Each captured
//! frame holds two views of a textured scene, the right view shifted by a fixed disparity, with a
//! bright disc that moves a few pixels every capture.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::error::*;
use crate::frame::{Frame, PixelFormat};
use crate::source::FrameCapture;

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

const DISC_RADIUS: usize = 6;
const DISC_STEP: usize = 3;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

pub struct MockCamera {
    view_width: usize,
    view_height: usize,
    disparity: usize,
    counter: u64,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl MockCamera {
    /// Camera producing `2 * view_width` by `view_height` BGR frames.
    pub fn new(view_width: usize, view_height: usize, disparity: usize) -> Self {
        Self {
            view_width,
            view_height,
            disparity,
            counter: 0,
        }
    }

    /// Number of frames captured so far.
    pub fn captured(&self) -> u64 {
        self.counter
    }

    /// Scene intensity at `(x, y)`. The disc is drawn in view coordinates of the left camera.
    fn scene(&self, x: usize, y: usize) -> u8 {
        let travel = self.view_width.saturating_sub(4 * DISC_RADIUS).max(1);
        let cx = 2 * DISC_RADIUS + (self.counter as usize * DISC_STEP) % travel;
        let cy = self.view_height / 2;

        let dx = x as isize - cx as isize;
        let dy = y as isize - cy as isize;
        if dx * dx + dy * dy <= (DISC_RADIUS * DISC_RADIUS) as isize {
            return 255;
        }

        // Hashed texture kept below the disc brightness
        let mut v = (x as u32).wrapping_mul(0x9E37_79B9) ^ (y as u32).wrapping_mul(0x85EB_CA6B);
        v ^= v >> 15;
        v = v.wrapping_mul(0x2C1B_3C6D);
        v ^= v >> 12;
        (v & 0x7F) as u8
    }
}

impl FrameCapture for MockCamera {
    fn capture(&mut self) -> Result<Frame> {
        self.counter += 1;

        let width = 2 * self.view_width;
        let mut data = Vec::with_capacity(width * self.view_height * 3);
        for y in 0..self.view_height {
            for x in 0..width {
                let v = if x < self.view_width {
                    self.scene(x, y)
                } else {
                    self.scene(x - self.view_width + self.disparity, y)
                };
                data.extend_from_slice(&[v, v, v]);
            }
        }

        Frame::new(width, self.view_height, PixelFormat::Bgr8, data)
    }
}
