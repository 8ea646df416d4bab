//! # Block matching disparity computation
//!
//! This module provides a sum of absolute differences (SAD) block matcher. For every left image
//! pixel with a full window around it, each candidate disparity `d` in `0..=max_disparity` with
//! `x - d >= block_size / 2` is scored by the SAD between the window at `(x, y)` in the left image
//! and the window at `(x - d, y)` in the right image. The lowest score wins, ties going to the
//! smallest disparity.
//!
//! Window sums come from an integral image of the absolute difference for each disparity, so the
//! cost per pixel does not grow with the block size. Results are identical to summing each
//! window directly.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use log::debug;
use serde::{Deserialize, Serialize};

use crate::disparity::{DisparityAlgorithm, DisparityMap};
use crate::error::*;
use crate::frame::{Frame, StereoPair};

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

pub struct BlockMatcher {
    params: Params,
}

#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct Params {
    pub max_disparity: usize,
    pub block_size: usize,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for Params {
    fn default() -> Self {
        Self {
            max_disparity: 16,
            block_size: 15,
        }
    }
}

impl Params {
    pub fn validate(&self) -> Result<()> {
        if self.block_size == 0 || self.block_size % 2 == 0 {
            return Err(Error::InvalidKernelSize(self.block_size));
        }
        if self.max_disparity == 0 || self.max_disparity > i16::MAX as usize {
            return Err(Error::InvalidConfig(format!(
                "max disparity must lie in [1, {}], got {}",
                i16::MAX,
                self.max_disparity
            )));
        }
        Ok(())
    }
}

impl BlockMatcher {
    /// Create a new instance of the algorithm with the given parameters.
    pub fn new(params: Params) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn params(&self) -> &Params {
        &self.params
    }

    /// Match `left` against `right`, both single channel and the same size.
    pub fn match_frames(&self, left: &Frame, right: &Frame) -> Result<DisparityMap> {
        left.require_gray()?;
        right.require_gray()?;
        left.require_same_size(right)?;

        let (w, h) = (left.width(), left.height());
        let half = self.params.block_size / 2;
        let mut map = DisparityMap::new(w, h);

        // No pixel has a full window
        if w <= 2 * half || h <= 2 * half {
            return Ok(map);
        }

        let stride = w + 1;
        let mut integral = vec![0u64; stride * (h + 1)];
        let mut best_cost = vec![u64::MAX; w * h];
        let mut best_disp = vec![0usize; w * h];

        for d in 0..=self.params.max_disparity {
            // Larger disparities leave even fewer matchable columns
            if half + d >= w - half {
                break;
            }

            abs_diff_integral(left, right, d, &mut integral);

            for y in half..(h - half) {
                for x in (half + d)..(w - half) {
                    let cost = window_sum(
                        &integral,
                        stride,
                        (x - half, y - half),
                        (x + half + 1, y + half + 1),
                    );
                    let i = y * w + x;
                    if cost < best_cost[i] {
                        best_cost[i] = cost;
                        best_disp[i] = d;
                    }
                }
            }
        }

        for y in half..(h - half) {
            for x in half..(w - half) {
                map.put(x, y, best_disp[y * w + x] as i16);
            }
        }

        debug!(
            "Block matching {}x{} (block {}, max disparity {}): {} valid pixels, range {:?}..{:?}",
            w,
            h,
            self.params.block_size,
            self.params.max_disparity,
            map.valid_count(),
            map.min_disp,
            map.max_disp
        );

        Ok(map)
    }
}

impl DisparityAlgorithm for BlockMatcher {
    /// Compute the disparity map for the given pair.
    fn compute(&mut self, pair: &StereoPair) -> Result<DisparityMap> {
        self.match_frames(&pair.left, &pair.right)
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Compute a block matching disparity map between two grayscale frames.
pub fn compute_disparity(
    left: &Frame,
    right: &Frame,
    max_disparity: usize,
    block_size: usize,
) -> Result<DisparityMap> {
    BlockMatcher::new(Params {
        max_disparity,
        block_size,
    })?
    .match_frames(left, right)
}

/// Fill `integral` with the summed area table of `|left(x, y) - right(x - d, y)|`.
///
/// Columns left of `d` have no counterpart and contribute zero.
fn abs_diff_integral(left: &Frame, right: &Frame, d: usize, integral: &mut [u64]) {
    let (w, h) = (left.width(), left.height());
    let stride = w + 1;
    let (l, r) = (left.data(), right.data());

    for y in 0..h {
        let mut row_sum = 0u64;
        for x in 0..w {
            if x >= d {
                row_sum += l[y * w + x].abs_diff(r[y * w + x - d]) as u64;
            }
            integral[(y + 1) * stride + x + 1] = integral[y * stride + x + 1] + row_sum;
        }
    }
}

/// Sum over the half-open rectangle `[x0, x1) x [y0, y1)`.
#[inline]
fn window_sum(
    integral: &[u64],
    stride: usize,
    (x0, y0): (usize, usize),
    (x1, y1): (usize, usize),
) -> u64 {
    integral[y1 * stride + x1] + integral[y0 * stride + x0]
        - integral[y0 * stride + x1]
        - integral[y1 * stride + x0]
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn texture(x: usize, y: usize) -> u8 {
        let mut v = (x as u32).wrapping_mul(0x9E37_79B9) ^ (y as u32).wrapping_mul(0x85EB_CA6B);
        v ^= v >> 15;
        v = v.wrapping_mul(0x2C1B_3C6D);
        v ^= v >> 12;
        (v & 0xFF) as u8
    }

    /// Direct evaluation of every window, for comparison with the integral image version.
    fn brute_force(left: &Frame, right: &Frame, max_d: usize, block: usize) -> Vec<i16> {
        let (w, h) = (left.width(), left.height());
        let half = block / 2;
        let mut out = vec![DisparityMap::INVALID; w * h];

        for y in half..h.saturating_sub(half) {
            for x in half..w.saturating_sub(half) {
                let mut best = (u64::MAX, 0);
                for d in 0..=max_d {
                    if x < half + d {
                        break;
                    }
                    let mut acc = 0u64;
                    for j in (y - half)..=(y + half) {
                        for i in (x - half)..=(x + half) {
                            acc += left.get(i, j).abs_diff(right.get(i - d, j)) as u64;
                        }
                    }
                    if acc < best.0 {
                        best = (acc, d);
                    }
                }
                out[y * w + x] = best.1 as i16;
            }
        }

        out
    }

    #[test]
    fn matches_direct_window_sums() {
        let left = Frame::from_fn(23, 17, texture).unwrap();
        let right = Frame::from_fn(23, 17, |x, y| texture(x + 2, y ^ 1)).unwrap();

        let map = compute_disparity(&left, &right, 6, 5).unwrap();
        assert_eq!(map.raw_data(), brute_force(&left, &right, 6, 5).as_slice());
    }

    #[test]
    fn even_block_is_rejected() {
        let f = Frame::filled(8, 8, 0).unwrap();
        assert!(matches!(
            compute_disparity(&f, &f, 4, 4),
            Err(Error::InvalidKernelSize(4))
        ));
        assert!(matches!(
            compute_disparity(&f, &f, 0, 3),
            Err(Error::InvalidConfig(_))
        ));
    }

    #[test]
    fn ties_prefer_zero_disparity() {
        let f = Frame::filled(12, 12, 90).unwrap();
        let map = compute_disparity(&f, &f, 5, 3).unwrap();

        assert_eq!(map.get(6, 6), Some(0));
        assert_eq!(map.max_disp, Some(0));
    }

    #[test]
    fn frame_smaller_than_block_is_all_invalid() {
        let f = Frame::filled(4, 20, 1).unwrap();
        let map = compute_disparity(&f, &f, 2, 5).unwrap();
        assert_eq!(map.valid_count(), 0);
    }

    #[test]
    fn trait_object_computes_from_pair() {
        let left = Frame::from_fn(20, 10, texture).unwrap();
        let right = left.clone();
        let pair = StereoPair::new(left, right, crate::frame::AcquisitionMode::SplitSingleFrame)
            .unwrap();

        let mut alg: Box<dyn DisparityAlgorithm> =
            Box::new(BlockMatcher::new(Params::default()).unwrap());
        // The default 15 pixel block is taller than the frame
        let map = alg.compute(&pair).unwrap();
        assert_eq!(map.valid_count(), 0);
    }
}
