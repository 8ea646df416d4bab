//! # General disparity objects
//!
//! This module provides generic disparity traits and structures for use by different algorithms.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::GrayImage;

use crate::error::*;
use crate::frame::{Frame, StereoPair};

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// A dense integer disparity map.
///
/// Pixels without a valid match hold [`DisparityMap::INVALID`] rather than a numeric guess.
#[derive(Clone, Debug)]
pub struct DisparityMap {
    width: usize,
    height: usize,
    data: Vec<i16>,
    pub max_disp: Option<i16>,
    pub min_disp: Option<i16>,
}

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

pub trait DisparityAlgorithm {
    /// Compute the disparity map of the given grayscale stereo pair.
    fn compute(&mut self, pair: &StereoPair) -> Result<DisparityMap>;
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl DisparityMap {
    /// Marker stored at pixels with no valid disparity.
    pub const INVALID: i16 = -1;

    /// Create a map with every pixel invalid.
    pub fn new(width: usize, height: usize) -> Self {
        DisparityMap {
            width,
            height,
            data: vec![Self::INVALID; width * height],
            min_disp: None,
            max_disp: None,
        }
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    /// Store a valid disparity, tracking the observed range.
    pub fn put(&mut self, x: usize, y: usize, val: i16) {
        debug_assert!(val >= 0);
        self.data[y * self.width + x] = val;

        self.min_disp = Some(self.min_disp.map_or(val, |m| m.min(val)));
        self.max_disp = Some(self.max_disp.map_or(val, |m| m.max(val)));
    }

    /// Raw stored value, [`DisparityMap::INVALID`] where no match exists.
    #[inline]
    pub fn raw(&self, x: usize, y: usize) -> i16 {
        self.data[y * self.width + x]
    }

    /// Disparity at a pixel, or `None` if it has no valid match.
    pub fn get(&self, x: usize, y: usize) -> Option<u16> {
        match self.raw(x, y) {
            Self::INVALID => None,
            d => Some(d as u16),
        }
    }

    pub fn is_valid(&self, x: usize, y: usize) -> bool {
        self.raw(x, y) != Self::INVALID
    }

    pub fn valid_count(&self) -> usize {
        self.data.iter().filter(|&&d| d != Self::INVALID).count()
    }

    pub fn raw_data(&self) -> &[i16] {
        &self.data
    }

    /// Converts the map into a Luma8 image of the raw values, clamped to 255.
    ///
    /// Invalid pixels are black.
    pub fn to_luma(&self) -> GrayImage {
        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let val = self.raw(x as usize, y as usize);
            image::Luma([val.clamp(0, 255) as u8])
        })
    }

    /// Converts the map to a normalised GrayImage.
    ///
    /// Valid disparities are rescaled linearly so the smallest maps to 0 and the largest to 255.
    /// If every valid pixel has the same disparity they all map to 0. Invalid pixels are black.
    pub fn to_luma_normalised(&self) -> GrayImage {
        let (min, max) = match (self.min_disp, self.max_disp) {
            (Some(min), Some(max)) => (min as f32, max as f32),
            _ => return GrayImage::new(self.width as u32, self.height as u32),
        };

        let mult = if max > min { 255.0 / (max - min) } else { 0.0 };

        GrayImage::from_fn(self.width as u32, self.height as u32, |x, y| {
            let val = match self.raw(x as usize, y as usize) {
                Self::INVALID => 0.0,
                d => ((d as f32 - min) * mult).round().clamp(0.0, 255.0),
            };
            image::Luma([val as u8])
        })
    }

    /// The normalised visualisation as a pipeline frame.
    pub fn visualization(&self) -> Result<Frame> {
        Frame::from_gray_image(self.to_luma_normalised())
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_map_is_all_invalid() {
        let map = DisparityMap::new(3, 2);
        assert_eq!(map.valid_count(), 0);
        assert_eq!(map.get(2, 1), None);
        assert!(map.to_luma_normalised().pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn normalisation_spans_full_range() {
        let mut map = DisparityMap::new(3, 1);
        map.put(1, 0, 4);
        map.put(2, 0, 12);

        let vis = map.to_luma_normalised();
        assert_eq!(vis.get_pixel(0, 0)[0], 0);
        assert_eq!(vis.get_pixel(1, 0)[0], 0);
        assert_eq!(vis.get_pixel(2, 0)[0], 255);

        // Invalid stays distinguishable in the raw data even though it renders black
        assert_eq!(map.raw(0, 0), DisparityMap::INVALID);
        assert_eq!(map.get(1, 0), Some(4));
        assert_eq!((map.min_disp, map.max_disp), (Some(4), Some(12)));
    }

    #[test]
    fn flat_map_renders_black() {
        let mut map = DisparityMap::new(2, 1);
        map.put(0, 0, 7);
        map.put(1, 0, 7);
        assert!(map.to_luma_normalised().pixels().all(|p| p[0] == 0));
        assert_eq!(map.to_luma().get_pixel(0, 0)[0], 7);
    }
}
