//! # Motion differencing
//!
//! Absolute difference of two grayscale frames, binarised against a live threshold.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::error::*;
use crate::frame::{Frame, PixelFormat};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Value written to mask pixels whose difference exceeds the threshold.
pub const MASK_ON: u8 = 255;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// A binary 0/255 image marking where two frames differ.
#[derive(Clone, Debug)]
pub struct MotionMask {
    pub mask: Frame,
    pub threshold: u8,
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Mark every pixel where `|a - b| > threshold`.
pub fn detect_motion(a: &Frame, b: &Frame, threshold: u8) -> Result<MotionMask> {
    let delta = abs_diff(a, b)?;

    let data = delta
        .into_data()
        .into_iter()
        .map(|d| if d > threshold { MASK_ON } else { 0 })
        .collect();

    Ok(MotionMask {
        mask: Frame::new(a.width(), a.height(), PixelFormat::Gray8, data)?,
        threshold,
    })
}

/// Per-pixel absolute difference of two single channel frames.
pub fn abs_diff(a: &Frame, b: &Frame) -> Result<Frame> {
    a.require_gray()?;
    b.require_gray()?;
    a.require_same_size(b)?;

    let data = a
        .data()
        .iter()
        .zip(b.data())
        .map(|(&pa, &pb)| pa.abs_diff(pb))
        .collect();

    Frame::new(a.width(), a.height(), PixelFormat::Gray8, data)
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl MotionMask {
    /// Number of pixels flagged as changed.
    pub fn changed_pixels(&self) -> usize {
        self.mask.data().iter().filter(|&&v| v == MASK_ON).count()
    }

    /// Fraction of the frame flagged as changed, in `[0, 1]`.
    pub fn changed_fraction(&self) -> f64 {
        self.changed_pixels() as f64 / self.mask.data().len() as f64
    }

    pub fn is_empty(&self) -> bool {
        self.mask.data().iter().all(|&v| v == 0)
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn difference_above_threshold_only() {
        let a = Frame::from_fn(4, 1, |x, _| (x * 10) as u8).unwrap();
        let b = Frame::filled(4, 1, 0).unwrap();

        let m = detect_motion(&a, &b, 10).unwrap();
        assert_eq!(m.mask.data(), &[0, 0, 255, 255]);
        assert_eq!(m.changed_pixels(), 2);
        assert_eq!(m.changed_fraction(), 0.5);
        assert_eq!(m.threshold, 10);
    }

    #[test]
    fn colour_input_is_rejected() {
        let a = Frame::new(1, 1, PixelFormat::Rgb8, vec![0, 0, 0]).unwrap();
        let b = Frame::filled(1, 1, 0).unwrap();
        assert!(matches!(
            detect_motion(&a, &b, 0),
            Err(Error::InvalidFrame(_))
        ));
    }

    #[test]
    fn size_mismatch_is_rejected() {
        let a = Frame::filled(3, 3, 0).unwrap();
        let b = Frame::filled(3, 4, 0).unwrap();
        assert!(matches!(
            detect_motion(&a, &b, 0),
            Err(Error::FrameSizeMismatch { .. })
        ));
    }
}
