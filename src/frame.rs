//! # Frames and stereo pairs
//!
//! This module provides the owned 8-bit image buffer passed between pipeline stages, and the
//! left/right pair that enters the pipeline each cycle.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::time::Duration;

use image::{GrayImage, RgbImage};

use crate::error::*;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Layout of the channels in a frame's pixel buffer.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Bgr8,
}

/// How the two views of a stereo pair were acquired.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AcquisitionMode {
    /// Both views came from one captured frame, side by side.
    SplitSingleFrame,

    /// The views are two exposures from one sensor, `delay` apart.
    SequentialCapture { delay: Duration },
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// A row-major 8-bit image.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    width: usize,
    height: usize,
    format: PixelFormat,
    data: Vec<u8>,
}

/// A left/right pair of equally sized frames.
#[derive(Clone, Debug)]
pub struct StereoPair {
    pub left: Frame,
    pub right: Frame,
    pub mode: AcquisitionMode,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl PixelFormat {
    /// Number of interleaved channels per pixel.
    pub fn channels(&self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
        }
    }
}

impl Frame {
    /// Wrap a pixel buffer, checking that its length matches the dimensions.
    pub fn new(width: usize, height: usize, format: PixelFormat, data: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::InvalidFrame(format!(
                "dimensions must be non-zero, got {}x{}",
                width, height
            )));
        }

        let expected = width * height * format.channels();
        if data.len() != expected {
            return Err(Error::InvalidFrame(format!(
                "{}x{} {:?} frame needs {} bytes, buffer has {}",
                width,
                height,
                format,
                expected,
                data.len()
            )));
        }

        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Create a single channel frame filled with `value`.
    pub fn filled(width: usize, height: usize, value: u8) -> Result<Self> {
        Self::new(width, height, PixelFormat::Gray8, vec![value; width * height])
    }

    /// Build a single channel frame by evaluating `f(x, y)` at every pixel.
    pub fn from_fn<F>(width: usize, height: usize, mut f: F) -> Result<Self>
    where
        F: FnMut(usize, usize) -> u8,
    {
        let mut data = Vec::with_capacity(width * height);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }

        Self::new(width, height, PixelFormat::Gray8, data)
    }

    pub fn from_gray_image(img: GrayImage) -> Result<Self> {
        let (w, h) = img.dimensions();
        Self::new(w as usize, h as usize, PixelFormat::Gray8, img.into_raw())
    }

    pub fn from_rgb_image(img: RgbImage) -> Result<Self> {
        let (w, h) = img.dimensions();
        Self::new(w as usize, h as usize, PixelFormat::Rgb8, img.into_raw())
    }

    /// Converts a single channel frame into an `image` buffer.
    pub fn to_gray_image(&self) -> Result<GrayImage> {
        self.require_gray()?;
        GrayImage::from_raw(self.width as u32, self.height as u32, self.data.clone())
            .ok_or_else(|| Error::InvalidFrame("buffer does not fit image dimensions".into()))
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn channels(&self) -> usize {
        self.format.channels()
    }

    pub fn is_gray(&self) -> bool {
        self.format == PixelFormat::Gray8
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    /// Value of a single channel pixel. Panics if out of bounds.
    #[inline]
    pub fn get(&self, x: usize, y: usize) -> u8 {
        self.data[y * self.width + x]
    }

    /// Fail with `InvalidFrame` unless this frame has one channel.
    pub fn require_gray(&self) -> Result<()> {
        if self.is_gray() {
            Ok(())
        } else {
            Err(Error::InvalidFrame(format!(
                "expected a single channel frame, got {:?}",
                self.format
            )))
        }
    }

    /// Fail with `FrameSizeMismatch` unless both frames have the same dimensions.
    pub fn require_same_size(&self, other: &Frame) -> Result<()> {
        if self.width == other.width && self.height == other.height {
            Ok(())
        } else {
            Err(Error::FrameSizeMismatch {
                left_width: self.width,
                left_height: self.height,
                right_width: other.width,
                right_height: other.height,
            })
        }
    }

    /// Copy out the columns `x0..x0 + width`.
    pub fn crop_columns(&self, x0: usize, width: usize) -> Result<Frame> {
        if width == 0 || x0 + width > self.width {
            return Err(Error::InvalidFrame(format!(
                "columns {}..{} lie outside a frame {} wide",
                x0,
                x0 + width,
                self.width
            )));
        }

        let ch = self.channels();
        let mut data = Vec::with_capacity(width * self.height * ch);
        for row in self.data.chunks_exact(self.width * ch) {
            data.extend_from_slice(&row[x0 * ch..(x0 + width) * ch]);
        }

        Frame::new(width, self.height, self.format, data)
    }
}

impl StereoPair {
    /// Pair two separately captured frames, rejecting them if their sizes differ.
    pub fn new(left: Frame, right: Frame, mode: AcquisitionMode) -> Result<Self> {
        left.require_same_size(&right)?;
        Ok(Self { left, right, mode })
    }

    /// Split a side-by-side frame into its left and right halves.
    ///
    /// If the frame has an odd width the last column is dropped, so both halves are
    /// `width / 2` wide.
    pub fn from_split_frame(frame: &Frame) -> Result<Self> {
        let half = frame.width() / 2;
        if half == 0 {
            return Err(Error::InvalidFrame(format!(
                "a frame {} wide cannot be split into two views",
                frame.width()
            )));
        }

        let left = frame.crop_columns(0, half)?;
        let right = frame.crop_columns(half, half)?;

        Self::new(left, right, AcquisitionMode::SplitSingleFrame)
    }

    pub fn width(&self) -> usize {
        self.left.width()
    }

    pub fn height(&self) -> usize {
        self.left.height()
    }

    /// Check the pair is fit to enter the pipeline.
    pub fn validate(&self) -> Result<()> {
        self.left.require_same_size(&self.right)
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
