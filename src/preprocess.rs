//! # Preprocessing
//!
//! Converts colour frames to luma and smooths them with a separable Gaussian before analysis.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use crate::error::*;
use crate::frame::{Frame, PixelFormat};

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Convert `frame` to a single channel and blur it with a `kernel_size` wide Gaussian.
///
/// A `sigma` of zero derives the standard deviation from the kernel size. Kernel size 1 leaves
/// a grayscale frame untouched.
pub fn to_grayscale_blurred(frame: &Frame, kernel_size: usize, sigma: f64) -> Result<Frame> {
    let kernel = gaussian_kernel(kernel_size, sigma)?;
    let gray = to_grayscale(frame)?;

    if kernel.len() == 1 {
        return Ok(gray);
    }

    separable_blur(&gray, &kernel)
}

/// Luma of a frame using BT.601 weights. Grayscale frames are returned as a copy.
pub fn to_grayscale(frame: &Frame) -> Result<Frame> {
    let (r, g, b) = match frame.format() {
        PixelFormat::Gray8 => return Ok(frame.clone()),
        PixelFormat::Rgb8 => (0, 1, 2),
        PixelFormat::Bgr8 => (2, 1, 0),
    };

    let data = frame
        .data()
        .chunks_exact(3)
        .map(|px| {
            let y = 0.299 * px[r] as f32 + 0.587 * px[g] as f32 + 0.114 * px[b] as f32;
            y.round().clamp(0.0, 255.0) as u8
        })
        .collect();

    Frame::new(frame.width(), frame.height(), PixelFormat::Gray8, data)
}

/// Normalised 1D Gaussian weights.
pub fn gaussian_kernel(kernel_size: usize, sigma: f64) -> Result<Vec<f32>> {
    if kernel_size == 0 || kernel_size % 2 == 0 {
        return Err(Error::InvalidKernelSize(kernel_size));
    }
    if !sigma.is_finite() || sigma < 0.0 {
        return Err(Error::InvalidConfig(format!(
            "blur sigma must be finite and non-negative, got {}",
            sigma
        )));
    }

    if kernel_size == 1 {
        return Ok(vec![1.0]);
    }

    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((kernel_size as f64 - 1.0) * 0.5 - 1.0) + 0.8
    };

    let half = (kernel_size / 2) as f64;
    let weights: Vec<f64> = (0..kernel_size)
        .map(|i| {
            let x = i as f64 - half;
            (-(x * x) / (2.0 * sigma * sigma)).exp()
        })
        .collect();
    let sum: f64 = weights.iter().sum();

    Ok(weights.into_iter().map(|w| (w / sum) as f32).collect())
}

/// Blur rows then columns, reflecting at the borders without repeating the edge pixel.
fn separable_blur(gray: &Frame, kernel: &[f32]) -> Result<Frame> {
    let (w, h) = (gray.width(), gray.height());
    let half = (kernel.len() / 2) as isize;
    let src = gray.data();

    let mut rows = vec![0.0f32; w * h];
    for y in 0..h {
        let row = &src[y * w..(y + 1) * w];
        for x in 0..w {
            rows[y * w + x] = kernel
                .iter()
                .enumerate()
                .map(|(k, wt)| wt * row[reflect_101(x as isize + k as isize - half, w)] as f32)
                .sum();
        }
    }

    let mut out = vec![0u8; w * h];
    for y in 0..h {
        for x in 0..w {
            let acc: f32 = kernel
                .iter()
                .enumerate()
                .map(|(k, wt)| wt * rows[reflect_101(y as isize + k as isize - half, h) * w + x])
                .sum();
            out[y * w + x] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }

    Frame::new(w, h, PixelFormat::Gray8, out)
}

/// Map an out of range index back inside `0..n` by mirroring about the edge pixels.
#[inline]
fn reflect_101(mut i: isize, n: usize) -> usize {
    if n == 1 {
        return 0;
    }

    let last = n as isize - 1;
    while i < 0 || i > last {
        if i < 0 {
            i = -i;
        } else {
            i = 2 * last - i;
        }
    }

    i as usize
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn even_kernel_is_rejected() {
        let f = Frame::filled(8, 8, 10).unwrap();
        assert!(matches!(
            to_grayscale_blurred(&f, 4, 0.0),
            Err(Error::InvalidKernelSize(4))
        ));
        assert!(matches!(
            to_grayscale_blurred(&f, 0, 0.0),
            Err(Error::InvalidKernelSize(0))
        ));
    }

    #[test]
    fn kernel_sums_to_one() {
        let k = gaussian_kernel(15, 0.0).unwrap();
        assert_eq!(k.len(), 15);
        assert_abs_diff_eq!(k.iter().sum::<f32>(), 1.0, epsilon = 1e-5);
        assert!(k[7] > k[6] && k[6] > k[0]);
    }

    #[test]
    fn bgr_and_rgb_use_matching_weights() {
        let rgb = Frame::new(1, 1, PixelFormat::Rgb8, vec![200, 100, 50]).unwrap();
        let bgr = Frame::new(1, 1, PixelFormat::Bgr8, vec![50, 100, 200]).unwrap();

        let a = to_grayscale(&rgb).unwrap();
        let b = to_grayscale(&bgr).unwrap();
        assert_eq!(a.data(), b.data());
        assert_eq!(a.get(0, 0), 124);
    }

    #[test]
    fn constant_image_is_unchanged_by_blur() {
        let f = Frame::filled(9, 5, 77).unwrap();
        let out = to_grayscale_blurred(&f, 7, 1.5).unwrap();
        assert!(out.data().iter().all(|&v| v == 77));
    }

    #[test]
    fn blur_spreads_a_single_spike() {
        let f = Frame::from_fn(9, 9, |x, y| if x == 4 && y == 4 { 255 } else { 0 }).unwrap();
        let out = to_grayscale_blurred(&f, 3, 0.0).unwrap();

        assert!(out.get(4, 4) < 255);
        assert!(out.get(3, 4) > 0);
        assert_eq!(out.get(0, 0), 0);
    }

    #[test]
    fn border_reflects_without_repeating_the_edge() {
        let f = Frame::from_fn(5, 1, |x, _| if x == 0 { 255 } else { 0 }).unwrap();
        let k = gaussian_kernel(3, 0.0).unwrap();
        let out = to_grayscale_blurred(&f, 3, 0.0).unwrap();

        // The tap left of the edge reads column 1, not column 0 again
        assert_eq!(out.get(0, 0), (k[1] * 255.0).round() as u8);
        assert_eq!(out.get(1, 0), (k[0] * 255.0).round() as u8);
    }

    #[test]
    fn reflection_stays_in_range() {
        assert_eq!(reflect_101(-1, 5), 1);
        assert_eq!(reflect_101(5, 5), 3);
        assert_eq!(reflect_101(-7, 3), 1);
        assert_eq!(reflect_101(3, 1), 0);
    }
}
