//! # Error standards
//!
//! This module provides a standardised error enum and result type for this crate.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::time::Duration;

// -----------------------------------------------------------------------------------------------
// TYPES
// -----------------------------------------------------------------------------------------------

/// Standard result type used in the stereo diagnostics crate.
pub type Result<T> = std::result::Result<T, Error>;

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The frame source could not produce a pair this cycle.
    #[error("Capture failed: {0}")]
    Capture(String),

    /// The frame source did not produce a pair within its wait limit.
    #[error("No stereo pair arrived within {0:?}")]
    CaptureTimeout(Duration),

    /// Two frames that must be compared have different dimensions.
    #[error("Frame size mismatch: {left_width}x{left_height} vs {right_width}x{right_height}")]
    FrameSizeMismatch {
        left_width: usize,
        left_height: usize,
        right_width: usize,
        right_height: usize,
    },

    #[error("Kernel size {0} is invalid, it must be odd and at least 1")]
    InvalidKernelSize(usize),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// The receiving end of a configuration or frame channel has gone away.
    #[error("Channel disconnected")]
    Disconnected,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Could not parse configuration: {0}")]
    Json(#[from] serde_json::Error),
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Error {
    /// Whether the error came from frame acquisition rather than analysis.
    pub fn is_capture(&self) -> bool {
        matches!(self, Error::Capture(_) | Error::CaptureTimeout(_))
    }
}
