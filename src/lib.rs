//! # Stereo diagnostics
//!
//! This crate analyses the two views of a dual-camera rig each cycle: it differences them to find
//! motion, detects shape-filtered blobs in each view and estimates a dense disparity map by block
//! matching.

// -----------------------------------------------------------------------------------------------
// MODULES
// -----------------------------------------------------------------------------------------------

pub mod blob;
pub mod block_match;
pub mod config;
mod disparity;
mod error;
mod frame;
#[cfg(feature = "mock")]
pub mod mock;
pub mod motion;
pub mod pipeline;
pub mod preprocess;
pub mod shape;
pub mod source;

// -----------------------------------------------------------------------------------------------
// EXPORTS
// -----------------------------------------------------------------------------------------------

pub use disparity::{DisparityAlgorithm, DisparityMap};
pub use error::{Error, Result};
pub use frame::{AcquisitionMode, Frame, PixelFormat, StereoPair};

pub mod prelude {
    pub use crate::blob::{detect_blobs, Blob, Polarity, ShapeFilter, ThresholdSweepConfig};
    pub use crate::block_match::{compute_disparity, BlockMatcher, Params};
    pub use crate::config::{AnalysisConfig, ConfigSender, ConfigUpdate};
    pub use crate::disparity::{DisparityAlgorithm, DisparityMap};
    pub use crate::error::{Error, Result};
    pub use crate::frame::{AcquisitionMode, Frame, PixelFormat, StereoPair};
    pub use crate::motion::{detect_motion, MotionMask};
    pub use crate::pipeline::{analyze, CycleReport, Pipeline, StopHandle};
    pub use crate::preprocess::to_grayscale_blurred;
    pub use crate::source::{FrameCapture, Presenter, StereoPairSource};
}
