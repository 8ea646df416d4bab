//! # Frame sources and presenters
//!
//! The pipeline's collaborators: something that produces stereo pairs, and something that shows
//! the results. Camera drivers and windowing live outside this crate and plug in through these
//! traits. Two reference sources are provided, one driving a single-sensor camera in either
//! acquisition mode and one receiving pairs pushed from a capture thread.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::sync::mpsc::{self, Receiver, RecvTimeoutError, SyncSender, TrySendError};
use std::thread;
use std::time::Duration;

use crate::blob::Blob;
use crate::disparity::DisparityMap;
use crate::error::*;
use crate::frame::{AcquisitionMode, Frame, StereoPair};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

/// Gap between the two exposures of a sequential capture.
pub const DEFAULT_SEQUENTIAL_DELAY: Duration = Duration::from_millis(10);

/// How long a channel source waits for a pair before reporting a timeout.
pub const DEFAULT_CAPTURE_TIMEOUT: Duration = Duration::from_secs(2);

// -----------------------------------------------------------------------------------------------
// TRAITS
// -----------------------------------------------------------------------------------------------

pub trait StereoPairSource {
    /// Produce the next stereo pair, blocking until one is available.
    fn next(&mut self) -> Result<StereoPair>;
}

/// A single camera that returns one frame per call.
pub trait FrameCapture {
    fn capture(&mut self) -> Result<Frame>;
}

/// Sink for the outputs of each cycle.
pub trait Presenter {
    fn show(&mut self, name: &str, image: &Frame);

    fn show_disparity(&mut self, map: &DisparityMap);

    fn show_blobs(&mut self, name: &str, image: &Frame, blobs: &[Blob]);
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Builds stereo pairs from one camera, either by splitting each frame or by taking two frames
/// in quick succession.
pub struct CameraPairSource<C> {
    camera: C,
    mode: AcquisitionMode,
}

/// Receives pairs produced on another thread.
pub struct ChannelPairSource {
    rx: Receiver<StereoPair>,
    timeout: Duration,
}

/// Producer side of a [`ChannelPairSource`].
#[derive(Clone)]
pub struct PairSender {
    tx: SyncSender<StereoPair>,
}

/// A presenter that discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullPresenter;

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl<C: FrameCapture> CameraPairSource<C> {
    pub fn new(camera: C, mode: AcquisitionMode) -> Self {
        Self { camera, mode }
    }

    /// Each captured frame holds both views side by side.
    pub fn split(camera: C) -> Self {
        Self::new(camera, AcquisitionMode::SplitSingleFrame)
    }

    /// Each view is its own exposure, `delay` apart.
    pub fn sequential(camera: C, delay: Duration) -> Self {
        Self::new(camera, AcquisitionMode::SequentialCapture { delay })
    }

    pub fn mode(&self) -> AcquisitionMode {
        self.mode
    }

    pub fn camera_mut(&mut self) -> &mut C {
        &mut self.camera
    }
}

impl<C: FrameCapture> StereoPairSource for CameraPairSource<C> {
    fn next(&mut self) -> Result<StereoPair> {
        match self.mode {
            AcquisitionMode::SplitSingleFrame => {
                let frame = self.camera.capture()?;
                StereoPair::from_split_frame(&frame)
            }
            AcquisitionMode::SequentialCapture { delay } => {
                let left = self.camera.capture()?;
                thread::sleep(delay);
                let right = self.camera.capture()?;
                StereoPair::new(left, right, self.mode)
            }
        }
    }
}

impl ChannelPairSource {
    /// Create a source and the sender that feeds it. At most `capacity` pairs are buffered.
    pub fn channel(capacity: usize, timeout: Duration) -> (PairSender, Self) {
        let (tx, rx) = mpsc::sync_channel(capacity);
        (PairSender { tx }, Self { rx, timeout })
    }
}

impl StereoPairSource for ChannelPairSource {
    fn next(&mut self) -> Result<StereoPair> {
        match self.rx.recv_timeout(self.timeout) {
            Ok(pair) => Ok(pair),
            Err(RecvTimeoutError::Timeout) => Err(Error::CaptureTimeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(Error::Capture("frame producer has gone away".into()))
            }
        }
    }
}

impl PairSender {
    /// Block until there is room for `pair`.
    pub fn send(&self, pair: StereoPair) -> Result<()> {
        self.tx.send(pair).map_err(|_| Error::Disconnected)
    }

    /// Offer `pair` without blocking. Returns `false` if the buffer was full and the pair was
    /// dropped.
    pub fn try_send(&self, pair: StereoPair) -> Result<bool> {
        match self.tx.try_send(pair) {
            Ok(()) => Ok(true),
            Err(TrySendError::Full(_)) => Ok(false),
            Err(TrySendError::Disconnected(_)) => Err(Error::Disconnected),
        }
    }
}

impl Presenter for NullPresenter {
    fn show(&mut self, _name: &str, _image: &Frame) {}

    fn show_disparity(&mut self, _map: &DisparityMap) {}

    fn show_blobs(&mut self, _name: &str, _image: &Frame, _blobs: &[Blob]) {}
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    struct Counter(u8);

    impl FrameCapture for Counter {
        fn capture(&mut self) -> Result<Frame> {
            self.0 += 1;
            Frame::filled(4, 2, self.0)
        }
    }

    #[test]
    fn split_source_takes_one_frame_per_pair() {
        let mut src = CameraPairSource::split(Counter(0));
        let pair = src.next().unwrap();

        assert_eq!(pair.width(), 2);
        assert_eq!(pair.left.get(0, 0), 1);
        assert_eq!(pair.right.get(0, 0), 1);
        assert_eq!(src.camera_mut().0, 1);
    }

    #[test]
    fn sequential_source_takes_two_frames_per_pair() {
        let mut src = CameraPairSource::sequential(Counter(0), Duration::from_millis(1));
        let pair = src.next().unwrap();

        assert_eq!(pair.width(), 4);
        assert_eq!(pair.left.get(0, 0), 1);
        assert_eq!(pair.right.get(0, 0), 2);
        assert_eq!(
            pair.mode,
            AcquisitionMode::SequentialCapture {
                delay: Duration::from_millis(1)
            }
        );
    }

    #[test]
    fn channel_source_times_out() {
        let (_tx, mut src) = ChannelPairSource::channel(1, Duration::from_millis(5));
        assert!(matches!(src.next(), Err(Error::CaptureTimeout(_))));
    }

    #[test]
    fn channel_source_reports_lost_producer() {
        let (tx, mut src) = ChannelPairSource::channel(1, Duration::from_millis(5));
        drop(tx);
        assert!(matches!(src.next(), Err(Error::Capture(_))));
    }

    #[test]
    fn channel_source_delivers_and_drops_when_full() {
        let (tx, mut src) = ChannelPairSource::channel(1, DEFAULT_CAPTURE_TIMEOUT);
        let frame = Frame::filled(2, 2, 9).unwrap();
        let pair =
            StereoPair::new(frame.clone(), frame, AcquisitionMode::SplitSingleFrame).unwrap();

        assert!(tx.try_send(pair.clone()).unwrap());
        assert!(!tx.try_send(pair).unwrap());
        assert_eq!(src.next().unwrap().left.get(1, 1), 9);
    }
}
