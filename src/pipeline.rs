//! # Analysis pipeline
//!
//! One cycle turns a stereo pair and a configuration into a motion mask, two blob lists and a
//! disparity map: [`analyze`] is that cycle as a pure function. [`Pipeline`] wraps it in a run
//! loop that pulls pairs from a [`StereoPairSource`], applies queued configuration changes
//! between cycles, hands results to a [`Presenter`] and stops when its [`StopHandle`] is set.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::{debug, info, warn};

use crate::blob::{detect_blobs, Blob};
use crate::block_match::BlockMatcher;
use crate::config::{self, AnalysisConfig, ConfigInbox, ConfigSender};
use crate::disparity::{DisparityAlgorithm, DisparityMap};
use crate::error::*;
use crate::frame::{AcquisitionMode, Frame, StereoPair};
use crate::motion::{detect_motion, MotionMask};
use crate::preprocess::to_grayscale_blurred;
use crate::source::{Presenter, StereoPairSource};

// -----------------------------------------------------------------------------------------------
// CONSTANTS
// -----------------------------------------------------------------------------------------------

pub const LEFT_GRAY_VIEW: &str = "Grey and blurred L";
pub const RIGHT_GRAY_VIEW: &str = "Grey and blurred R";
pub const MOTION_VIEW: &str = "Threshold";
pub const LEFT_BLOB_VIEW: &str = "Keypoints L";
pub const RIGHT_BLOB_VIEW: &str = "Keypoints R";

/// Consecutive failed acquisitions after which the run loop gives up.
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: usize = 30;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// Everything one cycle produced.
#[derive(Clone, Debug)]
pub struct CycleReport {
    pub mode: AcquisitionMode,
    pub left: Frame,
    pub right: Frame,
    pub motion: MotionMask,
    pub left_blobs: Vec<Blob>,
    pub right_blobs: Vec<Blob>,
    pub disparity: DisparityMap,
}

/// Shared flag asking the run loop to finish after the current cycle.
#[derive(Clone, Debug, Default)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    pub completed: u64,
    pub skipped: u64,
}

pub struct Pipeline<S, P> {
    source: S,
    presenter: P,
    config: AnalysisConfig,
    inbox: ConfigInbox,
    stop: StopHandle,
    max_consecutive_failures: usize,
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

/// Run the full analysis on one pair.
pub fn analyze(pair: &StereoPair, config: &AnalysisConfig) -> Result<CycleReport> {
    pair.validate()?;

    let left = to_grayscale_blurred(&pair.left, config.blur_kernel_size, config.blur_sigma)?;
    let right = to_grayscale_blurred(&pair.right, config.blur_kernel_size, config.blur_sigma)?;

    let motion = detect_motion(&left, &right, config.motion_threshold)?;
    let left_blobs = detect_blobs(&left, &config.blob)?;
    let right_blobs = detect_blobs(&right, &config.blob)?;

    let gray = StereoPair::new(left, right, pair.mode)?;
    let disparity = BlockMatcher::new(config.matcher_params())?.compute(&gray)?;

    debug!(
        "Cycle: {} motion pixels, {}/{} blobs, {} valid disparities",
        motion.changed_pixels(),
        left_blobs.len(),
        right_blobs.len(),
        disparity.valid_count()
    );

    Ok(CycleReport {
        mode: gray.mode,
        left: gray.left,
        right: gray.right,
        motion,
        left_blobs,
        right_blobs,
        disparity,
    })
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl StopHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }

    pub fn is_stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }
}

impl<S: StereoPairSource, P: Presenter> Pipeline<S, P> {
    /// Build a pipeline, returning it with the sender used to tune it while it runs.
    pub fn new(source: S, presenter: P, config: AnalysisConfig) -> Result<(Self, ConfigSender)> {
        config.validate()?;
        let (tx, inbox) = config::channel();

        Ok((
            Self {
                source,
                presenter,
                config,
                inbox,
                stop: StopHandle::new(),
                max_consecutive_failures: DEFAULT_MAX_CONSECUTIVE_FAILURES,
            },
            tx,
        ))
    }

    pub fn with_max_consecutive_failures(mut self, n: usize) -> Self {
        self.max_consecutive_failures = n.max(1);
        self
    }

    /// Share an existing stop flag, for example one already given to the presenter.
    pub fn with_stop_handle(mut self, stop: StopHandle) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Configuration the next cycle will start from, before pending updates.
    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    pub fn into_parts(self) -> (S, P) {
        (self.source, self.presenter)
    }

    /// Run a single cycle: apply pending updates, acquire, analyse, present.
    pub fn step(&mut self) -> Result<CycleReport> {
        let report = self.inbox.apply_pending(&mut self.config);
        if report.applied + report.rejected > 0 {
            debug!(
                "Configuration updates at cycle boundary: {} applied, {} rejected",
                report.applied, report.rejected
            );
        }

        let pair = self.source.next()?;
        let cycle = analyze(&pair, &self.config)?;

        self.present(&cycle);
        Ok(cycle)
    }

    /// Loop until stopped.
    ///
    /// Failed cycles are skipped. The loop only gives up, with `Error::Capture`, once the source
    /// has failed `max_consecutive_failures` times in a row.
    pub fn run(&mut self) -> Result<RunSummary> {
        info!("Stereo analysis loop started");

        let mut summary = RunSummary::default();
        let mut failures = 0usize;

        while !self.stop.is_stopped() {
            match self.step() {
                Ok(_) => {
                    summary.completed += 1;
                    failures = 0;
                }
                Err(e) if e.is_capture() => {
                    summary.skipped += 1;
                    failures += 1;
                    warn!("Skipping cycle, no stereo pair ({} in a row): {}", failures, e);

                    if failures >= self.max_consecutive_failures {
                        return Err(Error::Capture(format!(
                            "{} consecutive acquisitions failed, last error: {}",
                            failures, e
                        )));
                    }
                }
                Err(e) => {
                    summary.skipped += 1;
                    warn!("Skipping cycle: {}", e);
                }
            }
        }

        info!(
            "Stereo analysis loop stopped after {} cycles ({} skipped)",
            summary.completed, summary.skipped
        );
        Ok(summary)
    }

    fn present(&mut self, cycle: &CycleReport) {
        self.presenter.show(LEFT_GRAY_VIEW, &cycle.left);
        self.presenter.show(RIGHT_GRAY_VIEW, &cycle.right);
        self.presenter.show(MOTION_VIEW, &cycle.motion.mask);
        self.presenter
            .show_blobs(LEFT_BLOB_VIEW, &cycle.left, &cycle.left_blobs);
        self.presenter
            .show_blobs(RIGHT_BLOB_VIEW, &cycle.right, &cycle.right_blobs);
        self.presenter.show_disparity(&cycle.disparity);
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::NullPresenter;

    struct Failing;

    impl StereoPairSource for Failing {
        fn next(&mut self) -> Result<StereoPair> {
            Err(Error::Capture("unplugged".into()))
        }
    }

    #[test]
    fn persistent_capture_failure_is_reported() {
        let (pipeline, _tx) =
            Pipeline::new(Failing, NullPresenter, AnalysisConfig::default()).unwrap();
        let mut pipeline = pipeline.with_max_consecutive_failures(3);

        assert!(matches!(pipeline.run(), Err(Error::Capture(_))));
    }

    #[test]
    fn stopped_pipeline_runs_no_cycles() {
        let (mut pipeline, _tx) =
            Pipeline::new(Failing, NullPresenter, AnalysisConfig::default()).unwrap();
        pipeline.stop_handle().stop();

        assert_eq!(pipeline.run().unwrap(), RunSummary::default());
    }

    #[test]
    fn invalid_initial_config_is_rejected() {
        let cfg = AnalysisConfig {
            block_size: 2,
            ..AnalysisConfig::default()
        };
        assert!(Pipeline::new(Failing, NullPresenter, cfg).is_err());
    }

    #[test]
    fn mismatched_pair_fails_analysis() {
        let pair = StereoPair {
            left: Frame::filled(20, 20, 0).unwrap(),
            right: Frame::filled(21, 20, 0).unwrap(),
            mode: AcquisitionMode::SplitSingleFrame,
        };
        assert!(matches!(
            analyze(&pair, &AnalysisConfig::default()),
            Err(Error::FrameSizeMismatch { .. })
        ));
    }
}
