//! # Live configuration
//!
//! All tunable parameters of the analysis live in one validated [`AnalysisConfig`] value. Tuning
//! tools never touch it directly: they send [`ConfigUpdate`] messages through a
//! [`ConfigSender`], and the pipeline applies whatever is pending at the start of each cycle.
//! A cycle in progress therefore always sees a single consistent configuration. Updates that
//! would make the configuration invalid are rejected and the previous values stay in effect.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::blob::ThresholdSweepConfig;
use crate::block_match::Params;
use crate::error::*;

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Width of the Gaussian applied after grayscale conversion, odd.
    pub blur_kernel_size: usize,

    /// Gaussian standard deviation, 0 to derive it from the kernel size.
    pub blur_sigma: f64,

    /// Differences strictly above this are flagged as motion.
    pub motion_threshold: u8,

    pub blob: ThresholdSweepConfig,

    pub max_disparity: usize,

    /// Block matching window width, odd.
    pub block_size: usize,
}

/// Sending half used by tuning tools.
#[derive(Clone, Debug)]
pub struct ConfigSender {
    tx: Sender<ConfigUpdate>,
}

/// Receiving half owned by the pipeline.
#[derive(Debug)]
pub struct ConfigInbox {
    rx: Receiver<ConfigUpdate>,
}

/// Outcome of draining the inbox at a cycle boundary.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub rejected: usize,
}

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// A change to a single option, or a wholesale replacement.
#[derive(Clone, Debug, PartialEq)]
pub enum ConfigUpdate {
    BlurKernelSize(usize),
    BlurSigma(f64),
    MotionThreshold(u8),
    BlobMinThreshold(u8),
    BlobMaxThreshold(u8),
    AreaFilterEnabled(bool),
    MinArea(f64),
    CircularityFilterEnabled(bool),
    MinCircularity(f64),
    ConvexityFilterEnabled(bool),
    MinConvexity(f64),
    InertiaFilterEnabled(bool),
    MinInertiaRatio(f64),
    MaxDisparity(usize),
    BlockSize(usize),
    Replace(Box<AnalysisConfig>),
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            blur_kernel_size: 15,
            blur_sigma: 0.0,
            motion_threshold: 0,
            blob: ThresholdSweepConfig::default(),
            max_disparity: 16,
            block_size: 15,
        }
    }
}

impl AnalysisConfig {
    pub fn validate(&self) -> Result<()> {
        if self.blur_kernel_size == 0 || self.blur_kernel_size % 2 == 0 {
            return Err(Error::InvalidKernelSize(self.blur_kernel_size));
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma < 0.0 {
            return Err(Error::InvalidConfig(format!(
                "blur sigma must be finite and non-negative, got {}",
                self.blur_sigma
            )));
        }

        self.blob.validate()?;
        self.matcher_params().validate()
    }

    pub fn matcher_params(&self) -> Params {
        Params {
            max_disparity: self.max_disparity,
            block_size: self.block_size,
        }
    }

    /// Return a copy with `update` applied, or an error leaving `self` as it was.
    pub fn apply(&self, update: ConfigUpdate) -> Result<AnalysisConfig> {
        let mut next = self.clone();

        match update {
            ConfigUpdate::BlurKernelSize(k) => next.blur_kernel_size = k,
            ConfigUpdate::BlurSigma(s) => next.blur_sigma = s,
            ConfigUpdate::MotionThreshold(t) => next.motion_threshold = t,
            ConfigUpdate::BlobMinThreshold(t) => next.blob.min_threshold = t,
            ConfigUpdate::BlobMaxThreshold(t) => next.blob.max_threshold = t,
            ConfigUpdate::AreaFilterEnabled(on) => next.blob.area.enabled = on,
            ConfigUpdate::MinArea(v) => next.blob.area.min = v,
            ConfigUpdate::CircularityFilterEnabled(on) => next.blob.circularity.enabled = on,
            ConfigUpdate::MinCircularity(v) => next.blob.circularity.min = v,
            ConfigUpdate::ConvexityFilterEnabled(on) => next.blob.convexity.enabled = on,
            ConfigUpdate::MinConvexity(v) => next.blob.convexity.min = v,
            ConfigUpdate::InertiaFilterEnabled(on) => next.blob.inertia.enabled = on,
            ConfigUpdate::MinInertiaRatio(v) => next.blob.inertia.min = v,
            ConfigUpdate::MaxDisparity(d) => next.max_disparity = d,
            ConfigUpdate::BlockSize(b) => next.block_size = b,
            ConfigUpdate::Replace(cfg) => next = *cfg,
        }

        next.validate()?;
        Ok(next)
    }

    /// Parse and validate a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let cfg: AnalysisConfig = serde_json::from_str(json)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }

    pub fn to_json_string(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Create a connected sender and inbox pair.
pub fn channel() -> (ConfigSender, ConfigInbox) {
    let (tx, rx) = mpsc::channel();
    (ConfigSender { tx }, ConfigInbox { rx })
}

impl ConfigSender {
    /// Queue an update for the next cycle boundary.
    pub fn send(&self, update: ConfigUpdate) -> Result<()> {
        self.tx.send(update).map_err(|_| Error::Disconnected)
    }
}

impl ConfigInbox {
    /// Apply every queued update to `config` in arrival order.
    ///
    /// Each update is validated on its own; a rejected one is logged and skipped.
    pub fn apply_pending(&self, config: &mut AnalysisConfig) -> ApplyReport {
        let mut report = ApplyReport::default();

        while let Ok(update) = self.rx.try_recv() {
            match config.apply(update.clone()) {
                Ok(next) => {
                    debug!("Applied configuration update {:?}", update);
                    *config = next;
                    report.applied += 1;
                }
                Err(e) => {
                    warn!("Rejected configuration update {:?}: {}", update, e);
                    report.rejected += 1;
                }
            }
        }

        report
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
