//! # Blob detection
//!
//! Finds connected regions across a ladder of binarisation thresholds, merges the detections of
//! the same region on neighbouring thresholds and filters the survivors by shape.
//!
//! Each threshold `t` in `min_threshold..=max_threshold` (stepping by `threshold_step`) produces
//! one binary layer. Layers that come out entirely foreground or entirely background carry no
//! structure and are skipped. Every 8-connected component of a layer becomes a candidate with
//! its area, centroid, enclosing radius and shape descriptors.
//!
//! A candidate joins a group started on the previous layer when their centroids are closer than
//! `min_dist_between_blobs` and their circles overlap or touch. Single pixels have radius 0, so
//! the same pixel found on two layers still merges. The merged blob reports the mean centroid
//! and radius of its members, and the shape descriptors of the member detected nearest to the
//! middle of the threshold range.

// -----------------------------------------------------------------------------------------------
// IMPORTS
// -----------------------------------------------------------------------------------------------

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::region_labelling::{connected_components, Connectivity};
use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::*;
use crate::frame::Frame;
use crate::shape::{self, Moments};

// -----------------------------------------------------------------------------------------------
// ENUMERATIONS
// -----------------------------------------------------------------------------------------------

/// Which side of the threshold counts as foreground.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Polarity {
    /// Pixels brighter than the threshold.
    #[default]
    Bright,
    /// Pixels at or below the threshold.
    Dark,
}

// -----------------------------------------------------------------------------------------------
// DATA STRUCTURES
// -----------------------------------------------------------------------------------------------

/// A shape criterion that can be switched on and off.
///
/// Fields missing from a serialised filter default to disabled with a minimum of 0.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShapeFilter {
    pub enabled: bool,
    pub min: f64,
}

/// Parameters of the threshold ladder and the shape filters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdSweepConfig {
    pub min_threshold: u8,
    pub max_threshold: u8,
    pub threshold_step: u8,

    pub area: ShapeFilter,
    pub circularity: ShapeFilter,
    pub convexity: ShapeFilter,
    pub inertia: ShapeFilter,

    /// Centroids further apart than this are never merged across layers.
    pub min_dist_between_blobs: f64,

    /// Number of layers a region must appear on to be reported. Capped at the number of
    /// layers actually examined.
    pub min_repeatability: usize,

    pub polarity: Polarity,
}

/// A detected region. Blobs have no identity from one cycle to the next.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Blob {
    pub x: f64,
    pub y: f64,
    pub radius: f64,
    pub area: f64,
    pub circularity: f64,
    pub convexity: f64,
    pub inertia_ratio: f64,

    /// Number of threshold layers the blob was found on.
    pub repeatability: usize,
}

/// One component on one threshold layer.
#[derive(Clone, Debug)]
struct Candidate {
    threshold: u8,
    x: f64,
    y: f64,
    radius: f64,
    area: f64,
    circularity: f64,
    convexity: f64,
    inertia_ratio: f64,
}

/// Candidates believed to be the same region, one per consecutive layer.
#[derive(Debug)]
struct Group {
    members: Vec<Candidate>,
    last_layer: usize,
}

// -----------------------------------------------------------------------------------------------
// IMPLEMENTATIONS
// -----------------------------------------------------------------------------------------------

impl ShapeFilter {
    pub fn disabled(min: f64) -> Self {
        Self {
            enabled: false,
            min,
        }
    }

    pub fn enabled(min: f64) -> Self {
        Self { enabled: true, min }
    }

    /// Whether `value` survives this filter.
    #[inline]
    pub fn accepts(&self, value: f64) -> bool {
        !self.enabled || value >= self.min
    }
}

impl Default for ThresholdSweepConfig {
    fn default() -> Self {
        Self {
            min_threshold: 10,
            max_threshold: 200,
            threshold_step: 10,
            area: ShapeFilter::disabled(1500.0),
            circularity: ShapeFilter::disabled(0.1),
            convexity: ShapeFilter::disabled(0.87),
            inertia: ShapeFilter::enabled(0.01),
            min_dist_between_blobs: 10.0,
            min_repeatability: 2,
            polarity: Polarity::Bright,
        }
    }
}

impl ThresholdSweepConfig {
    /// The same ladder with every shape filter switched off.
    pub fn unfiltered() -> Self {
        let mut cfg = Self::default();
        cfg.area.enabled = false;
        cfg.circularity.enabled = false;
        cfg.convexity.enabled = false;
        cfg.inertia.enabled = false;
        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_threshold > self.max_threshold {
            return Err(Error::InvalidConfig(format!(
                "blob min threshold {} is above max threshold {}",
                self.min_threshold, self.max_threshold
            )));
        }
        if self.threshold_step == 0 {
            return Err(Error::InvalidConfig("blob threshold step must be at least 1".into()));
        }

        check_min("min area", self.area.min, f64::INFINITY)?;
        check_min("min circularity", self.circularity.min, 1.0)?;
        check_min("min convexity", self.convexity.min, 1.0)?;
        check_min("min inertia ratio", self.inertia.min, 1.0)?;
        check_min(
            "min distance between blobs",
            self.min_dist_between_blobs,
            f64::INFINITY,
        )?;

        if self.min_repeatability == 0 {
            return Err(Error::InvalidConfig("min repeatability must be at least 1".into()));
        }

        Ok(())
    }

    /// Threshold levels examined, in ascending order.
    pub fn thresholds(&self) -> Vec<u8> {
        (self.min_threshold as u16..=self.max_threshold as u16)
            .step_by(self.threshold_step.max(1) as usize)
            .map(|t| t as u8)
            .collect()
    }

    fn midpoint(&self) -> f64 {
        0.5 * (self.min_threshold as f64 + self.max_threshold as f64)
    }

    fn accepts(&self, c: &Candidate) -> bool {
        self.area.accepts(c.area)
            && self.circularity.accepts(c.circularity)
            && self.convexity.accepts(c.convexity)
            && self.inertia.accepts(c.inertia_ratio)
    }
}

impl Group {
    fn last(&self) -> &Candidate {
        &self.members[self.members.len() - 1]
    }

    /// The member detected closest to the middle of the threshold range, lower threshold first.
    fn representative(&self, midpoint: f64) -> &Candidate {
        self.members
            .iter()
            .min_by(|a, b| {
                mid_gap(a.threshold, midpoint)
                    .total_cmp(&mid_gap(b.threshold, midpoint))
                    .then(a.threshold.cmp(&b.threshold))
            })
            .unwrap_or_else(|| self.last())
    }

    fn into_blob(self, midpoint: f64) -> Blob {
        let n = self.members.len() as f64;
        let x = self.members.iter().map(|c| c.x).sum::<f64>() / n;
        let y = self.members.iter().map(|c| c.y).sum::<f64>() / n;
        let radius = self.members.iter().map(|c| c.radius).sum::<f64>() / n;
        let rep = self.representative(midpoint);

        Blob {
            x,
            y,
            radius,
            area: rep.area,
            circularity: rep.circularity,
            convexity: rep.convexity,
            inertia_ratio: rep.inertia_ratio,
            repeatability: self.members.len(),
        }
    }
}

// -----------------------------------------------------------------------------------------------
// FUNCTIONS
// -----------------------------------------------------------------------------------------------

fn check_min(name: &str, value: f64, upper: f64) -> Result<()> {
    if value.is_nan() || value < 0.0 || value > upper {
        return Err(Error::InvalidConfig(format!(
            "{} must lie in [0, {}], got {}",
            name, upper, value
        )));
    }
    Ok(())
}

#[inline]
fn mid_gap(threshold: u8, midpoint: f64) -> f64 {
    (threshold as f64 - midpoint).abs()
}

/// Detect blobs in a single channel image.
///
/// Blobs are returned sorted top to bottom, then left to right.
pub fn detect_blobs(image: &Frame, config: &ThresholdSweepConfig) -> Result<Vec<Blob>> {
    image.require_gray()?;
    config.validate()?;

    let midpoint = config.midpoint();
    let mut groups: Vec<Group> = Vec::new();
    let mut layers = 0usize;

    for t in config.thresholds() {
        let Some(candidates) = layer_candidates(image, t, config.polarity)? else {
            continue;
        };

        merge_layer(&mut groups, candidates, layers, config, midpoint);
        layers += 1;
    }

    let required = config.min_repeatability.min(layers).max(1);
    let found = groups.len();

    let mut blobs: Vec<Blob> = groups
        .into_iter()
        .filter(|g| g.members.len() >= required)
        .filter(|g| config.accepts(g.representative(midpoint)))
        .map(|g| g.into_blob(midpoint))
        .collect();

    blobs.sort_by(|a, b| a.y.total_cmp(&b.y).then(a.x.total_cmp(&b.x)));

    debug!(
        "Blob sweep: {} layers, {} merged regions, {} blobs kept",
        layers,
        found,
        blobs.len()
    );

    Ok(blobs)
}

/// Binarise `image` at `t` and measure every component, or `None` if the layer is uniform.
fn layer_candidates(image: &Frame, t: u8, polarity: Polarity) -> Result<Option<Vec<Candidate>>> {
    let binary: Vec<u8> = image
        .data()
        .iter()
        .map(|&v| {
            let fg = match polarity {
                Polarity::Bright => v > t,
                Polarity::Dark => v <= t,
            };
            if fg {
                255
            } else {
                0
            }
        })
        .collect();

    let fg = binary.iter().filter(|&&v| v != 0).count();
    if fg == 0 || fg == binary.len() {
        return Ok(None);
    }

    let binary = GrayImage::from_raw(image.width() as u32, image.height() as u32, binary)
        .ok_or_else(|| Error::InvalidFrame("buffer does not fit image dimensions".into()))?;

    let labels = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

    let mut moments: Vec<Moments> = Vec::new();
    for (x, y, px) in labels.enumerate_pixels() {
        let label = px[0] as usize;
        if label == 0 {
            continue;
        }
        if label >= moments.len() {
            moments.resize(label + 1, Moments::default());
        }
        moments[label].push(x, y);
    }

    // Traced on a copy with a one pixel background margin so regions touching the frame edge
    // still have a closed outer border
    let (w, h) = binary.dimensions();
    let mut padded = GrayImage::new(w + 2, h + 2);
    image::imageops::replace(&mut padded, &binary, 1, 1);

    // Every component has exactly one outer border, which identifies it by its first pixel
    let mut seen = vec![false; moments.len()];
    let mut candidates = Vec::new();
    for mut contour in find_contours::<i32>(&padded) {
        if !matches!(contour.border_type, BorderType::Outer) {
            continue;
        }
        for p in contour.points.iter_mut() {
            p.x -= 1;
            p.y -= 1;
        }
        let Some(first) = contour.points.first() else {
            continue;
        };

        let label = labels.get_pixel(first.x as u32, first.y as u32)[0] as usize;
        if label == 0 || label >= moments.len() || seen[label] {
            continue;
        }
        seen[label] = true;

        let m = &moments[label];
        let (x, y) = m.centroid();
        let area = m.area();
        let perimeter = shape::border_length(&contour.points);

        candidates.push(Candidate {
            threshold: t,
            x,
            y,
            radius: shape::min_enclosing_circle(&contour.points).radius,
            area,
            circularity: shape::circularity(area, perimeter),
            convexity: shape::convexity(area, &contour.points),
            inertia_ratio: m.inertia_ratio(),
        });
    }

    Ok(Some(candidates))
}

/// Attach this layer's candidates to the groups continued from the previous layer.
///
/// Pairs are claimed nearest first, so each group takes at most one candidate per layer and each
/// candidate joins at most one group. Unclaimed candidates start new groups.
fn merge_layer(
    groups: &mut Vec<Group>,
    candidates: Vec<Candidate>,
    layer: usize,
    config: &ThresholdSweepConfig,
    midpoint: f64,
) {
    let mut pairs: Vec<(f64, f64, usize, usize)> = Vec::new();

    for (gi, g) in groups.iter().enumerate() {
        if g.last_layer + 1 != layer {
            continue;
        }
        let prev = g.last();
        let gap = mid_gap(g.representative(midpoint).threshold, midpoint);

        for (ci, c) in candidates.iter().enumerate() {
            let d = ((c.x - prev.x).powi(2) + (c.y - prev.y).powi(2)).sqrt();
            if d < config.min_dist_between_blobs && d <= c.radius + prev.radius {
                pairs.push((d, gap, gi, ci));
            }
        }
    }

    pairs.sort_by(|a, b| {
        a.0.total_cmp(&b.0)
            .then(a.1.total_cmp(&b.1))
            .then(a.2.cmp(&b.2))
            .then(a.3.cmp(&b.3))
    });

    let mut claimed: Vec<Option<usize>> = vec![None; candidates.len()];
    let mut group_taken = vec![false; groups.len()];
    for (_, _, gi, ci) in pairs {
        if group_taken[gi] || claimed[ci].is_some() {
            continue;
        }
        group_taken[gi] = true;
        claimed[ci] = Some(gi);
    }

    for (c, owner) in candidates.into_iter().zip(claimed) {
        match owner {
            Some(gi) => {
                groups[gi].members.push(c);
                groups[gi].last_layer = layer;
            }
            None => groups.push(Group {
                members: vec![c],
                last_layer: layer,
            }),
        }
    }
}

// -----------------------------------------------------------------------------------------------
// TESTS
// -----------------------------------------------------------------------------------------------
