//! Per-detection feature vectors and the providers that build them.
//!
//! A [`FeatureVector`] carries four named sub-vectors, each of fixed length.
//! When a sub-vector cannot be extracted (empty crop, no keypoints, no model
//! plugged in) it is filled with its documented zero-valued fallback instead
//! of failing the frame.

mod extractor;

pub use extractor::{
    color_histogram, AppearanceEmbedder, FeatureProvider, GeometricFeatureProvider, PoseEstimator,
};

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Length of the appearance (re-identification) embedding.
pub const APPEARANCE_DIM: usize = 512;

/// Bins per HSV channel in the color histogram.
pub const COLOR_HIST_BINS: usize = 16;

/// Length of the color histogram (H, S and V concatenated).
pub const COLOR_HIST_DIM: usize = 3 * COLOR_HIST_BINS;

/// Length of the field coordinates.
pub const FIELD_COORDS_DIM: usize = 2;

/// Number of pose keypoints (COCO layout).
pub const POSE_KEYPOINTS: usize = 17;

/// Length of the pose vector (normalized x, y per keypoint).
pub const POSE_DIM: usize = 2 * POSE_KEYPOINTS;

/// Name of a feature sub-vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Appearance,
    ColorHist,
    FieldCoords,
    Pose,
}

impl FeatureKind {
    /// All feature kinds in a fixed order.
    pub const ALL: [FeatureKind; 4] = [
        FeatureKind::Appearance,
        FeatureKind::ColorHist,
        FeatureKind::FieldCoords,
        FeatureKind::Pose,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            FeatureKind::Appearance => "appearance",
            FeatureKind::ColorHist => "color_hist",
            FeatureKind::FieldCoords => "field_coords",
            FeatureKind::Pose => "pose",
        }
    }

    /// Expected sub-vector length.
    pub fn dim(&self) -> usize {
        match self {
            FeatureKind::Appearance => APPEARANCE_DIM,
            FeatureKind::ColorHist => COLOR_HIST_DIM,
            FeatureKind::FieldCoords => FIELD_COORDS_DIM,
            FeatureKind::Pose => POSE_DIM,
        }
    }
}

impl fmt::Display for FeatureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FeatureKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        FeatureKind::ALL
            .iter()
            .copied()
            .find(|k| k.name() == s)
            .ok_or_else(|| Error::InvalidConfig(format!("unknown feature name: {}", s)))
    }
}

/// Named feature sub-vectors attached to a detection.
///
/// Supplied by a [`FeatureProvider`] and consumed read-only by the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureVector {
    /// Re-identification embedding.
    pub appearance: Vec<f64>,

    /// HSV histogram of the torso band.
    pub color_hist: Vec<f64>,

    /// Foot point projected onto the shared field plane.
    pub field_coords: [f64; 2],

    /// Normalized pose keypoints `[x0, y0, x1, y1, ...]`; `(0, 0)` marks a missing keypoint.
    pub pose: Vec<f64>,
}

impl FeatureVector {
    /// All sub-vectors at their zero-valued fallbacks.
    pub fn zeros() -> Self {
        Self {
            appearance: vec![0.0; APPEARANCE_DIM],
            color_hist: vec![0.0; COLOR_HIST_DIM],
            field_coords: [0.0; 2],
            pose: vec![0.0; POSE_DIM],
        }
    }

    pub fn with_appearance(mut self, appearance: Vec<f64>) -> Self {
        self.appearance = appearance;
        self
    }

    pub fn with_color_hist(mut self, color_hist: Vec<f64>) -> Self {
        self.color_hist = color_hist;
        self
    }

    pub fn with_field_coords(mut self, field_coords: [f64; 2]) -> Self {
        self.field_coords = field_coords;
        self
    }

    pub fn with_pose(mut self, pose: Vec<f64>) -> Self {
        self.pose = pose;
        self
    }

    /// Borrow a sub-vector by kind.
    pub fn get(&self, kind: FeatureKind) -> &[f64] {
        match kind {
            FeatureKind::Appearance => &self.appearance,
            FeatureKind::ColorHist => &self.color_hist,
            FeatureKind::FieldCoords => &self.field_coords,
            FeatureKind::Pose => &self.pose,
        }
    }
}

impl Default for FeatureVector {
    fn default() -> Self {
        Self::zeros()
    }
}
