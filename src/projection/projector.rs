//! Calibrated pixel-to-field projector for one camera view.

use std::path::Path;

use image::{Rgb, RgbImage};
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use nalgebra::{DMatrix, Matrix3};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use super::homography::{check_homography, fit_homography_ransac, project, MIN_CORRESPONDENCES};
use super::PlaneProjection;
use crate::internal::numpy::{points_from_matrix, validate_point_pairs};
use crate::{Error, Result};

/// RANSAC parameters used when calibrating a projector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    /// Maximum reprojection error (field units) for an inlier.
    pub ransac_threshold: f64,

    /// Upper bound on RANSAC iterations.
    pub max_iterations: usize,

    /// Probability of drawing at least one all-inlier sample.
    pub confidence: f64,

    /// Seed of the sampling generator.
    pub seed: u64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            ransac_threshold: 5.0,
            max_iterations: 2000,
            confidence: 0.995,
            seed: 0,
        }
    }
}

impl CalibrationConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.ransac_threshold.is_finite() || self.ransac_threshold <= 0.0 {
            return Err(Error::InvalidConfig(format!(
                "ransac_threshold must be finite and positive, got {}",
                self.ransac_threshold
            )));
        }
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig("max_iterations must be at least 1".to_string()));
        }
        if !(self.confidence > 0.0 && self.confidence < 1.0) {
            return Err(Error::InvalidConfig(format!(
                "confidence must be in (0, 1), got {}",
                self.confidence
            )));
        }
        Ok(())
    }
}

/// Projects pixel positions of one view onto the shared field plane.
///
/// Immutable after calibration and safe to share between threads.
#[derive(Debug, Clone)]
pub struct GeometricProjector {
    homography: Matrix3<f64>,
    target_resolution: (u32, u32),
    inlier_mask: Vec<bool>,
}

impl GeometricProjector {
    /// Calibrate from pixel (`src`) and field (`dst`) correspondences with
    /// default RANSAC parameters.
    ///
    /// # Errors
    /// - `InvalidPointsShape` if the sets differ in length or have fewer than four points
    /// - `InvalidConfig` for non-finite points or an empty target resolution
    /// - `CalibrationError` if no non-degenerate homography exists
    pub fn new(src: &[[f64; 2]], dst: &[[f64; 2]], target_resolution: (u32, u32)) -> Result<Self> {
        Self::with_config(src, dst, target_resolution, &CalibrationConfig::default())
    }

    /// Calibrate with explicit RANSAC parameters.
    pub fn with_config(
        src: &[[f64; 2]],
        dst: &[[f64; 2]],
        target_resolution: (u32, u32),
        config: &CalibrationConfig,
    ) -> Result<Self> {
        validate_resolution(target_resolution)?;
        config.validate()?;
        validate_point_pairs(src, dst, MIN_CORRESPONDENCES)?;

        let fit = fit_homography_ransac(
            src,
            dst,
            config.ransac_threshold,
            config.max_iterations,
            config.confidence,
            config.seed,
        )?;

        if fit.n_inliers < src.len() {
            warn!(
                inliers = fit.n_inliers,
                total = src.len(),
                "calibration discarded outlier correspondences"
            );
        }
        info!(inliers = fit.n_inliers, ?target_resolution, "projector calibrated");

        Ok(Self {
            homography: fit.h,
            target_resolution,
            inlier_mask: fit.inlier_mask,
        })
    }

    /// Calibrate from `(n, 2)` point matrices.
    pub fn from_matrices(
        src: &DMatrix<f64>,
        dst: &DMatrix<f64>,
        target_resolution: (u32, u32),
    ) -> Result<Self> {
        let src = points_from_matrix(src)?;
        let dst = points_from_matrix(dst)?;
        Self::new(&src, &dst, target_resolution)
    }

    /// Wrap an already known homography.
    pub fn from_homography(homography: Matrix3<f64>, target_resolution: (u32, u32)) -> Result<Self> {
        validate_resolution(target_resolution)?;
        check_homography(&homography)?;
        Ok(Self {
            homography,
            target_resolution,
            inlier_mask: Vec::new(),
        })
    }

    pub fn homography(&self) -> &Matrix3<f64> {
        &self.homography
    }

    /// `(width, height)` of warped output images.
    pub fn target_resolution(&self) -> (u32, u32) {
        self.target_resolution
    }

    /// Per-correspondence inlier flags from calibration (empty when built
    /// from a known homography).
    pub fn inlier_mask(&self) -> &[bool] {
        &self.inlier_mask
    }

    pub fn inlier_count(&self) -> usize {
        self.inlier_mask.iter().filter(|&&m| m).count()
    }

    /// Warp a whole frame into the field plane at the target resolution.
    ///
    /// Output pixels that map outside the source frame are black.
    pub fn transform(&self, frame: &RgbImage) -> Result<RgbImage> {
        let h = &self.homography;
        let matrix: [f32; 9] = [
            h[(0, 0)] as f32,
            h[(0, 1)] as f32,
            h[(0, 2)] as f32,
            h[(1, 0)] as f32,
            h[(1, 1)] as f32,
            h[(1, 2)] as f32,
            h[(2, 0)] as f32,
            h[(2, 1)] as f32,
            h[(2, 2)] as f32,
        ];
        let projection = Projection::from_matrix(matrix).ok_or_else(|| {
            Error::CalibrationError("homography is not invertible in single precision".to_string())
        })?;

        let (width, height) = self.target_resolution;
        let mut out = RgbImage::new(width, height);
        warp_into(frame, &projection, Interpolation::Bilinear, Rgb([0, 0, 0]), &mut out);
        Ok(out)
    }
}

impl PlaneProjection for GeometricProjector {
    fn project(&self, point: [f64; 2]) -> [f64; 2] {
        project(&self.homography, point)
    }
}

fn validate_resolution(resolution: (u32, u32)) -> Result<()> {
    if resolution.0 == 0 || resolution.1 == 0 {
        return Err(Error::InvalidConfig(format!(
            "target resolution must be non-empty, got {}x{}",
            resolution.0, resolution.1
        )));
    }
    Ok(())
}

/// Serialized calibration of one view.
///
/// ```json
/// {
///   "source_points": [[x, y], ...],
///   "destination_points": [[x, y], ...],
///   "target_resolution": [1050, 680]
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Calibration {
    /// Pixel positions in the camera frame.
    pub source_points: Vec<[f64; 2]>,

    /// Corresponding positions on the field plane.
    pub destination_points: Vec<[f64; 2]>,

    /// `(width, height)` of warped output images.
    pub target_resolution: (u32, u32),

    #[serde(default)]
    pub ransac: CalibrationConfig,
}

impl Calibration {
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json_str(&data)
    }

    /// Calibrate the projector described by this file.
    pub fn build(&self) -> Result<GeometricProjector> {
        GeometricProjector::with_config(
            &self.source_points,
            &self.destination_points,
            self.target_resolution,
            &self.ransac,
        )
    }
}
