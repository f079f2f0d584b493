//! Pixel-to-field plane projection.
//!
//! Detections from both views are compared in one shared planar coordinate
//! system (the field). Each view owns a [`GeometricProjector`] calibrated
//! from at least four pixel/field point correspondences.

mod homography;
mod projector;

pub use homography::{estimate_homography_dlt, fit_homography_ransac, reprojection_error, RansacFit};
pub use projector::{Calibration, CalibrationConfig, GeometricProjector};

use std::fmt::Debug;

/// Maps a pixel position in one view onto the shared field plane.
pub trait PlaneProjection: Send + Sync + Debug {
    /// Project a single `[x, y]` pixel position.
    fn project(&self, point: [f64; 2]) -> [f64; 2];

    /// Project a list of pixel positions.
    fn project_points(&self, points: &[[f64; 2]]) -> Vec<[f64; 2]> {
        points.iter().map(|&p| self.project(p)).collect()
    }
}

/// No-op projection that returns pixel positions unchanged.
///
/// Used when both views already report positions in a shared frame.
#[derive(Debug, Clone, Copy, Default)]
pub struct IdentityProjection;

impl PlaneProjection for IdentityProjection {
    fn project(&self, point: [f64; 2]) -> [f64; 2] {
        point
    }
}
