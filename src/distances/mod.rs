//! Distance functions for comparing detection features across views.
//!
//! This module provides:
//! - `FeatureDistance` trait for all distance implementations
//! - `FeatureDistanceFunction` - enum with static dispatch over the built-ins
//! - Built-in distance functions (cosine, field_euclidean, chi_squared, pose_keypoints)

mod traits;
mod functions;
mod dispatch;

pub use traits::FeatureDistance;
pub use dispatch::FeatureDistanceFunction;
pub use functions::*;

use crate::{Error, Result};

/// Default scale for `field_euclidean` when created by name.
const DEFAULT_FIELD_SCALE: f64 = 100.0;

/// Default epsilon for `chi_squared` when created by name.
const DEFAULT_CHI_SQUARED_EPS: f64 = 1e-10;

/// Get a distance function by name.
///
/// Used to resolve per-feature overrides in [`MatcherConfig::distances`](crate::MatcherConfig);
/// named distances carry their default parameters.
///
/// Supported names:
/// - "cosine" - cosine distance
/// - "field_euclidean" - Euclidean distance divided by 100
/// - "euclidean" - plain Euclidean distance
/// - "chi_squared" / "chi2" - chi-squared histogram distance
/// - "pose" / "pose_keypoints" - pose keypoint distance
pub fn distance_by_name(name: &str) -> Result<FeatureDistanceFunction> {
    match name {
        "cosine" => Ok(FeatureDistanceFunction::Cosine),
        "field_euclidean" => Ok(FeatureDistanceFunction::FieldEuclidean {
            scale: DEFAULT_FIELD_SCALE,
        }),
        "euclidean" => Ok(FeatureDistanceFunction::FieldEuclidean { scale: 1.0 }),
        "chi_squared" | "chi2" => Ok(FeatureDistanceFunction::ChiSquared {
            eps: DEFAULT_CHI_SQUARED_EPS,
        }),
        "pose" | "pose_keypoints" => Ok(FeatureDistanceFunction::PoseKeypoints),
        _ => Err(Error::UnknownDistance(name.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_distance_by_name_cosine() {
        let d = distance_by_name("cosine").unwrap();
        assert_relative_eq!(d.distance(&[1.0, 0.0], &[0.0, 1.0]), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_distance_by_name_field_scale() {
        let d = distance_by_name("field_euclidean").unwrap();
        assert_relative_eq!(d.distance(&[0.0, 0.0], &[60.0, 80.0]), 1.0, epsilon = 1e-10);

        let d = distance_by_name("euclidean").unwrap();
        assert_relative_eq!(d.distance(&[0.0, 0.0], &[60.0, 80.0]), 100.0, epsilon = 1e-10);
    }

    #[test]
    fn test_distance_by_name_aliases() {
        assert_eq!(distance_by_name("chi2").unwrap().name(), "chi_squared");
        assert_eq!(distance_by_name("pose").unwrap().name(), "pose_keypoints");
    }

    #[test]
    fn test_distance_by_name_unknown() {
        assert!(matches!(distance_by_name("hamming"), Err(Error::UnknownDistance(_))));
    }
}
