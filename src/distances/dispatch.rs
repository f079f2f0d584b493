//! Enum-based distance dispatch for static (non-virtual) function calls.
//!
//! `FeatureDistanceFunction` wraps all supported distances and dispatches
//! without vtable lookups. The matcher holds one per feature kind and calls
//! it once per cell of every cost matrix.

use super::functions::{chi_squared, cosine, field_euclidean, pose_keypoints};
use super::traits::FeatureDistance;
use crate::features::FeatureKind;
use crate::matching::MatcherConfig;

/// Enum-based distance function for static dispatch.
#[derive(Debug, Clone, Copy)]
pub enum FeatureDistanceFunction {
    /// Cosine distance (appearance embeddings).
    Cosine,

    /// Euclidean distance divided by a scale (field coordinates).
    FieldEuclidean { scale: f64 },

    /// Chi-squared histogram distance with a denominator epsilon.
    ChiSquared { eps: f64 },

    /// Mean distance over mutually visible pose keypoints.
    PoseKeypoints,
}

impl FeatureDistanceFunction {
    /// The built-in distance for `kind` under the matcher's configuration.
    pub fn for_kind(kind: FeatureKind, config: &MatcherConfig) -> Self {
        match kind {
            FeatureKind::Appearance => FeatureDistanceFunction::Cosine,
            FeatureKind::ColorHist => FeatureDistanceFunction::ChiSquared {
                eps: config.chi_squared_eps,
            },
            FeatureKind::FieldCoords => FeatureDistanceFunction::FieldEuclidean {
                scale: config.field_distance_scale,
            },
            FeatureKind::Pose => FeatureDistanceFunction::PoseKeypoints,
        }
    }

    /// Get the distance name as a string.
    pub fn name(&self) -> &'static str {
        match self {
            FeatureDistanceFunction::Cosine => "cosine",
            FeatureDistanceFunction::FieldEuclidean { .. } => "field_euclidean",
            FeatureDistanceFunction::ChiSquared { .. } => "chi_squared",
            FeatureDistanceFunction::PoseKeypoints => "pose_keypoints",
        }
    }
}

impl FeatureDistance for FeatureDistanceFunction {
    #[inline(always)]
    fn distance(&self, a: &[f64], b: &[f64]) -> f64 {
        match self {
            FeatureDistanceFunction::Cosine => cosine(a, b),
            FeatureDistanceFunction::FieldEuclidean { scale } => field_euclidean(a, b, *scale),
            FeatureDistanceFunction::ChiSquared { eps } => chi_squared(a, b, *eps),
            FeatureDistanceFunction::PoseKeypoints => pose_keypoints(a, b),
        }
    }
}
