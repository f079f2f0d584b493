//! Distance trait definition.

use nalgebra::DMatrix;

/// Trait for per-feature distance functions used in cross-view matching.
///
/// A distance compares one feature sub-vector from each view. Lower values
/// indicate more similar features. Implementations return NaN when the two
/// slices cannot be compared (e.g. different lengths); the matcher treats
/// non-finite costs as unmatchable.
pub trait FeatureDistance: Send + Sync {
    /// Distance between two feature sub-vectors.
    fn distance(&self, a: &[f64], b: &[f64]) -> f64;

    /// Pairwise distances between two sets of sub-vectors.
    ///
    /// # Returns
    /// Matrix of shape `(first.len(), second.len())`.
    /// Entry (i, j) is the distance between `first[i]` and `second[j]`.
    fn pairwise(&self, first: &[&[f64]], second: &[&[f64]]) -> DMatrix<f64> {
        DMatrix::from_fn(first.len(), second.len(), |i, j| self.distance(first[i], second[j]))
    }
}
