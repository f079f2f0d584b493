//! Built-in per-feature distance functions.
//!
//! Every function returns NaN when the two slices have different lengths.

use crate::internal::scipy;

/// Cosine distance between appearance embeddings, in `[0, 2]`.
///
/// A zero vector on either side yields 1.0.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() {
        return f64::NAN;
    }
    scipy::cosine(a, b)
}

/// Euclidean distance between field coordinates divided by `scale`.
pub fn field_euclidean(a: &[f64], b: &[f64], scale: f64) -> f64 {
    if a.len() != b.len() {
        return f64::NAN;
    }
    scipy::euclidean(a, b) / scale
}

/// Chi-squared distance between histograms.
pub fn chi_squared(a: &[f64], b: &[f64], eps: f64) -> f64 {
    if a.len() != b.len() {
        return f64::NAN;
    }
    scipy::chi_squared(a, b, eps)
}

/// Pose keypoint distance.
///
/// Inputs are flattened `[x0, y0, x1, y1, ...]` in normalized image
/// coordinates, with `(0, 0)` marking a keypoint that was not detected.
/// Returns the mean Euclidean distance over keypoints visible in both poses,
/// clamped to `[0, 1]`, or 1.0 when no keypoint is visible in both.
pub fn pose_keypoints(a: &[f64], b: &[f64]) -> f64 {
    if a.len() != b.len() || a.len() % 2 != 0 {
        return f64::NAN;
    }

    let visible = |p: &[f64]| p[0] != 0.0 || p[1] != 0.0;

    let mut total = 0.0;
    let mut count = 0usize;
    for (pa, pb) in a.chunks_exact(2).zip(b.chunks_exact(2)) {
        if visible(pa) && visible(pb) {
            total += scipy::euclidean(pa, pb);
            count += 1;
        }
    }

    if count == 0 {
        return 1.0;
    }
    (total / count as f64).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_cosine_length_mismatch_is_nan() {
        assert!(cosine(&[1.0, 0.0], &[1.0]).is_nan());
    }

    #[test]
    fn test_field_euclidean_scaled() {
        // 3-4-5 triangle at scale 100
        assert_relative_eq!(field_euclidean(&[0.0, 0.0], &[30.0, 40.0], 100.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(field_euclidean(&[100.0, 100.0], &[101.0, 99.0], 100.0), 2f64.sqrt() / 100.0);
    }

    #[test]
    fn test_chi_squared_length_mismatch_is_nan() {
        assert!(chi_squared(&[0.5, 0.5], &[1.0], 1e-10).is_nan());
    }

    #[test]
    fn test_pose_identical() {
        let p = [0.1, 0.2, 0.3, 0.4];
        assert_relative_eq!(pose_keypoints(&p, &p), 0.0);
    }

    #[test]
    fn test_pose_ignores_missing_keypoints() {
        // Second keypoint missing in `b`, only the first is compared
        let a = [0.1, 0.1, 0.9, 0.9];
        let b = [0.1, 0.4, 0.0, 0.0];
        assert_relative_eq!(pose_keypoints(&a, &b), 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_pose_no_common_keypoints() {
        assert_eq!(pose_keypoints(&[0.0; 4], &[0.5; 4]), 1.0);
        assert_eq!(pose_keypoints(&[0.0; 34], &[0.0; 34]), 1.0);
    }

    #[test]
    fn test_pose_clamped() {
        let a = [1.0, 1.0];
        let b = [-1.0, -1.0];
        assert_eq!(pose_keypoints(&a, &b), 1.0);
    }
}
