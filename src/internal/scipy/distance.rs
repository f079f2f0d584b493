//! Vector distance kernels ported from scipy.spatial.distance.
//!
//! All kernels operate on equally sized slices. Callers are responsible for
//! checking lengths; extra trailing elements of the longer slice are ignored.

/// Euclidean (L2) distance.
pub fn euclidean(a: &[f64], b: &[f64]) -> f64 {
    sqeuclidean(a, b).sqrt()
}

/// Squared Euclidean distance.
pub fn sqeuclidean(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let d = x - y;
            d * d
        })
        .sum()
}

/// Cosine distance `1 - a.b / (|a| |b|)`.
///
/// scipy returns NaN when either vector has zero norm; here a zero vector is
/// treated as maximally uninformative and yields 1.0. Rounding can push the
/// raw value slightly outside [0, 2], so the result is clamped.
pub fn cosine(a: &[f64], b: &[f64]) -> f64 {
    let mut dot = 0.0;
    let mut norm_a = 0.0;
    let mut norm_b = 0.0;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    let norm_a = norm_a.sqrt();
    let norm_b = norm_b.sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }
    (1.0 - dot / (norm_a * norm_b)).clamp(0.0, 2.0)
}

/// Chi-squared histogram distance `0.5 * sum((a - b)^2 / (a + b + eps))`.
///
/// Negative bins carry no mass and are read as 0, which keeps the result
/// non-negative.
pub fn chi_squared(a: &[f64], b: &[f64], eps: f64) -> f64 {
    0.5 * a
        .iter()
        .zip(b.iter())
        .map(|(x, y)| {
            let (x, y) = (x.max(0.0), y.max(0.0));
            let d = x - y;
            d * d / (x + y + eps)
        })
        .sum::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    // ===== Euclidean distance tests =====

    #[test]
    fn test_euclidean_3_4_5() {
        assert_relative_eq!(euclidean(&[0.0, 0.0], &[3.0, 4.0]), 5.0, epsilon = 1e-10);
        assert_relative_eq!(sqeuclidean(&[0.0, 0.0], &[3.0, 4.0]), 25.0, epsilon = 1e-10);
    }

    #[test]
    fn test_euclidean_identical() {
        assert_relative_eq!(euclidean(&[1.5, -2.0, 7.0], &[1.5, -2.0, 7.0]), 0.0, epsilon = 1e-12);
    }

    // ===== Cosine distance tests =====

    #[test]
    fn test_cosine_orthogonal() {
        // Cosine similarity = 0, so cosine distance = 1
        assert_relative_eq!(cosine(&[1.0, 0.0], &[0.0, 1.0]), 1.0, epsilon = 1e-10);
    }

    #[test]
    fn test_cosine_parallel() {
        assert_relative_eq!(cosine(&[1.0, 1.0], &[2.0, 2.0]), 0.0, epsilon = 1e-10);
    }

    #[test]
    fn test_cosine_opposite() {
        assert_relative_eq!(cosine(&[1.0, 0.0], &[-1.0, 0.0]), 2.0, epsilon = 1e-10);
    }

    #[test]
    fn test_cosine_zero_vector() {
        assert_eq!(cosine(&[0.0, 0.0], &[1.0, 2.0]), 1.0);
        assert_eq!(cosine(&[0.0, 0.0], &[0.0, 0.0]), 1.0);
    }

    // ===== Chi-squared distance tests =====

    #[test]
    fn test_chi_squared_identical() {
        let h = [0.2, 0.3, 0.5];
        assert_relative_eq!(chi_squared(&h, &h, 1e-10), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_chi_squared_disjoint() {
        // (1-0)^2/(1+0) + (0-1)^2/(0+1) = 2, halved = 1
        assert_relative_eq!(chi_squared(&[1.0, 0.0], &[0.0, 1.0], 1e-10), 1.0, epsilon = 1e-8);
    }

    #[test]
    fn test_chi_squared_negative_bins_read_as_empty() {
        // [-1, 0] behaves like [0, 0]: 0.25 / 0.5 halved
        let d = chi_squared(&[-1.0, 0.0], &[0.5, 0.0], 1e-10);
        assert!(d >= 0.0);
        assert_relative_eq!(d, 0.25, epsilon = 1e-8);
    }

    #[test]
    fn test_chi_squared_empty_bins_do_not_divide_by_zero() {
        let d = chi_squared(&[0.0, 0.0, 1.0], &[0.0, 0.0, 1.0], 1e-10);
        assert!(d.is_finite());
        assert_relative_eq!(d, 0.0, epsilon = 1e-12);
    }
}
