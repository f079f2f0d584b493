//! Plane-to-plane homography estimation via DLT with Hartley normalization,
//! wrapped in an adaptive RANSAC loop.

use nalgebra::{DMatrix, Matrix3, SymmetricEigen, Vector3};
use rand::rngs::StdRng;
use rand::SeedableRng;

use crate::{Error, Result};

/// Minimum number of correspondences that define a homography.
pub const MIN_CORRESPONDENCES: usize = 4;

/// Twice the triangle area below which three sample points count as collinear.
const COLLINEAR_EPS: f64 = 1e-9;

// ── Projection ───────────────────────────────────────────────────────────

/// Project a 2D point through a 3×3 homography: H * [x, y, 1]^T → [u, v].
///
/// A zero homogeneous scale is replaced by a tiny positive value so the
/// result stays finite for finite inputs.
pub fn project(h: &Matrix3<f64>, point: [f64; 2]) -> [f64; 2] {
    let p = h * Vector3::new(point[0], point[1], 1.0);
    let w = if p[2] == 0.0 { 1e-7 } else { p[2] };
    [p[0] / w, p[1] / w]
}

/// Reprojection error: ||project(H, src) - dst||.
pub fn reprojection_error(h: &Matrix3<f64>, src: [f64; 2], dst: [f64; 2]) -> f64 {
    let p = project(h, src);
    let dx = p[0] - dst[0];
    let dy = p[1] - dst[1];
    (dx * dx + dy * dy).sqrt()
}

// ── Hartley normalization ────────────────────────────────────────────────

/// Translate centroid to origin and scale so the mean distance from the
/// origin is sqrt(2).
fn normalize_points(pts: &[[f64; 2]]) -> (Matrix3<f64>, Vec<[f64; 2]>) {
    let n = pts.len() as f64;
    let cx = pts.iter().map(|p| p[0]).sum::<f64>() / n;
    let cy = pts.iter().map(|p| p[1]).sum::<f64>() / n;

    let mean_dist = pts
        .iter()
        .map(|p| ((p[0] - cx).powi(2) + (p[1] - cy).powi(2)).sqrt())
        .sum::<f64>()
        / n;

    let s = if mean_dist > 1e-15 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };

    let t = Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0);
    let normalized = pts.iter().map(|p| [s * (p[0] - cx), s * (p[1] - cy)]).collect();

    (t, normalized)
}

// ── DLT ──────────────────────────────────────────────────────────────────

/// Estimate the homography H with `dst ≈ project(H, src)` from at least four
/// correspondences.
///
/// # Errors
/// `CalibrationError` if fewer than four pairs are given, the lengths differ,
/// or the solution is singular or non-finite.
pub fn estimate_homography_dlt(src: &[[f64; 2]], dst: &[[f64; 2]]) -> Result<Matrix3<f64>> {
    let n = src.len();
    if n < MIN_CORRESPONDENCES || dst.len() != n {
        return Err(Error::CalibrationError(format!(
            "DLT needs at least {} matching pairs, got {} source and {} destination points",
            MIN_CORRESPONDENCES,
            n,
            dst.len()
        )));
    }

    let (t_src, src_n) = normalize_points(src);
    let (t_dst, dst_n) = normalize_points(dst);

    // 2n × 9 design matrix
    let mut a = DMatrix::zeros(2 * n, 9);
    for i in 0..n {
        let (sx, sy) = (src_n[i][0], src_n[i][1]);
        let (dx, dy) = (dst_n[i][0], dst_n[i][1]);

        a[(2 * i, 3)] = -sx;
        a[(2 * i, 4)] = -sy;
        a[(2 * i, 5)] = -1.0;
        a[(2 * i, 6)] = dy * sx;
        a[(2 * i, 7)] = dy * sy;
        a[(2 * i, 8)] = dy;

        a[(2 * i + 1, 0)] = sx;
        a[(2 * i + 1, 1)] = sy;
        a[(2 * i + 1, 2)] = 1.0;
        a[(2 * i + 1, 6)] = -dx * sx;
        a[(2 * i + 1, 7)] = -dx * sy;
        a[(2 * i + 1, 8)] = -dx;
    }

    // h is the eigenvector of the smallest eigenvalue of A^T A
    let eig = SymmetricEigen::new(a.transpose() * &a);
    let min_idx = eig
        .eigenvalues
        .iter()
        .enumerate()
        .min_by(|x, y| x.1.abs().total_cmp(&y.1.abs()))
        .map(|(i, _)| i)
        .unwrap_or(0);
    let v = eig.eigenvectors.column(min_idx);
    let h_norm = Matrix3::new(v[0], v[1], v[2], v[3], v[4], v[5], v[6], v[7], v[8]);

    let t_dst_inv = t_dst
        .try_inverse()
        .ok_or_else(|| Error::CalibrationError("normalizing transform not invertible".to_string()))?;
    let mut h = t_dst_inv * h_norm * t_src;

    let scale = h[(2, 2)];
    if scale.abs() > 1e-15 {
        h /= scale;
    }

    check_homography(&h)?;
    Ok(h)
}

/// Reject non-finite or (numerically) singular homographies.
pub(crate) fn check_homography(h: &Matrix3<f64>) -> Result<()> {
    if h.iter().any(|v| !v.is_finite()) {
        return Err(Error::CalibrationError("homography has non-finite entries".to_string()));
    }
    let norm = h.norm();
    if norm == 0.0 || (h / norm).determinant().abs() < 1e-12 {
        return Err(Error::CalibrationError("homography is singular".to_string()));
    }
    Ok(())
}

// ── RANSAC ───────────────────────────────────────────────────────────────

/// Result of RANSAC homography fitting.
#[derive(Debug, Clone)]
pub struct RansacFit {
    /// The fitted homography.
    pub h: Matrix3<f64>,
    /// true for inlier correspondences.
    pub inlier_mask: Vec<bool>,
    /// Number of inliers.
    pub n_inliers: usize,
}

fn collinear(a: [f64; 2], b: [f64; 2], c: [f64; 2]) -> bool {
    let cross = (b[0] - a[0]) * (c[1] - a[1]) - (b[1] - a[1]) * (c[0] - a[0]);
    cross.abs() < COLLINEAR_EPS
}

/// True when any three of the four points are collinear.
fn degenerate_sample(pts: &[[f64; 2]]) -> bool {
    (0..4).any(|skip| {
        let tri: Vec<[f64; 2]> = pts.iter().enumerate().filter(|(i, _)| *i != skip).map(|(_, p)| *p).collect();
        collinear(tri[0], tri[1], tri[2])
    })
}

/// Number of iterations needed to draw an all-inlier sample with the given
/// confidence at the observed inlier ratio.
fn required_iterations(confidence: f64, inlier_ratio: f64, max_iters: usize) -> usize {
    let outlier_ratio = 1.0 - inlier_ratio;
    let denom = (1.0 - (1.0 - outlier_ratio).powi(MIN_CORRESPONDENCES as i32)).ln();
    if denom >= 0.0 || !denom.is_finite() {
        // Every sample is all-inlier (ratio 1.0) or the ratio is zero
        return if inlier_ratio >= 1.0 { 1 } else { max_iters };
    }
    let num = (1.0 - confidence).max(f64::MIN_POSITIVE).ln();
    let iters = (num / denom).ceil();
    if iters.is_finite() && iters >= 0.0 {
        (iters as usize).min(max_iters)
    } else {
        max_iters
    }
}

fn score(h: &Matrix3<f64>, src: &[[f64; 2]], dst: &[[f64; 2]], threshold: f64) -> (Vec<bool>, usize) {
    let mask: Vec<bool> = src
        .iter()
        .zip(dst)
        .map(|(&s, &d)| reprojection_error(h, s, d) <= threshold)
        .collect();
    let count = mask.iter().filter(|&&m| m).count();
    (mask, count)
}

/// Fit a homography with RANSAC.
///
/// Minimal samples of four correspondences are drawn from a generator seeded
/// with `seed`, so fits are reproducible. The iteration budget shrinks as the
/// best inlier ratio grows. The best model is refit on all its inliers.
///
/// # Errors
/// `CalibrationError` if fewer than four pairs are given or no
/// non-degenerate sample produced a valid model.
pub fn fit_homography_ransac(
    src: &[[f64; 2]],
    dst: &[[f64; 2]],
    threshold: f64,
    max_iters: usize,
    confidence: f64,
    seed: u64,
) -> Result<RansacFit> {
    let n = src.len();
    if n < MIN_CORRESPONDENCES || dst.len() != n {
        return Err(Error::CalibrationError(format!(
            "RANSAC needs at least {} matching pairs, got {} source and {} destination points",
            MIN_CORRESPONDENCES,
            n,
            dst.len()
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);

    let mut best: Option<(Matrix3<f64>, usize)> = None;
    let mut budget = max_iters.max(1);
    let mut iter = 0;

    while iter < budget {
        iter += 1;

        let idx = rand::seq::index::sample(&mut rng, n, MIN_CORRESPONDENCES);
        let s4: Vec<[f64; 2]> = idx.iter().map(|i| src[i]).collect();
        let d4: Vec<[f64; 2]> = idx.iter().map(|i| dst[i]).collect();
        if degenerate_sample(&s4) || degenerate_sample(&d4) {
            continue;
        }

        let h = match estimate_homography_dlt(&s4, &d4) {
            Ok(h) => h,
            Err(_) => continue,
        };

        let (_, count) = score(&h, src, dst, threshold);
        if best.map_or(true, |(_, c)| count > c) {
            best = Some((h, count));
            budget = required_iterations(confidence, count as f64 / n as f64, max_iters).max(iter);
        }
    }

    let (best_h, _) = best.ok_or_else(|| {
        Error::CalibrationError("no non-degenerate sample of four correspondences".to_string())
    })?;

    let (best_mask, _) = score(&best_h, src, dst, threshold);
    let inlier_src: Vec<[f64; 2]> = src.iter().zip(&best_mask).filter(|(_, &m)| m).map(|(p, _)| *p).collect();
    let inlier_dst: Vec<[f64; 2]> = dst.iter().zip(&best_mask).filter(|(_, &m)| m).map(|(p, _)| *p).collect();

    let h = estimate_homography_dlt(&inlier_src, &inlier_dst).unwrap_or(best_h);
    let (inlier_mask, n_inliers) = score(&h, src, dst, threshold);

    Ok(RansacFit {
        h,
        inlier_mask,
        n_inliers,
    })
}
