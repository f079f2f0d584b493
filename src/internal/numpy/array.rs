//! NumPy-like point-set shape validation.

use nalgebra::DMatrix;

use crate::{Error, Result};

/// Convert an `(n_points, 2)` matrix into a list of 2D points.
///
/// Rejects any other column count, empty matrices and non-finite values.
pub fn points_from_matrix(points: &DMatrix<f64>) -> Result<Vec<[f64; 2]>> {
    let (rows, cols) = points.shape();

    if rows == 0 || cols != 2 {
        return Err(Error::InvalidPointsShape {
            expected: "(n_points, 2)".to_string(),
            got: format!("({}, {})", rows, cols),
        });
    }

    let out: Vec<[f64; 2]> = (0..rows).map(|i| [points[(i, 0)], points[(i, 1)]]).collect();
    validate_finite(&out)?;
    Ok(out)
}

/// Validate a pair of corresponding point sets.
///
/// Both sets must have the same length, at least `min_points` entries and only
/// finite coordinates.
pub fn validate_point_pairs(src: &[[f64; 2]], dst: &[[f64; 2]], min_points: usize) -> Result<()> {
    if src.len() != dst.len() {
        return Err(Error::InvalidPointsShape {
            expected: format!("destination shape ({}, 2) matching source", src.len()),
            got: format!("({}, 2)", dst.len()),
        });
    }

    if src.len() < min_points {
        return Err(Error::InvalidPointsShape {
            expected: format!("at least {} point pairs", min_points),
            got: format!("{}", src.len()),
        });
    }

    validate_finite(src)?;
    validate_finite(dst)
}

fn validate_finite(points: &[[f64; 2]]) -> Result<()> {
    match points.iter().position(|p| !p[0].is_finite() || !p[1].is_finite()) {
        Some(idx) => Err(Error::InvalidConfig(format!(
            "point {} has non-finite coordinates ({}, {})",
            idx, points[idx][0], points[idx][1]
        ))),
        None => Ok(()),
    }
}
