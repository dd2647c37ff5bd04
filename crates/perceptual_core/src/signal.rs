//! Lookup-table and steering helpers used to design the pyramid filters.
//!
//! Filter design happens once per pyramid and is done in f64; the results
//! are cast to the pyramid's float type when the mask table is stored.

use nalgebra::DMatrix;
use ndarray::{Array2, ArrayView2};

use crate::error::{PyramidError, Result};

// =============================================================================
// Constants
// =============================================================================

/// Half-size of the raised-cosine lookup table.
const RCOS_TABLE_SIZE: i64 = 256;

/// Tolerance below which a singular value counts as zero in the steering matrix.
const STEER_RANK_EPSILON: f64 = 1e-10;

// =============================================================================
// Raised cosine / point operations
// =============================================================================

/// Raised-cosine transition function sampled as a lookup table.
///
/// Returns `(x, y)` where `y` rises from `values.0` to `values.1` over an
/// interval of length `width` centred on `position`. The first and last
/// samples are repeated so that interpolation clamps cleanly.
pub fn rcos_fn(width: f64, position: f64, values: (f64, f64)) -> (Vec<f64>, Vec<f64>) {
    let sz = RCOS_TABLE_SIZE;
    let pi = std::f64::consts::PI;
    let raw: Vec<f64> = (-sz - 1..2).map(|k| pi * k as f64 / (2 * sz) as f64).collect();

    let mut y: Vec<f64> = raw
        .iter()
        .map(|&x| values.0 + (values.1 - values.0) * x.cos().powi(2))
        .collect();
    let last = y.len() - 1;
    y[0] = y[1];
    y[last] = y[last - 1];

    let x = raw
        .iter()
        .map(|&x| position + (2.0 * width / pi) * (x + pi / 4.0))
        .collect();
    (x, y)
}

/// Piecewise-linear interpolation of `(xp, fp)` at `x`, clamped to the end values.
///
/// `xp` must be non-decreasing.
#[inline]
pub fn interp(x: f64, xp: &[f64], fp: &[f64]) -> f64 {
    let n = xp.len();
    if x <= xp[0] {
        return fp[0];
    }
    if x >= xp[n - 1] {
        return fp[n - 1];
    }
    // first index with xp[idx] > x; x lies in [xp[idx-1], xp[idx])
    let idx = xp.partition_point(|&v| v <= x);
    let (x0, x1) = (xp[idx - 1], xp[idx]);
    let (y0, y1) = (fp[idx - 1], fp[idx]);
    if x1 == x0 {
        return y0;
    }
    y0 + (x - x0) * (y1 - y0) / (x1 - x0)
}

/// Apply a lookup table pointwise to a grid.
pub fn point_op(grid: ArrayView2<f64>, lut_y: &[f64], lut_x: &[f64]) -> Array2<f64> {
    grid.mapv(|v| interp(v, lut_x, lut_y))
}

/// Same as [`point_op`] with the table abscissae shifted by `offset`.
pub fn point_op_shifted(
    grid: ArrayView2<f64>,
    lut_y: &[f64],
    lut_x: &[f64],
    offset: f64,
) -> Array2<f64> {
    let shifted: Vec<f64> = lut_x.iter().map(|x| x + offset).collect();
    point_op(grid, lut_y, &shifted)
}

/// Normalisation constant of the angular functions:
/// `2^(2n) (n!)^2 / (num_orientations (2n)!)`.
///
/// Integer parts are exact for every supported order (n <= 15).
pub fn angular_constant(order: usize, num_orientations: usize) -> f64 {
    let factorial = |n: usize| -> u128 { (1..=n as u128).product::<u128>().max(1) };
    let numerator = (1u128 << (2 * order)) * factorial(order) * factorial(order);
    let denominator = num_orientations as u128 * factorial(2 * order);
    numerator as f64 / denominator as f64
}

// =============================================================================
// Steering
// =============================================================================

/// Default harmonics for `num` steerable basis functions: `1 - num % 2, +2, ... < num`.
pub fn default_harmonics(num: usize) -> Vec<usize> {
    ((1 - num % 2)..num).step_by(2).collect()
}

/// Pseudo-inverse of the harmonic matrix evaluated at `angles`.
///
/// Each non-zero harmonic contributes a `(cos, sin)` column pair (or
/// `(sin, -cos)` for odd phase), the zero harmonic a constant column.
/// A rank-deficient matrix is reported with a warning, matching how the
/// steering equation degrades when the sampled angles are not distinct.
pub fn steer_to_harmonics_mtx(
    harmonics: &[usize],
    angles: &[f64],
    even_phase: bool,
) -> Result<DMatrix<f64>> {
    let zeros = harmonics.iter().filter(|&&h| h == 0).count();
    let numh = 2 * harmonics.len() - zeros;
    let mut imtx = DMatrix::<f64>::zeros(angles.len(), numh);

    let mut col = 0;
    for &h in harmonics {
        for (row, &angle) in angles.iter().enumerate() {
            let arg = h as f64 * angle;
            if h == 0 {
                imtx[(row, col)] = 1.0;
            } else if even_phase {
                imtx[(row, col)] = arg.cos();
                imtx[(row, col + 1)] = arg.sin();
            } else {
                imtx[(row, col)] = arg.sin();
                imtx[(row, col + 1)] = -arg.cos();
            }
        }
        col += if h == 0 { 1 } else { 2 };
    }

    let rank = imtx.clone().rank(STEER_RANK_EPSILON);
    if rank < angles.len().min(numh) {
        log::warn!("matrix is not full rank ({} < {})", rank, angles.len().min(numh));
    }

    imtx.pseudo_inverse(STEER_RANK_EPSILON)
        .map_err(|e| PyramidError::Steering(e.to_string()))
}

/// Weights that steer a `num`-function basis (sampled at `pi * k / num`) to `angle`.
pub fn steering_weights(num: usize, angle: f64, even_phase: bool) -> Result<Vec<f64>> {
    let harmonics = default_harmonics(num);
    let basis_angles: Vec<f64> = (0..num)
        .map(|k| std::f64::consts::PI * k as f64 / num as f64)
        .collect();
    let steermtx = steer_to_harmonics_mtx(&harmonics, &basis_angles, even_phase)?;

    let nonzero: Vec<usize> = harmonics.iter().copied().filter(|&h| h != 0).collect();
    let has_zero = nonzero.len() != harmonics.len();
    let numh = steermtx.nrows();
    let mut steervect = vec![0.0; numh];

    if !has_zero {
        for (i, &h) in nonzero.iter().enumerate() {
            let arg = angle * h as f64;
            steervect[2 * i] = arg.cos();
            steervect[2 * i + 1] = arg.sin();
        }
    } else {
        steervect[0] = 1.0;
        for (i, &h) in nonzero.iter().enumerate() {
            let arg = angle * h as f64;
            steervect[2 * i + 1] = arg.cos();
            steervect[2 * i + 2] = arg.sin();
        }
    }

    let weights = (0..steermtx.ncols())
        .map(|j| (0..numh).map(|i| steervect[i] * steermtx[(i, j)]).sum())
        .collect();
    Ok(weights)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rcos_fn_endpoints() {
        let (x, y) = rcos_fn(1.0, -0.5, (0.0, 1.0));
        assert_eq!(x.len(), 259);
        assert_eq!(y.len(), 259);
        // transition spans [-1, 0]
        assert!((x[1] - -1.0).abs() < 1e-12);
        assert!((x[257] - 0.0).abs() < 1e-12);
        assert!(y[0].abs() < 1e-12);
        assert!((y[258] - 1.0).abs() < 1e-12);
        assert!(x.windows(2).all(|w| w[0] < w[1]));
    }

    #[test]
    fn test_interp_clamps_and_interpolates() {
        let xp = [0.0, 1.0, 2.0];
        let fp = [10.0, 20.0, 40.0];
        assert_eq!(interp(-5.0, &xp, &fp), 10.0);
        assert_eq!(interp(5.0, &xp, &fp), 40.0);
        assert!((interp(0.5, &xp, &fp) - 15.0).abs() < 1e-12);
        assert!((interp(1.0, &xp, &fp) - 20.0).abs() < 1e-12);
        assert!((interp(1.75, &xp, &fp) - 35.0).abs() < 1e-12);
    }

    #[test]
    fn test_angular_constant_partition_of_unity() {
        // sum_b const * cos(theta - pi b / N)^(2n) == 1 for every theta
        for order in [1usize, 2, 3, 5, 15] {
            let n_or = order + 1;
            let c = angular_constant(order, n_or);
            for theta in [0.0, 0.3, 1.1, 2.9] {
                let total: f64 = (0..n_or)
                    .map(|b| {
                        let a = theta - std::f64::consts::PI * b as f64 / n_or as f64;
                        c * a.cos().powi(2 * order as i32)
                    })
                    .sum();
                assert!((total - 1.0).abs() < 1e-9, "order {} theta {}", order, theta);
            }
        }
    }

    #[test]
    fn test_default_harmonics() {
        assert_eq!(default_harmonics(4), vec![1, 3]);
        assert_eq!(default_harmonics(3), vec![0, 2]);
        assert_eq!(default_harmonics(2), vec![1]);
    }

    #[test]
    fn test_steering_weights_reproduce_basis_angles() {
        // Steering to the k-th basis angle selects the k-th basis function.
        for num in [2usize, 3, 4, 6] {
            for k in 0..num {
                let angle = std::f64::consts::PI * k as f64 / num as f64;
                let w = steering_weights(num, angle, true).unwrap();
                for (j, &wj) in w.iter().enumerate() {
                    let expected = if j == k { 1.0 } else { 0.0 };
                    assert!(
                        (wj - expected).abs() < 1e-9,
                        "num {} k {} j {}: {}",
                        num,
                        k,
                        j,
                        wj
                    );
                }
            }
        }
    }
}
