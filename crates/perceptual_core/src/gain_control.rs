//! Local divisive gain control.
//!
//! A band is split into a coarse local energy (`norm`, half resolution) and
//! the band divided by that energy upsampled back (`direction`).

use ndarray::{Array4, ArrayView4, Zip};

use crate::conv::{blur_downsample, upsample_blur};
use crate::float_trait::PyrFloat;

/// Filter length of the binomial blur used to pool energy.
const BINOMIAL_TAPS: usize = 5;

/// Default stabilizing constant.
pub const DEFAULT_EPSILON: f64 = 1e-8;

/// Compute `(norm, direction)` of `x`.
///
/// `norm = sqrt(blur_downsample(x^2))`, `direction = x / (upsample_blur(norm) + epsilon)`.
pub fn local_gain_control<F: PyrFloat>(x: ArrayView4<F>, epsilon: F) -> (Array4<F>, Array4<F>) {
    let (_, _, h, w) = x.dim();
    let odd = (h % 2, w % 2);

    let energy = x.mapv(|v| v * v);
    let norm = blur_downsample(energy.view(), 1, BINOMIAL_TAPS, true)
        .mapv(|v| v.max(F::zero()).sqrt());
    let pooled = upsample_blur(norm.view(), odd, BINOMIAL_TAPS, true);

    let mut direction = x.to_owned();
    Zip::from(&mut direction)
        .and(&pooled)
        .for_each(|d, &p| *d = *d / (p + epsilon));
    (norm, direction)
}

/// Invert [`local_gain_control`].
pub fn local_gain_release<F: PyrFloat>(
    norm: ArrayView4<F>,
    direction: ArrayView4<F>,
    epsilon: F,
) -> Array4<F> {
    let (_, _, h, w) = direction.dim();
    let pooled = upsample_blur(norm, (h % 2, w % 2), BINOMIAL_TAPS, true);
    let mut x = direction.to_owned();
    Zip::from(&mut x)
        .and(&pooled)
        .for_each(|v, &p| *v = *v * (p + epsilon));
    x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_band(h: usize, w: usize) -> Array4<f64> {
        Array4::from_shape_fn((2, 1, h, w), |(b, _, r, c)| {
            ((r as f64 * 0.7 + c as f64 * 1.3 + b as f64).sin()) * 3.0
        })
    }

    #[test]
    fn test_shapes() {
        let x = test_band(17, 12);
        let (norm, direction) = local_gain_control(x.view(), 1e-8);
        assert_eq!(norm.dim(), (2, 1, 9, 6));
        assert_eq!(direction.dim(), x.dim());
    }

    #[test]
    fn test_release_inverts_control() {
        let x = test_band(16, 21);
        let eps = 0.1;
        let (norm, direction) = local_gain_control(x.view(), eps);
        let back = local_gain_release(norm.view(), direction.view(), eps);
        let err = x
            .iter()
            .zip(back.iter())
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max);
        assert!(err < 1e-12);
    }

    #[test]
    fn test_constant_band_is_unit_direction() {
        let x = Array4::from_elem((1, 1, 8, 8), 2.0f64);
        let (norm, direction) = local_gain_control(x.view(), 0.0);
        assert!(norm.iter().all(|&v| (v - 2.0).abs() < 1e-12));
        assert!(direction.iter().all(|&v| (v - 1.0).abs() < 1e-12));
    }
}
