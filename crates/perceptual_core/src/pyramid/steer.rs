//! Steering oriented bands to arbitrary angles.

use std::collections::BTreeMap;

use crate::error::{PyramidError, Result};
use crate::float_trait::PyrFloat;
use crate::signal::steering_weights;

use super::forward::SteerablePyramid;
use super::{PyrBand, PyrKey, PyramidCoeffs};

/// Steering weights per (scale, target angle index).
pub type SteeringWeights<F> = BTreeMap<PyrKey, Vec<F>>;

impl<F: PyrFloat> SteerablePyramid<F> {
    /// Steer every scale's oriented bands to each angle in `angles`.
    ///
    /// The band steered to `angles[j]` at scale `s` is stored under
    /// `(s, num_orientations + j)`; the weights that produced it under `(s, j)`.
    /// Residual bands are not steered.
    pub fn steer_coeffs(
        &self,
        coeffs: &PyramidCoeffs<F>,
        angles: &[f64],
        even_phase: bool,
    ) -> Result<(PyramidCoeffs<F>, SteeringWeights<F>)> {
        let n = self.num_orientations();
        let weights_per_angle: Vec<Vec<F>> = angles
            .iter()
            .map(|&angle| {
                steering_weights(n, angle, even_phase)
                    .map(|w| w.into_iter().map(F::from_f64_c).collect())
            })
            .collect::<Result<_>>()?;

        let mut resteered = PyramidCoeffs::new();
        let mut weights = SteeringWeights::new();

        for scale in 0..self.num_scales {
            let basis: Vec<(PyrKey, &PyrBand<F>)> = (0..n)
                .map(|b| {
                    let key = PyrKey::band(scale, b);
                    coeffs
                        .get(&key)
                        .map(|band| (key, band))
                        .ok_or(PyramidError::MissingKey(key))
                })
                .collect::<Result<_>>()?;
            check_kinds(&basis)?;
            let basis: Vec<&PyrBand<F>> = basis.into_iter().map(|(_, band)| band).collect();

            for (j, w) in weights_per_angle.iter().enumerate() {
                resteered.insert(PyrKey::band(scale, n + j), combine(&basis, w));
                weights.insert(PyrKey::band(scale, j), w.clone());
            }
        }

        Ok((resteered, weights))
    }
}

/// All bands of one scale must be of the same kind and spatial size.
fn check_kinds<F: PyrFloat>(basis: &[(PyrKey, &PyrBand<F>)]) -> Result<()> {
    let Some((_, first)) = basis.first() else {
        return Ok(());
    };
    for (key, band) in &basis[1..] {
        if band.is_complex() != first.is_complex() {
            return Err(PyramidError::BandKind {
                key: *key,
                expected: first.kind(),
                got: band.kind(),
            });
        }
        if band.spatial() != first.spatial() {
            return Err(PyramidError::ShapeMismatch {
                expected: first.spatial(),
                got: band.spatial(),
            });
        }
    }
    Ok(())
}

/// `sum_b basis[b] * weights[b]`; the basis has passed [`check_kinds`].
fn combine<F: PyrFloat>(basis: &[&PyrBand<F>], weights: &[F]) -> PyrBand<F> {
    match basis[0] {
        PyrBand::Real(first) => {
            let mut acc = first.mapv(|v| v * weights[0]);
            for (band, &w) in basis.iter().zip(weights).skip(1) {
                if let PyrBand::Real(a) = band {
                    acc.zip_mut_with(a, |o, &v| *o += v * w);
                }
            }
            PyrBand::Real(acc)
        }
        PyrBand::Complex(first) => {
            let mut acc = first.mapv(|v| v * weights[0]);
            for (band, &w) in basis.iter().zip(weights).skip(1) {
                if let PyrBand::Complex(a) = band {
                    acc.zip_mut_with(a, |o, &v| *o += v * w);
                }
            }
            PyrBand::Complex(acc)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::{Execution, PyramidConfig};
    use ndarray::Array4;

    fn pyramid(config: PyramidConfig) -> SteerablePyramid<f64> {
        SteerablePyramid::new(config.execution(Execution::Sequential)).unwrap()
    }

    fn max_abs_diff(a: &Array4<f64>, b: &Array4<f64>) -> f64 {
        a.iter()
            .zip(b.iter())
            .map(|(x, y)| (x - y).abs())
            .fold(0.0, f64::max)
    }

    fn test_image(rows: usize, cols: usize) -> Array4<f64> {
        Array4::from_shape_fn((1, 1, rows, cols), |(_, _, r, c)| {
            ((r * 7 + c * 3) % 11) as f64 / 11.0 + ((r as f64) * 0.3).sin()
        })
    }

    #[test]
    fn test_steer_to_basis_angles_reproduces_bands() {
        let mut pyr = pyramid(PyramidConfig::new((32, 32)));
        let coeffs = pyr.forward(test_image(32, 32).view(), &[]).unwrap();
        let n = pyr.num_orientations();
        let angles: Vec<f64> = (0..n)
            .map(|b| std::f64::consts::PI * b as f64 / n as f64)
            .collect();
        let (steered, weights) = pyr.steer_coeffs(&coeffs, &angles, true).unwrap();

        assert_eq!(steered.len(), pyr.num_scales() * n);
        assert_eq!(weights.len(), pyr.num_scales() * n);
        for scale in 0..pyr.num_scales() {
            for b in 0..n {
                let original = coeffs.get(&PyrKey::band(scale, b)).unwrap().real_part();
                let resteered = steered
                    .get(&PyrKey::band(scale, n + b))
                    .unwrap()
                    .real_part();
                assert!(max_abs_diff(&original, &resteered) < 1e-8);
                assert_eq!(weights[&PyrKey::band(scale, b)].len(), n);
            }
        }
    }

    #[test]
    fn test_steer_complex_bands() {
        let mut pyr = pyramid(PyramidConfig::new((32, 32)).is_complex(true));
        let coeffs = pyr.forward(test_image(32, 32).view(), &[]).unwrap();
        let (steered, _) = pyr.steer_coeffs(&coeffs, &[0.3, 1.2], false).unwrap();
        assert!(steered.get(&PyrKey::band(0, 4)).unwrap().is_complex());
        assert!(steered.get(&PyrKey::band(0, 5)).is_some());
        assert!(!steered.contains_key(&PyrKey::ResidualLowpass));
    }

    #[test]
    fn test_steer_rejects_mixed_band_kinds() {
        let mut pyr = pyramid(PyramidConfig::new((32, 32)).is_complex(true));
        let mut coeffs = pyr.forward(test_image(32, 32).view(), &[]).unwrap();
        let key = PyrKey::band(1, 3);
        let real = coeffs.get(&key).unwrap().real_part();
        coeffs.insert(key, PyrBand::Real(real));
        assert!(matches!(
            pyr.steer_coeffs(&coeffs, &[0.5], false),
            Err(PyramidError::BandKind { expected: "complex", got: "real", .. })
        ));
    }

    #[test]
    fn test_steer_requires_oriented_bands() {
        let mut pyr = pyramid(PyramidConfig::new((32, 32)));
        let coeffs = pyr
            .forward(test_image(32, 32).view(), &[crate::pyramid::Level::Scale(0)])
            .unwrap();
        assert!(matches!(
            pyr.steer_coeffs(&coeffs, &[0.0], true),
            Err(PyramidError::MissingKey(PyrKey::Band { scale: 1, orientation: 0 }))
        ));
    }
}
