//! Pyramid construction and the forward transform.

use std::collections::BTreeMap;

use ndarray::{s, Array2, Array4, ArrayView2, ArrayView4};
use rustfft::num_complex::Complex;

use crate::error::{PyramidError, Result};
use crate::float_trait::PyrFloat;
use crate::transforms::{centered_spectrum, invert_centered, FftNorm};

use super::config::{Execution, PyramidConfig};
use super::masks::MaskTable;
use super::{Level, PyrBand, PyrKey, PyramidCoeffs};

/// Frequency-domain steerable pyramid for images of one fixed size.
///
/// The precision is the type parameter; the masks are computed once in
/// [`SteerablePyramid::new`] and never change afterwards.
#[derive(Debug, Clone)]
pub struct SteerablePyramid<F: PyrFloat> {
    pub(super) config: PyramidConfig,
    pub(super) num_scales: usize,
    pub(super) masks: MaskTable<F>,
    pub(super) pyr_size: BTreeMap<PyrKey, (usize, usize)>,
}

/// One band of one (batch, channel) plane.
pub(super) enum PlaneBand<F: PyrFloat> {
    Real(Array2<F>),
    Complex(Array2<Complex<F>>),
}

impl<F: PyrFloat> SteerablePyramid<F> {
    pub fn new(config: PyramidConfig) -> Result<Self> {
        let config = config.normalized()?;
        let num_scales = config.num_scales()?;
        let masks = MaskTable::build(&config, num_scales)?;
        log::debug!(
            "steerable pyramid {:?}: {} scales, order {}, complex={}, downsample={}, \
             tight_frame={}",
            config.image_shape,
            num_scales,
            config.order,
            config.is_complex,
            config.downsample,
            config.tight_frame
        );
        Ok(Self {
            config,
            num_scales,
            masks,
            pyr_size: BTreeMap::new(),
        })
    }

    /// Same pyramid at another precision; the masks are recomputed.
    pub fn rebuild<G: PyrFloat>(&self) -> Result<SteerablePyramid<G>> {
        SteerablePyramid::new(self.config.clone())
    }

    /// Same pyramid with another execution target.
    pub fn with_execution(&self, execution: Execution) -> Result<Self> {
        Self::new(self.config.clone().execution(execution))
    }

    /// The normalized construction parameters.
    pub fn config(&self) -> &PyramidConfig {
        &self.config
    }

    pub fn num_scales(&self) -> usize {
        self.num_scales
    }

    pub fn num_orientations(&self) -> usize {
        self.config.num_orientations()
    }

    pub fn masks(&self) -> &MaskTable<F> {
        &self.masks
    }

    /// Band sizes written by the last call to [`forward`](Self::forward).
    pub fn pyr_size(&self) -> &BTreeMap<PyrKey, (usize, usize)> {
        &self.pyr_size
    }

    pub(super) fn norm(&self) -> FftNorm {
        self.config.fft_norm()
    }

    /// Every key a forward call over all levels produces, in order.
    pub fn full_keys(&self) -> Vec<PyrKey> {
        let mut keys = Vec::with_capacity(self.num_scales * self.num_orientations() + 2);
        keys.push(PyrKey::ResidualHighpass);
        for scale in 0..self.num_scales {
            for orientation in 0..self.num_orientations() {
                keys.push(PyrKey::band(scale, orientation));
            }
        }
        keys.push(PyrKey::ResidualLowpass);
        keys
    }

    pub(super) fn check_scale(&self, scale: usize) -> Result<()> {
        if scale >= self.num_scales {
            return Err(PyramidError::ScaleOutOfRange {
                scale,
                max: self.num_scales.saturating_sub(1),
            });
        }
        Ok(())
    }

    /// Decompose a (batch, channel, height, width) image.
    ///
    /// An empty `scales` slice selects every level. The size table is
    /// rewritten with the spatial size of every produced band.
    pub fn forward(&mut self, image: ArrayView4<F>, scales: &[Level]) -> Result<PyramidCoeffs<F>> {
        let (batch, channels, rows, cols) = image.dim();
        if (rows, cols) != self.config.image_shape {
            return Err(PyramidError::ShapeMismatch {
                expected: self.config.image_shape,
                got: (rows, cols),
            });
        }

        let mut want_scale = vec![scales.is_empty(); self.num_scales];
        let mut want_hi = scales.is_empty();
        let mut want_lo = scales.is_empty();
        for level in scales {
            match *level {
                Level::ResidualHighpass => want_hi = true,
                Level::ResidualLowpass => want_lo = true,
                Level::Scale(s) => {
                    self.check_scale(s)?;
                    want_scale[s] = true;
                }
            }
        }

        let n_planes = batch * channels;
        let this = &*self;
        let planes = self.config.execution.map(n_planes, |p| {
            let plane = image.slice(s![p / channels, p % channels, .., ..]);
            this.forward_plane(plane, want_hi, &want_scale, want_lo)
        });

        let coeffs = assemble(planes, batch, channels);
        self.pyr_size = coeffs.iter().map(|(k, b)| (*k, b.spatial())).collect();
        log::debug!("forward produced {} bands over {} planes", coeffs.len(), n_planes);
        Ok(coeffs)
    }

    fn forward_plane(
        &self,
        plane: ArrayView2<F>,
        want_hi: bool,
        want_scale: &[bool],
        want_lo: bool,
    ) -> Vec<(PyrKey, PlaneBand<F>)> {
        let norm = self.norm();
        let masks = &self.masks;
        let mut out = Vec::new();

        let spectrum = centered_spectrum(plane, &masks.image_plans, norm);

        let one = Complex::new(F::one(), F::zero());
        if want_hi {
            let hidft = mask_spectrum(spectrum.view(), masks.hi0mask.view(), one);
            let hi0 = invert_centered(hidft.view(), &masks.image_plans, norm);
            out.push((PyrKey::ResidualHighpass, PlaneBand::Real(hi0.mapv(|c| c.re))));
        }

        let mut lodft = mask_spectrum(spectrum.view(), masks.lo0mask.view(), one);
        let phase = forward_phase::<F>(self.config.order);
        let sqrt2 = F::from_f64_c(std::f64::consts::SQRT_2);

        for (scale, sm) in masks.scales.iter().enumerate() {
            if want_scale[scale] {
                for (b, angle_mask) in sm.angle_masks.iter().enumerate() {
                    let banddft = Array2::from_shape_fn(lodft.dim(), |(r, c)| {
                        lodft[[r, c]] * phase * (angle_mask[[r, c]] * sm.himask[[r, c]])
                    });
                    let band = invert_centered(banddft.view(), &sm.plans, norm);
                    let band = if !self.config.is_complex {
                        PlaneBand::Real(band.mapv(|c| c.re))
                    } else if self.config.tight_frame {
                        PlaneBand::Complex(band.mapv(|c| c / sqrt2))
                    } else {
                        PlaneBand::Complex(band)
                    };
                    out.push((PyrKey::band(scale, b), band));
                }
            }

            let cropped = sm.crop.view(lodft.view());
            lodft = mask_spectrum(cropped, sm.lomask.view(), one);
        }

        if want_lo {
            let lo = invert_centered(lodft.view(), &masks.lowpass_plans, norm);
            out.push((PyrKey::ResidualLowpass, PlaneBand::Real(lo.mapv(|c| c.re))));
        }

        out
    }
}

/// `spectrum * mask * factor`, elementwise.
pub(super) fn mask_spectrum<F: PyrFloat>(
    spectrum: ArrayView2<Complex<F>>,
    mask: ArrayView2<F>,
    factor: Complex<F>,
) -> Array2<Complex<F>> {
    Array2::from_shape_fn(spectrum.dim(), |(r, c)| spectrum[[r, c]] * factor * mask[[r, c]])
}

/// `(-i)^order`.
pub(super) fn forward_phase<F: PyrFloat>(order: usize) -> Complex<F> {
    let (one, zero) = (F::one(), F::zero());
    match order % 4 {
        0 => Complex::new(one, zero),
        1 => Complex::new(zero, -one),
        2 => Complex::new(-one, zero),
        _ => Complex::new(zero, one),
    }
}

/// `(+i)^order`.
pub(super) fn recon_phase<F: PyrFloat>(order: usize) -> Complex<F> {
    forward_phase::<F>(order).conj()
}

/// Stack per-plane bands into (batch, channel, height, width) arrays.
///
/// Every plane yields the same keys in the same order.
fn assemble<F: PyrFloat>(
    planes: Vec<Vec<(PyrKey, PlaneBand<F>)>>,
    batch: usize,
    channels: usize,
) -> PyramidCoeffs<F> {
    let mut coeffs = PyramidCoeffs::new();
    let Some(first) = planes.first() else {
        return coeffs;
    };

    for (idx, (key, proto)) in first.iter().enumerate() {
        let band = match proto {
            PlaneBand::Real(a) => {
                let (h, w) = a.dim();
                let mut arr = Array4::zeros((batch, channels, h, w));
                for (p, plane) in planes.iter().enumerate() {
                    if let PlaneBand::Real(v) = &plane[idx].1 {
                        arr.slice_mut(s![p / channels, p % channels, .., ..]).assign(v);
                    }
                }
                PyrBand::Real(arr)
            }
            PlaneBand::Complex(a) => {
                let (h, w) = a.dim();
                let mut arr = Array4::zeros((batch, channels, h, w));
                for (p, plane) in planes.iter().enumerate() {
                    if let PlaneBand::Complex(v) = &plane[idx].1 {
                        arr.slice_mut(s![p / channels, p % channels, .., ..]).assign(v);
                    }
                }
                PyrBand::Complex(arr)
            }
        };
        coeffs.insert(*key, band);
    }
    coeffs
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::Height;

    // Helper: Simple Linear Congruential Generator for deterministic "random" test data
    struct SimpleLcg {
        state: u64,
    }

    impl SimpleLcg {
        fn new(seed: u64) -> Self {
            Self { state: seed }
        }

        fn next_f64(&mut self) -> f64 {
            self.state = self
                .state
                .wrapping_mul(6364136223846793005)
                .wrapping_add(1442695040888963407);
            (self.state >> 11) as f64 / (1u64 << 53) as f64
        }
    }

    fn random_image(shape: (usize, usize, usize, usize), seed: u64) -> Array4<f64> {
        let mut rng = SimpleLcg::new(seed);
        Array4::from_shape_fn(shape, |_| rng.next_f64())
    }

    fn pyramid(config: PyramidConfig) -> SteerablePyramid<f64> {
        SteerablePyramid::new(config.execution(Execution::Sequential)).unwrap()
    }

    // ==================== Key Tests ====================

    #[test]
    fn test_forward_produces_all_keys_in_order() {
        let mut pyr = pyramid(PyramidConfig::new((64, 64)).height(Height::Levels(3)));
        let img = random_image((1, 1, 64, 64), 1);
        let coeffs = pyr.forward(img.view(), &[]).unwrap();
        assert_eq!(coeffs.len(), 14);
        let keys: Vec<PyrKey> = coeffs.keys().copied().collect();
        assert_eq!(keys, pyr.full_keys());
        assert_eq!(keys.first(), Some(&PyrKey::ResidualHighpass));
        assert_eq!(keys.last(), Some(&PyrKey::ResidualLowpass));
    }

    #[test]
    fn test_forward_band_sizes_and_size_table() {
        let mut pyr = pyramid(PyramidConfig::new((64, 64)).height(Height::Levels(3)));
        let img = random_image((2, 3, 64, 64), 2);
        let coeffs = pyr.forward(img.view(), &[]).unwrap();
        assert_eq!(coeffs.get(&PyrKey::ResidualHighpass).unwrap().shape(), [2, 3, 64, 64]);
        assert_eq!(coeffs.get(&PyrKey::band(0, 0)).unwrap().spatial(), (64, 64));
        assert_eq!(coeffs.get(&PyrKey::band(1, 2)).unwrap().spatial(), (32, 32));
        assert_eq!(coeffs.get(&PyrKey::band(2, 3)).unwrap().spatial(), (16, 16));
        assert_eq!(coeffs.get(&PyrKey::ResidualLowpass).unwrap().spatial(), (8, 8));
        assert_eq!(pyr.pyr_size().len(), 14);
        assert_eq!(pyr.pyr_size()[&PyrKey::band(1, 0)], (32, 32));
    }

    #[test]
    fn test_forward_scale_selection() {
        let mut pyr = pyramid(PyramidConfig::new((32, 32)));
        let img = random_image((1, 1, 32, 32), 3);
        let coeffs = pyr
            .forward(img.view(), &[Level::Scale(1), Level::ResidualLowpass])
            .unwrap();
        let keys: Vec<PyrKey> = coeffs.keys().copied().collect();
        assert_eq!(
            keys,
            vec![
                PyrKey::band(1, 0),
                PyrKey::band(1, 1),
                PyrKey::band(1, 2),
                PyrKey::band(1, 3),
                PyrKey::ResidualLowpass
            ]
        );
        // size table only reflects the last call
        assert_eq!(pyr.pyr_size().len(), 5);
    }

    #[test]
    fn test_forward_selected_scale_matches_full_run() {
        let mut pyr = pyramid(PyramidConfig::new((32, 32)));
        let img = random_image((1, 1, 32, 32), 4);
        let full = pyr.forward(img.view(), &[]).unwrap();
        let part = pyr.forward(img.view(), &[Level::Scale(2)]).unwrap();
        assert_eq!(part.get(&PyrKey::band(2, 1)), full.get(&PyrKey::band(2, 1)));
    }

    // ==================== Error Tests ====================

    #[test]
    fn test_forward_rejects_wrong_shape() {
        let mut pyr = pyramid(PyramidConfig::new((32, 32)));
        let img = random_image((1, 1, 32, 16), 5);
        assert!(matches!(
            pyr.forward(img.view(), &[]),
            Err(PyramidError::ShapeMismatch { .. })
        ));
    }

    #[test]
    fn test_forward_rejects_scale_out_of_range() {
        let mut pyr = pyramid(PyramidConfig::new((32, 32)));
        let img = random_image((1, 1, 32, 32), 6);
        match pyr.forward(img.view(), &[Level::Scale(3)]) {
            Err(PyramidError::ScaleOutOfRange { scale, max }) => assert_eq!((scale, max), (3, 2)),
            other => panic!("expected ScaleOutOfRange, got {:?}", other.map(|c| c.len())),
        }
    }

    #[test]
    fn test_height_too_large() {
        let config = PyramidConfig::new((32, 32)).height(Height::Levels(4));
        let result = SteerablePyramid::<f64>::new(config);
        assert!(matches!(result, Err(PyramidError::HeightTooLarge { .. })));
    }

    // ==================== Band Content Tests ====================

    #[test]
    fn test_complex_bands_real_part_matches_real_pyramid() {
        // Without tight frame, the real part of the analytic band is the real band.
        let img = random_image((1, 1, 32, 32), 7);
        let mut real = pyramid(PyramidConfig::new((32, 32)));
        let mut cplx = pyramid(PyramidConfig::new((32, 32)).is_complex(true));
        let r = real.forward(img.view(), &[]).unwrap();
        let c = cplx.forward(img.view(), &[]).unwrap();
        for key in real.full_keys() {
            let a = r.get(&key).unwrap().real_part();
            let b = c.get(&key).unwrap().real_part();
            let err = a
                .iter()
                .zip(b.iter())
                .map(|(x, y)| (x - y).abs())
                .fold(0.0, f64::max);
            assert!(err < 1e-3, "{}: {}", key, err);
        }
        assert!(c.get(&PyrKey::band(0, 0)).unwrap().is_complex());
        assert!(!c.get(&PyrKey::ResidualLowpass).unwrap().is_complex());
    }

    #[test]
    fn test_constant_image_goes_to_lowpass() {
        let mut pyr = pyramid(PyramidConfig::new((32, 32)));
        let img = Array4::from_elem((1, 1, 32, 32), 0.5f64);
        let coeffs = pyr.forward(img.view(), &[]).unwrap();
        for (key, band) in coeffs.iter() {
            if *key != PyrKey::ResidualLowpass {
                assert!(band.energy() < 1e-20, "{} has energy {}", key, band.energy());
            }
        }
        assert!(coeffs.get(&PyrKey::ResidualLowpass).unwrap().energy() > 0.0);
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let img = random_image((2, 2, 32, 32), 8);
        let mut seq = pyramid(PyramidConfig::new((32, 32)));
        let mut par = seq.with_execution(Execution::Parallel).unwrap();
        assert_eq!(
            seq.forward(img.view(), &[]).unwrap(),
            par.forward(img.view(), &[]).unwrap()
        );
    }

    #[test]
    fn test_rebuild_f32() {
        let pyr = pyramid(PyramidConfig::new((32, 32)));
        let mut single: SteerablePyramid<f32> = pyr.rebuild().unwrap();
        let img = Array4::<f32>::from_elem((1, 1, 32, 32), 1.0);
        let coeffs = single.forward(img.view(), &[]).unwrap();
        assert_eq!(coeffs.len(), pyr.full_keys().len());
    }

    #[test]
    fn test_phase_factors() {
        assert_eq!(forward_phase::<f64>(1), Complex::new(0.0, -1.0));
        assert_eq!(recon_phase::<f64>(1), Complex::new(0.0, 1.0));
        assert_eq!(forward_phase::<f64>(3) * recon_phase::<f64>(3), Complex::new(1.0, 0.0));
        assert_eq!(forward_phase::<f64>(6), Complex::new(-1.0, 0.0));
    }
}
