//! Reconstruction from pyramid coefficients.
//!
//! The lowpass spectrum is accumulated from the coarsest scale up: at each
//! scale the accumulator is masked, padded back into the scale's grid at the
//! recorded crop position, and the selected oriented bands are added.

use ndarray::{s, Array2, Array4};
use rustfft::num_complex::Complex;

use crate::error::{PyramidError, Result};
use crate::float_trait::PyrFloat;
use crate::transforms::{
    centered_spectrum, centered_spectrum_complex, invert_centered, Fft2dPlans,
};

use super::forward::{mask_spectrum, recon_phase, SteerablePyramid};
use super::{band_kind, Level, PyrBand, PyrKey, PyramidCoeffs, Selection};

/// Resolved selection of what to reconstruct.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ReconSelection {
    highpass: bool,
    lowpass: bool,
    /// `scales[s][b]` is true when band `b` of scale `s` contributes.
    scales: Vec<Vec<bool>>,
}

impl<F: PyrFloat> SteerablePyramid<F> {
    /// Validate a level selection: integer scales sorted, residuals at the ends.
    pub fn recon_levels(&self, levels: &Selection<Level>) -> Result<Vec<Level>> {
        let mut out = match levels {
            Selection::All => {
                let mut all = vec![Level::ResidualHighpass];
                all.extend((0..self.num_scales).map(Level::Scale));
                all.push(Level::ResidualLowpass);
                all
            }
            Selection::Only(list) => {
                for level in list {
                    if let Level::Scale(s) = level {
                        self.check_scale(*s)?;
                    }
                }
                list.clone()
            }
        };
        // Level's derived order puts the highpass first and the lowpass last
        out.sort();
        out.dedup();
        Ok(out)
    }

    /// Validate a band selection against the number of orientations.
    pub fn recon_bands(&self, bands: &Selection<usize>) -> Result<Vec<usize>> {
        let n = self.num_orientations();
        let mut out = match bands {
            Selection::All => (0..n).collect(),
            Selection::Only(list) => {
                if let Some(&band) = list.iter().find(|&&b| b >= n) {
                    return Err(PyramidError::BandOutOfRange { band, max: n - 1 });
                }
                list.clone()
            }
        };
        out.sort_unstable();
        out.dedup();
        Ok(out)
    }

    /// Keys that contribute to a reconstruction with the given selections.
    pub fn recon_keys(
        &self,
        levels: &Selection<Level>,
        bands: &Selection<usize>,
    ) -> Result<Vec<PyrKey>> {
        let levels = self.recon_levels(levels)?;
        let bands = self.recon_bands(bands)?;
        let mut keys = Vec::new();
        for level in levels {
            match level {
                Level::ResidualHighpass => keys.push(PyrKey::ResidualHighpass),
                Level::ResidualLowpass => keys.push(PyrKey::ResidualLowpass),
                Level::Scale(s) => keys.extend(bands.iter().map(|&b| PyrKey::band(s, b))),
            }
        }
        Ok(keys)
    }

    /// Reconstruct an image from coefficients of a full forward call.
    ///
    /// `levels` and `bands` restrict which coefficients contribute; anything
    /// short of everything gives a partial (lossy) reconstruction. `twidth`
    /// is accepted for interface compatibility: the masks built at
    /// construction are always the ones used.
    pub fn recon_pyr(
        &self,
        coeffs: &PyramidCoeffs<F>,
        levels: impl Into<Selection<Level>>,
        bands: impl Into<Selection<usize>>,
        twidth: f64,
    ) -> Result<Array4<F>> {
        let mut twidth = twidth;
        if twidth <= 0.0 || twidth.is_nan() {
            log::warn!("twidth must be positive, setting to 1 (was {})", twidth);
            twidth = 1.0;
        }
        if twidth != self.config.twidth {
            log::debug!(
                "recon_pyr twidth {} ignored, masks were built with twidth {}",
                twidth,
                self.config.twidth
            );
        }

        let (batch, channels) = self.check_coeffs(coeffs)?;
        let selection = self.resolve_selection(&levels.into(), &bands.into())?;

        let planes = self.config.execution.map(batch * channels, |p| {
            self.recon_plane(coeffs, p / channels, p % channels, &selection)
        });

        let (rows, cols) = self.config.image_shape;
        let mut out = Array4::zeros((batch, channels, rows, cols));
        for (p, plane) in planes.into_iter().enumerate() {
            out.slice_mut(s![p / channels, p % channels, .., ..]).assign(&plane);
        }
        Ok(out)
    }

    fn resolve_selection(
        &self,
        levels: &Selection<Level>,
        bands: &Selection<usize>,
    ) -> Result<ReconSelection> {
        let keys = self.recon_keys(levels, bands)?;
        let mut sel = ReconSelection {
            highpass: false,
            lowpass: false,
            scales: vec![vec![false; self.num_orientations()]; self.num_scales],
        };
        for key in keys {
            match key {
                PyrKey::ResidualHighpass => sel.highpass = true,
                PyrKey::ResidualLowpass => sel.lowpass = true,
                PyrKey::Band { scale, orientation } => sel.scales[scale][orientation] = true,
            }
        }
        Ok(sel)
    }

    /// Every key of a full forward call must be present with the right size
    /// and kind. Residuals are real; oriented bands are complex exactly when
    /// the pyramid is. Returns the shared (batch, channels).
    fn check_coeffs(&self, coeffs: &PyramidCoeffs<F>) -> Result<(usize, usize)> {
        let mut batch_channels = None;
        for key in self.full_keys() {
            let band = coeffs.get(&key).ok_or(PyramidError::MissingKey(key))?;
            let [b, c, h, w] = band.shape();
            let expected = self.expected_dim(&key);
            if (h, w) != expected {
                return Err(PyramidError::ShapeMismatch {
                    expected,
                    got: (h, w),
                });
            }
            let complex = self.config.is_complex && !key.is_residual();
            if band.is_complex() != complex {
                return Err(PyramidError::BandKind {
                    key,
                    expected: band_kind(complex),
                    got: band.kind(),
                });
            }
            match batch_channels {
                None => batch_channels = Some((b, c)),
                Some(bc) if bc != (b, c) => {
                    return Err(PyramidError::ShapeMismatch {
                        expected: bc,
                        got: (b, c),
                    })
                }
                Some(_) => {}
            }
        }
        Ok(batch_channels.unwrap_or((0, 0)))
    }

    pub(super) fn expected_dim(&self, key: &PyrKey) -> (usize, usize) {
        match key {
            PyrKey::ResidualHighpass => self.config.image_shape,
            PyrKey::ResidualLowpass => self.masks.lowpass_dim(),
            PyrKey::Band { scale, .. } => self.masks.scales[*scale].band_dim(),
        }
    }

    fn band_spectrum(
        &self,
        band: &PyrBand<F>,
        b: usize,
        c: usize,
        plans: &Fft2dPlans<F>,
    ) -> Array2<Complex<F>> {
        let norm = self.norm();
        match band {
            PyrBand::Real(a) => centered_spectrum(a.slice(s![b, c, .., ..]), plans, norm),
            PyrBand::Complex(a) => {
                let plane = a.slice(s![b, c, .., ..]);
                if self.config.is_complex && self.config.tight_frame {
                    let sqrt2 = F::from_f64_c(std::f64::consts::SQRT_2);
                    let scaled = plane.mapv(|v| v * sqrt2);
                    centered_spectrum_complex(scaled.view(), plans, norm)
                } else {
                    centered_spectrum_complex(plane, plans, norm)
                }
            }
        }
    }

    fn recon_plane(
        &self,
        coeffs: &PyramidCoeffs<F>,
        b: usize,
        c: usize,
        sel: &ReconSelection,
    ) -> Array2<F> {
        let masks = &self.masks;
        let one = Complex::new(F::one(), F::zero());
        let zero = Complex::new(F::zero(), F::zero());
        let phase = recon_phase::<F>(self.config.order);

        let mut acc = match coeffs.get(&PyrKey::ResidualLowpass) {
            Some(band) if sel.lowpass => self.band_spectrum(band, b, c, &masks.lowpass_plans),
            _ => Array2::from_elem(masks.lowpass_dim(), zero),
        };

        for (scale, sm) in masks.scales.iter().enumerate().rev() {
            let mut resdft = Array2::from_elem(sm.band_dim(), zero);
            let lowered = mask_spectrum(acc.view(), sm.lomask.view(), one);
            resdft
                .slice_mut(s![
                    sm.crop.row_start..sm.crop.row_end,
                    sm.crop.col_start..sm.crop.col_end
                ])
                .assign(&lowered);

            for (orientation, angle_mask) in sm.angle_masks_recon.iter().enumerate() {
                if !sel.scales[scale][orientation] {
                    continue;
                }
                let Some(band) = coeffs.get(&PyrKey::band(scale, orientation)) else {
                    continue;
                };
                let banddft = self.band_spectrum(band, b, c, &sm.plans);
                ndarray::Zip::from(&mut resdft)
                    .and(&banddft)
                    .and(angle_mask)
                    .and(&sm.himask)
                    .for_each(|r, &d, &a, &h| *r += d * phase * (a * h));
            }
            acc = resdft;
        }

        let mut outdft = mask_spectrum(acc.view(), masks.lo0mask.view(), one);
        if sel.highpass {
            if let Some(band) = coeffs.get(&PyrKey::ResidualHighpass) {
                let hidft = self.band_spectrum(band, b, c, &masks.image_plans);
                ndarray::Zip::from(&mut outdft)
                    .and(&hidft)
                    .and(&masks.hi0mask)
                    .for_each(|o, &d, &m| *o += d * m);
            }
        }

        invert_centered(outdft.view(), &masks.image_plans, self.norm()).mapv(|v| v.re)
    }
}
