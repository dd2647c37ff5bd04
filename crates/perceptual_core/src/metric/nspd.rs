//! Normalized steerable pyramid distance.
//!
//! Oriented bands of a 5-scale, 4-orientation real pyramid are divided by
//! their local energy (see [`local_gain_control`]); the lowpass residual is
//! compared with an SSIM-like relative error and the highpass residual is
//! dropped.

use ndarray::{Array2, Array4, ArrayView4, Zip};

use crate::error::{PyramidError, Result};
use crate::float_trait::PyrFloat;
use crate::gain_control::local_gain_control;
use crate::pyramid::{Height, PyrBand, PyrKey, PyramidCoeffs, PyramidConfig, SteerablePyramid};
use crate::tables::NspdSigmas;

use super::common::{
    broadcast_pair, check_pair, mean_of, rms_distance, spatial_mean, DISTANCE_EPSILON,
};

pub const NSPD_HEIGHT: usize = 5;
pub const NSPD_ORDER: usize = 3;

/// Smallest image side that supports [`NSPD_HEIGHT`] scales.
pub const NSPD_MIN_SIZE: usize = 128;

pub fn normalized_steerable_pyramid<F: PyrFloat>(
    img: ArrayView4<F>,
    sigmas: &NspdSigmas,
) -> Result<PyramidCoeffs<F>> {
    let (_, _, h, w) = img.dim();
    if h.min(w) < NSPD_MIN_SIZE {
        return Err(PyramidError::ImageTooSmall(
            (h, w),
            format!(
                "NSPD builds a {}-scale pyramid and needs both sides to be at least {}",
                NSPD_HEIGHT, NSPD_MIN_SIZE
            ),
        ));
    }

    let config = PyramidConfig::new((h, w))
        .height(Height::Levels(NSPD_HEIGHT))
        .order(NSPD_ORDER)
        .is_complex(false)
        .downsample(true);
    let mut pyramid = SteerablePyramid::<F>::new(config)?;
    let coeffs = pyramid.forward(img, &[])?;

    let mut normalized = PyramidCoeffs::new();
    for (key, band) in coeffs {
        match key {
            PyrKey::ResidualHighpass => {}
            PyrKey::ResidualLowpass => {
                normalized.insert(key, band);
            }
            PyrKey::Band { .. } => {
                let epsilon = F::from_f64_c(sigmas.get(&key)?);
                let (_, direction) = local_gain_control(band.real_part().view(), epsilon);
                normalized.insert(key, PyrBand::Real(direction));
            }
        }
    }
    Ok(normalized)
}

/// `sqrt(mean((a - b)^2 / (a^2 + b^2)) + 1e-10)`; points where both are zero add nothing.
fn relative_distance<F: PyrFloat>(a: ArrayView4<F>, b: ArrayView4<F>) -> Array2<F> {
    let mut ratio = Array4::zeros(a.raw_dim());
    Zip::from(&mut ratio).and(&a).and(&b).for_each(|r, &x, &y| {
        let denom = x * x + y * y;
        if denom > F::zero() {
            *r = (x - y) * (x - y) / denom;
        }
    });
    let eps = F::from_f64_c(DISTANCE_EPSILON);
    spatial_mean(&ratio).mapv(|m| (m + eps).sqrt())
}

/// NSPD between two image batches, one value per (batch, channel).
///
/// Both images need height and width of at least [`NSPD_MIN_SIZE`].
pub fn nspd<F: PyrFloat>(
    img1: ArrayView4<F>,
    img2: ArrayView4<F>,
    sigmas: &NspdSigmas,
) -> Result<Array2<F>> {
    let shape = check_pair(&img1, &img2, "NSPD")?;

    let y1 = normalized_steerable_pyramid(img1, sigmas)?;
    let y2 = normalized_steerable_pyramid(img2, sigmas)?;

    let mut terms = Vec::with_capacity(y1.len());
    for (key, band1) in y1.iter() {
        let band2 = y2.get(key).ok_or(PyramidError::MissingKey(*key))?;
        let (a, b) = (band1.real_part(), band2.real_part());
        let (_, _, h, w) = a.dim();
        let (va, vb) = (a.view(), b.view());
        let (x, y) = broadcast_pair(&va, &vb, [shape[0], shape[1], h, w])?;
        let term = match key {
            PyrKey::ResidualLowpass => relative_distance(x, y),
            _ => rms_distance(x, y),
        };
        terms.push(term);
    }
    log::debug!("NSPD averaged {} band distances", terms.len());
    Ok(mean_of(&terms, (shape[0], shape[1])))
}
