//! Normalized Laplacian pyramid distance.

use ndarray::{s, Array2, Array4, ArrayView4};

use crate::conv::correlate_zero_padded;
use crate::error::Result;
use crate::float_trait::PyrFloat;
use crate::laplacian::LaplacianPyramid;
use crate::tables::{NlpdParams, NLPD_FILTER_SIZE, NLPD_SCALES};

use super::common::{broadcast_pair, check_pair, mean_of, rms_distance};

/// Laplacian pyramid whose bands are divided by a local weighted sum of
/// absolute values plus a per-scale constant.
pub fn normalized_laplacian_pyramid<F: PyrFloat>(
    img: ArrayView4<F>,
    params: &NlpdParams,
) -> Vec<Array4<F>> {
    let pyramid = LaplacianPyramid::new(NLPD_SCALES, true);
    let pad = NLPD_FILTER_SIZE / 2;

    pyramid
        .forward(img)
        .into_iter()
        .zip(params.filters().iter().zip(params.sigmas()))
        .map(|(level, (filter, &sigma))| {
            let filter = filter.mapv(F::from_f64_c);
            let sigma = F::from_f64_c(sigma);
            let (b, c, h, w) = level.dim();
            let mut out = Array4::zeros((b, c, h, w));
            for i in 0..b {
                for j in 0..c {
                    let band = level.slice(s![i, j, .., ..]);
                    let magnitude = band.mapv(|v| v.abs());
                    let pooled = correlate_zero_padded(magnitude.view(), filter.view(), pad);
                    let mut plane = out.slice_mut(s![i, j, .., ..]);
                    for ((r, k), v) in plane.indexed_iter_mut() {
                        *v = band[[r, k]] / (sigma + pooled[[r, k]]);
                    }
                }
            }
            out
        })
        .collect()
}

/// NLPD between two image batches, one value per (batch, channel).
///
/// The RMS difference of every normalized scale is averaged over scales, so
/// coarse scales (fewer coefficients) weigh as much as fine ones.
pub fn nlpd<F: PyrFloat>(
    img1: ArrayView4<F>,
    img2: ArrayView4<F>,
    params: &NlpdParams,
) -> Result<Array2<F>> {
    let shape = check_pair(&img1, &img2, "NLPD")?;

    let y1 = normalized_laplacian_pyramid(img1, params);
    let y2 = normalized_laplacian_pyramid(img2, params);

    let mut terms = Vec::with_capacity(y1.len());
    for (a, b) in y1.iter().zip(&y2) {
        let (_, _, h, w) = a.dim();
        let (va, vb) = (a.view(), b.view());
        let (x, y) = broadcast_pair(&va, &vb, [shape[0], shape[1], h, w])?;
        terms.push(rms_distance(x, y));
    }
    Ok(mean_of(&terms, (shape[0], shape[1])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metric::common::DISTANCE_EPSILON;

    fn box_params(sigma: f64) -> NlpdParams {
        let filter = Array2::from_elem((NLPD_FILTER_SIZE, NLPD_FILTER_SIZE), 1.0 / 25.0);
        NlpdParams::new(vec![filter; NLPD_SCALES], vec![sigma; NLPD_SCALES]).unwrap()
    }

    fn test_image(h: usize, w: usize, phase: f64) -> Array4<f64> {
        Array4::from_shape_fn((1, 1, h, w), |(_, _, r, c)| {
            0.5 + 0.4 * ((r as f64 * 0.37 + phase).sin() * (c as f64 * 0.23).cos())
        })
    }

    #[test]
    fn test_pyramid_has_six_scales() {
        let img = test_image(64, 48, 0.0);
        let levels = normalized_laplacian_pyramid(img.view(), &box_params(0.2));
        assert_eq!(levels.len(), 6);
        assert_eq!(levels[0].dim(), (1, 1, 64, 48));
        assert_eq!(levels[5].dim(), (1, 1, 2, 2));
    }

    #[test]
    fn test_nlpd_identity_is_epsilon() {
        let img = test_image(64, 64, 0.0);
        let d = nlpd(img.view(), img.view(), &box_params(0.2)).unwrap();
        assert_eq!(d.dim(), (1, 1));
        assert!((d[[0, 0]] - DISTANCE_EPSILON.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_nlpd_grows_with_distortion() {
        let params = box_params(0.2);
        let img = test_image(64, 64, 0.0);
        let slight = img.mapv(|v| v + 0.01 * (v * 40.0).sin());
        let strong = img.mapv(|v| v + 0.2 * (v * 40.0).sin());
        let d_slight = nlpd(img.view(), slight.view(), &params).unwrap()[[0, 0]];
        let d_strong = nlpd(img.view(), strong.view(), &params).unwrap()[[0, 0]];
        assert!(d_slight > DISTANCE_EPSILON.sqrt());
        assert!(d_strong > d_slight);
    }

    #[test]
    fn test_nlpd_symmetric_and_broadcast() {
        let params = box_params(0.1);
        let a = test_image(32, 32, 0.0);
        let mut b = Array4::zeros((2, 1, 32, 32));
        b.slice_mut(s![0, .., .., ..]).assign(&test_image(32, 32, 0.5).slice(s![0, .., .., ..]));
        b.slice_mut(s![1, .., .., ..]).assign(&a.slice(s![0, .., .., ..]));

        let d = nlpd(a.view(), b.view(), &params).unwrap();
        assert_eq!(d.dim(), (2, 1));
        assert!((d[[1, 0]] - DISTANCE_EPSILON.sqrt()).abs() < 1e-12);

        let swapped = nlpd(b.view(), a.view(), &params).unwrap();
        assert!((d[[0, 0]] - swapped[[0, 0]]).abs() < 1e-12);
    }
}
