//! Structural similarity (SSIM) and its multi-scale variant.
//!
//! Local statistics are Gaussian-weighted averages over an 11x11 window
//! (smaller if the image is smaller), computed with a valid correlation.

use ndarray::{s, Array2, Array4, ArrayView2, ArrayView4};

use crate::conv::{circular_gaussian2d, correlate_valid, downsample_average, same_padding, Padding};
use crate::error::Result;
use crate::float_trait::PyrFloat;

use super::common::{broadcast_pair, check_dynamic_range, check_pair};

/// Side of the SSIM window for images of at least this size.
pub const SSIM_WINDOW_SIZE: usize = 11;

/// Standard deviation of the Gaussian window.
pub const SSIM_WINDOW_STD: f64 = 1.5;

/// Exponents of MS-SSIM, finest scale first.
pub const DEFAULT_POWER_FACTORS: [f64; 5] = [0.0448, 0.2856, 0.3001, 0.2363, 0.1333];

const K1: f64 = 0.01;
const K2: f64 = 0.03;

/// Maps produced by one SSIM evaluation of a single plane.
#[derive(Debug, Clone)]
pub struct SsimParts<F: PyrFloat> {
    pub ssim_map: Array2<F>,
    pub contrast_structure_map: Array2<F>,
    /// `log((1 + sigma1^2 / C2) (1 + sigma2^2 / C2))`, used by weighted SSIM.
    pub weight: Array2<F>,
}

/// Gaussian window for an `rows x cols` image, normalized to sum to one.
pub fn ssim_window<F: PyrFloat>(rows: usize, cols: usize) -> Array2<F> {
    let size = SSIM_WINDOW_SIZE.min(rows).min(cols);
    let window = circular_gaussian2d::<F>(size, SSIM_WINDOW_STD);
    let total: F = window.sum();
    if (total - F::one()).abs() > F::SUM_TOLERANCE {
        log::warn!("window should have sum of 1! normalizing...");
        return window.mapv(|v| v / total);
    }
    window
}

/// SSIM maps of one pair of planes.
pub fn ssim_parts<F: PyrFloat>(
    img1: ArrayView2<F>,
    img2: ArrayView2<F>,
    window: ArrayView2<F>,
    dynamic_range: f64,
    pad: Option<Padding>,
) -> SsimParts<F> {
    let (padded1, padded2);
    let (x, y) = match pad {
        Some(mode) => {
            padded1 = same_padding(img1, window.dim(), mode);
            padded2 = same_padding(img2, window.dim(), mode);
            (padded1.view(), padded2.view())
        }
        None => (img1.view(), img2.view()),
    };

    let average = |p: ArrayView2<F>| correlate_valid(p, window, 1);
    let mu1 = average(x);
    let mu2 = average(y);
    let e11 = average((&x * &x).view());
    let e22 = average((&y * &y).view());
    let e12 = average((&x * &y).view());

    let c1 = F::from_f64_c((K1 * dynamic_range).powi(2));
    let c2 = F::from_f64_c((K2 * dynamic_range).powi(2));
    let two = F::from_f64_c(2.0);

    let dim = mu1.dim();
    let mut ssim_map = Array2::zeros(dim);
    let mut contrast_structure_map = Array2::zeros(dim);
    let mut weight = Array2::zeros(dim);
    for ((r, c), out) in ssim_map.indexed_iter_mut() {
        let (m1, m2) = (mu1[[r, c]], mu2[[r, c]]);
        let s11 = e11[[r, c]] - m1 * m1;
        let s22 = e22[[r, c]] - m2 * m2;
        let s12 = e12[[r, c]] - m1 * m2;

        let luminance = (two * m1 * m2 + c1) / (m1 * m1 + m2 * m2 + c1);
        let cs = (two * s12 + c2) / (s11 + s22 + c2);
        *out = luminance * cs;
        contrast_structure_map[[r, c]] = cs;
        weight[[r, c]] = ((F::one() + s11 / c2) * (F::one() + s22 / c2)).ln();
    }

    SsimParts {
        ssim_map,
        contrast_structure_map,
        weight,
    }
}

fn warn_small(rows: usize, cols: usize) {
    if rows.min(cols) < SSIM_WINDOW_SIZE {
        log::warn!(
            "SSIM uses {0}x{0} convolutional kernel, but the height and/or the width of the \
             input image is smaller than {0}, so the kernel size is set to be the minimum of \
             these two numbers",
            SSIM_WINDOW_SIZE
        );
    }
}

/// Mean SSIM of every (batch, channel) plane; 1 means identical.
///
/// With `weighted`, the map is averaged with the stability weight instead of
/// uniformly. `pad` same-pads the images before filtering so the map keeps
/// the image size.
pub fn ssim<F: PyrFloat>(
    img1: ArrayView4<F>,
    img2: ArrayView4<F>,
    weighted: bool,
    dynamic_range: f64,
    pad: Option<Padding>,
) -> Result<Array2<F>> {
    let shape = check_pair(&img1, &img2, "SSIM")?;
    check_dynamic_range(&img1, &img2, dynamic_range);
    let (x, y) = broadcast_pair(&img1, &img2, shape)?;
    let window = ssim_window::<F>(shape[2], shape[3]);

    let out = Array2::from_shape_fn((shape[0], shape[1]), |(b, c)| {
        let parts = ssim_parts(
            x.slice(s![b, c, .., ..]),
            y.slice(s![b, c, .., ..]),
            window.view(),
            dynamic_range,
            pad,
        );
        if weighted {
            let num: F = parts
                .ssim_map
                .iter()
                .zip(parts.weight.iter())
                .map(|(&m, &w)| m * w)
                .sum();
            num / parts.weight.sum()
        } else {
            mean(&parts.ssim_map)
        }
    });

    warn_small(shape[2], shape[3]);
    Ok(out)
}

/// Full SSIM map of every plane (valid region, no padding).
pub fn ssim_map<F: PyrFloat>(
    img1: ArrayView4<F>,
    img2: ArrayView4<F>,
    dynamic_range: f64,
) -> Result<Array4<F>> {
    let shape = check_pair(&img1, &img2, "SSIM")?;
    check_dynamic_range(&img1, &img2, dynamic_range);
    let (x, y) = broadcast_pair(&img1, &img2, shape)?;
    let window = ssim_window::<F>(shape[2], shape[3]);
    let (wr, wc) = window.dim();

    let mut out = Array4::zeros((shape[0], shape[1], shape[2] - wr + 1, shape[3] - wc + 1));
    for b in 0..shape[0] {
        for c in 0..shape[1] {
            let parts = ssim_parts(
                x.slice(s![b, c, .., ..]),
                y.slice(s![b, c, .., ..]),
                window.view(),
                dynamic_range,
                None,
            );
            out.slice_mut(s![b, c, .., ..]).assign(&parts.ssim_map);
        }
    }

    warn_small(shape[2], shape[3]);
    Ok(out)
}

/// Multi-scale SSIM.
///
/// The contrast-structure mean of every scale but the last, and the SSIM mean
/// of the last, are clamped at zero and raised to the matching power factor.
/// Images are halved (2x2 average, replicate-padded to even size) between
/// scales. `None` uses [`DEFAULT_POWER_FACTORS`].
pub fn ms_ssim<F: PyrFloat>(
    img1: ArrayView4<F>,
    img2: ArrayView4<F>,
    dynamic_range: f64,
    power_factors: Option<&[f64]>,
) -> Result<Array2<F>> {
    let shape = check_pair(&img1, &img2, "MS-SSIM")?;
    check_dynamic_range(&img1, &img2, dynamic_range);
    let (x, y) = broadcast_pair(&img1, &img2, shape)?;

    let factors = match power_factors {
        Some(f) if !f.is_empty() => f,
        Some(_) => {
            log::warn!("power_factors is empty, using the default MS-SSIM factors");
            &DEFAULT_POWER_FACTORS[..]
        }
        None => &DEFAULT_POWER_FACTORS[..],
    };
    let (last, coarse) = factors.split_last().map_or((1.0, &[][..]), |(l, c)| (*l, c));

    let mut smallest = (shape[2], shape[3]);
    let out = Array2::from_shape_fn((shape[0], shape[1]), |(b, c)| {
        let mut p1 = x.slice(s![b, c, .., ..]).to_owned();
        let mut p2 = y.slice(s![b, c, .., ..]).to_owned();
        let mut value = F::one();

        for &p in coarse {
            let window = ssim_window::<F>(p1.nrows(), p1.ncols());
            let parts = ssim_parts(p1.view(), p2.view(), window.view(), dynamic_range, None);
            value = value * relu_pow(mean(&parts.contrast_structure_map), p);
            p1 = downsample_average(p1.view());
            p2 = downsample_average(p2.view());
        }

        let window = ssim_window::<F>(p1.nrows(), p1.ncols());
        let parts = ssim_parts(p1.view(), p2.view(), window.view(), dynamic_range, None);
        value = value * relu_pow(mean(&parts.ssim_map), last);
        smallest = p1.dim();
        value
    });

    if smallest.0.min(smallest.1) < SSIM_WINDOW_SIZE {
        log::warn!(
            "SSIM uses {0}x{0} convolutional kernel, but for some scales of the input image, \
             the height and/or the width is smaller than {0}, so the kernel size in SSIM is set \
             to be the minimum of these two numbers for these scales",
            SSIM_WINDOW_SIZE
        );
    }
    Ok(out)
}

fn mean<F: PyrFloat>(x: &Array2<F>) -> F {
    x.sum() / F::usize_as(x.len())
}

fn relu_pow<F: PyrFloat>(v: F, p: f64) -> F {
    v.max(F::zero()).powf(F::from_f64_c(p))
}
