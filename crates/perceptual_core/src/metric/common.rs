//! Input checks and per-plane reductions shared by the metrics.

use ndarray::{Array2, Array4, ArrayView4, ArrayViewD, Ix4};

use crate::error::{PyramidError, Result};
use crate::float_trait::PyrFloat;

/// Added under the square root of every distance term.
pub const DISTANCE_EPSILON: f64 = 1e-10;

/// View a dynamically shaped array as a (batch, channel, height, width) image.
pub fn as_image<F>(x: ArrayViewD<'_, F>) -> Result<ArrayView4<'_, F>> {
    let ndim = x.ndim();
    x.into_dimensionality::<Ix4>()
        .map_err(|_| PyramidError::InvalidRank(ndim))
}

/// Check that two images can be compared and return the broadcast shape.
///
/// Heights and widths must match; batch and channel sizes must match or be 1.
/// Multi-channel input is accepted with a warning naming `metric`.
pub fn check_pair<F>(
    img1: &ArrayView4<F>,
    img2: &ArrayView4<F>,
    metric: &str,
) -> Result<[usize; 4]> {
    let s1 = img1.dim();
    let s2 = img2.dim();
    if (s1.2, s1.3) != (s2.2, s2.3) {
        return Err(PyramidError::SpatialMismatch((s1.2, s1.3), (s2.2, s2.3)));
    }
    let a = [s1.0, s1.1, s1.2, s1.3];
    let b = [s2.0, s2.1, s2.2, s2.3];
    for i in 0..2 {
        if a[i] != b[i] && a[i] != 1 && b[i] != 1 {
            return Err(PyramidError::NotBroadcastable(a, b));
        }
    }
    if a[1] > 1 || b[1] > 1 {
        log::warn!(
            "{} was designed for grayscale images and here it will be computed separately \
             for each channel (so channels are treated in the same way as batches)",
            metric
        );
    }
    Ok([a[0].max(b[0]), a[1].max(b[1]), a[2], a[3]])
}

/// Broadcast both images to `shape`.
pub fn broadcast_pair<'a, F>(
    img1: &'a ArrayView4<'_, F>,
    img2: &'a ArrayView4<'_, F>,
    shape: [usize; 4],
) -> Result<(ArrayView4<'a, F>, ArrayView4<'a, F>)> {
    let dims = (shape[0], shape[1], shape[2], shape[3]);
    let not_broadcastable = || {
        let (a, b) = (img1.dim(), img2.dim());
        PyramidError::NotBroadcastable([a.0, a.1, a.2, a.3], [b.0, b.1, b.2, b.3])
    };
    let x = img1.broadcast(dims).ok_or_else(not_broadcastable)?;
    let y = img2.broadcast(dims).ok_or_else(not_broadcastable)?;
    Ok((x, y))
}

/// Warn when the image values fall outside the range implied by `dynamic_range`.
pub fn check_dynamic_range<F: PyrFloat>(
    img1: &ArrayView4<F>,
    img2: &ArrayView4<F>,
    dynamic_range: f64,
) {
    let bounds = match dynamic_range {
        d if d == 1.0 => (0.0, 1.0, "[0, 1]"),
        d if d == 2.0 => (-1.0, 1.0, "[-1, 1]"),
        d if d == 255.0 => (0.0, 255.0, "[0, 255]"),
        _ => return,
    };
    let range = |img: &ArrayView4<F>| {
        img.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v.as_f64()), hi.max(v.as_f64()))
        })
    };
    let (r1, r2) = (range(img1), range(img2));
    if r1.0 < bounds.0 || r2.0 < bounds.0 || r1.1 > bounds.1 || r2.1 > bounds.1 {
        log::warn!(
            "dynamic_range is {} but image range falls outside {} img1: {:?}, img2: {:?}. \
             Continuing anyway...",
            dynamic_range,
            bounds.2,
            r1,
            r2
        );
    }
}

/// Mean over the spatial axes of every (batch, channel) plane.
pub fn spatial_mean<F: PyrFloat>(x: &Array4<F>) -> Array2<F> {
    let (b, c, h, w) = x.dim();
    let n = F::usize_as(h * w);
    Array2::from_shape_fn((b, c), |(i, j)| {
        x.slice(ndarray::s![i, j, .., ..]).iter().copied().sum::<F>() / n
    })
}

/// `sqrt(mean((a - b)^2) + 1e-10)` per (batch, channel) plane.
pub fn rms_distance<F: PyrFloat>(a: ArrayView4<F>, b: ArrayView4<F>) -> Array2<F> {
    let diff = &a - &b;
    let eps = F::from_f64_c(DISTANCE_EPSILON);
    spatial_mean(&diff.mapv(|v| v * v)).mapv(|m| (m + eps).sqrt())
}

/// Average a list of equally shaped per-plane terms.
pub fn mean_of<F: PyrFloat>(terms: &[Array2<F>], shape: (usize, usize)) -> Array2<F> {
    let mut acc = Array2::zeros(shape);
    for t in terms {
        acc += t;
    }
    if !terms.is_empty() {
        let n = F::usize_as(terms.len());
        acc.mapv_inplace(|v| v / n);
    }
    acc
}
