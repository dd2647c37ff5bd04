//! Spatial-domain convolution helpers shared by the metrics.
//!
//! Images are (batch, channel, height, width) arrays; every plane is filtered
//! independently with the same 2D kernel (grouped convolution). All kernels
//! are applied as correlations, which is what the binomial and Gaussian
//! filters need since they are symmetric.

use ndarray::{s, Array2, Array4, ArrayView2, ArrayView4};

use crate::float_trait::PyrFloat;

// =============================================================================
// Padding
// =============================================================================

/// Border handling for [`pad2d`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// Zeros outside the image.
    Constant,
    /// Mirror without repeating the edge sample (`-1 -> 1`).
    Reflect,
    /// Repeat the edge sample.
    Replicate,
    /// Wrap around.
    Circular,
}

impl Padding {
    /// Parse a mode name; `"zero"` is an alias of `"constant"`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "constant" | "zero" => Some(Padding::Constant),
            "reflect" => Some(Padding::Reflect),
            "replicate" => Some(Padding::Replicate),
            "circular" => Some(Padding::Circular),
            _ => None,
        }
    }

    /// Source index for position `i` (may be outside `0..n`), `None` for zero.
    #[inline]
    fn source(self, i: isize, n: usize) -> Option<usize> {
        let n_i = n as isize;
        if (0..n_i).contains(&i) {
            return Some(i as usize);
        }
        match self {
            Padding::Constant => None,
            Padding::Replicate => Some(i.clamp(0, n_i - 1) as usize),
            Padding::Circular => Some(i.rem_euclid(n_i) as usize),
            Padding::Reflect => {
                if n == 1 {
                    return Some(0);
                }
                let period = 2 * (n_i - 1);
                let m = i.rem_euclid(period);
                Some(if m < n_i { m } else { period - m } as usize)
            }
        }
    }
}

/// Pad a plane by `(top, bottom, left, right)` samples.
pub fn pad2d<F: PyrFloat>(x: ArrayView2<F>, pads: [usize; 4], mode: Padding) -> Array2<F> {
    let (rows, cols) = x.dim();
    let [top, bottom, left, right] = pads;
    Array2::from_shape_fn((rows + top + bottom, cols + left + right), |(r, c)| {
        let sr = mode.source(r as isize - top as isize, rows);
        let sc = mode.source(c as isize - left as isize, cols);
        match (sr, sc) {
            (Some(r), Some(c)) => x[[r, c]],
            _ => F::zero(),
        }
    })
}

/// `(before, after)` padding that keeps a stride-1 correlation the same size.
pub fn same_padding_amounts(kernel_size: usize) -> (usize, usize) {
    let total = kernel_size.saturating_sub(1);
    (total / 2, total - total / 2)
}

/// Pad a plane so a `kernel` correlation preserves its size.
pub fn same_padding<F: PyrFloat>(
    x: ArrayView2<F>,
    kernel: (usize, usize),
    mode: Padding,
) -> Array2<F> {
    let (top, bottom) = same_padding_amounts(kernel.0);
    let (left, right) = same_padding_amounts(kernel.1);
    pad2d(x, [top, bottom, left, right], mode)
}

// =============================================================================
// Correlation
// =============================================================================

/// Valid 2D correlation with the given stride.
///
/// Output size is `(n - k) / stride + 1` per axis; empty if the kernel does
/// not fit.
pub fn correlate_valid<F: PyrFloat>(
    x: ArrayView2<F>,
    kernel: ArrayView2<F>,
    stride: usize,
) -> Array2<F> {
    let (rows, cols) = x.dim();
    let (kr, kc) = kernel.dim();
    if kr > rows || kc > cols {
        return Array2::zeros((0, 0));
    }
    let out_rows = (rows - kr) / stride + 1;
    let out_cols = (cols - kc) / stride + 1;
    Array2::from_shape_fn((out_rows, out_cols), |(r, c)| {
        let window = x.slice(s![r * stride..r * stride + kr, c * stride..c * stride + kc]);
        let mut acc = F::zero();
        for (&v, &k) in window.iter().zip(kernel.iter()) {
            acc += v * k;
        }
        acc
    })
}

/// Correlation after zero-padding every border by `pad`.
pub fn correlate_zero_padded<F: PyrFloat>(
    x: ArrayView2<F>,
    kernel: ArrayView2<F>,
    pad: usize,
) -> Array2<F> {
    let padded = pad2d(x, [pad; 4], Padding::Constant);
    correlate_valid(padded.view(), kernel, 1)
}

/// Apply a plane operation to every (batch, channel) plane.
pub fn map_planes<F, Op>(x: ArrayView4<F>, op: Op) -> Array4<F>
where
    F: PyrFloat,
    Op: Fn(ArrayView2<F>) -> Array2<F>,
{
    let (batch, channels, _, _) = x.dim();
    let mut out: Option<Array4<F>> = None;
    for b in 0..batch {
        for c in 0..channels {
            let plane = op(x.slice(s![b, c, .., ..]));
            let target = out.get_or_insert_with(|| {
                let (h, w) = plane.dim();
                Array4::zeros((batch, channels, h, w))
            });
            target.slice_mut(s![b, c, .., ..]).assign(&plane);
        }
    }
    out.unwrap_or_else(|| Array4::zeros((batch, channels, 0, 0)))
}

// =============================================================================
// Filters
// =============================================================================

/// Binomial coefficients of order `order_plus_one - 1`, summing to one.
pub fn binomial_filter(order_plus_one: usize) -> Vec<f64> {
    let mut kernel = vec![0.5, 0.5];
    for _ in 2..order_plus_one {
        let mut next = vec![0.0; kernel.len() + 1];
        for (i, &k) in kernel.iter().enumerate() {
            next[i] += 0.5 * k;
            next[i + 1] += 0.5 * k;
        }
        kernel = next;
    }
    kernel
}

/// `outer(sqrt(2) b, sqrt(2) b)` for the binomial filter `b`; sums to 2.
fn binomial_blur_kernel<F: PyrFloat>(order_plus_one: usize, gain: f64) -> Array2<F> {
    let f: Vec<f64> = binomial_filter(order_plus_one.max(2))
        .into_iter()
        .map(|v| v * std::f64::consts::SQRT_2)
        .collect();
    let n = f.len();
    Array2::from_shape_fn((n, n), |(r, c)| F::from_f64_c(f[r] * f[c] * gain))
}

/// Normalized isotropic Gaussian window of size `kernel_size` and deviation `std`.
pub fn circular_gaussian2d<F: PyrFloat>(kernel_size: usize, std: f64) -> Array2<F> {
    let origin = (kernel_size as f64 + 1.0) / 2.0;
    let shift = |i: usize| (i + 1) as f64 - origin;
    let raw = Array2::from_shape_fn((kernel_size, kernel_size), |(r, c)| {
        let (y, x) = (shift(r), shift(c));
        ((x * x + y * y) / (-2.0 * std * std)).exp()
    });
    let total = raw.sum();
    raw.mapv(|v| F::from_f64_c(v / total))
}

// =============================================================================
// Blur and resample
// =============================================================================

/// Correlate with `kernel` after reflect same-padding, keeping every other sample.
pub fn correlate_downsample<F: PyrFloat>(x: ArrayView2<F>, kernel: ArrayView2<F>) -> Array2<F> {
    let padded = same_padding(x, kernel.dim(), Padding::Reflect);
    correlate_valid(padded.view(), kernel, 2)
}

/// Upsample by 2 (zero insertion) and correlate with `kernel`.
///
/// `odd` gives, per axis, whether the output size is `2n - 1` instead of `2n`.
pub fn upsample_convolve<F: PyrFloat>(
    x: ArrayView2<F>,
    odd: (usize, usize),
    kernel: ArrayView2<F>,
) -> Array2<F> {
    let (kr, kc) = kernel.dim();
    let (start_r, start_c) = (kr / 2, kc / 2);
    let (end_r, end_c) = (kr - odd.0 - start_r, kc - odd.1 - start_c);

    let prepad = pad2d(
        x,
        [start_r / 2, end_r / 2, start_c / 2, end_c / 2],
        Padding::Reflect,
    );

    let (pr, pc) = prepad.dim();
    let mut upsampled = Array2::zeros((2 * pr - 1, 2 * pc - 1));
    for ((r, c), &v) in prepad.indexed_iter() {
        upsampled[[2 * r, 2 * c]] = v;
    }

    let postpad = pad2d(
        upsampled.view(),
        [start_r % 2, end_r % 2, start_c % 2, end_c % 2],
        Padding::Constant,
    );
    let flipped = kernel.slice(s![..;-1, ..;-1]);
    correlate_valid(postpad.view(), flipped, 1)
}

/// Blur with a binomial filter and downsample by 2, `n_scales` times.
///
/// With `scale_filter` the filter sums to one so the mean is preserved.
pub fn blur_downsample<F: PyrFloat>(
    x: ArrayView4<F>,
    n_scales: usize,
    order_plus_one: usize,
    scale_filter: bool,
) -> Array4<F> {
    let kernel = binomial_blur_kernel::<F>(order_plus_one, if scale_filter { 0.5 } else { 1.0 });
    let mut out = x.to_owned();
    for _ in 0..n_scales {
        out = map_planes(out.view(), |p| correlate_downsample(p, kernel.view()));
    }
    out
}

/// Upsample by 2 and blur with a binomial filter.
///
/// With `scale_filter` the filter sums to four, compensating the inserted zeros.
pub fn upsample_blur<F: PyrFloat>(
    x: ArrayView4<F>,
    odd: (usize, usize),
    order_plus_one: usize,
    scale_filter: bool,
) -> Array4<F> {
    let kernel = binomial_blur_kernel::<F>(order_plus_one, if scale_filter { 2.0 } else { 1.0 });
    map_planes(x, |p| upsample_convolve(p, odd, kernel.view()))
}

/// 2x2 average pooling after replicate-padding odd dimensions to even.
pub fn downsample_average<F: PyrFloat>(x: ArrayView2<F>) -> Array2<F> {
    let (rows, cols) = x.dim();
    let padded = pad2d(x, [0, rows % 2, 0, cols % 2], Padding::Replicate);
    let (pr, pc) = padded.dim();
    let quarter = F::from_f64_c(0.25);
    Array2::from_shape_fn((pr / 2, pc / 2), |(r, c)| {
        (padded[[2 * r, 2 * c]]
            + padded[[2 * r + 1, 2 * c]]
            + padded[[2 * r, 2 * c + 1]]
            + padded[[2 * r + 1, 2 * c + 1]])
            * quarter
    })
}
