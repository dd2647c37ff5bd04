//! 2D FFT plumbing over ndarray planes.
//!
//! Row/column transforms reuse pre-computed `rustfft` plans, one `Fft2dPlans`
//! per plane size. Spectra are centred with `fftshift` before masking and
//! un-centred with `ifftshift` before inversion.

use ndarray::{Array2, ArrayView2};
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use std::sync::Arc;

use crate::float_trait::PyrFloat;

/// FFT scaling convention.
///
/// `Backward` leaves the forward transform unscaled and divides the inverse by
/// `rows * cols`. `Ortho` divides both directions by `sqrt(rows * cols)`,
/// which makes the pyramid a tight frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FftNorm {
    #[default]
    Backward,
    Ortho,
}

impl FftNorm {
    fn forward_scale<F: PyrFloat>(self, n: usize) -> F {
        match self {
            FftNorm::Backward => F::one(),
            FftNorm::Ortho => F::one() / F::usize_as(n).sqrt(),
        }
    }

    fn inverse_scale<F: PyrFloat>(self, n: usize) -> F {
        match self {
            FftNorm::Backward => F::one() / F::usize_as(n),
            FftNorm::Ortho => F::one() / F::usize_as(n).sqrt(),
        }
    }
}

/// Pre-computed row/column plans for one plane size.
/// Reusing plans avoids re-initialization on every band of every call.
#[derive(Clone)]
pub struct Fft2dPlans<F: PyrFloat> {
    rows: usize,
    cols: usize,
    fft_row: Arc<dyn Fft<F>>,
    fft_col: Arc<dyn Fft<F>>,
    ifft_row: Arc<dyn Fft<F>>,
    ifft_col: Arc<dyn Fft<F>>,
}

impl<F: PyrFloat> std::fmt::Debug for Fft2dPlans<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fft2dPlans")
            .field("rows", &self.rows)
            .field("cols", &self.cols)
            .finish()
    }
}

impl<F: PyrFloat> Fft2dPlans<F> {
    /// Plan forward and inverse transforms for `rows x cols` planes.
    pub fn new(planner: &mut FftPlanner<F>, rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            fft_row: planner.plan_fft_forward(cols),
            fft_col: planner.plan_fft_forward(rows),
            ifft_row: planner.plan_fft_inverse(cols),
            ifft_col: planner.plan_fft_inverse(rows),
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }
}

/// Run `row_plan` over every row and `col_plan` over every column, then scale.
fn transform_2d<F: PyrFloat>(
    input: ArrayView2<Complex<F>>,
    row_plan: &Arc<dyn Fft<F>>,
    col_plan: &Arc<dyn Fft<F>>,
    scale: F,
) -> Array2<Complex<F>> {
    let (rows, cols) = input.dim();
    let mut output = input.to_owned();

    // 1. Transform rows
    let mut row_vec = vec![Complex::new(F::zero(), F::zero()); cols];
    for r in 0..rows {
        for (c, slot) in row_vec.iter_mut().enumerate() {
            *slot = output[[r, c]];
        }
        row_plan.process(&mut row_vec);
        for (c, &v) in row_vec.iter().enumerate() {
            output[[r, c]] = v;
        }
    }

    // 2. Transform columns
    let mut col_vec = vec![Complex::new(F::zero(), F::zero()); rows];
    for c in 0..cols {
        for (r, slot) in col_vec.iter_mut().enumerate() {
            *slot = output[[r, c]];
        }
        col_plan.process(&mut col_vec);
        for (r, &v) in col_vec.iter().enumerate() {
            output[[r, c]] = v * scale;
        }
    }

    output
}

/// Compute the 2D FFT of a complex plane.
pub fn fft2d<F: PyrFloat>(
    input: ArrayView2<Complex<F>>,
    plans: &Fft2dPlans<F>,
    norm: FftNorm,
) -> Array2<Complex<F>> {
    debug_assert_eq!(input.dim(), plans.dim());
    let scale = norm.forward_scale(plans.rows * plans.cols);
    transform_2d(input, &plans.fft_row, &plans.fft_col, scale)
}

/// Compute the 2D FFT of a real plane.
pub fn fft2d_real<F: PyrFloat>(
    input: ArrayView2<F>,
    plans: &Fft2dPlans<F>,
    norm: FftNorm,
) -> Array2<Complex<F>> {
    let complex = input.mapv(|v| Complex::new(v, F::zero()));
    fft2d(complex.view(), plans, norm)
}

/// Compute the 2D inverse FFT of a complex plane.
pub fn ifft2d<F: PyrFloat>(
    input: ArrayView2<Complex<F>>,
    plans: &Fft2dPlans<F>,
    norm: FftNorm,
) -> Array2<Complex<F>> {
    debug_assert_eq!(input.dim(), plans.dim());
    let scale = norm.inverse_scale(plans.rows * plans.cols);
    transform_2d(input, &plans.ifft_row, &plans.ifft_col, scale)
}

/// Move the zero-frequency bin to the centre (`numpy.fft.fftshift`).
pub fn fftshift<T: Clone>(input: ArrayView2<T>) -> Array2<T> {
    let (rows, cols) = input.dim();
    let (sr, sc) = (rows / 2, cols / 2);
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        input[[(r + rows - sr) % rows, (c + cols - sc) % cols]].clone()
    })
}

/// Inverse of [`fftshift`], also for odd sizes (`numpy.fft.ifftshift`).
pub fn ifftshift<T: Clone>(input: ArrayView2<T>) -> Array2<T> {
    let (rows, cols) = input.dim();
    let (sr, sc) = (rows / 2, cols / 2);
    Array2::from_shape_fn((rows, cols), |(r, c)| {
        input[[(r + sr) % rows, (c + sc) % cols]].clone()
    })
}

/// Centred spectrum of a real plane: `fftshift(fft2(x))`.
pub fn centered_spectrum<F: PyrFloat>(
    input: ArrayView2<F>,
    plans: &Fft2dPlans<F>,
    norm: FftNorm,
) -> Array2<Complex<F>> {
    fftshift(fft2d_real(input, plans, norm).view())
}

/// Centred spectrum of a complex plane.
pub fn centered_spectrum_complex<F: PyrFloat>(
    input: ArrayView2<Complex<F>>,
    plans: &Fft2dPlans<F>,
    norm: FftNorm,
) -> Array2<Complex<F>> {
    fftshift(fft2d(input, plans, norm).view())
}

/// Invert a centred spectrum: `ifft2(ifftshift(spectrum))`.
pub fn invert_centered<F: PyrFloat>(
    spectrum: ArrayView2<Complex<F>>,
    plans: &Fft2dPlans<F>,
    norm: FftNorm,
) -> Array2<Complex<F>> {
    ifft2d(ifftshift(spectrum).view(), plans, norm)
}
