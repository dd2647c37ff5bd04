//! Frequency masks of the steerable pyramid.
//!
//! Masks are designed on a centred frequency grid (`[-1, 1)` in each axis)
//! in f64, then stored in the pyramid's float type. The radial profile is a
//! raised cosine in log2 frequency, the angular profile `cos^order`.

use ndarray::{s, Array2, ArrayView2};
use rustfft::FftPlanner;

use crate::error::Result;
use crate::float_trait::PyrFloat;
use crate::signal::{angular_constant, point_op, point_op_shifted, rcos_fn};
use crate::transforms::Fft2dPlans;

use super::config::PyramidConfig;

/// Half-size of the angular lookup table.
const ANGLE_LUT_SIZE: i64 = 1024;

/// Sub-rectangle of a centred spectrum kept when moving to the next scale.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropBounds {
    pub row_start: usize,
    pub row_end: usize,
    pub col_start: usize,
    pub col_end: usize,
}

impl CropBounds {
    /// The whole `rows x cols` plane.
    pub fn full(rows: usize, cols: usize) -> Self {
        Self {
            row_start: 0,
            row_end: rows,
            col_start: 0,
            col_end: cols,
        }
    }

    /// Centred half-size crop of a `rows x cols` spectrum.
    pub fn centred_half(rows: usize, cols: usize) -> Self {
        let (row_start, row_end) = half_extent(rows);
        let (col_start, col_end) = half_extent(cols);
        Self {
            row_start,
            row_end,
            col_start,
            col_end,
        }
    }

    pub fn dim(&self) -> (usize, usize) {
        (self.row_end - self.row_start, self.col_end - self.col_start)
    }

    pub fn view<'a, T>(&self, plane: ArrayView2<'a, T>) -> ArrayView2<'a, T> {
        plane.slice_move(s![self.row_start..self.row_end, self.col_start..self.col_end])
    }
}

/// Start/end of the centred crop along one axis of length `d`.
fn half_extent(d: usize) -> (usize, usize) {
    let ctr = d / 2 + 1;
    let lodims = d.div_ceil(2);
    let loctr = lodims / 2 + 1;
    let start = ctr - loctr;
    (start, start + lodims)
}

/// Masks and plans of one scale.
#[derive(Debug, Clone)]
pub struct ScaleMasks<F: PyrFloat> {
    /// Radial bandpass of the scale, on the scale's full grid.
    pub himask: Array2<F>,
    /// One angular mask per orientation, used by the forward transform.
    pub angle_masks: Vec<Array2<F>>,
    /// One angular mask per orientation, used by reconstruction.
    pub angle_masks_recon: Vec<Array2<F>>,
    /// Radial lowpass applied after cropping, on the next scale's grid.
    pub lomask: Array2<F>,
    pub crop: CropBounds,
    /// FFT plans for the band size of this scale.
    pub plans: Fft2dPlans<F>,
}

impl<F: PyrFloat> ScaleMasks<F> {
    /// Spatial size of the oriented bands of this scale.
    pub fn band_dim(&self) -> (usize, usize) {
        self.himask.dim()
    }
}

/// All masks of a pyramid, built once from its configuration.
#[derive(Debug, Clone)]
pub struct MaskTable<F: PyrFloat> {
    pub lo0mask: Array2<F>,
    pub hi0mask: Array2<F>,
    pub scales: Vec<ScaleMasks<F>>,
    pub image_plans: Fft2dPlans<F>,
    /// Plans for the lowpass residual size.
    pub lowpass_plans: Fft2dPlans<F>,
}

impl<F: PyrFloat> MaskTable<F> {
    /// Build the masks of a configuration that has already been normalized.
    pub fn build(config: &PyramidConfig, num_scales: usize) -> Result<Self> {
        let (rows, cols) = config.image_shape;
        let order = config.order;
        let num_orientations = config.num_orientations();
        let mut planner = FftPlanner::<F>::new();

        let (mut angle, mut log_rad) = polar_grid(rows, cols);

        let (mut xrcos, yrcos) = rcos_fn(config.twidth, -config.twidth / 2.0, (0.0, 1.0));
        let yrcos: Vec<f64> = yrcos.iter().map(|v| v.sqrt()).collect();
        let yircos: Vec<f64> = yrcos.iter().map(|v| (1.0 - v * v).max(0.0).sqrt()).collect();

        let lo0mask = point_op(log_rad.view(), &yircos, &xrcos);
        let hi0mask = point_op(log_rad.view(), &yrcos, &xrcos);

        let (xcosn, ycosn, ycosn_recon) = angle_tables(order, num_orientations, config.is_complex);

        let mut scales = Vec::with_capacity(num_scales);
        for _ in 0..num_scales {
            for x in xrcos.iter_mut() {
                *x -= 1.0;
            }

            let himask = point_op(log_rad.view(), &yrcos, &xrcos);
            let mut angle_masks = Vec::with_capacity(num_orientations);
            let mut angle_masks_recon = Vec::with_capacity(num_orientations);
            for b in 0..num_orientations {
                let offset = std::f64::consts::PI * b as f64 / num_orientations as f64;
                angle_masks.push(cast(point_op_shifted(angle.view(), &ycosn, &xcosn, offset)));
                angle_masks_recon.push(cast(point_op_shifted(
                    angle.view(),
                    &ycosn_recon,
                    &xcosn,
                    offset,
                )));
            }

            let (d0, d1) = angle.dim();
            let crop = if config.downsample {
                CropBounds::centred_half(d0, d1)
            } else {
                CropBounds::full(d0, d1)
            };
            if config.downsample {
                angle = crop.view(angle.view()).to_owned();
                log_rad = crop.view(log_rad.view()).to_owned();
            }
            let lomask = point_op(log_rad.view(), &yircos, &xrcos);

            scales.push(ScaleMasks {
                himask: cast(himask),
                angle_masks,
                angle_masks_recon,
                lomask: cast(lomask),
                crop,
                plans: Fft2dPlans::new(&mut planner, d0, d1),
            });
        }

        let (lr, lc) = log_rad.dim();
        log::debug!(
            "built mask table: {} scales, {} orientations, lowpass {}x{}",
            num_scales,
            num_orientations,
            lr,
            lc
        );

        Ok(Self {
            lo0mask: cast(lo0mask),
            hi0mask: cast(hi0mask),
            scales,
            image_plans: Fft2dPlans::new(&mut planner, rows, cols),
            lowpass_plans: Fft2dPlans::new(&mut planner, lr, lc),
        })
    }

    pub fn num_scales(&self) -> usize {
        self.scales.len()
    }

    /// Spatial size of the lowpass residual.
    pub fn lowpass_dim(&self) -> (usize, usize) {
        self.lowpass_plans.dim()
    }
}

/// Centred polar frequency grid: `(angle, log2 radius)`.
///
/// The DC sample copies the radius of its left neighbour so the log stays finite.
fn polar_grid(rows: usize, cols: usize) -> (Array2<f64>, Array2<f64>) {
    let ramp = |k: usize, n: usize| -1.0 + 2.0 * k as f64 / n as f64;
    let angle = Array2::from_shape_fn((rows, cols), |(r, c)| ramp(r, rows).atan2(ramp(c, cols)));
    let mut radius = Array2::from_shape_fn((rows, cols), |(r, c)| {
        ramp(r, rows).hypot(ramp(c, cols))
    });

    // a single column has no zero frequency on the column ramp
    let (cr, cc) = (rows / 2, cols / 2);
    if cc >= 1 {
        radius[[cr, cc]] = radius[[cr, cc - 1]];
    }

    (angle, radius.mapv(f64::log2))
}

/// Angular lookup table `(x, forward, recon)`.
fn angle_tables(
    order: usize,
    num_orientations: usize,
    is_complex: bool,
) -> (Vec<f64>, Vec<f64>, Vec<f64>) {
    let pi = std::f64::consts::PI;
    let lut = ANGLE_LUT_SIZE;
    let xcosn: Vec<f64> = (-(2 * lut + 1)..(lut + 2))
        .map(|k| pi * k as f64 / lut as f64)
        .collect();

    let sqrt_const = angular_constant(order, num_orientations).sqrt();
    let cos_pow = |x: f64| x.cos().powi(order as i32);

    let recon: Vec<f64> = xcosn.iter().map(|&x| sqrt_const * cos_pow(x)).collect();
    let forward = if is_complex {
        xcosn
            .iter()
            .map(|&x| {
                let alpha = (x + pi).rem_euclid(2.0 * pi) - pi;
                if alpha.abs() < pi / 2.0 {
                    2.0 * sqrt_const * cos_pow(x)
                } else {
                    0.0
                }
            })
            .collect()
    } else {
        recon.clone()
    };

    (xcosn, forward, recon)
}

fn cast<F: PyrFloat>(a: Array2<f64>) -> Array2<F> {
    a.mapv(F::from_f64_c)
}
