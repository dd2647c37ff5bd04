//! Laplacian pyramid built from binomial blur/resample steps.

use ndarray::{Array4, ArrayView4};

use crate::conv::{blur_downsample, upsample_blur};
use crate::error::{PyramidError, Result};
use crate::float_trait::PyrFloat;

/// Filter length of the binomial blur.
const BINOMIAL_TAPS: usize = 5;

/// Laplacian pyramid with `n_scales` levels: `n_scales - 1` bandpass images
/// followed by the remaining lowpass image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LaplacianPyramid {
    pub n_scales: usize,
    pub scale_filter: bool,
}

impl Default for LaplacianPyramid {
    fn default() -> Self {
        Self {
            n_scales: 5,
            scale_filter: false,
        }
    }
}

/// Per-axis parity of a (batch, channel, height, width) array.
fn parity<F: PyrFloat>(x: &Array4<F>) -> (usize, usize) {
    let (_, _, h, w) = x.dim();
    (h % 2, w % 2)
}

impl LaplacianPyramid {
    pub fn new(n_scales: usize, scale_filter: bool) -> Self {
        Self {
            n_scales,
            scale_filter,
        }
    }

    pub fn forward<F: PyrFloat>(&self, x: ArrayView4<F>) -> Vec<Array4<F>> {
        let mut levels = Vec::with_capacity(self.n_scales);
        let mut current = x.to_owned();
        for _ in 1..self.n_scales {
            let odd = parity(&current);
            let down = blur_downsample(current.view(), 1, BINOMIAL_TAPS, self.scale_filter);
            let up = upsample_blur(down.view(), odd, BINOMIAL_TAPS, self.scale_filter);
            levels.push(&current - &up);
            current = down;
        }
        levels.push(current);
        levels
    }

    /// Invert [`forward`](Self::forward).
    pub fn recon_pyr<F: PyrFloat>(&self, levels: &[Array4<F>]) -> Result<Array4<F>> {
        if levels.len() != self.n_scales || levels.is_empty() {
            return Err(PyramidError::LevelCount {
                expected: self.n_scales,
                got: levels.len(),
            });
        }
        let mut x = levels[levels.len() - 1].clone();
        for band in levels[..levels.len() - 1].iter().rev() {
            let up = upsample_blur(x.view(), parity(band), BINOMIAL_TAPS, self.scale_filter);
            x = band + &up;
        }
        Ok(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_image(h: usize, w: usize) -> Array4<f64> {
        Array4::from_shape_fn((1, 2, h, w), |(_, c, r, k)| {
            ((r * 31 + k * 17 + c * 7) % 23) as f64 / 23.0
        })
    }

    #[test]
    fn test_forward_level_sizes() {
        let pyr = LaplacianPyramid::new(6, true);
        let levels = pyr.forward(test_image(64, 50).view());
        let sizes: Vec<(usize, usize)> = levels.iter().map(|l| (l.dim().2, l.dim().3)).collect();
        assert_eq!(sizes, vec![(64, 50), (32, 25), (16, 13), (8, 7), (4, 4), (2, 2)]);
    }

    #[test]
    fn test_perfect_reconstruction() {
        for scale_filter in [true, false] {
            let pyr = LaplacianPyramid::new(4, scale_filter);
            let img = test_image(37, 20);
            let levels = pyr.forward(img.view());
            let recon = pyr.recon_pyr(&levels).unwrap();
            let err = img
                .iter()
                .zip(recon.iter())
                .map(|(a, b)| (a - b).abs())
                .fold(0.0, f64::max);
            assert!(err < 1e-12, "scale_filter={} err={}", scale_filter, err);
        }
    }

    #[test]
    fn test_constant_image_has_empty_bands() {
        let pyr = LaplacianPyramid::new(3, true);
        let levels = pyr.forward(Array4::from_elem((1, 1, 16, 16), 0.7f64).view());
        for band in &levels[..2] {
            assert!(band.iter().all(|v: &f64| v.abs() < 1e-12));
        }
        assert!(levels[2].iter().all(|v| (v - 0.7).abs() < 1e-12));
    }

    #[test]
    fn test_recon_rejects_wrong_level_count() {
        let pyr = LaplacianPyramid::new(3, true);
        let levels = vec![Array4::<f64>::zeros((1, 1, 4, 4))];
        assert!(matches!(
            pyr.recon_pyr(&levels),
            Err(PyramidError::LevelCount { expected: 3, got: 1 })
        ));
    }
}
