use rayon::prelude::*;

use crate::error::{PyramidError, Result};
use crate::transforms::FftNorm;

// =============================================================================
// Constants
// =============================================================================

/// Default steerable filter order (4 orientations).
pub const DEFAULT_ORDER: usize = 3;

/// Supported range of the filter order.
pub const MIN_ORDER: usize = 1;
pub const MAX_ORDER: usize = 15;

/// Default width of the radial transition region, in octaves.
pub const DEFAULT_TWIDTH: f64 = 1.0;

/// Environment variable selecting the default execution target.
const EXECUTION_ENV: &str = "PERCEPTUAL_EXECUTION";

// =============================================================================
// Types
// =============================================================================

/// Number of scales to build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Height {
    /// As many scales as the image size allows.
    #[default]
    Auto,
    Levels(usize),
}

/// How (batch, channel) planes are processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Execution {
    Sequential,
    /// Planes are distributed over the rayon thread pool.
    Parallel,
}

impl Default for Execution {
    fn default() -> Self {
        resolve_execution()
    }
}

impl Execution {
    /// Evaluate `op` for every plane index in `0..n`, preserving order.
    pub(crate) fn map<T, Op>(self, n: usize, op: Op) -> Vec<T>
    where
        T: Send,
        Op: Fn(usize) -> T + Sync + Send,
    {
        match self {
            Execution::Sequential => (0..n).map(op).collect(),
            Execution::Parallel => (0..n).into_par_iter().map(op).collect(),
        }
    }
}

fn resolve_execution() -> Execution {
    std::env::var(EXECUTION_ENV)
        .ok()
        .map(|value| {
            let v = value.trim();
            if v.eq_ignore_ascii_case("parallel") || v.eq_ignore_ascii_case("rayon") {
                Execution::Parallel
            } else {
                Execution::Sequential
            }
        })
        .unwrap_or(Execution::Sequential)
}

/// Construction parameters of a [`SteerablePyramid`](super::SteerablePyramid).
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidConfig {
    /// (height, width) of the images the pyramid accepts.
    pub image_shape: (usize, usize),
    pub height: Height,
    /// Derivative order of the angular filters; `order + 1` orientations.
    pub order: usize,
    /// Width of the radial transition in octaves.
    pub twidth: f64,
    /// Keep complex (analytic) oriented bands instead of their real part.
    pub is_complex: bool,
    /// Crop the lowpass spectrum after every scale.
    pub downsample: bool,
    /// Use orthonormal FFT scaling so the pyramid preserves energy.
    pub tight_frame: bool,
    pub execution: Execution,
}

impl PyramidConfig {
    /// Real, downsampled pyramid of automatic height and order 3.
    pub fn new(image_shape: (usize, usize)) -> Self {
        Self {
            image_shape,
            height: Height::Auto,
            order: DEFAULT_ORDER,
            twidth: DEFAULT_TWIDTH,
            is_complex: false,
            downsample: true,
            tight_frame: false,
            execution: Execution::default(),
        }
    }

    pub fn height(mut self, height: Height) -> Self {
        self.height = height;
        self
    }

    pub fn order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn twidth(mut self, twidth: f64) -> Self {
        self.twidth = twidth;
        self
    }

    pub fn is_complex(mut self, is_complex: bool) -> Self {
        self.is_complex = is_complex;
        self
    }

    pub fn downsample(mut self, downsample: bool) -> Self {
        self.downsample = downsample;
        self
    }

    pub fn tight_frame(mut self, tight_frame: bool) -> Self {
        self.tight_frame = tight_frame;
        self
    }

    pub fn execution(mut self, execution: Execution) -> Self {
        self.execution = execution;
        self
    }

    /// Largest supported number of scales: `floor(log2(min(H, W))) - 2`.
    pub fn max_height(&self) -> usize {
        let min_dim = self.image_shape.0.min(self.image_shape.1);
        if min_dim == 0 {
            return 0;
        }
        (min_dim.ilog2() as usize).saturating_sub(2)
    }

    /// Number of scales after resolving [`Height::Auto`].
    pub fn num_scales(&self) -> Result<usize> {
        let max = self.max_height();
        match self.height {
            Height::Auto => Ok(max),
            Height::Levels(n) if n > max => Err(PyramidError::HeightTooLarge { requested: n, max }),
            Height::Levels(n) => Ok(n),
        }
    }

    pub fn num_orientations(&self) -> usize {
        self.order + 1
    }

    pub fn fft_norm(&self) -> FftNorm {
        if self.tight_frame {
            FftNorm::Ortho
        } else {
            FftNorm::Backward
        }
    }

    /// Check for hard errors without repairing anything.
    pub fn validate(&self) -> Result<()> {
        let (h, w) = self.image_shape;
        if h == 0 || w == 0 {
            return Err(PyramidError::ImageTooSmall(
                self.image_shape,
                "both dimensions must be non-zero".to_string(),
            ));
        }
        self.num_scales().map(|_| ())
    }

    /// Validate, then repair the soft problems with a warning each.
    pub(crate) fn normalized(&self) -> Result<PyramidConfig> {
        self.validate()?;
        let mut cfg = self.clone();

        if cfg.order < MIN_ORDER || cfg.order > MAX_ORDER {
            log::warn!(
                "order must be an integer in the range [{},{}], truncating {}",
                MIN_ORDER,
                MAX_ORDER,
                cfg.order
            );
            cfg.order = cfg.order.clamp(MIN_ORDER, MAX_ORDER);
        }

        if cfg.twidth <= 0.0 || cfg.twidth.is_nan() {
            log::warn!("twidth must be positive, setting to 1 (was {})", cfg.twidth);
            cfg.twidth = DEFAULT_TWIDTH;
        }

        let (h, w) = cfg.image_shape;
        if h % 2 != 0 || w % 2 != 0 {
            log::warn!(
                "reconstruction will not be perfect for odd image dimensions {:?}",
                cfg.image_shape
            );
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_height() {
        assert_eq!(PyramidConfig::new((64, 64)).max_height(), 4);
        assert_eq!(PyramidConfig::new((256, 100)).max_height(), 4);
        assert_eq!(PyramidConfig::new((128, 128)).max_height(), 5);
        assert_eq!(PyramidConfig::new((3, 3)).max_height(), 0);
    }

    #[test]
    fn test_num_scales_auto_and_explicit() {
        let cfg = PyramidConfig::new((64, 64));
        assert_eq!(cfg.num_scales().unwrap(), 4);
        assert_eq!(cfg.clone().height(Height::Levels(2)).num_scales().unwrap(), 2);
        match cfg.height(Height::Levels(5)).num_scales() {
            Err(PyramidError::HeightTooLarge { requested, max }) => {
                assert_eq!((requested, max), (5, 4));
            }
            other => panic!("expected HeightTooLarge, got {:?}", other),
        }
    }

    #[test]
    fn test_normalized_repairs_soft_errors() {
        let cfg = PyramidConfig::new((32, 32)).order(20).twidth(-1.0);
        let fixed = cfg.normalized().unwrap();
        assert_eq!(fixed.order, MAX_ORDER);
        assert_eq!(fixed.twidth, 1.0);

        let fixed = PyramidConfig::new((32, 32)).order(0).normalized().unwrap();
        assert_eq!(fixed.order, MIN_ORDER);
        assert_eq!(fixed.num_orientations(), 2);
    }

    #[test]
    fn test_empty_image_rejected() {
        assert!(matches!(
            PyramidConfig::new((0, 16)).validate(),
            Err(PyramidError::ImageTooSmall(..))
        ));
    }

    #[test]
    fn test_fft_norm_follows_tight_frame() {
        assert_eq!(PyramidConfig::new((8, 8)).fft_norm(), FftNorm::Backward);
        assert_eq!(
            PyramidConfig::new((8, 8)).tight_frame(true).fft_norm(),
            FftNorm::Ortho
        );
    }
}
