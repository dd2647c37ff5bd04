//! Float trait abstraction for f32/f64 support.
//!
//! Every transform and metric in this crate is generic over `PyrFloat`, so the
//! numeric precision of a pyramid is fixed by its type parameter at
//! construction time rather than cast after the fact.

use num_traits::{Float, FromPrimitive, NumAssign};
use rustfft::FftNum;
use std::fmt::Debug;
use std::iter::Sum;

/// Trait alias for the floating point types supported by the pyramid and metrics.
///
/// This trait combines all the bounds needed:
/// - Basic float operations (Float, NumAssign)
/// - FFT compatibility (FftNum from rustfft)
/// - Conversion from primitive types (FromPrimitive)
/// - Iteration support (Sum)
/// - Debug printing and thread safety for rayon
pub trait PyrFloat:
    Float + FftNum + FromPrimitive + NumAssign + Sum + Debug + Send + Sync + 'static
{
    /// Machine-precision dependent tolerance used when checking that a filter sums to one.
    const SUM_TOLERANCE: Self;

    /// Create a value from an f64 constant.
    fn from_f64_c(val: f64) -> Self;

    /// Create a value from a usize constant.
    fn usize_as(val: usize) -> Self;

    /// Widen to f64 without going through `Option`.
    fn as_f64(self) -> f64;
}

impl PyrFloat for f32 {
    const SUM_TOLERANCE: Self = 1e-5;

    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val as f32
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f32
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self as f64
    }
}

impl PyrFloat for f64 {
    const SUM_TOLERANCE: Self = 1e-8;

    #[inline]
    fn from_f64_c(val: f64) -> Self {
        val
    }

    #[inline]
    fn usize_as(val: usize) -> Self {
        val as f64
    }

    #[inline]
    fn as_f64(self) -> f64 {
        self
    }
}
