//! Perceptual Core Library
//!
//! Pure Rust implementation of the frequency-domain steerable pyramid and of
//! the perceptual image-quality metrics built around it (SSIM, MS-SSIM, NLPD,
//! NSPD). This crate contains all algorithm logic without Python bindings.

pub mod conv;
pub mod error;
pub mod float_trait;
pub mod gain_control;
pub mod laplacian;
pub mod metric;
pub mod pyramid;
pub mod signal;
pub mod tables;
pub mod transforms;

// Re-export commonly used types at the crate root
pub use conv::Padding;
pub use error::{PyramidError, Result};
pub use float_trait::PyrFloat;
pub use gain_control::{local_gain_control, local_gain_release};
pub use laplacian::LaplacianPyramid;
pub use metric::{ms_ssim, nlpd, nspd, ssim, ssim_map};
pub use pyramid::{
    Execution, Height, Level, PyrBand, PyrKey, PyramidCoeffs, PyramidConfig, Selection,
    SteerablePyramid,
};
pub use tables::{NlpdParams, NspdSigmas, SigmaEntry};
