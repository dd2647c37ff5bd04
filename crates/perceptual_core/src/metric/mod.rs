//! Perceptual image-quality metrics.
//!
//! Every metric takes two (batch, channel, height, width) images whose batch
//! and channel sizes match or are 1, and returns one value per
//! (batch, channel) pair.

pub mod common;
pub mod nlpd;
pub mod nspd;
pub mod ssim;

pub use common::as_image;
pub use nlpd::{nlpd, normalized_laplacian_pyramid};
pub use nspd::{normalized_steerable_pyramid, nspd};
pub use ssim::{ms_ssim, ssim, ssim_map, DEFAULT_POWER_FACTORS};
