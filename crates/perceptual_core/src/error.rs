use thiserror::Error;

use crate::pyramid::PyrKey;

/// Hard failures raised by the pyramid, the metrics and the table loaders.
///
/// Repairable parameter choices (non-positive `twidth`, out-of-range `order`,
/// multi-channel input to a grayscale metric, ...) are not errors: they are
/// logged with `log::warn!` and corrected.
#[derive(Debug, Error)]
pub enum PyramidError {
    #[error("input should have four dimensions (batch, channel, height, width), got {0}")]
    InvalidRank(usize),
    #[error("image shape {got:?} does not match the shape {expected:?} the pyramid was built for")]
    ShapeMismatch {
        expected: (usize, usize),
        got: (usize, usize),
    },
    #[error("img1 and img2 must have the same height and width, got {0:?} and {1:?}")]
    SpatialMismatch((usize, usize), (usize, usize)),
    #[error(
        "either img1 and img2 should have the same number of elements in each dimension, \
         or one of them should be 1, got shapes {0:?} and {1:?}"
    )]
    NotBroadcastable([usize; 4], [usize; 4]),
    #[error("scale {scale} is out of range, scales must be within 0 and {max}")]
    ScaleOutOfRange { scale: usize, max: usize },
    #[error("band {band} is out of range, bands must be within 0 and {max}")]
    BandOutOfRange { band: usize, max: usize },
    #[error("cannot build pyramid higher than {max} levels, requested {requested}")]
    HeightTooLarge { requested: usize, max: usize },
    #[error("image of size {0:?} is too small: {1}")]
    ImageTooSmall((usize, usize), String),
    #[error(
        "{0} not in pyramid coefficients, they must include all scales, \
         so make sure forward() was called with an empty scale selection"
    )]
    MissingKey(PyrKey),
    #[error("expected {expected} pyramid levels, got {got}")]
    LevelCount { expected: usize, got: usize },
    #[error("conversion to tensor only works for pyramids without downsampling")]
    DownsampledPyramid,
    #[error("channel count {channels} is not compatible with {bands} pyramid bands")]
    ChannelMismatch { channels: usize, bands: usize },
    #[error("{key} holds {got} coefficients, expected {expected}")]
    BandKind {
        key: PyrKey,
        expected: &'static str,
        got: &'static str,
    },
    #[error("steering matrix could not be inverted: {0}")]
    Steering(String),
    #[error("invalid lookup table: {0}")]
    InvalidTable(String),
    #[error("failed to read lookup table {path}: {source}")]
    TableIo {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse lookup table {path}: {source}")]
    TableParse {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type Result<T> = std::result::Result<T, PyramidError>;
