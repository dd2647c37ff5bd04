//! Frequency-domain steerable pyramid.
//!
//! The pyramid splits an image into a highpass residual, `num_scales` scales
//! of `order + 1` oriented bands and a lowpass residual. All filtering is done
//! by multiplying the centred spectrum with masks computed once at
//! construction ([`masks::MaskTable`]).

pub mod config;
pub mod forward;
pub mod masks;
pub mod recon;
pub mod steer;
pub mod tensor;

use std::collections::BTreeMap;
use std::fmt;

use ndarray::Array4;
use rustfft::num_complex::Complex;

use crate::float_trait::PyrFloat;

pub use config::{Execution, Height, PyramidConfig};
pub use forward::SteerablePyramid;
pub use masks::{CropBounds, MaskTable, ScaleMasks};

// =============================================================================
// Keys and levels
// =============================================================================

/// Key of one pyramid band.
///
/// The derived ordering is the iteration order of [`PyramidCoeffs`]:
/// highpass residual, then scales finest to coarsest with orientations
/// ascending, then the lowpass residual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PyrKey {
    ResidualHighpass,
    Band { scale: usize, orientation: usize },
    ResidualLowpass,
}

impl PyrKey {
    pub fn band(scale: usize, orientation: usize) -> Self {
        PyrKey::Band { scale, orientation }
    }

    pub fn is_residual(&self) -> bool {
        !matches!(self, PyrKey::Band { .. })
    }
}

impl fmt::Display for PyrKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PyrKey::ResidualHighpass => write!(f, "residual_highpass"),
            PyrKey::ResidualLowpass => write!(f, "residual_lowpass"),
            PyrKey::Band { scale, orientation } => write!(f, "({}, {})", scale, orientation),
        }
    }
}

/// A level of the pyramid: one scale (all its orientations) or a residual.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    ResidualHighpass,
    Scale(usize),
    ResidualLowpass,
}

/// Either every item or an explicit list.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Selection<T> {
    #[default]
    All,
    Only(Vec<T>),
}

impl<T> From<Vec<T>> for Selection<T> {
    fn from(items: Vec<T>) -> Self {
        Selection::Only(items)
    }
}

impl<T: Clone> From<&[T]> for Selection<T> {
    fn from(items: &[T]) -> Self {
        Selection::Only(items.to_vec())
    }
}

// =============================================================================
// Coefficients
// =============================================================================

/// One band of coefficients, laid out (batch, channel, height, width).
#[derive(Debug, Clone, PartialEq)]
pub enum PyrBand<F: PyrFloat> {
    Real(Array4<F>),
    Complex(Array4<Complex<F>>),
}

impl<F: PyrFloat> PyrBand<F> {
    pub fn shape(&self) -> [usize; 4] {
        let s = match self {
            PyrBand::Real(a) => a.shape(),
            PyrBand::Complex(a) => a.shape(),
        };
        [s[0], s[1], s[2], s[3]]
    }

    /// Spatial (height, width) of the band.
    pub fn spatial(&self) -> (usize, usize) {
        let s = self.shape();
        (s[2], s[3])
    }

    pub fn is_complex(&self) -> bool {
        matches!(self, PyrBand::Complex(_))
    }

    /// "real" or "complex".
    pub fn kind(&self) -> &'static str {
        band_kind(self.is_complex())
    }

    pub fn as_real(&self) -> Option<&Array4<F>> {
        match self {
            PyrBand::Real(a) => Some(a),
            PyrBand::Complex(_) => None,
        }
    }

    pub fn as_complex(&self) -> Option<&Array4<Complex<F>>> {
        match self {
            PyrBand::Complex(a) => Some(a),
            PyrBand::Real(_) => None,
        }
    }

    /// Real part (the whole band for real coefficients).
    pub fn real_part(&self) -> Array4<F> {
        match self {
            PyrBand::Real(a) => a.clone(),
            PyrBand::Complex(a) => a.mapv(|c| c.re),
        }
    }

    /// Sum of squared magnitudes.
    pub fn energy(&self) -> F {
        match self {
            PyrBand::Real(a) => a.iter().map(|&v| v * v).sum(),
            PyrBand::Complex(a) => a.iter().map(|c| c.norm_sqr()).sum(),
        }
    }
}

pub(crate) fn band_kind(is_complex: bool) -> &'static str {
    if is_complex {
        "complex"
    } else {
        "real"
    }
}

/// Ordered map of pyramid bands.
#[derive(Debug, Clone, PartialEq)]
pub struct PyramidCoeffs<F: PyrFloat> {
    bands: BTreeMap<PyrKey, PyrBand<F>>,
}

impl<F: PyrFloat> Default for PyramidCoeffs<F> {
    fn default() -> Self {
        Self {
            bands: BTreeMap::new(),
        }
    }
}

impl<F: PyrFloat> PyramidCoeffs<F> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: PyrKey, band: PyrBand<F>) -> Option<PyrBand<F>> {
        self.bands.insert(key, band)
    }

    pub fn get(&self, key: &PyrKey) -> Option<&PyrBand<F>> {
        self.bands.get(key)
    }

    pub fn remove(&mut self, key: &PyrKey) -> Option<PyrBand<F>> {
        self.bands.remove(key)
    }

    pub fn contains_key(&self, key: &PyrKey) -> bool {
        self.bands.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.bands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bands.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &PyrKey> {
        self.bands.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PyrKey, &PyrBand<F>)> {
        self.bands.iter()
    }

    /// Total coefficient energy over every band.
    pub fn energy(&self) -> F {
        self.bands.values().map(|b| b.energy()).sum()
    }

    pub fn into_inner(self) -> BTreeMap<PyrKey, PyrBand<F>> {
        self.bands
    }
}

impl<F: PyrFloat> FromIterator<(PyrKey, PyrBand<F>)> for PyramidCoeffs<F> {
    fn from_iter<I: IntoIterator<Item = (PyrKey, PyrBand<F>)>>(iter: I) -> Self {
        Self {
            bands: iter.into_iter().collect(),
        }
    }
}

impl<F: PyrFloat> IntoIterator for PyramidCoeffs<F> {
    type Item = (PyrKey, PyrBand<F>);
    type IntoIter = std::collections::btree_map::IntoIter<PyrKey, PyrBand<F>>;

    fn into_iter(self) -> Self::IntoIter {
        self.bands.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_order_matches_band_layout() {
        let mut keys = vec![
            PyrKey::ResidualLowpass,
            PyrKey::band(1, 0),
            PyrKey::band(0, 3),
            PyrKey::ResidualHighpass,
            PyrKey::band(0, 0),
        ];
        keys.sort();
        assert_eq!(
            keys,
            vec![
                PyrKey::ResidualHighpass,
                PyrKey::band(0, 0),
                PyrKey::band(0, 3),
                PyrKey::band(1, 0),
                PyrKey::ResidualLowpass,
            ]
        );
    }

    #[test]
    fn test_key_display() {
        assert_eq!(PyrKey::ResidualHighpass.to_string(), "residual_highpass");
        assert_eq!(PyrKey::band(2, 1).to_string(), "(2, 1)");
    }

    #[test]
    fn test_coeffs_iterate_in_key_order() {
        let mut coeffs = PyramidCoeffs::<f64>::new();
        coeffs.insert(PyrKey::ResidualLowpass, PyrBand::Real(Array4::zeros((1, 1, 2, 2))));
        coeffs.insert(PyrKey::band(0, 1), PyrBand::Real(Array4::ones((1, 1, 4, 4))));
        coeffs.insert(PyrKey::ResidualHighpass, PyrBand::Real(Array4::zeros((1, 1, 4, 4))));
        let keys: Vec<PyrKey> = coeffs.keys().copied().collect();
        assert_eq!(
            keys,
            vec![PyrKey::ResidualHighpass, PyrKey::band(0, 1), PyrKey::ResidualLowpass]
        );
        assert_eq!(coeffs.energy(), 16.0);
    }

    #[test]
    fn test_band_accessors() {
        let band = PyrBand::Complex(Array4::from_elem((1, 2, 3, 5), Complex::new(3.0f64, 4.0)));
        assert!(band.is_complex());
        assert_eq!(band.spatial(), (3, 5));
        assert_eq!(band.energy(), 25.0 * 30.0);
        assert!(band.as_real().is_none());
        assert_eq!(band.real_part()[[0, 1, 2, 4]], 3.0);
    }
}
