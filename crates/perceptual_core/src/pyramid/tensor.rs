//! Flattening a non-downsampled pyramid into one multi-channel array.

use ndarray::{concatenate, s, Array4, Axis};
use rustfft::num_complex::Complex;

use crate::error::{PyramidError, Result};
use crate::float_trait::PyrFloat;

use super::forward::SteerablePyramid;
use super::{PyrBand, PyrKey, PyramidCoeffs};

impl<F: PyrFloat> SteerablePyramid<F> {
    /// Stack every band along the channel axis, in key order.
    ///
    /// A complex band contributes its real channels followed by its
    /// imaginary channels. Only valid when bands share the image size.
    pub fn convert_pyr_to_tensor(&self, coeffs: &PyramidCoeffs<F>) -> Result<Array4<F>> {
        if self.config.downsample {
            return Err(PyramidError::DownsampledPyramid);
        }

        let mut parts: Vec<Array4<F>> = Vec::new();
        for (_, band) in coeffs.iter() {
            match band {
                PyrBand::Real(a) => parts.push(a.clone()),
                PyrBand::Complex(a) => {
                    parts.push(a.mapv(|c| c.re));
                    parts.push(a.mapv(|c| c.im));
                }
            }
        }
        if parts.is_empty() {
            let (rows, cols) = self.config.image_shape;
            return Ok(Array4::zeros((0, 0, rows, cols)));
        }

        let views: Vec<_> = parts.iter().map(|p| p.view()).collect();
        concatenate(Axis(1), &views).map_err(|_| {
            let first = parts[0].shape();
            let bad = parts
                .iter()
                .map(|p| p.shape())
                .find(|s| s[0] != first[0] || s[2] != first[2] || s[3] != first[3])
                .unwrap_or(first);
            PyramidError::ShapeMismatch {
                expected: (first[2], first[3]),
                got: (bad[2], bad[3]),
            }
        })
    }

    /// Split a tensor from [`convert_pyr_to_tensor`](Self::convert_pyr_to_tensor)
    /// back into bands, using the keys of the current size table.
    pub fn convert_tensor_to_pyr(&self, tensor: &Array4<F>) -> Result<PyramidCoeffs<F>> {
        if self.config.downsample {
            return Err(PyramidError::DownsampledPyramid);
        }

        let keys: Vec<PyrKey> = self.pyr_size.keys().copied().collect();
        let complex_band = |key: &PyrKey| self.config.is_complex && !key.is_residual();
        let slots: usize = keys.iter().map(|k| if complex_band(k) { 2 } else { 1 }).sum();

        let total = tensor.shape()[1];
        if slots == 0 || total % slots != 0 {
            return Err(PyramidError::ChannelMismatch {
                channels: total,
                bands: keys.len(),
            });
        }
        let channels = total / slots;

        let mut coeffs = PyramidCoeffs::new();
        let mut offset = 0;
        for key in keys {
            let take = |start: usize| tensor.slice(s![.., start..start + channels, .., ..]);
            if complex_band(&key) {
                let re = take(offset);
                let im = take(offset + channels);
                let mut band = Array4::from_elem(re.dim(), Complex::new(F::zero(), F::zero()));
                ndarray::Zip::from(&mut band)
                    .and(&re)
                    .and(&im)
                    .for_each(|o, &r, &i| *o = Complex::new(r, i));
                coeffs.insert(key, PyrBand::Complex(band));
                offset += 2 * channels;
            } else {
                coeffs.insert(key, PyrBand::Real(take(offset).to_owned()));
                offset += channels;
            }
        }
        Ok(coeffs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pyramid::{Execution, PyramidConfig};

    fn pyramid(config: PyramidConfig) -> SteerablePyramid<f64> {
        SteerablePyramid::new(config.execution(Execution::Sequential)).unwrap()
    }

    fn test_image(batch: usize, channels: usize) -> Array4<f64> {
        Array4::from_shape_fn((batch, channels, 16, 16), |(b, c, r, w)| {
            ((b * 13 + c * 5 + r * 3 + w) % 17) as f64 / 17.0
        })
    }

    #[test]
    fn test_tensor_roundtrip_real() {
        let mut pyr = pyramid(PyramidConfig::new((16, 16)).downsample(false));
        let coeffs = pyr.forward(test_image(2, 3).view(), &[]).unwrap();
        let tensor = pyr.convert_pyr_to_tensor(&coeffs).unwrap();
        // 2 residuals + 2 scales x 4 orientations, 3 channels each
        assert_eq!(tensor.shape(), &[2, 30, 16, 16]);
        let back = pyr.convert_tensor_to_pyr(&tensor).unwrap();
        assert_eq!(back, coeffs);
    }

    #[test]
    fn test_tensor_roundtrip_complex() {
        let mut pyr = pyramid(PyramidConfig::new((16, 16)).downsample(false).is_complex(true));
        let coeffs = pyr.forward(test_image(1, 1).view(), &[]).unwrap();
        let tensor = pyr.convert_pyr_to_tensor(&coeffs).unwrap();
        assert_eq!(tensor.shape()[1], 2 + 2 * 8);
        let back = pyr.convert_tensor_to_pyr(&tensor).unwrap();
        assert_eq!(back, coeffs);
    }

    #[test]
    fn test_tensor_rejects_downsampled() {
        let mut pyr = pyramid(PyramidConfig::new((16, 16)));
        let coeffs = pyr.forward(test_image(1, 1).view(), &[]).unwrap();
        assert!(matches!(
            pyr.convert_pyr_to_tensor(&coeffs),
            Err(PyramidError::DownsampledPyramid)
        ));
    }

    #[test]
    fn test_tensor_channel_mismatch() {
        let mut pyr = pyramid(PyramidConfig::new((16, 16)).downsample(false));
        let _ = pyr.forward(test_image(1, 1).view(), &[]).unwrap();
        let tensor = Array4::<f64>::zeros((1, 7, 16, 16));
        assert!(matches!(
            pyr.convert_tensor_to_pyr(&tensor),
            Err(PyramidError::ChannelMismatch { channels: 7, bands: 10 })
        ));

        // 10 real channels would fit a real pyramid, but complex bands take two each
        let mut pyr = pyramid(PyramidConfig::new((16, 16)).downsample(false).is_complex(true));
        let _ = pyr.forward(test_image(1, 1).view(), &[]).unwrap();
        let tensor = Array4::<f64>::zeros((1, 10, 16, 16));
        assert!(matches!(
            pyr.convert_tensor_to_pyr(&tensor),
            Err(PyramidError::ChannelMismatch { channels: 10, bands: 10 })
        ));
        let two_channels = Array4::<f64>::zeros((1, 36, 16, 16));
        let coeffs = pyr.convert_tensor_to_pyr(&two_channels).unwrap();
        assert_eq!(coeffs.len(), 10);
        assert_eq!(coeffs.get(&PyrKey::band(0, 0)).unwrap().shape(), [1, 2, 16, 16]);
    }
}
