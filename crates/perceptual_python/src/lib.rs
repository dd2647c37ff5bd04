//! PyO3 Python bindings for the steerable pyramid and perceptual metrics.
//!
//! This crate provides thin Python bindings for the perceptual_core library.
//! All algorithm logic is in perceptual_core; this crate only handles
//! Python/NumPy type conversions.

use std::path::Path;

use numpy::{Complex64, PyArray2, PyArray4, PyReadonlyArray4, PyReadonlyArrayDyn, ToPyArray};
use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;
use pyo3::types::PyDict;

use perceptual_core::metric::as_image;
use perceptual_core::{
    Height, Level, NlpdParams, NspdSigmas, Padding, PyrBand, PyrKey, PyramidCoeffs, PyramidConfig,
    PyramidError, Selection, SteerablePyramid,
};

fn to_py_err(e: PyramidError) -> PyErr {
    PyValueError::new_err(e.to_string())
}

fn parse_padding(pad: Option<&str>) -> PyResult<Option<Padding>> {
    pad.map(|name| {
        Padding::from_name(name)
            .ok_or_else(|| PyValueError::new_err(format!("unknown padding mode '{}'", name)))
    })
    .transpose()
}

/// Structural similarity of two (batch, channel, height, width) images.
#[pyfunction]
#[pyo3(name = "ssim", signature = (img1, img2, weighted=false, dynamic_range=1.0, pad=None))]
pub fn ssim_py<'py>(
    py: Python<'py>,
    img1: PyReadonlyArrayDyn<f64>,
    img2: PyReadonlyArrayDyn<f64>,
    weighted: bool,
    dynamic_range: f64,
    pad: Option<&str>,
) -> PyResult<&'py PyArray2<f64>> {
    let pad = parse_padding(pad)?;
    let x = as_image(img1.as_array()).map_err(to_py_err)?;
    let y = as_image(img2.as_array()).map_err(to_py_err)?;
    let output = perceptual_core::ssim(x, y, weighted, dynamic_range, pad).map_err(to_py_err)?;
    Ok(output.to_pyarray(py))
}

/// Full SSIM map (valid region) of two images.
#[pyfunction]
#[pyo3(name = "ssim_map", signature = (img1, img2, dynamic_range=1.0))]
pub fn ssim_map_py<'py>(
    py: Python<'py>,
    img1: PyReadonlyArrayDyn<f64>,
    img2: PyReadonlyArrayDyn<f64>,
    dynamic_range: f64,
) -> PyResult<&'py PyArray4<f64>> {
    let x = as_image(img1.as_array()).map_err(to_py_err)?;
    let y = as_image(img2.as_array()).map_err(to_py_err)?;
    let output = perceptual_core::ssim_map(x, y, dynamic_range).map_err(to_py_err)?;
    Ok(output.to_pyarray(py))
}

/// Multi-scale structural similarity.
#[pyfunction]
#[pyo3(name = "ms_ssim", signature = (img1, img2, dynamic_range=1.0, power_factors=None))]
pub fn ms_ssim_py<'py>(
    py: Python<'py>,
    img1: PyReadonlyArrayDyn<f64>,
    img2: PyReadonlyArrayDyn<f64>,
    dynamic_range: f64,
    power_factors: Option<Vec<f64>>,
) -> PyResult<&'py PyArray2<f64>> {
    let x = as_image(img1.as_array()).map_err(to_py_err)?;
    let y = as_image(img2.as_array()).map_err(to_py_err)?;
    let output = perceptual_core::ms_ssim(x, y, dynamic_range, power_factors.as_deref())
        .map_err(to_py_err)?;
    Ok(output.to_pyarray(py))
}

/// Normalized Laplacian pyramid distance.
///
/// Parameters are read from `params_path`, or from `PERCEPTUAL_TABLES_DIR` when omitted.
#[pyfunction]
#[pyo3(name = "nlpd", signature = (img1, img2, params_path=None))]
pub fn nlpd_py<'py>(
    py: Python<'py>,
    img1: PyReadonlyArrayDyn<f64>,
    img2: PyReadonlyArrayDyn<f64>,
    params_path: Option<&str>,
) -> PyResult<&'py PyArray2<f64>> {
    let params = match params_path {
        Some(path) => NlpdParams::load(Path::new(path)),
        None => NlpdParams::from_env(),
    }
    .map_err(to_py_err)?;
    let x = as_image(img1.as_array()).map_err(to_py_err)?;
    let y = as_image(img2.as_array()).map_err(to_py_err)?;
    let output = perceptual_core::nlpd(x, y, &params).map_err(to_py_err)?;
    Ok(output.to_pyarray(py))
}

/// Normalized steerable pyramid distance.
///
/// Sigmas are read from `sigmas_path`, or from `PERCEPTUAL_TABLES_DIR` when omitted.
#[pyfunction]
#[pyo3(name = "nspd", signature = (img1, img2, sigmas_path=None))]
pub fn nspd_py<'py>(
    py: Python<'py>,
    img1: PyReadonlyArrayDyn<f64>,
    img2: PyReadonlyArrayDyn<f64>,
    sigmas_path: Option<&str>,
) -> PyResult<&'py PyArray2<f64>> {
    let sigmas = match sigmas_path {
        Some(path) => NspdSigmas::load(Path::new(path)),
        None => NspdSigmas::from_env(),
    }
    .map_err(to_py_err)?;
    let x = as_image(img1.as_array()).map_err(to_py_err)?;
    let y = as_image(img2.as_array()).map_err(to_py_err)?;
    let output = perceptual_core::nspd(x, y, &sigmas).map_err(to_py_err)?;
    Ok(output.to_pyarray(py))
}

// =============================================================================
// Steerable pyramid
// =============================================================================

fn parse_level(item: &PyAny) -> PyResult<Level> {
    if let Ok(scale) = item.extract::<usize>() {
        return Ok(Level::Scale(scale));
    }
    match item.extract::<&str>()? {
        "residual_highpass" => Ok(Level::ResidualHighpass),
        "residual_lowpass" => Ok(Level::ResidualLowpass),
        other => Err(PyValueError::new_err(format!("unknown pyramid level '{}'", other))),
    }
}

fn parse_key(item: &PyAny) -> PyResult<PyrKey> {
    if let Ok((scale, orientation)) = item.extract::<(usize, usize)>() {
        return Ok(PyrKey::band(scale, orientation));
    }
    match item.extract::<&str>()? {
        "residual_highpass" => Ok(PyrKey::ResidualHighpass),
        "residual_lowpass" => Ok(PyrKey::ResidualLowpass),
        other => Err(PyValueError::new_err(format!("unknown pyramid key '{}'", other))),
    }
}

fn parse_band(value: &PyAny) -> PyResult<PyrBand<f64>> {
    if let Ok(real) = value.extract::<PyReadonlyArray4<f64>>() {
        return Ok(PyrBand::Real(real.as_array().to_owned()));
    }
    let complex = value.extract::<PyReadonlyArray4<Complex64>>()?;
    Ok(PyrBand::Complex(complex.as_array().to_owned()))
}

/// Frequency-domain steerable pyramid operating on float64 images.
#[pyclass(name = "SteerablePyramid")]
pub struct PySteerablePyramid {
    inner: SteerablePyramid<f64>,
}

#[pymethods]
impl PySteerablePyramid {
    #[new]
    #[pyo3(signature = (
        image_shape,
        height=None,
        order=3,
        twidth=1.0,
        is_complex=false,
        downsample=true,
        tight_frame=false
    ))]
    fn new(
        image_shape: (usize, usize),
        height: Option<usize>,
        order: usize,
        twidth: f64,
        is_complex: bool,
        downsample: bool,
        tight_frame: bool,
    ) -> PyResult<Self> {
        let config = PyramidConfig::new(image_shape)
            .height(height.map_or(Height::Auto, Height::Levels))
            .order(order)
            .twidth(twidth)
            .is_complex(is_complex)
            .downsample(downsample)
            .tight_frame(tight_frame);
        let inner = SteerablePyramid::new(config).map_err(to_py_err)?;
        Ok(Self { inner })
    }

    #[getter]
    fn num_scales(&self) -> usize {
        self.inner.num_scales()
    }

    #[getter]
    fn num_orientations(&self) -> usize {
        self.inner.num_orientations()
    }

    /// Decompose `image`; keys are `(scale, band)` tuples and residual names.
    #[pyo3(signature = (image, scales=None))]
    fn forward<'py>(
        &mut self,
        py: Python<'py>,
        image: PyReadonlyArrayDyn<f64>,
        scales: Option<Vec<&PyAny>>,
    ) -> PyResult<&'py PyDict> {
        let levels = scales
            .unwrap_or_default()
            .into_iter()
            .map(parse_level)
            .collect::<PyResult<Vec<_>>>()?;
        let x = as_image(image.as_array()).map_err(to_py_err)?;
        let coeffs = self.inner.forward(x, &levels).map_err(to_py_err)?;

        let dict = PyDict::new(py);
        for (key, band) in coeffs.iter() {
            let value: PyObject = match band {
                PyrBand::Real(a) => a.to_pyarray(py).to_object(py),
                PyrBand::Complex(a) => a.to_pyarray(py).to_object(py),
            };
            match key {
                PyrKey::Band { scale, orientation } => {
                    dict.set_item((*scale, *orientation), value)?
                }
                residual => dict.set_item(residual.to_string(), value)?,
            }
        }
        Ok(dict)
    }

    /// Reconstruct an image from a coefficient dict produced by `forward`.
    #[pyo3(signature = (pyr_coeffs, levels=None, bands=None, twidth=1.0))]
    fn recon_pyr<'py>(
        &self,
        py: Python<'py>,
        pyr_coeffs: &PyDict,
        levels: Option<Vec<&PyAny>>,
        bands: Option<Vec<usize>>,
        twidth: f64,
    ) -> PyResult<&'py PyArray4<f64>> {
        let coeffs = pyr_coeffs
            .iter()
            .map(|(k, v)| Ok((parse_key(k)?, parse_band(v)?)))
            .collect::<PyResult<PyramidCoeffs<f64>>>()?;
        let levels = match levels {
            Some(items) => Selection::Only(
                items
                    .into_iter()
                    .map(parse_level)
                    .collect::<PyResult<Vec<_>>>()?,
            ),
            None => Selection::All,
        };
        let bands = bands.map_or(Selection::All, Selection::Only);
        let output = self
            .inner
            .recon_pyr(&coeffs, levels, bands, twidth)
            .map_err(to_py_err)?;
        Ok(output.to_pyarray(py))
    }
}

/// Perceptual metrics Rust accelerator module
#[pymodule]
fn perceptual_rust(_py: Python, m: &PyModule) -> PyResult<()> {
    m.add_function(wrap_pyfunction!(ssim_py, m)?)?;
    m.add_function(wrap_pyfunction!(ssim_map_py, m)?)?;
    m.add_function(wrap_pyfunction!(ms_ssim_py, m)?)?;
    m.add_function(wrap_pyfunction!(nlpd_py, m)?)?;
    m.add_function(wrap_pyfunction!(nspd_py, m)?)?;
    m.add_class::<PySteerablePyramid>()?;
    log::debug!("perceptual_rust module initialized");
    Ok(())
}
