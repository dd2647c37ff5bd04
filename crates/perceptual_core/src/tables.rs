//! Pre-optimized normalization parameters for NLPD and NSPD.
//!
//! The values are fitted offline and shipped as JSON files. They are loaded
//! explicitly, either from a path or from the directory named by
//! `PERCEPTUAL_TABLES_DIR`; callers may also construct them directly.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{PyramidError, Result};
use crate::pyramid::PyrKey;

/// Directory holding the lookup tables.
pub const TABLES_DIR_ENV: &str = "PERCEPTUAL_TABLES_DIR";

pub const NLPD_PARAMS_FILE: &str = "nlpd_params.json";
pub const NSPD_SIGMAS_FILE: &str = "nspd_sigmas.json";

/// Number of Laplacian scales the NLPD parameters are fitted for.
pub const NLPD_SCALES: usize = 6;

/// Side length of the NLPD spatial pooling filters.
pub const NLPD_FILTER_SIZE: usize = 5;

fn tables_dir() -> Result<PathBuf> {
    std::env::var(TABLES_DIR_ENV)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .ok_or_else(|| PyramidError::InvalidTable(format!("{} is not set", TABLES_DIR_ENV)))
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let data = fs::read_to_string(path).map_err(|source| PyramidError::TableIo {
        path: path.display().to_string(),
        source,
    })?;
    serde_json::from_str(&data).map_err(|source| PyramidError::TableParse {
        path: path.display().to_string(),
        source,
    })
}

// =============================================================================
// NLPD
// =============================================================================

#[derive(Debug, Deserialize, Serialize)]
struct NlpdParamsFile {
    filters: Vec<Vec<Vec<f64>>>,
    sigmas: Vec<f64>,
}

/// Per-scale pooling filters and additive constants of the normalized
/// Laplacian pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct NlpdParams {
    filters: Vec<Array2<f64>>,
    sigmas: Vec<f64>,
}

impl NlpdParams {
    /// One `5 x 5` filter and one sigma per scale, six scales.
    pub fn new(filters: Vec<Array2<f64>>, sigmas: Vec<f64>) -> Result<Self> {
        if filters.len() != NLPD_SCALES || sigmas.len() != NLPD_SCALES {
            return Err(PyramidError::InvalidTable(format!(
                "NLPD needs {} filters and sigmas, got {} and {}",
                NLPD_SCALES,
                filters.len(),
                sigmas.len()
            )));
        }
        if let Some(f) = filters
            .iter()
            .find(|f| f.dim() != (NLPD_FILTER_SIZE, NLPD_FILTER_SIZE))
        {
            return Err(PyramidError::InvalidTable(format!(
                "NLPD filters must be {}x{}, got {:?}",
                NLPD_FILTER_SIZE,
                NLPD_FILTER_SIZE,
                f.dim()
            )));
        }
        Ok(Self { filters, sigmas })
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file: NlpdParamsFile = read_json(path)?;
        let filters = file
            .filters
            .into_iter()
            .map(|rows| {
                let n_rows = rows.len();
                let n_cols = rows.first().map_or(0, |r| r.len());
                if rows.iter().any(|r| r.len() != n_cols) {
                    return Err(PyramidError::InvalidTable(format!(
                        "ragged NLPD filter in {}",
                        path.display()
                    )));
                }
                let flat: Vec<f64> = rows.into_iter().flatten().collect();
                Array2::from_shape_vec((n_rows, n_cols), flat)
                    .map_err(|e| PyramidError::InvalidTable(e.to_string()))
            })
            .collect::<Result<Vec<_>>>()?;
        log::debug!("loaded NLPD parameters from {}", path.display());
        Self::new(filters, file.sigmas)
    }

    /// Load `nlpd_params.json` from `PERCEPTUAL_TABLES_DIR`.
    pub fn from_env() -> Result<Self> {
        Self::load(&tables_dir()?.join(NLPD_PARAMS_FILE))
    }

    pub fn filters(&self) -> &[Array2<f64>] {
        &self.filters
    }

    pub fn sigmas(&self) -> &[f64] {
        &self.sigmas
    }
}

// =============================================================================
// NSPD
// =============================================================================

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct SigmaEntry {
    pub scale: usize,
    pub orientation: usize,
    pub sigma: f64,
}

#[derive(Debug, Deserialize, Serialize)]
struct NspdSigmasFile {
    entries: Vec<SigmaEntry>,
}

/// Gain-control epsilon of every oriented band of the NSPD pyramid.
#[derive(Debug, Clone, PartialEq)]
pub struct NspdSigmas {
    sigmas: BTreeMap<PyrKey, f64>,
}

impl NspdSigmas {
    pub fn from_entries(entries: &[SigmaEntry]) -> Result<Self> {
        let mut sigmas = BTreeMap::new();
        for e in entries {
            if !(e.sigma.is_finite() && e.sigma >= 0.0) {
                return Err(PyramidError::InvalidTable(format!(
                    "sigma of band ({}, {}) must be finite and non-negative, got {}",
                    e.scale, e.orientation, e.sigma
                )));
            }
            sigmas.insert(PyrKey::band(e.scale, e.orientation), e.sigma);
        }
        Ok(Self { sigmas })
    }

    /// The same `sigma` for every band of a `num_scales x num_orientations` pyramid.
    pub fn uniform(num_scales: usize, num_orientations: usize, sigma: f64) -> Self {
        let sigmas = (0..num_scales)
            .flat_map(|s| (0..num_orientations).map(move |b| (PyrKey::band(s, b), sigma)))
            .collect();
        Self { sigmas }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let file: NspdSigmasFile = read_json(path)?;
        log::debug!(
            "loaded {} NSPD sigmas from {}",
            file.entries.len(),
            path.display()
        );
        Self::from_entries(&file.entries)
    }

    /// Load `nspd_sigmas.json` from `PERCEPTUAL_TABLES_DIR`.
    pub fn from_env() -> Result<Self> {
        Self::load(&tables_dir()?.join(NSPD_SIGMAS_FILE))
    }

    pub fn get(&self, key: &PyrKey) -> Result<f64> {
        self.sigmas
            .get(key)
            .copied()
            .ok_or(PyramidError::MissingKey(*key))
    }

    pub fn len(&self) -> usize {
        self.sigmas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sigmas.is_empty()
    }
}
