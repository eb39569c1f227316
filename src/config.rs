//! Job configuration.
//!
//! `v` and `h` are fixed for the whole run; every assignment must see the
//! same values or the one-block-per-pair guarantee no longer holds.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::kernel::{DEFAULT_SIGMA, GaussianKernel};
use crate::partition::BlockParams;
use crate::{Error, Result};

/// Property key carrying the blocking factor `h`.
pub const BLOCKING_FACTOR_KEY: &str = "squinn.blocking.factor";

/// Property key carrying the dataset size `v`.
pub const DATASET_SIZE_KEY: &str = "squinn.dataset.size";

/// Blocking factor used when a property set omits it.
pub const DEFAULT_BLOCKING_FACTOR: u64 = 100;

/// Parameters for one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobConfig {
    /// `v`: number of points; ids span `[0, v)`.
    pub dataset_size: u64,
    /// `h`: blocks per side of the pair grid.
    pub blocking_factor: u64,
    /// Gaussian kernel bandwidth.
    #[serde(default = "default_sigma")]
    pub sigma: f64,
    /// Worker threads for the local runtime; `None` uses every core.
    #[serde(default)]
    pub threads: Option<usize>,
}

fn default_sigma() -> f64 {
    DEFAULT_SIGMA
}

impl JobConfig {
    pub fn new(dataset_size: u64, blocking_factor: u64) -> Self {
        Self {
            dataset_size,
            blocking_factor,
            sigma: DEFAULT_SIGMA,
            threads: None,
        }
    }

    pub fn with_sigma(mut self, sigma: f64) -> Self {
        self.sigma = sigma;
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Build from a flat job property set, as a cluster scheduler would
    /// hand it over. `h` falls back to [`DEFAULT_BLOCKING_FACTOR`]; `v` is
    /// required.
    pub fn from_properties(props: &HashMap<String, String>) -> Result<Self> {
        let dataset_size = match props.get(DATASET_SIZE_KEY) {
            Some(raw) => parse_property(DATASET_SIZE_KEY, raw)?,
            None => return Err(Error::Config(format!("missing property {DATASET_SIZE_KEY}"))),
        };
        let blocking_factor = match props.get(BLOCKING_FACTOR_KEY) {
            Some(raw) => parse_property(BLOCKING_FACTOR_KEY, raw)?,
            None => DEFAULT_BLOCKING_FACTOR,
        };
        Ok(Self::new(dataset_size, blocking_factor))
    }

    /// Flatten `v` and `h` back into job properties.
    pub fn to_properties(&self) -> HashMap<String, String> {
        HashMap::from([
            (DATASET_SIZE_KEY.to_string(), self.dataset_size.to_string()),
            (BLOCKING_FACTOR_KEY.to_string(), self.blocking_factor.to_string()),
        ])
    }

    /// Check every parameter and build the partition and kernel.
    pub fn validate(&self) -> Result<(BlockParams, GaussianKernel)> {
        let params = BlockParams::new(self.dataset_size, self.blocking_factor)?;
        let kernel = GaussianKernel::new(self.sigma)?;
        if self.threads == Some(0) {
            return Err(Error::InvalidParameter {
                name: "threads",
                reason: "worker count must be at least 1".into(),
            });
        }
        Ok((params, kernel))
    }
}

/// Partial job file layered over a base configuration.
///
/// Every field is optional. `dataset_size` and `blocking_factor` may be
/// present but must then agree with the base; sigma and threads replace it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct JobOverrides {
    pub dataset_size: Option<u64>,
    pub blocking_factor: Option<u64>,
    pub sigma: Option<f64>,
    pub threads: Option<usize>,
}

impl JobOverrides {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Layer these values over `base`. A `v` or `h` that disagrees with the
    /// base is a `Config` error.
    pub fn apply_to(&self, mut base: JobConfig) -> Result<JobConfig> {
        check_agrees("dataset_size", self.dataset_size, base.dataset_size)?;
        check_agrees("blocking_factor", self.blocking_factor, base.blocking_factor)?;
        if let Some(sigma) = self.sigma {
            base.sigma = sigma;
        }
        if let Some(threads) = self.threads {
            base.threads = Some(threads);
        }
        Ok(base)
    }
}

fn check_agrees(field: &str, file: Option<u64>, base: u64) -> Result<()> {
    match file {
        Some(value) if value != base => Err(Error::Config(format!(
            "job file sets {field} = {value} but the run uses {base}"
        ))),
        _ => Ok(()),
    }
}

fn parse_property(key: &str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse()
        .map_err(|_| Error::Config(format!("property {key} is not a non-negative integer: {raw:?}")))
}
