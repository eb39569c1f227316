//! # Affinity Kernels
//!
//! Aggregation depends only on [`AffinityKernel`]; the Gaussian kernel is the
//! default policy.
//!
//! Sign convention: affinities **decay** with distance. Identical points score
//! `1.0` and the score falls toward `0.0` as they move apart. Every kernel in a
//! run must follow the same convention.

use crate::{Error, Result};

/// Default Gaussian bandwidth.
pub const DEFAULT_SIGMA: f64 = 1.0;

/// Symmetric similarity between two feature vectors.
pub trait AffinityKernel: Send + Sync {
    /// Score `a` against `b`.
    ///
    /// Fails with `DimensionMismatch` unless `a.len() == b.len() >= 1`.
    fn affinity(&self, a: &[f64], b: &[f64]) -> Result<f64>;

    /// Short name for logs.
    fn name(&self) -> &'static str;
}

/// `exp(-d / (2σ²))` over Euclidean distance `d`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GaussianKernel {
    sigma: f64,
}

impl GaussianKernel {
    pub fn new(sigma: f64) -> Result<Self> {
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(Error::InvalidParameter {
                name: "sigma",
                reason: format!("bandwidth must be positive and finite, got {sigma}"),
            });
        }
        Ok(Self { sigma })
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl Default for GaussianKernel {
    fn default() -> Self {
        Self { sigma: DEFAULT_SIGMA }
    }
}

impl AffinityKernel for GaussianKernel {
    fn affinity(&self, a: &[f64], b: &[f64]) -> Result<f64> {
        let d = euclidean_distance(a, b)?;
        Ok((-d / (2.0 * self.sigma * self.sigma)).exp())
    }

    fn name(&self) -> &'static str {
        "gaussian"
    }
}

/// Euclidean (L2) distance.
pub fn euclidean_distance(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() || a.is_empty() {
        return Err(Error::DimensionMismatch { left: a.len(), right: b.len() });
    }
    let sum: f64 = a.iter().zip(b).map(|(x, y)| (x - y) * (x - y)).sum();
    Ok(sum.sqrt())
}
