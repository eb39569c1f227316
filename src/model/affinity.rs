//! Affinity results produced by block aggregation.

use serde::{Deserialize, Serialize};

use super::PointId;

/// One directed entry of the symmetric affinity matrix.
///
/// Every qualifying pair yields two of these, `(i, j)` and `(j, i)`, so that
/// each row's neighbours can be read back independently downstream.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AffinityResult {
    pub i: PointId,
    pub j: PointId,
    pub value: f64,
}

impl AffinityResult {
    pub fn new(i: PointId, j: PointId, value: f64) -> Self {
        Self { i, j, value }
    }

    /// The transposed entry carrying the same value.
    pub fn mirrored(&self) -> Self {
        Self {
            i: self.j,
            j: self.i,
            value: self.value,
        }
    }

    /// Unordered pair key, smaller id first.
    pub fn pair(&self) -> (PointId, PointId) {
        if self.i <= self.j { (self.i, self.j) } else { (self.j, self.i) }
    }
}

/// Output record form: `(<i>, <j>)\t<value>`.
impl std::fmt::Display for AffinityResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})\t{}", self.i, self.j, self.value)
    }
}
