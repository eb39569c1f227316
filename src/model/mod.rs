//! # Affinity Data Model
//!
//! Plain DTOs that cross every stage of the pipeline:
//! record parsing → block assignment → shuffle → aggregation → output.
//!
//! Design rule: this module is pure data. No I/O, no kernels, no routing
//! arithmetic. Nothing here is mutated once constructed; a point entering a
//! new block is copied with a fresh role and key.

pub mod point;
pub mod affinity;

use serde::{Deserialize, Serialize};

pub use point::{Point, PointId, Role, RoutedPoint};
pub use affinity::AffinityResult;

/// Dense identifier of one lower-triangular cell of the block grid.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct BlockKey(pub u64);

impl std::fmt::Display for BlockKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
