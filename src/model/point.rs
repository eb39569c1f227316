//! Points and their routed copies.

use serde::{Deserialize, Serialize};

use super::BlockKey;

/// Dataset-wide point identifier, `0 <= id < v`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PointId(pub u64);

impl std::fmt::Display for PointId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Side of the cross-product a point occupies inside one block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Routed down its own block-column, from the diagonal to the last block-row.
    Row,
    /// Routed across its own block-row, up to and including the diagonal.
    Column,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::Row => "ROW",
            Role::Column => "COLUMN",
        }
    }
}

/// One input record: identity plus feature vector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub id: PointId,
    pub features: Vec<f64>,
}

impl Point {
    pub fn new(id: impl Into<PointId>, features: impl Into<Vec<f64>>) -> Self {
        Self {
            id: id.into(),
            features: features.into(),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.features.len()
    }

    /// A point the kernel can evaluate: non-empty and every component finite.
    pub fn is_well_formed(&self) -> bool {
        !self.features.is_empty() && self.features.iter().all(|f| f.is_finite())
    }

    /// Copy this point into a block under the given role.
    pub fn route_to(&self, block_key: BlockKey, role: Role) -> RoutedPoint {
        RoutedPoint {
            point: self.clone(),
            role,
            block_key,
        }
    }
}

impl From<u64> for PointId {
    fn from(id: u64) -> Self {
        PointId(id)
    }
}

/// A point addressed to one block under one role.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedPoint {
    pub point: Point,
    pub role: Role,
    pub block_key: BlockKey,
}

impl RoutedPoint {
    pub fn id(&self) -> PointId {
        self.point.id
    }

    pub fn features(&self) -> &[f64] {
        &self.point.features
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn route_to_copies_without_touching_the_source() {
        let p = Point::new(7u64, vec![1.0, 2.0]);
        let r = p.route_to(BlockKey(3), Role::Column);
        assert_eq!(r.id(), PointId(7));
        assert_eq!(r.block_key, BlockKey(3));
        assert_eq!(r.role, Role::Column);
        assert_eq!(r.features(), p.features.as_slice());
    }

    #[test]
    fn well_formed_rejects_empty_and_non_finite() {
        assert!(Point::new(0u64, vec![0.5]).is_well_formed());
        assert!(!Point::new(0u64, Vec::new()).is_well_formed());
        assert!(!Point::new(0u64, vec![1.0, f64::NAN]).is_well_formed());
        assert!(!Point::new(0u64, vec![f64::INFINITY]).is_well_formed());
    }
}
