//! # Block Assignment
//!
//! Decides which blocks a point must visit so that every unordered pair
//! `(i, j)`, `i ≠ j`, meets in exactly one block.
//!
//! ```text
//!            block-col J →
//!          ┌─────┬─────┬─────┐
//!   row 0  │ 0,0 │     │     │      key(I, J) = I(I+1)/2 + J
//!          ├─────┼─────┼─────┤
//!   row 1  │ 1,0 │ 1,1 │     │      only J ≤ I is materialized
//!          ├─────┼─────┼─────┤
//!   row 2  │ 2,0 │ 2,1 │ 2,2 │
//!          └─────┴─────┴─────┘
//! ```
//!
//! A point in block-row `I` is sent:
//!
//! - as **COLUMN** into `(I, J)` for `J = 0..=I` (across its row, up to the diagonal)
//! - as **ROW** into `(K, I)` for `K = I..h` (down its column, from the diagonal)
//!
//! For `i` in block-row `a` and `j` in block-row `b ≥ a`, the only block where
//! one of them is a ROW and the other a COLUMN is `(b, a)`: `j` arrives as
//! COLUMN, `i` as ROW. On the diagonal both points carry both roles and the
//! aggregator keeps one ordering.

use smallvec::SmallVec;

use crate::model::{BlockKey, Point, PointId, Role, RoutedPoint};
use crate::{Error, Result};

/// Routings produced for one point. `h + 1` entries; the diagonal block
/// appears twice, once per role.
pub type Assignments = SmallVec<[(BlockKey, Role); 8]>;

/// Run-wide partition parameters. Must be identical for every assignment
/// within one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockParams {
    dataset_size: u64,
    blocking_factor: u64,
    edge_length: u64,
}

impl BlockParams {
    /// Validate `v` (dataset size) and `h` (blocking factor).
    ///
    /// Requires `v ≥ 1` and `1 ≤ h ≤ v`.
    pub fn new(dataset_size: u64, blocking_factor: u64) -> Result<Self> {
        if dataset_size == 0 {
            return Err(Error::InvalidParameter {
                name: "v",
                reason: "dataset size must be at least 1".into(),
            });
        }
        if blocking_factor == 0 {
            return Err(Error::InvalidParameter {
                name: "h",
                reason: "blocking factor must be at least 1".into(),
            });
        }
        if blocking_factor > dataset_size {
            return Err(Error::InvalidParameter {
                name: "h",
                reason: format!(
                    "blocking factor ({blocking_factor}) exceeds dataset size ({dataset_size})"
                ),
            });
        }
        // Largest key is h(h+1)/2 - 1; it must fit in a u64.
        if blocking_factor
            .checked_add(1)
            .and_then(|n| n.checked_mul(blocking_factor))
            .is_none()
        {
            return Err(Error::InvalidParameter {
                name: "h",
                reason: format!("blocking factor ({blocking_factor}) overflows the block key space"),
            });
        }

        Ok(Self {
            dataset_size,
            blocking_factor,
            edge_length: dataset_size.div_ceil(blocking_factor),
        })
    }

    pub fn dataset_size(&self) -> u64 {
        self.dataset_size
    }

    pub fn blocking_factor(&self) -> u64 {
        self.blocking_factor
    }

    /// `ceil(v / h)`: point ids covered by one block side.
    pub fn edge_length(&self) -> u64 {
        self.edge_length
    }

    /// Number of lower-triangular blocks, `h(h+1)/2`.
    pub fn block_count(&self) -> u64 {
        self.blocking_factor * (self.blocking_factor + 1) / 2
    }

    /// Upper bound on members delivered to one block: a full edge of
    /// COLUMN representatives plus a full edge of ROW representatives.
    pub fn max_block_members(&self) -> u64 {
        2 * self.edge_length
    }

    /// Block-rows that actually contain points. When `ceil(v/h)` rounds up
    /// hard, trailing rows stay empty and their blocks never produce pairs.
    pub fn populated_rows(&self) -> u64 {
        self.dataset_size.div_ceil(self.edge_length)
    }

    /// Block-row (equivalently block-column) of a point.
    pub fn block_row(&self, id: PointId) -> Result<u64> {
        self.check_id(id)?;
        Ok(id.0 / self.edge_length)
    }

    /// Compute every `(block, role)` the point must be routed to.
    pub fn assign(&self, id: PointId) -> Result<Assignments> {
        let row = self.block_row(id)?;
        let mut out = Assignments::with_capacity(self.blocking_factor as usize + 1);

        for col in 0..=row {
            out.push((block_key(row, col), Role::Column));
        }
        for below in row..self.blocking_factor {
            out.push((block_key(below, row), Role::Row));
        }

        Ok(out)
    }

    /// Materialize the routed copies of a point.
    pub fn route(&self, point: &Point) -> Result<Vec<RoutedPoint>> {
        Ok(self
            .assign(point.id)?
            .into_iter()
            .map(|(key, role)| point.route_to(key, role))
            .collect())
    }

    fn check_id(&self, id: PointId) -> Result<()> {
        if id.0 >= self.dataset_size {
            return Err(Error::InvalidParameter {
                name: "id",
                reason: format!("point id {} outside [0, {})", id, self.dataset_size),
            });
        }
        Ok(())
    }
}

/// Triangular-number key of block `(row, col)`, `col ≤ row`.
pub fn block_key(row: u64, col: u64) -> BlockKey {
    debug_assert!(col <= row, "block ({row}, {col}) is above the diagonal");
    BlockKey(row * (row + 1) / 2 + col)
}

/// Inverse of [`block_key`]: recover `(row, col)`.
pub fn block_coords(key: BlockKey) -> (u64, u64) {
    let k = key.0;
    // Float estimate, then correct for rounding at large k.
    let mut row = ((((8 * k as u128 + 1) as f64).sqrt() - 1.0) / 2.0) as u64;
    while row * (row + 1) / 2 > k {
        row -= 1;
    }
    while (row + 1) * (row + 2) / 2 <= k {
        row += 1;
    }
    (row, k - row * (row + 1) / 2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn rejects_bad_parameters() {
        assert!(matches!(BlockParams::new(0, 1), Err(Error::InvalidParameter { name: "v", .. })));
        assert!(matches!(BlockParams::new(4, 0), Err(Error::InvalidParameter { name: "h", .. })));
        assert!(matches!(BlockParams::new(4, 5), Err(Error::InvalidParameter { name: "h", .. })));
        assert!(BlockParams::new(4, 4).is_ok());
        assert!(BlockParams::new(1, 1).is_ok());
    }

    #[test]
    fn edge_length_rounds_up() {
        assert_eq!(BlockParams::new(4, 2).unwrap().edge_length(), 2);
        assert_eq!(BlockParams::new(5, 2).unwrap().edge_length(), 3);
        assert_eq!(BlockParams::new(10, 3).unwrap().edge_length(), 4);
        assert_eq!(BlockParams::new(7, 7).unwrap().edge_length(), 1);
    }

    #[test]
    fn block_key_is_dense_and_invertible() {
        let mut expected = 0;
        for row in 0..50 {
            for col in 0..=row {
                let key = block_key(row, col);
                assert_eq!(key, BlockKey(expected));
                assert_eq!(block_coords(key), (row, col));
                expected += 1;
            }
        }
    }

    #[test]
    fn block_coords_survives_large_keys() {
        let row = 3_000_000_000u64;
        let key = block_key(row, row - 1);
        assert_eq!(block_coords(key), (row, row - 1));
    }

    #[test]
    fn assign_v4_h2() {
        let params = BlockParams::new(4, 2).unwrap();

        // Block-row 0: COLUMN into (0,0); ROW into (0,0), (1,0).
        let a0 = params.assign(PointId(0)).unwrap();
        assert_eq!(
            a0.as_slice(),
            &[
                (BlockKey(0), Role::Column),
                (BlockKey(0), Role::Row),
                (BlockKey(1), Role::Row),
            ]
        );

        // Block-row 1: COLUMN into (1,0), (1,1); ROW into (1,1).
        let a3 = params.assign(PointId(3)).unwrap();
        assert_eq!(
            a3.as_slice(),
            &[
                (BlockKey(1), Role::Column),
                (BlockKey(2), Role::Column),
                (BlockKey(2), Role::Row),
            ]
        );
    }

    #[test]
    fn every_point_gets_h_plus_one_routings() {
        let params = BlockParams::new(23, 5).unwrap();
        for id in 0..23 {
            let a = params.assign(PointId(id)).unwrap();
            assert_eq!(a.len(), 6);
            assert!(a.iter().all(|(k, _)| k.0 < params.block_count()));
        }
    }

    #[test]
    fn assign_rejects_out_of_range_id() {
        let params = BlockParams::new(4, 2).unwrap();
        assert!(matches!(
            params.assign(PointId(4)),
            Err(Error::InvalidParameter { name: "id", .. })
        ));
    }

    #[test]
    fn trailing_rows_can_be_empty() {
        // edge = 2, ids 0..5 fill rows 0,1,2; row 3 has no points.
        let params = BlockParams::new(5, 4).unwrap();
        assert_eq!(params.populated_rows(), 3);
        let rows: Vec<u64> = (0..5).map(|i| params.block_row(PointId(i)).unwrap()).collect();
        assert_eq!(rows, vec![0, 0, 1, 1, 2]);
    }

    #[test]
    fn route_carries_features_into_every_block() {
        let params = BlockParams::new(6, 3).unwrap();
        let p = Point::new(3u64, vec![0.5, -1.5]);
        let routed = params.route(&p).unwrap();
        assert_eq!(routed.len(), 4);
        assert!(routed.iter().all(|r| r.point == p));
    }
}
