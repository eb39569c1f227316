//! # Block Aggregator
//!
//! Given every routed point delivered to one block, evaluates the kernel over
//! the ROW × COLUMN cross-product and emits both directions of each pair.
//!
//! A cross-pair `(row, column)` qualifies only when `column.id > row.id`.
//! Off the diagonal, COLUMN members come from the block's own row of the grid
//! and ROW members from an earlier one, so every pair there qualifies. On the
//! diagonal each point holds both roles and the ordering keeps exactly one of
//! `(a, b)` / `(b, a)` while dropping `(a, a)`.
//!
//! Aggregation is a pure function of its inputs: members are ordered by id
//! before pairing, so rerunning a block reproduces bit-identical output.

use bytes::Bytes;
use tracing::{debug, warn};

use crate::codec;
use crate::kernel::AffinityKernel;
use crate::model::{AffinityResult, BlockKey, Role, RoutedPoint};
use crate::partition::block_coords;
use crate::{Error, Result};

/// Everything one block invocation produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BlockOutput {
    pub key: BlockKey,
    /// Pairs in row-major id order; the two directions of a pair are adjacent.
    pub results: Vec<AffinityResult>,
    pub rows: usize,
    pub columns: usize,
    /// Members dropped because their feature data could not be used.
    pub skipped_points: u64,
    /// Cross-pairs dropped because the kernel rejected their dimensions.
    pub skipped_pairs: u64,
}

impl BlockOutput {
    /// Distinct unordered pairs evaluated.
    pub fn pair_count(&self) -> usize {
        self.results.len() / 2
    }
}

/// Aggregate one block of decoded members.
///
/// Fails only on a delivery error: a member addressed to a different block.
/// Unusable points and mismatched pairs are skipped and counted.
pub fn aggregate(
    key: BlockKey,
    members: &[RoutedPoint],
    kernel: &dyn AffinityKernel,
) -> Result<BlockOutput> {
    aggregate_members(key, members.iter(), 0, kernel)
}

/// Aggregate one block of wire-encoded members.
///
/// Members that fail to decode count as skipped points.
pub fn aggregate_wire(
    key: BlockKey,
    members: &[Bytes],
    kernel: &dyn AffinityKernel,
) -> Result<BlockOutput> {
    let mut decoded = Vec::with_capacity(members.len());
    let mut undecodable = 0u64;
    for bytes in members {
        match codec::decode_routed(bytes) {
            Ok(point) => decoded.push(point),
            Err(e) => {
                warn!(block = %key, error = %e, "skipping undecodable block member");
                undecodable += 1;
            }
        }
    }
    aggregate_members(key, decoded.iter(), undecodable, kernel)
}

fn aggregate_members<'a>(
    key: BlockKey,
    members: impl Iterator<Item = &'a RoutedPoint>,
    skipped_points: u64,
    kernel: &dyn AffinityKernel,
) -> Result<BlockOutput> {
    let mut out = BlockOutput { key, skipped_points, ..Default::default() };
    let mut rows = Vec::new();
    let mut columns = Vec::new();

    for member in members {
        if member.block_key != key {
            return Err(Error::Misrouted { expected: key, got: member.block_key });
        }
        if !member.point.is_well_formed() {
            warn!(
                block = %key,
                point = %member.id(),
                role = member.role.as_str(),
                "skipping point with unusable feature data"
            );
            out.skipped_points += 1;
            continue;
        }
        match member.role {
            Role::Row => rows.push(member),
            Role::Column => columns.push(member),
        }
    }

    rows.sort_by_key(|m| m.id());
    columns.sort_by_key(|m| m.id());
    out.rows = rows.len();
    out.columns = columns.len();

    for row in &rows {
        for column in columns.iter().filter(|c| c.id() > row.id()) {
            match kernel.affinity(row.features(), column.features()) {
                Ok(value) => {
                    let result = AffinityResult::new(row.id(), column.id(), value);
                    out.results.push(result);
                    out.results.push(result.mirrored());
                }
                Err(e @ Error::DimensionMismatch { .. }) => {
                    warn!(
                        block = %key,
                        i = %row.id(),
                        j = %column.id(),
                        error = %e,
                        "skipping pair"
                    );
                    out.skipped_pairs += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    let (grid_row, grid_col) = block_coords(key);
    debug!(
        block = %key,
        grid_row,
        grid_col,
        kernel = kernel.name(),
        rows = out.rows,
        columns = out.columns,
        pairs = out.pair_count(),
        skipped_points = out.skipped_points,
        skipped_pairs = out.skipped_pairs,
        "aggregated block"
    );

    Ok(out)
}
