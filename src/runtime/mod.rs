//! # Execution Runtime
//!
//! The seams between the core algorithm and whatever drives it:
//!
//! - **map side**: [`map_record`] parses one input record and hands every
//!   routing to an [`Emitter`]
//! - **barrier**: the driver groups emissions by `BlockKey`
//! - **reduce side**: the driver calls [`crate::aggregate_wire`] once per block
//!
//! | Driver | Module | Description |
//! |--------|--------|-------------|
//! | `LocalRuntime` | `local` | Rayon thread pool, in-memory shuffle |
//!
//! A distributed driver only needs to provide durable buffering for the
//! emitter and deliver each block's members complete. Losing an emission
//! breaks the one-block-per-pair guarantee and must fail the run.

pub mod local;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{AffinityResult, BlockKey, RoutedPoint};
use crate::partition::BlockParams;
use crate::record::{self, parse_record};
use crate::{Error, Result};

pub use local::{LocalRuntime, ShuffleBuffer};

// ============================================================================
// Map-side emit
// ============================================================================

/// Receives map-side routings.
pub trait Emitter {
    fn emit(&mut self, key: BlockKey, point: RoutedPoint);
}

/// Collects emissions in call order.
#[derive(Debug, Default)]
pub struct VecEmitter {
    pub emitted: Vec<(BlockKey, RoutedPoint)>,
}

impl VecEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.emitted.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emitted.is_empty()
    }
}

impl Emitter for VecEmitter {
    fn emit(&mut self, key: BlockKey, point: RoutedPoint) {
        self.emitted.push((key, point));
    }
}

/// Parse one input record and emit its routings. Returns the emission count.
///
/// Unparsable records and ids outside `[0, v)` fail with `MalformedRecord`
/// before anything is emitted.
pub fn map_record<E>(line: &str, params: &BlockParams, emitter: &mut E) -> Result<usize>
where
    E: Emitter + ?Sized,
{
    let point = parse_record(line)?;
    let assignments = params.assign(point.id).map_err(|_| Error::MalformedRecord {
        line: line.to_string(),
        reason: format!("point id {} outside [0, {})", point.id, params.dataset_size()),
    })?;

    for (key, role) in &assignments {
        emitter.emit(*key, point.route_to(*key, *role));
    }
    Ok(assignments.len())
}

// ============================================================================
// Run report
// ============================================================================

/// Aggregate counters for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunStats {
    /// Non-blank input records seen.
    pub records: u64,
    /// Records skipped at parse or assignment time.
    pub malformed_records: u64,
    /// Routings emitted by the map phase.
    pub emissions: u64,
    /// Blocks that received at least one member.
    pub blocks: u64,
    /// Distinct unordered pairs evaluated.
    pub pairs: u64,
    /// Affinity results emitted (two per pair).
    pub results: u64,
    /// Block members skipped for unusable feature data.
    pub skipped_points: u64,
    /// Cross-pairs skipped for mismatched dimensions.
    pub skipped_pairs: u64,
}

impl RunStats {
    pub fn has_skips(&self) -> bool {
        self.malformed_records > 0 || self.skipped_points > 0 || self.skipped_pairs > 0
    }
}

/// Everything a completed run produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunReport {
    pub results: Vec<AffinityResult>,
    pub stats: RunStats,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn elapsed_ms(&self) -> i64 {
        (self.finished_at - self.started_at).num_milliseconds()
    }

    /// Write one `(<i>, <j>)\t<value>` line per result.
    pub fn write_results(&self, writer: &mut dyn std::io::Write) -> Result<()> {
        for result in &self.results {
            writeln!(writer, "{}", record::format_result(result))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PointId, Role};
    use pretty_assertions::assert_eq;

    #[test]
    fn map_record_emits_every_assignment() {
        let params = BlockParams::new(4, 2).unwrap();
        let mut sink = VecEmitter::new();
        let n = map_record("3\t1,1", &params, &mut sink).unwrap();

        assert_eq!(n, 3);
        let routed: Vec<(u64, Role)> = sink.emitted.iter().map(|(k, p)| (k.0, p.role)).collect();
        assert_eq!(routed, vec![(1, Role::Column), (2, Role::Column), (2, Role::Row)]);
        assert!(sink.emitted.iter().all(|(k, p)| *k == p.block_key && p.id() == PointId(3)));
    }

    #[test]
    fn map_record_malformed_emits_nothing() {
        let params = BlockParams::new(4, 2).unwrap();
        let mut sink = VecEmitter::new();
        let err = map_record("2\t1,x", &params, &mut sink).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { .. }));
        assert!(sink.is_empty());
    }

    #[test]
    fn map_record_out_of_range_id_is_malformed() {
        let params = BlockParams::new(4, 2).unwrap();
        let mut sink = VecEmitter::new();
        let err = map_record("4\t1,1", &params, &mut sink).unwrap_err();
        assert!(matches!(err, Error::MalformedRecord { .. }));
        assert!(!err.is_fatal());
        assert!(sink.is_empty());
    }

    #[test]
    fn report_writes_records() {
        let now = Utc::now();
        let report = RunReport {
            results: vec![
                AffinityResult::new(PointId(0), PointId(1), 0.5),
                AffinityResult::new(PointId(1), PointId(0), 0.5),
            ],
            stats: RunStats::default(),
            started_at: now,
            finished_at: now,
        };
        let mut buf = Vec::new();
        report.write_results(&mut buf).unwrap();
        assert_eq!(String::from_utf8(buf).unwrap(), "(0, 1)\t0.5\n(1, 0)\t0.5\n");
        assert_eq!(report.elapsed_ms(), 0);
    }

    #[test]
    fn stats_skip_detection() {
        assert!(!RunStats::default().has_skips());
        assert!(RunStats { malformed_records: 1, ..Default::default() }.has_skips());
        assert!(RunStats { skipped_pairs: 2, ..Default::default() }.has_skips());
    }
}
