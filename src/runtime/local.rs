//! In-process runtime.
//!
//! Runs both phases on a rayon thread pool with an in-memory shuffle.
//! Emissions are encoded through the point codec before they are grouped,
//! exactly as they would cross the network between map and reduce workers.
//!
//! ## Limitations
//!
//! - **Whole input in memory**: records and the shuffle buffer are held in
//!   RAM. Use a distributed driver for datasets that do not fit.
//! - **One lock per record**: map workers flush a record's routings into the
//!   shared shuffle under a single `parking_lot::Mutex`.
//! - **Unique ids**: the shuffle remembers every point id it has accepted; a
//!   second record with the same id fails the run with `DuplicatePoint`.

use std::io::BufRead;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use hashbrown::{HashMap, HashSet};
use parking_lot::Mutex;
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::aggregate::{BlockOutput, aggregate_wire};
use crate::codec::Encode;
use crate::config::JobConfig;
use crate::kernel::AffinityKernel;
use crate::model::{BlockKey, PointId};
use crate::partition::BlockParams;
use crate::{Error, Result};
use super::{RunReport, RunStats, VecEmitter, map_record};

// ============================================================================
// ShuffleBuffer
// ============================================================================

/// Group-by-key barrier between the map and reduce phases.
#[derive(Debug, Default)]
pub struct ShuffleBuffer {
    inner: Mutex<ShuffleInner>,
}

#[derive(Debug, Default)]
struct ShuffleInner {
    blocks: HashMap<BlockKey, Vec<Bytes>>,
    /// Point ids already accepted.
    seen: HashSet<PointId>,
}

impl ShuffleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move one record's routings into their blocks.
    ///
    /// All routings must belong to one point. A point id already absorbed
    /// is rejected with `DuplicatePoint` and nothing is added.
    pub fn absorb(&self, emitter: VecEmitter) -> Result<()> {
        let Some(id) = emitter.emitted.first().map(|(_, point)| point.id()) else {
            return Ok(());
        };
        let encoded = emitter
            .emitted
            .iter()
            .map(|(key, point)| Ok((*key, point.to_bytes()?)))
            .collect::<Result<Vec<_>>>()?;

        let mut inner = self.inner.lock();
        if !inner.seen.insert(id) {
            return Err(Error::DuplicatePoint { id });
        }
        for (key, bytes) in encoded {
            inner.blocks.entry(key).or_default().push(bytes);
        }
        Ok(())
    }

    /// Distinct point ids absorbed so far.
    pub fn point_count(&self) -> usize {
        self.inner.lock().seen.len()
    }

    /// Close the barrier: every block with its complete member list, in key order.
    pub fn into_blocks(self) -> Vec<(BlockKey, Vec<Bytes>)> {
        let mut blocks: Vec<_> = self.inner.into_inner().blocks.into_iter().collect();
        blocks.sort_unstable_by_key(|(key, _)| *key);
        blocks
    }
}

// ============================================================================
// LocalRuntime
// ============================================================================

/// Drives a full run on the local machine.
pub struct LocalRuntime {
    params: BlockParams,
    kernel: Arc<dyn AffinityKernel>,
    pool: rayon::ThreadPool,
}

#[derive(Debug, Default, Clone, Copy)]
struct MapCounts {
    records: u64,
    malformed: u64,
    emissions: u64,
}

impl MapCounts {
    fn merge(self, other: Self) -> Self {
        Self {
            records: self.records + other.records,
            malformed: self.malformed + other.malformed,
            emissions: self.emissions + other.emissions,
        }
    }
}

impl LocalRuntime {
    /// Validate the configuration and start the worker pool.
    ///
    /// Parameter errors surface here, before any record is read.
    pub fn new(config: JobConfig) -> Result<Self> {
        let (params, kernel) = config.validate()?;

        let mut builder = rayon::ThreadPoolBuilder::new()
            .thread_name(|i| format!("affinity-worker-{i}"));
        if let Some(threads) = config.threads {
            builder = builder.num_threads(threads);
        }
        let pool = builder
            .build()
            .map_err(|e| Error::Config(format!("failed to start worker pool: {e}")))?;

        Ok(Self {
            params,
            kernel: Arc::new(kernel),
            pool,
        })
    }

    /// Replace the default Gaussian kernel.
    pub fn with_kernel(mut self, kernel: impl AffinityKernel + 'static) -> Self {
        self.kernel = Arc::new(kernel);
        self
    }

    pub fn params(&self) -> &BlockParams {
        &self.params
    }

    /// Run the pipeline over text records. Blank lines are ignored.
    pub fn run<I, S>(&self, lines: I) -> Result<RunReport>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str> + Sync,
    {
        let lines: Vec<S> = lines.into_iter().collect();
        let started_at = Utc::now();
        info!(
            v = self.params.dataset_size(),
            h = self.params.blocking_factor(),
            edge_length = self.params.edge_length(),
            blocks = self.params.block_count(),
            populated_rows = self.params.populated_rows(),
            max_block_members = self.params.max_block_members(),
            kernel = self.kernel.name(),
            records = lines.len(),
            "starting affinity run"
        );

        // Map phase
        let shuffle = ShuffleBuffer::new();
        let map_counts = self.pool.install(|| {
            lines
                .par_iter()
                .map(|line| line.as_ref())
                .filter(|line| !line.trim().is_empty())
                .map(|line| self.map_one(line, &shuffle))
                .try_reduce(MapCounts::default, |a, b| Ok(a.merge(b)))
        })?;

        // Barrier
        debug!(points = shuffle.point_count(), "map phase complete");
        let blocks = shuffle.into_blocks();

        // Reduce phase
        let kernel = self.kernel.as_ref();
        let outputs: Vec<BlockOutput> = self.pool.install(|| {
            blocks
                .par_iter()
                .map(|(key, members)| aggregate_wire(*key, members, kernel))
                .collect::<Result<Vec<_>>>()
        })?;

        let mut stats = RunStats {
            records: map_counts.records,
            malformed_records: map_counts.malformed,
            emissions: map_counts.emissions,
            blocks: outputs.len() as u64,
            ..Default::default()
        };
        let mut results = Vec::with_capacity(outputs.iter().map(|o| o.results.len()).sum());
        for output in outputs {
            stats.pairs += output.pair_count() as u64;
            stats.skipped_points += output.skipped_points;
            stats.skipped_pairs += output.skipped_pairs;
            results.extend(output.results);
        }
        stats.results = results.len() as u64;

        let finished_at = Utc::now();
        info!(
            records = stats.records,
            blocks = stats.blocks,
            pairs = stats.pairs,
            results = stats.results,
            malformed_records = stats.malformed_records,
            skipped_points = stats.skipped_points,
            skipped_pairs = stats.skipped_pairs,
            elapsed_ms = (finished_at - started_at).num_milliseconds(),
            "affinity run complete"
        );

        Ok(RunReport { results, stats, started_at, finished_at })
    }

    /// Read every line from `reader` and run.
    pub fn run_reader(&self, reader: impl BufRead) -> Result<RunReport> {
        let lines = reader.lines().collect::<std::io::Result<Vec<String>>>()?;
        self.run(lines)
    }

    fn map_one(&self, line: &str, shuffle: &ShuffleBuffer) -> Result<MapCounts> {
        let mut emitter = VecEmitter::new();
        match map_record(line, &self.params, &mut emitter) {
            Ok(n) => {
                shuffle.absorb(emitter)?;
                Ok(MapCounts { records: 1, malformed: 0, emissions: n as u64 })
            }
            Err(e) if !e.is_fatal() => {
                warn!(error = %e, "skipping malformed record");
                Ok(MapCounts { records: 1, malformed: 1, emissions: 0 })
            }
            Err(e) => Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Point, Role};
    use pretty_assertions::assert_eq;

    #[test]
    fn shuffle_groups_by_key_in_order() {
        let shuffle = ShuffleBuffer::new();
        let p = Point::new(0u64, vec![1.0]);
        let q = Point::new(1u64, vec![2.0]);

        let mut first = VecEmitter::new();
        first.emitted.push((BlockKey(2), p.route_to(BlockKey(2), Role::Row)));
        first.emitted.push((BlockKey(0), p.route_to(BlockKey(0), Role::Column)));
        shuffle.absorb(first).unwrap();

        let mut second = VecEmitter::new();
        second.emitted.push((BlockKey(2), q.route_to(BlockKey(2), Role::Column)));
        shuffle.absorb(second).unwrap();
        assert_eq!(shuffle.point_count(), 2);

        let blocks = shuffle.into_blocks();
        let shape: Vec<(u64, usize)> = blocks.iter().map(|(k, m)| (k.0, m.len())).collect();
        assert_eq!(shape, vec![(0, 1), (2, 2)]);
    }

    #[test]
    fn shuffle_rejects_repeated_point_id() {
        let shuffle = ShuffleBuffer::new();
        let params = BlockParams::new(4, 2).unwrap();

        let mut first = VecEmitter::new();
        map_record("3\t1,1", &params, &mut first).unwrap();
        shuffle.absorb(first).unwrap();

        let mut again = VecEmitter::new();
        map_record("3\t5,5", &params, &mut again).unwrap();
        let err = shuffle.absorb(again).unwrap_err();
        assert!(matches!(err, Error::DuplicatePoint { id: PointId(3) }));
        assert!(err.is_fatal());

        // The rejected record left no routings behind.
        let members: usize = shuffle.into_blocks().iter().map(|(_, m)| m.len()).sum();
        assert_eq!(members, 3);
    }

    #[test]
    fn empty_emitter_is_a_no_op() {
        let shuffle = ShuffleBuffer::new();
        shuffle.absorb(VecEmitter::new()).unwrap();
        assert_eq!(shuffle.point_count(), 0);
        assert!(shuffle.into_blocks().is_empty());
    }

    #[test]
    fn duplicate_id_fails_the_run() {
        let rt = LocalRuntime::new(JobConfig::new(3, 1).with_threads(2)).unwrap();
        let err = rt.run(["0\t0", "1\t1", "1\t2"]).unwrap_err();
        assert!(matches!(err, Error::DuplicatePoint { id: PointId(1) }));
    }

    #[test]
    fn runtime_rejects_bad_config_up_front() {
        assert!(matches!(
            LocalRuntime::new(JobConfig::new(3, 4)),
            Err(Error::InvalidParameter { name: "h", .. })
        ));
    }

    #[test]
    fn single_threaded_run() {
        let rt = LocalRuntime::new(JobConfig::new(3, 1).with_threads(1)).unwrap();
        let report = rt.run(["0\t0", "1\t1", "2\t2"]).unwrap();
        assert_eq!(report.stats.pairs, 3);
        assert_eq!(report.stats.results, 6);
        assert_eq!(report.stats.blocks, 1);
        assert_eq!(report.stats.emissions, 6);
    }

    #[test]
    fn run_reader_skips_blank_lines() {
        let input = "0\t0,0\n\n1\t3,4\n";
        let rt = LocalRuntime::new(JobConfig::new(2, 2)).unwrap();
        let report = rt.run_reader(input.as_bytes()).unwrap();
        assert_eq!(report.stats.records, 2);
        assert_eq!(report.stats.pairs, 1);
    }
}
