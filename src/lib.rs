//! # block-affinity — Block-Partitioned Pairwise Affinity
//!
//! Builds the pairwise affinity matrix used as the first stage of spectral
//! clustering, without ever holding the `v × v` matrix in memory.
//!
//! ## Design Principles
//!
//! 1. **Blocks, not pairs**: the symmetric pair space is cut into an `h × h`
//!    grid; only the lower triangle is computed, one block per unit of work
//! 2. **Exactly once**: every unordered pair `(i, j)`, `i ≠ j`, meets in one
//!    block as a ROW/COLUMN cross-pair, never zero times and never twice
//! 3. **Pure stages**: assignment and aggregation are functions of their
//!    inputs, so any block can be rerun and reproduce the same results
//! 4. **Pluggable kernel**: aggregation only sees the `AffinityKernel` trait
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use block_affinity::{JobConfig, LocalRuntime};
//!
//! # fn example() -> block_affinity::Result<()> {
//! let config = JobConfig::new(4, 2);
//! let runtime = LocalRuntime::new(config)?;
//!
//! let report = runtime.run(["0\t0,0", "1\t1,0", "2\t0,1", "3\t1,1"])?;
//! for result in &report.results {
//!     println!("{result}");
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Pipeline
//!
//! | Stage | Module | Description |
//! |-------|--------|-------------|
//! | Parse | `record` | `"<id>\t<f1,f2,...>"` text record → `Point` |
//! | Assign | `partition` | `Point` → `(BlockKey, Role)` routings |
//! | Ship | `codec` | `RoutedPoint` ↔ bytes between stages |
//! | Aggregate | `aggregate` | one block's members → `AffinityResult`s |
//! | Drive | `runtime` | in-process map / group-by-key / reduce |

// ============================================================================
// Modules
// ============================================================================

pub mod model;
pub mod partition;
pub mod kernel;
pub mod codec;
pub mod record;
pub mod aggregate;
pub mod config;
pub mod runtime;
pub mod logging;

// ============================================================================
// Re-exports: Model (the DTOs)
// ============================================================================

pub use model::{AffinityResult, BlockKey, Point, PointId, Role, RoutedPoint};

// ============================================================================
// Re-exports: Core algorithm
// ============================================================================

pub use partition::{Assignments, BlockParams};
pub use kernel::{AffinityKernel, GaussianKernel};
pub use aggregate::{aggregate, aggregate_wire, BlockOutput};

// ============================================================================
// Re-exports: Configuration & execution
// ============================================================================

pub use config::{JobConfig, JobOverrides};
pub use runtime::{Emitter, LocalRuntime, RunReport, RunStats};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    #[error("Malformed record {line:?}: {reason}")]
    MalformedRecord { line: String, reason: String },

    #[error("Dimension mismatch: {left} vs {right} features")]
    DimensionMismatch { left: usize, right: usize },

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Point id {id} appears in more than one input record")]
    DuplicatePoint { id: PointId },

    #[error("Point routed to block {got} delivered to block {expected}")]
    Misrouted { expected: BlockKey, got: BlockKey },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether this error aborts the run.
    ///
    /// Malformed records and mismatched pairs are skipped and counted;
    /// everything else stops processing. A repeated point id is fatal: either
    /// copy would pair with every other point, so no choice between them
    /// preserves the one-result-per-pair guarantee.
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Error::MalformedRecord { .. } | Error::DimensionMismatch { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;
