//! Build a block-partitioned affinity matrix from a text dataset.
//!
//! ```text
//! pairwise <input> <v> <h> <output> [--sigma S] [--threads N] [--config job.json]
//! ```

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use block_affinity::logging::init_subscriber;
use block_affinity::{Error, JobConfig, JobOverrides, LocalRuntime, Result};
use clap::Parser;
use tracing::{error, info, warn};

#[derive(Debug, Parser)]
#[command(about = "Pairwise affinity matrix for spectral clustering")]
struct PairwiseArgs {
    /// Input records, one `<id>\t<f1>,<f2>,...` per line
    input: PathBuf,

    /// Dataset size v; point ids span [0, v)
    dataset_size: u64,

    /// Blocking factor h, 1 <= h <= v
    blocking_factor: u64,

    /// Output file for `(<i>, <j>)\t<value>` records; overwritten if present
    output: PathBuf,

    /// Gaussian kernel bandwidth
    #[arg(long)]
    sigma: Option<f64>,

    /// Worker threads (defaults to every core)
    #[arg(long, short = 't')]
    threads: Option<usize>,

    /// JSON job file with any of sigma, threads, dataset_size, blocking_factor.
    /// A dataset_size or blocking_factor must match the positional values;
    /// flags take precedence over the file
    #[arg(long)]
    config: Option<PathBuf>,
}

fn build_config(args: &PairwiseArgs) -> Result<JobConfig> {
    let mut config = JobConfig::new(args.dataset_size, args.blocking_factor);
    if let Some(path) = &args.config {
        config = JobOverrides::from_json_file(path)?.apply_to(config)?;
    }
    if let Some(sigma) = args.sigma {
        config.sigma = sigma;
    }
    if let Some(threads) = args.threads {
        config.threads = Some(threads);
    }
    Ok(config)
}

fn run(args: &PairwiseArgs) -> Result<()> {
    let runtime = LocalRuntime::new(build_config(args)?)?;
    let params = runtime.params();
    info!(
        edge_length = params.edge_length(),
        max_block_members = params.max_block_members(),
        "reading {}",
        args.input.display()
    );

    let input = BufReader::new(File::open(&args.input)?);
    let report = runtime.run_reader(input)?;

    // Output is only created once the run has succeeded.
    let mut writer = BufWriter::new(File::create(&args.output)?);
    report.write_results(&mut writer)?;
    writer.flush()?;

    info!(summary = %serde_json::to_string(&report.stats)?, "wrote {}", args.output.display());
    if report.stats.has_skips() {
        warn!(
            malformed_records = report.stats.malformed_records,
            skipped_points = report.stats.skipped_points,
            skipped_pairs = report.stats.skipped_pairs,
            "run completed with skips"
        );
        eprintln!(
            "skipped: {} malformed records, {} points, {} pairs",
            report.stats.malformed_records, report.stats.skipped_points, report.stats.skipped_pairs,
        );
    }
    Ok(())
}

fn main() -> ExitCode {
    init_subscriber();
    let args = PairwiseArgs::parse();

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e @ Error::InvalidParameter { .. }) => {
            error!(error = %e, "invalid job parameters");
            eprintln!("Error: {e}");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "affinity run failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
