#![deny(unsafe_code)]

//! Standalone corpus generator for benchmarking the pipelines by hand:
//! writes a random data file plus a seed that shares a configurable
//! fraction of its fragments, the same shape the test suites use.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use test_support::{GenDataOptions, generate_pair};

#[derive(Parser, Debug)]
#[command(name = "gendata", about = "Generate a data/seed file pair")]
struct Options {
    /// Directory receiving data.bin and seed_data.bin.
    #[arg(long = "output_path", default_value = ".")]
    output_path: PathBuf,

    /// Size of the data file in bytes.
    #[arg(long = "data_size", default_value_t = 1_000_000_000)]
    data_size: u64,

    /// Size of the seed file; negative means same as the data file.
    #[arg(long = "seed_data_size", default_value_t = -1)]
    seed_data_size: i64,

    /// Granularity at which the seed diverges from the data.
    #[arg(long = "fragment_size", default_value_t = 123_456)]
    fragment_size: u64,

    /// Percentage of fragments the seed shares with the data.
    #[arg(long = "similarity", default_value_t = 90)]
    similarity: u32,

    /// Generator seed, for reproducible corpora.
    #[arg(long = "rng_seed", default_value_t = 1)]
    rng_seed: u64,
}

fn main() -> ExitCode {
    let options = Options::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let result = generate_pair(
        &options.output_path,
        GenDataOptions {
            data_size: options.data_size,
            seed_data_size: u64::try_from(options.seed_data_size).ok(),
            fragment_size: options.fragment_size,
            similarity: options.similarity,
            rng_seed: options.rng_seed,
        },
    );

    match result {
        Ok((data_path, seed_path)) => {
            tracing::info!(
                data = %data_path.display(),
                seed = %seed_path.display(),
                "corpus written"
            );
            ExitCode::SUCCESS
        }
        Err(error) => {
            tracing::error!("corpus generation failed: {error}");
            ExitCode::from(1)
        }
    }
}
