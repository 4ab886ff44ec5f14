//! # Main — CLI Entry Point
//!
//! Routes CLI subcommands to the pool and tooling functions in `cli.rs`.
//! Handles shared concerns: env loading, structured logging, settings
//! resolution (TOML file + CLI overrides) and the data-directory layout.
//!
//! ## Subcommands
//!
//! - `run`: drain the pending job root with a worker pool; typing any
//!   line on stdin pauses the run gracefully.
//! - `gen-jobs`: write fresh job records into the pending root.
//! - `check`: integrity-check (and optionally repair) job records.
//! - `build-cache`: produce the known-primes cache from a sieve or from
//!   completed jobs.
//! - `info`: describe a single job or cache file.

mod cli;

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use primehive::config::Settings;
use primehive::paths::Layout;

#[derive(Parser)]
#[command(name = "primehive", about = "Distributed resumable prime search")]
struct Cli {
    /// Data directory holding jobs, completed batches and the prime cache
    #[arg(long, env = "PRIMEHIVE_ROOT", default_value = "primehive-data")]
    root: PathBuf,

    /// Settings file (defaults to primehive.toml under the data directory)
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Worker thread count (defaults to settings file, then one per core)
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    threads: Option<u64>,

    /// Primes buffered per worker before merging into the job record
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    buffer_size: Option<u64>,

    /// Upper bound on queued job files in the distributor
    #[arg(long)]
    max_queue: Option<usize>,

    /// Status reporter interval in milliseconds
    #[arg(long)]
    frame_time_millis: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the worker pool until the pending root is drained
    Run {
        /// Ignore the known-primes cache even if present
        #[arg(long)]
        no_cache: bool,
    },
    /// Generate fresh job records into the pending root
    GenJobs {
        /// First candidate of the first job
        #[arg(long, default_value_t = 0)]
        start: u64,
        /// Candidates per job
        #[arg(long, default_value_t = 1_000_000)]
        count_per_job: u64,
        /// Number of jobs to generate
        #[arg(long)]
        jobs: u64,
        /// Batch number of the first job
        #[arg(long, default_value_t = 0)]
        starting_batch: u32,
        /// Jobs per batch
        #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u32).range(1..))]
        jobs_per_batch: u32,
    },
    /// Integrity-check job records under a directory
    Check {
        /// Directory to scan (defaults to the whole data directory)
        #[arg(long)]
        path: Option<PathBuf>,
        /// Remove duplicated primes and rewrite repaired records
        #[arg(long)]
        repair: bool,
    },
    /// Build the known-primes cache
    BuildCache {
        /// Sieve all primes up to this bound
        #[arg(long, conflicts_with = "from_jobs")]
        limit: Option<u64>,
        /// Assemble the cache from completed job records instead
        #[arg(long)]
        from_jobs: bool,
    },
    /// Describe a job or cache file
    Info {
        /// Path to a .primejob or .primecache file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    // Structured logging: LOG_FORMAT=json for machines, human-readable otherwise
    let log_format = std::env::var("LOG_FORMAT").unwrap_or_default();
    if log_format == "json" {
        tracing_subscriber::fmt().json().with_target(false).init();
    } else {
        tracing_subscriber::fmt()
            .with_writer(std::io::stderr)
            .with_target(false)
            .init();
    }

    let cli = Cli::parse();
    let layout = Layout::new(&cli.root);
    let settings = resolve_settings(&cli)?;

    match &cli.command {
        Commands::Run { no_cache } => cli::run_pool(&layout, &settings, *no_cache),
        Commands::GenJobs {
            start,
            count_per_job,
            jobs,
            starting_batch,
            jobs_per_batch,
        } => cli::run_gen_jobs(
            &layout,
            *start,
            *count_per_job,
            *jobs,
            *starting_batch,
            *jobs_per_batch,
        ),
        Commands::Check { path, repair } => {
            let dir = path.clone().unwrap_or_else(|| cli.root.clone());
            cli::run_check(&dir, *repair)
        }
        Commands::BuildCache { limit, from_jobs } => {
            cli::run_build_cache(&layout, *limit, *from_jobs)
        }
        Commands::Info { file } => cli::run_info(file),
    }
}

/// Settings file (if any) overlaid with CLI overrides, then clamped.
fn resolve_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = match &cli.settings {
        Some(path) => Settings::parse_toml_file(path)?,
        None => {
            let default_path = cli.root.join("primehive.toml");
            if default_path.is_file() {
                Settings::parse_toml_file(&default_path)?
            } else {
                Settings::default()
            }
        }
    };

    if let Some(threads) = cli.threads {
        settings.threads = threads as usize;
    }
    if let Some(buffer) = cli.buffer_size {
        settings.prime_buffer_size = buffer as usize;
    }
    if let Some(max_queue) = cli.max_queue {
        settings.max_job_queue = max_queue;
    }
    if let Some(frame) = cli.frame_time_millis {
        settings.frame_time_millis = frame;
    }
    Ok(settings.clamped())
}
