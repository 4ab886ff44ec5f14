//! # CLI Execution Functions
//!
//! Extracted from `main.rs` to keep the entry point slim. Contains the
//! execution logic for each subcommand: pool runs, job generation,
//! integrity checks, cache building and record inspection.

use anyhow::{Context, Result};
use std::io::BufRead;
use std::path::Path;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{info, warn};

use primehive::cache::PrimeCache;
use primehive::check;
use primehive::config::Settings;
use primehive::distributor::Distributor;
use primehive::job::{self, Job};
use primehive::paths::Layout;
use primehive::progress::Progress;

// ── Pool Run ────────────────────────────────────────────────────

/// Drain the pending job root with a worker pool. Any line typed on stdin
/// pauses the run gracefully; paused jobs resume on the next invocation.
pub fn run_pool(layout: &Layout, settings: &Settings, no_cache: bool) -> Result<()> {
    layout
        .bootstrap()
        .with_context(|| format!("cannot create data directory {}", layout.root().display()))?;

    let cache = if no_cache {
        None
    } else {
        match PrimeCache::load(&layout.cache_file()) {
            Ok(cache) => {
                info!(
                    primes = cache.primes.len(),
                    highest_checked = cache.highest_checked,
                    "loaded known-primes cache"
                );
                Some(std::sync::Arc::new(cache))
            }
            Err(err) => {
                if layout.cache_file().exists() {
                    warn!(%err, "known-primes cache unreadable, running without it");
                }
                None
            }
        }
    };

    let progress = Progress::new();
    let reporter = progress.start_reporter(settings.frame_time());
    let pool = Distributor::start(layout.clone(), settings, cache, progress.clone());

    // A line on stdin requests a graceful pause. EOF (no console) just
    // leaves the pool running to completion.
    let (stdin_tx, stdin_rx) = mpsc::channel();
    thread::spawn(move || {
        let stdin = std::io::stdin();
        if stdin.lock().lines().next().is_some() {
            let _ = stdin_tx.send(());
        }
    });
    info!("pool running, press enter to pause");

    let paused = loop {
        match stdin_rx.recv_timeout(Duration::from_millis(50)) {
            Ok(()) => break true,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if pool.is_done() {
                    break false;
                }
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => {
                // No console; block until the pending root is drained.
                pool.wait_until_done();
                break false;
            }
        }
    };

    if paused {
        pool.stop_work();
        pool.wait_for_all_workers();
    }
    pool.shutdown();
    progress.stop();
    let _ = reporter.join();
    progress.print_status();
    info!(paused, "pool run ended");
    Ok(())
}

// ── Job Generation ──────────────────────────────────────────────

pub fn run_gen_jobs(
    layout: &Layout,
    start: u64,
    count_per_job: u64,
    jobs: u64,
    starting_batch: u32,
    jobs_per_batch: u32,
) -> Result<()> {
    layout.bootstrap()?;
    let generated = job::generate_jobs(start, count_per_job, jobs, starting_batch, jobs_per_batch)?;
    for job in &generated {
        let path = layout.pending_job(job.start);
        if path.exists() {
            anyhow::bail!("refusing to overwrite existing job {}", path.display());
        }
        job.save(&path)?;
    }
    info!(
        jobs = generated.len(),
        start,
        count_per_job,
        "job records generated"
    );
    println!("generated {} jobs starting at {start}", generated.len());
    Ok(())
}

// ── Integrity Check ─────────────────────────────────────────────

pub fn run_check(dir: &Path, repair: bool) -> Result<()> {
    let (good, bad) = check::check_jobs_in_dir(dir, repair)?;
    println!("checked {} job files: {good} good, {bad} bad", good + bad);
    if bad > 0 && !repair {
        println!("re-run with --repair to remove duplicated primes");
    }
    Ok(())
}

// ── Cache Building ──────────────────────────────────────────────

pub fn run_build_cache(layout: &Layout, limit: Option<u64>, from_jobs: bool) -> Result<()> {
    layout.bootstrap()?;
    let cache = if from_jobs {
        PrimeCache::from_finished_jobs(&layout.complete_root())
            .context("cannot assemble cache from completed jobs")?
    } else {
        let limit = limit.context("--limit or --from-jobs is required")?;
        PrimeCache::from_sieve(limit)
    };

    let path = layout.cache_file();
    cache.save(&path)?;
    println!(
        "wrote {} primes (exhaustive to {}) to {}",
        cache.primes.len(),
        cache.highest_checked,
        path.display()
    );
    Ok(())
}

// ── Record Inspection ───────────────────────────────────────────

pub fn run_info(file: &Path) -> Result<()> {
    match file.extension().and_then(|e| e.to_str()) {
        Some("primecache") => {
            let cache = PrimeCache::load(file)?;
            println!("known-primes cache {}", cache.version);
            println!("  compression:     {:?}", cache.compression);
            println!("  highest checked: {}", cache.highest_checked);
            println!("  primes:          {}", cache.primes.len());
            if let (Some(first), Some(last)) = (cache.primes.first(), cache.primes.last()) {
                println!("  range:           {first} ..= {last}");
            }
        }
        _ => {
            let job = Job::load(file)?;
            println!("job record {}", job.version);
            println!("  compression: {:?}", job.compression);
            println!("  batch:       {}", job.batch);
            println!("  range:       {} + {}", job.start, job.count);
            println!("  progress:    {} ({:?})", job.progress, job.status());
            println!("  primes:      {}", job.primes.len());
        }
    }
    Ok(())
}
