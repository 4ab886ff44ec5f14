//! # Distributor — Job Scheduling Thread
//!
//! One scheduling thread feeds the worker pool. Each pass it hands queued
//! job files to idle workers; when the queue runs dry it rescans the pending
//! root for resumable records, reading only their headers. An empty rescan
//! means the run is complete and the distributor winds down once every
//! worker has gone idle.
//!
//! A bad job file never stops the pool: deserialization failures are logged
//! and the file is skipped for the rest of the run.

use std::collections::{HashSet, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::cache::PrimeCache;
use crate::config::Settings;
use crate::job::{self, Job, Status};
use crate::paths::{Layout, JOB_EXT};
use crate::progress::Progress;
use crate::worker::Worker;

/// Pause between scheduling passes.
const PASS_INTERVAL: Duration = Duration::from_millis(50);

pub struct Distributor {
    workers: Arc<Vec<Worker>>,
    stop: Arc<AtomicBool>,
    done: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl Distributor {
    /// Spawn the worker pool and the scheduling thread.
    pub fn start(
        layout: Layout,
        settings: &Settings,
        cache: Option<Arc<PrimeCache>>,
        progress: Arc<Progress>,
    ) -> Distributor {
        let threads = settings.effective_threads();
        let workers: Arc<Vec<Worker>> = Arc::new(
            (0..threads)
                .map(|id| {
                    Worker::spawn(
                        id,
                        layout.clone(),
                        cache.clone(),
                        Arc::clone(&progress),
                        settings.prime_buffer_size,
                    )
                })
                .collect(),
        );
        info!(threads, "worker pool started");

        let stop = Arc::new(AtomicBool::new(false));
        let done = Arc::new(AtomicBool::new(false));
        let max_queue = settings.max_job_queue;

        let thread_workers = Arc::clone(&workers);
        let thread_stop = Arc::clone(&stop);
        let thread_done = Arc::clone(&done);
        let handle = thread::Builder::new()
            .name("distributor".into())
            .spawn(move || {
                schedule_loop(&layout, &thread_workers, max_queue, &thread_stop);
                thread_done.store(true, Ordering::SeqCst);
            })
            .expect("failed to spawn distributor thread");

        Distributor {
            workers,
            stop,
            done,
            handle: Some(handle),
        }
    }

    /// Stop dispatching and ask every worker to pause its current job.
    pub fn stop_work(&self) {
        info!("stopping work");
        self.stop.store(true, Ordering::SeqCst);
        for worker in self.workers.iter() {
            worker.request_stop();
        }
    }

    /// Block until every worker is idle.
    pub fn wait_for_all_workers(&self) {
        while self.workers.iter().any(|w| !w.is_idle()) {
            thread::sleep(Duration::from_millis(10));
        }
    }

    /// True once the scheduling thread has exited.
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::SeqCst)
    }

    /// Block until the pending root is exhausted and all workers are idle.
    pub fn wait_until_done(&self) {
        while !self.done.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(20));
        }
        self.wait_for_all_workers();
    }

    /// Wind down: stop dispatching, wait for idle workers, join threads.
    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.wait_for_all_workers();
        if let Ok(workers) = Arc::try_unwrap(self.workers) {
            for worker in workers {
                worker.join();
            }
        }
    }
}

fn schedule_loop(layout: &Layout, workers: &[Worker], max_queue: usize, stop: &AtomicBool) {
    let mut queue: VecDeque<PathBuf> = VecDeque::new();
    let mut skipped: HashSet<PathBuf> = HashSet::new();
    // A job handed back by a worker that raced busy. Its file is already
    // removed from disk, so it stays in memory until an idle worker takes
    // it rather than risking a failed re-save losing the range.
    let mut held: Option<Job> = None;
    let mut exhausted = false;

    loop {
        if stop.load(Ordering::SeqCst) {
            debug!("distributor stopping on request");
            if let Some(job) = held.take() {
                persist_undispatched(layout, job);
            }
            return;
        }

        for worker in workers.iter().filter(|w| w.is_idle()) {
            let job = match held.take() {
                Some(job) => job,
                None => {
                    if queue.is_empty() {
                        queue = scan_pending(layout, max_queue, &skipped);
                        if queue.is_empty() {
                            exhausted = true;
                            break;
                        }
                        exhausted = false;
                    }

                    let Some(path) = queue.pop_front() else { break };
                    match Job::load(&path) {
                        Ok(job) => {
                            if let Err(err) = std::fs::remove_file(&path) {
                                warn!(path = %path.display(), %err, "failed to remove dispatched job file");
                            }
                            job
                        }
                        Err(err) => {
                            warn!(path = %path.display(), %err, "skipping unreadable job file");
                            skipped.insert(path);
                            continue;
                        }
                    }
                }
            };

            let start = job.start;
            if let Err(job) = worker.start(job) {
                // Worker went busy between the idle check and now; hold
                // the job for the next pass.
                debug!(worker = worker.id(), start = job.start, "worker raced busy");
                held = Some(job);
            } else {
                debug!(worker = worker.id(), start, "job dispatched");
            }
        }

        if exhausted && held.is_none() && workers.iter().all(|w| w.is_idle()) {
            info!("pending root exhausted, distributor finished");
            return;
        }
        thread::sleep(PASS_INTERVAL);
    }
}

/// Write a loaded-but-never-dispatched job back to the pending root.
fn persist_undispatched(layout: &Layout, job: Job) {
    let path = layout.pending_job(job.start);
    if let Err(err) = job.save(&path) {
        warn!(start = job.start, %err, "failed to persist undispatched job");
    }
}

/// Scan the pending root for resumable job files, numerically sorted by
/// their `start` filename, capped at `max_queue`.
fn scan_pending(layout: &Layout, max_queue: usize, skipped: &HashSet<PathBuf>) -> VecDeque<PathBuf> {
    let jobs_root = layout.jobs_root();
    let entries = match std::fs::read_dir(&jobs_root) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(path = %jobs_root.display(), %err, "cannot scan pending root");
            return VecDeque::new();
        }
    };

    let mut found: Vec<PathBuf> = Vec::new();
    for entry in entries.flatten() {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some(JOB_EXT) || skipped.contains(&path) {
            continue;
        }
        match job::peek_status_from_file(&path) {
            Ok(Status::NotStarted | Status::Started) => found.push(path),
            Ok(Status::Finished) => {}
            Err(err) => {
                warn!(path = %path.display(), %err, "unreadable job header");
            }
        }
    }

    // Dispatch in ascending range order when every filename parses; a
    // foreign filename falls back to directory order.
    let starts: Option<Vec<u64>> = found
        .iter()
        .map(|p| {
            p.file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
        })
        .collect();
    if let Some(starts) = starts {
        let mut keyed: Vec<(u64, PathBuf)> = starts.into_iter().zip(found).collect();
        keyed.sort_by_key(|(start, _)| *start);
        found = keyed.into_iter().map(|(_, p)| p).collect();
    }

    found.truncate(max_queue);
    debug!(queued = found.len(), "pending root scanned");
    found.into()
}
