//! # Worker — Long-Lived Search Threads
//!
//! Each worker owns one OS thread for the life of the pool and a capacity-1
//! job slot. The distributor hands a decoded [`Job`] through the slot; the
//! thread grinds candidates with trial division, buffers found primes, and
//! persists the record when the job finishes, pauses, or crashes.
//!
//! ## Stop and crash behavior
//!
//! `request_stop` sets a cooperative flag the compute loop observes every
//! [`STOP_CHECK_CADENCE`] candidates. A stopped job is written back to the
//! pending root with `progress` advanced to the first untested candidate, so
//! a later scan resumes exactly where it left off. A panic anywhere in the
//! compute path is caught at the thread boundary and the job is quarantined
//! as a zero-progress `.FAILED` record; the worker itself survives and
//! returns to idle.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::sync::Arc;
use std::thread;

use tracing::{debug, error, info, warn};

use crate::cache::PrimeCache;
use crate::job::Job;
use crate::math::{is_prime, is_prime_cached};
use crate::paths::Layout;
use crate::progress::Progress;

/// Candidates examined between cooperative stop checks.
const STOP_CHECK_CADENCE: u64 = 512;

/// How a compute run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Finished,
    Paused,
}

/// Handle to one long-lived worker thread.
pub struct Worker {
    id: usize,
    slot: SyncSender<Job>,
    busy: Arc<AtomicBool>,
    stop: Arc<AtomicBool>,
    handle: thread::JoinHandle<()>,
}

impl Worker {
    /// Spawn the worker thread. It idles on its job slot until the pool
    /// shuts down by dropping this handle's sender side.
    pub fn spawn(
        id: usize,
        layout: Layout,
        cache: Option<Arc<PrimeCache>>,
        progress: Arc<Progress>,
        prime_buffer_size: usize,
    ) -> Worker {
        let (slot, jobs): (SyncSender<Job>, Receiver<Job>) = sync_channel(1);
        let busy = Arc::new(AtomicBool::new(false));
        let stop = Arc::new(AtomicBool::new(false));

        let thread_busy = Arc::clone(&busy);
        let thread_stop = Arc::clone(&stop);
        let handle = thread::Builder::new()
            .name(format!("worker-{id}"))
            .spawn(move || {
                for job in jobs {
                    run_one(
                        id,
                        job,
                        &layout,
                        cache.as_deref(),
                        &progress,
                        prime_buffer_size,
                        &thread_stop,
                    );
                    thread_busy.store(false, Ordering::SeqCst);
                }
                debug!(worker = id, "worker thread exiting");
            })
            .expect("failed to spawn worker thread");

        Worker {
            id,
            slot,
            busy,
            stop,
            handle,
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_idle(&self) -> bool {
        !self.busy.load(Ordering::SeqCst)
    }

    /// Hand a job to the worker. Fails with the job handed back when the
    /// worker is already working.
    pub fn start(&self, job: Job) -> Result<(), Job> {
        if self.busy.swap(true, Ordering::SeqCst) {
            return Err(job);
        }
        self.stop.store(false, Ordering::SeqCst);
        match self.slot.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(job)) | Err(TrySendError::Disconnected(job)) => {
                self.busy.store(false, Ordering::SeqCst);
                Err(job)
            }
        }
    }

    /// Ask the worker to pause its current job at the next stop check.
    pub fn request_stop(&self) {
        self.stop.store(true, Ordering::SeqCst);
    }

    /// Close the job slot and wait for the thread to drain and exit.
    pub fn join(self) {
        let Worker { slot, handle, .. } = self;
        drop(slot);
        if handle.join().is_err() {
            error!("worker thread panicked outside the compute boundary");
        }
    }
}

/// Run one job to completion or pause, persist the result, survive panics.
fn run_one(
    worker: usize,
    mut job: Job,
    layout: &Layout,
    cache: Option<&PrimeCache>,
    progress: &Progress,
    prime_buffer_size: usize,
    stop: &AtomicBool,
) {
    let (batch, start, count) = (job.batch, job.start, job.count);
    debug!(worker, start, count, batch, "job assigned");

    let result = panic::catch_unwind(AssertUnwindSafe(|| {
        compute(&mut job, cache, progress, prime_buffer_size, stop)
    }));

    match result {
        Ok(Outcome::Finished) => {
            progress.jobs_completed.fetch_add(1, Ordering::Relaxed);
            let path = layout.complete_job(batch, start);
            let saved = std::fs::create_dir_all(layout.batch_dir(batch))
                .map_err(crate::error::RecordError::Io)
                .and_then(|()| job.save(&path));
            match saved {
                Ok(()) => info!(worker, start, primes = job.primes.len(), "job finished"),
                Err(err) => warn!(worker, start, %err, "failed to persist finished job"),
            }
        }
        Ok(Outcome::Paused) => {
            let path = layout.pending_job(start);
            match job.save(&path) {
                Ok(()) => info!(worker, start, progress = job.progress, "job paused"),
                Err(err) => warn!(worker, start, %err, "failed to persist paused job"),
            }
        }
        Err(_) => {
            // The record in `job` may be mid-mutation; quarantine a fresh
            // zero-progress copy of the range instead.
            error!(worker, start, "compute panicked, quarantining job");
            let untouched = Job::new(batch, start, count);
            if let Err(err) = untouched.save(&layout.failed_job(start)) {
                warn!(worker, start, %err, "failed to write quarantine record");
            }
        }
    }
}

/// The trial-division loop. Returns how the run ended; `job` holds the
/// final progress and merged primes either way.
fn compute(
    job: &mut Job,
    cache: Option<&PrimeCache>,
    progress: &Progress,
    prime_buffer_size: usize,
    stop: &AtomicBool,
) -> Outcome {
    let end = job
        .start
        .checked_add(job.count)
        .expect("job range must not overflow u64");
    let mut current = (job.start + job.progress).max(2);

    // 2 is the only even prime; record it and move to the odd lattice.
    if current == 2 {
        if end > 2 {
            job.primes.push(2);
        }
        current = 3;
    } else if current % 2 == 0 {
        current += 1;
    }

    let mut buffer: Vec<u64> = Vec::with_capacity(prime_buffer_size);
    let mut since_check = 0u64;

    while current < end {
        let prime = match cache {
            Some(cache) => is_prime_cached(current, &cache.primes),
            None => is_prime(current),
        };
        if prime {
            buffer.push(current);
            if buffer.len() >= prime_buffer_size {
                progress
                    .primes_found
                    .fetch_add(buffer.len() as u64, Ordering::Relaxed);
                job.primes.append(&mut buffer);
            }
        }

        current += 2;
        since_check += 1;
        if since_check >= STOP_CHECK_CADENCE {
            progress.tested.fetch_add(since_check, Ordering::Relaxed);
            since_check = 0;
            // A stop landing on the iteration that stepped past the range
            // end is a finish, not a pause; falling through keeps
            // `progress <= count`.
            if stop.load(Ordering::SeqCst) && current < end {
                progress
                    .primes_found
                    .fetch_add(buffer.len() as u64, Ordering::Relaxed);
                job.primes.append(&mut buffer);
                // First untested candidate is `current`; everything below
                // it (evens included) is exhausted.
                job.progress = current - job.start;
                return Outcome::Paused;
            }
        }
    }

    progress.tested.fetch_add(since_check, Ordering::Relaxed);
    progress
        .primes_found
        .fetch_add(buffer.len() as u64, Ordering::Relaxed);
    job.primes.append(&mut buffer);
    job.progress = job.count;
    Outcome::Finished
}
