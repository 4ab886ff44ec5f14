//! # Progress — Atomic Pool Progress Counters
//!
//! Thread-safe progress tracking shared between the worker threads, the
//! distributor and the background status reporter. Counters are atomics so
//! workers never contend on a lock per candidate; the reporter thread wakes
//! at the configured frame interval and emits one structured status line.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::info;

pub struct Progress {
    /// Candidates exhausted across all workers.
    pub tested: AtomicU64,
    pub primes_found: AtomicU64,
    pub jobs_completed: AtomicU64,
    start: Instant,
    shutdown: AtomicBool,
}

impl Progress {
    pub fn new() -> Arc<Self> {
        Arc::new(Progress {
            tested: AtomicU64::new(0),
            primes_found: AtomicU64::new(0),
            jobs_completed: AtomicU64::new(0),
            start: Instant::now(),
            shutdown: AtomicBool::new(false),
        })
    }

    /// Spawn the background reporter, waking every `frame_time`.
    pub fn start_reporter(self: &Arc<Self>, frame_time: Duration) -> thread::JoinHandle<()> {
        let progress = Arc::clone(self);
        thread::spawn(move || loop {
            thread::sleep(frame_time);
            if progress.shutdown.load(Ordering::Relaxed) {
                break;
            }
            progress.print_status();
        })
    }

    pub fn print_status(&self) {
        let elapsed = self.start.elapsed();
        let tested = self.tested.load(Ordering::Relaxed);
        let primes_found = self.primes_found.load(Ordering::Relaxed);
        let jobs_completed = self.jobs_completed.load(Ordering::Relaxed);
        let rate = if elapsed.as_secs() > 0 {
            tested as f64 / elapsed.as_secs_f64()
        } else {
            0.0
        };
        let h = elapsed.as_secs() / 3600;
        let m = (elapsed.as_secs() % 3600) / 60;
        let s = elapsed.as_secs() % 60;
        info!(
            tested,
            rate = format_args!("{:.2}", rate),
            primes_found,
            jobs_completed,
            elapsed = format_args!("{:02}:{:02}:{:02}", h, m, s),
            "pool progress"
        );
    }

    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}
