//! # Paths — On-Disk Layout
//!
//! One directory root holds everything the pool touches:
//!
//! ```text
//! {root}/jobs/{start}.primejob        pending / paused work
//! {root}/jobs/{start}.FAILED          quarantined crash records
//! {root}/complete/{batch}/{start}.primejob   finished work
//! {root}/known.primecache             shared known-primes cache
//! ```
//!
//! Job filenames are the decimal `start` of the range, which is what the
//! distributor sorts on when rescanning.

use std::io;
use std::path::{Path, PathBuf};

/// File extension for job records.
pub const JOB_EXT: &str = "primejob";
/// Extension for quarantined records left behind by a crashed worker.
pub const FAILED_EXT: &str = "FAILED";

#[derive(Debug, Clone)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Layout { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Pending and paused job records live here.
    pub fn jobs_root(&self) -> PathBuf {
        self.root.join("jobs")
    }

    pub fn complete_root(&self) -> PathBuf {
        self.root.join("complete")
    }

    pub fn batch_dir(&self, batch: u32) -> PathBuf {
        self.complete_root().join(batch.to_string())
    }

    pub fn pending_job(&self, start: u64) -> PathBuf {
        self.jobs_root().join(format!("{start}.{JOB_EXT}"))
    }

    pub fn complete_job(&self, batch: u32, start: u64) -> PathBuf {
        self.batch_dir(batch).join(format!("{start}.{JOB_EXT}"))
    }

    /// Quarantine marker for a job whose worker panicked.
    pub fn failed_job(&self, start: u64) -> PathBuf {
        self.jobs_root().join(format!("{start}.{FAILED_EXT}"))
    }

    pub fn cache_file(&self) -> PathBuf {
        self.root.join("known.primecache")
    }

    /// Create the directory skeleton. Fatal at startup if it fails.
    pub fn bootstrap(&self) -> io::Result<()> {
        std::fs::create_dir_all(self.jobs_root())?;
        std::fs::create_dir_all(self.complete_root())?;
        Ok(())
    }
}
