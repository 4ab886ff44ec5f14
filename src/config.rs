//! # Config — Pool Settings
//!
//! Runtime settings for the worker pool, parsed from an optional TOML
//! settings file and overridable from the CLI. Out-of-range values are
//! clamped rather than rejected so a hand-edited settings file never
//! prevents startup.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Pool settings as stored in `primehive.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Worker thread count; 0 means one per available core.
    pub threads: usize,
    /// Primes buffered per worker before merging into the job.
    pub prime_buffer_size: usize,
    /// Upper bound on queued job paths in the distributor.
    pub max_job_queue: usize,
    /// Status reporter wake interval.
    pub frame_time_millis: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            threads: 0,
            prime_buffer_size: 500,
            max_job_queue: 200,
            frame_time_millis: 2_000,
        }
    }
}

impl Settings {
    /// Parse from a TOML string and clamp to usable ranges.
    pub fn parse_toml(content: &str) -> Result<Self> {
        let settings: Settings = toml::from_str(content)?;
        Ok(settings.clamped())
    }

    /// Parse from a TOML file path.
    pub fn parse_toml_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::parse_toml(&content)
    }

    /// Clamp every field to its usable range.
    pub fn clamped(mut self) -> Self {
        if self.prime_buffer_size == 0 {
            self.prime_buffer_size = Settings::default().prime_buffer_size;
        }
        self.max_job_queue = self.max_job_queue.max(5);
        self.frame_time_millis = self.frame_time_millis.clamp(200, 60_000);
        self
    }

    /// Worker thread count with the 0 = per-core default resolved.
    pub fn effective_threads(&self) -> usize {
        if self.threads == 0 {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        } else {
            self.threads
        }
    }

    pub fn frame_time(&self) -> Duration {
        Duration::from_millis(self.frame_time_millis)
    }
}
