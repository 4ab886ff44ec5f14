//! # Check — Job Record Integrity
//!
//! Validates decoded job records against their structural invariants:
//! progress within count, primes odd (a leading 2 excepted), in range and
//! strictly ascending. Out-of-order and duplicated values are reported as
//! distinct problems; repair mode removes exact duplicates in place.
//!
//! The report is a human-readable line-per-problem string capped at
//! [`MAX_REPORT_LEN`] characters. Once the cap is hit the remaining primes
//! are not inspected, so a thoroughly corrupt multi-million-prime record
//! cannot balloon the log.

use std::path::Path;

use tracing::{debug, warn};

use crate::error::RecordError;
use crate::job::Job;

/// Report length cap; checking stops once it is exceeded.
pub const MAX_REPORT_LEN: usize = 10_000;

/// Result of checking one job record.
#[derive(Debug, Clone)]
pub struct CheckOutcome {
    /// True when no problems were found (corrections count as problems).
    pub passed: bool,
    /// One line per problem; empty when the record is clean.
    pub report: String,
    /// Duplicates removed in repair mode.
    pub corrected: usize,
}

/// Check a job record, optionally removing exact duplicates in place.
pub fn check_job(job: &mut Job, repair: bool) -> CheckOutcome {
    use std::fmt::Write;

    let mut report = String::new();
    let mut corrected = 0;

    if job.progress > job.count {
        let _ = writeln!(
            report,
            "progress {} is higher than count {}",
            job.progress, job.count
        );
    }

    // A decodable record can still declare an impossible range; report it
    // instead of overflowing, and skip the upper-bound checks.
    let upper = job.start.checked_add(job.count);
    if upper.is_none() {
        let _ = writeln!(
            report,
            "range start {} plus count {} overflows",
            job.start, job.count
        );
    }

    if let Some(&first) = job.primes.first() {
        if first % 2 == 0 && first != 2 {
            let _ = writeln!(report, "prime at index 0 is even, value {first}");
        }
        if first < job.start {
            let _ = writeln!(report, "prime at index 0 is below job start, value {first}");
        } else if upper.is_some_and(|upper| first > upper) {
            let _ = writeln!(report, "prime at index 0 is above job range, value {first}");
        }
    }

    let mut i = 1;
    while i < job.primes.len() {
        let prev = job.primes[i - 1];
        let value = job.primes[i];

        if value < prev {
            let _ = writeln!(
                report,
                "prime at index {i} is smaller than the previous, value {value}"
            );
        }
        if value == prev {
            if repair {
                job.primes.remove(i);
                corrected += 1;
                let _ = writeln!(report, "prime at index {i} was duplicated, removed {value}");
                // The next value slid into slot i; re-check it.
                continue;
            }
            let _ = writeln!(report, "prime at index {i} is duplicated, value {value}");
        }

        if value % 2 == 0 {
            let _ = writeln!(report, "prime at index {i} is even, value {value}");
        }
        if value < job.start {
            let _ = writeln!(report, "prime at index {i} is below job start, value {value}");
        } else if upper.is_some_and(|upper| value > upper) {
            let _ = writeln!(report, "prime at index {i} is above job range, value {value}");
        }

        if report.len() >= MAX_REPORT_LEN {
            report.push_str("max report length reached, checking stopped");
            return CheckOutcome {
                passed: false,
                report,
                corrected,
            };
        }
        i += 1;
    }

    CheckOutcome {
        passed: report.is_empty(),
        report,
        corrected,
    }
}

/// Check every `.primejob` file under `dir` (recursively).
///
/// Returns `(good, bad)` counts. Records that fail to deserialize count as
/// bad. With `repair` set, files whose duplicates were removed are
/// rewritten in place.
pub fn check_jobs_in_dir(dir: &Path, repair: bool) -> Result<(usize, usize), RecordError> {
    let mut paths = Vec::new();
    collect_job_files(dir, &mut paths)?;

    let mut good = 0;
    let mut bad = 0;
    for path in &paths {
        let mut job = match Job::load(path) {
            Ok(job) => job,
            Err(err) => {
                warn!(path = %path.display(), %err, "unreadable job record");
                bad += 1;
                continue;
            }
        };

        let outcome = check_job(&mut job, repair);
        if outcome.passed {
            good += 1;
        } else {
            bad += 1;
            debug!(path = %path.display(), report = %outcome.report, "job failed integrity check");
        }
        if repair && outcome.corrected > 0 {
            job.save(path)?;
        }
    }
    Ok((good, bad))
}

fn collect_job_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<(), RecordError> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_job_files(&path, out)?;
        } else if path.extension().is_some_and(|e| e == "primejob") {
            out.push(path);
        }
    }
    Ok(())
}
