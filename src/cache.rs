//! # Cache — Known-Primes Resource Files
//!
//! A `PrimeCache` is a persisted, strictly ascending run of primes starting
//! at 2, used to accelerate trial division in the workers. Like job records
//! it is versioned by a three-byte header:
//!
//! ```text
//! v1.0.0:  0 ver(3)  3 primeCount(4)      7 primes(8×n)
//! v1.1.0:  0 ver(3)  3 highestChecked(8)  11 primeCount(4)  15 primes(8×n)
//! v1.2.0:  0 ver(3)  3 comp(1)            4 highestChecked(8)  12 payload
//! ```
//!
//! The v1.2.0 payload has no prime count; it runs to end of file and is
//! written through the streaming chain-delta encoder so caches larger than
//! memory-comfortable can still be produced block by block.

use std::fs;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use tracing::info;

use crate::compress::chain_delta;
use crate::error::RecordError;
use crate::job::{Compression, FormatVersion, Job, Status};

/// In-memory known-primes cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PrimeCache {
    pub version: FormatVersion,
    pub compression: Compression,
    /// Largest candidate the cache is exhaustive up to.
    pub highest_checked: u64,
    /// Strictly ascending primes from 2.
    pub primes: Vec<u64>,
}

impl PrimeCache {
    /// Build a cache by sieving all primes up to `limit`.
    pub fn from_sieve(limit: u64) -> Self {
        let primes = crate::math::sieve_primes(limit);
        info!(limit, primes = primes.len(), "sieved prime cache");
        PrimeCache {
            version: FormatVersion::LATEST,
            compression: Compression::ChainDelta,
            highest_checked: limit,
            primes,
        }
    }

    /// Build a cache from finished job records under `complete_root`.
    ///
    /// Jobs must form a contiguous range starting at or below 2; a gap or
    /// an unfinished record is malformed input, since the cache promises
    /// exhaustiveness up to `highest_checked`.
    pub fn from_finished_jobs(complete_root: &Path) -> Result<Self, RecordError> {
        let mut jobs = Vec::new();
        collect_job_files(complete_root, &mut jobs)?;
        if jobs.is_empty() {
            return Err(RecordError::Malformed(format!(
                "no job records under {}",
                complete_root.display()
            )));
        }

        let mut decoded = Vec::with_capacity(jobs.len());
        for path in &jobs {
            let job = Job::load(path)?;
            if job.status() != Status::Finished {
                return Err(RecordError::Malformed(format!(
                    "unfinished job record {}",
                    path.display()
                )));
            }
            decoded.push(job);
        }
        decoded.sort_by_key(|j| j.start);

        if decoded[0].start > 2 {
            return Err(RecordError::Malformed(format!(
                "job coverage starts at {}, cache must start at 2",
                decoded[0].start
            )));
        }
        let mut primes = Vec::new();
        let mut covered = decoded[0].start;
        for job in &decoded {
            if job.start > covered {
                return Err(RecordError::Malformed(format!(
                    "gap in job coverage at {covered}, next job starts at {}",
                    job.start
                )));
            }
            covered = covered.max(job.start + job.count);
            primes.extend_from_slice(&job.primes);
        }
        info!(
            jobs = decoded.len(),
            primes = primes.len(),
            highest_checked = covered,
            "assembled prime cache from finished jobs"
        );
        Ok(PrimeCache {
            version: FormatVersion::LATEST,
            compression: Compression::ChainDelta,
            highest_checked: covered,
            primes,
        })
    }

    pub fn encode(&self) -> Result<Vec<u8>, RecordError> {
        match self.version {
            FormatVersion::V1_0_0 => Ok(self.encode_v1_0_0()),
            FormatVersion::V1_1_0 => Ok(self.encode_v1_1_0()),
            FormatVersion::V1_2_0 => self.encode_v1_2_0(),
            other => Err(RecordError::IncompatibleVersion(other)),
        }
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < 3 {
            return Err(RecordError::Malformed(format!(
                "cache too short for version header ({} bytes)",
                bytes.len()
            )));
        }
        let version = FormatVersion::new(bytes[0], bytes[1], bytes[2]);
        match version {
            FormatVersion::V1_0_0 => Self::decode_v1_0_0(bytes),
            FormatVersion::V1_1_0 => Self::decode_v1_1_0(bytes),
            FormatVersion::V1_2_0 => Self::decode_v1_2_0(bytes),
            other => Err(RecordError::IncompatibleVersion(other)),
        }
    }

    /// Write to disk, streaming the v1.2.0 payload block by block.
    pub fn save(&self, path: &Path) -> Result<(), RecordError> {
        if self.version != FormatVersion::V1_2_0 {
            let bytes = self.encode()?;
            fs::write(path, bytes)?;
            return Ok(());
        }

        let mut out = BufWriter::new(fs::File::create(path)?);
        out.write_all(&[self.version.major, self.version.minor, self.version.patch])
            .map_err(RecordError::Io)?;
        out.write_all(&[self.compression.to_flags()])
            .map_err(RecordError::Io)?;
        out.write_all(&self.highest_checked.to_le_bytes())
            .map_err(RecordError::Io)?;
        let mut last = 0u64;
        chain_delta::stream_compress(&mut out, &self.primes, &mut last)?;
        out.flush().map_err(RecordError::Io)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, RecordError> {
        let bytes = fs::read(path)?;
        Self::decode(&bytes)
    }

    fn encode_v1_0_0(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(7 + self.primes.len() * 8);
        out.extend_from_slice(&[self.version.major, self.version.minor, self.version.patch]);
        out.extend_from_slice(&(self.primes.len() as u32).to_le_bytes());
        for &p in &self.primes {
            out.extend_from_slice(&p.to_le_bytes());
        }
        out
    }

    fn encode_v1_1_0(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(15 + self.primes.len() * 8);
        out.extend_from_slice(&[self.version.major, self.version.minor, self.version.patch]);
        out.extend_from_slice(&self.highest_checked.to_le_bytes());
        out.extend_from_slice(&(self.primes.len() as u32).to_le_bytes());
        for &p in &self.primes {
            out.extend_from_slice(&p.to_le_bytes());
        }
        out
    }

    fn encode_v1_2_0(&self) -> Result<Vec<u8>, RecordError> {
        let mut out = Vec::with_capacity(12 + self.primes.len() * 2);
        out.extend_from_slice(&[self.version.major, self.version.minor, self.version.patch]);
        out.push(self.compression.to_flags());
        out.extend_from_slice(&self.highest_checked.to_le_bytes());
        match self.compression {
            Compression::None => {
                for &p in &self.primes {
                    out.extend_from_slice(&p.to_le_bytes());
                }
            }
            Compression::ReferenceDelta => out.extend_from_slice(
                &crate::compress::reference_delta::compress(&self.primes)?,
            ),
            Compression::ChainDelta => out.extend_from_slice(&chain_delta::compress(&self.primes)),
        }
        Ok(out)
    }

    fn decode_v1_0_0(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < 7 {
            return Err(RecordError::Malformed(format!(
                "cache truncated: {} bytes, header needs 7",
                bytes.len()
            )));
        }
        let prime_count = u32::from_le_bytes(bytes[3..7].try_into().unwrap()) as usize;
        let primes = read_raw_primes(&bytes[7..], prime_count)?;
        let highest_checked = primes.last().copied().unwrap_or(0);
        Ok(PrimeCache {
            version: FormatVersion::V1_0_0,
            compression: Compression::None,
            highest_checked,
            primes,
        })
    }

    fn decode_v1_1_0(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < 15 {
            return Err(RecordError::Malformed(format!(
                "cache truncated: {} bytes, header needs 15",
                bytes.len()
            )));
        }
        let highest_checked = u64::from_le_bytes(bytes[3..11].try_into().unwrap());
        let prime_count = u32::from_le_bytes(bytes[11..15].try_into().unwrap()) as usize;
        let primes = read_raw_primes(&bytes[15..], prime_count)?;
        Ok(PrimeCache {
            version: FormatVersion::V1_1_0,
            compression: Compression::None,
            highest_checked,
            primes,
        })
    }

    fn decode_v1_2_0(bytes: &[u8]) -> Result<Self, RecordError> {
        if bytes.len() < 12 {
            return Err(RecordError::Malformed(format!(
                "cache truncated: {} bytes, header needs 12",
                bytes.len()
            )));
        }
        let compression = Compression::from_flags(bytes[3])?;
        let highest_checked = u64::from_le_bytes(bytes[4..12].try_into().unwrap());
        let payload = &bytes[12..];
        let primes = match compression {
            Compression::None => {
                if payload.len() % 8 != 0 {
                    return Err(RecordError::Malformed(format!(
                        "raw cache payload length {} is not a multiple of 8",
                        payload.len()
                    )));
                }
                payload
                    .chunks_exact(8)
                    .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
                    .collect()
            }
            Compression::ReferenceDelta => crate::compress::reference_delta::decompress(payload)?,
            Compression::ChainDelta => {
                chain_delta::stream_decompress(&mut BufReader::new(payload))?
            }
        };
        Ok(PrimeCache {
            version: FormatVersion::V1_2_0,
            compression,
            highest_checked,
            primes,
        })
    }
}

fn read_raw_primes(bytes: &[u8], count: usize) -> Result<Vec<u64>, RecordError> {
    if bytes.len() < count * 8 {
        return Err(RecordError::Malformed(format!(
            "cache payload holds {} bytes but header declares {} primes",
            bytes.len(),
            count
        )));
    }
    Ok(bytes[..count * 8]
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

fn collect_job_files(dir: &Path, out: &mut Vec<std::path::PathBuf>) -> Result<(), RecordError> {
    if !dir.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_job_files(&path, out)?;
        } else if path.extension().is_some_and(|e| e == "primejob") {
            out.push(path);
        }
    }
    Ok(())
}
