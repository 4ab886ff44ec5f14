//! # Job — Versioned Binary Job Records
//!
//! A `Job` is one persisted, resumable unit of prime-search work: a
//! contiguous candidate range plus the primes found so far. Jobs live on
//! disk as `{start}.primejob` files in a little-endian binary layout
//! selected by the first three header bytes (major/minor/patch).
//!
//! ## Supported layouts
//!
//! ```text
//! v1.0.0:  0 ver(3)  3 start(8)  11 count(8)  19 progress(8)  27 primeCount(4)  31 primes
//! v1.1.0:  0 ver(3)  3 batch(4)  7 start(8)   15 count(8)     23 progress(8)    31 primeCount(4)  35 primes
//! v1.2.0:  0 ver(3)  3 comp(1)   4 batch(4)   8 start(8)      16 count(8)       24 progress(8)    32 payload
//! ```
//!
//! Only v1.2.0 carries a compression flag byte; its payload is raw packed
//! u64s or the output of one of the delta codecs in [`crate::compress`].
//! Serialization always writes the job's own declared version — old records
//! are never silently upgraded. Decoding any other version fails with
//! [`RecordError::IncompatibleVersion`].
//!
//! [`peek_status_from_file`] reads only the fixed header prefix, so the
//! distributor can scan thousands of job files without touching their
//! (potentially large, compressed) prime payloads.

use std::fmt;
use std::fs;
use std::io::Read;
use std::path::Path;

use crate::compress::{chain_delta, reference_delta};
use crate::error::RecordError;

/// Three-byte record format version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatVersion {
    pub major: u8,
    pub minor: u8,
    pub patch: u8,
}

impl FormatVersion {
    pub const V1_0_0: FormatVersion = FormatVersion::new(1, 0, 0);
    pub const V1_1_0: FormatVersion = FormatVersion::new(1, 1, 0);
    pub const V1_2_0: FormatVersion = FormatVersion::new(1, 2, 0);

    /// The version newly generated records are written in.
    pub const LATEST: FormatVersion = Self::V1_2_0;

    pub const fn new(major: u8, minor: u8, patch: u8) -> Self {
        FormatVersion {
            major,
            minor,
            patch,
        }
    }

    pub fn is_supported(self) -> bool {
        matches!(self, Self::V1_0_0 | Self::V1_1_0 | Self::V1_2_0)
    }
}

impl fmt::Display for FormatVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Payload compression, stored as a flag byte in v1.2.0 records.
///
/// Wire bit 0 = reference-delta, bit 1 = chain-delta. The legacy format
/// allowed both bits at once with chain-delta taking precedence; in memory
/// that ambiguity is unrepresentable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Compression {
    /// Raw packed 8-byte values.
    None,
    ReferenceDelta,
    #[default]
    ChainDelta,
}

impl Compression {
    pub fn to_flags(self) -> u8 {
        match self {
            Compression::None => 0b00,
            Compression::ReferenceDelta => 0b01,
            Compression::ChainDelta => 0b10,
        }
    }

    /// Decode a legacy flag byte. Both bits set resolves to chain-delta;
    /// unknown high bits are malformed.
    pub fn from_flags(flags: u8) -> Result<Self, RecordError> {
        match flags {
            0b00 => Ok(Compression::None),
            0b01 => Ok(Compression::ReferenceDelta),
            0b10 | 0b11 => Ok(Compression::ChainDelta),
            other => Err(RecordError::Malformed(format!(
                "unknown compression flags {other:#010b}"
            ))),
        }
    }
}

/// Derived job state; computed from `progress`/`count`, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    NotStarted,
    Started,
    Finished,
}

fn derive_status(progress: u64, count: u64) -> Status {
    if progress == 0 {
        Status::NotStarted
    } else if progress == count {
        Status::Finished
    } else {
        Status::Started
    }
}

/// One resumable unit of prime-search work over `start .. start + count`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Job {
    pub version: FormatVersion,
    pub compression: Compression,
    /// Grouping key for external packaging; not interpreted here.
    pub batch: u32,
    pub start: u64,
    pub count: u64,
    /// Offset from `start` up to which candidates are exhausted.
    pub progress: u64,
    /// Strictly ascending primes found so far, all within range.
    pub primes: Vec<u64>,
}

impl Job {
    /// Fresh untouched job in the latest format with default compression.
    pub fn new(batch: u32, start: u64, count: u64) -> Self {
        Job {
            version: FormatVersion::LATEST,
            compression: Compression::default(),
            batch,
            start,
            count,
            progress: 0,
            primes: Vec::new(),
        }
    }

    pub fn status(&self) -> Status {
        derive_status(self.progress, self.count)
    }

    /// Serialize using the job's own declared version.
    pub fn encode(&self) -> Result<Vec<u8>, RecordError> {
        match self.version {
            FormatVersion::V1_0_0 => Ok(self.encode_v1_0_0()),
            FormatVersion::V1_1_0 => Ok(self.encode_v1_1_0()),
            FormatVersion::V1_2_0 => self.encode_v1_2_0(),
            other => Err(RecordError::IncompatibleVersion(other)),
        }
    }

    /// Deserialize, dispatching on the three-byte version header.
    pub fn decode(bytes: &[u8]) -> Result<Self, RecordError> {
        let version = read_version(bytes)?;
        match version {
            FormatVersion::V1_0_0 => Self::decode_v1_0_0(bytes),
            FormatVersion::V1_1_0 => Self::decode_v1_1_0(bytes),
            FormatVersion::V1_2_0 => Self::decode_v1_2_0(bytes),
            other => Err(RecordError::IncompatibleVersion(other)),
        }
    }

    pub fn save(&self, path: &Path) -> Result<(), RecordError> {
        let bytes = self.encode()?;
        fs::write(path, bytes)?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, RecordError> {
        let bytes = fs::read(path)?;
        Self::decode(&bytes)
    }

    fn encode_v1_0_0(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(31 + self.primes.len() * 8);
        out.extend_from_slice(&[self.version.major, self.version.minor, self.version.patch]);
        out.extend_from_slice(&self.start.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&self.progress.to_le_bytes());
        out.extend_from_slice(&(self.primes.len() as u32).to_le_bytes());
        pack_u64s(&mut out, &self.primes);
        out
    }

    fn encode_v1_1_0(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(35 + self.primes.len() * 8);
        out.extend_from_slice(&[self.version.major, self.version.minor, self.version.patch]);
        out.extend_from_slice(&self.batch.to_le_bytes());
        out.extend_from_slice(&self.start.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&self.progress.to_le_bytes());
        out.extend_from_slice(&(self.primes.len() as u32).to_le_bytes());
        pack_u64s(&mut out, &self.primes);
        out
    }

    fn encode_v1_2_0(&self) -> Result<Vec<u8>, RecordError> {
        let mut out = Vec::with_capacity(32 + self.primes.len() * 8);
        out.extend_from_slice(&[self.version.major, self.version.minor, self.version.patch]);
        out.push(self.compression.to_flags());
        out.extend_from_slice(&self.batch.to_le_bytes());
        out.extend_from_slice(&self.start.to_le_bytes());
        out.extend_from_slice(&self.count.to_le_bytes());
        out.extend_from_slice(&self.progress.to_le_bytes());

        match self.compression {
            Compression::None => pack_u64s(&mut out, &self.primes),
            Compression::ReferenceDelta => {
                out.extend_from_slice(&reference_delta::compress(&self.primes)?)
            }
            Compression::ChainDelta => out.extend_from_slice(&chain_delta::compress(&self.primes)),
        }
        Ok(out)
    }

    fn decode_v1_0_0(bytes: &[u8]) -> Result<Self, RecordError> {
        require_len(bytes, 31)?;
        let start = read_u64(bytes, 3);
        let count = read_u64(bytes, 11);
        let progress = read_u64(bytes, 19);
        let prime_count = read_u32(bytes, 27) as usize;
        let primes = unpack_u64s(&bytes[31..], prime_count)?;
        Ok(Job {
            version: FormatVersion::V1_0_0,
            compression: Compression::None,
            batch: 0,
            start,
            count,
            progress,
            primes,
        })
    }

    fn decode_v1_1_0(bytes: &[u8]) -> Result<Self, RecordError> {
        require_len(bytes, 35)?;
        let batch = read_u32(bytes, 3);
        let start = read_u64(bytes, 7);
        let count = read_u64(bytes, 15);
        let progress = read_u64(bytes, 23);
        let prime_count = read_u32(bytes, 31) as usize;
        let primes = unpack_u64s(&bytes[35..], prime_count)?;
        Ok(Job {
            version: FormatVersion::V1_1_0,
            compression: Compression::None,
            batch,
            start,
            count,
            progress,
            primes,
        })
    }

    fn decode_v1_2_0(bytes: &[u8]) -> Result<Self, RecordError> {
        require_len(bytes, 32)?;
        let compression = Compression::from_flags(bytes[3])?;
        let batch = read_u32(bytes, 4);
        let start = read_u64(bytes, 8);
        let count = read_u64(bytes, 16);
        let progress = read_u64(bytes, 24);

        let payload = &bytes[32..];
        let primes = match compression {
            Compression::None => unpack_all_u64s(payload)?,
            Compression::ReferenceDelta => reference_delta::decompress(payload)?,
            Compression::ChainDelta => chain_delta::decompress(payload)?,
        };
        Ok(Job {
            version: FormatVersion::V1_2_0,
            compression,
            batch,
            start,
            count,
            progress,
            primes,
        })
    }
}

/// Read only the header fields needed to derive [`Status`].
pub fn peek_status(bytes: &[u8]) -> Result<Status, RecordError> {
    let version = read_version(bytes)?;
    let (count_at, needed) = match version {
        FormatVersion::V1_0_0 => (11, 27),
        FormatVersion::V1_1_0 => (15, 31),
        FormatVersion::V1_2_0 => (16, 32),
        other => return Err(RecordError::IncompatibleVersion(other)),
    };
    require_len(bytes, needed)?;
    let count = read_u64(bytes, count_at);
    let progress = read_u64(bytes, count_at + 8);
    Ok(derive_status(progress, count))
}

/// [`peek_status`] against a file, reading only the header prefix.
pub fn peek_status_from_file(path: &Path) -> Result<Status, RecordError> {
    // 35 bytes covers the largest fixed header (v1.1.0).
    let mut header = [0u8; 35];
    let mut file = fs::File::open(path)?;
    let mut filled = 0;
    while filled < header.len() {
        let n = file.read(&mut header[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    peek_status(&header[..filled])
}

/// Generate `job_count` contiguous untouched jobs, `jobs_per_batch` to a
/// batch starting at `starting_batch`.
pub fn generate_jobs(
    start: u64,
    count_per_job: u64,
    job_count: u64,
    starting_batch: u32,
    jobs_per_batch: u32,
) -> Result<Vec<Job>, RecordError> {
    if jobs_per_batch == 0 {
        return Err(RecordError::Malformed(
            "jobs_per_batch must be greater than zero".into(),
        ));
    }

    let mut jobs = Vec::with_capacity(job_count as usize);
    let mut batch = starting_batch;
    let mut in_batch = 0;
    for i in 0..job_count {
        jobs.push(Job::new(batch, start + count_per_job * i, count_per_job));
        in_batch += 1;
        if in_batch >= jobs_per_batch {
            in_batch = 0;
            batch += 1;
        }
    }
    Ok(jobs)
}

fn read_version(bytes: &[u8]) -> Result<FormatVersion, RecordError> {
    if bytes.len() < 3 {
        return Err(RecordError::Malformed(format!(
            "record too short for version header ({} bytes)",
            bytes.len()
        )));
    }
    Ok(FormatVersion::new(bytes[0], bytes[1], bytes[2]))
}

fn require_len(bytes: &[u8], needed: usize) -> Result<(), RecordError> {
    if bytes.len() < needed {
        return Err(RecordError::Malformed(format!(
            "record truncated: {} bytes, header needs {}",
            bytes.len(),
            needed
        )));
    }
    Ok(())
}

fn read_u32(bytes: &[u8], at: usize) -> u32 {
    u32::from_le_bytes(bytes[at..at + 4].try_into().unwrap())
}

fn read_u64(bytes: &[u8], at: usize) -> u64 {
    u64::from_le_bytes(bytes[at..at + 8].try_into().unwrap())
}

fn pack_u64s(out: &mut Vec<u8>, values: &[u64]) {
    for &v in values {
        out.extend_from_slice(&v.to_le_bytes());
    }
}

/// Unpack exactly `count` raw u64s (v1.0.0 / v1.1.0 payloads).
fn unpack_u64s(bytes: &[u8], count: usize) -> Result<Vec<u64>, RecordError> {
    if bytes.len() < count * 8 {
        return Err(RecordError::Malformed(format!(
            "prime payload holds {} bytes but header declares {} primes",
            bytes.len(),
            count
        )));
    }
    Ok(bytes[..count * 8]
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

/// Unpack a length-delimited raw payload (uncompressed v1.2.0).
fn unpack_all_u64s(bytes: &[u8]) -> Result<Vec<u64>, RecordError> {
    if bytes.len() % 8 != 0 {
        return Err(RecordError::Malformed(format!(
            "raw prime payload length {} is not a multiple of 8",
            bytes.len()
        )));
    }
    Ok(bytes
        .chunks_exact(8)
        .map(|c| u64::from_le_bytes(c.try_into().unwrap()))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CodecError;

    fn sample_job(version: FormatVersion, compression: Compression) -> Job {
        Job {
            version,
            compression,
            batch: 7,
            start: 1_000,
            count: 500,
            progress: 250,
            primes: vec![1_009, 1_013, 1_019, 1_021, 1_031],
        }
    }

    // ── Round-trips ────────────────────────────────────────────────

    #[test]
    fn roundtrip_v1_0_0() {
        let job = sample_job(FormatVersion::V1_0_0, Compression::None);
        let decoded = Job::decode(&job.encode().unwrap()).unwrap();
        // v1.0.0 has no batch field on the wire.
        assert_eq!(decoded.batch, 0);
        assert_eq!(decoded.start, job.start);
        assert_eq!(decoded.count, job.count);
        assert_eq!(decoded.progress, job.progress);
        assert_eq!(decoded.primes, job.primes);
    }

    #[test]
    fn roundtrip_v1_1_0() {
        let job = sample_job(FormatVersion::V1_1_0, Compression::None);
        let decoded = Job::decode(&job.encode().unwrap()).unwrap();
        assert_eq!(decoded, job);
    }

    #[test]
    fn roundtrip_v1_2_0_all_compressions() {
        for compression in [
            Compression::None,
            Compression::ReferenceDelta,
            Compression::ChainDelta,
        ] {
            let job = sample_job(FormatVersion::V1_2_0, compression);
            let decoded = Job::decode(&job.encode().unwrap()).unwrap();
            assert_eq!(decoded, job, "compression {compression:?}");
        }
    }

    #[test]
    fn roundtrip_v1_2_0_empty_primes_chain() {
        let mut job = sample_job(FormatVersion::V1_2_0, Compression::ChainDelta);
        job.primes.clear();
        let bytes = job.encode().unwrap();
        assert_eq!(bytes.len(), 32);
        assert_eq!(Job::decode(&bytes).unwrap(), job);
    }

    #[test]
    fn reference_delta_needs_two_primes() {
        let mut job = sample_job(FormatVersion::V1_2_0, Compression::ReferenceDelta);
        job.primes = vec![1_009];
        assert!(matches!(
            job.encode(),
            Err(RecordError::Codec(CodecError::TooFewValues { .. }))
        ));
    }

    #[test]
    fn roundtrip_with_escape_gap() {
        let mut job = sample_job(FormatVersion::V1_2_0, Compression::ChainDelta);
        job.count = 10_000_000;
        job.primes = vec![1_009, 1_013, 9_000_011, 9_000_041];
        let decoded = Job::decode(&job.encode().unwrap()).unwrap();
        assert_eq!(decoded.primes, job.primes);
    }

    #[test]
    fn duplicate_bearing_record_stays_loadable_for_repair() {
        // Corrupted records with a repeated prime must survive the
        // encode/decode trip so repair tooling can reach them.
        for compression in [Compression::ReferenceDelta, Compression::ChainDelta] {
            let mut job = sample_job(FormatVersion::V1_2_0, compression);
            job.primes = vec![1_009, 1_013, 1_013, 1_019];
            let decoded = Job::decode(&job.encode().unwrap()).unwrap();
            assert_eq!(decoded.primes, job.primes, "compression {compression:?}");
        }
    }

    // ── Header dispatch ────────────────────────────────────────────

    #[test]
    fn unsupported_version_is_incompatible() {
        let mut bytes = sample_job(FormatVersion::V1_1_0, Compression::None)
            .encode()
            .unwrap();
        bytes[1] = 3; // v1.3.0
        assert!(matches!(
            Job::decode(&bytes),
            Err(RecordError::IncompatibleVersion(v)) if v == FormatVersion::new(1, 3, 0)
        ));
    }

    #[test]
    fn encode_refuses_unsupported_version() {
        let mut job = sample_job(FormatVersion::V1_1_0, Compression::None);
        job.version = FormatVersion::new(0, 9, 0);
        assert!(matches!(
            job.encode(),
            Err(RecordError::IncompatibleVersion(_))
        ));
    }

    #[test]
    fn compression_flags_decode() {
        assert_eq!(Compression::from_flags(0b00).unwrap(), Compression::None);
        assert_eq!(
            Compression::from_flags(0b01).unwrap(),
            Compression::ReferenceDelta
        );
        assert_eq!(
            Compression::from_flags(0b10).unwrap(),
            Compression::ChainDelta
        );
        // Legacy double-flagged byte: chain-delta took precedence.
        assert_eq!(
            Compression::from_flags(0b11).unwrap(),
            Compression::ChainDelta
        );
        assert!(Compression::from_flags(0b100).is_err());
    }

    #[test]
    fn truncated_records_are_malformed() {
        let bytes = sample_job(FormatVersion::V1_2_0, Compression::None)
            .encode()
            .unwrap();
        assert!(matches!(
            Job::decode(&bytes[..2]),
            Err(RecordError::Malformed(_))
        ));
        assert!(matches!(
            Job::decode(&bytes[..20]),
            Err(RecordError::Malformed(_))
        ));
        // Raw v1.2.0 payload not a multiple of 8.
        assert!(matches!(
            Job::decode(&bytes[..bytes.len() - 3]),
            Err(RecordError::Malformed(_))
        ));
    }

    #[test]
    fn declared_prime_count_beyond_payload_is_malformed() {
        let mut bytes = sample_job(FormatVersion::V1_1_0, Compression::None)
            .encode()
            .unwrap();
        bytes[31..35].copy_from_slice(&1_000u32.to_le_bytes());
        assert!(matches!(
            Job::decode(&bytes),
            Err(RecordError::Malformed(_))
        ));
    }

    // ── Status ─────────────────────────────────────────────────────

    #[test]
    fn status_derivation() {
        let mut job = Job::new(0, 100, 50);
        assert_eq!(job.status(), Status::NotStarted);
        job.progress = 10;
        assert_eq!(job.status(), Status::Started);
        job.progress = 50;
        assert_eq!(job.status(), Status::Finished);
    }

    #[test]
    fn peek_status_all_versions() {
        for version in [
            FormatVersion::V1_0_0,
            FormatVersion::V1_1_0,
            FormatVersion::V1_2_0,
        ] {
            for (progress, expect) in [
                (0, Status::NotStarted),
                (250, Status::Started),
                (500, Status::Finished),
            ] {
                let mut job = sample_job(version, Compression::None);
                job.progress = progress;
                let bytes = job.encode().unwrap();
                assert_eq!(
                    peek_status(&bytes).unwrap(),
                    expect,
                    "{version} progress {progress}"
                );
            }
        }
    }

    #[test]
    fn peek_status_from_file_reads_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("123.primejob");
        let mut job = sample_job(FormatVersion::V1_2_0, Compression::ChainDelta);
        job.progress = 250;
        job.save(&path).unwrap();
        assert_eq!(peek_status_from_file(&path).unwrap(), Status::Started);
    }

    #[test]
    fn save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("1000.primejob");
        let job = sample_job(FormatVersion::V1_2_0, Compression::ChainDelta);
        job.save(&path).unwrap();
        assert_eq!(Job::load(&path).unwrap(), job);
    }

    // ── Generation ─────────────────────────────────────────────────

    #[test]
    fn generate_jobs_contiguous_and_batched() {
        let jobs = generate_jobs(1_000, 100, 7, 2, 3).unwrap();
        assert_eq!(jobs.len(), 7);
        for (i, job) in jobs.iter().enumerate() {
            assert_eq!(job.start, 1_000 + 100 * i as u64);
            assert_eq!(job.count, 100);
            assert_eq!(job.status(), Status::NotStarted);
        }
        let batches: Vec<u32> = jobs.iter().map(|j| j.batch).collect();
        assert_eq!(batches, vec![2, 2, 2, 3, 3, 3, 4]);
    }

    #[test]
    fn generate_jobs_rejects_zero_per_batch() {
        assert!(generate_jobs(0, 10, 1, 0, 0).is_err());
    }
}
