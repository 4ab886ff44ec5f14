//! Error taxonomy for the on-disk record formats.
//!
//! Record-level failures are always scoped to the single file being read or
//! written: an incompatible header or a malformed payload never takes the
//! process down, callers log and move on to the next job.

use thiserror::Error;

use crate::job::FormatVersion;

#[derive(Error, Debug)]
pub enum RecordError {
    /// The three-byte version header names a layout this build cannot read.
    #[error("incompatible record version {0}")]
    IncompatibleVersion(FormatVersion),

    /// Length or field inconsistency; the record is unusable.
    #[error("malformed record: {0}")]
    Malformed(String),

    /// Compression payload could not be encoded or decoded.
    #[error("compression error: {0}")]
    Codec(#[from] CodecError),

    /// Propagated I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum CodecError {
    /// Reference-delta needs at least two values (one raw anchor + one delta).
    #[error("reference-delta requires at least {required} values, got {got}")]
    TooFewValues { required: usize, got: usize },

    /// Compressed payload ends mid-field (truncated delta or escape value).
    #[error("truncated compressed payload at byte {offset}")]
    Truncated { offset: usize },

    /// Propagated I/O error from the streaming variants.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
