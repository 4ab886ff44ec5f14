//! # Compress — Delta Codecs for Ascending Prime Sequences
//!
//! Two codecs shrink a strictly ascending `u64` sequence into a byte stream
//! of one raw 8-byte anchor followed by 2-byte little-endian deltas. A delta
//! wider than 16 bits is escaped: the reserved sentinel `0x0000` is emitted,
//! then the full 8-byte value. A zero delta (a repeated value, as produced
//! by a corrupted record awaiting repair) is escaped the same way, so the
//! sentinel is unambiguous and every sequence round-trips.
//!
//! - **Reference-delta**: deltas are measured against a fixed anchor that
//!   only moves when an escape occurs. Dense runs near the anchor stay at
//!   2 bytes each; requires at least two input values.
//! - **Chain-delta**: the anchor is always the immediately preceding value.
//!   Handles empty input (empty output) and arbitrary gaps gracefully, so it
//!   is the default for job payloads.
//!
//! ## Streaming
//!
//! Prime caches can exceed memory, so chain-delta also has a streaming form:
//! [`chain_delta::stream_compress`] accepts append batches and carries the
//! last written value as explicit cross-call state (`0` = nothing written
//! yet), flushing in fixed 64 KiB blocks. [`chain_delta::stream_decompress`]
//! consumes the same block size and refills mid-block when an escaped 8-byte
//! value straddles a block boundary.

use crate::error::CodecError;

/// Escape threshold: any delta above this is stored raw.
const MAX_DELTA: u64 = 0xFFFF;

/// Block granularity for the streaming chain codec.
const BLOCK_SIZE: usize = 65_536;

fn push_escape(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&[0, 0]);
    out.extend_from_slice(&value.to_le_bytes());
}

fn read_u16(bytes: &[u8], at: usize) -> Result<u16, CodecError> {
    let b: [u8; 2] = bytes
        .get(at..at + 2)
        .ok_or(CodecError::Truncated { offset: at })?
        .try_into()
        .unwrap();
    Ok(u16::from_le_bytes(b))
}

fn read_u64(bytes: &[u8], at: usize) -> Result<u64, CodecError> {
    let b: [u8; 8] = bytes
        .get(at..at + 8)
        .ok_or(CodecError::Truncated { offset: at })?
        .try_into()
        .unwrap();
    Ok(u64::from_le_bytes(b))
}

pub mod reference_delta {
    use super::*;

    /// Compress an ascending sequence against a re-anchoring reference.
    ///
    /// Fails with [`CodecError::TooFewValues`] for fewer than two values:
    /// the format needs one raw anchor plus at least one delta.
    pub fn compress(values: &[u64]) -> Result<Vec<u8>, CodecError> {
        if values.len() < 2 {
            return Err(CodecError::TooFewValues {
                required: 2,
                got: values.len(),
            });
        }

        let mut out = Vec::with_capacity(8 + (values.len() - 1) * 2);
        out.extend_from_slice(&values[0].to_le_bytes());

        let mut anchor = values[0];
        for &value in &values[1..] {
            let delta = value.wrapping_sub(anchor);
            if delta == 0 || delta > MAX_DELTA {
                push_escape(&mut out, value);
                anchor = value;
            } else {
                out.extend_from_slice(&(delta as u16).to_le_bytes());
            }
        }
        Ok(out)
    }

    /// Exact inverse of [`compress`], tracking the same anchor-update rule.
    pub fn decompress(bytes: &[u8]) -> Result<Vec<u64>, CodecError> {
        if bytes.len() < 8 {
            return Err(CodecError::Truncated { offset: 0 });
        }

        let mut anchor = read_u64(bytes, 0)?;
        let mut values = vec![anchor];

        let mut at = 8;
        while at < bytes.len() {
            let delta = read_u16(bytes, at)?;
            at += 2;
            if delta == 0 {
                let value = read_u64(bytes, at)?;
                at += 8;
                values.push(value);
                anchor = value;
            } else {
                values.push(anchor.wrapping_add(delta as u64));
            }
        }
        Ok(values)
    }
}

pub mod chain_delta {
    use super::*;
    use std::io::{Read, Write};

    /// Compress an ascending sequence, anchoring each delta to the previous
    /// value. Empty input yields empty output.
    pub fn compress(values: &[u64]) -> Vec<u8> {
        let Some(&first) = values.first() else {
            return Vec::new();
        };

        let mut out = Vec::with_capacity(8 + (values.len() - 1) * 2);
        out.extend_from_slice(&first.to_le_bytes());

        for pair in values.windows(2) {
            let delta = pair[1].wrapping_sub(pair[0]);
            if delta == 0 || delta > MAX_DELTA {
                push_escape(&mut out, pair[1]);
            } else {
                out.extend_from_slice(&(delta as u16).to_le_bytes());
            }
        }
        out
    }

    /// Exact inverse of [`compress`]. Empty input yields an empty sequence.
    pub fn decompress(bytes: &[u8]) -> Result<Vec<u64>, CodecError> {
        if bytes.is_empty() {
            return Ok(Vec::new());
        }

        let mut last = read_u64(bytes, 0)?;
        let mut values = vec![last];

        let mut at = 8;
        while at < bytes.len() {
            let delta = read_u16(bytes, at)?;
            at += 2;
            if delta == 0 {
                last = read_u64(bytes, at)?;
                at += 8;
            } else {
                last = last.wrapping_add(delta as u64);
            }
            values.push(last);
        }
        Ok(values)
    }

    /// Append a batch of values to a chain-delta stream.
    ///
    /// `last` is the cross-call anchor state: pass `0` for a fresh stream
    /// (the first value is then written raw) and reuse the same variable for
    /// every subsequent batch. Output is flushed in [`BLOCK_SIZE`] chunks so
    /// arbitrarily large sequences never accumulate in memory. Batched calls
    /// produce byte-identical output to a single [`compress`] call.
    pub fn stream_compress<W: Write>(
        writer: &mut W,
        append: &[u64],
        last: &mut u64,
    ) -> Result<(), CodecError> {
        let mut block: Vec<u8> = Vec::with_capacity(BLOCK_SIZE + 10);
        let mut values = append.iter();

        if *last == 0 {
            let Some(&first) = values.next() else {
                return Ok(());
            };
            block.extend_from_slice(&first.to_le_bytes());
            *last = first;
        }

        for &value in values {
            let delta = value.wrapping_sub(*last);
            if delta == 0 || delta > MAX_DELTA {
                push_escape(&mut block, value);
            } else {
                block.extend_from_slice(&(delta as u16).to_le_bytes());
            }
            *last = value;

            if block.len() > BLOCK_SIZE {
                writer.write_all(&block)?;
                block.clear();
            }
        }

        writer.write_all(&block)?;
        writer.flush()?;
        Ok(())
    }

    /// Decompress an entire chain-delta stream.
    ///
    /// Reads in [`BLOCK_SIZE`] chunks. An escaped 8-byte value that straddles
    /// a block boundary triggers an additional read before decoding, so the
    /// caller's reader may hand out bytes at any granularity.
    pub fn stream_decompress<R: Read>(reader: &mut R) -> Result<Vec<u64>, CodecError> {
        let mut buf: Vec<u8> = Vec::with_capacity(BLOCK_SIZE);
        let mut pos = 0usize;
        let mut eof = false;

        // Keeps at least `need` unconsumed bytes buffered, or hits EOF trying.
        fn refill<R: Read>(
            reader: &mut R,
            buf: &mut Vec<u8>,
            pos: &mut usize,
            eof: &mut bool,
            need: usize,
        ) -> Result<(), CodecError> {
            while !*eof && buf.len() - *pos < need {
                buf.drain(..*pos);
                *pos = 0;
                let old_len = buf.len();
                buf.resize(old_len + BLOCK_SIZE, 0);
                let n = reader.read(&mut buf[old_len..])?;
                buf.truncate(old_len + n);
                if n == 0 {
                    *eof = true;
                }
            }
            Ok(())
        }

        refill(reader, &mut buf, &mut pos, &mut eof, 8)?;
        if buf.is_empty() {
            return Ok(Vec::new());
        }
        if buf.len() < 8 {
            return Err(CodecError::Truncated { offset: buf.len() });
        }

        let mut last = u64::from_le_bytes(buf[..8].try_into().unwrap());
        let mut values = vec![last];
        pos = 8;

        loop {
            refill(reader, &mut buf, &mut pos, &mut eof, 2)?;
            let remaining = buf.len() - pos;
            if remaining == 0 {
                break;
            }
            if remaining == 1 {
                return Err(CodecError::Truncated { offset: pos });
            }

            let delta = u16::from_le_bytes(buf[pos..pos + 2].try_into().unwrap());
            pos += 2;

            if delta == 0 {
                refill(reader, &mut buf, &mut pos, &mut eof, 8)?;
                if buf.len() - pos < 8 {
                    return Err(CodecError::Truncated { offset: pos });
                }
                last = u64::from_le_bytes(buf[pos..pos + 8].try_into().unwrap());
                pos += 8;
            } else {
                last = last.wrapping_add(delta as u64);
            }
            values.push(last);
        }
        Ok(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    /// A reader that hands out at most `chunk` bytes per read call, to force
    /// escape values to straddle internal block refills.
    struct Dribble<'a> {
        data: &'a [u8],
        at: usize,
        chunk: usize,
    }

    impl Read for Dribble<'_> {
        fn read(&mut self, out: &mut [u8]) -> std::io::Result<usize> {
            let n = self.chunk.min(out.len()).min(self.data.len() - self.at);
            out[..n].copy_from_slice(&self.data[self.at..self.at + n]);
            self.at += n;
            Ok(n)
        }
    }

    fn gappy_sequence() -> Vec<u64> {
        // Dense run (2-byte deltas) followed by a gap over 0xFFFF (escape)
        // followed by another dense run.
        let mut seq: Vec<u64> = (0..200).map(|i| 1_000 + i * 17).collect();
        seq.push(10_000_000);
        seq.extend((1..100).map(|i| 10_000_000 + i * 2));
        seq
    }

    // ── Reference-delta ────────────────────────────────────────────

    #[test]
    fn reference_roundtrip_with_escapes() {
        let seq = gappy_sequence();
        let bytes = reference_delta::compress(&seq).unwrap();
        assert_eq!(reference_delta::decompress(&bytes).unwrap(), seq);
    }

    #[test]
    fn reference_rejects_short_input() {
        assert!(matches!(
            reference_delta::compress(&[]),
            Err(CodecError::TooFewValues { got: 0, .. })
        ));
        assert!(matches!(
            reference_delta::compress(&[7]),
            Err(CodecError::TooFewValues { got: 1, .. })
        ));
    }

    #[test]
    fn reference_anchor_moves_only_on_escape() {
        // 100, 200, 300 share the anchor 100; the jump to 100_000 re-anchors,
        // and 100_100 is a delta against the new anchor.
        let seq = [100u64, 200, 300, 100_000, 100_100];
        let bytes = reference_delta::compress(&seq).unwrap();
        // anchor(8) + 2 deltas(4) + escape(10) + 1 delta(2)
        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[12..14], &[0, 0]);
        assert_eq!(reference_delta::decompress(&bytes).unwrap(), seq);
    }

    #[test]
    fn reference_repeated_anchor_value_roundtrips() {
        let seq = [100u64, 100, 200];
        let bytes = reference_delta::compress(&seq).unwrap();
        // The repeat escapes rather than emitting a literal zero delta.
        assert_eq!(&bytes[8..10], &[0, 0]);
        assert_eq!(reference_delta::decompress(&bytes).unwrap(), seq);
    }

    #[test]
    fn reference_decompress_rejects_missing_anchor() {
        assert!(matches!(
            reference_delta::decompress(&[1, 2, 3]),
            Err(CodecError::Truncated { .. })
        ));
    }

    // ── Chain-delta ────────────────────────────────────────────────

    #[test]
    fn chain_roundtrip_with_escapes() {
        let seq = gappy_sequence();
        let bytes = chain_delta::compress(&seq);
        assert_eq!(chain_delta::decompress(&bytes).unwrap(), seq);
    }

    #[test]
    fn chain_empty_is_empty() {
        assert!(chain_delta::compress(&[]).is_empty());
        assert!(chain_delta::decompress(&[]).unwrap().is_empty());
    }

    #[test]
    fn chain_single_value_is_raw_anchor() {
        let bytes = chain_delta::compress(&[42]);
        assert_eq!(bytes, 42u64.to_le_bytes());
        assert_eq!(chain_delta::decompress(&bytes).unwrap(), vec![42]);
    }

    #[test]
    fn chain_anchor_advances_every_step() {
        // Consecutive gaps of 0xFFFF each stay 2-byte encoded because the
        // anchor chases the sequence; reference-delta would have escaped.
        let seq = [10u64, 10 + 0xFFFF, 10 + 2 * 0xFFFF, 10 + 3 * 0xFFFF];
        let bytes = chain_delta::compress(&seq);
        assert_eq!(bytes.len(), 8 + 3 * 2);
        assert_eq!(chain_delta::decompress(&bytes).unwrap(), seq);
    }

    #[test]
    fn chain_sentinel_never_ambiguous() {
        // A gap of exactly 0x10000 forces the escape; a gap of 0xFFFF does not.
        let bytes = chain_delta::compress(&[5, 5 + 0x10000]);
        assert_eq!(&bytes[8..10], &[0, 0]);
        let bytes = chain_delta::compress(&[5, 5 + 0xFFFF]);
        assert_eq!(&bytes[8..10], &[0xFF, 0xFF]);
    }

    #[test]
    fn chain_repeated_value_escapes_instead_of_faking_sentinel() {
        // A zero delta written literally would read back as the escape
        // sentinel and mis-parse the following bytes as a raw value.
        let seq = [7u64, 11, 11, 13];
        let bytes = chain_delta::compress(&seq);
        // anchor(8) + delta(2) + escape(10) + delta(2)
        assert_eq!(bytes.len(), 22);
        assert_eq!(&bytes[10..12], &[0, 0]);
        assert_eq!(chain_delta::decompress(&bytes).unwrap(), seq);
    }

    #[test]
    fn chain_truncated_escape_is_error() {
        let mut bytes = chain_delta::compress(&[5, 5 + 0x10000]);
        bytes.truncate(bytes.len() - 3);
        assert!(matches!(
            chain_delta::decompress(&bytes),
            Err(CodecError::Truncated { .. })
        ));
    }

    // ── Streaming chain-delta ──────────────────────────────────────

    #[test]
    fn stream_compress_matches_one_shot() {
        let seq = gappy_sequence();
        let one_shot = chain_delta::compress(&seq);

        for split in [1, 7, 100, seq.len() - 1] {
            let mut out = Vec::new();
            let mut last = 0u64;
            chain_delta::stream_compress(&mut out, &seq[..split], &mut last).unwrap();
            chain_delta::stream_compress(&mut out, &seq[split..], &mut last).unwrap();
            assert_eq!(out, one_shot, "split at {split} diverged");
        }
    }

    #[test]
    fn stream_compress_three_batches() {
        let seq = gappy_sequence();
        let one_shot = chain_delta::compress(&seq);

        let mut out = Vec::new();
        let mut last = 0u64;
        for batch in seq.chunks(53) {
            chain_delta::stream_compress(&mut out, batch, &mut last).unwrap();
        }
        assert_eq!(out, one_shot);
    }

    #[test]
    fn stream_compress_repeated_value_matches_one_shot() {
        let seq = [7u64, 11, 11, 13];
        let one_shot = chain_delta::compress(&seq);

        let mut out = Vec::new();
        let mut last = 0u64;
        chain_delta::stream_compress(&mut out, &seq[..2], &mut last).unwrap();
        chain_delta::stream_compress(&mut out, &seq[2..], &mut last).unwrap();
        assert_eq!(out, one_shot);
        assert_eq!(
            chain_delta::stream_decompress(&mut out.as_slice()).unwrap(),
            seq
        );
    }

    #[test]
    fn stream_decompress_roundtrip() {
        let seq = gappy_sequence();
        let bytes = chain_delta::compress(&seq);
        let got = chain_delta::stream_decompress(&mut bytes.as_slice()).unwrap();
        assert_eq!(got, seq);
    }

    #[test]
    fn stream_decompress_handles_straddled_escape() {
        // Many escapes, delivered a few bytes at a time, so raw 8-byte values
        // regularly straddle refill boundaries.
        let seq: Vec<u64> = (0..5_000).map(|i| 1 + i * 0x20000).collect();
        let bytes = chain_delta::compress(&seq);
        for chunk in [1, 3, 7, 13] {
            let mut reader = Dribble {
                data: &bytes,
                at: 0,
                chunk,
            };
            let got = chain_delta::stream_decompress(&mut reader).unwrap();
            assert_eq!(got, seq, "chunk size {chunk} diverged");
        }
    }

    #[test]
    fn stream_decompress_empty_stream() {
        let got = chain_delta::stream_decompress(&mut [].as_slice()).unwrap();
        assert!(got.is_empty());
    }

    #[test]
    fn stream_decompress_large_sequence_spans_blocks() {
        // > 64 KiB of encoded output exercises multiple block refills.
        let seq: Vec<u64> = (0..100_000u64).map(|i| 3 + i * 2).collect();
        let bytes = chain_delta::compress(&seq);
        assert!(bytes.len() > super::BLOCK_SIZE);
        let got = chain_delta::stream_decompress(&mut bytes.as_slice()).unwrap();
        assert_eq!(got, seq);
    }
}
