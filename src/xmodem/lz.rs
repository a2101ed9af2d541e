//! Compressed upload container, DEFLATE blocks via `miniz_oxide`.
//!
//! ```text
//!   { u32 BE len │ raw DEFLATE block } ...  u16 BE sum
//! ```
//!
//! Each block inflates independently. The trailing sum is the 16-bit
//! wrapping sum of every decompressed byte.

use std::io::{self, Read, Write};

use log::{debug, warn};
use miniz_oxide::deflate::compress_to_vec;
use miniz_oxide::inflate::decompress_to_vec_with_limit;

pub const BLOCK_HEADER_LEN: usize = 4;

/// Uncompressed bytes per block written by [`compress_container`].
pub const COMPRESS_BLOCK_SIZE: usize = 4096;

/// Largest compressed block accepted.
pub const MAX_COMPRESSED_BLOCK: usize = 8192;

/// Largest decompressed block accepted.
pub const MAX_BLOCK_OUTPUT: usize = 8192;

/// DEFLATE compression level (1-10, higher = better ratio, slower).
const COMPRESSION_LEVEL: u8 = 6;

/// Progress is reported every this many blocks.
pub const PROGRESS_INTERVAL: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecompressError {
    /// A block header declared zero bytes.
    EmptyBlock,
    /// A block header declared more than [`MAX_COMPRESSED_BLOCK`].
    BlockTooLarge(usize),
    /// The container ended inside a block or before the checksum.
    Truncated,
    /// DEFLATE data was invalid or inflated past [`MAX_BLOCK_OUTPUT`].
    Inflate,
    ChecksumMismatch { expected: u16, actual: u16 },
    /// Reading the container or writing the output failed.
    Io,
}

impl core::fmt::Display for DecompressError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::EmptyBlock => write!(f, "empty block"),
            Self::BlockTooLarge(n) => write!(f, "block of {n} bytes exceeds {MAX_COMPRESSED_BLOCK}"),
            Self::Truncated => write!(f, "truncated container"),
            Self::Inflate => write!(f, "invalid compressed block"),
            Self::ChecksumMismatch { expected, actual } => {
                write!(f, "checksum mismatch (expected 0x{expected:04X}, got 0x{actual:04X})")
            }
            Self::Io => write!(f, "I/O error"),
        }
    }
}

impl From<io::Error> for DecompressError {
    fn from(_: io::Error) -> Self {
        Self::Io
    }
}

/// Outcome of a successful decompression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DecompressStats {
    pub blocks: u32,
    pub bytes: u64,
}

/// Read until `buf` is full or EOF; returns bytes read.
pub(super) fn read_up_to<R: Read>(input: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match input.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// Inflate a container from `input` into `output`.
///
/// `progress` is called with the running block count every
/// [`PROGRESS_INTERVAL`] blocks.
pub fn decompress_container<R: Read, W: Write>(
    mut input: R,
    mut output: W,
    mut progress: impl FnMut(u32),
) -> Result<DecompressStats, DecompressError> {
    let mut stats = DecompressStats::default();
    let mut sum: u16 = 0;
    let mut header = [0u8; BLOCK_HEADER_LEN];
    let mut block = Vec::with_capacity(MAX_COMPRESSED_BLOCK);

    loop {
        match read_up_to(&mut input, &mut header)? {
            BLOCK_HEADER_LEN => {}
            2 => {
                let expected = u16::from_be_bytes([header[0], header[1]]);
                if expected != sum {
                    warn!("lz: checksum 0x{:04X} != 0x{:04X}", sum, expected);
                    return Err(DecompressError::ChecksumMismatch {
                        expected,
                        actual: sum,
                    });
                }
                output.flush()?;
                return Ok(stats);
            }
            _ => return Err(DecompressError::Truncated),
        }

        let len = u32::from_be_bytes(header) as usize;
        if len == 0 {
            return Err(DecompressError::EmptyBlock);
        }
        if len > MAX_COMPRESSED_BLOCK {
            return Err(DecompressError::BlockTooLarge(len));
        }
        block.resize(len, 0);
        if read_up_to(&mut input, &mut block)? != len {
            return Err(DecompressError::Truncated);
        }

        let data = decompress_to_vec_with_limit(&block, MAX_BLOCK_OUTPUT).map_err(|e| {
            warn!("lz: block {} DEFLATE error: {:?}", stats.blocks, e.status);
            DecompressError::Inflate
        })?;
        if data.is_empty() {
            return Err(DecompressError::Inflate);
        }
        sum = data.iter().fold(sum, |s, &b| s.wrapping_add(u16::from(b)));
        output.write_all(&data)?;

        stats.blocks += 1;
        stats.bytes += data.len() as u64;
        if stats.blocks % PROGRESS_INTERVAL == 0 {
            progress(stats.blocks);
        }
        debug!("lz: block {} {} -> {} bytes", stats.blocks, len, data.len());
    }
}

/// Encode `data` as a container.
pub fn compress_container(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    let mut sum: u16 = 0;
    for chunk in data.chunks(COMPRESS_BLOCK_SIZE) {
        let block = compress_to_vec(chunk, COMPRESSION_LEVEL);
        out.extend_from_slice(&(block.len() as u32).to_be_bytes());
        out.extend_from_slice(&block);
        sum = chunk.iter().fold(sum, |s, &b| s.wrapping_add(u16::from(b)));
    }
    out.extend_from_slice(&sum.to_be_bytes());
    out
}

// ── Tests ────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn gcode(lines: usize) -> Vec<u8> {
        (0..lines)
            .map(|i| format!("G1 X{}.{:03} Y{} F1500\n", i % 97, i % 1000, i % 13))
            .collect::<String>()
            .into_bytes()
    }

    fn decompress(container: &[u8]) -> (Result<DecompressStats, DecompressError>, Vec<u8>, Vec<u32>) {
        let mut out = Vec::new();
        let mut ticks = Vec::new();
        let r = decompress_container(container, &mut out, |n| ticks.push(n));
        (r, out, ticks)
    }

    #[test]
    fn container_roundtrip_reports_progress() {
        let data = gcode(3000);
        assert!(data.len() > COMPRESS_BLOCK_SIZE * 10);
        let container = compress_container(&data);
        let (r, out, ticks) = decompress(&container);
        let stats = r.unwrap();
        assert_eq!(out, data);
        assert_eq!(stats.bytes, data.len() as u64);
        assert_eq!(stats.blocks as usize, data.len().div_ceil(COMPRESS_BLOCK_SIZE));
        assert_eq!(ticks.first(), Some(&10));
    }

    #[test]
    fn empty_input_is_just_a_checksum() {
        assert_eq!(compress_container(b""), vec![0, 0]);
        let (r, out, _) = decompress(&[0, 0]);
        assert_eq!(r.unwrap().blocks, 0);
        assert!(out.is_empty());
    }

    #[test]
    fn checksum_mismatch_detected() {
        let mut container = compress_container(b"G0 X0 Y0\n");
        let last = container.len() - 1;
        container[last] ^= 0xFF;
        let (r, out, _) = decompress(&container);
        assert!(matches!(r, Err(DecompressError::ChecksumMismatch { .. })));
        assert_eq!(out, b"G0 X0 Y0\n");
    }

    #[test]
    fn zero_length_block_rejected() {
        let (r, _, _) = decompress(&[0, 0, 0, 0, 0, 0]);
        assert_eq!(r, Err(DecompressError::EmptyBlock));
    }

    #[test]
    fn oversized_block_rejected() {
        let (r, _, _) = decompress(&[0, 0, 0x40, 0x00, 1, 2, 3]);
        assert_eq!(r, Err(DecompressError::BlockTooLarge(0x4000)));
    }

    #[test]
    fn truncated_block_rejected() {
        let container = compress_container(&gcode(50));
        let (r, _, _) = decompress(&container[..10]);
        assert_eq!(r, Err(DecompressError::Truncated));
    }

    #[test]
    fn garbage_block_rejected() {
        let (r, _, _) = decompress(&[0, 0, 0, 4, 0xFF, 0xFF, 0xFF, 0xFF, 0, 0]);
        assert_eq!(r, Err(DecompressError::Inflate));
    }
}
