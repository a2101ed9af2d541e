//! Reliable file transfer over a [`ByteStream`](crate::stream::ByteStream).
//!
//! ```text
//!   upload (peer ─▶ device)              download (device ─▶ peer)
//!   ──────────────────────               ─────────────────────────
//!   ◀─ 'C' | NAK  (handshake)            ◀─ 'C' | NAK
//!   ─▶ pkt 0: 32-byte MD5  ◀─ ACK        ─▶ pkt 0: 32-byte MD5  ◀─ ACK
//!   ─▶ pkt 1..n            ◀─ ACK/NAK    ─▶ pkt 1..n            ◀─ ACK/NAK
//!   ─▶ EOT                 ◀─ ACK        ─▶ EOT                 ◀─ ACK
//! ```
//!
//! Every wait is bounded by [`MAXRETRANS`] polls of [`TIMEOUT_MS`]. Upload
//! targets ending in `.lz` are stored as a compressed container and
//! inflated once the transfer completes.

pub mod crc;
pub mod digest;
pub mod lz;
pub mod packet;
pub mod paths;
mod receive;
mod send;
mod wire;

use core::fmt;

pub use crc::{crc16_ccitt, Mode};
pub use lz::{compress_container, decompress_container, DecompressError, DecompressStats};
pub use paths::{lz_path, md5_path, UploadTargets};

use crate::app::ports::{FileStore, StorageError, TimePort};

// ── Control bytes ─────────────────────────────────────────────

pub const SOH: u8 = 0x01;
pub const STX: u8 = 0x02;
pub const EOT: u8 = 0x04;
pub const ACK: u8 = 0x06;
pub const NAK: u8 = 0x15;
pub const CAN: u8 = 0x16;
/// Payload filler.
pub const CTRLZ: u8 = 0x1A;
/// Receiver handshake byte requesting CRC mode.
pub const CRC_REQUEST: u8 = b'C';

/// Retry and timeout budget for every bounded wait.
pub const MAXRETRANS: u32 = 10;
pub const TIMEOUT_MS: u32 = 100;
/// Interval between stream polls while waiting for a byte.
pub const POLL_US: u32 = 100;

// ── Errors ────────────────────────────────────────────────────

/// Why a transfer ended without success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransferError {
    /// The motion queue was not empty.
    MachineBusy,
    /// A payload or sidecar file could not be opened.
    Open { path: String },
    /// Writing or reading file data failed mid-transfer.
    Storage(StorageError),
    /// No usable handshake within the retry budget.
    Sync,
    /// The peer sent `CAN CAN`.
    Cancelled,
    /// [`MAXRETRANS`] consecutive packets were rejected or unanswered.
    TooManyRetries,
    /// The peer never acknowledged `EOT`.
    FinishAckMissing,
    /// The compressed upload arrived but did not inflate.
    Decompress(DecompressError),
}

impl TransferError {
    /// Status line printed to the transfer stream.
    pub fn console_message(&self) -> String {
        match self {
            Self::Cancelled => "Info: canceled by remote!\r\n".to_string(),
            other => format!("Error: {other}!\r\n"),
        }
    }
}

impl fmt::Display for TransferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MachineBusy => write!(f, "machine is busy"),
            Self::Open { path } => {
                let shown: String = path.chars().take(30).collect();
                write!(f, "failed to open file [{shown}]")
            }
            Self::Storage(e) => write!(f, "file write failed ({e})"),
            Self::Sync => write!(f, "sync error"),
            Self::Cancelled => write!(f, "canceled by remote"),
            Self::TooManyRetries => write!(f, "too many retry error"),
            Self::FinishAckMissing => write!(f, "get finish ACK error"),
            Self::Decompress(e) => write!(f, "decompress failed ({e})"),
        }
    }
}

impl From<StorageError> for TransferError {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

impl From<DecompressError> for TransferError {
    fn from(e: DecompressError) -> Self {
        Self::Decompress(e)
    }
}

/// Counters for a completed transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferStats {
    /// Data packets accepted or acknowledged, packet zero excluded.
    pub packets: u32,
    /// Payload bytes moved.
    pub bytes: u64,
    /// Whether the digest packet was exchanged.
    pub digest: bool,
}

// ── Engine ────────────────────────────────────────────────────

/// Transfer engine bound to a file store and a clock.
///
/// One transfer runs at a time; each call blocks until it completes.
pub struct XModem<F, T> {
    files: F,
    clock: T,
}

impl<F: FileStore, T: TimePort> XModem<F, T> {
    pub fn new(files: F, clock: T) -> Self {
        Self { files, clock }
    }

    pub fn files(&self) -> &F {
        &self.files
    }

    pub fn files_mut(&mut self) -> &mut F {
        &mut self.files
    }

    pub fn clock(&self) -> &T {
        &self.clock
    }
}
