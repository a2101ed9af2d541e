//! Port traits: the boundary between the link layer and the rest of the
//! controller firmware.
//!
//! ```text
//!   Adapter ──▶ Port trait ──▶ LinkMux / XModem / shell
//! ```
//!
//! The motion-control core, the file system and the clock are external
//! collaborators. The link layer only ever sees them through these traits,
//! so every protocol path runs on the host against simulation adapters.

use std::io::{Read, Write};

// ───────────────────────────────────────────────────────────────
// Machine port (motion-control core as seen by the link layer)
// ───────────────────────────────────────────────────────────────

/// Status, halt and busy state of the motion-control core.
///
/// The console real-time characters (`?`, `*`, Ctrl-X, `!`, `~`) and the
/// transfer busy checks are routed through this port.
pub trait MachinePort {
    /// One-line machine status, sent in reply to `?`.
    fn query_string(&self) -> String;

    /// Diagnostic dump, sent in reply to `*`.
    fn diagnose_string(&self) -> String;

    /// Abort motion and enter the halted state (Ctrl-X).
    fn halt(&mut self);

    /// `true` when the controller speaks the grbl dialect, which changes
    /// the halt acknowledgement text.
    fn is_grbl_mode(&self) -> bool;

    /// Whether `!` / `~` feed-hold characters are honoured.
    fn feed_hold_enabled(&self) -> bool;

    /// Set or clear feed hold.
    fn set_feed_hold(&mut self, hold: bool);

    /// `true` when the motion queue is empty and a transfer may start.
    fn is_idle(&self) -> bool;

    /// `true` while an XModem upload owns the console byte stream.
    fn is_uploading(&self) -> bool;

    fn set_uploading(&mut self, uploading: bool);
}

// ───────────────────────────────────────────────────────────────
// Console sink (consumer of completed console lines)
// ───────────────────────────────────────────────────────────────

/// Receives complete console lines, one per main-loop pass.
///
/// Never called from interrupt or driver-receive context.
pub trait ConsoleSink {
    fn on_console_line(&mut self, line: &str);
}

// ───────────────────────────────────────────────────────────────
// Time port
// ───────────────────────────────────────────────────────────────

/// Monotonic clock plus blocking delay, used by the transfer protocol's
/// polling waits.
pub trait TimePort {
    /// Microseconds since boot.
    fn now_us(&self) -> u64;

    /// Block for `us` microseconds.
    fn delay_us(&mut self, us: u32);

    /// Block for `ms` milliseconds.
    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1_000);
        }
    }
}

// ───────────────────────────────────────────────────────────────
// File store port (SD card)
// ───────────────────────────────────────────────────────────────

/// Minimal file system surface needed by the transfer protocol.
///
/// Paths are absolute UTF-8 strings as typed on the console
/// (e.g. `/sd/gcodes/part.nc`).
pub trait FileStore {
    type Reader: Read;
    type Writer: Write;

    /// Open an existing file for reading.
    fn open(&self, path: &str) -> Result<Self::Reader, StorageError>;

    /// Create (or truncate) a file for writing.
    fn create(&mut self, path: &str) -> Result<Self::Writer, StorageError>;

    /// Delete a file. Returns `Ok(())` if it did not exist.
    fn remove(&mut self, path: &str) -> Result<(), StorageError>;

    fn exists(&self, path: &str) -> bool;

    /// Create a directory and all missing parents.
    fn create_dir_all(&mut self, path: &str) -> Result<(), StorageError>;
}

// ───────────────────────────────────────────────────────────────
// Error types
// ───────────────────────────────────────────────────────────────

/// Errors from [`FileStore`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested file does not exist.
    NotFound,
    /// Card or partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "file not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

impl From<std::io::Error> for StorageError {
    fn from(e: std::io::Error) -> Self {
        match e.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound,
            std::io::ErrorKind::StorageFull => Self::Full,
            _ => Self::IoError,
        }
    }
}
