//! Byte stream abstraction: any channel a transfer or shell command talks over.
//!
//! Concrete implementations:
//! - the WiFi console link ([`crate::link::stream::ConsoleStream`])
//! - a UART console, supplied by the surrounding firmware
//!
//! The transfer protocol is generic over `ByteStream`, so running it over a
//! new channel requires zero changes to the protocol logic.

use log::debug;

/// How the channel frames data, which decides the large block size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    /// Byte-at-a-time channel (UART, USB CDC).
    Serial,
    /// Frame-oriented channel (a TCP link through the radio).
    Packet,
}

impl StreamKind {
    /// Payload size of an STX block on this kind of channel.
    pub const fn stx_block_size(self) -> usize {
        match self {
            Self::Serial => 1024,
            Self::Packet => 8192,
        }
    }
}

/// Byte-oriented channel.
pub trait ByteStream {
    /// Error type for this stream.
    type Error: core::fmt::Debug;

    fn kind(&self) -> StreamKind;

    /// Read up to `buf.len()` bytes. Returns 0 if nothing is available
    /// (non-blocking).
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, Self::Error>;

    /// Write all of `data`, or fail.
    fn write(&mut self, data: &[u8]) -> Result<(), Self::Error>;

    fn flush(&mut self) -> Result<(), Self::Error> {
        Ok(())
    }

    /// Check if data is available for reading.
    fn available(&mut self) -> bool;

    /// Enable or disable interrupt-driven delivery of inbound data to the
    /// line accumulator. Streams without such a path ignore this.
    fn set_rx_interrupt(&mut self, _enabled: bool) {}

    /// Best-effort text output for status messages.
    fn print(&mut self, text: &str) {
        if let Err(e) = self.write(text.as_bytes()) {
            debug!("stream: dropped message ({:?})", e);
        }
    }
}
