//! Byte-level primitives shared by both transfer directions.

use log::debug;

use super::{ACK, CAN, MAXRETRANS, POLL_US, TIMEOUT_MS};
use crate::app::ports::TimePort;
use crate::stream::ByteStream;

/// A stream paired with the clock that bounds its waits.
pub(super) struct Wire<'a, S, T> {
    pub stream: &'a mut S,
    pub clock: &'a mut T,
}

impl<S: ByteStream, T: TimePort> Wire<'_, S, T> {
    /// Wait up to `timeout_ms` for one byte.
    pub fn read_byte(&mut self, timeout_ms: u32) -> Option<u8> {
        let mut b = [0u8; 1];
        let deadline = self.clock.now_us() + u64::from(timeout_ms) * 1_000;
        loop {
            match self.stream.read(&mut b) {
                Ok(1) => return Some(b[0]),
                Ok(_) => {}
                Err(e) => debug!("xmodem: read error {:?}", e),
            }
            if self.clock.now_us() >= deadline {
                return None;
            }
            self.clock.delay_us(POLL_US);
        }
    }

    /// Fill `buf`. Gives up after [`MAXRETRANS`] consecutive
    /// [`TIMEOUT_MS`] waits with no progress.
    pub fn read_exact(&mut self, buf: &mut [u8]) -> bool {
        let mut filled = 0;
        let mut idle_since = self.clock.now_us();
        let budget = u64::from(MAXRETRANS * TIMEOUT_MS) * 1_000;
        while filled < buf.len() {
            match self.stream.read(&mut buf[filled..]) {
                Ok(0) => {}
                Ok(n) => {
                    filled += n;
                    idle_since = self.clock.now_us();
                    continue;
                }
                Err(e) => debug!("xmodem: read error {:?}", e),
            }
            if self.clock.now_us() - idle_since >= budget {
                debug!("xmodem: short packet, {} of {} bytes", filled, buf.len());
                return false;
            }
            self.clock.delay_us(POLL_US);
        }
        true
    }

    pub fn put(&mut self, byte: u8) {
        self.send(&[byte]);
    }

    pub fn send(&mut self, data: &[u8]) {
        if let Err(e) = self.stream.write(data) {
            debug!("xmodem: write of {} bytes failed: {:?}", data.len(), e);
        }
    }

    /// Discard input until the line stays quiet for [`TIMEOUT_MS`].
    pub fn flush_input(&mut self) {
        while self.read_byte(TIMEOUT_MS).is_some() {}
    }

    /// Abort our side: CAN ×3, then drain.
    pub fn cancel(&mut self) {
        self.send(&[CAN, CAN, CAN]);
        self.flush_input();
    }

    /// Called after one CAN was read. A second CAN confirms a remote
    /// cancel, which is acknowledged.
    pub fn remote_cancelled(&mut self) -> bool {
        if self.read_byte(TIMEOUT_MS) == Some(CAN) {
            self.put(ACK);
            self.flush_input();
            return true;
        }
        false
    }

    pub fn print(&mut self, text: &str) {
        self.stream.print(text);
    }
}
