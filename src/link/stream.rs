//! Raw byte access to the console link, for running transfers over WiFi.

use std::collections::VecDeque;

use log::debug;

use super::io::LinkIo;
use crate::drivers::radio::{LinkId, RadioDriver, MAX_FRAME};
use crate::error::LinkError;
use crate::stream::{ByteStream, StreamKind};

/// [`ByteStream`] over one server link.
///
/// Reads pull frames straight from the radio. Frames for other links are
/// dropped: while a transfer runs it owns all inbound traffic. Bytes that
/// do not fit the caller's buffer are kept for the next read.
pub struct ConsoleStream<R> {
    io: LinkIo<R>,
    link: LinkId,
    pending: VecDeque<u8>,
    rx: Vec<u8>,
}

impl<R: RadioDriver> ConsoleStream<R> {
    pub fn new(io: LinkIo<R>, link: LinkId) -> Self {
        Self {
            io,
            link,
            pending: VecDeque::new(),
            rx: vec![0; MAX_FRAME],
        }
    }

    fn fill(&mut self) -> Result<(), LinkError> {
        while self.pending.is_empty() {
            let Some(frame) = self.io.recv(&mut self.rx)? else {
                return Ok(());
            };
            if frame.link != self.link {
                debug!("console stream: dropped {} bytes on link {}", frame.len, frame.link);
                continue;
            }
            self.pending.extend(&self.rx[..frame.len]);
        }
        Ok(())
    }
}

impl<R: RadioDriver> ByteStream for ConsoleStream<R> {
    type Error = LinkError;

    fn kind(&self) -> StreamKind {
        StreamKind::Packet
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, LinkError> {
        self.fill()?;
        let n = buf.len().min(self.pending.len());
        for (dst, src) in buf.iter_mut().zip(self.pending.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), LinkError> {
        self.io.send(self.link, None, data).map(|_| ())
    }

    fn available(&mut self) -> bool {
        !self.pending.is_empty() || self.io.has_data()
    }

    fn set_rx_interrupt(&mut self, enabled: bool) {
        self.io.set_rx_enabled(enabled);
    }
}
