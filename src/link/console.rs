//! Console line accumulator and real-time character handling.
//!
//! Bytes arriving on the console link are classified one at a time.
//! Real-time characters act immediately; everything else lands in a
//! fixed ring until a `\n` completes a line. Completed lines wait in the
//! ring until the main loop collects them with [`ConsoleBuffer::take_line`].

use heapless::Deque;
use log::warn;

use crate::app::ports::MachinePort;

/// Ring capacity in bytes.
pub const CONSOLE_BUF_SIZE: usize = 256;

pub const CTRL_X: u8 = 0x18;

const HALT_MSG_GRBL: &str = "ALARM: Abort during cycle\r\n";
const HALT_MSG: &str = "HALTED, M999 or $X to exit HALT state\r\n";

/// What a single console byte asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleAction {
    /// `?`: send the status line now.
    Status,
    /// `*`: send the diagnostic dump now.
    Diagnose,
    /// Ctrl-X: abort motion.
    Halt,
    /// `!` (true) / `~` (false), only when feed hold is enabled.
    FeedHold(bool),
    /// Ordinary line byte (`\r` already rewritten to `\n`).
    Byte(u8),
}

pub fn classify(byte: u8, feed_hold_enabled: bool) -> ConsoleAction {
    match byte {
        b'?' => ConsoleAction::Status,
        b'*' => ConsoleAction::Diagnose,
        CTRL_X => ConsoleAction::Halt,
        b'!' if feed_hold_enabled => ConsoleAction::FeedHold(true),
        b'~' if feed_hold_enabled => ConsoleAction::FeedHold(false),
        b'\r' => ConsoleAction::Byte(b'\n'),
        other => ConsoleAction::Byte(other),
    }
}

#[derive(Default)]
pub struct ConsoleBuffer {
    ring: Deque<u8, CONSOLE_BUF_SIZE>,
    dropped: usize,
    /// Skipping the rest of an over-long line.
    discarding: bool,
}

impl ConsoleBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed received console bytes. `reply` sends text back on the
    /// console link.
    pub fn ingest<M: MachinePort>(&mut self, data: &[u8], machine: &mut M, mut reply: impl FnMut(&str)) {
        for &byte in data {
            match classify(byte, machine.feed_hold_enabled()) {
                ConsoleAction::Status => reply(&machine.query_string()),
                ConsoleAction::Diagnose => reply(&machine.diagnose_string()),
                ConsoleAction::Halt => {
                    machine.halt();
                    reply(if machine.is_grbl_mode() {
                        HALT_MSG_GRBL
                    } else {
                        HALT_MSG
                    });
                }
                ConsoleAction::FeedHold(hold) => machine.set_feed_hold(hold),
                ConsoleAction::Byte(b) => self.push(b),
            }
        }
    }

    fn push(&mut self, byte: u8) {
        if self.discarding {
            self.discarding = byte != b'\n';
            return;
        }
        if self.ring.push_back(byte).is_ok() {
            return;
        }
        if self.ring.iter().any(|&b| b == b'\n') {
            // Complete lines are still waiting for the main loop.
            self.dropped += 1;
            if self.dropped == 1 {
                warn!("console: line buffer full, dropping input");
            }
        } else {
            warn!("console: line longer than {} bytes discarded", CONSOLE_BUF_SIZE);
            self.ring.clear();
            self.discarding = byte != b'\n';
        }
    }

    /// Pop the oldest complete line, without its terminator. Empty lines
    /// (e.g. the second half of `\r\n`) are skipped.
    pub fn take_line(&mut self) -> Option<String> {
        loop {
            if !self.ring.iter().any(|&b| b == b'\n') {
                return None;
            }
            let mut line = Vec::new();
            while let Some(b) = self.ring.pop_front() {
                if b == b'\n' {
                    break;
                }
                line.push(b);
            }
            if self.dropped > 0 {
                warn!("console: {} bytes were dropped before this line", self.dropped);
                self.dropped = 0;
            }
            if !line.is_empty() {
                return Some(String::from_utf8_lossy(&line).into_owned());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    pub fn clear(&mut self) {
        self.ring.clear();
        self.dropped = 0;
        self.discarding = false;
    }
}
