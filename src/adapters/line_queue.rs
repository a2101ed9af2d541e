//! Console sink that queues lines for the command shell.
//!
//! `LinkMux::poll` hands lines over while it still holds the driver
//! handle; the shell runs afterwards and may take over the console stream
//! (e.g. for an upload), so lines are parked here in between.

use std::collections::VecDeque;

use log::debug;

use crate::app::ports::ConsoleSink;

#[derive(Debug, Default)]
pub struct LineQueue {
    lines: VecDeque<String>,
}

impl LineQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&mut self) -> Option<String> {
        self.lines.pop_front()
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}

impl ConsoleSink for LineQueue {
    fn on_console_line(&mut self, line: &str) {
        debug!("console: line {:?}", line);
        self.lines.push_back(line.to_string());
    }
}
