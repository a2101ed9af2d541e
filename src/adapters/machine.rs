//! Stand-in motion core for bench bring-up and host tests.
//!
//! Tracks the flags the link layer reads and writes; it never moves
//! anything. Real firmware wires its planner in through [`MachinePort`].

use crate::app::ports::MachinePort;

#[derive(Debug, Default)]
pub struct StandaloneMachine {
    pub halted: bool,
    pub halt_count: u32,
    pub grbl_mode: bool,
    pub feed_hold: bool,
    pub feed_hold_enabled: bool,
    /// Queued moves; non-zero means busy.
    pub queued_moves: u32,
    uploading: bool,
}

impl StandaloneMachine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state_name(&self) -> &'static str {
        if self.halted {
            "Alarm"
        } else if self.feed_hold {
            "Hold"
        } else if self.queued_moves > 0 {
            "Run"
        } else {
            "Idle"
        }
    }
}

impl MachinePort for StandaloneMachine {
    fn query_string(&self) -> String {
        format!("<{}|MPos:0.0000,0.0000,0.0000>\n", self.state_name())
    }

    fn diagnose_string(&self) -> String {
        format!(
            "{{halted={},feed_hold={},queued={},uploading={}}}\n",
            self.halted, self.feed_hold, self.queued_moves, self.uploading
        )
    }

    fn halt(&mut self) {
        self.halted = true;
        self.halt_count += 1;
        self.queued_moves = 0;
    }

    fn is_grbl_mode(&self) -> bool {
        self.grbl_mode
    }

    fn feed_hold_enabled(&self) -> bool {
        self.feed_hold_enabled
    }

    fn set_feed_hold(&mut self, hold: bool) {
        self.feed_hold = hold;
    }

    fn is_idle(&self) -> bool {
        self.queued_moves == 0
    }

    fn is_uploading(&self) -> bool {
        self.uploading
    }

    fn set_uploading(&mut self, uploading: bool) {
        self.uploading = uploading;
    }
}
