//! Interrupt-to-task handoff for radio data-ready notifications.
//!
//! The co-processor raises a GPIO interrupt whenever it has frames queued.
//! The ISR does nothing but set a flag; the main loop observes the flag on
//! its next idle pass and performs all driver I/O in task context.
//!
//! ```text
//! ┌──────────────┐  raise()  ┌───────────┐  take()  ┌──────────────────┐
//! │ GPIO ISR     │──────────▶│  IrqFlag  │─────────▶│ LinkMux::poll()  │
//! │ (data ready) │           │ (atomic)  │          │ (main loop)      │
//! └──────────────┘           └───────────┘          └──────────────────┘
//! ```

use core::sync::atomic::{AtomicBool, Ordering};

/// Single-producer / single-consumer "data pending" flag.
///
/// `raise` is the only operation allowed from interrupt context: one atomic
/// store, no allocation, no driver access.
#[derive(Debug, Default)]
pub struct IrqFlag {
    pending: AtomicBool,
}

impl IrqFlag {
    pub const fn new() -> Self {
        Self {
            pending: AtomicBool::new(false),
        }
    }

    /// Mark data as pending. ISR-safe.
    #[inline]
    pub fn raise(&self) {
        self.pending.store(true, Ordering::Release);
    }

    /// Consume the flag, returning whether it was set.
    #[inline]
    pub fn take(&self) -> bool {
        self.pending.swap(false, Ordering::AcqRel)
    }

    /// Peek without consuming.
    #[inline]
    pub fn is_raised(&self) -> bool {
        self.pending.load(Ordering::Acquire)
    }
}
