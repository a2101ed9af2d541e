//! GPIO assignments for the radio co-processor on the controller board.
//!
//! `main.rs` builds the output drivers from these numbers; the interrupt
//! line is configured by raw number in [`crate::drivers::hw_init`].

/// Co-processor reset, active low.
pub const RADIO_NRESET_GPIO: i32 = 14;

/// SPI chip select, active low. Held low through reset to select the SPI
/// host interface.
pub const RADIO_NCS_GPIO: i32 = 15;

/// Data-ready interrupt from the co-processor, falling edge.
pub const RADIO_IRQ_GPIO: i32 = 21;

/// Host SPI peripheral the co-processor sits on.
pub const RADIO_SPI_HOST: u32 = 2;
