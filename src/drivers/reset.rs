//! Co-processor power-on reset sequence.
//!
//! ```text
//!  nCS    ‾‾‾‾\________________________________________/‾‾‾‾‾‾‾‾‾‾‾‾
//!  nRESET ‾‾‾‾‾‾‾‾‾\__________/‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾‾
//!             1 ms     5 ms          300 ms                  493 ms
//! ```
//!
//! Holding chip-select low across the reset pulse boots the co-processor
//! into SPI host mode. The delays are minimums from the module datasheet.

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;

use crate::error::{DriverError, DriverOp};

/// Chip-select held low before the reset pulse starts.
pub const CS_SETUP_MS: u32 = 1;
/// Reset pulse width.
pub const RESET_PULSE_MS: u32 = 5;
/// Settle time after releasing reset, chip-select still low.
pub const POST_RESET_SETTLE_MS: u32 = 300;
/// Boot time after releasing chip-select.
pub const BOOT_SETTLE_MS: u32 = 493;

/// Status reported when a reset line cannot be driven.
const STATUS_GPIO: u16 = 0x00FF;

fn gpio_err<E>(_: E) -> DriverError {
    DriverError::new(DriverOp::Reset, STATUS_GPIO)
}

/// Run the reset sequence on the given lines.
pub fn hardware_reset<RST, CS, D>(nreset: &mut RST, ncs: &mut CS, delay: &mut D) -> Result<(), DriverError>
where
    RST: OutputPin,
    CS: OutputPin,
    D: DelayNs,
{
    ncs.set_low().map_err(gpio_err)?;
    delay.delay_ms(CS_SETUP_MS);
    nreset.set_low().map_err(gpio_err)?;
    delay.delay_ms(RESET_PULSE_MS);
    nreset.set_high().map_err(gpio_err)?;
    delay.delay_ms(POST_RESET_SETTLE_MS);
    ncs.set_high().map_err(gpio_err)?;
    delay.delay_ms(BOOT_SETTLE_MS);
    Ok(())
}
