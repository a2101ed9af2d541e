//! Radio data-ready interrupt wiring.
//!
//! The ISR does exactly one thing: raise the [`IrqFlag`] shared with
//! `LinkMux`. The flag is leaked so the raw pointer handed to ESP-IDF stays
//! valid for the life of the firmware.

use std::sync::Arc;

use crate::events::IrqFlag;

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

/// Errors while installing the radio interrupt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwInitError {
    GpioConfigFailed(i32),
    IsrInstallFailed(i32),
}

impl core::fmt::Display for HwInitError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::GpioConfigFailed(rc) => write!(f, "GPIO config failed (rc={})", rc),
            Self::IsrInstallFailed(rc) => write!(f, "GPIO ISR service install failed (rc={})", rc),
        }
    }
}

impl std::error::Error for HwInitError {}

#[cfg(target_os = "espidf")]
unsafe extern "C" fn radio_data_ready_isr(arg: *mut core::ffi::c_void) {
    // SAFETY: arg is the leaked IrqFlag from install_radio_isr; raise() is
    // a single atomic store.
    let flag = unsafe { &*(arg as *const IrqFlag) };
    flag.raise();
}

/// Route the co-processor's data-ready line to `irq`.
#[cfg(target_os = "espidf")]
pub fn install_radio_isr(irq: Arc<IrqFlag>) -> Result<(), HwInitError> {
    use crate::pins::RADIO_IRQ_GPIO;

    let cfg = gpio_config_t {
        pin_bit_mask: 1u64 << RADIO_IRQ_GPIO,
        mode: gpio_mode_t_GPIO_MODE_INPUT,
        pull_up_en: gpio_pullup_t_GPIO_PULLUP_ENABLE,
        pull_down_en: gpio_pulldown_t_GPIO_PULLDOWN_DISABLE,
        intr_type: gpio_int_type_t_GPIO_INTR_NEGEDGE,
        ..Default::default()
    };
    // SAFETY: called once from main() before the main loop; the flag
    // pointer is leaked and never freed.
    unsafe {
        let ret = gpio_config(&cfg);
        if ret != ESP_OK as i32 {
            return Err(HwInitError::GpioConfigFailed(ret));
        }
        let ret = gpio_install_isr_service(0);
        if ret != ESP_OK as i32 && ret != ESP_ERR_INVALID_STATE as i32 {
            return Err(HwInitError::IsrInstallFailed(ret));
        }
        let arg = Arc::into_raw(irq) as *mut core::ffi::c_void;
        let ret = gpio_isr_handler_add(RADIO_IRQ_GPIO, Some(radio_data_ready_isr), arg);
        if ret != ESP_OK as i32 {
            drop(Arc::from_raw(arg as *const IrqFlag));
            return Err(HwInitError::IsrInstallFailed(ret));
        }
        gpio_intr_enable(RADIO_IRQ_GPIO);
    }
    log::info!("hw_init: radio data-ready ISR on GPIO {}", RADIO_IRQ_GPIO);
    Ok(())
}

/// Host builds have no interrupt line; `LinkMux::poll` falls back to
/// asking the driver.
#[cfg(not(target_os = "espidf"))]
pub fn install_radio_isr(_irq: Arc<IrqFlag>) -> Result<(), HwInitError> {
    log::info!("hw_init(sim): radio ISR skipped");
    Ok(())
}
