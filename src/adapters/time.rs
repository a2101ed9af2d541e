//! ESP32 time adapter.
//!
//! Provides monotonic time and short blocking delays.
//!
//! - **`target_os = "espidf"`**: wraps `esp_timer_get_time()` from the
//!   ESP-IDF high-resolution timer and the ROM busy-wait delay.
//! - **`not(target_os = "espidf")`**: uses `std::time::Instant` and
//!   `std::thread::sleep` for host-side runs, plus [`ManualClock`] for tests
//!   that must not actually sleep.

use embedded_hal::delay::DelayNs;

use crate::app::ports::TimePort;

/// Time adapter for the ESP32 platform.
pub struct Esp32TimeAdapter {
    #[cfg(not(target_os = "espidf"))]
    start: std::time::Instant,
}

impl Default for Esp32TimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl Esp32TimeAdapter {
    pub fn new() -> Self {
        Self {
            #[cfg(not(target_os = "espidf"))]
            start: std::time::Instant::now(),
        }
    }

    /// Seconds since boot (monotonic).
    pub fn uptime_secs(&self) -> u64 {
        self.now_us() / 1_000_000
    }
}

impl TimePort for Esp32TimeAdapter {
    #[cfg(target_os = "espidf")]
    fn now_us(&self) -> u64 {
        (unsafe { esp_idf_svc::sys::esp_timer_get_time() }) as u64
    }

    #[cfg(not(target_os = "espidf"))]
    fn now_us(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    #[cfg(target_os = "espidf")]
    fn delay_us(&mut self, us: u32) {
        esp_idf_svc::hal::delay::Ets::delay_us(us);
    }

    #[cfg(not(target_os = "espidf"))]
    fn delay_us(&mut self, us: u32) {
        std::thread::sleep(std::time::Duration::from_micros(u64::from(us)));
    }

    #[cfg(target_os = "espidf")]
    fn delay_ms(&mut self, ms: u32) {
        esp_idf_svc::hal::delay::FreeRtos::delay_ms(ms);
    }
}

impl DelayNs for Esp32TimeAdapter {
    fn delay_ns(&mut self, ns: u32) {
        TimePort::delay_us(self, ns.div_ceil(1_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        TimePort::delay_ms(self, ms);
    }
}

/// Virtual clock: delays advance time instantly.
///
/// Clones share the same counter, so a test can keep one to read the
/// elapsed time after handing the other to the code under test.
#[cfg(not(target_os = "espidf"))]
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: std::rc::Rc<core::cell::Cell<u64>>,
}

#[cfg(not(target_os = "espidf"))]
impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance_us(&self, us: u64) {
        self.now.set(self.now.get() + us);
    }
}

#[cfg(not(target_os = "espidf"))]
impl TimePort for ManualClock {
    fn now_us(&self) -> u64 {
        self.now.get()
    }

    fn delay_us(&mut self, us: u32) {
        self.advance_us(u64::from(us));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.advance_us(u64::from(ms) * 1_000);
    }
}
