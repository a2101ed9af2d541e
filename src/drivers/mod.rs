//! Radio co-processor drivers, the hardware reset sequence and the
//! data-ready interrupt.

pub mod hw_init;
pub mod radio;
pub mod reset;

#[cfg(not(target_os = "espidf"))]
pub mod sim;

#[cfg(target_os = "espidf")]
pub mod m8266;
