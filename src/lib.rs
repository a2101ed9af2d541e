//! Wireless transport for the CNC controller firmware.
//!
//! Exposes the link layer for integration testing and for the ESP-IDF
//! binary. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.
//!
//! ```text
//!   radio ─▶ LinkMux ─┬─▶ console link ─▶ ConsoleSink / ConsoleStream ─▶ Shell ─▶ XModem
//!                     ├─▶ discovery link (beacons)
//!                     └─▶ TcpServer ─▶ WebServer ─▶ HttpSessions ─▶ handlers
//! ```

#![deny(unused_must_use)]

pub mod adapters;
pub mod app;
pub mod config;
pub mod drivers;
pub mod endpoint;
pub mod error;
pub mod events;
pub mod http;
pub mod link;
pub mod pins;
pub mod server;
pub mod shell;
pub mod stream;
pub mod xmodem;
