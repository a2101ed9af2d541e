//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against simulated adapters (`SimRadio`, `MemFileStore`, `ManualClock`).
//! All tests run on the host (x86_64) with no real hardware required.

mod http_tests;
mod link_tests;
mod peer;
mod transfer_tests;
