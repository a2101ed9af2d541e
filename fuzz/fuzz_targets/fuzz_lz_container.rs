//! Fuzz target: `decompress_container`
//!
//! Arbitrary bytes as a compressed upload. Every block must inflate to at
//! most 8 KiB and the reported byte count must match what was written.
//!
//! cargo fuzz run fuzz_lz_container

#![no_main]

use libfuzzer_sys::fuzz_target;
use wifilink::xmodem::decompress_container;
use wifilink::xmodem::lz::MAX_BLOCK_OUTPUT;

fuzz_target!(|data: &[u8]| {
    let mut out = Vec::new();
    if let Ok(stats) = decompress_container(data, &mut out, |_| {}) {
        assert_eq!(stats.bytes, out.len() as u64);
        assert!(out.len() <= stats.blocks as usize * MAX_BLOCK_OUTPUT);
    }
});
