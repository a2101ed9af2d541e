//! Fuzz target: `XModem::upload`
//!
//! Plays arbitrary bytes as the sender side of an upload. The receiver
//! must terminate, never panic, and leave either a complete file or no
//! file at all.
//!
//! cargo fuzz run fuzz_xmodem_upload

#![no_main]

use std::collections::VecDeque;

use libfuzzer_sys::fuzz_target;
use wifilink::adapters::machine::StandaloneMachine;
use wifilink::adapters::mem_fs::MemFileStore;
use wifilink::adapters::time::ManualClock;
use wifilink::stream::{ByteStream, StreamKind};
use wifilink::xmodem::XModem;

struct Replay {
    kind: StreamKind,
    input: VecDeque<u8>,
}

impl ByteStream for Replay {
    type Error = ();

    fn kind(&self) -> StreamKind {
        self.kind
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let n = buf.len().min(self.input.len());
        for (dst, src) in buf.iter_mut().zip(self.input.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, _data: &[u8]) -> Result<(), ()> {
        Ok(())
    }

    fn available(&mut self) -> bool {
        !self.input.is_empty()
    }
}

fuzz_target!(|data: &[u8]| {
    let Some((&first, script)) = data.split_first() else {
        return;
    };
    let kind = if first & 1 == 0 { StreamKind::Serial } else { StreamKind::Packet };
    let path = if first & 2 == 0 { "/sd/gcodes/f.nc" } else { "/sd/gcodes/f.nc.lz" };

    let fs = MemFileStore::new();
    let mut xmodem = XModem::new(fs.clone(), ManualClock::new());
    let mut stream = Replay {
        kind,
        input: script.iter().copied().collect(),
    };
    let result = xmodem.upload(path, &mut stream, &mut StandaloneMachine::new());

    if result.is_err() && path.ends_with(".nc") {
        assert!(fs.get(path).is_none(), "failed upload left {path} behind");
    }
});
