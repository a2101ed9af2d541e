//! Scripted far ends of a transfer.
//!
//! Each peer is a [`ByteStream`] that reacts to what the device writes,
//! the way a desktop XMODEM client would, so a whole transfer runs
//! synchronously inside one `upload`/`download` call.

use std::collections::{BTreeMap, VecDeque};

use wifilink::stream::{ByteStream, StreamKind};
use wifilink::xmodem::packet::{decode, encode, BlockFormat};
use wifilink::xmodem::{Mode, ACK, CAN, CRC_REQUEST, EOT, NAK, SOH, STX};

// ── Sender (device uploads) ───────────────────────────────────

/// Sends an optional digest packet followed by `payload` in blocks.
pub struct SenderPeer {
    kind: StreamKind,
    digest: Option<Vec<u8>>,
    chunks: Vec<Vec<u8>>,
    mode: Option<Mode>,
    next: usize,
    sent_eot: bool,
    outbox: VecDeque<u8>,
    /// Frame index → number of times it still goes out corrupted.
    pub corrupt: BTreeMap<usize, usize>,
    /// Every byte the device wrote.
    pub received: Vec<u8>,
    pub naks: usize,
    /// `false` models a sender that only understands the NAK handshake.
    pub crc_capable: bool,
    pub done: bool,
    pub cancelled: bool,
}

#[allow(dead_code)]
impl SenderPeer {
    pub fn new(kind: StreamKind, digest: Option<&str>, payload: &[u8]) -> Self {
        let block = BlockFormat::for_sending(kind).block;
        Self {
            kind,
            digest: digest.map(|d| d.as_bytes().to_vec()),
            chunks: payload.chunks(block).map(<[u8]>::to_vec).collect(),
            mode: None,
            next: 0,
            sent_eot: false,
            outbox: VecDeque::new(),
            corrupt: BTreeMap::new(),
            received: Vec::new(),
            naks: 0,
            crc_capable: true,
            done: false,
            cancelled: false,
        }
    }

    /// Corrupt frame `index` (0 is the digest packet when present) the
    /// next `times` times it is sent.
    pub fn corrupting(mut self, index: usize, times: usize) -> Self {
        self.corrupt.insert(index, times);
        self
    }

    pub fn mode(&self) -> Option<Mode> {
        self.mode
    }

    fn frame_count(&self) -> usize {
        self.chunks.len() + usize::from(self.digest.is_some())
    }

    fn frame(&self, index: usize, mode: Mode) -> Vec<u8> {
        let format = BlockFormat::for_sending(self.kind);
        match (&self.digest, index) {
            (Some(d), 0) => encode(format, 0, d, mode),
            (Some(_), i) => encode(format, i as u8, &self.chunks[i - 1], mode),
            (None, i) => encode(format, (i + 1) as u8, &self.chunks[i], mode),
        }
    }

    fn queue_current(&mut self) {
        let Some(mode) = self.mode else {
            return;
        };
        if self.next >= self.frame_count() {
            self.outbox.push_back(EOT);
            self.sent_eot = true;
            return;
        }
        let mut frame = self.frame(self.next, mode);
        if let Some(left) = self.corrupt.get_mut(&self.next) {
            if *left > 0 {
                *left -= 1;
                let last = frame.len() - 1;
                frame[last] ^= 0x5A;
            }
        }
        self.outbox.extend(frame);
    }

    fn react(&mut self, byte: u8) {
        match byte {
            CRC_REQUEST if !self.crc_capable && self.mode.is_none() => {}
            CRC_REQUEST | NAK if self.mode.is_none() => {
                self.mode = Some(if byte == CRC_REQUEST { Mode::Crc } else { Mode::Checksum });
                self.queue_current();
            }
            NAK => {
                self.naks += 1;
                self.queue_current();
            }
            ACK if self.sent_eot => self.done = true,
            ACK => {
                self.next += 1;
                self.queue_current();
            }
            CAN => {
                self.cancelled = true;
                self.done = true;
            }
            _ => {}
        }
    }
}

impl ByteStream for SenderPeer {
    type Error = ();

    fn kind(&self) -> StreamKind {
        self.kind
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let n = buf.len().min(self.outbox.len());
        for (dst, src) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ()> {
        self.received.extend_from_slice(data);
        for &b in data {
            if !self.done {
                self.react(b);
            }
        }
        Ok(())
    }

    fn available(&mut self) -> bool {
        !self.outbox.is_empty()
    }
}

// ── Receiver (device downloads) ───────────────────────────────

/// Starts the transfer with its handshake bytes and ACKs good packets.
pub struct ReceiverPeer {
    kind: StreamKind,
    mode: Mode,
    outbox: VecDeque<u8>,
    inbuf: Vec<u8>,
    expected: u8,
    /// NAK this many otherwise good data packets first.
    pub nak_budget: usize,
    pub nak_all: bool,
    pub digest: Option<String>,
    pub data: Vec<u8>,
    pub frames: usize,
    pub eots: usize,
    /// Bytes outside any packet (CAN, status text).
    pub other: Vec<u8>,
}

#[allow(dead_code)]
impl ReceiverPeer {
    pub fn new(kind: StreamKind, handshake: u8) -> Self {
        Self::with_opening(kind, &[handshake])
    }

    pub fn with_opening(kind: StreamKind, opening: &[u8]) -> Self {
        Self {
            kind,
            mode: if opening.first() == Some(&NAK) { Mode::Checksum } else { Mode::Crc },
            outbox: opening.iter().copied().collect(),
            inbuf: Vec::new(),
            expected: 1,
            nak_budget: 0,
            nak_all: false,
            digest: None,
            data: Vec::new(),
            frames: 0,
            eots: 0,
            other: Vec::new(),
        }
    }

    pub fn other_text(&self) -> String {
        String::from_utf8_lossy(&self.other).into_owned()
    }

    fn process(&mut self) {
        while let Some(&first) = self.inbuf.first() {
            match first {
                EOT => {
                    self.inbuf.remove(0);
                    self.eots += 1;
                    self.outbox.push_back(ACK);
                }
                SOH | STX => {
                    let Some(format) = BlockFormat::for_control(first, self.kind) else {
                        return;
                    };
                    let len = format.frame_len(self.mode);
                    if self.inbuf.len() < len {
                        return;
                    }
                    let frame: Vec<u8> = self.inbuf.drain(..len).collect();
                    self.frames += 1;
                    self.accept(&frame, format);
                }
                other => {
                    self.inbuf.remove(0);
                    self.other.push(other);
                }
            }
        }
    }

    fn accept(&mut self, frame: &[u8], format: BlockFormat) {
        let Ok(packet) = decode(frame, format, self.mode) else {
            self.outbox.push_back(NAK);
            return;
        };
        if packet.seq == 0 && self.digest.is_none() {
            self.digest = Some(String::from_utf8_lossy(packet.payload).into_owned());
            self.outbox.push_back(ACK);
            return;
        }
        if self.nak_all || self.nak_budget > 0 {
            self.nak_budget = self.nak_budget.saturating_sub(1);
            self.outbox.push_back(NAK);
            return;
        }
        if packet.seq == self.expected {
            self.data.extend_from_slice(packet.payload);
            self.expected = self.expected.wrapping_add(1);
        }
        self.outbox.push_back(ACK);
    }
}

impl ByteStream for ReceiverPeer {
    type Error = ();

    fn kind(&self) -> StreamKind {
        self.kind
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
        let n = buf.len().min(self.outbox.len());
        for (dst, src) in buf.iter_mut().zip(self.outbox.drain(..n)) {
            *dst = src;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ()> {
        self.inbuf.extend_from_slice(data);
        self.process();
        Ok(())
    }

    fn available(&mut self) -> bool {
        !self.outbox.is_empty()
    }
}

/// Deterministic non-repeating test payload.
pub fn payload(len: usize) -> Vec<u8> {
    let mut x: u32 = 0x1234_5678;
    (0..len)
        .map(|_| {
            x ^= x << 13;
            x ^= x >> 17;
            x ^= x << 5;
            (x >> 24) as u8
        })
        .collect()
}
