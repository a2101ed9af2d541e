//! Packet framing.
//!
//! ```text
//!  ┌──────┬─────┬──────┬─────────────┬──────────────────────────┬─────────┐
//!  │ ctrl │ seq │ ~seq │ len (1 | 2) │ payload, 0x1A padded     │ trailer │
//!  └──────┴─────┴──────┴─────────────┴──────────────────────────┴─────────┘
//!                       └───────── CRC / checksum region ───────┘
//! ```
//!
//! SOH packets carry 128 bytes and a 1-byte length; STX packets carry the
//! stream's large block and a 2-byte big-endian length.

use super::crc::{verify, Mode};
use super::{CTRLZ, SOH, STX};
use crate::stream::StreamKind;

/// Payload of an SOH block.
pub const SOH_BLOCK: usize = 128;

/// Shape of one packet type on one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockFormat {
    pub control: u8,
    pub block: usize,
}

impl BlockFormat {
    pub const SOH: Self = Self {
        control: SOH,
        block: SOH_BLOCK,
    };

    pub const fn stx(kind: StreamKind) -> Self {
        Self {
            control: STX,
            block: kind.stx_block_size(),
        }
    }

    /// Format announced by a received control byte.
    pub fn for_control(control: u8, kind: StreamKind) -> Option<Self> {
        match control {
            SOH => Some(Self::SOH),
            STX => Some(Self::stx(kind)),
            _ => None,
        }
    }

    /// Format used when sending on `kind`.
    pub const fn for_sending(kind: StreamKind) -> Self {
        match kind {
            StreamKind::Serial => Self::SOH,
            StreamKind::Packet => Self::stx(kind),
        }
    }

    pub const fn len_bytes(self) -> usize {
        if self.control == STX { 2 } else { 1 }
    }

    /// Whole packet length, control byte included.
    pub const fn frame_len(self, mode: Mode) -> usize {
        3 + self.len_bytes() + self.block + mode.trailer_len()
    }
}

/// Why a received packet was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reject {
    /// The packet did not arrive in time.
    Short,
    /// `seq` and `~seq` disagree.
    Sequence,
    /// Declared length exceeds the block size.
    Length(usize),
    /// CRC or checksum mismatch.
    Integrity,
}

/// A verified packet, borrowing its payload from the frame.
#[derive(Debug, PartialEq, Eq)]
pub struct Packet<'a> {
    pub seq: u8,
    pub payload: &'a [u8],
}

/// Build a packet; `payload` must fit the block.
pub fn encode(format: BlockFormat, seq: u8, payload: &[u8], mode: Mode) -> Vec<u8> {
    debug_assert!(payload.len() <= format.block);
    let mut frame = Vec::with_capacity(format.frame_len(mode));
    frame.extend_from_slice(&[format.control, seq, !seq]);
    let len = payload.len() as u16;
    if format.len_bytes() == 2 {
        frame.extend_from_slice(&len.to_be_bytes());
    } else {
        frame.push(len as u8);
    }
    frame.extend_from_slice(payload);
    frame.resize(3 + format.len_bytes() + format.block, CTRLZ);
    let (trailer, n) = mode.trailer(&frame[3..]);
    frame.extend_from_slice(&trailer[..n]);
    frame
}

/// Validate a complete frame (control byte included).
pub fn decode(frame: &[u8], format: BlockFormat, mode: Mode) -> Result<Packet<'_>, Reject> {
    if frame.len() != format.frame_len(mode) {
        return Err(Reject::Short);
    }
    let (seq, inv) = (frame[1], frame[2]);
    if seq != !inv {
        return Err(Reject::Sequence);
    }
    let region_end = 3 + format.len_bytes() + format.block;
    if !verify(&frame[3..region_end], &frame[region_end..], mode) {
        return Err(Reject::Integrity);
    }
    let len = if format.len_bytes() == 2 {
        usize::from(u16::from_be_bytes([frame[3], frame[4]]))
    } else {
        usize::from(frame[3])
    };
    if len > format.block {
        return Err(Reject::Length(len));
    }
    let start = 3 + format.len_bytes();
    Ok(Packet {
        seq,
        payload: &frame[start..start + len],
    })
}
