//! Packet integrity: CRC16-CCITT and the additive checksum fallback.

/// Integrity check negotiated by the receiver's handshake byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// `'C'` handshake: 16-bit CRC, big-endian trailer.
    Crc,
    /// NAK handshake: 8-bit additive checksum.
    Checksum,
}

impl Mode {
    pub const fn trailer_len(self) -> usize {
        match self {
            Self::Crc => 2,
            Self::Checksum => 1,
        }
    }

    /// Trailer bytes for `region`.
    pub fn trailer(self, region: &[u8]) -> ([u8; 2], usize) {
        match self {
            Self::Crc => (crc16_ccitt(region).to_be_bytes(), 2),
            Self::Checksum => ([checksum8(region), 0], 1),
        }
    }
}

const fn build_table() -> [u16; 256] {
    let mut table = [0u16; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = (i as u16) << 8;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 0x8000 != 0 {
                (crc << 1) ^ 0x1021
            } else {
                crc << 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC_TABLE: [u16; 256] = build_table();

/// CRC16-CCITT (XModem variant): polynomial 0x1021, initial value 0.
pub fn crc16_ccitt(data: &[u8]) -> u16 {
    data.iter().fold(0u16, |crc, &b| {
        (crc << 8) ^ CRC_TABLE[usize::from((crc >> 8) as u8 ^ b)]
    })
}

/// 8-bit additive checksum.
pub fn checksum8(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, &b| sum.wrapping_add(b))
}

/// Check `trailer` against `region` under `mode`.
pub fn verify(region: &[u8], trailer: &[u8], mode: Mode) -> bool {
    match mode {
        Mode::Crc => trailer.len() == 2 && u16::from_be_bytes([trailer[0], trailer[1]]) == crc16_ccitt(region),
        Mode::Checksum => trailer.first() == Some(&checksum8(region)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_matches_reference_entries() {
        assert_eq!(CRC_TABLE[0], 0x0000);
        assert_eq!(CRC_TABLE[1], 0x1021);
        assert_eq!(CRC_TABLE[0x10], 0x1231);
        assert_eq!(CRC_TABLE[0xFF], 0x1EF0);
    }

    #[test]
    fn known_vectors() {
        assert_eq!(crc16_ccitt(b""), 0);
        assert_eq!(crc16_ccitt(b"123456789"), 0x31C3);
        assert_eq!(checksum8(&[0xFF, 0x02]), 0x01);
    }

    #[test]
    fn verify_both_modes() {
        let region = b"\x05hello";
        let (crc, n) = Mode::Crc.trailer(region);
        assert_eq!(n, 2);
        assert!(verify(region, &crc[..n], Mode::Crc));
        assert!(!verify(b"\x05hellp", &crc[..n], Mode::Crc));

        let (sum, n) = Mode::Checksum.trailer(region);
        assert_eq!(n, 1);
        assert!(verify(region, &sum[..n], Mode::Checksum));
        assert!(!verify(region, &[sum[0].wrapping_add(1)], Mode::Checksum));
    }
}
