//! Upload: the peer sends, we store.

use std::io::Write;

use log::{debug, info, warn};

use super::crc::Mode;
use super::digest::DIGEST_LEN;
use super::lz::decompress_container;
use super::packet::{decode, BlockFormat, Reject};
use super::paths::{parent_dir, UploadTargets};
use super::wire::Wire;
use super::{
    TransferError, TransferStats, XModem, ACK, CAN, CRC_REQUEST, EOT, MAXRETRANS, NAK, SOH, STX,
    TIMEOUT_MS,
};
use crate::app::ports::{FileStore, MachinePort, StorageError, TimePort};
use crate::stream::ByteStream;

/// Receiver-side handshake and packet bookkeeping.
struct Session {
    /// Byte sent before each wait until the first packet arrives.
    trychar: Option<u8>,
    mode: Mode,
    expected: u8,
    digest_received: bool,
    rejects: u32,
    stats: TransferStats,
}

impl Session {
    fn new() -> Self {
        Self {
            trychar: Some(CRC_REQUEST),
            mode: Mode::Crc,
            expected: 1,
            digest_received: false,
            rejects: 0,
            stats: TransferStats::default(),
        }
    }
}

impl<F: FileStore, T: TimePort> XModem<F, T> {
    /// Receive `path` from the peer on `stream`.
    ///
    /// The console receive path and the machine's busy flag are held for
    /// the duration of the transfer. A `.lz` target is inflated afterwards;
    /// if that fails the partial destination is left for the caller.
    pub fn upload<S: ByteStream, M: MachinePort>(
        &mut self,
        path: &str,
        stream: &mut S,
        machine: &mut M,
    ) -> Result<TransferStats, TransferError> {
        if !machine.is_idle() {
            warn!("xmodem: upload of {} refused, machine busy", path);
            if let Err(e) = stream.write(&[EOT]) {
                debug!("xmodem: EOT not sent: {:?}", e);
            }
            return Err(TransferError::MachineBusy);
        }

        stream.set_rx_interrupt(false);
        machine.set_uploading(true);

        let targets = UploadTargets::for_path(path);
        let result = self.receive(&targets, stream);

        if let Err(e) = &result {
            warn!("xmodem: upload of {} failed: {}", path, e);
            self.discard(&targets);
            let mut wire = Wire {
                stream: &mut *stream,
                clock: &mut self.clock,
            };
            wire.flush_input();
            wire.print(&e.console_message());
        }

        stream.set_rx_interrupt(true);
        machine.set_uploading(false);

        let stats = result?;
        info!(
            "xmodem: received {} ({} packets, {} bytes)",
            path, stats.packets, stats.bytes
        );
        if let Some(dest) = &targets.decompress_to {
            self.inflate(&targets.stored, dest, stream)?;
        }
        Ok(stats)
    }

    fn discard(&mut self, targets: &UploadTargets) {
        for path in core::iter::once(&targets.stored).chain(targets.digest.as_ref()) {
            if let Err(e) = self.files.remove(path) {
                warn!("xmodem: could not remove {}: {}", path, e);
            }
        }
    }

    fn create_with_parents(files: &mut F, path: &str) -> Result<F::Writer, TransferError> {
        let open_err = || TransferError::Open {
            path: path.to_string(),
        };
        if let Some(dir) = parent_dir(path) {
            files.create_dir_all(dir).map_err(|_| open_err())?;
        }
        files.create(path).map_err(|_| open_err())
    }

    fn receive<S: ByteStream>(
        &mut self,
        targets: &UploadTargets,
        stream: &mut S,
    ) -> Result<TransferStats, TransferError> {
        let Self { files, clock } = self;
        let mut wire = Wire { stream, clock };

        let opened = Self::create_with_parents(files, &targets.stored).and_then(|out| {
            let digest = match &targets.digest {
                Some(p) => Some(Self::create_with_parents(files, p)?),
                None => None,
            };
            Ok((out, digest))
        });
        let (mut out, mut digest_out) = match opened {
            Ok(handles) => handles,
            Err(e) => {
                wire.put(EOT);
                return Err(e);
            }
        };

        let kind = wire.stream.kind();
        let mut s = Session::new();
        loop {
            let control = next_control(&mut wire, &mut s)?;
            if control == EOT {
                wire.put(ACK);
                wire.flush_input();
                out.flush().map_err(StorageError::from)?;
                if let Some(d) = digest_out.as_mut() {
                    d.flush().map_err(StorageError::from)?;
                }
                return Ok(s.stats);
            }

            let Some(format) = BlockFormat::for_control(control, kind) else {
                continue;
            };
            match s.trychar.take() {
                Some(CRC_REQUEST) => s.mode = Mode::Crc,
                Some(_) => s.mode = Mode::Checksum,
                None => {}
            }

            let mut frame = vec![0u8; format.frame_len(s.mode)];
            frame[0] = control;
            let decoded = if wire.read_exact(&mut frame[1..]) {
                decode(&frame, format, s.mode)
            } else {
                Err(Reject::Short)
            };

            match decoded {
                Ok(p) if !s.digest_received && p.seq == 0 && p.payload.len() == DIGEST_LEN => {
                    if let Some(d) = digest_out.as_mut() {
                        if let Err(e) = d.write_all(p.payload) {
                            wire.cancel();
                            return Err(StorageError::from(e).into());
                        }
                    }
                    s.digest_received = true;
                    s.stats.digest = true;
                    s.rejects = 0;
                    debug!("xmodem: digest {}", String::from_utf8_lossy(p.payload));
                    wire.put(ACK);
                }
                Ok(p) if p.seq == s.expected => {
                    if let Err(e) = out.write_all(p.payload) {
                        wire.cancel();
                        return Err(StorageError::from(e).into());
                    }
                    s.stats.packets += 1;
                    s.stats.bytes += p.payload.len() as u64;
                    s.expected = s.expected.wrapping_add(1);
                    s.rejects = 0;
                    wire.put(ACK);
                }
                other => {
                    match other {
                        Ok(p) => debug!("xmodem: packet {} while expecting {}", p.seq, s.expected),
                        Err(r) => debug!("xmodem: packet rejected: {:?}", r),
                    }
                    wire.put(NAK);
                    s.rejects += 1;
                    if s.rejects >= MAXRETRANS {
                        warn!("xmodem: {} consecutive rejects, cancelling", s.rejects);
                        wire.cancel();
                        return Err(TransferError::TooManyRetries);
                    }
                }
            }
        }
    }

    fn inflate<S: ByteStream>(
        &mut self,
        stored: &str,
        dest: &str,
        stream: &mut S,
    ) -> Result<(), TransferError> {
        let input = self
            .files
            .open(stored)
            .map_err(|_| TransferError::Open {
                path: stored.to_string(),
            })?;
        let output = Self::create_with_parents(&mut self.files, dest)?;
        let stats = decompress_container(input, output, |blocks| {
            stream.print(&format!("#Info: decompressed blocks = {blocks}\r\n"));
        })
        .map_err(|e| {
            warn!("xmodem: decompressing {} failed: {}", stored, e);
            TransferError::Decompress(e)
        })?;
        stream.print(&format!("#Info: decompressed blocks = {}\r\n", stats.blocks));
        info!("xmodem: inflated {} -> {} ({} bytes)", stored, dest, stats.bytes);
        Ok(())
    }
}

/// Wait for the next packet control byte, sending the handshake byte while
/// the session has one. Bytes that are not control bytes use up a wait.
fn next_control<S: ByteStream, T: TimePort>(
    wire: &mut Wire<'_, S, T>,
    s: &mut Session,
) -> Result<u8, TransferError> {
    loop {
        for _ in 0..MAXRETRANS {
            if let Some(c) = s.trychar {
                wire.put(c);
            }
            match wire.read_byte(TIMEOUT_MS) {
                Some(c @ (SOH | STX | EOT)) => return Ok(c),
                Some(CAN) => {
                    if wire.remote_cancelled() {
                        return Err(TransferError::Cancelled);
                    }
                }
                Some(c) => debug!("xmodem: ignoring 0x{:02X}", c),
                None => {}
            }
        }
        if s.trychar == Some(CRC_REQUEST) {
            debug!("xmodem: no CRC handshake, falling back to checksum");
            s.trychar = Some(NAK);
            continue;
        }
        wire.cancel();
        return Err(TransferError::Sync);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::machine::StandaloneMachine;
    use crate::adapters::mem_fs::MemFileStore;
    use crate::adapters::time::ManualClock;
    use crate::stream::StreamKind;
    use crate::xmodem::packet::encode;
    use std::collections::VecDeque;

    /// Replays canned input and records output.
    struct Scripted {
        input: VecDeque<u8>,
        output: Vec<u8>,
        rx_interrupt: bool,
        /// Input stays hidden until this byte has been written.
        hold_until: Option<u8>,
    }

    impl Scripted {
        fn new(input: Vec<u8>) -> Self {
            Self {
                input: input.into(),
                output: Vec::new(),
                rx_interrupt: true,
                hold_until: None,
            }
        }
    }

    impl ByteStream for Scripted {
        type Error = ();

        fn kind(&self) -> StreamKind {
            StreamKind::Serial
        }

        fn read(&mut self, buf: &mut [u8]) -> Result<usize, ()> {
            if self.hold_until.is_some_and(|b| !self.output.contains(&b)) {
                return Ok(0);
            }
            let n = buf.len().min(self.input.len());
            for b in buf.iter_mut().take(n) {
                *b = self.input.pop_front().unwrap_or(0);
            }
            Ok(n)
        }

        fn write(&mut self, data: &[u8]) -> Result<(), ()> {
            self.output.extend_from_slice(data);
            Ok(())
        }

        fn available(&mut self) -> bool {
            !self.input.is_empty()
        }

        fn set_rx_interrupt(&mut self, enabled: bool) {
            self.rx_interrupt = enabled;
        }
    }

    const DIGEST: &[u8; 32] = b"0123456789abcdef0123456789abcdef";

    fn engine() -> (XModem<MemFileStore, ManualClock>, MemFileStore) {
        let fs = MemFileStore::new();
        (XModem::new(fs.clone(), ManualClock::new()), fs)
    }

    #[test]
    fn busy_machine_gets_eot() {
        let (mut x, fs) = engine();
        let mut machine = StandaloneMachine::new();
        machine.queued_moves = 3;
        let mut stream = Scripted::new(Vec::new());
        let r = x.upload("/sd/gcodes/a.nc", &mut stream, &mut machine);
        assert_eq!(r, Err(TransferError::MachineBusy));
        assert_eq!(stream.output, vec![EOT]);
        assert!(fs.paths().is_empty());
    }

    #[test]
    fn scripted_upload_stores_payload_and_digest() {
        let (mut x, fs) = engine();
        let mut input = encode(BlockFormat::SOH, 0, DIGEST, Mode::Crc);
        input.extend(encode(BlockFormat::SOH, 1, b"G0 X1\n", Mode::Crc));
        input.push(EOT);
        let mut stream = Scripted::new(input);
        let mut machine = StandaloneMachine::new();

        let stats = x.upload("/sd/gcodes/a.nc", &mut stream, &mut machine).unwrap();
        assert_eq!(stats.packets, 1);
        assert!(stats.digest);
        assert_eq!(fs.get("/sd/gcodes/a.nc").unwrap(), b"G0 X1\n");
        assert_eq!(fs.get("/sd/gcodes/.md5/a.nc").unwrap(), DIGEST);
        assert_eq!(stream.output, vec![b'C', ACK, ACK, ACK]);
        assert!(stream.rx_interrupt);
        assert!(!machine.is_uploading());
    }

    #[test]
    fn duplicate_packet_is_nacked() {
        let (mut x, fs) = engine();
        let mut input = encode(BlockFormat::SOH, 1, b"one", Mode::Crc);
        input.extend(encode(BlockFormat::SOH, 1, b"one", Mode::Crc));
        input.extend(encode(BlockFormat::SOH, 2, b"two", Mode::Crc));
        input.push(EOT);
        let mut stream = Scripted::new(input);
        let stats = x
            .upload("/sd/t.txt", &mut stream, &mut StandaloneMachine::new())
            .unwrap();
        assert_eq!(stats.packets, 2);
        assert_eq!(fs.get("/sd/t.txt").unwrap(), b"onetwo");
        assert_eq!(stream.output, vec![b'C', ACK, NAK, ACK, ACK]);
    }

    #[test]
    fn silent_peer_is_a_sync_error() {
        let (mut x, fs) = engine();
        let mut stream = Scripted::new(Vec::new());
        let r = x.upload("/sd/t.txt", &mut stream, &mut StandaloneMachine::new());
        assert_eq!(r, Err(TransferError::Sync));
        let tries = MAXRETRANS as usize;
        assert!(stream.output[..tries].iter().all(|&b| b == b'C'));
        assert!(stream.output[tries..2 * tries].iter().all(|&b| b == NAK));
        assert_eq!(&stream.output[2 * tries..2 * tries + 3], &[CAN, CAN, CAN]);
        assert!(stream.output.ends_with(b"Error: sync error!\r\n"));
        assert!(fs.get("/sd/t.txt").is_none());
    }

    #[test]
    fn remote_cancel_cleans_up() {
        let (mut x, fs) = engine();
        let mut input = encode(BlockFormat::SOH, 1, b"partial", Mode::Crc);
        input.extend([CAN, CAN]);
        let mut stream = Scripted::new(input);
        let r = x.upload("/sd/gcodes/a.nc", &mut stream, &mut StandaloneMachine::new());
        assert_eq!(r, Err(TransferError::Cancelled));
        assert!(fs.paths().is_empty());
        assert!(stream.output.ends_with(b"Info: canceled by remote!\r\n"));
    }

    #[test]
    fn checksum_mode_after_nak_handshake() {
        let (mut x, fs) = engine();
        let mut input = encode(BlockFormat::SOH, 1, b"sum", Mode::Checksum);
        input.push(EOT);
        let mut stream = Scripted::new(input);
        stream.hold_until = Some(NAK);
        x.upload("/sd/t.txt", &mut stream, &mut StandaloneMachine::new())
            .unwrap();
        assert_eq!(fs.get("/sd/t.txt").unwrap(), b"sum");
        let tries = MAXRETRANS as usize;
        assert!(stream.output[..tries].iter().all(|&b| b == b'C'));
        assert_eq!(&stream.output[tries..], &[NAK, ACK, ACK]);
    }

    #[test]
    fn corrupt_packets_exhaust_retries() {
        let (mut x, fs) = engine();
        let mut bad = encode(BlockFormat::SOH, 1, b"data", Mode::Crc);
        bad[20] ^= 0x40;
        let input: Vec<u8> = (0..MAXRETRANS).flat_map(|_| bad.clone()).collect();
        let mut stream = Scripted::new(input);
        let r = x.upload("/sd/gcodes/a.nc", &mut stream, &mut StandaloneMachine::new());
        assert_eq!(r, Err(TransferError::TooManyRetries));
        let naks = stream.output.iter().filter(|&&b| b == NAK).count();
        assert_eq!(naks, MAXRETRANS as usize);
        assert!(stream.output.windows(3).any(|w| w == [CAN, CAN, CAN]));
        assert!(fs.paths().is_empty());
    }

    #[test]
    fn compressed_upload_is_inflated() {
        let (mut x, fs) = engine();
        let text = b"G1 X10 Y10\n".repeat(40);
        let container = crate::xmodem::compress_container(&text);
        let mut input = Vec::new();
        for (i, chunk) in container.chunks(128).enumerate() {
            input.extend(encode(BlockFormat::SOH, (i + 1) as u8, chunk, Mode::Crc));
        }
        input.push(EOT);
        let mut stream = Scripted::new(input);
        x.upload("/sd/gcodes/a.nc.lz", &mut stream, &mut StandaloneMachine::new())
            .unwrap();
        assert_eq!(fs.get("/sd/gcodes/.lz/a.nc").unwrap(), container);
        assert_eq!(fs.get("/sd/gcodes/a.nc").unwrap(), text);
        assert!(stream
            .output
            .ends_with(b"#Info: decompressed blocks = 1\r\n"));
    }

    #[test]
    fn bad_container_reports_decompress_error() {
        let (mut x, fs) = engine();
        let mut input = encode(BlockFormat::SOH, 1, &[0, 0, 0, 0, 0, 0], Mode::Crc);
        input.push(EOT);
        let mut stream = Scripted::new(input);
        let r = x.upload("/sd/gcodes/a.nc.lz", &mut stream, &mut StandaloneMachine::new());
        assert!(matches!(r, Err(TransferError::Decompress(_))));
        assert!(fs.get("/sd/gcodes/.lz/a.nc").is_some());
        assert!(fs.get("/sd/gcodes/.md5/a.nc").is_some());
    }
}
