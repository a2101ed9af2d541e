//! Download: we send a stored file to the peer.

use log::{debug, info, warn};

use super::crc::Mode;
use super::digest::{md5_hex, read_cached};
use super::lz::read_up_to;
use super::packet::{encode, BlockFormat};
use super::paths::{lz_path, md5_path};
use super::wire::Wire;
use super::{
    TransferError, TransferStats, XModem, ACK, CAN, CRC_REQUEST, MAXRETRANS, NAK, TIMEOUT_MS, EOT,
};
use crate::app::ports::{FileStore, MachinePort, StorageError, TimePort};
use crate::stream::ByteStream;

impl<F: FileStore, T: TimePort> XModem<F, T> {
    /// Send `path` to the peer on `stream`, preceded by its MD5 digest.
    ///
    /// The compressed sidecar is sent instead of the file when it exists.
    pub fn download<S: ByteStream, M: MachinePort>(
        &mut self,
        path: &str,
        stream: &mut S,
        machine: &mut M,
    ) -> Result<TransferStats, TransferError> {
        if !machine.is_idle() {
            warn!("xmodem: download of {} refused, machine busy", path);
            Wire {
                stream,
                clock: &mut self.clock,
            }
            .cancel();
            return Err(TransferError::MachineBusy);
        }

        stream.set_rx_interrupt(false);
        machine.set_uploading(true);

        let result = self.transmit(path, stream);

        let mut wire = Wire {
            stream: &mut *stream,
            clock: &mut self.clock,
        };
        wire.flush_input();
        match &result {
            Ok(stats) => info!(
                "xmodem: sent {} ({} packets, {} bytes)",
                path, stats.packets, stats.bytes
            ),
            Err(e) => {
                warn!("xmodem: download of {} failed: {}", path, e);
                wire.print(&e.console_message());
            }
        }

        stream.set_rx_interrupt(true);
        machine.set_uploading(false);
        result
    }

    /// Cached digest from the sidecar, or one computed from the file.
    pub fn digest_of(&self, path: &str) -> Result<String, TransferError> {
        if let Some(cached) = self.files.open(&md5_path(path)).ok().and_then(read_cached) {
            return Ok(cached);
        }
        let reader = self.files.open(path).map_err(|_| TransferError::Open {
            path: path.to_string(),
        })?;
        md5_hex(reader).map_err(|e| TransferError::Storage(e.into()))
    }

    fn transmit<S: ByteStream>(
        &mut self,
        path: &str,
        stream: &mut S,
    ) -> Result<TransferStats, TransferError> {
        let opened = self.digest_of(path).and_then(|digest| {
            let lz = lz_path(path);
            let source = if self.files.exists(&lz) { lz.as_str() } else { path };
            debug!("xmodem: sending {} from {}", path, source);
            let reader = self.files.open(source).map_err(|_| TransferError::Open {
                path: path.to_string(),
            })?;
            Ok((digest, reader))
        });

        let Self { clock, .. } = self;
        let mut wire = Wire { stream, clock };
        let (digest, mut reader) = match opened {
            Ok(v) => v,
            Err(e) => {
                wire.cancel();
                return Err(e);
            }
        };

        let mode = wait_handshake(&mut wire)?;
        let format = BlockFormat::for_sending(wire.stream.kind());
        let mut stats = TransferStats::default();

        send_frame(&mut wire, &encode(format, 0, digest.as_bytes(), mode))?;
        stats.digest = true;

        let mut seq: u8 = 1;
        let mut block = vec![0u8; format.block];
        loop {
            let n = match read_up_to(&mut reader, &mut block) {
                Ok(n) => n,
                Err(e) => {
                    wire.cancel();
                    return Err(StorageError::from(e).into());
                }
            };
            if n == 0 {
                finish(&mut wire)?;
                return Ok(stats);
            }
            send_frame(&mut wire, &encode(format, seq, &block[..n], mode))?;
            stats.packets += 1;
            stats.bytes += n as u64;
            seq = seq.wrapping_add(1);
        }
    }
}

/// Wait for the receiver's `'C'` or NAK.
fn wait_handshake<S: ByteStream, T: TimePort>(
    wire: &mut Wire<'_, S, T>,
) -> Result<Mode, TransferError> {
    for _ in 0..MAXRETRANS {
        match wire.read_byte(TIMEOUT_MS) {
            Some(CRC_REQUEST) => return Ok(Mode::Crc),
            Some(NAK) => return Ok(Mode::Checksum),
            Some(CAN) => {
                if wire.remote_cancelled() {
                    return Err(TransferError::Cancelled);
                }
            }
            Some(c) => debug!("xmodem: ignoring 0x{:02X} before handshake", c),
            None => {}
        }
    }
    wire.cancel();
    Err(TransferError::Sync)
}

/// Send one frame until it is ACKed. NAK resends the same bytes; a NAK,
/// a timeout or a stray byte each use one retry.
fn send_frame<S: ByteStream, T: TimePort>(
    wire: &mut Wire<'_, S, T>,
    frame: &[u8],
) -> Result<(), TransferError> {
    let mut resend = true;
    for _ in 0..MAXRETRANS {
        if resend {
            wire.send(frame);
            resend = false;
        }
        match wire.read_byte(TIMEOUT_MS) {
            Some(ACK) => return Ok(()),
            Some(NAK) => {
                debug!("xmodem: packet {} NAKed", frame[1]);
                resend = true;
            }
            Some(CAN) => {
                if wire.remote_cancelled() {
                    return Err(TransferError::Cancelled);
                }
            }
            Some(c) => debug!("xmodem: ignoring 0x{:02X} while awaiting ACK", c),
            None => {}
        }
    }
    warn!("xmodem: packet {} never acknowledged", frame[1]);
    wire.cancel();
    Err(TransferError::TooManyRetries)
}

fn finish<S: ByteStream, T: TimePort>(wire: &mut Wire<'_, S, T>) -> Result<(), TransferError> {
    for _ in 0..MAXRETRANS {
        wire.put(EOT);
        if wire.read_byte(TIMEOUT_MS) == Some(ACK) {
            return Ok(());
        }
    }
    Err(TransferError::FinishAckMissing)
}
