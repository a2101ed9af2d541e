//! End-to-end file transfers between the shell and scripted peers.

use wifilink::adapters::machine::StandaloneMachine;
use wifilink::adapters::mem_fs::MemFileStore;
use wifilink::adapters::time::ManualClock;
use wifilink::app::ports::MachinePort;
use wifilink::shell::Shell;
use wifilink::stream::StreamKind;
use wifilink::xmodem::digest::md5_hex;
use wifilink::xmodem::{
    compress_container, lz_path, md5_path, Mode, TransferError, CAN, CRC_REQUEST, MAXRETRANS, NAK,
};

use super::peer::{payload, ReceiverPeer, SenderPeer};

const PART: &str = "/sd/gcodes/part.nc";

fn shell() -> (Shell<MemFileStore, ManualClock>, MemFileStore) {
    let fs = MemFileStore::new();
    (Shell::new(fs.clone(), ManualClock::new()), fs)
}

fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

// ── Round trips ───────────────────────────────────────────────

fn round_trip(kind: StreamKind, len: usize) {
    let (mut sh, fs) = shell();
    let data = payload(len);
    let digest = md5_hex(&data[..]).unwrap();
    let mut machine = StandaloneMachine::new();

    let mut sender = SenderPeer::new(kind, Some(&digest), &data);
    let stats = sh.upload(PART, &mut sender, &mut machine).unwrap();
    assert!(sender.done && !sender.cancelled);
    assert!(stats.digest);
    assert_eq!(stats.bytes, len as u64);
    assert_eq!(fs.get(PART).unwrap(), data);
    assert_eq!(fs.get(&md5_path(PART)).unwrap(), digest.as_bytes());
    assert!(text(&sender.received).ends_with(&format!("Info: upload success: {PART}.\r\n")));

    let mut receiver = ReceiverPeer::new(kind, CRC_REQUEST);
    sh.download(PART, &mut receiver, &mut machine).unwrap();
    assert_eq!(receiver.digest.as_deref(), Some(digest.as_str()));
    assert_eq!(receiver.data, data);
    assert_eq!(receiver.eots, 1);
    assert!(receiver.other_text().contains("Info: download success"));
    assert!(!machine.is_uploading());
}

#[test]
fn serial_round_trip_preserves_bytes_and_digest() {
    round_trip(StreamKind::Serial, 1000);
}

#[test]
fn packet_round_trip_spans_several_large_blocks() {
    round_trip(StreamKind::Packet, 8192 * 2 + 17);
}

#[test]
fn empty_file_round_trip() {
    round_trip(StreamKind::Serial, 0);
}

#[test]
fn relative_paths_resolve_against_cwd() {
    let (mut sh, fs) = shell();
    sh.set_cwd("/sd/gcodes");
    let mut sender = SenderPeer::new(StreamKind::Serial, None, b"G1 X2\n");
    assert!(sh.execute("upload rel.nc\r\n", &mut sender, &mut StandaloneMachine::new()));
    assert_eq!(fs.get("/sd/gcodes/rel.nc").unwrap(), b"G1 X2\n");
}

#[test]
fn checksum_only_sender_is_served_after_crc_attempts() {
    let (mut sh, fs) = shell();
    let mut sender = SenderPeer::new(StreamKind::Serial, None, b"M3 S1000\n");
    sender.crc_capable = false;
    sh.upload("/sd/spindle.nc", &mut sender, &mut StandaloneMachine::new())
        .unwrap();
    assert_eq!(sender.mode(), Some(Mode::Checksum));
    let handshakes = sender.received.iter().take_while(|&&b| b == CRC_REQUEST).count();
    assert_eq!(handshakes, MAXRETRANS as usize);
    assert_eq!(fs.get("/sd/spindle.nc").unwrap(), b"M3 S1000\n");
}

#[test]
fn download_in_checksum_mode() {
    let (mut sh, fs) = shell();
    fs.insert("/sd/a.txt", b"checksum please");
    let mut receiver = ReceiverPeer::new(StreamKind::Serial, NAK);
    sh.download("/sd/a.txt", &mut receiver, &mut StandaloneMachine::new())
        .unwrap();
    assert_eq!(receiver.data, b"checksum please");
    assert_eq!(
        receiver.digest.as_deref(),
        Some(md5_hex(&b"checksum please"[..]).unwrap().as_str())
    );
}

// ── Compression ───────────────────────────────────────────────

#[test]
fn compressed_upload_inflates_and_download_sends_container() {
    let (mut sh, fs) = shell();
    let data = b"G1 X10 Y10 F1200\n".repeat(2000);
    let container = compress_container(&data);
    let digest = md5_hex(&data[..]).unwrap();
    let mut machine = StandaloneMachine::new();

    let mut sender = SenderPeer::new(StreamKind::Packet, Some(&digest), &container);
    sh.upload(&format!("{PART}.lz"), &mut sender, &mut machine).unwrap();
    assert_eq!(fs.get(PART).unwrap(), data);
    assert_eq!(fs.get(&lz_path(PART)).unwrap(), container);
    assert_eq!(fs.get(&md5_path(PART)).unwrap(), digest.as_bytes());
    assert!(text(&sender.received).contains("#Info: decompressed blocks = "));

    let mut receiver = ReceiverPeer::new(StreamKind::Packet, CRC_REQUEST);
    sh.download(PART, &mut receiver, &mut machine).unwrap();
    assert_eq!(receiver.data, container);
    assert_eq!(receiver.digest.as_deref(), Some(digest.as_str()));
}

#[test]
fn broken_container_leaves_no_destination() {
    let (mut sh, fs) = shell();
    let mut sender = SenderPeer::new(StreamKind::Serial, None, &[0x00, 0x10, 0xFF, 0xFF, 1, 2, 3]);
    let r = sh.upload(&format!("{PART}.lz"), &mut sender, &mut StandaloneMachine::new());
    assert!(matches!(r, Err(TransferError::Decompress(_))));
    assert_eq!(fs.get(PART), None);
    assert!(text(&sender.received).ends_with(&format!("Error: upload failed: {PART}.\r\n")));
}

// ── Firmware images ───────────────────────────────────────────

#[test]
fn firmware_upload_keeps_no_digest_sidecar() {
    let (mut sh, fs) = shell();
    let image = payload(300);
    let digest = md5_hex(&image[..]).unwrap();
    let mut sender = SenderPeer::new(StreamKind::Serial, Some(&digest), &image);
    let stats = sh
        .upload("/sd/firmware.bin", &mut sender, &mut StandaloneMachine::new())
        .unwrap();
    assert!(stats.digest);
    assert_eq!(fs.get("/sd/firmware.bin").unwrap(), image);
    assert_eq!(fs.paths(), vec!["/sd/firmware.bin".to_string()]);
}

// ── Retries and cancellation ──────────────────────────────────

#[test]
fn corrupted_packets_are_retried() {
    let (mut sh, fs) = shell();
    let data = payload(400);
    let mut sender = SenderPeer::new(StreamKind::Serial, None, &data).corrupting(1, 3);
    sh.upload("/sd/r.bin", &mut sender, &mut StandaloneMachine::new())
        .unwrap();
    assert_eq!(sender.naks, 3);
    assert_eq!(fs.get("/sd/r.bin").unwrap(), data);
}

#[test]
fn digest_retries_do_not_count_against_data_packets() {
    let (mut sh, fs) = shell();
    let data = payload(400);
    let digest = md5_hex(&data[..]).unwrap();
    let retries = MAXRETRANS as usize - 1;
    let mut sender = SenderPeer::new(StreamKind::Serial, Some(&digest), &data)
        .corrupting(0, retries)
        .corrupting(1, retries);
    sh.upload("/sd/d.bin", &mut sender, &mut StandaloneMachine::new())
        .unwrap();
    assert_eq!(sender.naks, 2 * retries);
    assert_eq!(fs.get("/sd/d.bin").unwrap(), data);
    assert_eq!(fs.get(&md5_path("/sd/d.bin")).unwrap(), digest.as_bytes());
}

#[test]
fn hopeless_line_cancels_and_removes_partial_file() {
    let (mut sh, fs) = shell();
    let data = payload(400);
    let mut sender =
        SenderPeer::new(StreamKind::Serial, None, &data).corrupting(1, usize::MAX);
    let r = sh.upload("/sd/r.bin", &mut sender, &mut StandaloneMachine::new());
    assert_eq!(r, Err(TransferError::TooManyRetries));
    assert!(sender.cancelled);
    assert_eq!(sender.naks, MAXRETRANS as usize);
    assert_eq!(fs.get("/sd/r.bin"), None);
    assert_eq!(fs.get(&md5_path("/sd/r.bin")), None);
    let out = text(&sender.received);
    assert!(out.contains("Error: too many retry error!\r\n"));
    assert!(out.ends_with("Error: upload failed: /sd/r.bin.\r\n"));
}

#[test]
fn receiver_that_naks_a_few_times_still_gets_the_file() {
    let (mut sh, fs) = shell();
    let data = payload(500);
    fs.insert("/sd/n.bin", &data);
    let mut receiver = ReceiverPeer::new(StreamKind::Serial, CRC_REQUEST);
    receiver.nak_budget = 2;
    sh.download("/sd/n.bin", &mut receiver, &mut StandaloneMachine::new())
        .unwrap();
    assert_eq!(receiver.data, data);
}

#[test]
fn receiver_that_naks_everything_gets_cancelled() {
    let (mut sh, fs) = shell();
    fs.insert("/sd/n.bin", b"never arrives");
    let mut receiver = ReceiverPeer::new(StreamKind::Serial, CRC_REQUEST);
    receiver.nak_all = true;
    let r = sh.download("/sd/n.bin", &mut receiver, &mut StandaloneMachine::new());
    assert_eq!(r, Err(TransferError::TooManyRetries));
    // digest packet plus MAXRETRANS attempts at the first data packet
    assert_eq!(receiver.frames, 1 + MAXRETRANS as usize);
    assert!(receiver.other.starts_with(&[CAN, CAN, CAN]));
    assert!(receiver.other_text().contains("Error: download failed: /sd/n.bin."));
}

#[test]
fn remote_cancel_before_handshake() {
    let (mut sh, fs) = shell();
    fs.insert("/sd/c.bin", b"x");
    let mut receiver = ReceiverPeer::with_opening(StreamKind::Serial, &[CAN, CAN]);
    let r = sh.download("/sd/c.bin", &mut receiver, &mut StandaloneMachine::new());
    assert_eq!(r, Err(TransferError::Cancelled));
    assert_eq!(receiver.frames, 0);
    assert!(receiver.other_text().contains("Info: canceled by remote!\r\n"));
}

#[test]
fn busy_machine_refuses_both_directions() {
    let (mut sh, fs) = shell();
    fs.insert("/sd/b.bin", b"busy");
    let mut machine = StandaloneMachine::new();
    machine.queued_moves = 4;

    let mut sender = SenderPeer::new(StreamKind::Serial, None, b"data");
    assert_eq!(
        sh.upload("/sd/new.bin", &mut sender, &mut machine),
        Err(TransferError::MachineBusy)
    );
    assert_eq!(fs.get("/sd/new.bin"), None);

    let mut receiver = ReceiverPeer::new(StreamKind::Serial, CRC_REQUEST);
    assert_eq!(
        sh.download("/sd/b.bin", &mut receiver, &mut machine),
        Err(TransferError::MachineBusy)
    );
    assert!(receiver.other.starts_with(&[CAN, CAN, CAN]));
    assert_eq!(receiver.frames, 0);
}

#[test]
fn md5sum_matches_uploaded_digest() {
    let (mut sh, fs) = shell();
    let data = payload(777);
    fs.insert("/sd/m.bin", &data);
    let mut out = ReceiverPeer::with_opening(StreamKind::Serial, &[]);
    assert!(sh.execute("md5sum m.bin", &mut out, &mut StandaloneMachine::new()));
    let expected = format!("{} /sd/m.bin\r\n", md5_hex(&data[..]).unwrap());
    assert_eq!(out.other_text(), expected);
}
