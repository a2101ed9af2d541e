//! Link multiplexer and console path against the simulated radio.

use std::cell::RefCell;
use std::rc::Rc;

use wifilink::adapters::line_queue::LineQueue;
use wifilink::adapters::machine::StandaloneMachine;
use wifilink::adapters::mem_fs::MemFileStore;
use wifilink::adapters::time::ManualClock;
use wifilink::app::ports::MachinePort;
use wifilink::config::WifiConfig;
use wifilink::drivers::radio::{LinkId, LinkKind, MAX_FRAME};
use wifilink::drivers::sim::SimRadio;
use wifilink::endpoint::Endpoint;
use wifilink::link::{LinkMux, CONSOLE_LINK, DISCOVERY_LINK};
use wifilink::shell::Shell;
use wifilink::xmodem::digest::md5_hex;
use wifilink::xmodem::packet::{encode, BlockFormat};
use wifilink::xmodem::{md5_path, Mode, ACK, CRC_REQUEST, EOT};

const PEER: Endpoint = Endpoint::new([192, 168, 4, 10], 50_000);
const OTHER: Endpoint = Endpoint::new([192, 168, 4, 11], 50_001);

fn ready_mux() -> LinkMux<SimRadio> {
    let mut mux = LinkMux::new(SimRadio::new(), WifiConfig::default());
    mux.initialize().unwrap();
    mux
}

fn push(mux: &LinkMux<SimRadio>, link: LinkId, peer: Endpoint, data: &[u8]) {
    mux.io().with_radio(|r| r.push_inbound(link, peer, data)).unwrap();
}

fn sent_on(mux: &LinkMux<SimRadio>, link: LinkId) -> Vec<u8> {
    mux.io().with_radio(|r| r.sent_on(link)).unwrap()
}

type Log = Rc<RefCell<Vec<(Endpoint, Vec<u8>)>>>;

fn recording(mux: &mut LinkMux<SimRadio>, port: u16) -> (LinkId, Log) {
    let link = mux.allocate_link(LinkKind::TcpServer, port, Some(4)).unwrap();
    let log: Log = Rc::default();
    let sink = Rc::clone(&log);
    mux.register_callback(link, move |peer, data| sink.borrow_mut().push((peer, data.to_vec())))
        .unwrap();
    (link, log)
}

// ── Dispatch ──────────────────────────────────────────────────

#[test]
fn callbacks_only_see_their_own_link() {
    let mut mux = ready_mux();
    let (a, log_a) = recording(&mut mux, 8080);
    let (b, log_b) = recording(&mut mux, 8081);
    assert_ne!(a, b);

    push(&mux, a, PEER, b"for a");
    push(&mux, b, OTHER, b"for b");
    let (mut machine, mut lines) = (StandaloneMachine::new(), LineQueue::new());
    for _ in 0..2 {
        mux.on_data_ready_interrupt();
        mux.poll(&mut machine, &mut lines);
    }

    assert_eq!(*log_a.borrow(), vec![(PEER, b"for a".to_vec())]);
    assert_eq!(*log_b.borrow(), vec![(OTHER, b"for b".to_vec())]);
    assert!(lines.is_empty());
}

#[test]
fn data_for_a_removed_server_is_dropped() {
    let mut mux = ready_mux();
    let (link, log) = recording(&mut mux, 8080);
    mux.remove_server(link).unwrap();

    push(&mux, link, PEER, b"orphan");
    mux.on_data_ready_interrupt();
    mux.poll(&mut StandaloneMachine::new(), &mut LineQueue::new());

    assert!(log.borrow().is_empty());
    assert!(sent_on(&mux, link).is_empty());
}

#[test]
fn full_frames_are_drained_in_one_pass() {
    let mut mux = ready_mux();
    let (link, log) = recording(&mut mux, 8080);
    let big = vec![b'x'; MAX_FRAME * 2 + 5];
    push(&mux, link, PEER, &big);

    mux.on_data_ready_interrupt();
    mux.poll(&mut StandaloneMachine::new(), &mut LineQueue::new());

    let total: usize = log.borrow().iter().map(|(_, d)| d.len()).sum();
    assert_eq!(total, big.len());
}

// ── Console ───────────────────────────────────────────────────

#[test]
fn console_lines_reach_the_sink_one_per_poll() {
    let mut mux = ready_mux();
    push(&mux, CONSOLE_LINK, PEER, b"G0 X1\nG0 X2\n");
    let (mut machine, mut lines) = (StandaloneMachine::new(), LineQueue::new());

    mux.on_data_ready_interrupt();
    mux.poll(&mut machine, &mut lines);
    assert_eq!(lines.pop().as_deref(), Some("G0 X1"));

    mux.poll(&mut machine, &mut lines);
    assert_eq!(lines.pop().as_deref(), Some("G0 X2"));
    assert!(lines.is_empty());
}

#[test]
fn inbound_data_waits_while_a_transfer_runs() {
    let mut mux = ready_mux();
    push(&mux, CONSOLE_LINK, PEER, b"M105\n");
    let mut machine = StandaloneMachine::new();
    let mut lines = LineQueue::new();

    machine.set_uploading(true);
    mux.on_data_ready_interrupt();
    mux.poll(&mut machine, &mut lines);
    assert!(lines.is_empty());
    assert_eq!(mux.io().with_radio(|r| r.pending_inbound()).unwrap(), 1);

    machine.set_uploading(false);
    mux.on_data_ready_interrupt();
    mux.poll(&mut machine, &mut lines);
    assert_eq!(lines.pop().as_deref(), Some("M105"));
}

#[test]
fn beacons_go_out_on_the_discovery_link() {
    let mut mux = ready_mux();
    let machine = StandaloneMachine::new();
    mux.on_second_tick(&machine);
    let beacon = String::from_utf8(sent_on(&mux, DISCOVERY_LINK)).unwrap();
    assert!(beacon.contains("192.168.4.1"));
    assert!(beacon.contains("2222"));
}

#[test]
fn no_beacons_while_uploading() {
    let mut mux = ready_mux();
    let mut machine = StandaloneMachine::new();
    machine.set_uploading(true);
    mux.on_second_tick(&machine);
    assert!(sent_on(&mux, DISCOVERY_LINK).is_empty());
}

// ── Shell over the console link ───────────────────────────────

#[test]
fn upload_command_runs_over_the_console_link() {
    let mut mux = ready_mux();
    let fs = MemFileStore::new();
    let mut shell = Shell::new(fs.clone(), ManualClock::new());
    let mut machine = StandaloneMachine::new();
    let mut lines = LineQueue::new();

    push(&mux, CONSOLE_LINK, PEER, b"upload /sd/gcodes/wifi.nc\n");
    mux.on_data_ready_interrupt();
    mux.poll(&mut machine, &mut lines);
    let line = lines.pop().unwrap();

    // The peer sends the whole transfer up front; the device paces it.
    let data = b"G21\nG90\nG0 X0 Y0\n".repeat(600);
    let digest = md5_hex(&data[..]).unwrap();
    let format = BlockFormat::stx(wifilink::stream::StreamKind::Packet);
    let mut transfer = encode(format, 0, digest.as_bytes(), Mode::Crc);
    for (i, chunk) in data.chunks(format.block).enumerate() {
        transfer.extend(encode(format, (i + 1) as u8, chunk, Mode::Crc));
    }
    transfer.push(EOT);
    push(&mux, CONSOLE_LINK, PEER, &transfer);

    let mut console = mux.console_stream();
    assert!(shell.execute(&line, &mut console, &mut machine));

    assert_eq!(fs.get("/sd/gcodes/wifi.nc").unwrap(), data);
    assert_eq!(
        fs.get(&md5_path("/sd/gcodes/wifi.nc")).unwrap(),
        digest.as_bytes()
    );
    let out = sent_on(&mux, CONSOLE_LINK);
    let packets = data.len().div_ceil(format.block);
    let mut expected = vec![CRC_REQUEST];
    expected.extend(std::iter::repeat(ACK).take(packets + 2));
    assert_eq!(&out[..expected.len()], &expected[..]);
    assert!(String::from_utf8_lossy(&out).ends_with("Info: upload success: /sd/gcodes/wifi.nc.\r\n"));
    assert!(!machine.is_uploading());
    assert!(mux.io().rx_enabled());
}
