//! Host-side simulation of the radio co-processor.
//!
//! Frames pushed with [`SimRadio::push_inbound`] are delivered by `recv`
//! in FIFO order; everything sent is recorded for inspection. Failure
//! knobs let tests drive the init, short-write and reconnect paths.

use core::convert::Infallible;
use core::net::Ipv4Addr;
use std::cell::RefCell;
use std::collections::{BTreeMap, VecDeque};
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{ErrorType, OutputPin};
use log::debug;

use super::radio::{
    ApParam, ClientInfo, ClientList, IfAddr, LinkId, LinkKind, ModuleInfo, OpMode, RadioDriver, RxFrame,
    ScanList, ScannedSignal, StaParam, StaStatus, MAX_FRAME,
};
use super::reset::hardware_reset;
use crate::endpoint::Endpoint;
use crate::error::{DriverError, DriverOp};

/// One step recorded while the reset sequence runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetStep {
    ChipSelect(bool),
    Reset(bool),
    DelayMs(u32),
}

/// A frame handed to `send`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub link: LinkId,
    pub peer: Option<Endpoint>,
    pub data: Vec<u8>,
}

/// An open connection slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimConnection {
    pub kind: LinkKind,
    pub local_port: u16,
    pub remote: Endpoint,
    pub max_clients: Option<u8>,
}

type ResetTrace = Rc<RefCell<Vec<ResetStep>>>;

struct SimLine {
    chip_select: bool,
    trace: ResetTrace,
}

impl ErrorType for SimLine {
    type Error = Infallible;
}

impl OutputPin for SimLine {
    fn set_low(&mut self) -> Result<(), Infallible> {
        self.record(false);
        Ok(())
    }

    fn set_high(&mut self) -> Result<(), Infallible> {
        self.record(true);
        Ok(())
    }
}

impl SimLine {
    fn record(&self, level: bool) {
        let step = if self.chip_select {
            ResetStep::ChipSelect(level)
        } else {
            ResetStep::Reset(level)
        };
        self.trace.borrow_mut().push(step);
    }
}

struct SimDelay(ResetTrace);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().push(ResetStep::DelayMs(ns / 1_000_000));
    }

    fn delay_ms(&mut self, ms: u32) {
        self.0.borrow_mut().push(ResetStep::DelayMs(ms));
    }
}

/// Simulated co-processor.
#[derive(Debug)]
pub struct SimRadio {
    inbound: VecDeque<(LinkId, Endpoint, Vec<u8>)>,
    /// Every accepted send, in order.
    pub sent: Vec<SentFrame>,
    /// Open connections by link number.
    pub connections: BTreeMap<u8, SimConnection>,
    clients: BTreeMap<u8, Vec<ClientInfo>>,
    /// Clients disconnected through `disconnect_client`.
    pub disconnected: Vec<(LinkId, ClientInfo)>,
    reset_trace: ResetTrace,

    // ── Failure / status knobs ────────────────────────────────
    /// Status returned by `select_interface`, if it should fail.
    pub fail_select: Option<u16>,
    pub self_test_ok: bool,
    /// Rounds reported by `stress_test`; `None` means all succeed.
    pub stress_successes: Option<u32>,
    /// Accept at most this many bytes per `send`.
    pub send_limit: Option<usize>,
    pub sta_status: StaStatus,
    pub sta_addr: IfAddr,
    pub ap_addr: IfAddr,
    pub sta_disconnects: u32,
    pub op_mode: Option<OpMode>,
    pub tx_power: Option<u8>,
    pub spi_clock_hz: Option<u32>,
    pub recv_calls: u32,

    // ── WLAN ──────────────────────────────────────────────────
    /// Access points the next scan finds, in radio order.
    pub scan_results: Vec<ScannedSignal>,
    /// `fetch_scan` calls that report "still scanning" after a start.
    pub scan_polls: u32,
    scan_pending: Option<u32>,
    /// Status returned by `fetch_scan`, if the scan should fail.
    pub fail_scan: Option<u16>,
    pub sta_ssid: String,
    pub sta_password: String,
    /// Where an association attempt ends up.
    pub connect_outcome: StaStatus,
    /// Status polls that report `Connecting` before the outcome.
    pub connect_polls: u32,
    connecting: Option<u32>,
    pub fail_disconnect: bool,
    pub ap_params: BTreeMap<ApParam, Vec<u8>>,
    pub module: ModuleInfo,
    /// Reported by `connection_state` for any open link.
    pub link_state: u8,
}

impl Default for SimRadio {
    fn default() -> Self {
        Self::new()
    }
}

impl SimRadio {
    pub fn new() -> Self {
        Self {
            inbound: VecDeque::new(),
            sent: Vec::new(),
            connections: BTreeMap::new(),
            clients: BTreeMap::new(),
            disconnected: Vec::new(),
            reset_trace: Rc::default(),
            fail_select: None,
            self_test_ok: true,
            stress_successes: None,
            send_limit: None,
            sta_status: StaStatus::Idle,
            sta_addr: IfAddr {
                ip: Ipv4Addr::new(192, 168, 1, 37),
                netmask: Ipv4Addr::new(255, 255, 255, 0),
            },
            ap_addr: IfAddr {
                ip: Ipv4Addr::new(192, 168, 4, 1),
                netmask: Ipv4Addr::new(255, 255, 255, 0),
            },
            sta_disconnects: 0,
            op_mode: None,
            tx_power: None,
            spi_clock_hz: None,
            recv_calls: 0,
            scan_results: Vec::new(),
            scan_polls: 2,
            scan_pending: None,
            fail_scan: None,
            sta_ssid: String::new(),
            sta_password: String::new(),
            connect_outcome: StaStatus::GotIp,
            connect_polls: 2,
            connecting: None,
            fail_disconnect: false,
            ap_params: BTreeMap::from([
                (ApParam::Ssid, b"CARVERA_AP".to_vec()),
                (ApParam::Password, Vec::new()),
                (ApParam::Channel, vec![6]),
                (ApParam::AuthMode, vec![0]),
                (ApParam::PhyMode, vec![3]),
            ]),
            module: ModuleInfo {
                chip_id: 10_351_225,
                flash_size: 4,
                firmware: heapless::String::try_from("1.3.3").unwrap_or_default(),
            },
            link_state: 3,
        }
    }

    /// Add an access point to what the next scan reports.
    pub fn add_signal(&mut self, ssid: &str, authmode: u8, rssi: i8) {
        self.scan_results.push(ScannedSignal {
            ssid: heapless::String::try_from(ssid).unwrap_or_default(),
            authmode,
            rssi,
            channel: 1,
        });
    }

    pub fn ap_param(&self, param: ApParam) -> &[u8] {
        self.ap_params.get(&param).map_or(&[], Vec::as_slice)
    }

    /// Queue a frame as if it had arrived over the air.
    pub fn push_inbound(&mut self, link: LinkId, peer: Endpoint, data: &[u8]) {
        for chunk in data.chunks(MAX_FRAME) {
            self.inbound.push_back((link, peer, chunk.to_vec()));
        }
    }

    pub fn pending_inbound(&self) -> usize {
        self.inbound.len()
    }

    /// Register a client as connected to `link`.
    pub fn connect_client(&mut self, link: LinkId, peer: Endpoint) {
        let list = self.clients.entry(link.0).or_default();
        let slot = list.len() as u8;
        list.push(ClientInfo { peer, slot });
    }

    /// Frames sent on `link`, concatenated.
    pub fn sent_on(&self, link: LinkId) -> Vec<u8> {
        self.sent
            .iter()
            .filter(|f| f.link == link)
            .flat_map(|f| f.data.iter().copied())
            .collect()
    }

    /// Frames sent to `peer` on `link`, concatenated.
    pub fn sent_to(&self, link: LinkId, peer: Endpoint) -> Vec<u8> {
        self.sent
            .iter()
            .filter(|f| f.link == link && f.peer == Some(peer))
            .flat_map(|f| f.data.iter().copied())
            .collect()
    }

    pub fn reset_trace(&self) -> Vec<ResetStep> {
        self.reset_trace.borrow().clone()
    }
}

impl RadioDriver for SimRadio {
    fn hardware_reset(&mut self) -> Result<(), DriverError> {
        self.reset_trace.borrow_mut().clear();
        let mut nreset = SimLine {
            chip_select: false,
            trace: self.reset_trace.clone(),
        };
        let mut ncs = SimLine {
            chip_select: true,
            trace: self.reset_trace.clone(),
        };
        let mut delay = SimDelay(self.reset_trace.clone());
        hardware_reset(&mut nreset, &mut ncs, &mut delay)
    }

    fn select_interface(&mut self, clock_hz: u32) -> Result<(), DriverError> {
        if let Some(status) = self.fail_select {
            return Err(DriverError::new(DriverOp::SelectInterface, status));
        }
        self.spi_clock_hz = Some(clock_hz);
        Ok(())
    }

    fn self_test(&mut self) -> bool {
        self.self_test_ok
    }

    fn stress_test(&mut self, rounds: u32) -> u32 {
        self.stress_successes.unwrap_or(rounds).min(rounds)
    }

    fn set_tx_max_power(&mut self, level: u8) -> Result<(), DriverError> {
        self.tx_power = Some(level);
        Ok(())
    }

    fn set_op_mode(&mut self, mode: OpMode) -> Result<(), DriverError> {
        self.op_mode = Some(mode);
        Ok(())
    }

    fn op_mode(&mut self) -> Result<OpMode, DriverError> {
        Ok(self.op_mode.unwrap_or(OpMode::StationAndAccessPoint))
    }

    fn setup_connection(
        &mut self,
        link: LinkId,
        kind: LinkKind,
        local_port: u16,
        remote: Endpoint,
    ) -> Result<(), DriverError> {
        debug!("sim: setup link {} {:?} port {}", link, kind, local_port);
        self.connections.insert(
            link.0,
            SimConnection {
                kind,
                local_port,
                remote,
                max_clients: None,
            },
        );
        Ok(())
    }

    fn delete_connection(&mut self, link: LinkId) -> Result<(), DriverError> {
        self.connections.remove(&link.0);
        self.clients.remove(&link.0);
        Ok(())
    }

    fn config_max_clients(&mut self, link: LinkId, max: u8) -> Result<(), DriverError> {
        match self.connections.get_mut(&link.0) {
            Some(conn) => {
                conn.max_clients = Some(max);
                Ok(())
            }
            None => Err(DriverError::new(DriverOp::ConfigMaxClients, 0x0101)),
        }
    }

    fn set_auto_disconnect(&mut self, link: LinkId, _timeout_s: u16) -> Result<(), DriverError> {
        if self.connections.contains_key(&link.0) {
            Ok(())
        } else {
            Err(DriverError::new(DriverOp::SetAutoDisconnect, 0x0101))
        }
    }

    fn has_data(&mut self) -> bool {
        !self.inbound.is_empty()
    }

    fn recv(&mut self, buf: &mut [u8], _timeout_ms: u16) -> Result<Option<RxFrame>, DriverError> {
        self.recv_calls += 1;
        let Some((link, peer, data)) = self.inbound.pop_front() else {
            return Ok(None);
        };
        let len = data.len().min(buf.len());
        buf[..len].copy_from_slice(&data[..len]);
        if len < data.len() {
            self.inbound.push_front((link, peer, data[len..].to_vec()));
        }
        Ok(Some(RxFrame { link, peer, len }))
    }

    fn send(&mut self, link: LinkId, peer: Option<Endpoint>, data: &[u8]) -> Result<usize, DriverError> {
        if !self.connections.contains_key(&link.0) {
            return Err(DriverError::new(DriverOp::Send, 0x0102));
        }
        let n = self.send_limit.map_or(data.len(), |lim| lim.min(data.len()));
        self.sent.push(SentFrame {
            link,
            peer,
            data: data[..n].to_vec(),
        });
        Ok(n)
    }

    fn list_clients(&mut self, link: LinkId) -> Result<ClientList, DriverError> {
        let mut out = ClientList::new();
        for c in self.clients.get(&link.0).into_iter().flatten() {
            let _ = out.push(*c);
        }
        Ok(out)
    }

    fn disconnect_client(&mut self, link: LinkId, client: &ClientInfo) -> Result<(), DriverError> {
        if let Some(list) = self.clients.get_mut(&link.0) {
            list.retain(|c| c != client);
        }
        self.disconnected.push((link, *client));
        Ok(())
    }

    fn sta_status(&mut self) -> Result<StaStatus, DriverError> {
        if let Some(left) = self.connecting.as_mut() {
            if *left > 0 {
                *left -= 1;
                return Ok(StaStatus::Connecting);
            }
            self.connecting = None;
            self.sta_status = self.connect_outcome;
        }
        Ok(self.sta_status)
    }

    fn sta_disconnect(&mut self) -> Result<(), DriverError> {
        if self.fail_disconnect {
            return Err(DriverError::new(DriverOp::Disconnect, 0x0301));
        }
        self.sta_disconnects += 1;
        self.sta_status = StaStatus::Idle;
        self.sta_ssid.clear();
        Ok(())
    }

    fn sta_address(&mut self) -> Result<IfAddr, DriverError> {
        Ok(self.sta_addr)
    }

    fn ap_address(&mut self) -> Result<IfAddr, DriverError> {
        Ok(self.ap_addr)
    }

    fn start_scan(&mut self) -> Result<(), DriverError> {
        self.scan_pending = Some(self.scan_polls);
        Ok(())
    }

    fn fetch_scan(&mut self) -> Result<Option<ScanList>, DriverError> {
        if let Some(status) = self.fail_scan {
            return Err(DriverError::new(DriverOp::Scan, status));
        }
        match self.scan_pending.as_mut() {
            Some(left) if *left > 0 => {
                *left -= 1;
                return Ok(None);
            }
            Some(_) => self.scan_pending = None,
            None => return Err(DriverError::new(DriverOp::Scan, 0x0126)),
        }
        let mut out = ScanList::new();
        for sig in self.scan_results.iter().take(out.capacity()) {
            let _ = out.push(sig.clone());
        }
        Ok(Some(out))
    }

    fn sta_connect(&mut self, ssid: &str, password: &str) -> Result<(), DriverError> {
        debug!("sim: associating with {:?}", ssid);
        self.sta_ssid = ssid.to_string();
        self.sta_password = password.to_string();
        self.sta_status = StaStatus::Connecting;
        self.connecting = Some(self.connect_polls);
        Ok(())
    }

    fn query_sta_param(&mut self, param: StaParam, buf: &mut [u8]) -> Result<usize, DriverError> {
        let value: Vec<u8> = match param {
            StaParam::Ssid => self.sta_ssid.clone().into_bytes(),
            StaParam::Password => self.sta_password.clone().into_bytes(),
            StaParam::Channel => vec![1],
            StaParam::Hostname => b"wifilink".to_vec(),
            StaParam::Mac => vec![0x5C, 0xCF, 0x7F, 0x01, 0x02, 0x03],
            StaParam::IpAddr => self.sta_addr.ip.to_string().into_bytes(),
            StaParam::GatewayAddr => b"192.168.1.1".to_vec(),
            StaParam::NetmaskAddr => self.sta_addr.netmask.to_string().into_bytes(),
        };
        Ok(copy_param(&value, buf))
    }

    fn query_ap_param(&mut self, param: ApParam, buf: &mut [u8]) -> Result<usize, DriverError> {
        let value: Vec<u8> = match param {
            ApParam::IpAddr | ApParam::GatewayAddr => self.ap_addr.ip.to_string().into_bytes(),
            ApParam::NetmaskAddr => self.ap_addr.netmask.to_string().into_bytes(),
            other => self.ap_param(other).to_vec(),
        };
        Ok(copy_param(&value, buf))
    }

    fn config_ap_param(&mut self, param: ApParam, value: &[u8]) -> Result<(), DriverError> {
        self.ap_params.insert(param, value.to_vec());
        Ok(())
    }

    fn module_info(&mut self) -> Result<ModuleInfo, DriverError> {
        Ok(self.module.clone())
    }

    fn connection_state(&mut self, link: LinkId) -> Result<u8, DriverError> {
        if self.connections.contains_key(&link.0) {
            Ok(self.link_state)
        } else {
            Err(DriverError::new(DriverOp::QueryConnection, 0x0101))
        }
    }
}

fn copy_param(value: &[u8], buf: &mut [u8]) -> usize {
    let n = value.len().min(buf.len());
    buf[..n].copy_from_slice(&value[..n]);
    n
}
