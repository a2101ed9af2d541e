//! Radio co-processor command interface.
//!
//! The co-processor is an opaque, synchronous command/response device on
//! SPI. Each command either succeeds or returns a 16-bit status code,
//! surfaced as [`DriverError`]. The trait is not reentrant: callers hold
//! `&mut self` for the duration of one command and never call in from
//! interrupt context.

use core::net::Ipv4Addr;

use crate::endpoint::Endpoint;
use crate::error::DriverError;

/// Largest payload the co-processor accepts or delivers in one frame.
pub const MAX_FRAME: usize = 1460;

/// Most clients the co-processor tracks per server link.
pub const MAX_CLIENTS: usize = 15;

/// Receive wait passed to the co-processor, in milliseconds.
pub const RECV_TIMEOUT_MS: u16 = 10;

/// Most access points one scan reports.
pub const MAX_WLAN_SIGNALS: usize = 8;

/// Longest SSID the radio stores.
pub const SSID_LEN: usize = 32;

/// Numbered connection slot on the co-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct LinkId(pub u8);

impl core::fmt::Display for LinkId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Connection type, numbered as the co-processor expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LinkKind {
    Udp = 0,
    TcpClient = 1,
    TcpServer = 2,
}

/// Station (client-mode) association state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StaStatus {
    Idle,
    Connecting,
    WrongPassword,
    NoApFound,
    ConnectFailed,
    GotIp,
    Unknown(u8),
}

impl StaStatus {
    /// Decode the co-processor's raw status byte.
    pub const fn from_raw(raw: u8) -> Self {
        match raw {
            0 => Self::Idle,
            1 => Self::Connecting,
            2 => Self::WrongPassword,
            3 => Self::NoApFound,
            4 => Self::ConnectFailed,
            5 => Self::GotIp,
            other => Self::Unknown(other),
        }
    }

    /// States that count towards the reconnect-storm threshold.
    pub const fn is_failure(self) -> bool {
        matches!(
            self,
            Self::WrongPassword | Self::NoApFound | Self::ConnectFailed
        )
    }
}

/// Radio operating mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum OpMode {
    Station = 1,
    AccessPoint = 2,
    StationAndAccessPoint = 3,
}

impl OpMode {
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            1 => Some(Self::Station),
            2 => Some(Self::AccessPoint),
            3 => Some(Self::StationAndAccessPoint),
            _ => None,
        }
    }

    pub const fn has_access_point(self) -> bool {
        !matches!(self, Self::Station)
    }
}

/// Access point authentication: open, or WPA/WPA2-PSK.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum AuthMode {
    Open = 0,
    WpaWpa2Psk = 4,
}

/// One access point seen by a station scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScannedSignal {
    pub ssid: heapless::String<SSID_LEN>,
    /// Raw authentication mode; 0 is open.
    pub authmode: u8,
    pub rssi: i8,
    pub channel: u8,
}

pub type ScanList = heapless::Vec<ScannedSignal, MAX_WLAN_SIGNALS>;

/// Station parameters that can be read back (`M482.<n>` order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum StaParam {
    Ssid,
    Password,
    Channel,
    Hostname,
    Mac,
    IpAddr,
    GatewayAddr,
    NetmaskAddr,
}

impl StaParam {
    /// Parameter for console subcode `n`; unknown codes ask for the SSID.
    pub const fn from_subcode(n: u8) -> Self {
        match n {
            1 => Self::Password,
            2 => Self::Channel,
            3 => Self::Hostname,
            4 => Self::Mac,
            5 => Self::IpAddr,
            6 => Self::GatewayAddr,
            7 => Self::NetmaskAddr,
            _ => Self::Ssid,
        }
    }
}

/// Access point parameters (`M483.<n>` order).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ApParam {
    Ssid,
    Password,
    Channel,
    AuthMode,
    IpAddr,
    GatewayAddr,
    NetmaskAddr,
    PhyMode,
}

impl ApParam {
    /// Parameter for console subcode `n`; unknown codes ask for the SSID.
    pub const fn from_subcode(n: u8) -> Self {
        match n {
            1 => Self::Password,
            2 => Self::Channel,
            3 => Self::AuthMode,
            4 => Self::IpAddr,
            5 => Self::GatewayAddr,
            6 => Self::NetmaskAddr,
            7 => Self::PhyMode,
            _ => Self::Ssid,
        }
    }

    /// Single-byte numeric parameters, as opposed to text.
    pub const fn is_numeric(self) -> bool {
        matches!(self, Self::Channel | Self::AuthMode | Self::PhyMode)
    }
}

/// Identity and firmware of the co-processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleInfo {
    pub chip_id: u32,
    pub flash_size: u8,
    pub firmware: heapless::String<24>,
}

impl core::fmt::Display for ModuleInfo {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "esp8266_id:{}, flash_size:{}, fw_ver:{}",
            self.chip_id, self.flash_size, self.firmware
        )
    }
}

/// Metadata of one received frame; the payload is in the caller's buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RxFrame {
    pub link: LinkId,
    pub peer: Endpoint,
    pub len: usize,
}

/// One client connected to a server link, as reported by the co-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClientInfo {
    pub peer: Endpoint,
    /// Opaque slot index the co-processor needs to disconnect this client.
    pub slot: u8,
}

pub type ClientList = heapless::Vec<ClientInfo, MAX_CLIENTS>;

/// Interface address and netmask.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IfAddr {
    pub ip: Ipv4Addr,
    pub netmask: Ipv4Addr,
}

impl IfAddr {
    /// Directed broadcast address of this subnet: `ip | !netmask`.
    pub fn broadcast(&self) -> Ipv4Addr {
        Ipv4Addr::from(u32::from(self.ip) | !u32::from(self.netmask))
    }
}

/// Synchronous command interface to the radio co-processor.
pub trait RadioDriver {
    /// Drive the reset and chip-select lines through the power-on sequence.
    fn hardware_reset(&mut self) -> Result<(), DriverError>;

    /// Select the host interface (SPI) and its clock.
    fn select_interface(&mut self, clock_hz: u32) -> Result<(), DriverError>;

    /// Single register round trip proving the bus works.
    fn self_test(&mut self) -> bool;

    /// Run `rounds` bulk command round trips; returns how many succeeded.
    fn stress_test(&mut self, rounds: u32) -> u32;

    fn set_tx_max_power(&mut self, level: u8) -> Result<(), DriverError>;

    /// Switch operating mode; the choice is saved across module resets.
    fn set_op_mode(&mut self, mode: OpMode) -> Result<(), DriverError>;

    fn op_mode(&mut self) -> Result<OpMode, DriverError>;

    /// Open `link` as `kind` on `local_port`. `remote` is the default peer
    /// for UDP and client links; servers ignore it.
    fn setup_connection(
        &mut self,
        link: LinkId,
        kind: LinkKind,
        local_port: u16,
        remote: Endpoint,
    ) -> Result<(), DriverError>;

    fn delete_connection(&mut self, link: LinkId) -> Result<(), DriverError>;

    fn config_max_clients(&mut self, link: LinkId, max: u8) -> Result<(), DriverError>;

    /// Idle timeout after which the co-processor drops a server's clients.
    fn set_auto_disconnect(&mut self, link: LinkId, timeout_s: u16) -> Result<(), DriverError>;

    /// `true` when at least one frame is waiting in the co-processor.
    fn has_data(&mut self) -> bool;

    /// Receive one frame into `buf`. `Ok(None)` when nothing is queued.
    fn recv(&mut self, buf: &mut [u8], timeout_ms: u16) -> Result<Option<RxFrame>, DriverError>;

    /// Send at most [`MAX_FRAME`] bytes on `link`. `peer` selects the
    /// destination on UDP links and the client on server links; `None`
    /// uses the link's default peer. Returns the bytes accepted.
    fn send(&mut self, link: LinkId, peer: Option<Endpoint>, data: &[u8]) -> Result<usize, DriverError>;

    fn list_clients(&mut self, link: LinkId) -> Result<ClientList, DriverError>;

    fn disconnect_client(&mut self, link: LinkId, client: &ClientInfo) -> Result<(), DriverError>;

    fn sta_status(&mut self) -> Result<StaStatus, DriverError>;

    fn sta_disconnect(&mut self) -> Result<(), DriverError>;

    fn sta_address(&mut self) -> Result<IfAddr, DriverError>;

    fn ap_address(&mut self) -> Result<IfAddr, DriverError>;

    // ── WLAN management ───────────────────────────────────────

    /// Start a station scan on all channels. Results come from
    /// [`Self::fetch_scan`].
    fn start_scan(&mut self) -> Result<(), DriverError>;

    /// Results of the last scan; `Ok(None)` while it is still running.
    fn fetch_scan(&mut self) -> Result<Option<ScanList>, DriverError>;

    /// Begin associating with `ssid`. Progress is read through
    /// [`Self::sta_status`].
    fn sta_connect(&mut self, ssid: &str, password: &str) -> Result<(), DriverError>;

    /// Read a station parameter into `buf`; returns the bytes written.
    fn query_sta_param(&mut self, param: StaParam, buf: &mut [u8]) -> Result<usize, DriverError>;

    /// Read an access point parameter into `buf`; returns the bytes written.
    fn query_ap_param(&mut self, param: ApParam, buf: &mut [u8]) -> Result<usize, DriverError>;

    /// Write an access point parameter and save it.
    fn config_ap_param(&mut self, param: ApParam, value: &[u8]) -> Result<(), DriverError>;

    fn module_info(&mut self) -> Result<ModuleInfo, DriverError>;

    /// Raw connection state of `link` as the co-processor reports it.
    fn connection_state(&mut self, link: LinkId) -> Result<u8, DriverError>;
}
