//! Unified error types for the wireless link layer.
//!
//! A single `Error` enum that every subsystem converts into, so the main
//! loop and the shell entry points handle failures uniformly. Driver and
//! link errors are `Copy` so they travel through callbacks and logs without
//! allocation.

use core::fmt;

use crate::app::ports::StorageError;
use crate::drivers::radio::StaStatus;
use crate::xmodem::TransferError;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// The radio co-processor or a logical link failed.
    Link(LinkError),
    /// An XModem upload or download failed.
    Transfer(TransferError),
    /// A station or access point command failed.
    Wlan(WlanError),
    /// File storage failed outside a transfer.
    Storage(StorageError),
    /// Configuration is invalid.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "link: {e}"),
            Self::Transfer(e) => write!(f, "transfer: {e}"),
            Self::Wlan(e) => write!(f, "wlan: {e}"),
            Self::Storage(e) => write!(f, "storage: {e}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<LinkError> for Error {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<DriverError> for Error {
    fn from(e: DriverError) -> Self {
        Self::Link(LinkError::Driver(e))
    }
}

impl From<TransferError> for Error {
    fn from(e: TransferError) -> Self {
        Self::Transfer(e)
    }
}

impl From<WlanError> for Error {
    fn from(e: WlanError) -> Self {
        Self::Wlan(e)
    }
}

impl From<StorageError> for Error {
    fn from(e: StorageError) -> Self {
        Self::Storage(e)
    }
}

// ---------------------------------------------------------------------------
// Driver errors
// ---------------------------------------------------------------------------

/// Command issued to the radio co-processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverOp {
    Reset,
    SelectInterface,
    SelfTest,
    StressTest,
    SetTxPower,
    SetupConnection,
    DeleteConnection,
    ConfigMaxClients,
    SetAutoDisconnect,
    Receive,
    Send,
    ListClients,
    DisconnectClient,
    QueryStatus,
    QueryAddress,
    Disconnect,
    SetOpMode,
    GetOpMode,
    Scan,
    Connect,
    QueryParam,
    ConfigAp,
    ModuleInfo,
    QueryConnection,
}

impl fmt::Display for DriverOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Reset => "reset",
            Self::SelectInterface => "select interface",
            Self::SelfTest => "self test",
            Self::StressTest => "stress test",
            Self::SetTxPower => "set tx power",
            Self::SetupConnection => "setup connection",
            Self::DeleteConnection => "delete connection",
            Self::ConfigMaxClients => "config max clients",
            Self::SetAutoDisconnect => "set auto disconnect",
            Self::Receive => "receive",
            Self::Send => "send",
            Self::ListClients => "list clients",
            Self::DisconnectClient => "disconnect client",
            Self::QueryStatus => "query status",
            Self::QueryAddress => "query address",
            Self::Disconnect => "disconnect",
            Self::SetOpMode => "set op mode",
            Self::GetOpMode => "get op mode",
            Self::Scan => "scan",
            Self::Connect => "connect",
            Self::QueryParam => "query param",
            Self::ConfigAp => "config ap",
            Self::ModuleInfo => "module info",
            Self::QueryConnection => "query connection",
        };
        f.write_str(name)
    }
}

/// A co-processor command failed with a 16-bit status code.
///
/// The high byte is the command class, the low byte the detailed reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverError {
    pub op: DriverOp,
    pub status: u16,
}

impl DriverError {
    pub const fn new(op: DriverOp, status: u16) -> Self {
        Self { op, status }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} failed (status=0x{:04X}, high=0x{:02X}, low=0x{:02X})",
            self.op,
            self.status,
            self.status >> 8,
            self.status & 0xFF
        )
    }
}

// ---------------------------------------------------------------------------
// Link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// The co-processor reported a failure.
    Driver(DriverError),
    /// `initialize()` has not succeeded; networking is disabled.
    Disabled,
    /// No free slot left in the link table.
    LinksExhausted,
    /// The link id was never allocated.
    UnknownLink(u8),
    /// The peer stopped accepting data part-way through a send.
    Closed { sent: usize },
    /// The driver is already in use further up the call stack.
    Busy,
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Driver(e) => write!(f, "driver: {e}"),
            Self::Disabled => write!(f, "networking disabled"),
            Self::LinksExhausted => write!(f, "no free link"),
            Self::UnknownLink(id) => write!(f, "unknown link {id}"),
            Self::Closed { sent } => write!(f, "connection closed after {sent} bytes"),
            Self::Busy => write!(f, "driver busy"),
        }
    }
}

impl std::error::Error for LinkError {}

impl From<DriverError> for LinkError {
    fn from(e: DriverError) -> Self {
        Self::Driver(e)
    }
}

// ---------------------------------------------------------------------------
// WLAN errors
// ---------------------------------------------------------------------------

/// Station and access point management failures. `Display` gives the text
/// printed on the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WlanError {
    Link(LinkError),
    /// Association ended in `status` instead of an address.
    ConnectFailed { status: StaStatus, ssid: String },
    ConnectTimeout,
    ScanTimeout,
    DisconnectFailed,
    InvalidChannel(u8),
    InvalidSsid,
    InvalidPassword,
    /// AP password changes need the access point running.
    NotAccessPoint,
}

impl fmt::Display for WlanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Link(e) => write!(f, "{e}"),
            Self::ConnectFailed { status, ssid } => match status {
                StaStatus::Idle => f.write_str("No connection started!"),
                StaStatus::WrongPassword => f.write_str("WiFi password incorrect!"),
                StaStatus::NoApFound => write!(f, "WiFi SSID not found: {ssid}!"),
                _ => f.write_str("Other error!"),
            },
            Self::ConnectTimeout => f.write_str("Connection timed out!"),
            Self::ScanTimeout => f.write_str("Scan timed out!"),
            Self::DisconnectFailed => f.write_str("Disconnect error!"),
            Self::InvalidChannel(_) => f.write_str("WiFi AP Channel should between 1 to 14"),
            Self::InvalidSsid => f.write_str("WiFi AP SSID length should between 1 to 27"),
            Self::InvalidPassword => f.write_str("WiFi AP password length should more than 7"),
            Self::NotAccessPoint => f.write_str("WiFi cannot set password when not in AP mode!"),
        }
    }
}

impl std::error::Error for WlanError {}

impl From<LinkError> for WlanError {
    fn from(e: LinkError) -> Self {
        Self::Link(e)
    }
}

impl From<DriverError> for WlanError {
    fn from(e: DriverError) -> Self {
        Self::Link(LinkError::Driver(e))
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
