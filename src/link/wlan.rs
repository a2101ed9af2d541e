//! Station and access point management.
//!
//! Everything here is a short command exchange with the co-processor except
//! [`LinkMux::scan_wlan`] and [`LinkMux::connect_sta`], which poll the
//! radio until it settles. Both give up after a fixed time so a silent
//! module cannot hang the console.

use core::fmt::Write as _;
use core::net::Ipv4Addr;

use log::{debug, info, warn};

use super::LinkMux;
use crate::app::ports::TimePort;
use crate::drivers::radio::{
    ApParam, AuthMode, LinkId, ModuleInfo, OpMode, RadioDriver, ScanList, ScannedSignal, StaParam, StaStatus,
};
use crate::error::{DriverError, LinkError, WlanError};

/// Longest wait for a scan to complete.
pub const SCAN_TIMEOUT_MS: u64 = 10_000;
/// Longest wait for the station to leave `Connecting`.
pub const CONNECT_TIMEOUT_MS: u64 = 30_000;
/// Access point SSIDs are 1 to 27 bytes.
pub const AP_SSID_MAX: usize = 27;
/// Shortest non-empty access point password.
pub const AP_PASSWORD_MIN: usize = 8;

/// SSID byte that stands in for a space in scan listings.
pub const SSID_SPACE: char = '\u{1}';

/// Render a scan as the console reports it, one access point per line:
/// `ssid,secured,rssi,connected`.
///
/// Spaces in SSIDs become [`SSID_SPACE`] so the line splits cleanly on the
/// host side. Repeated SSIDs are listed once, first sighting wins.
pub fn format_scan(signals: &[ScannedSignal], current_ssid: &str, connected: bool) -> String {
    let mut seen: Vec<&str> = Vec::with_capacity(signals.len());
    let mut out = String::new();
    for sig in signals {
        let ssid = sig.ssid.as_str();
        if seen.contains(&ssid) {
            continue;
        }
        seen.push(ssid);
        let here = connected && !current_ssid.is_empty() && ssid == current_ssid;
        let _ = writeln!(
            out,
            "{},{},{},{}",
            ssid.replace(' ', &SSID_SPACE.to_string()),
            u8::from(sig.authmode != AuthMode::Open as u8),
            sig.rssi,
            u8::from(here)
        );
    }
    out
}

/// Readable form of a raw parameter: one decimal for numeric parameters,
/// text up to the first NUL otherwise.
fn param_text(raw: &[u8], numeric: bool) -> String {
    if numeric {
        return raw.first().map_or_else(String::new, u8::to_string);
    }
    let end = raw.iter().position(|&b| b == 0).unwrap_or(raw.len());
    String::from_utf8_lossy(&raw[..end]).into_owned()
}

impl<R: RadioDriver> LinkMux<R> {
    fn wlan<T>(&self, f: impl FnOnce(&mut R) -> Result<T, DriverError>) -> Result<T, WlanError> {
        self.ensure_ready()?;
        Ok(self.io.with_radio(f)??)
    }

    // ── Station ───────────────────────────────────────────────

    /// Scan for access points and wait for the result.
    pub fn scan_wlan<T: TimePort>(&self, clock: &mut T) -> Result<ScanList, WlanError> {
        self.wlan(|r| r.start_scan())?;
        let start = clock.now_us();
        loop {
            if let Some(list) = self.wlan(|r| r.fetch_scan())? {
                debug!("wifi: scan found {} signals", list.len());
                return Ok(list);
            }
            if clock.now_us().saturating_sub(start) >= SCAN_TIMEOUT_MS * 1_000 {
                warn!("wifi: scan timed out");
                return Err(WlanError::ScanTimeout);
            }
            clock.delay_ms(1);
        }
    }

    /// Scan and render the result with [`format_scan`], marking the network
    /// the station is currently attached to.
    pub fn scan_report<T: TimePort>(&self, clock: &mut T) -> Result<String, WlanError> {
        let current = self.sta_param_text(StaParam::Ssid)?;
        let connected = self.wlan(|r| r.sta_status())? == StaStatus::GotIp;
        let list = self.scan_wlan(clock)?;
        Ok(format_scan(&list, &current, connected))
    }

    /// Join `ssid` and wait for an address.
    pub fn connect_sta<T: TimePort>(&self, ssid: &str, password: &str, clock: &mut T) -> Result<Ipv4Addr, WlanError> {
        info!("wifi: connecting to {:?}", ssid);
        self.wlan(|r| r.sta_connect(ssid, password))?;
        let start = clock.now_us();
        loop {
            match self.wlan(|r| r.sta_status())? {
                StaStatus::Connecting => {
                    if clock.now_us().saturating_sub(start) >= CONNECT_TIMEOUT_MS * 1_000 {
                        warn!("wifi: association with {:?} timed out", ssid);
                        return Err(WlanError::ConnectTimeout);
                    }
                    clock.delay_ms(1);
                }
                StaStatus::GotIp => {
                    let addr = self.wlan(|r| r.sta_address())?;
                    info!("wifi: connected to {:?}, ip {}", ssid, addr.ip);
                    return Ok(addr.ip);
                }
                status => {
                    warn!("wifi: association with {:?} ended in {:?}", ssid, status);
                    return Err(WlanError::ConnectFailed {
                        status,
                        ssid: ssid.to_string(),
                    });
                }
            }
        }
    }

    pub fn disconnect_sta(&self) -> Result<(), WlanError> {
        match self.wlan(|r| r.sta_disconnect()) {
            Err(WlanError::Link(LinkError::Driver(e))) => {
                warn!("wifi: station disconnect: {}", e);
                Err(WlanError::DisconnectFailed)
            }
            other => other,
        }
    }

    pub fn sta_param_text(&self, param: StaParam) -> Result<String, WlanError> {
        let mut buf = [0u8; 64];
        let n = self.wlan(|r| r.query_sta_param(param, &mut buf))?;
        if param == StaParam::Mac {
            let hex: Vec<String> = buf[..n].iter().map(|b| format!("{b:02x}")).collect();
            return Ok(hex.join(":"));
        }
        Ok(param_text(&buf[..n], param == StaParam::Channel))
    }

    // ── Access point ──────────────────────────────────────────

    pub fn set_ap_channel(&self, channel: u8) -> Result<(), WlanError> {
        if !(1..=14).contains(&channel) {
            return Err(WlanError::InvalidChannel(channel));
        }
        self.wlan(|r| r.config_ap_param(ApParam::Channel, &[channel]))?;
        info!("wifi: AP channel changed to {}", channel);
        Ok(())
    }

    pub fn set_ap_ssid(&self, ssid: &str) -> Result<(), WlanError> {
        if ssid.is_empty() || ssid.len() > AP_SSID_MAX {
            return Err(WlanError::InvalidSsid);
        }
        self.wlan(|r| r.config_ap_param(ApParam::Ssid, ssid.as_bytes()))?;
        info!("wifi: AP SSID changed to {:?}", ssid);
        Ok(())
    }

    /// Set the AP password; empty opens the network.
    ///
    /// Only allowed while the access point runs alongside the station.
    pub fn set_ap_password(&self, password: &str) -> Result<(), WlanError> {
        if !password.is_empty() && password.len() < AP_PASSWORD_MIN {
            return Err(WlanError::InvalidPassword);
        }
        if self.wlan(|r| r.op_mode())? != OpMode::StationAndAccessPoint {
            return Err(WlanError::NotAccessPoint);
        }
        let auth = if password.is_empty() {
            AuthMode::Open
        } else {
            AuthMode::WpaWpa2Psk
        };
        self.wlan(|r| r.config_ap_param(ApParam::Password, password.as_bytes()))?;
        self.wlan(|r| r.config_ap_param(ApParam::AuthMode, &[auth as u8]))?;
        info!("wifi: AP password changed ({:?})", auth);
        Ok(())
    }

    /// Run the access point next to the station, or the station alone.
    pub fn set_ap_enabled(&self, enabled: bool) -> Result<(), WlanError> {
        let mode = if enabled {
            OpMode::StationAndAccessPoint
        } else {
            OpMode::Station
        };
        self.wlan(|r| r.set_op_mode(mode))?;
        info!(
            "WiFi Access Point {}...",
            if enabled { "Enabled" } else { "Disabled" }
        );
        Ok(())
    }

    pub fn ap_param_text(&self, param: ApParam) -> Result<String, WlanError> {
        let mut buf = [0u8; 64];
        let n = self.wlan(|r| r.query_ap_param(param, &mut buf))?;
        Ok(param_text(&buf[..n], param.is_numeric()))
    }

    // ── Module ────────────────────────────────────────────────

    pub fn module_info(&self) -> Result<ModuleInfo, WlanError> {
        self.wlan(|r| r.module_info())
    }

    pub fn connection_state(&self, link: LinkId) -> Result<u8, WlanError> {
        self.wlan(|r| r.connection_state(link))
    }
}
