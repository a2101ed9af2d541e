//! Discovery beacon and station reconnect-storm guard.

use core::fmt::Write as _;
use core::net::Ipv4Addr;

use log::warn;

use crate::drivers::radio::StaStatus;

/// Consecutive association failures tolerated before forcing a disconnect.
pub const MAX_STA_FAILURES: u32 = 10;

/// Fits a 32-byte name, a dotted quad, a port and the flag.
pub const BEACON_LEN: usize = 64;

/// Format `"<name>,<ip>,<tcp_port>,<0|1>"`.
pub fn beacon(name: &str, ip: Ipv4Addr, tcp_port: u16, client_connected: bool) -> heapless::String<BEACON_LEN> {
    let mut out = heapless::String::new();
    // Cannot overflow: the name is bounded by the config type.
    let _ = write!(out, "{},{},{},{}", name, ip, tcp_port, u8::from(client_connected));
    out
}

/// What the 1 Hz tick should do after sampling the station status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthAction {
    /// Associated: beacon on the station subnet too.
    Connected,
    /// Not associated; keep waiting.
    Retry,
    /// Too many failures in a row: drop the association attempt.
    ForceDisconnect,
}

/// Consecutive-failure counter for station association.
#[derive(Debug, Default)]
pub struct StaHealth {
    failures: u32,
}

impl StaHealth {
    pub const fn new() -> Self {
        Self { failures: 0 }
    }

    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn observe(&mut self, status: StaStatus) -> HealthAction {
        if status == StaStatus::GotIp {
            self.failures = 0;
            return HealthAction::Connected;
        }
        if !status.is_failure() {
            self.failures = 0;
            return HealthAction::Retry;
        }
        self.failures += 1;
        if self.failures > MAX_STA_FAILURES {
            warn!(
                "wifi: {} consecutive association failures ({:?}), disconnecting",
                self.failures, status
            );
            self.failures = 0;
            HealthAction::ForceDisconnect
        } else {
            HealthAction::Retry
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn beacon_format() {
        let b = beacon("CARVERA", Ipv4Addr::new(192, 168, 4, 1), 2222, false);
        assert_eq!(b.as_str(), "CARVERA,192.168.4.1,2222,0");
        let b = beacon("M", Ipv4Addr::new(10, 0, 0, 7), 23, true);
        assert_eq!(b.as_str(), "M,10.0.0.7,23,1");
    }

    #[test]
    fn longest_beacon_fits() {
        let name = "N".repeat(32);
        let b = beacon(&name, Ipv4Addr::new(255, 255, 255, 255), 65535, true);
        assert_eq!(b.len(), 32 + 1 + 15 + 1 + 5 + 1 + 1);
    }

    #[test]
    fn disconnect_after_threshold_exceeded() {
        let mut h = StaHealth::new();
        for _ in 0..MAX_STA_FAILURES {
            assert_eq!(h.observe(StaStatus::NoApFound), HealthAction::Retry);
        }
        assert_eq!(h.failures(), MAX_STA_FAILURES);
        assert_eq!(
            h.observe(StaStatus::WrongPassword),
            HealthAction::ForceDisconnect
        );
        assert_eq!(h.failures(), 0);
    }

    #[test]
    fn other_states_reset_the_count() {
        let mut h = StaHealth::new();
        h.observe(StaStatus::ConnectFailed);
        h.observe(StaStatus::ConnectFailed);
        assert_eq!(h.observe(StaStatus::Connecting), HealthAction::Retry);
        assert_eq!(h.failures(), 0);
        h.observe(StaStatus::ConnectFailed);
        assert_eq!(h.observe(StaStatus::GotIp), HealthAction::Connected);
        assert_eq!(h.failures(), 0);
    }
}
