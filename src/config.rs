//! Wireless link configuration.
//!
//! Values come from an optional JSON file on the card. Keys missing from
//! the file keep their defaults; a missing file means all defaults.

use std::io::Read;

use log::info;
use serde::{Deserialize, Serialize};

use crate::app::ports::{FileStore, StorageError};
use crate::error::Error;

/// Default location of the JSON override.
pub const CONFIG_PATH: &str = "/sd/config/wifi.json";

/// Maximum length of the advertised machine name.
pub const MACHINE_NAME_LEN: usize = 32;

/// Radio and server configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WifiConfig {
    /// Name advertised in the discovery beacon.
    pub machine_name: heapless::String<MACHINE_NAME_LEN>,

    // --- Console / discovery ---
    /// Console TCP server port.
    pub tcp_port: u16,
    /// Destination port of the discovery beacon.
    pub udp_send_port: u16,
    /// Local port of the discovery UDP link.
    pub udp_recv_port: u16,
    /// Idle timeout (seconds) before the co-processor drops a TCP client.
    pub tcp_timeout_s: u16,

    // --- Web server ---
    pub webserver_enable: bool,
    pub webserver_port: u16,
    /// Maximum concurrent HTTP clients configured on the server link.
    pub max_http_clients: u8,

    // --- Radio ---
    /// SPI clock used to talk to the co-processor.
    pub spi_clock_hz: u32,
    /// TX power level in 0.25 dBm steps.
    pub tx_max_power: u8,

    // --- Console behaviour ---
    /// Honour `!` / `~` feed-hold characters on the console link.
    pub feed_hold_enabled: bool,
}

impl Default for WifiConfig {
    fn default() -> Self {
        let mut machine_name = heapless::String::new();
        let _ = machine_name.push_str("CARVERA");
        Self {
            machine_name,

            // Console / discovery
            tcp_port: 2222,
            udp_send_port: 3333,
            udp_recv_port: 4444,
            tcp_timeout_s: 10,

            // Web server
            webserver_enable: true,
            webserver_port: 80,
            max_http_clients: 15,

            // Radio
            spi_clock_hz: 24_000_000,
            tx_max_power: 68, // 17 dBm

            feed_hold_enabled: false,
        }
    }
}

impl WifiConfig {
    /// Parse a JSON document and validate the result.
    pub fn from_json(text: &str) -> Result<Self, Error> {
        let config: Self =
            serde_json::from_str(text).map_err(|_| Error::Config("malformed config file"))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` from `files`, or the defaults if it does not exist.
    pub fn load<F: FileStore>(files: &F, path: &str) -> Result<Self, Error> {
        let mut reader = match files.open(path) {
            Ok(r) => r,
            Err(StorageError::NotFound) => {
                info!("config: {} not found, using defaults", path);
                return Ok(Self::default());
            }
            Err(e) => return Err(e.into()),
        };
        let mut text = String::new();
        reader
            .read_to_string(&mut text)
            .map_err(StorageError::from)?;
        let config = Self::from_json(&text)?;
        info!("config: loaded {}", path);
        Ok(config)
    }

    /// Reject values that would break the beacon format or collide ports.
    pub fn validate(&self) -> Result<(), Error> {
        if self.machine_name.is_empty() {
            return Err(Error::Config("machine_name must not be empty"));
        }
        if self.machine_name.contains(',') {
            return Err(Error::Config("machine_name must not contain ','"));
        }
        if self.tcp_port == 0 || self.udp_send_port == 0 || self.udp_recv_port == 0 {
            return Err(Error::Config("ports must be non-zero"));
        }
        if self.webserver_enable {
            if self.webserver_port == 0 {
                return Err(Error::Config("webserver_port must be non-zero"));
            }
            if self.webserver_port == self.tcp_port {
                return Err(Error::Config("webserver_port collides with tcp_port"));
            }
        }
        if self.max_http_clients == 0 {
            return Err(Error::Config("max_http_clients must be at least 1"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::mem_fs::MemFileStore;

    #[test]
    fn default_config_is_valid() {
        let c = WifiConfig::default();
        assert!(c.validate().is_ok());
        assert_eq!(c.machine_name.as_str(), "CARVERA");
        assert_eq!(c.tcp_port, 2222);
        assert_eq!(c.udp_send_port, 3333);
        assert_eq!(c.udp_recv_port, 4444);
    }

    #[test]
    fn comma_in_name_is_rejected() {
        let mut c = WifiConfig::default();
        c.machine_name.clear();
        c.machine_name.push_str("a,b").unwrap();
        assert_eq!(
            c.validate(),
            Err(Error::Config("machine_name must not contain ','"))
        );
    }

    #[test]
    fn port_collision_is_rejected() {
        let c = WifiConfig {
            webserver_port: 2222,
            ..WifiConfig::default()
        };
        assert!(c.validate().is_err());

        let disabled = WifiConfig {
            webserver_enable: false,
            ..c
        };
        assert!(disabled.validate().is_ok());
    }

    #[test]
    fn serde_roundtrip() {
        let c = WifiConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: WifiConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c, c2);
    }

    #[test]
    fn partial_json_keeps_defaults() {
        let c = WifiConfig::from_json(r#"{"machine_name":"LATHE","tcp_port":2323}"#).unwrap();
        assert_eq!(c.machine_name.as_str(), "LATHE");
        assert_eq!(c.tcp_port, 2323);
        assert_eq!(c.webserver_port, 80);
    }

    #[test]
    fn invalid_json_values_are_rejected() {
        assert_eq!(
            WifiConfig::from_json("{not json"),
            Err(Error::Config("malformed config file"))
        );
        assert_eq!(
            WifiConfig::from_json(r#"{"webserver_port":2222}"#),
            Err(Error::Config("webserver_port collides with tcp_port"))
        );
    }

    #[test]
    fn load_falls_back_to_defaults() {
        let fs = MemFileStore::new();
        assert_eq!(WifiConfig::load(&fs, CONFIG_PATH), Ok(WifiConfig::default()));

        fs.insert(CONFIG_PATH, br#"{"feed_hold_enabled":true}"#);
        let c = WifiConfig::load(&fs, CONFIG_PATH).unwrap();
        assert!(c.feed_hold_enabled);
    }
}
