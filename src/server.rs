//! Transport facade: one local TCP port bound to one radio link.

use log::{debug, info, warn};

use crate::drivers::radio::{LinkId, LinkKind, RadioDriver};
use crate::endpoint::Endpoint;
use crate::link::io::LinkIo;
use crate::link::LinkMux;

/// Endpoint-addressed output, the only transport surface protocol
/// layers see.
pub trait PeerChannel {
    /// Send `data` to `peer`. `false` if the facade is disabled or the
    /// send failed.
    fn send_data(&self, peer: Endpoint, data: &[u8]) -> bool;

    /// Disconnect `peer`. `false` if it is not connected.
    fn close_connection(&self, peer: Endpoint) -> bool;
}

pub struct TcpServer<R> {
    io: LinkIo<R>,
    link: Option<LinkId>,
    port: u16,
}

impl<R: RadioDriver> TcpServer<R> {
    /// Allocate a server link on `port` and route its data to `on_data`.
    ///
    /// If no link can be opened the server is created disabled and every
    /// operation returns `false`.
    pub fn new(
        mux: &mut LinkMux<R>,
        port: u16,
        max_clients: u8,
        on_data: impl FnMut(Endpoint, &[u8]) + 'static,
    ) -> Self {
        let link = match mux.allocate_link(LinkKind::TcpServer, port, Some(max_clients)) {
            Ok(id) => match mux.register_callback(id, on_data) {
                Ok(()) => {
                    info!("tcp server: port {} on link {}", port, id);
                    Some(id)
                }
                Err(e) => {
                    warn!("tcp server: port {} callback not registered: {}", port, e);
                    None
                }
            },
            Err(e) => {
                warn!("tcp server: port {} disabled: {}", port, e);
                None
            }
        };
        Self {
            io: mux.io(),
            link,
            port,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.link.is_some()
    }

    pub fn link(&self) -> Option<LinkId> {
        self.link
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn send(&self, peer: Endpoint, data: &[u8]) -> bool {
        let Some(link) = self.link else {
            return false;
        };
        match self.io.send(link, Some(peer), data) {
            Ok(_) => true,
            Err(e) => {
                warn!("tcp server {}: send to {} failed: {}", self.port, peer, e);
                false
            }
        }
    }

    pub fn close(&self, peer: Endpoint) -> bool {
        let Some(link) = self.link else {
            return false;
        };
        match self.io.close_client(link, peer) {
            Ok(closed) => closed,
            Err(e) => {
                debug!("tcp server {}: close {} failed: {}", self.port, peer, e);
                false
            }
        }
    }
}

impl<R: RadioDriver> PeerChannel for TcpServer<R> {
    fn send_data(&self, peer: Endpoint, data: &[u8]) -> bool {
        self.send(peer, data)
    }

    fn close_connection(&self, peer: Endpoint) -> bool {
        self.close(peer)
    }
}
