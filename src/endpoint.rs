//! Remote peer identity: IPv4 address plus port.

use core::fmt;
use core::net::{Ipv4Addr, SocketAddrV4};

/// A remote peer as reported by the radio co-processor.
///
/// Ordering is lexicographic on the address octets, then the port, so
/// endpoints can key ordered and hashed tables alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Endpoint {
    pub address: [u8; 4],
    pub port: u16,
}

impl Endpoint {
    pub const fn new(address: [u8; 4], port: u16) -> Self {
        Self { address, port }
    }

    pub const fn ip(&self) -> Ipv4Addr {
        let [a, b, c, d] = self.address;
        Ipv4Addr::new(a, b, c, d)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d] = self.address;
        write!(f, "{a}.{b}.{c}.{d}:{}", self.port)
    }
}

impl From<SocketAddrV4> for Endpoint {
    fn from(addr: SocketAddrV4) -> Self {
        Self::new(addr.ip().octets(), addr.port())
    }
}

impl From<Endpoint> for SocketAddrV4 {
    fn from(ep: Endpoint) -> Self {
        SocketAddrV4::new(ep.ip(), ep.port)
    }
}
