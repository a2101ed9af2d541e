//! Shared, short-lived access to the radio driver.
//!
//! The multiplexer, every transport facade and the console byte stream hold
//! a clone of the same [`LinkIo`]. Each operation borrows the driver for a
//! single command exchange and releases it before returning, so a data
//! callback invoked from `poll()` can send replies without re-entering a
//! borrow. An overlapping borrow is reported as [`LinkError::Busy`].

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use log::{debug, warn};

use crate::drivers::radio::{ClientList, LinkId, RadioDriver, RxFrame, MAX_FRAME, RECV_TIMEOUT_MS};
use crate::endpoint::Endpoint;
use crate::error::LinkError;

pub struct LinkIo<R> {
    radio: Rc<RefCell<R>>,
    /// Cleared while a raw stream owns inbound data.
    rx_enabled: Rc<Cell<bool>>,
}

impl<R> Clone for LinkIo<R> {
    fn clone(&self) -> Self {
        Self {
            radio: Rc::clone(&self.radio),
            rx_enabled: Rc::clone(&self.rx_enabled),
        }
    }
}

impl<R: RadioDriver> LinkIo<R> {
    pub fn new(radio: R) -> Self {
        Self {
            radio: Rc::new(RefCell::new(radio)),
            rx_enabled: Rc::new(Cell::new(true)),
        }
    }

    /// Gate the multiplexer's receive pass.
    pub fn set_rx_enabled(&self, enabled: bool) {
        self.rx_enabled.set(enabled);
    }

    pub fn rx_enabled(&self) -> bool {
        self.rx_enabled.get()
    }

    /// Run one driver exchange.
    pub fn with_radio<T>(&self, f: impl FnOnce(&mut R) -> T) -> Result<T, LinkError> {
        let mut radio = self.radio.try_borrow_mut().map_err(|_| LinkError::Busy)?;
        Ok(f(&mut radio))
    }

    /// Send `data` on `link`, split into driver-sized frames.
    ///
    /// A frame accepted only partially means the peer went away; the rest
    /// of the payload is abandoned.
    pub fn send(&self, link: LinkId, peer: Option<Endpoint>, data: &[u8]) -> Result<usize, LinkError> {
        let mut sent = 0;
        for chunk in data.chunks(MAX_FRAME) {
            let n = self.with_radio(|r| r.send(link, peer, chunk))??;
            sent += n;
            if n != chunk.len() {
                warn!(
                    "link {}: short send ({} of {} bytes), treating as closed",
                    link,
                    sent,
                    data.len()
                );
                return Err(LinkError::Closed { sent });
            }
        }
        Ok(sent)
    }

    /// Receive one frame into `buf`.
    pub fn recv(&self, buf: &mut [u8]) -> Result<Option<RxFrame>, LinkError> {
        self.with_radio(|r| r.recv(buf, RECV_TIMEOUT_MS))?.map_err(Into::into)
    }

    pub fn has_data(&self) -> bool {
        self.with_radio(|r| r.has_data()).unwrap_or(false)
    }

    pub fn list_clients(&self, link: LinkId) -> Result<ClientList, LinkError> {
        self.with_radio(|r| r.list_clients(link))?.map_err(Into::into)
    }

    /// Disconnect the client on `link` whose address and port match `peer`.
    ///
    /// The co-processor can only disconnect by client record, so the record
    /// is looked up first. Returns `Ok(false)` when no client matches.
    pub fn close_client(&self, link: LinkId, peer: Endpoint) -> Result<bool, LinkError> {
        let clients = self.list_clients(link)?;
        let Some(client) = clients.iter().find(|c| c.peer == peer) else {
            debug!("link {}: close {} but no such client", link, peer);
            return Ok(false);
        };
        self.with_radio(|r| r.disconnect_client(link, client))??;
        Ok(true)
    }
}
