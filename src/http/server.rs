//! Request-line parsing, handler selection and the web server binding.

use std::cell::RefCell;
use std::rc::{Rc, Weak};

use heapless::FnvIndexMap;
use log::{debug, info, warn};

use super::handler::{send_response, RequestHandler};
use super::request::{find, parse_request_line, RequestLine};
use super::response::HttpResponse;
use super::{MAX_HTTP_CONNECTIONS, SESSION_IDLE_TIMEOUT_S};
use crate::drivers::radio::RadioDriver;
use crate::endpoint::Endpoint;
use crate::link::LinkMux;
use crate::server::{PeerChannel, TcpServer};

/// Longest request line buffered while waiting for its CRLF.
pub const MAX_REQUEST_LINE: usize = 2048;

enum Session {
    /// Buffering until the request line is complete.
    AwaitingLine(Vec<u8>),
    /// Handler chosen; chunks go straight to it.
    Bound {
        handler: usize,
        request: RequestLine,
    },
}

struct Entry {
    session: Session,
    /// Whole ticks since the peer last sent anything.
    idle_s: u16,
}

impl Entry {
    fn new() -> Self {
        Self {
            session: Session::AwaitingLine(Vec::new()),
            idle_s: 0,
        }
    }
}

/// Outer per-peer state machine: parses the request line, picks the first
/// matching handler and forwards the rest of the connection to it.
pub struct HttpSessions {
    handlers: Vec<Box<dyn RequestHandler>>,
    sessions: FnvIndexMap<Endpoint, Entry, MAX_HTTP_CONNECTIONS>,
    idle_timeout_s: u16,
}

impl Default for HttpSessions {
    fn default() -> Self {
        Self {
            handlers: Vec::new(),
            sessions: FnvIndexMap::new(),
            idle_timeout_s: SESSION_IDLE_TIMEOUT_S,
        }
    }
}

impl HttpSessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_idle_timeout(idle_timeout_s: u16) -> Self {
        Self {
            idle_timeout_s: idle_timeout_s.max(1),
            ..Self::default()
        }
    }

    /// Handlers are tried in registration order.
    pub fn register_handler(&mut self, handler: Box<dyn RequestHandler>) {
        self.handlers.push(handler);
    }

    pub fn handler_count(&self) -> usize {
        self.handlers.len()
    }

    /// Peers with an open session.
    pub fn active(&self) -> usize {
        self.sessions.len()
    }

    /// Whether `peer` has been bound to a handler.
    pub fn is_bound(&self, peer: &Endpoint) -> bool {
        matches!(
            self.sessions.get(peer),
            Some(Entry {
                session: Session::Bound { .. },
                ..
            })
        )
    }

    fn close(&mut self, peer: Endpoint, out: &dyn PeerChannel) {
        self.sessions.remove(&peer);
        if !out.close_connection(peer) {
            debug!("http: {} already gone", peer);
        }
    }

    fn reject(&mut self, peer: Endpoint, out: &dyn PeerChannel, status: u16) {
        send_response(out, peer, &HttpResponse::error(status));
        self.close(peer, out);
    }

    /// Drop `peer` mid-request: its handler forgets it and the connection
    /// is closed.
    fn evict(&mut self, peer: Endpoint, out: &dyn PeerChannel) {
        if let Some(Entry {
            session: Session::Bound { handler, .. },
            ..
        }) = self.sessions.get(&peer)
            && let Some(h) = self.handlers.get_mut(*handler)
        {
            h.forget(peer);
        }
        self.close(peer, out);
    }

    /// 1 Hz housekeeping: age every session and evict the ones that have
    /// been silent for the idle timeout.
    pub fn on_tick(&mut self, out: &dyn PeerChannel) {
        let mut expired: heapless::Vec<Endpoint, MAX_HTTP_CONNECTIONS> = heapless::Vec::new();
        for (peer, entry) in self.sessions.iter_mut() {
            entry.idle_s = entry.idle_s.saturating_add(1);
            if entry.idle_s >= self.idle_timeout_s {
                let _ = expired.push(*peer);
            }
        }
        for peer in expired {
            info!("http: {} idle for {}s, closing", peer, self.idle_timeout_s);
            self.evict(peer, out);
        }
    }

    fn stalest(&self) -> Option<Endpoint> {
        self.sessions
            .iter()
            .max_by_key(|(_, entry)| entry.idle_s)
            .map(|(peer, _)| *peer)
    }

    /// Feed one inbound chunk from `peer`.
    pub fn on_data(&mut self, peer: Endpoint, data: &[u8], out: &dyn PeerChannel) {
        if let Some(entry) = self.sessions.get_mut(&peer) {
            entry.idle_s = 0;
        }
        if let Some(Entry {
            session: Session::Bound { handler, request },
            ..
        }) = self.sessions.get(&peer)
        {
            let keep = match self.handlers.get_mut(*handler) {
                Some(h) => h.handle_data(peer, request, data, out),
                None => false,
            };
            if !keep {
                self.close(peer, out);
            }
            return;
        }

        if !self.sessions.contains_key(&peer) {
            if self.sessions.len() == MAX_HTTP_CONNECTIONS
                && let Some(stale) = self.stalest()
            {
                warn!("http: session table full, evicting {} for {}", stale, peer);
                self.evict(stale, out);
            }
            if self.sessions.insert(peer, Entry::new()).is_err() {
                warn!("http: session table full, rejecting {}", peer);
                send_response(out, peer, &HttpResponse::error(503));
                if !out.close_connection(peer) {
                    debug!("http: {} already gone", peer);
                }
                return;
            }
        }
        let Some(Entry {
            session: Session::AwaitingLine(buf),
            ..
        }) = self.sessions.get_mut(&peer)
        else {
            return;
        };
        buf.extend_from_slice(data);

        let Some(end) = find(buf.as_slice(), b"\r\n") else {
            if buf.len() > MAX_REQUEST_LINE {
                warn!("http: {} request line exceeds {} bytes", peer, MAX_REQUEST_LINE);
                self.reject(peer, out, 400);
            }
            return;
        };
        let line = String::from_utf8_lossy(&buf[..end]).into_owned();
        let rest = buf.split_off(end + 2);

        let Some(request) = parse_request_line(&line) else {
            warn!("http: {} sent malformed request line {:?}", peer, line);
            self.reject(peer, out, 400);
            return;
        };
        let Some(index) = self
            .handlers
            .iter()
            .position(|h| h.can_handle(&request.method, &request.uri, &request.version))
        else {
            info!("http: no handler for {} {} from {}", request.method, request.uri, peer);
            self.reject(peer, out, 404);
            return;
        };

        debug!("http: {} {} from {} -> handler {}", request.method, request.uri, peer, index);
        let keep = rest.is_empty() || self.handlers[index].handle_data(peer, &request, &rest, out);
        if keep {
            if let Some(entry) = self.sessions.get_mut(&peer) {
                entry.session = Session::Bound {
                    handler: index,
                    request,
                };
            }
        } else {
            self.close(peer, out);
        }
    }
}

/// HTTP server on one [`TcpServer`] port.
///
/// The transport callback holds only a weak reference back to the server,
/// so dropping the returned `Rc` stops dispatch.
pub struct WebServer<R> {
    server: TcpServer<R>,
    sessions: RefCell<HttpSessions>,
}

impl<R: RadioDriver + 'static> WebServer<R> {
    pub fn new(mux: &mut LinkMux<R>, port: u16, max_clients: u8) -> Rc<Self> {
        Rc::new_cyclic(|weak: &Weak<Self>| {
            let weak = weak.clone();
            let server = TcpServer::new(mux, port, max_clients, move |peer, data| {
                if let Some(web) = weak.upgrade() {
                    web.on_data(peer, data);
                }
            });
            Self {
                server,
                sessions: RefCell::new(HttpSessions::new()),
            }
        })
    }

    pub fn register_handler(&self, handler: impl RequestHandler + 'static) {
        match self.sessions.try_borrow_mut() {
            Ok(mut s) => s.register_handler(Box::new(handler)),
            Err(_) => warn!("http: handler registered during dispatch, ignored"),
        }
    }

    pub fn server(&self) -> &TcpServer<R> {
        &self.server
    }

    pub fn is_enabled(&self) -> bool {
        self.server.is_enabled()
    }

    pub fn on_data(&self, peer: Endpoint, data: &[u8]) {
        match self.sessions.try_borrow_mut() {
            Ok(mut s) => s.on_data(peer, data, &self.server),
            Err(_) => warn!("http: reentrant data from {} dropped", peer),
        }
    }

    /// Age open sessions; call once a second from the main loop.
    pub fn on_second_tick(&self) {
        match self.sessions.try_borrow_mut() {
            Ok(mut s) => s.on_tick(&self.server),
            Err(_) => debug!("http: tick during dispatch skipped"),
        }
    }

    /// Peers with an open session.
    pub fn active_sessions(&self) -> usize {
        self.sessions.try_borrow().map_or(0, |s| s.active())
    }
}
