//! Handler traits and the reusable header/body parser.

use std::collections::BTreeMap;

use heapless::FnvIndexMap;
use log::{debug, warn};

use super::request::{find, parse_content_length, parse_headers, RequestLine};
use super::response::HttpResponse;
use super::{MAX_BODY_SIZE, MAX_HTTP_CONNECTIONS};
use crate::endpoint::Endpoint;
use crate::server::PeerChannel;

/// Lower-cased header name to value.
pub type HeaderMap = BTreeMap<String, String>;

/// A pluggable request handler bound per connection by
/// [`HttpSessions`](super::HttpSessions).
pub trait RequestHandler {
    fn can_handle(&self, method: &str, uri: &str, version: &str) -> bool;

    /// Consume bytes following the request line. Returns `true` to keep
    /// the connection open, `false` to have it closed.
    fn handle_data(
        &mut self,
        peer: Endpoint,
        request: &RequestLine,
        data: &[u8],
        out: &dyn PeerChannel,
    ) -> bool;

    /// Drop any partial state kept for `peer`. Called when its session is
    /// evicted without the handler having finished.
    fn forget(&mut self, _peer: Endpoint) {}
}

/// The single extension point of [`SimpleHandler`].
pub trait RequestProcessor {
    fn can_handle(&self, method: &str, uri: &str, version: &str) -> bool;

    /// Handle one complete request. Returns whether the connection stays
    /// open.
    fn process_request(
        &mut self,
        peer: Endpoint,
        method: &str,
        uri: &str,
        headers: &HeaderMap,
        body: &[u8],
        out: &dyn PeerChannel,
    ) -> bool;
}

/// Send `response` to `peer`, logging a failed send.
pub fn send_response(out: &dyn PeerChannel, peer: Endpoint, response: &HttpResponse) -> bool {
    let ok = out.send_data(peer, &response.to_bytes());
    if !ok {
        warn!("http: {} response to {} not sent", response.status, peer);
    }
    ok
}

#[derive(Default)]
struct BodyState {
    buf: Vec<u8>,
    headers_parsed: bool,
    content_length: usize,
    headers: HeaderMap,
}

/// Accumulates headers and a `Content-Length` body per peer, then hands
/// the complete request to its [`RequestProcessor`].
pub struct SimpleHandler<P> {
    processor: P,
    conns: FnvIndexMap<Endpoint, BodyState, MAX_HTTP_CONNECTIONS>,
}

impl<P: RequestProcessor> SimpleHandler<P> {
    pub fn new(processor: P) -> Self {
        Self {
            processor,
            conns: FnvIndexMap::new(),
        }
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    /// Peers with a partially received request.
    pub fn pending(&self) -> usize {
        self.conns.len()
    }

    fn reject(&mut self, peer: Endpoint, out: &dyn PeerChannel, status: u16) -> bool {
        send_response(out, peer, &HttpResponse::error(status));
        self.conns.remove(&peer);
        false
    }
}

impl<P: RequestProcessor> RequestHandler for SimpleHandler<P> {
    fn can_handle(&self, method: &str, uri: &str, version: &str) -> bool {
        self.processor.can_handle(method, uri, version)
    }

    fn forget(&mut self, peer: Endpoint) {
        if self.conns.remove(&peer).is_some() {
            debug!("http: dropped partial request from {}", peer);
        }
    }

    fn handle_data(
        &mut self,
        peer: Endpoint,
        request: &RequestLine,
        data: &[u8],
        out: &dyn PeerChannel,
    ) -> bool {
        if !self.conns.contains_key(&peer) && self.conns.insert(peer, BodyState::default()).is_err() {
            warn!("http: handler table full, rejecting {}", peer);
            send_response(out, peer, &HttpResponse::error(503));
            return false;
        }
        let Some(state) = self.conns.get_mut(&peer) else {
            return false;
        };
        state.buf.extend_from_slice(data);

        if !state.headers_parsed {
            let (block_len, consumed) = if state.buf.starts_with(b"\r\n") {
                (0, 2)
            } else {
                match find(&state.buf, b"\r\n\r\n") {
                    Some(end) => (end, end + 4),
                    None => return true,
                }
            };
            state.headers = parse_headers(&String::from_utf8_lossy(&state.buf[..block_len]));
            state.buf.drain(..consumed);
            state.headers_parsed = true;

            match parse_content_length(&state.headers) {
                Ok(len) if len > MAX_BODY_SIZE => {
                    warn!("http: {} declared {} byte body, limit {}", peer, len, MAX_BODY_SIZE);
                    return self.reject(peer, out, 413);
                }
                Ok(len) => state.content_length = len,
                Err(()) => {
                    warn!(
                        "http: {} sent invalid Content-Length {:?}",
                        peer,
                        state.headers.get("content-length")
                    );
                    return self.reject(peer, out, 400);
                }
            }
        }

        if state.buf.len() < state.content_length {
            return true;
        }

        let Some(mut state) = self.conns.remove(&peer) else {
            return false;
        };
        let extra = state.buf.len() - state.content_length;
        if extra > 0 {
            warn!("http: {} discarding {} pipelined bytes", peer, extra);
            state.buf.truncate(state.content_length);
        }
        debug!(
            "http: {} {} {} from {} ({} byte body)",
            request.method,
            request.uri,
            request.version,
            peer,
            state.buf.len()
        );
        self.processor.process_request(
            peer,
            &request.method,
            &request.uri,
            &state.headers,
            &state.buf,
            out,
        )
    }
}
