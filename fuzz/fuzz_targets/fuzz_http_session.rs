//! Fuzz target: `HttpSessions::on_data`
//!
//! Splits arbitrary bytes into segments from two peers and feeds them
//! through the request-line and header parsers. Asserts no panics and
//! that the session table never outgrows its capacity.
//!
//! cargo fuzz run fuzz_http_session

#![no_main]

use std::cell::Cell;

use libfuzzer_sys::fuzz_target;
use wifilink::endpoint::Endpoint;
use wifilink::http::{HelloWorld, HttpSessions, SimpleHandler, MAX_HTTP_CONNECTIONS};
use wifilink::server::PeerChannel;

struct Sink(Cell<usize>);

impl PeerChannel for Sink {
    fn send_data(&self, _peer: Endpoint, data: &[u8]) -> bool {
        self.0.set(self.0.get() + data.len());
        true
    }

    fn close_connection(&self, _peer: Endpoint) -> bool {
        true
    }
}

fuzz_target!(|data: &[u8]| {
    let mut sessions = HttpSessions::new();
    sessions.register_handler(Box::new(SimpleHandler::new(HelloWorld)));
    let out = Sink(Cell::new(0));

    // First byte of each segment picks the peer and the segment length.
    let mut rest = data;
    while let Some((&ctl, tail)) = rest.split_first() {
        let len = usize::from(ctl >> 1).min(tail.len());
        let peer = Endpoint::new([10, 0, 0, 1 + (ctl & 1)], 40_000);
        sessions.on_data(peer, &tail[..len], &out);
        rest = &tail[len..];
    }

    assert!(sessions.active() <= MAX_HTTP_CONNECTIONS);
});
