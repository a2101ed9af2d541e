//! Web server on a radio link: request in through `poll`, response out
//! through the simulated co-processor.

use std::rc::Rc;

use wifilink::adapters::line_queue::LineQueue;
use wifilink::adapters::machine::StandaloneMachine;
use wifilink::config::WifiConfig;
use wifilink::drivers::radio::LinkId;
use wifilink::drivers::sim::SimRadio;
use wifilink::endpoint::Endpoint;
use wifilink::http::{
    HelloWorld, SimpleHandler, WebServer, MAX_HTTP_CONNECTIONS, SESSION_IDLE_TIMEOUT_S,
};
use wifilink::link::LinkMux;

const BROWSER: Endpoint = Endpoint::new([192, 168, 4, 20], 51_000);
const SECOND: Endpoint = Endpoint::new([192, 168, 4, 21], 51_001);

struct Bench {
    mux: LinkMux<SimRadio>,
    web: Rc<WebServer<SimRadio>>,
    link: LinkId,
}

impl Bench {
    fn new() -> Self {
        let mut mux = LinkMux::new(SimRadio::new(), WifiConfig::default());
        mux.initialize().unwrap();
        let web = WebServer::new(&mut mux, 80, 4);
        web.register_handler(SimpleHandler::new(HelloWorld));
        let link = web.server().link().unwrap();
        mux.io()
            .with_radio(|r| {
                r.connect_client(link, BROWSER);
                r.connect_client(link, SECOND);
            })
            .unwrap();
        Self { mux, web, link }
    }

    /// Deliver `chunks` from `peer`, one poll per chunk.
    fn request(&mut self, peer: Endpoint, chunks: &[&[u8]]) {
        let mut machine = StandaloneMachine::new();
        let mut lines = LineQueue::new();
        for chunk in chunks {
            self.mux
                .io()
                .with_radio(|r| r.push_inbound(self.link, peer, chunk))
                .unwrap();
            self.mux.on_data_ready_interrupt();
            self.mux.poll(&mut machine, &mut lines);
        }
    }

    fn response(&self, peer: Endpoint) -> String {
        let raw = self
            .mux
            .io()
            .with_radio(|r| r.sent_to(self.link, peer))
            .unwrap();
        String::from_utf8(raw).unwrap()
    }

    fn closed(&self, peer: Endpoint) -> bool {
        self.mux
            .io()
            .with_radio(|r| r.disconnected.iter().any(|(l, c)| *l == self.link && c.peer == peer))
            .unwrap()
    }
}

#[test]
fn hello_get_in_one_segment() {
    let mut b = Bench::new();
    assert!(b.web.is_enabled());
    b.request(BROWSER, &[b"GET /hello HTTP/1.1\r\nHost: cnc\r\n\r\n"]);

    let resp = b.response(BROWSER);
    assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"), "{resp}");
    assert!(resp.ends_with("Hello world!"));
    assert!(b.closed(BROWSER));
}

#[test]
fn post_body_split_across_segments() {
    let mut b = Bench::new();
    b.request(
        BROWSER,
        &[
            b"POST /hel",
            b"lo HTTP/1.1\r\nContent-Le",
            b"ngth: 3\r\n\r\nF",
            b"oo",
        ],
    );
    let resp = b.response(BROWSER);
    assert!(resp.starts_with("HTTP/1.1 200"));
    assert!(resp.ends_with("Hello Foo!"));
}

#[test]
fn interleaved_peers_keep_separate_state() {
    let mut b = Bench::new();
    b.request(BROWSER, &[b"POST /hello HTTP/1.1\r\nContent-Length: 5\r\n\r\nAl"]);
    b.request(SECOND, &[b"GET /hello HTTP/1.1\r\n\r\n"]);
    b.request(BROWSER, &[b"ice"]);

    assert!(b.response(SECOND).ends_with("Hello world!"));
    assert!(b.response(BROWSER).ends_with("Hello Alice!"));
}

#[test]
fn unknown_path_is_404() {
    let mut b = Bench::new();
    b.request(BROWSER, &[b"GET /missing HTTP/1.1\r\n\r\n"]);
    assert!(b.response(BROWSER).starts_with("HTTP/1.1 404"));
    assert!(b.closed(BROWSER));
}

#[test]
fn malformed_request_line_is_400() {
    let mut b = Bench::new();
    b.request(BROWSER, &[b"BADLINE\r\n\r\n"]);
    assert!(b.response(BROWSER).starts_with("HTTP/1.1 400"));
    assert!(b.closed(BROWSER));
}

#[test]
fn invalid_content_length_is_400() {
    let mut b = Bench::new();
    b.request(BROWSER, &[b"POST /hello HTTP/1.1\r\nContent-Length: abc\r\n\r\n"]);
    let resp = b.response(BROWSER);
    assert!(resp.starts_with("HTTP/1.1 400"), "{resp}");
    assert!(!resp.contains("Hello"));
}

#[test]
fn peer_can_send_a_new_request_after_close() {
    let mut b = Bench::new();
    b.request(BROWSER, &[b"GET /hello HTTP/1.1\r\n\r\n"]);
    b.request(BROWSER, &[b"POST /hello HTTP/1.1\r\nContent-Length: 3\r\n\r\nBob"]);
    let resp = b.response(BROWSER);
    assert_eq!(resp.matches("HTTP/1.1 200").count(), 2);
    assert!(resp.ends_with("Hello Bob!"));
}

#[test]
fn abandoned_requests_do_not_lock_out_new_clients() {
    let mut b = Bench::new();
    for port in 0..MAX_HTTP_CONNECTIONS as u16 {
        b.request(Endpoint::new([192, 168, 4, 30], 52_000 + port), &[b"GET"]);
    }
    assert_eq!(b.web.active_sessions(), MAX_HTTP_CONNECTIONS);

    for _ in 0..SESSION_IDLE_TIMEOUT_S {
        b.web.on_second_tick();
    }
    assert_eq!(b.web.active_sessions(), 0);

    b.request(BROWSER, &[b"GET /hello HTTP/1.1\r\n\r\n"]);
    assert!(b.response(BROWSER).starts_with("HTTP/1.1 200 OK\r\n"));
}

#[test]
fn full_table_still_serves_a_new_client() {
    let mut b = Bench::new();
    for port in 0..MAX_HTTP_CONNECTIONS as u16 {
        b.request(Endpoint::new([192, 168, 4, 30], 52_000 + port), &[b"POST /hel"]);
    }
    b.request(SECOND, &[b"GET /hello HTTP/1.1\r\n\r\n"]);
    let resp = b.response(SECOND);
    assert!(resp.starts_with("HTTP/1.1 200 OK\r\n"), "{resp}");
    assert!(resp.ends_with("Hello world!"));
}
