//! Built-in greeting endpoint, handy for checking the web server from a
//! browser.

use super::handler::{send_response, HeaderMap, RequestProcessor};
use super::response::HttpResponse;
use crate::endpoint::Endpoint;
use crate::server::PeerChannel;

pub const HELLO_PATH: &str = "/hello";

/// Answers `GET|POST /hello` with `Hello world!` or `Hello <body>!`.
#[derive(Debug, Default)]
pub struct HelloWorld;

impl HelloWorld {
    pub fn greeting(body: &[u8]) -> String {
        if body.is_empty() {
            "Hello world!".to_string()
        } else {
            format!("Hello {}!", String::from_utf8_lossy(body))
        }
    }
}

impl RequestProcessor for HelloWorld {
    fn can_handle(&self, method: &str, uri: &str, _version: &str) -> bool {
        matches!(method, "GET" | "POST") && uri == HELLO_PATH
    }

    fn process_request(
        &mut self,
        peer: Endpoint,
        _method: &str,
        _uri: &str,
        _headers: &HeaderMap,
        body: &[u8],
        out: &dyn PeerChannel,
    ) -> bool {
        send_response(out, peer, &HttpResponse::text(200, &Self::greeting(body)));
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_get_and_post_only() {
        let h = HelloWorld;
        assert!(h.can_handle("GET", "/hello", "HTTP/1.1"));
        assert!(h.can_handle("POST", "/hello", "HTTP/1.0"));
        assert!(!h.can_handle("PUT", "/hello", "HTTP/1.1"));
        assert!(!h.can_handle("GET", "/hello/x", "HTTP/1.1"));
    }

    #[test]
    fn greeting_text() {
        assert_eq!(HelloWorld::greeting(b""), "Hello world!");
        assert_eq!(HelloWorld::greeting(b"Foo"), "Hello Foo!");
    }
}
