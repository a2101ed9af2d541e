//! Response serialization.

use std::collections::BTreeMap;

pub const HTTP_VERSION: &str = "HTTP/1.1";

/// Reason phrase for the status codes this server emits.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        400 => "Bad Request",
        404 => "Not Found",
        413 => "Payload Too Large",
        500 => "Internal Server Error",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub version: String,
    pub status: u16,
    pub reason: String,
    /// Sorted, so serialization is deterministic.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn new(status: u16) -> Self {
        Self {
            version: HTTP_VERSION.to_string(),
            status,
            reason: reason_phrase(status).to_string(),
            headers: BTreeMap::new(),
            body: Vec::new(),
        }
    }

    /// Plain-text response that closes the connection.
    pub fn text(status: u16, body: &str) -> Self {
        Self::new(status)
            .header("Content-Type", "text/plain")
            .header("Content-Length", &body.len().to_string())
            .header("Connection", "close")
            .with_body(body.as_bytes())
    }

    /// Canned error page, e.g. `404 Not Found`.
    pub fn error(status: u16) -> Self {
        Self::text(status, &format!("{} {}", status, reason_phrase(status)))
    }

    pub fn header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: &[u8]) -> Self {
        self.body = body.to_vec();
        self
    }

    /// `VERSION SP STATUS SP REASON CRLF (key: value CRLF)* CRLF body`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut head = format!("{} {} {}\r\n", self.version, self.status, self.reason);
        for (k, v) in &self.headers {
            head.push_str(k);
            head.push_str(": ");
            head.push_str(v);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        let mut out = head.into_bytes();
        out.extend_from_slice(&self.body);
        out
    }
}
