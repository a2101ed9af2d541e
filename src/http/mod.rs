//! Minimal HTTP/1.1 server over a [`TcpServer`](crate::server::TcpServer).
//!
//! Parsing is two-level and strictly sequential per peer:
//!
//! ```text
//!   chunk ─▶ HttpSessions (request line, handler selection)
//!              │  first can_handle() match wins
//!              ▼
//!            RequestHandler::handle_data ─▶ SimpleHandler (headers, body)
//!                                              │
//!                                              ▼
//!                                  RequestProcessor::process_request
//! ```
//!
//! Every state table is fixed-capacity and keyed by [`Endpoint`](crate::endpoint::Endpoint).
//! The transport never reports a peer going away, so sessions age on the
//! 1 Hz tick and are dropped once idle for [`SESSION_IDLE_TIMEOUT_S`]; a
//! full table makes room by evicting its stalest entry.

pub mod handler;
pub mod hello;
pub mod request;
pub mod response;
pub mod server;

/// Concurrent connections tracked per parsing layer.
pub const MAX_HTTP_CONNECTIONS: usize = 16;

/// Seconds without data after which a session is closed and forgotten.
pub const SESSION_IDLE_TIMEOUT_S: u16 = 30;

/// Largest request body accepted.
pub const MAX_BODY_SIZE: usize = 64 * 1024;

pub use handler::{HeaderMap, RequestHandler, RequestProcessor, SimpleHandler};
pub use hello::HelloWorld;
pub use request::RequestLine;
pub use response::HttpResponse;
pub use server::{HttpSessions, WebServer};
