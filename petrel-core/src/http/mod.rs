//! HTTP/1.1 server implementation built directly on TCP.
//!
//! This module owns the full transport layer: accepting connections, parsing
//! the request line, headers, and Content-Length body, and serializing
//! responses back onto the wire. It deliberately handles exactly one request
//! per connection and closes after responding - no keep-alive, no pipelining,
//! no chunked transfer encoding.
//!
//! # Architecture
//!
//! - [`server`] - TCP accept loop and per-connection task lifecycle
//! - [`transport`] - head/body parsing and the receive/send connection contract
//! - [`request`] - the immutable per-request value handed to handlers
//! - [`router`] - ordered route table with `{name}` template captures

pub mod request;
pub mod router;
pub mod server;
pub mod transport;

pub use request::HttpRequest;
pub use router::{RouteEntry, RouteTable, Router};
pub use server::HttpServer;
pub use transport::{
    reason_phrase, Application, Connection, ReceiveEvent, RequestHead, SendEvent,
};

use thiserror::Error;

/// Result type for transport-level operations.
pub type HttpResult<T> = std::result::Result<T, HttpError>;

/// Transport-level errors.
///
/// These never reach dispatch: the connection handler either answers them
/// with a fixed plaintext response or closes the socket silently.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The peer went away before a full request head or body arrived.
    #[error("connection closed before a complete request arrived")]
    Disconnected,
    /// The header section exceeded the configured size cap.
    #[error("request head exceeds {0} bytes")]
    HeadTooLarge(usize),
    /// The request line is empty.
    #[error("empty request line")]
    EmptyRequestLine,
    /// The request line does not have method, target, and version tokens.
    #[error("invalid request line: {0}")]
    InvalidRequestLine(String),
    /// Content-Length is present but not a non-negative integer.
    #[error("invalid Content-Length: {0}")]
    InvalidContentLength(String),
    /// A response-start message was sent twice on one connection.
    #[error("response already started")]
    ResponseAlreadyStarted,
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// HTTP/1.1 protocol constants.
pub mod constants {
    /// HTTP line ending.
    pub const CRLF: &str = "\r\n";

    /// Common header names, lowercase as stored on parsed requests.
    pub mod headers {
        pub const CONTENT_TYPE: &str = "content-type";
        pub const CONTENT_LENGTH: &str = "content-length";
        pub const CONNECTION: &str = "connection";
        pub const COOKIE: &str = "cookie";
        pub const AUTHORIZATION: &str = "authorization";
    }

    /// Content types emitted by the server.
    pub mod content_types {
        pub const JSON: &str = "application/json; charset=utf-8";
        pub const TEXT: &str = "text/plain; charset=utf-8";
    }
}
