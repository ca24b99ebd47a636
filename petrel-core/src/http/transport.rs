//! Head/body parsing and the per-connection receive/send contract.
//!
//! The transport terminates one TCP connection into exactly one
//! request/response exchange. Parsing reads until the blank line that ends
//! the header section, then reads a body strictly by declared
//! Content-Length. The application side sees three things: a parsed
//! [`RequestHead`], a single-shot receive operation yielding the buffered
//! body then disconnect, and a send operation taking response-start and
//! response-body messages. Sending a final body message flushes and closes
//! the connection.

use std::net::SocketAddr;

use futures::future::BoxFuture;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::constants::headers;
use super::{HttpError, HttpResult};

/// Reason phrase for a status code, `"Unknown"` for anything unmapped.
pub fn reason_phrase(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        405 => "Method Not Allowed",
        413 => "Payload Too Large",
        422 => "Unprocessable Entity",
        429 => "Too Many Requests",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        503 => "Service Unavailable",
        _ => "Unknown",
    }
}

/// The read-only request description produced by head parsing.
#[derive(Debug, Clone)]
pub struct RequestHead {
    /// Method token exactly as received.
    pub method: String,
    /// Path component of the request target.
    pub path: String,
    /// Query string without the leading `?`, undecoded.
    pub raw_query: String,
    /// Protocol version token (e.g. `HTTP/1.1`).
    pub version: String,
    /// Header (name, value) pairs in arrival order, names lowercased.
    pub headers: Vec<(String, String)>,
    /// Remote peer address.
    pub client: Option<SocketAddr>,
}

impl RequestHead {
    /// Last value for a header name (last-write-wins), name matched
    /// case-insensitively against the stored lowercase keys.
    pub fn header(&self, name: &str) -> Option<&str> {
        let lower = name.to_ascii_lowercase();
        self.headers
            .iter()
            .rev()
            .find(|(k, _)| *k == lower)
            .map(|(_, v)| v.as_str())
    }
}

/// Read and parse the request line and headers.
///
/// Reads line by line until the blank line terminating the head section.
/// Header lines without a colon are ignored. Returns
/// [`HttpError::Disconnected`] if the peer closes before the terminator,
/// [`HttpError::HeadTooLarge`] past `max_bytes`.
pub async fn read_head<R>(reader: &mut R, max_bytes: usize) -> HttpResult<RequestHead>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines: Vec<String> = Vec::new();
    let mut total = 0usize;

    loop {
        let mut buf = Vec::new();
        let n = reader.read_until(b'\n', &mut buf).await?;
        if n == 0 {
            return Err(HttpError::Disconnected);
        }
        total += n;
        if total > max_bytes {
            return Err(HttpError::HeadTooLarge(max_bytes));
        }

        if buf.last() == Some(&b'\n') {
            buf.pop();
        }
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }

        let line = String::from_utf8_lossy(&buf).into_owned();
        if line.is_empty() {
            if lines.is_empty() {
                return Err(HttpError::EmptyRequestLine);
            }
            break;
        }
        lines.push(line);
    }

    let request_line = &lines[0];
    let mut tokens = request_line.splitn(3, ' ');
    let (method, target, version) = match (tokens.next(), tokens.next(), tokens.next()) {
        (Some(m), Some(t), Some(v)) if !m.is_empty() && !t.is_empty() && !v.is_empty() => {
            (m.to_string(), t, v.to_string())
        }
        _ => return Err(HttpError::InvalidRequestLine(request_line.clone())),
    };

    let mut target_parts = target.splitn(2, '?');
    let path = match target_parts.next() {
        Some("") | None => "/".to_string(),
        Some(p) => p.to_string(),
    };
    let raw_query = target_parts.next().unwrap_or("").to_string();

    let mut header_pairs = Vec::new();
    for line in &lines[1..] {
        let Some((name, value)) = line.split_once(':') else {
            continue;
        };
        header_pairs.push((name.trim().to_ascii_lowercase(), value.trim().to_string()));
    }

    Ok(RequestHead {
        method,
        path,
        raw_query,
        version,
        headers: header_pairs,
        client: None,
    })
}

/// Read the request body according to the head's Content-Length.
///
/// No Content-Length header means no body. A value that is not a
/// non-negative integer is [`HttpError::InvalidContentLength`]; a peer that
/// closes mid-body is [`HttpError::Disconnected`].
pub async fn read_body<R>(reader: &mut R, head: &RequestHead) -> HttpResult<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let Some(raw) = head.header(headers::CONTENT_LENGTH) else {
        return Ok(Vec::new());
    };

    let length = raw
        .trim()
        .parse::<i64>()
        .ok()
        .filter(|n| *n >= 0)
        .ok_or_else(|| HttpError::InvalidContentLength(raw.to_string()))?;

    if length == 0 {
        return Ok(Vec::new());
    }

    let mut body = vec![0u8; length as usize];
    reader
        .read_exact(&mut body)
        .await
        .map_err(|_| HttpError::Disconnected)?;
    Ok(body)
}

/// Message yielded by [`Connection::receive`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiveEvent {
    /// A chunk of request body. The transport buffers the whole body up
    /// front, so the first receive yields everything with `more: false`.
    Body { bytes: Vec<u8>, more: bool },
    /// The request stream is exhausted.
    Disconnect,
}

/// Message accepted by [`Connection::send`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendEvent {
    /// Status line plus response headers. Must be sent at most once.
    Start { status: u16, headers: Vec<(String, String)> },
    /// Response body bytes. `more: false` flushes and closes the connection.
    Body { bytes: Vec<u8>, more: bool },
}

/// One request/response exchange over a connection.
///
/// Owns the write half of the socket plus the already-buffered request body.
/// Sending body bytes before any start message implicitly sends a default
/// `200` start with no extra headers.
pub struct Connection<W> {
    writer: W,
    buffered_body: Option<Vec<u8>>,
    response_started: bool,
    response_ended: bool,
}

impl<W: AsyncWrite + Unpin> Connection<W> {
    pub fn new(writer: W, body: Vec<u8>) -> Self {
        Self {
            writer,
            buffered_body: Some(body),
            response_started: false,
            response_ended: false,
        }
    }

    /// Whether a response-start has already been written.
    pub fn response_started(&self) -> bool {
        self.response_started
    }

    /// Consume the connection and return the underlying writer. Intended
    /// for inspecting written bytes in tests.
    pub fn into_writer(self) -> W {
        self.writer
    }

    /// Whether the response has been finished and the socket closed.
    pub fn response_ended(&self) -> bool {
        self.response_ended
    }

    /// Yield the buffered request body on the first call, then disconnect
    /// signals forever after.
    pub async fn receive(&mut self) -> ReceiveEvent {
        match self.buffered_body.take() {
            Some(bytes) => ReceiveEvent::Body { bytes, more: false },
            None => ReceiveEvent::Disconnect,
        }
    }

    /// Write a response message. Events after the final body are ignored.
    pub async fn send(&mut self, event: SendEvent) -> HttpResult<()> {
        if self.response_ended {
            return Ok(());
        }

        match event {
            SendEvent::Start { status, headers } => {
                if self.response_started {
                    return Err(HttpError::ResponseAlreadyStarted);
                }
                self.write_start(status, &headers).await?;
            }
            SendEvent::Body { bytes, more } => {
                if !self.response_started {
                    self.write_start(200, &[]).await?;
                }
                if !bytes.is_empty() {
                    self.writer.write_all(&bytes).await?;
                }
                if !more {
                    self.writer.flush().await?;
                    self.writer.shutdown().await?;
                    self.response_ended = true;
                }
            }
        }
        Ok(())
    }

    /// Answer an internal failure: a plaintext response if nothing has been
    /// written yet, otherwise just close the partially written response.
    pub async fn abort(&mut self, status: u16, body: &[u8]) -> HttpResult<()> {
        if self.response_ended {
            return Ok(());
        }
        if !self.response_started {
            send_simple_response(&mut self.writer, status, body).await?;
        } else {
            let _ = self.writer.shutdown().await;
        }
        self.response_ended = true;
        Ok(())
    }

    async fn write_start(&mut self, status: u16, headers: &[(String, String)]) -> HttpResult<()> {
        let mut head = format!("HTTP/1.1 {} {}\r\n", status, reason_phrase(status));
        for (name, value) in headers {
            head.push_str(name);
            head.push_str(": ");
            head.push_str(value);
            head.push_str("\r\n");
        }
        head.push_str("\r\n");
        self.writer.write_all(head.as_bytes()).await?;
        self.response_started = true;
        Ok(())
    }
}

/// Write a fixed plaintext response and close the stream. Used for
/// transport-level errors that never reach dispatch.
pub async fn send_simple_response<W>(writer: &mut W, status: u16, body: &[u8]) -> HttpResult<()>
where
    W: AsyncWrite + Unpin,
{
    let head = format!(
        "HTTP/1.1 {} {}\r\nContent-Length: {}\r\nContent-Type: text/plain; charset=utf-8\r\nConnection: close\r\n\r\n",
        status,
        reason_phrase(status),
        body.len()
    );
    writer.write_all(head.as_bytes()).await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    writer.shutdown().await?;
    Ok(())
}

/// The contract the dispatch layer implements for the transport.
///
/// The transport hands over the parsed head and a [`Connection`]; the
/// application drains `receive` and emits `send` messages. An error return
/// (or panic) is caught at the connection boundary.
pub trait Application: Send + Sync + 'static {
    fn call<'a, W>(
        &'a self,
        head: RequestHead,
        conn: &'a mut Connection<W>,
    ) -> BoxFuture<'a, anyhow::Result<()>>
    where
        W: AsyncWrite + Unpin + Send;
}
