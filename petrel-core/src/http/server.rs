//! TCP accept loop and per-connection lifecycle.
//!
//! One tokio task per connection; each task parses a single request, hands
//! it to the application, and closes. Transport-level malformed input is
//! answered with fixed plaintext responses and never reaches dispatch;
//! application failures or panics are contained at the connection boundary
//! with a plaintext 500 when nothing has been written yet.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tokio::io::{BufReader, BufWriter};
use tokio::net::{TcpListener, TcpStream};

use crate::config::ServerConfig;

use super::transport::{self, Application, Connection};
use super::HttpError;

/// The HTTP server: a listener plus the application it dispatches into.
pub struct HttpServer<A: Application> {
    config: ServerConfig,
    app: Arc<A>,
}

impl<A: Application> HttpServer<A> {
    pub fn new(config: ServerConfig, app: Arc<A>) -> Self {
        Self { config, app }
    }

    /// Bind the configured address and serve forever.
    pub async fn serve(self) -> anyhow::Result<()> {
        let listener = TcpListener::bind(self.config.bind_addr()).await?;
        log::info!("listening on {}", listener.local_addr()?);
        self.serve_listener(listener).await
    }

    /// Serve connections from an already bound listener.
    pub async fn serve_listener(self, listener: TcpListener) -> anyhow::Result<()> {
        loop {
            let (stream, peer) = match listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    log::error!("failed to accept connection: {}", err);
                    continue;
                }
            };

            let app = Arc::clone(&self.app);
            let max_head_bytes = self.config.max_head_bytes;
            tokio::spawn(async move {
                handle_connection(app, stream, peer, max_head_bytes).await;
            });
        }
    }
}

/// Terminate one connection into one request/response exchange.
async fn handle_connection<A: Application>(
    app: Arc<A>,
    stream: TcpStream,
    peer: std::net::SocketAddr,
    max_head_bytes: usize,
) {
    let (read_half, write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);
    let mut writer = BufWriter::new(write_half);

    let mut head = match transport::read_head(&mut reader, max_head_bytes).await {
        Ok(head) => head,
        Err(HttpError::EmptyRequestLine) => {
            let _ = transport::send_simple_response(
                &mut writer,
                400,
                b"Bad Request: empty request line",
            )
            .await;
            return;
        }
        Err(HttpError::InvalidRequestLine(_)) => {
            let _ = transport::send_simple_response(
                &mut writer,
                400,
                b"Bad Request: invalid request line",
            )
            .await;
            return;
        }
        // Peer went away or flooded the head section: nothing to answer.
        Err(_) => return,
    };
    head.client = Some(peer);

    let body = match transport::read_body(&mut reader, &head).await {
        Ok(body) => body,
        Err(HttpError::InvalidContentLength(_)) => {
            let _ = transport::send_simple_response(
                &mut writer,
                400,
                b"Bad Request: invalid Content-Length",
            )
            .await;
            return;
        }
        Err(_) => return,
    };

    let mut conn = Connection::new(writer, body);
    match AssertUnwindSafe(app.call(head, &mut conn)).catch_unwind().await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => {
            log::error!("connection handler failed: {:#}", err);
            let _ = conn.abort(500, b"Internal Server Error").await;
        }
        Err(_) => {
            log::error!("connection handler panicked");
            let _ = conn.abort(500, b"Internal Server Error").await;
        }
    }
}
