//! Petrel Framework - Core
//!
//! A minimal HTTP application server: raw TCP transport, template routing,
//! source-precedence parameter binding, and per-IP security middleware
//! around every handler, with a canonical JSON envelope on the wire.
//!
//! # Overview
//!
//! Petrel terminates one request per connection. The transport parses the
//! request line, headers, and a Content-Length body; the router picks the
//! first registered entry whose method and `{name}`-templated path match;
//! the binder builds the handler's declared arguments from path, query,
//! header, cookie, and body sources; and the middleware pipeline enforces
//! IP blocks, token auth, and rate limits before the handler runs, plus a
//! code-aware block check after it. Every response is the same JSON shape:
//! `{"status", "code", "data", "message"}`.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use petrel_core::prelude::*;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut app = App::new("hello");
//!     app.get(
//!         "/users/{id}",
//!         Operation::new("get_user", |_req, args| {
//!             let id = args.get_i64("id");
//!             async move { Ok(Outcome::Json(json!({ "id": id }))) }
//!         })
//!         .param("id", ParamType::Int),
//!     );
//!     app.serve(ServerConfig::default()).await
//! }
//! ```
//!
//! # Architecture
//!
//! - [`http`] - transport, route table, and the accept loop
//! - [`binder`] - parameter descriptors and type-directed coercion
//! - [`security`] - middleware configuration and per-IP mutable state
//! - [`envelope`] - the canonical response envelope and normalizer
//! - [`app`] - the dispatch orchestrator tying all of it together
//! - [`config`] - server and logging configuration

pub mod app;
pub mod binder;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod prelude;
pub mod security;

// Re-export the main types for convenience
pub use app::App;
pub use binder::{Args, ParamSpec, ParamType};
pub use config::{init_logging, LoggingConfig, ServerConfig};
pub use envelope::{normalize, Envelope, Outcome, Status, ToJson};
pub use error::{ApiError, ApiResult};
pub use http::router::{Handler, HandlerResult, Operation, RouteEntry, RouteTable, Router};
pub use http::{HttpRequest, HttpServer};
pub use security::{Auth, Block, Limit, MiddlewareSet, SecurityState, Token};
