//! Application-level error type shared by the router, binder, middleware
//! pipeline, and dispatch loop.
//!
//! Every recoverable failure inside dispatch is an [`ApiError`]: a numeric
//! status code plus a human-readable detail, optionally carrying extra
//! response headers (e.g. the `WWW-Authenticate` hint on 401s). The dispatch
//! boundary turns these into failure envelopes; they never escape to the
//! transport as unhandled faults.

use thiserror::Error;

/// Result alias for operations that fail with an [`ApiError`].
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// A recoverable request-processing failure with HTTP semantics.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{code}: {detail}")]
pub struct ApiError {
    /// HTTP status code carried into the failure envelope.
    pub code: u16,
    /// Human-readable detail, serialized into the envelope's data field.
    pub detail: String,
    /// Extra headers to attach to the response (name, value).
    pub headers: Vec<(String, String)>,
}

impl ApiError {
    /// Create an error with an arbitrary status code and detail.
    pub fn new(code: u16, detail: impl Into<String>) -> Self {
        Self { code, detail: detail.into(), headers: Vec::new() }
    }

    /// Attach an extra response header to this error.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// 404 - no route matched the method/path pair.
    ///
    /// Deliberately does not distinguish "unknown path" from "path registered
    /// under another method"; registration order and route shape encode all
    /// the precedence there is.
    pub fn no_route(method: &str, path: &str) -> Self {
        Self::new(404, format!("No route for {} {}", method, path))
    }

    /// 422 - a declared handler parameter could not be resolved.
    pub fn missing_param(name: &str) -> Self {
        Self::new(422, format!("Missing required parameter '{}'", name))
    }

    /// 422 - the request body does not decode into the declared record type.
    pub fn invalid_body(param: &str, record: &str) -> Self {
        Self::new(
            422,
            format!("Body for '{}' must be a JSON object for record '{}'", param, record),
        )
    }

    /// 401 - missing or mismatched credential, with the standard hint header.
    pub fn unauthorized() -> Self {
        Self::new(401, "Unauthorized")
            .with_header("WWW-Authenticate", "Bearer realm=\"api\"")
    }

    /// 403 - the client IP is currently blocked.
    pub fn blocked(message: &str) -> Self {
        Self::new(403, message)
    }

    /// 429 - the client IP exceeded its request window.
    pub fn rate_limited(message: &str) -> Self {
        Self::new(429, message)
    }

    /// 500 - unexpected handler failure.
    pub fn internal(detail: impl Into<String>) -> Self {
        Self::new(500, detail)
    }

    /// 500 - server-side misconfiguration (not a client error).
    pub fn config(detail: impl Into<String>) -> Self {
        Self::new(500, detail)
    }
}
