//! Per-route security middleware: IP blocking, token authentication, and
//! sliding-window rate limiting.
//!
//! Configuration records are immutable, created at registration time, and
//! shared by reference across every request on a route. The mutable side
//! (block lists, failure counters, rate windows) lives in
//! [`SecurityState`](state::SecurityState), one instance per server.
//!
//! Pre-handler enforcement order is fixed: IP block, then token auth, then
//! rate limit. After the handler, the IP-block check runs again with the
//! response code so configured trigger codes (e.g. repeated 401s) escalate
//! toward a block even when the handler itself succeeded.

pub mod state;

pub use state::SecurityState;

use serde::{Deserialize, Serialize};

use crate::error::{ApiError, ApiResult};
use crate::http::constants::headers;
use crate::http::HttpRequest;

/// IP-block escalation policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    /// Response codes that count as failures.
    pub codes: Vec<u16>,
    /// Failures within the window that trigger a block.
    pub attempts: usize,
    /// Sliding-window length in seconds.
    pub interval: u64,
    /// Block duration in minutes. Negative means permanent; zero installs a
    /// block that expires on the next check.
    pub block_minutes: i64,
    /// Message returned to blocked clients.
    pub message: String,
}

impl Default for Block {
    fn default() -> Self {
        Self {
            codes: vec![401, 404],
            attempts: 3,
            interval: 30,
            block_minutes: -1,
            message: "Blocked IP.".to_string(),
        }
    }
}

/// Token credential configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// The expected secret, compared by exact equality.
    pub token: String,
}

impl Token {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

/// Authentication scheme attached to a route.
///
/// Only token auth is implemented; other kinds are a server-side
/// configuration error when enforced, not a client error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", tag = "type")]
pub enum Auth {
    Token(Token),
    Basic { user: String, password: String },
}

/// Sliding-window rate-limit policy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Limit {
    /// Requests allowed inside one window.
    pub limit: usize,
    /// Window length in seconds.
    pub window: u64,
    /// How long to block an offender, in minutes.
    pub block_minutes: u64,
    /// Message returned to limited clients.
    pub message: String,
}

impl Default for Limit {
    fn default() -> Self {
        Self {
            limit: 20,
            window: 60,
            block_minutes: 5,
            message: "Too many requests.".to_string(),
        }
    }
}

/// The middleware checks attached to a route. Every field is independently
/// optional; an empty set performs no checks at all.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MiddlewareSet {
    pub block: Option<Block>,
    pub auth: Option<Auth>,
    pub limit: Option<Limit>,
}

impl MiddlewareSet {
    /// A set that performs no checks. Attaching it to a route overrides any
    /// inherited app- or group-level middleware.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_block(mut self, block: Block) -> Self {
        self.block = Some(block);
        self
    }

    pub fn with_token(mut self, token: Token) -> Self {
        self.auth = Some(Auth::Token(token));
        self
    }

    pub fn with_limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// Enforce the route's authentication scheme against a request.
pub fn enforce_auth(request: &HttpRequest, auth: &Auth) -> ApiResult<()> {
    match auth {
        Auth::Token(expected) => {
            match extract_credential(request) {
                Some(got) if !got.is_empty() && got == expected.token => Ok(()),
                _ => Err(ApiError::unauthorized()),
            }
        }
        Auth::Basic { .. } => Err(ApiError::config("Unsupported authentication type")),
    }
}

/// Pull the presented credential from the request: Authorization header
/// (`Bearer`/`Token` scheme, case-insensitive), then `X-Api-Token`, then the
/// `token` query parameter.
fn extract_credential(request: &HttpRequest) -> Option<String> {
    if let Some(header) = request.header(headers::AUTHORIZATION) {
        let mut parts = header.trim().splitn(2, char::is_whitespace);
        if let (Some(scheme), Some(value)) = (parts.next(), parts.next()) {
            if scheme.eq_ignore_ascii_case("bearer") || scheme.eq_ignore_ascii_case("token") {
                let value = value.trim();
                if !value.is_empty() {
                    return Some(value.to_string());
                }
            }
        }
    }

    if let Some(value) = request.header("x-api-token") {
        if !value.is_empty() {
            return Some(value.to_string());
        }
    }

    request.query_first("token").map(str::to_string)
}
