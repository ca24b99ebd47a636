//! Server and logging configuration.
//!
//! Plain serde structs with sensible defaults and environment-variable
//! overrides (`PETREL_HOST`, `PETREL_PORT`, `PETREL_DEBUG`,
//! `PETREL_LOG_LEVEL`). Logging goes through the standard `log` facade with
//! `env_logger` as the backend, initialized once per process.

use std::env;
use std::sync::Once;

use anyhow::{bail, Result};
use serde::{Deserialize, Serialize};

/// Transport and dispatch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind.
    pub host: String,
    /// TCP port; 0 picks an ephemeral port.
    pub port: u16,
    /// When enabled, unexpected handler failures surface their raw detail
    /// instead of a generic message.
    pub debug: bool,
    /// Cap on the request head (request line + headers) in bytes.
    pub max_head_bytes: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
            debug: false,
            max_head_bytes: 64 * 1024,
        }
    }
}

impl ServerConfig {
    /// Override fields from the process environment.
    pub fn apply_env_vars(&mut self) {
        if let Ok(host) = env::var("PETREL_HOST") {
            self.host = host;
        }
        if let Ok(port) = env::var("PETREL_PORT") {
            if let Ok(port) = port.parse() {
                self.port = port;
            }
        }
        if let Ok(debug) = env::var("PETREL_DEBUG") {
            self.debug = debug == "1" || debug.eq_ignore_ascii_case("true");
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.host.is_empty() {
            bail!("server host must not be empty");
        }
        if self.max_head_bytes == 0 {
            bail!("max_head_bytes must be positive");
        }
        Ok(())
    }

    /// `host:port` string for the TCP listener.
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Logging configuration for the `log`/`env_logger` backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Filter directive, e.g. `info` or `petrel_core=debug`.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { level: "info".to_string() }
    }
}

impl LoggingConfig {
    pub fn apply_env_vars(&mut self) {
        if let Ok(level) = env::var("PETREL_LOG_LEVEL") {
            self.level = level;
        }
    }
}

static INIT: Once = Once::new();

/// Initialize the process-wide logger. Safe to call more than once; only the
/// first call takes effect.
pub fn init_logging(config: &LoggingConfig) {
    INIT.call_once(|| {
        let _ = env_logger::Builder::new()
            .parse_filters(&config.level)
            .try_init();
    });
}
