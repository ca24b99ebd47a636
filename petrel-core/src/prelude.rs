//! Prelude module for convenient imports.
//!
//! ```rust,ignore
//! use petrel_core::prelude::*;
//! ```

pub use crate::app::App;
pub use crate::binder::{Args, ParamType};
pub use crate::config::{init_logging, LoggingConfig, ServerConfig};
pub use crate::envelope::{Envelope, Outcome, Status, ToJson};
pub use crate::error::{ApiError, ApiResult};
pub use crate::http::router::{Operation, Router};
pub use crate::http::HttpRequest;
pub use crate::security::{Auth, Block, Limit, MiddlewareSet, Token};
