//! Route table, template matching, and registration surface.
//!
//! Templates are plain paths whose `{name}` segments capture the matching
//! concrete segment verbatim. Resolution is strictly first-match in
//! registration order - there is no specificity ranking, so callers register
//! more specific templates first. A failed lookup is a single 404-class
//! error that deliberately does not distinguish "unknown path" from "path
//! registered under another method".

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;

use crate::binder::{Args, ParamSpec, ParamType};
use crate::envelope::Outcome;
use crate::error::{ApiError, ApiResult};
use crate::http::HttpRequest;
use crate::security::MiddlewareSet;

/// What a handler evaluates to before normalization.
pub type HandlerResult = ApiResult<Outcome>;

/// Boxed future returned by async handlers.
pub type HandlerFuture = BoxFuture<'static, HandlerResult>;

/// Async handler: runs inline on the I/O lane.
pub type AsyncHandlerFn = Arc<dyn Fn(Arc<HttpRequest>, Args) -> HandlerFuture + Send + Sync>;

/// Blocking handler: offloaded to the blocking pool so it cannot stall the
/// I/O lane.
pub type BlockingHandlerFn = Arc<dyn Fn(Arc<HttpRequest>, Args) -> HandlerResult + Send + Sync>;

/// The two handler execution lanes.
#[derive(Clone)]
pub enum Handler {
    Async(AsyncHandlerFn),
    Blocking(BlockingHandlerFn),
}

/// A handler plus its registration-time metadata: display name and the
/// parameter descriptors the binder works from. Nothing here is recomputed
/// per request.
#[derive(Clone)]
pub struct Operation {
    pub name: String,
    pub handler: Handler,
    pub params: Vec<ParamSpec>,
}

impl Operation {
    /// An async operation; the closure runs inline on the I/O lane.
    pub fn new<F, Fut>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<HttpRequest>, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = HandlerResult> + Send + 'static,
    {
        Self {
            name: name.into(),
            handler: Handler::Async(Arc::new(move |req, args| Box::pin(handler(req, args)))),
            params: Vec::new(),
        }
    }

    /// A blocking operation; the closure is offloaded per call.
    pub fn blocking<F>(name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Arc<HttpRequest>, Args) -> HandlerResult + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            handler: Handler::Blocking(Arc::new(handler)),
            params: Vec::new(),
        }
    }

    /// Declare a required parameter.
    pub fn param(mut self, name: &str, ty: ParamType) -> Self {
        self.params.push(ParamSpec::new(name, ty));
        self
    }

    /// Declare a parameter with a default value.
    pub fn param_with_default(mut self, name: &str, ty: ParamType, default: impl Into<Value>) -> Self {
        self.params.push(ParamSpec::new(name, ty).with_default(default));
        self
    }
}

impl std::fmt::Debug for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Operation")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish()
    }
}

/// One registered route.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    /// Uppercase HTTP method.
    pub method: String,
    /// Path template with a leading `/`.
    pub path: String,
    pub operation: Arc<Operation>,
    /// Effective middleware, resolved at registration time.
    pub mids: Option<Arc<MiddlewareSet>>,
}

impl RouteEntry {
    /// Display name of the route (the operation's name).
    pub fn name(&self) -> &str {
        &self.operation.name
    }
}

/// Split a path into match segments: empty segments are discarded, except
/// that an all-empty path collapses to a single empty segment so `/` can
/// match a root template.
fn split_segments(path: &str) -> Vec<&str> {
    let parts: Vec<&str> = path.split('/').filter(|p| !p.is_empty()).collect();
    if parts.is_empty() {
        vec![""]
    } else {
        parts
    }
}

/// Match a concrete path against a template, returning capture values.
///
/// Segment counts must be equal; a `{name}` segment matches any single
/// concrete segment and captures it verbatim, anything else must compare
/// equal literally.
pub fn match_path(template: &str, path: &str) -> Option<HashMap<String, String>> {
    let template_parts = split_segments(template);
    let path_parts = split_segments(path);
    if template_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (t, p) in template_parts.iter().zip(path_parts.iter()) {
        if t.len() >= 2 && t.starts_with('{') && t.ends_with('}') {
            params.insert(t[1..t.len() - 1].to_string(), p.to_string());
        } else if t != p {
            return None;
        }
    }
    Some(params)
}

/// Normalize a registered template: prefix `/` when missing.
pub(crate) fn normalize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{}", path)
    }
}

/// The ordered route table scanned first-match per request.
#[derive(Debug, Default, Clone)]
pub struct RouteTable {
    entries: Vec<Arc<RouteEntry>>,
}

impl RouteTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, entry: RouteEntry) {
        self.entries.push(Arc::new(entry));
    }

    /// Resolve a request to the first matching entry and its captures.
    pub fn resolve(
        &self,
        method: &str,
        path: &str,
    ) -> ApiResult<(Arc<RouteEntry>, HashMap<String, String>)> {
        let method = method.to_ascii_uppercase();
        for entry in &self.entries {
            if entry.method != method {
                continue;
            }
            if let Some(params) = match_path(&entry.path, path) {
                return Ok((Arc::clone(entry), params));
            }
        }
        Err(ApiError::no_route(&method, path))
    }

    pub fn entries(&self) -> &[Arc<RouteEntry>] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub(crate) struct PendingRoute {
    pub method: String,
    pub path: String,
    pub operation: Operation,
    /// `None` inherits the group's (then the app's) middleware;
    /// `Some(MiddlewareSet::none())` explicitly disables all checks.
    pub mids: Option<MiddlewareSet>,
}

/// A route group with an optional path prefix and middleware set, spliced
/// into an app with `App::include_router`.
pub struct Router {
    pub(crate) name: String,
    pub(crate) prefix: String,
    pub(crate) mids: Option<MiddlewareSet>,
    pub(crate) routes: Vec<PendingRoute>,
}

impl Router {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            prefix: String::new(),
            mids: None,
            routes: Vec::new(),
        }
    }

    /// Set the group prefix (normalized to start with `/`).
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = if prefix.is_empty() { String::new() } else { normalize_path(prefix) };
        self
    }

    /// Middleware inherited by routes in this group that carry none of
    /// their own.
    pub fn with_middleware(mut self, mids: MiddlewareSet) -> Self {
        self.mids = Some(mids);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Register a route in this group.
    pub fn route(mut self, method: &str, path: &str, operation: Operation) -> Self {
        self.routes.push(PendingRoute {
            method: method.to_ascii_uppercase(),
            path: normalize_path(path),
            operation,
            mids: None,
        });
        self
    }

    /// Register a route with its own middleware set, overriding any group-
    /// or app-level inheritance.
    pub fn route_with(
        mut self,
        method: &str,
        path: &str,
        operation: Operation,
        mids: MiddlewareSet,
    ) -> Self {
        self.routes.push(PendingRoute {
            method: method.to_ascii_uppercase(),
            path: normalize_path(path),
            operation,
            mids: Some(mids),
        });
        self
    }

    pub fn get(self, path: &str, operation: Operation) -> Self {
        self.route("GET", path, operation)
    }

    pub fn post(self, path: &str, operation: Operation) -> Self {
        self.route("POST", path, operation)
    }

    pub fn put(self, path: &str, operation: Operation) -> Self {
        self.route("PUT", path, operation)
    }

    pub fn patch(self, path: &str, operation: Operation) -> Self {
        self.route("PATCH", path, operation)
    }

    pub fn delete(self, path: &str, operation: Operation) -> Self {
        self.route("DELETE", path, operation)
    }

    pub fn options(self, path: &str, operation: Operation) -> Self {
        self.route("OPTIONS", path, operation)
    }

    pub fn head(self, path: &str, operation: Operation) -> Self {
        self.route("HEAD", path, operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn noop(name: &str) -> Operation {
        Operation::new(name, |_req, _args| async { Ok(Outcome::Json(json!(null))) })
    }

    fn entry(method: &str, path: &str, name: &str) -> RouteEntry {
        RouteEntry {
            method: method.to_string(),
            path: path.to_string(),
            operation: Arc::new(noop(name)),
            mids: None,
        }
    }

    #[test]
    fn test_match_path_captures() {
        let params = match_path("/users/{id}/posts/{post_id}", "/users/7/posts/42").unwrap();
        assert_eq!(params.get("id"), Some(&"7".to_string()));
        assert_eq!(params.get("post_id"), Some(&"42".to_string()));
    }

    #[test]
    fn test_match_path_literal_mismatch() {
        assert!(match_path("/users/list", "/users/detail").is_none());
    }

    #[test]
    fn test_match_path_segment_count_mismatch() {
        assert!(match_path("/users/{id}", "/users/1/extra").is_none());
        assert!(match_path("/users/{id}", "/users").is_none());
    }

    #[test]
    fn test_match_path_root() {
        assert!(match_path("/", "/").is_some());
        assert!(match_path("/", "/x").is_none());
    }

    #[test]
    fn test_match_path_ignores_extra_slashes() {
        let params = match_path("/users/{id}", "//users//9//").unwrap();
        assert_eq!(params.get("id"), Some(&"9".to_string()));
    }

    #[test]
    fn test_capture_value_is_verbatim() {
        let params = match_path("/files/{name}", "/files/a%20b").unwrap();
        assert_eq!(params.get("name"), Some(&"a%20b".to_string()));
    }

    #[test]
    fn test_resolve_first_match_by_registration_order() {
        let mut table = RouteTable::new();
        table.push(entry("GET", "/a/{x}", "capture"));
        table.push(entry("GET", "/a/b", "literal"));

        let (matched, params) = table.resolve("GET", "/a/b").unwrap();
        assert_eq!(matched.name(), "capture");
        assert_eq!(params.get("x"), Some(&"b".to_string()));
    }

    #[test]
    fn test_resolve_method_case_insensitive() {
        let mut table = RouteTable::new();
        table.push(entry("GET", "/ping", "ping"));
        assert!(table.resolve("get", "/ping").is_ok());
    }

    #[test]
    fn test_resolve_wrong_method_is_plain_404() {
        let mut table = RouteTable::new();
        table.push(entry("GET", "/ping", "ping"));

        let err = table.resolve("POST", "/ping").unwrap_err();
        assert_eq!(err.code, 404);
        assert_eq!(err.detail, "No route for POST /ping");
    }

    #[test]
    fn test_resolve_failure_is_idempotent() {
        let table = RouteTable::new();
        let first = table.resolve("GET", "/nope").unwrap_err();
        let second = table.resolve("GET", "/nope").unwrap_err();
        assert_eq!(first, second);
    }

    #[test]
    fn test_router_normalizes_paths() {
        let router = Router::new("api").with_prefix("v1").get("users", noop("list_users"));
        assert_eq!(router.prefix, "/v1");
        assert_eq!(router.routes[0].path, "/users");
        assert_eq!(router.routes[0].method, "GET");
    }
}
