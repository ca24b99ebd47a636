//! The application orchestrator.
//!
//! [`App`] owns the route table, the app-level default middleware, and the
//! per-server [`SecurityState`]. Dispatch runs the whole request lifecycle
//! in a strict sequence: drain the transport's receive side, resolve the
//! route, run pre-handler middleware, bind arguments, invoke the handler on
//! its declared lane, re-run the IP-block check with the response code,
//! normalize, and serialize the envelope. Middleware rejections and binding
//! failures never leave this layer as faults - they become failure
//! envelopes.

use std::future::Future;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncWrite;
use tokio::net::TcpListener;

use crate::binder::{bind_args, ParamSpec, ParamType};
use crate::config::ServerConfig;
use crate::envelope::{normalize, Envelope, Outcome};
use crate::error::{ApiError, ApiResult};
use crate::http::constants::content_types;
use crate::http::router::{normalize_path, Handler, Operation, RouteEntry, Router};
use crate::http::transport::{Application, Connection, ReceiveEvent, RequestHead, SendEvent};
use crate::http::{HttpRequest, HttpServer, RouteTable};
use crate::security::{enforce_auth, MiddlewareSet, SecurityState};

const ROUTES_PATH: &str = "/routes";
const ROUTE_INFO_PATH: &str = "/routes/info";

/// A Petrel application: route table, default middleware, security state.
pub struct App {
    name: String,
    debug: bool,
    mids: Option<Arc<MiddlewareSet>>,
    routes: RouteTable,
    security: Arc<SecurityState>,
    introspection_registered: bool,
}

impl App {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            debug: false,
            mids: None,
            routes: RouteTable::new(),
            security: Arc::new(SecurityState::new()),
            introspection_registered: false,
        }
    }

    /// Surface raw handler failure details in 500 responses.
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// Default middleware inherited by routes registered without their own.
    pub fn with_middleware(mut self, mids: MiddlewareSet) -> Self {
        self.mids = Some(Arc::new(mids));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The security state backing this app's middleware checks.
    pub fn security(&self) -> &Arc<SecurityState> {
        &self.security
    }

    /// The registered routes, in registration order.
    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    // ------------------------------------------------------------------
    // Registration
    // ------------------------------------------------------------------

    /// Register a route inheriting the app-level middleware.
    pub fn route(&mut self, method: &str, path: &str, operation: Operation) -> &mut Self {
        let mids = self.mids.clone();
        self.push_route(method, path, operation, mids)
    }

    /// Register a route with its own middleware set (overrides inheritance;
    /// `MiddlewareSet::none()` disables all checks for the route).
    pub fn route_with(
        &mut self,
        method: &str,
        path: &str,
        operation: Operation,
        mids: MiddlewareSet,
    ) -> &mut Self {
        self.push_route(method, path, operation, Some(Arc::new(mids)))
    }

    fn push_route(
        &mut self,
        method: &str,
        path: &str,
        operation: Operation,
        mids: Option<Arc<MiddlewareSet>>,
    ) -> &mut Self {
        self.routes.push(RouteEntry {
            method: method.to_ascii_uppercase(),
            path: normalize_path(path),
            operation: Arc::new(operation),
            mids,
        });
        self
    }

    pub fn get(&mut self, path: &str, operation: Operation) -> &mut Self {
        self.route("GET", path, operation)
    }

    pub fn post(&mut self, path: &str, operation: Operation) -> &mut Self {
        self.route("POST", path, operation)
    }

    pub fn put(&mut self, path: &str, operation: Operation) -> &mut Self {
        self.route("PUT", path, operation)
    }

    pub fn patch(&mut self, path: &str, operation: Operation) -> &mut Self {
        self.route("PATCH", path, operation)
    }

    pub fn delete(&mut self, path: &str, operation: Operation) -> &mut Self {
        self.route("DELETE", path, operation)
    }

    pub fn options(&mut self, path: &str, operation: Operation) -> &mut Self {
        self.route("OPTIONS", path, operation)
    }

    pub fn head(&mut self, path: &str, operation: Operation) -> &mut Self {
        self.route("HEAD", path, operation)
    }

    /// Splice a route group into the table. Middleware resolves per route:
    /// route-level set, else group-level, else the app default.
    pub fn include_router(&mut self, router: Router, prefix: &str) -> &mut Self {
        let prefix = if prefix.is_empty() { String::new() } else { normalize_path(prefix) };
        let group_mids = router.mids.map(Arc::new);

        for route in router.routes {
            let full_path = format!("{}{}{}", prefix, router.prefix, route.path);
            let full_path = if full_path.is_empty() { "/".to_string() } else { full_path };
            let mids = route
                .mids
                .map(Arc::new)
                .or_else(|| group_mids.clone())
                .or_else(|| self.mids.clone());
            self.push_route(&route.method, &full_path, route.operation, mids);
        }
        self
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Run one request through the full lifecycle and write the envelope.
    pub async fn dispatch<W>(
        &self,
        head: RequestHead,
        conn: &mut Connection<W>,
    ) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let client_ip = head
            .client
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|| "unknown".to_string());
        let method = head.method.to_ascii_uppercase();
        let path_for_log = if head.raw_query.is_empty() {
            head.path.clone()
        } else {
            format!("{}?{}", head.path, head.raw_query)
        };

        let mut body = Vec::new();
        loop {
            match conn.receive().await {
                ReceiveEvent::Body { bytes, more } => {
                    body.extend_from_slice(&bytes);
                    if !more {
                        break;
                    }
                }
                ReceiveEvent::Disconnect => break,
            }
        }

        let (entry, path_params) = match self.routes.resolve(&method, &head.path) {
            Ok(resolved) => resolved,
            Err(err) => {
                log::warn!(
                    "[{}] Error {}: {} {} -> {}",
                    client_ip, err.code, method, path_for_log, err.detail
                );
                return self.send_envelope(conn, Envelope::from(&err), &err.headers).await;
            }
        };

        let request = Arc::new(HttpRequest::new(&head, path_params, body));
        let mids = entry.mids.clone();
        let mut extra_headers: Vec<(String, String)> = Vec::new();
        let mut client_log_done = false;

        let envelope = match self.run_route(&entry, mids.as_deref(), &request, &client_ip).await {
            Ok(envelope) => envelope,
            Err(err) => {
                log::warn!(
                    "[{}] Error {}: {} {} -> {}",
                    client_ip, err.code, method, path_for_log, err.detail
                );
                client_log_done = true;

                // The failed response code may itself count toward a block.
                let mut effective = err;
                if let Some(block) = mids.as_deref().and_then(|m| m.block.as_ref()) {
                    if let Err(block_err) =
                        self.security.enforce_ip_block(&client_ip, block, Some(effective.code))
                    {
                        effective = block_err;
                    }
                }
                extra_headers = effective.headers.clone();
                Envelope::from(&effective)
            }
        };

        if !client_log_done {
            if (200..400).contains(&envelope.code) {
                log::info!("[{}] OK {}: {} {}", client_ip, envelope.code, method, path_for_log);
            } else {
                log::warn!(
                    "[{}] Error {}: {} {} -> {}",
                    client_ip,
                    envelope.code,
                    method,
                    path_for_log,
                    envelope_detail(&envelope)
                );
            }
        }

        self.send_envelope(conn, envelope, &extra_headers).await
    }

    /// Middleware-pre, binding, handler, middleware-post. Errors bubble to
    /// `dispatch`, which still applies the post-handler block accounting.
    async fn run_route(
        &self,
        entry: &RouteEntry,
        mids: Option<&MiddlewareSet>,
        request: &Arc<HttpRequest>,
        client_ip: &str,
    ) -> ApiResult<Envelope> {
        if let Some(m) = mids {
            if let Some(block) = &m.block {
                self.security.enforce_ip_block(client_ip, block, None)?;
            }
            if let Some(auth) = &m.auth {
                enforce_auth(request, auth)?;
            }
            if let Some(limit) = &m.limit {
                self.security.enforce_rate_limit(client_ip, limit)?;
            }
        }

        let args = bind_args(&entry.operation.params, request)?;
        let outcome = self.invoke(&entry.operation, Arc::clone(request), args).await?;
        let mut envelope = normalize(outcome);

        if let Some(block) = mids.and_then(|m| m.block.as_ref()) {
            if let Err(block_err) =
                self.security.enforce_ip_block(client_ip, block, Some(envelope.code))
            {
                envelope = Envelope::from(&block_err);
            }
        }
        Ok(envelope)
    }

    /// Invoke the handler on its declared lane. Panics are contained here
    /// and reported as (possibly redacted) 500s.
    async fn invoke(
        &self,
        operation: &Operation,
        request: Arc<HttpRequest>,
        args: crate::binder::Args,
    ) -> ApiResult<Outcome> {
        match &operation.handler {
            Handler::Async(handler) => {
                match AssertUnwindSafe(handler(request, args)).catch_unwind().await {
                    Ok(result) => result,
                    Err(payload) => Err(self.internal_error(&operation.name, panic_detail(&payload))),
                }
            }
            Handler::Blocking(handler) => {
                let handler = Arc::clone(handler);
                match tokio::task::spawn_blocking(move || handler(request, args)).await {
                    Ok(result) => result,
                    Err(join_err) => {
                        let detail = join_err
                            .try_into_panic()
                            .map(|payload| panic_detail(&payload))
                            .unwrap_or_else(|e| e.to_string());
                        Err(self.internal_error(&operation.name, detail))
                    }
                }
            }
        }
    }

    fn internal_error(&self, operation: &str, detail: String) -> ApiError {
        log::error!("Unhandled failure in '{}': {}", operation, detail);
        if self.debug {
            ApiError::internal(detail)
        } else {
            ApiError::internal("Internal Server Error")
        }
    }

    async fn send_envelope<W>(
        &self,
        conn: &mut Connection<W>,
        envelope: Envelope,
        extra_headers: &[(String, String)],
    ) -> anyhow::Result<()>
    where
        W: AsyncWrite + Unpin + Send,
    {
        let body = envelope.to_bytes();
        let mut headers = vec![
            ("content-type".to_string(), content_types::JSON.to_string()),
            ("content-length".to_string(), body.len().to_string()),
        ];
        headers.extend(extra_headers.iter().cloned());

        conn.send(SendEvent::Start { status: envelope.code, headers }).await?;
        conn.send(SendEvent::Body { bytes: body, more: false }).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------

    /// Register `GET /routes` (listing) and `GET /routes/info` (detail by
    /// exact path or name) over a snapshot of everything registered so far.
    /// Called automatically when the server starts.
    pub fn register_introspection(&mut self) {
        if self.introspection_registered {
            return;
        }
        self.introspection_registered = true;

        let snapshot: Arc<Vec<RouteInfo>> = Arc::new(
            self.routes.entries().iter().map(|entry| RouteInfo::from_entry(entry)).collect(),
        );

        let listing_snapshot = Arc::clone(&snapshot);
        let listing = Operation::new("routes", move |_req, _args| {
            let snapshot = Arc::clone(&listing_snapshot);
            async move {
                let listed: Vec<Value> = snapshot
                    .iter()
                    .map(|info| {
                        serde_json::json!({
                            "method": info.method,
                            "path": info.path,
                            "name": info.name,
                        })
                    })
                    .collect();
                Ok(Outcome::Json(Value::Array(listed)))
            }
        });

        let detail_snapshot = Arc::clone(&snapshot);
        let detail = Operation::new("route_info", move |_req, args| {
            let snapshot = Arc::clone(&detail_snapshot);
            async move {
                let by_path = args.get_str("path").map(str::to_string);
                let by_name = args.get_str("name").map(str::to_string);
                if by_path.is_none() && by_name.is_none() {
                    return Err(ApiError::new(422, "Provide a 'path' or 'name' parameter"));
                }

                let found = snapshot.iter().find(|info| {
                    by_path.as_deref() == Some(info.path.as_str())
                        || by_name.as_deref() == Some(info.name.as_str())
                });
                match found {
                    Some(info) => Ok(Outcome::Json(
                        serde_json::to_value(info).unwrap_or(Value::Null),
                    )),
                    None => Err(ApiError::new(404, "No such route")),
                }
            }
        })
        .param_with_default("path", ParamType::Str, Value::Null)
        .param_with_default("name", ParamType::Str, Value::Null);

        self.get(ROUTES_PATH, listing);
        self.get(ROUTE_INFO_PATH, detail);
    }

    // ------------------------------------------------------------------
    // Serving
    // ------------------------------------------------------------------

    /// Bind the listener and return the bound address plus the server
    /// future. Useful when the caller needs the ephemeral port.
    pub async fn bind(
        mut self,
        config: ServerConfig,
    ) -> anyhow::Result<(SocketAddr, impl Future<Output = anyhow::Result<()>>)> {
        config.validate()?;
        self.register_introspection();

        let listener = TcpListener::bind(config.bind_addr()).await?;
        let addr = listener.local_addr()?;
        log::info!("{} listening on {}", self.name, addr);

        let server = HttpServer::new(config, Arc::new(self));
        Ok((addr, server.serve_listener(listener)))
    }

    /// Bind and serve forever.
    pub async fn serve(self, config: ServerConfig) -> anyhow::Result<()> {
        let (_, server) = self.bind(config).await?;
        server.await
    }
}

impl Application for App {
    fn call<'a, W>(
        &'a self,
        head: RequestHead,
        conn: &'a mut Connection<W>,
    ) -> BoxFuture<'a, anyhow::Result<()>>
    where
        W: AsyncWrite + Unpin + Send,
    {
        Box::pin(self.dispatch(head, conn))
    }
}

/// Snapshot of one route for the introspection endpoints.
#[derive(Debug, Clone, Serialize)]
struct RouteInfo {
    method: String,
    path: String,
    name: String,
    params: Vec<ParamInfo>,
}

#[derive(Debug, Clone, Serialize)]
struct ParamInfo {
    name: String,
    #[serde(rename = "type")]
    ty: String,
    default: Option<Value>,
}

impl RouteInfo {
    fn from_entry(entry: &RouteEntry) -> Self {
        Self {
            method: entry.method.clone(),
            path: entry.path.clone(),
            name: entry.name().to_string(),
            params: entry.operation.params.iter().map(ParamInfo::from_spec).collect(),
        }
    }
}

impl ParamInfo {
    fn from_spec(spec: &ParamSpec) -> Self {
        Self {
            name: spec.name.clone(),
            ty: spec.ty.display_name(),
            default: spec.default.clone(),
        }
    }
}

fn envelope_detail(envelope: &Envelope) -> String {
    match &envelope.data {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Object(map)) if map.contains_key("detail") => map["detail"].to_string(),
        Some(other) => other.to_string(),
        None => envelope.message.clone().unwrap_or_default(),
    }
}

fn panic_detail(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "handler panicked".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::envelope::Status;
    use crate::security::{Block, Limit, Token};
    use serde_json::json;

    fn head(method: &str, path: &str, raw_query: &str) -> RequestHead {
        RequestHead {
            method: method.to_string(),
            path: path.to_string(),
            raw_query: raw_query.to_string(),
            version: "HTTP/1.1".to_string(),
            headers: Vec::new(),
            client: Some("10.1.2.3:55555".parse().unwrap()),
        }
    }

    /// Drive one request through dispatch and parse the wire response.
    async fn call(app: &App, head: RequestHead, body: &[u8]) -> (String, Envelope) {
        let mut conn = Connection::new(Vec::new(), body.to_vec());
        app.dispatch(head, &mut conn).await.unwrap();

        let wire = String::from_utf8(conn.into_writer()).unwrap();
        let body_start = wire.find("\r\n\r\n").unwrap() + 4;
        let envelope = serde_json::from_str(&wire[body_start..]).unwrap();
        (wire, envelope)
    }

    #[tokio::test]
    async fn test_dispatch_success_envelope() {
        let mut app = App::new("test");
        app.get(
            "/ping",
            Operation::new("ping", |_req, _args| async { Ok(Outcome::Json(json!("pong"))) }),
        );

        let (wire, envelope) = call(&app, head("GET", "/ping", ""), b"").await;
        assert!(wire.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(wire.contains("content-type: application/json; charset=utf-8\r\n"));
        assert_eq!(envelope.status, Status::Success);
        assert_eq!(envelope.data, Some(json!("pong")));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_path_is_404_envelope() {
        let app = App::new("test");
        let (wire, envelope) = call(&app, head("GET", "/nope", ""), b"").await;

        assert!(wire.starts_with("HTTP/1.1 404 Not Found\r\n"));
        assert_eq!(envelope.status, Status::Failure);
        assert_eq!(envelope.data, Some(json!("No route for GET /nope")));
    }

    #[tokio::test]
    async fn test_dispatch_404_is_idempotent() {
        let app = App::new("test");
        let (wire_a, _) = call(&app, head("GET", "/nope", ""), b"").await;
        let (wire_b, _) = call(&app, head("GET", "/nope", ""), b"").await;
        assert_eq!(wire_a, wire_b);
    }

    #[tokio::test]
    async fn test_dispatch_binds_path_and_query() {
        let mut app = App::new("test");
        app.get(
            "/users/{id}",
            Operation::new("get_user", |_req, args| {
                let id = args.get_i64("id");
                let active = args.get_bool("active");
                async move { Ok(Outcome::Json(json!({"id": id, "active": active}))) }
            })
            .param("id", ParamType::Value)
            .param_with_default("active", ParamType::Bool, false),
        );

        let (_, envelope) = call(&app, head("GET", "/users/42", "active=true"), b"").await;
        assert_eq!(envelope.data, Some(json!({"id": 42, "active": true})));
    }

    #[tokio::test]
    async fn test_dispatch_path_capture_shadows_query() {
        let mut app = App::new("test");
        app.get(
            "/users/{id}",
            Operation::new("get_user", |_req, args| {
                let id = args.get("id").cloned();
                async move { Ok(Outcome::Json(json!({"id": id}))) }
            })
            .param("id", ParamType::Value),
        );

        let (_, envelope) = call(&app, head("GET", "/users/7", "id=999"), b"").await;
        assert_eq!(envelope.data, Some(json!({"id": 7})));
    }

    #[tokio::test]
    async fn test_dispatch_missing_param_is_422() {
        let mut app = App::new("test");
        app.get(
            "/search",
            Operation::new("search", |_req, _args| async { Ok(Outcome::Json(json!(null))) })
                .param("q", ParamType::Str),
        );

        let (_, envelope) = call(&app, head("GET", "/search", ""), b"").await;
        assert_eq!(envelope.code, 422);
        assert_eq!(envelope.data, Some(json!("Missing required parameter 'q'")));
    }

    #[tokio::test]
    async fn test_dispatch_token_auth_gate() {
        let mut app = App::new("test");
        let mids = MiddlewareSet::default().with_token(Token::new("s3cret"));
        app.route_with(
            "GET",
            "/private",
            Operation::new("private", |_req, _args| async { Ok(Outcome::from("ok")) }),
            mids,
        );

        let (wire, envelope) = call(&app, head("GET", "/private", ""), b"").await;
        assert!(wire.starts_with("HTTP/1.1 401 Unauthorized\r\n"));
        assert!(wire.contains("WWW-Authenticate: Bearer realm=\"api\"\r\n"));
        assert_eq!(envelope.code, 401);

        let (_, envelope) = call(&app, head("GET", "/private", "token=s3cret"), b"").await;
        assert_eq!(envelope.status, Status::Success);
        assert_eq!(envelope.message, Some("ok".to_string()));
    }

    #[tokio::test]
    async fn test_dispatch_rate_limit_gate() {
        let mut app = App::new("test");
        let mids = MiddlewareSet::default().with_limit(Limit {
            limit: 3,
            window: 60,
            block_minutes: 5,
            message: "Too many requests.".to_string(),
        });
        app.route_with(
            "GET",
            "/limited",
            Operation::new("limited", |_req, _args| async { Ok(Outcome::from("ok")) }),
            mids,
        );

        for _ in 0..3 {
            let (_, envelope) = call(&app, head("GET", "/limited", ""), b"").await;
            assert_eq!(envelope.code, 200);
        }
        let (wire, envelope) = call(&app, head("GET", "/limited", ""), b"").await;
        assert!(wire.starts_with("HTTP/1.1 429 Too Many Requests\r\n"));
        assert_eq!(envelope.data, Some(json!("Too many requests.")));
    }

    #[tokio::test]
    async fn test_dispatch_block_escalation_from_handler_codes() {
        let mut app = App::new("test");
        let mids = MiddlewareSet::default().with_block(Block {
            codes: vec![401],
            attempts: 3,
            interval: 30,
            block_minutes: -1,
            message: "Blocked IP.".to_string(),
        });
        app.route_with(
            "GET",
            "/denies",
            Operation::new("denies", |_req, _args| async {
                Ok(Outcome::Envelope(Envelope::failure(401)))
            }),
            mids.clone(),
        );
        app.route_with(
            "GET",
            "/other",
            Operation::new("other", |_req, _args| async { Ok(Outcome::from("ok")) }),
            mids,
        );

        let (_, first) = call(&app, head("GET", "/denies", ""), b"").await;
        assert_eq!(first.code, 401);
        let (_, second) = call(&app, head("GET", "/denies", ""), b"").await;
        assert_eq!(second.code, 401);
        // Third 401 crosses the threshold: the response is already the block.
        let (_, third) = call(&app, head("GET", "/denies", ""), b"").await;
        assert_eq!(third.code, 403);
        assert_eq!(third.data, Some(json!("Blocked IP.")));

        // The block applies on any route for that IP, before the handler.
        let (_, blocked) = call(&app, head("GET", "/other", ""), b"").await;
        assert_eq!(blocked.code, 403);
    }

    #[tokio::test]
    async fn test_dispatch_blocking_lane() {
        let mut app = App::new("test");
        app.get(
            "/compute",
            Operation::blocking("compute", |_req, args| {
                let n = args.get_i64("n").unwrap_or(0);
                Ok(Outcome::Json(json!(n * 2)))
            })
            .param_with_default("n", ParamType::Int, 0),
        );

        let (_, envelope) = call(&app, head("GET", "/compute", "n=21"), b"").await;
        assert_eq!(envelope.data, Some(json!(42)));
    }

    #[tokio::test]
    async fn test_dispatch_panic_is_redacted_500() {
        let mut app = App::new("test");
        app.get(
            "/boom",
            Operation::new("boom", |_req, _args| async { panic!("secret detail") }),
        );

        let (_, envelope) = call(&app, head("GET", "/boom", ""), b"").await;
        assert_eq!(envelope.code, 500);
        assert_eq!(envelope.data, Some(json!("Internal Server Error")));
    }

    #[tokio::test]
    async fn test_dispatch_panic_detail_surfaces_in_debug() {
        let mut app = App::new("test").with_debug(true);
        app.get(
            "/boom",
            Operation::new("boom", |_req, _args| async { panic!("secret detail") }),
        );

        let (_, envelope) = call(&app, head("GET", "/boom", ""), b"").await;
        assert_eq!(envelope.code, 500);
        assert_eq!(envelope.data, Some(json!("secret detail")));
    }

    #[tokio::test]
    async fn test_dispatch_record_body() {
        let mut app = App::new("test");
        app.post(
            "/items",
            Operation::new("create_item", |_req, args| {
                let item = args.get("item").cloned();
                async move { Ok(Outcome::Json(json!({"created": item}))) }
            })
            .param("item", ParamType::Record("Item")),
        );

        let mut h = head("POST", "/items", "");
        h.headers.push(("content-type".to_string(), "application/json".to_string()));
        let (_, envelope) = call(&app, h, br#"{"name": "pen"}"#).await;
        assert_eq!(envelope.data, Some(json!({"created": {"name": "pen"}})));

        let mut h = head("POST", "/items", "");
        h.headers.push(("content-type".to_string(), "application/json".to_string()));
        let (_, envelope) = call(&app, h, br#"[1]"#).await;
        assert_eq!(envelope.code, 422);
    }

    #[tokio::test]
    async fn test_include_router_prefixes_and_inherits_middleware() {
        let mut app = App::new("test");
        let group = Router::new("admin")
            .with_prefix("/admin")
            .with_middleware(MiddlewareSet::default().with_token(Token::new("s3cret")))
            .get("/stats", Operation::new("stats", |_req, _args| async {
                Ok(Outcome::from("stats"))
            }));
        app.include_router(group, "/api");

        let (_, envelope) = call(&app, head("GET", "/api/admin/stats", ""), b"").await;
        assert_eq!(envelope.code, 401);

        let (_, envelope) =
            call(&app, head("GET", "/api/admin/stats", "token=s3cret"), b"").await;
        assert_eq!(envelope.code, 200);
    }

    #[tokio::test]
    async fn test_introspection_listing_and_detail() {
        let mut app = App::new("test");
        app.get(
            "/users/{id}",
            Operation::new("get_user", |_req, _args| async { Ok(Outcome::from("u")) })
                .param("id", ParamType::Int)
                .param_with_default("active", ParamType::Bool, true),
        );
        app.register_introspection();

        let (_, listing) = call(&app, head("GET", "/routes", ""), b"").await;
        let listed = listing.data.unwrap();
        let listed = listed.as_array().unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0]["name"], json!("get_user"));

        let (_, detail) =
            call(&app, head("GET", "/routes/info", "name=get_user"), b"").await;
        let info = detail.data.unwrap();
        assert_eq!(info["path"], json!("/users/{id}"));
        assert_eq!(info["params"][0]["type"], json!("Int"));
        assert_eq!(info["params"][1]["default"], json!(true));

        let (_, missing) = call(&app, head("GET", "/routes/info", ""), b"").await;
        assert_eq!(missing.code, 422);
    }
}
