//! Hello API - a small Petrel application exercising the registration
//! surface: plain routes, path/query binding, a JSON record body, the
//! blocking lane, and a token-protected, rate-limited admin group.
//!
//! Run it and poke around:
//!
//! ```bash
//! cargo run -p hello-api
//! curl http://127.0.0.1:8000/users/42?active=true
//! curl http://127.0.0.1:8000/routes
//! curl -H "Authorization: Bearer letmein" http://127.0.0.1:8000/admin/stats
//! ```

use anyhow::Result;
use petrel_core::prelude::*;
use serde_json::json;

#[tokio::main]
async fn main() -> Result<()> {
    let mut logging = LoggingConfig::default();
    logging.apply_env_vars();
    init_logging(&logging);

    let mut config = ServerConfig::default();
    config.apply_env_vars();

    let mut app = App::new("hello-api");

    app.get(
        "/",
        Operation::new("index", |_req, _args| async {
            Ok(Outcome::from("Welcome to the hello API"))
        }),
    );

    app.get(
        "/users/{id}",
        Operation::new("get_user", |_req, args| {
            let id = args.get("id").cloned();
            let active = args.get_bool("active");
            async move { Ok(Outcome::Json(json!({"id": id, "active": active}))) }
        })
        .param("id", ParamType::Int)
        .param_with_default("active", ParamType::Bool, true),
    );

    app.post(
        "/items",
        Operation::new("create_item", |_req, args| {
            let item = args.get("item").cloned();
            async move {
                Ok(Outcome::Envelope(
                    Envelope::success(201).with_data(json!({"item": item})),
                ))
            }
        })
        .param("item", ParamType::Record("Item")),
    );

    // CPU-ish work goes on the blocking lane.
    app.get(
        "/checksum",
        Operation::blocking("checksum", |_req, args| {
            let text = args.get_str("text").unwrap_or("").to_string();
            let sum: u32 = text.bytes().map(u32::from).sum();
            Ok(Outcome::Json(json!({"text": text, "sum": sum})))
        })
        .param_with_default("text", ParamType::Str, ""),
    );

    let admin = Router::new("admin")
        .with_prefix("/admin")
        .with_middleware(
            MiddlewareSet::default()
                .with_token(Token::new("letmein"))
                .with_block(Block::default())
                .with_limit(Limit::default()),
        )
        .get(
            "/stats",
            Operation::new("stats", |_req, _args| async {
                Ok(Outcome::Json(json!({"status": "running"})))
            }),
        );
    app.include_router(admin, "");

    app.serve(config).await
}
