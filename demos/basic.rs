//! Minimal neve-web example: JSON endpoints with request/response logging
//! and panic recovery.
//!
//! Run with:
//!   cargo run --example basic
//!
//! Try:
//!   curl http://localhost:3000/api/users/42
//!   curl -X POST http://localhost:3000/api/users -d '{"name":"alice"}'
//!   curl http://localhost:3000/api/panic
//!
//! Settings can also come from the environment, e.g.
//!   NEVE_WEB_LOG_RESPONSEHEADER=true cargo run --example basic

use std::any::Any;
use std::sync::Arc;

use http::StatusCode;
use neve_web::config::{EnvProperties, MapProperties, Properties};
use neve_web::{ApiResult, Component, Context, Processor, Router};

struct Users;

impl Component for Users {
    fn http_routes(&self, router: Router) -> Router {
        router
            .get("/users/{id}", get_user)
            .post("/users", create_user)
            .get("/panic", |_: &mut Context| explode())
    }
}

// GET /api/users/{id}
fn get_user(ctx: &mut Context) {
    let id = ctx.param("id").unwrap_or("unknown").to_owned();
    ctx.json(StatusCode::OK, &ApiResult::ok(serde_json::json!({ "id": id, "name": "alice" })));
}

// POST /api/users
fn create_user(ctx: &mut Context) {
    let body = match ctx.request_mut().read_body() {
        Ok(body) => body,
        Err(_) => return ctx.set_status(StatusCode::BAD_REQUEST),
    };
    match serde_json::from_slice::<serde_json::Value>(&body) {
        Ok(user) => {
            ctx.set_header("location", "/api/users/99");
            ctx.json(StatusCode::CREATED, &ApiResult::ok(user));
        }
        Err(_) => ctx.abort_with_json(
            &ApiResult::internal_error()
                .with_message("malformed user")
                .with_http_status(StatusCode::BAD_REQUEST),
        ),
    }
}

// GET /api/panic → 500 {"code":-1,"message":"internal error"}
fn explode() {
    panic!("something went wrong");
}

/// Environment first, then the built-in defaults below.
struct Layered(EnvProperties, MapProperties);

impl Properties for Layered {
    fn get(&self, key: &str) -> Option<String> {
        self.0.get(key).or_else(|| self.1.get(key))
    }
}

#[tokio::main]
async fn main() -> Result<(), neve_web::Error> {
    tracing_subscriber::fmt::init();

    let defaults = MapProperties::new()
        .set("neve.web.server.port", "3000")
        .set("neve.web.server.contextPath", "/api")
        .set("neve.web.log.requestBody", "true")
        .set("neve.web.log.responseBody", "true");
    let props = Layered(EnvProperties, defaults);

    let processor = Processor::from_properties(&props)?
        .with_panic_handler(Arc::new(|ctx: &mut Context, _: &(dyn Any + Send)| {
            tracing::warn!(path = ctx.request().path(), "panic handled");
        }))
        .add_component(Users);
    let logger = processor.http_logger().clone();

    processor.with_http_logger(logger, true).serve().await
}
