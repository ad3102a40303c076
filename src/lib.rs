//! # neve-web
//!
//! HTTP request/response logging, panic recovery and pooled buffers for a
//! minimal hyper-based web framework.
//!
//! ## What's here
//!
//! - [`HttpLogger`](middleware::loghttp::HttpLogger) logs each exchange,
//!   optionally with headers and bodies. Bodies are teed into pooled buffers
//!   while the handler streams them.
//! - [`Recovery`](middleware::recovery::Recovery) turns a handler panic into
//!   `{"code":-1,"message":"internal error"}` with status 500.
//! - [`BufferPool`](buffer::BufferPool) recycles `BytesMut` buffers up to a
//!   size limit; [`PooledStream`](buffer::PooledStream) borrows one as a
//!   `Read + Write` handle and gives it back exactly once.
//!
//! Around those sits the host: a radix-tree [`Router`], a per-request
//! [`Context`], a hyper [`Server`] with graceful shutdown, key-value
//! [`config`], and a [`Processor`] that wires it all together.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use http::StatusCode;
//! use neve_web::config::MapProperties;
//! use neve_web::{ApiResult, Component, Context, Processor, Router};
//!
//! struct Users;
//!
//! impl Component for Users {
//!     fn http_routes(&self, router: Router) -> Router {
//!         router.get("/users/{id}", get_user).post("/users", create_user)
//!     }
//! }
//!
//! fn get_user(ctx: &mut Context) {
//!     let id = ctx.param("id").unwrap_or("unknown").to_owned();
//!     ctx.json(StatusCode::OK, &ApiResult::ok(serde_json::json!({ "id": id })));
//! }
//!
//! fn create_user(ctx: &mut Context) {
//!     match ctx.request_mut().read_body() {
//!         Ok(body) if !body.is_empty() => ctx.set_status(StatusCode::CREATED),
//!         _ => ctx.set_status(StatusCode::BAD_REQUEST),
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), neve_web::Error> {
//!     let props = MapProperties::new()
//!         .set("neve.web.server.port", "3000")
//!         .set("neve.web.log.requestBody", "true");
//!
//!     let processor = Processor::from_properties(&props)?.add_component(Users);
//!     let logger = processor.http_logger().clone();
//!     processor.with_http_logger(logger, true).serve().await
//! }
//! ```

mod context;
mod error;
mod handler;
mod processor;
mod request;
mod response;
mod router;
mod server;

pub mod buffer;
pub mod capture;
pub mod config;
pub mod middleware;
pub mod result;

pub use context::Context;
pub use error::Error;
pub use handler::Handler;
pub use middleware::{Middleware, Next};
pub use processor::{Component, Processor};
pub use request::{Body, Request};
pub use response::{BufferedResponse, ContentType, HttpResponse, ResponseWriter};
pub use result::ApiResult;
pub use router::Router;
pub use server::{Server, ServerConfig};
