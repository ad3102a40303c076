//! Middleware layer.
//!
//! A middleware sees the [`Context`] before the handler runs, decides whether
//! (and when) to continue by calling [`Next::run`], and sees the context again
//! once the rest of the chain has returned:
//!
//! ```text
//! Recovery ─▶ HttpLogger ─▶ user filters ─▶ handler
//!    ◀──────────   ◀──────────   ◀──────────   ◀┘
//! ```
//!
//! Any `Fn(&mut Context, Next<'_>)` is a middleware:
//!
//! ```rust
//! use neve_web::{Context, Router};
//! use neve_web::middleware::Next;
//!
//! fn require_token(ctx: &mut Context, next: Next<'_>) {
//!     if ctx.request().header("x-token").is_none() {
//!         ctx.set_status(http::StatusCode::UNAUTHORIZED);
//!         return;
//!     }
//!     next.run(ctx);
//! }
//!
//! let router = Router::new()
//!     .layer(require_token)
//!     .get("/", |ctx: &mut Context| ctx.text(http::StatusCode::OK, "hi"));
//! ```
//!
//! Built in:
//! - [`recovery::Recovery`] turns handler panics into a fixed 500 response
//! - [`loghttp::HttpLogger`] logs every request and response, optionally with
//!   headers and bodies

pub mod loghttp;
pub mod recovery;

use std::sync::Arc;

use crate::context::Context;
use crate::handler::ErasedHandler;

/// One stage of the request chain.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, ctx: &mut Context, next: Next<'_>);

    fn boxed(self) -> BoxedMiddleware
    where
        Self: Sized,
    {
        Arc::new(self)
    }
}

impl<F> Middleware for F
where
    F: Fn(&mut Context, Next<'_>) + Send + Sync + 'static,
{
    fn handle(&self, ctx: &mut Context, next: Next<'_>) {
        self(ctx, next)
    }
}

/// A type-erased middleware shared by every route it was registered for.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// The remainder of the chain after the current middleware.
///
/// Consumed by [`run`](Next::run), so a middleware continues at most once.
/// Dropping it without running short-circuits the request; whatever the
/// middleware wrote to the context is the response.
pub struct Next<'a> {
    chain: &'a [BoxedMiddleware],
    endpoint: &'a (dyn ErasedHandler + Send + Sync),
}

impl<'a> Next<'a> {
    pub(crate) fn new(chain: &'a [BoxedMiddleware], endpoint: &'a (dyn ErasedHandler + Send + Sync)) -> Self {
        Self { chain, endpoint }
    }

    /// Runs the rest of the chain, ending with the handler.
    pub fn run(self, ctx: &mut Context) {
        match self.chain.split_first() {
            Some((head, rest)) => head.handle(ctx, Next { chain: rest, endpoint: self.endpoint }),
            None => self.endpoint.call(ctx),
        }
    }
}

impl std::fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next").field("remaining", &self.chain.len()).finish_non_exhaustive()
    }
}
