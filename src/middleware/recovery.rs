//! Panic recovery.
//!
//! [`Recovery`] runs the rest of the chain under
//! [`catch_unwind`](std::panic::catch_unwind). A panic anywhere below it is
//! logged, handed to the configured [`PanicHandler`], and answered with
//! `{"code":-1,"message":"internal error"}` and status 500. The worker thread
//! survives and the next request is served normally.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use super::{Middleware, Next};
use crate::context::Context;
use crate::response::BufferedResponse;
use crate::result::ApiResult;

/// Called with the context and the panic payload after a panic was caught,
/// before the internal-error response is written.
pub type PanicHandler = Arc<dyn Fn(&mut Context, &(dyn Any + Send)) + Send + Sync>;

#[derive(Clone, Default)]
pub struct Recovery {
    handler: Option<PanicHandler>,
}

impl Recovery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_handler(handler: PanicHandler) -> Self {
        Self { handler: Some(handler) }
    }
}

impl std::fmt::Debug for Recovery {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Recovery").field("handler", &self.handler.is_some()).finish()
    }
}

impl Middleware for Recovery {
    fn handle(&self, ctx: &mut Context, next: Next<'_>) {
        let Err(payload) = panic::catch_unwind(AssertUnwindSafe(|| next.run(ctx))) else {
            return;
        };

        error!(
            method = %ctx.request().method(),
            path = ctx.request().path(),
            "recovered from panic: {}",
            panic_message(&*payload),
        );

        // Whatever the handler wrote before panicking is discarded.
        ctx.map_writer(|_| Box::new(BufferedResponse::new()));
        if let Some(handler) = &self.handler {
            handler(ctx, &*payload);
        }
        ctx.abort_with_json(&ApiResult::internal_error());
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&'static str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s
    } else {
        "non-string panic payload"
    }
}
