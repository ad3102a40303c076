//! Handler trait and type erasure.
//!
//! # How handlers are stored
//!
//! The router holds handlers of *different* types in one
//! `HashMap<Method, Tree>`, so every handler is hidden behind a trait object
//! (`dyn ErasedHandler`) and stored uniformly:
//!
//! ```text
//! fn hello(ctx: &mut Context) { … }        ← user writes this
//!        ↓ router.get("/", hello)
//! hello.into_boxed_handler()               ← Handler blanket impl
//!        ↓
//! Arc::new(FnHandler(hello))               ← heap-allocated wrapper
//!        ↓  stored as BoxedHandler = Arc<dyn ErasedHandler>
//! handler.call(&mut ctx)  at request time  ← one vtable dispatch
//! ```
//!
//! Handlers are plain functions. The server runs each request on tokio's
//! blocking pool, so a handler may read its body and write its response with
//! ordinary `std::io` calls.

use std::sync::Arc;

use crate::context::Context;

/// Internal dispatch interface.
///
/// `#[doc(hidden)] pub` because it appears in the return type of
/// [`Handler::into_boxed_handler`].
#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, ctx: &mut Context);
}

/// A type-erased handler shared across concurrent requests.
#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid route handler.
///
/// You never implement this yourself. It is satisfied by any function or
/// closure with the signature:
///
/// ```text
/// fn name(ctx: &mut Context)
/// ```
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F> private::Sealed for F where F: Fn(&mut Context) + Send + Sync + 'static {}

impl<F> Handler for F
where
    F: Fn(&mut Context) + Send + Sync + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

/// Bridges a concrete handler `F` to the trait-object world.
struct FnHandler<F>(F);

impl<F> ErasedHandler for FnHandler<F>
where
    F: Fn(&mut Context) + Send + Sync,
{
    fn call(&self, ctx: &mut Context) {
        (self.0)(ctx)
    }
}
