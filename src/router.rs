//! Radix-tree request router.
//!
//! One tree per HTTP method, O(path-length) lookup. Each route stores the
//! middleware chain it runs behind, fixed at registration time: router-wide
//! layers added with [`Router::layer`] apply to the routes registered after
//! them, the way a gin engine's `Use` does.

use std::collections::HashMap;

use http::header::ALLOW;
use http::{HeaderValue, Method, StatusCode};
use matchit::Router as MatchitRouter;

use crate::context::Context;
use crate::handler::{BoxedHandler, ErasedHandler, Handler};
use crate::middleware::{BoxedMiddleware, Middleware, Next};
use crate::request::Request;
use crate::response::HttpResponse;

struct Route {
    chain: Vec<BoxedMiddleware>,
    handler: BoxedHandler,
}

/// The application router.
///
/// Build it once at startup and pass it to [`Server::serve`](crate::Server::serve).
/// Every registration returns `self`, so calls chain naturally.
pub struct Router {
    routes: HashMap<Method, MatchitRouter<Route>>,
    layers: Vec<BoxedMiddleware>,
    prefix: String,
}

impl Router {
    pub fn new() -> Self {
        Self { routes: HashMap::new(), layers: Vec::new(), prefix: String::new() }
    }

    /// Adds a router-wide middleware.
    ///
    /// It wraps every route registered after this call, and the 404 / 405
    /// responses the router produces itself.
    pub fn layer(self, middleware: impl Middleware) -> Self {
        self.layer_boxed(middleware.boxed())
    }

    /// [`layer`](Router::layer) for an already shared middleware.
    pub fn layer_boxed(mut self, middleware: BoxedMiddleware) -> Self {
        self.layers.push(middleware);
        self
    }

    /// Mounts the routes registered after this call under `path`.
    ///
    /// `prefix("/api").get("/users", h)` serves `GET /api/users`. An empty
    /// path or `/` clears the prefix.
    pub fn prefix(mut self, path: &str) -> Self {
        let trimmed = path.trim().trim_end_matches('/');
        self.prefix = match trimmed {
            "" => String::new(),
            p if p.starts_with('/') => p.to_owned(),
            p => format!("/{p}"),
        };
        self
    }

    /// Register a handler for a method + path pair.
    ///
    /// Path parameters use `{name}` syntax and are read back with
    /// [`Context::param`]:
    ///
    /// ```rust
    /// use http::{Method, StatusCode};
    /// use neve_web::{Context, Router};
    ///
    /// fn get_user(ctx: &mut Context) {
    ///     let id = ctx.param("id").unwrap_or("unknown").to_owned();
    ///     ctx.text(StatusCode::OK, &id);
    /// }
    ///
    /// Router::new()
    ///     .on(Method::GET, "/users/{id}", get_user)
    ///     .on(Method::DELETE, "/users/{id}", |ctx: &mut Context| ctx.set_status(StatusCode::NO_CONTENT));
    /// ```
    ///
    /// # Panics
    ///
    /// Panics if the path is malformed or conflicts with a registered route.
    /// Routes are registered at startup, so this surfaces immediately.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.on_with(method, path, Vec::new(), handler)
    }

    /// Like [`on`](Router::on), with extra middleware that runs after the
    /// router-wide layers for this route only.
    pub fn on_with(
        mut self,
        method: Method,
        path: &str,
        middleware: impl IntoIterator<Item = BoxedMiddleware>,
        handler: impl Handler,
    ) -> Self {
        let full = format!("{}{}", self.prefix, path);
        let chain = self.layers.iter().cloned().chain(middleware).collect();
        self.routes
            .entry(method)
            .or_default()
            .insert(full.as_str(), Route { chain, handler: handler.into_boxed_handler() })
            .unwrap_or_else(|e| panic!("invalid route `{full}`: {e}"));
        self
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::GET, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::POST, path, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::PUT, path, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::DELETE, path, handler)
    }

    /// Routes one request through its middleware chain and handler.
    ///
    /// Blocking: handlers do synchronous I/O on the request body and the
    /// response writer. The server calls this on tokio's blocking pool.
    pub fn dispatch(&self, mut request: Request) -> HttpResponse {
        let found = self.routes.get(request.method()).and_then(|tree| tree.at(request.path()).ok());
        if let Some(matched) = found {
            let route = matched.value;
            let params = matched.params.iter().map(|(k, v)| (k.to_owned(), v.to_owned())).collect();
            request.params = params;
            return run(&route.chain, &*route.handler, request);
        }

        let fallback = match self.allowed(request.path()) {
            Some(allow) => Fallback { status: StatusCode::METHOD_NOT_ALLOWED, allow: Some(allow) },
            None => Fallback { status: StatusCode::NOT_FOUND, allow: None },
        };
        run(&self.layers, &fallback, request)
    }

    /// The `Allow` header for a path registered under other methods.
    fn allowed(&self, path: &str) -> Option<HeaderValue> {
        let mut methods: Vec<&str> = self
            .routes
            .iter()
            .filter(|(_, tree)| tree.at(path).is_ok())
            .map(|(method, _)| method.as_str())
            .collect();
        if methods.is_empty() {
            return None;
        }
        methods.sort_unstable();
        HeaderValue::from_str(&methods.join(", ")).ok()
    }
}

impl Default for Router {
    fn default() -> Self { Self::new() }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("methods", &self.routes.keys().collect::<Vec<_>>())
            .field("layers", &self.layers.len())
            .field("prefix", &self.prefix)
            .finish()
    }
}

fn run(chain: &[BoxedMiddleware], endpoint: &(dyn ErasedHandler + Send + Sync), request: Request) -> HttpResponse {
    let mut ctx = Context::new(request);
    Next::new(chain, endpoint).run(&mut ctx);
    ctx.into_response()
}

/// Endpoint for requests no route matched.
struct Fallback {
    status: StatusCode,
    allow: Option<HeaderValue>,
}

impl ErasedHandler for Fallback {
    fn call(&self, ctx: &mut Context) {
        ctx.set_status(self.status);
        if let Some(allow) = &self.allow {
            ctx.writer_mut().headers_mut().insert(ALLOW, allow.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use http_body_util::BodyExt;

    use super::*;

    fn request(method: Method, uri: &str) -> Request {
        Request::from_http(
            http::Request::builder().method(method).uri(uri).body("").unwrap(),
            "127.0.0.1:1".parse().unwrap(),
        )
    }

    async fn body(response: HttpResponse) -> String {
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    fn echo_id(ctx: &mut Context) {
        let id = ctx.param("id").unwrap_or_default().to_owned();
        ctx.text(StatusCode::OK, &id);
    }

    #[tokio::test]
    async fn params_are_extracted() {
        let router = Router::new().get("/users/{id}", echo_id);
        let response = router.dispatch(request(Method::GET, "/users/42"));
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body(response).await, "42");
    }

    #[test]
    fn unknown_path_is_404() {
        let router = Router::new().get("/users/{id}", echo_id);
        assert_eq!(router.dispatch(request(Method::GET, "/teams/1")).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn wrong_method_is_405_with_allow() {
        let router = Router::new()
            .get("/users/{id}", echo_id)
            .delete("/users/{id}", echo_id);
        let response = router.dispatch(request(Method::POST, "/users/1"));
        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        assert_eq!(response.headers()[ALLOW], "DELETE, GET");
    }

    #[test]
    fn prefix_applies_to_later_routes() {
        let router = Router::new()
            .get("/health", |ctx: &mut Context| ctx.set_status(StatusCode::NO_CONTENT))
            .prefix("api/")
            .get("/users/{id}", echo_id);

        assert_eq!(router.dispatch(request(Method::GET, "/health")).status(), StatusCode::NO_CONTENT);
        assert_eq!(router.dispatch(request(Method::GET, "/api/users/7")).status(), StatusCode::OK);
        assert_eq!(router.dispatch(request(Method::GET, "/users/7")).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn layers_wrap_later_routes_and_fallbacks() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let router = Router::new()
            .get("/before", echo_id)
            .layer(move |ctx: &mut Context, next: Next<'_>| {
                counter.fetch_add(1, Ordering::SeqCst);
                next.run(ctx);
            })
            .get("/after", echo_id);

        router.dispatch(request(Method::GET, "/before"));
        assert_eq!(hits.load(Ordering::SeqCst), 0);
        router.dispatch(request(Method::GET, "/after"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        router.dispatch(request(Method::GET, "/missing"));
        assert_eq!(hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn route_middleware_runs_after_layers() {
        let tag = |value: &'static str| {
            move |ctx: &mut Context, next: Next<'_>| {
                next.run(ctx);
                let seen = ctx.writer().headers().get("x-order").and_then(|v| v.to_str().ok()).unwrap_or("");
                let joined = format!("{seen}{value}");
                ctx.set_header("x-order", &joined);
            }
        };
        let router = Router::new()
            .layer(tag("outer"))
            .on_with(Method::GET, "/", [tag("inner,").boxed()], |_: &mut Context| {});

        let response = router.dispatch(request(Method::GET, "/"));
        assert_eq!(response.headers()["x-order"], "inner,outer");
    }

    #[test]
    #[should_panic(expected = "invalid route")]
    fn conflicting_routes_panic() {
        let _ = Router::new().get("/users/{id}", echo_id).get("/users/{name}", echo_id);
    }
}
