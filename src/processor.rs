//! Application assembly.
//!
//! A [`Processor`] owns the pieces an application registers at startup and
//! turns them into one [`Router`], stacked outermost first:
//!
//! ```text
//! Recovery ─▶ HttpLogger (log-all only) ─▶ filters ─▶ component routes
//! ```
//!
//! Component routes are mounted under `neve.web.server.contextPath`.

use std::sync::Arc;

use crate::buffer::{BufferPool, PoolConfig, SharedPool};
use crate::config::Properties;
use crate::error::Error;
use crate::middleware::loghttp::HttpLogger;
use crate::middleware::recovery::{PanicHandler, Recovery};
use crate::middleware::{BoxedMiddleware, Middleware};
use crate::router::Router;
use crate::server::{Server, ServerConfig};

/// A group of routes registered together.
///
/// ```rust
/// use http::StatusCode;
/// use neve_web::{Component, Context, Router};
///
/// struct Users;
///
/// impl Component for Users {
///     fn http_routes(&self, router: Router) -> Router {
///         router.get("/users/{id}", |ctx: &mut Context| ctx.text(StatusCode::OK, "alice"))
///     }
/// }
/// ```
pub trait Component: Send + Sync {
    fn http_routes(&self, router: Router) -> Router;
}

pub struct Processor {
    server: ServerConfig,
    pool: SharedPool,
    http_logger: HttpLogger,
    log_all: bool,
    panic_handler: Option<PanicHandler>,
    filters: Vec<BoxedMiddleware>,
    components: Vec<Box<dyn Component>>,
}

impl Processor {
    /// Reads the server, buffer and logging settings from `props`.
    ///
    /// The HTTP logger is built from `neve.web.log.*` but only wraps every
    /// route once [`with_http_logger`](Processor::with_http_logger) asks for
    /// it; otherwise components attach [`http_logger`](Processor::http_logger)
    /// to the routes they choose.
    pub fn from_properties(props: &impl Properties) -> Result<Self, Error> {
        let pool = BufferPool::shared(PoolConfig::from_properties(props)?)?;
        Ok(Self {
            server: ServerConfig::from_properties(props)?,
            http_logger: HttpLogger::from_properties(props, Arc::clone(&pool))?,
            pool,
            log_all: false,
            panic_handler: None,
            filters: Vec::new(),
            components: Vec::new(),
        })
    }

    /// Replaces the callback run after a panic was recovered.
    pub fn with_panic_handler(mut self, handler: PanicHandler) -> Self {
        self.panic_handler = Some(handler);
        self
    }

    /// Replaces the HTTP logger. With `all`, it wraps every route.
    pub fn with_http_logger(mut self, logger: HttpLogger, all: bool) -> Self {
        self.http_logger = logger;
        self.log_all = all;
        self
    }

    /// Adds a middleware that runs for every route, after recovery and
    /// logging.
    pub fn add_filter(mut self, filter: impl Middleware) -> Self {
        self.filters.push(filter.boxed());
        self
    }

    pub fn add_component(mut self, component: impl Component + 'static) -> Self {
        self.components.push(Box::new(component));
        self
    }

    /// The configured logger, for attaching to individual routes with
    /// [`Router::on_with`].
    pub fn http_logger(&self) -> &HttpLogger {
        &self.http_logger
    }

    pub fn pool(&self) -> &SharedPool {
        &self.pool
    }

    pub fn server_config(&self) -> &ServerConfig {
        &self.server
    }

    /// Assembles the router.
    pub fn router(&self) -> Router {
        let recovery = match &self.panic_handler {
            Some(handler) => Recovery::with_handler(Arc::clone(handler)),
            None => Recovery::new(),
        };
        let mut router = Router::new().layer(recovery);
        if self.log_all {
            router = router.layer(self.http_logger.clone());
        }
        for filter in &self.filters {
            router = router.layer_boxed(Arc::clone(filter));
        }
        router = router.prefix(&self.server.context_path);
        self.components.iter().fold(router, |router, component| component.http_routes(router))
    }

    /// Builds the router and serves it on the configured address until
    /// SIGTERM or Ctrl-C.
    pub async fn serve(self) -> Result<(), Error> {
        let router = self.router();
        Server::from_config(&self.server).serve(router).await
    }
}

impl std::fmt::Debug for Processor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Processor")
            .field("server", &self.server)
            .field("http_logger", &self.http_logger)
            .field("log_all", &self.log_all)
            .field("filters", &self.filters.len())
            .field("components", &self.components.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;

    use http::{Method, StatusCode};
    use http_body_util::BodyExt;
    use parking_lot::Mutex;

    use super::*;
    use crate::config::MapProperties;
    use crate::context::Context;
    use crate::middleware::Next;
    use crate::request::Request;

    struct Users;

    impl Component for Users {
        fn http_routes(&self, router: Router) -> Router {
            router
                .get("/users/{id}", |ctx: &mut Context| {
                    let id = ctx.param("id").unwrap_or_default().to_owned();
                    ctx.text(StatusCode::OK, &id);
                })
                .get("/explode", |_: &mut Context| explode())
        }
    }

    fn explode() {
        panic!("component failure");
    }

    fn request(uri: &str) -> Request {
        Request::from_http(
            http::Request::builder().method(Method::GET).uri(uri).body("").unwrap(),
            "127.0.0.1:1".parse().unwrap(),
        )
    }

    #[tokio::test]
    async fn components_mount_under_the_context_path() {
        let props = MapProperties::new().set(crate::server::CONTEXT_PATH_KEY, "/api");
        let router = Processor::from_properties(&props).unwrap().add_component(Users).router();

        let response = router.dispatch(request("/api/users/5"));
        assert_eq!(response.status(), StatusCode::OK);
        let body = response.into_body().collect().await.unwrap().to_bytes();
        assert_eq!(body, "5");

        assert_eq!(router.dispatch(request("/users/5")).status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn recovery_is_always_installed() {
        let seen = Arc::new(Mutex::new(None));
        let out = Arc::clone(&seen);
        let router = Processor::from_properties(&MapProperties::new())
            .unwrap()
            .with_panic_handler(Arc::new(move |_: &mut Context, payload: &(dyn Any + Send)| {
                *out.lock() = Some(crate::middleware::recovery::panic_message(payload).to_owned());
            }))
            .add_component(Users)
            .router();

        let response = router.dispatch(request("/explode"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(seen.lock().as_deref(), Some("component failure"));
    }

    #[test]
    fn filters_run_for_every_route() {
        let router = Processor::from_properties(&MapProperties::new())
            .unwrap()
            .add_filter(|ctx: &mut Context, next: Next<'_>| {
                if ctx.request().header("x-token").is_none() {
                    ctx.set_status(StatusCode::UNAUTHORIZED);
                    return;
                }
                next.run(ctx);
            })
            .add_component(Users)
            .router();

        assert_eq!(router.dispatch(request("/users/1")).status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let props = MapProperties::new().set("neve.web.log.level", "loud");
        assert!(Processor::from_properties(&props).is_err());

        let props = MapProperties::new().set(PoolConfig::MAX_IDLE_KEY, "0");
        assert!(Processor::from_properties(&props).is_err());
    }
}
