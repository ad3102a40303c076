//! HTTP server and graceful shutdown.
//!
//! Connections are served by hyper on the tokio runtime. Each request body is
//! collected in full, up to [`ServerConfig::max_body_size`] (larger bodies are
//! answered with 413), then the router runs the middleware chain and handler on
//! tokio's blocking pool, where handlers may use plain `std::io` calls.
//!
//! # Graceful shutdown
//!
//! On SIGTERM (or Ctrl-C) the server:
//! 1. Stops `listener.accept()` immediately; no new connections are made.
//! 2. Lets every in-flight connection task run to completion.
//! 3. Returns from [`Server::serve`], which lets `main` exit cleanly.
//!
//! [`Server::serve_with_shutdown`] takes any future as the signal instead.

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use http::StatusCode;
use http_body_util::{BodyExt, LengthLimitError, Limited};
use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use crate::config::Properties;
use crate::error::Error;
use crate::request::Request;
use crate::response::{HttpResponse, bare};
use crate::router::Router;

pub const HOST_KEY: &str = "neve.web.server.host";
pub const PORT_KEY: &str = "neve.web.server.port";
pub const CONTEXT_PATH_KEY: &str = "neve.web.server.contextPath";
pub const MAX_BODY_SIZE_KEY: &str = "neve.web.server.maxBodySize";

/// 2 MiB.
pub const DEFAULT_MAX_BODY_SIZE: usize = 2 * 1024 * 1024;

/// Listen address and mount point, read from `neve.web.server.*`.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Prefix every component route is mounted under. Empty for none.
    pub context_path: String,
    /// Largest request body accepted, in bytes.
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 8080,
            context_path: String::new(),
            max_body_size: DEFAULT_MAX_BODY_SIZE,
        }
    }
}

impl ServerConfig {
    pub fn from_properties(props: &impl Properties) -> Result<Self, Error> {
        let defaults = Self::default();
        Ok(Self {
            host: props.string_or(HOST_KEY, &defaults.host),
            port: props.parse_or(PORT_KEY, defaults.port)?,
            context_path: props.string_or(CONTEXT_PATH_KEY, ""),
            max_body_size: props.parse_or(MAX_BODY_SIZE_KEY, defaults.max_body_size)?,
        })
    }

    /// `host:port`.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

enum Bind {
    Addr(String),
    Listener(TcpListener),
}

/// The HTTP server.
pub struct Server {
    bind: Bind,
    max_body_size: usize,
}

impl Server {
    /// Configures the server to bind to `addr` when [`serve`](Server::serve)
    /// is called. Anything tokio can resolve works: `0.0.0.0:3000`,
    /// `localhost:8080`. Resolution and bind failures surface from `serve`.
    ///
    /// ```rust,no_run
    /// use neve_web::Server;
    /// let server = Server::bind("0.0.0.0:3000");
    /// ```
    pub fn bind(addr: impl Into<String>) -> Self {
        Self { bind: Bind::Addr(addr.into()), max_body_size: DEFAULT_MAX_BODY_SIZE }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::bind(config.addr()).max_body_size(config.max_body_size)
    }

    /// Serves on an already bound listener, e.g. one on port 0.
    pub fn from_listener(listener: TcpListener) -> Self {
        Self { bind: Bind::Listener(listener), max_body_size: DEFAULT_MAX_BODY_SIZE }
    }

    /// Caps request bodies at `limit` bytes; anything larger gets a 413.
    pub fn max_body_size(mut self, limit: usize) -> Self {
        self.max_body_size = limit;
        self
    }

    /// Starts accepting connections and dispatching them through `router`.
    ///
    /// Returns only after a full graceful shutdown (SIGTERM or Ctrl-C,
    /// followed by all in-flight requests completing).
    pub async fn serve(self, router: Router) -> Result<(), Error> {
        self.serve_with_shutdown(router, shutdown_signal()).await
    }

    /// Like [`serve`](Server::serve), stopping when `signal` resolves.
    pub async fn serve_with_shutdown(
        self,
        router: Router,
        signal: impl Future<Output = ()> + Send,
    ) -> Result<(), Error> {
        let listener = match self.bind {
            Bind::Addr(addr) => TcpListener::bind(addr.as_str()).await?,
            Bind::Listener(listener) => listener,
        };
        let local = listener.local_addr()?;
        let router = Arc::new(router);
        let limit = self.max_body_size;

        info!(addr = %local, "neve-web listening");

        // Tracks every connection task so shutdown can wait for them.
        let mut tasks = tokio::task::JoinSet::new();

        tokio::pin!(signal);

        loop {
            tokio::select! {
                // Check shutdown first so a signal stops accepting at once,
                // even with connections queued.
                biased;

                () = &mut signal => {
                    info!(in_flight = tasks.len(), "shutdown signal received, draining connections");
                    break;
                }

                res = listener.accept() => {
                    let (stream, remote_addr) = match res {
                        Ok(v) => v,
                        Err(e) => {
                            error!("accept error: {e}");
                            continue;
                        }
                    };

                    let router = Arc::clone(&router);
                    let io = TokioIo::new(stream);

                    tasks.spawn(async move {
                        // Called once per request on the connection.
                        let svc = service_fn(move |req| {
                            let router = Arc::clone(&router);
                            async move { dispatch(router, req, remote_addr, limit).await }
                        });

                        // HTTP/1.1 or HTTP/2, whatever the client negotiates.
                        if let Err(e) = ConnBuilder::new(TokioExecutor::new())
                            .serve_connection(io, svc)
                            .await
                        {
                            error!(peer = %remote_addr, "connection error: {e}");
                        }
                    });
                }

                // Reap finished connection tasks.
                Some(_) = tasks.join_next(), if !tasks.is_empty() => {}
            }
        }

        while tasks.join_next().await.is_some() {}

        info!("neve-web stopped");
        Ok(())
    }
}

// ── Request dispatch ──────────────────────────────────────────────────────────

/// Routes one request and produces one response. Failures become status
/// codes, so hyper never sees an error.
async fn dispatch(
    router: Arc<Router>,
    req: hyper::Request<Incoming>,
    remote_addr: SocketAddr,
    limit: usize,
) -> Result<HttpResponse, Infallible> {
    let (parts, body) = req.into_parts();
    let body = match Limited::new(body, limit).collect().await {
        Ok(collected) => collected.to_bytes(),
        Err(e) if e.is::<LengthLimitError>() => {
            warn!(peer = %remote_addr, limit, "request body too large");
            return Ok(bare(StatusCode::PAYLOAD_TOO_LARGE));
        }
        Err(e) => {
            warn!(peer = %remote_addr, "failed to read request body: {e}");
            return Ok(bare(StatusCode::BAD_REQUEST));
        }
    };

    let request = Request::from_parts(parts, body, remote_addr);
    match tokio::task::spawn_blocking(move || router.dispatch(request)).await {
        Ok(response) => Ok(response),
        // A handler panicked with no Recovery in front of it.
        Err(e) => {
            error!(peer = %remote_addr, "request task failed: {e}");
            Ok(bare(StatusCode::INTERNAL_SERVER_ERROR))
        }
    }
}

// ── Shutdown signal ───────────────────────────────────────────────────────────

/// Resolves on the first SIGTERM or Ctrl-C. On Windows only Ctrl-C is
/// available. A handler that cannot be installed is logged and never fires.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}
