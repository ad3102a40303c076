//! Request/response logging.
//!
//! [`HttpLogger`] writes two lines per request through `tracing`, target
//! `neve_web::http`:
//!
//! ```text
//! [Request  9f0c…] [path]: /users/7 , [method]: POST , [client ip]: 10.0.0.7 , [params]: [id=7] , [query]: page=2 , [data]: {"name":"x"}
//! [Response 9f0c…] [path]: /users/7 , [method]: POST , [latency]: 3 ms, [status]: 201 , [data]: {"id":7}
//! ```
//!
//! Headers and bodies are opt-in per direction. Bodies are teed through
//! [`RequestCapture`] / [`ResponseCapture`] into pooled buffers while the
//! handler runs, so the handler sees its streams untouched and the logger pays
//! no allocation once the pool is warm. Both lines are written after the
//! handler returns, when the request capture holds whatever the handler read.
//! If the handler panics, the request line is still written before the panic
//! continues outward; the response line is left to whoever recovers.

use std::fmt;
use std::io::{self, Write};
use std::panic::{self, AssertUnwindSafe};
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::HeaderMap;
use uuid::Uuid;

use super::{Middleware, Next};
use crate::buffer::{PooledStream, SharedPool};
use crate::capture::{CaptureBuffer, RequestCapture, ResponseCapture};
use crate::config::Properties;
use crate::context::Context;
use crate::error::Error;

pub const LOG_TARGET: &str = "neve_web::http";

pub const REQUEST_HEADER_KEY: &str = "neve.web.log.requestHeader";
pub const REQUEST_BODY_KEY: &str = "neve.web.log.requestBody";
pub const RESPONSE_HEADER_KEY: &str = "neve.web.log.responseHeader";
pub const RESPONSE_BODY_KEY: &str = "neve.web.log.responseBody";
pub const LEVEL_KEY: &str = "neve.web.log.level";

// ── LogLevel ──────────────────────────────────────────────────────────────────

/// Level the two log lines are emitted at.
///
/// `tracing` stops at `ERROR`, so `Panic` and `Fatal` are accepted for
/// configuration compatibility and logged as errors. Neither aborts anything.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum LogLevel {
    Debug,
    #[default]
    Info,
    Warn,
    Error,
    Panic,
    Fatal,
}

impl LogLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info  => "info",
            Self::Warn  => "warn",
            Self::Error => "error",
            Self::Panic => "panic",
            Self::Fatal => "fatal",
        }
    }
}

impl FromStr for LogLevel {
    type Err = Error;

    /// Case-insensitive. An empty string is `Info`.
    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "info" => Ok(Self::Info),
            "debug" => Ok(Self::Debug),
            "warn" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            "panic" => Ok(Self::Panic),
            "fatal" => Ok(Self::Fatal),
            other => Err(Error::config(LEVEL_KEY, format!("unknown log level `{other}`"))),
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `tracing` needs the level at the call site, hence one arm per level.
macro_rules! emit {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            LogLevel::Debug => tracing::debug!(target: LOG_TARGET, $($arg)+),
            LogLevel::Info => tracing::info!(target: LOG_TARGET, $($arg)+),
            LogLevel::Warn => tracing::warn!(target: LOG_TARGET, $($arg)+),
            LogLevel::Error | LogLevel::Panic | LogLevel::Fatal => {
                tracing::error!(target: LOG_TARGET, $($arg)+)
            }
        }
    };
}

// ── LogOptions ────────────────────────────────────────────────────────────────

/// What the logger records beyond the request line and status.
///
/// The default logs neither headers nor bodies, at `info`.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct LogOptions {
    pub request_header: bool,
    pub request_body: bool,
    pub response_header: bool,
    pub response_body: bool,
    pub level: LogLevel,
}

impl LogOptions {
    /// Headers and bodies in both directions, at `info`.
    pub fn all() -> Self {
        Self {
            request_header: true,
            request_body: true,
            response_header: true,
            response_body: true,
            level: LogLevel::Info,
        }
    }

    /// Reads the `neve.web.log.*` keys. Unset flags are off.
    pub fn from_properties(props: &impl Properties) -> Result<Self, Error> {
        Ok(Self {
            request_header: props.bool_or(REQUEST_HEADER_KEY, false)?,
            request_body: props.bool_or(REQUEST_BODY_KEY, false)?,
            response_header: props.bool_or(RESPONSE_HEADER_KEY, false)?,
            response_body: props.bool_or(RESPONSE_BODY_KEY, false)?,
            level: props.get(LEVEL_KEY).as_deref().unwrap_or("").parse()?,
        })
    }
}

// ── RequestId ─────────────────────────────────────────────────────────────────

/// Correlates the request and response lines of one exchange.
///
/// Stored in the request extensions, so handlers can read it with
/// `ctx.request().extensions().get::<RequestId>()`.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct RequestId(Uuid);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self { Self::new() }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.simple())
    }
}

// ── HttpLogger ────────────────────────────────────────────────────────────────

/// Logging middleware. Cheap to clone; clones share the buffer pool.
#[derive(Clone)]
pub struct HttpLogger {
    options: LogOptions,
    pool: SharedPool,
}

impl HttpLogger {
    pub fn new(pool: SharedPool, options: LogOptions) -> Self {
        Self { options, pool }
    }

    pub fn from_properties(props: &impl Properties, pool: SharedPool) -> Result<Self, Error> {
        Ok(Self::new(pool, LogOptions::from_properties(props)?))
    }

    /// A copy of this logger with adjusted options, sharing the same pool.
    ///
    /// ```rust
    /// # use neve_web::buffer::{BufferPool, PoolConfig};
    /// # use neve_web::middleware::loghttp::{HttpLogger, LogLevel, LogOptions};
    /// # let pool = BufferPool::shared(PoolConfig::default()).unwrap();
    /// let quiet = HttpLogger::new(pool, LogOptions::all()).with(|o| {
    ///     o.response_body = false;
    ///     o.level = LogLevel::Debug;
    /// });
    /// assert!(!quiet.options().response_body);
    /// ```
    pub fn with(&self, adjust: impl FnOnce(&mut LogOptions)) -> Self {
        let mut options = self.options;
        adjust(&mut options);
        Self { options, pool: Arc::clone(&self.pool) }
    }

    pub fn options(&self) -> &LogOptions {
        &self.options
    }

    fn request_line(
        &self,
        ctx: &Context,
        id: RequestId,
        body: Option<&CaptureBuffer>,
    ) -> io::Result<PooledStream> {
        let req = ctx.request();
        let mut line = PooledStream::new(Arc::clone(&self.pool));
        write!(
            line,
            "[Request  {id}] [path]: {} , [method]: {} , [client ip]: {}",
            req.path(),
            req.method(),
            req.client_ip(),
        )?;
        if self.options.request_header {
            line.write_all(b" , [header]: ")?;
            write_headers(&mut line, req.headers())?;
        }

        let mut params: Vec<_> = req.params().iter().collect();
        params.sort();
        line.write_all(b" , [params]: [")?;
        for (i, (k, v)) in params.into_iter().enumerate() {
            let sep = if i == 0 { "" } else { " " };
            write!(line, "{sep}{k}={v}")?;
        }
        write!(line, "] , [query]: {}", req.query())?;

        if let Some(body) = body {
            line.write_all(b" , [data]: ")?;
            body.write_into(&mut line)?;
        }
        Ok(line)
    }

    fn response_line(
        &self,
        ctx: &Context,
        id: RequestId,
        latency: Duration,
        body: Option<&CaptureBuffer>,
    ) -> io::Result<PooledStream> {
        let req = ctx.request();
        let writer = ctx.writer();
        let mut line = PooledStream::new(Arc::clone(&self.pool));
        write!(
            line,
            "[Response {id}] [path]: {} , [method]: {} , [latency]: {} ms, [status]: {}",
            req.path(),
            req.method(),
            latency.as_millis(),
            writer.status().as_u16(),
        )?;
        if self.options.response_header {
            line.write_all(b" , [header]: ")?;
            write_headers(&mut line, writer.headers())?;
        }
        if let Some(body) = body {
            line.write_all(b" , [data]: ")?;
            body.write_into(&mut line)?;
        }
        Ok(line)
    }

    fn log(&self, id: RequestId, line: io::Result<PooledStream>) {
        match line {
            Ok(line) => {
                emit!(self.options.level, request_id = %id, "{}", String::from_utf8_lossy(line.contents()))
            }
            Err(err) => tracing::warn!(target: LOG_TARGET, request_id = %id, error = %err, "failed to render log line"),
        }
    }
}

impl fmt::Debug for HttpLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpLogger").field("options", &self.options).finish_non_exhaustive()
    }
}

impl Middleware for HttpLogger {
    fn handle(&self, ctx: &mut Context, next: Next<'_>) {
        let start = Instant::now();
        let id = RequestId::new();
        ctx.request_mut().extensions_mut().insert(id);

        let mut captures = Captures::default();
        if self.options.request_body {
            let capture = CaptureBuffer::new(Arc::clone(&self.pool));
            let tee = capture.clone();
            ctx.request_mut().map_body(|body| Box::new(RequestCapture::new(body, tee)));
            captures.request = Some(capture);
        }
        if self.options.response_body {
            let capture = CaptureBuffer::new(Arc::clone(&self.pool));
            let tee = capture.clone();
            ctx.map_writer(|writer| Box::new(ResponseCapture::new(writer, tee)));
            captures.response = Some(capture);
        }

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| next.run(ctx)));
        let latency = start.elapsed();

        // The request line goes out even when the handler panicked.
        self.log(id, self.request_line(ctx, id, captures.request.as_ref()));
        if let Err(payload) = outcome {
            drop(captures);
            panic::resume_unwind(payload);
        }
        self.log(id, self.response_line(ctx, id, latency, captures.response.as_ref()));
    }
}

/// Releases the capture buffers on every exit path, unwinding included.
///
/// The wrappers themselves stay installed on the context; once released they
/// keep forwarding and stop recording.
#[derive(Default)]
struct Captures {
    request: Option<CaptureBuffer>,
    response: Option<CaptureBuffer>,
}

impl Drop for Captures {
    fn drop(&mut self) {
        for capture in [&self.request, &self.response].into_iter().flatten() {
            capture.release();
        }
    }
}

/// `name=v1,v2 name2=v3`, sorted by name.
fn write_headers(out: &mut PooledStream, headers: &HeaderMap) -> io::Result<()> {
    let mut names: Vec<_> = headers.keys().collect();
    names.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    for (i, name) in names.into_iter().enumerate() {
        if i > 0 {
            out.write_all(b" ")?;
        }
        write!(out, "{name}=")?;
        for (j, value) in headers.get_all(name).iter().enumerate() {
            if j > 0 {
                out.write_all(b",")?;
            }
            out.write_all(value.as_bytes())?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::{self, Read};
    use std::panic::{self, AssertUnwindSafe};

    use http::StatusCode;
    use parking_lot::Mutex;

    use super::*;
    use crate::buffer::{BufferPool, PoolConfig};
    use crate::config::MapProperties;
    use crate::handler::Handler;
    use crate::request::Request;

    #[derive(Clone, Default)]
    struct LogSink(Arc<Mutex<Vec<u8>>>);

    impl io::Write for LogSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl LogSink {
        fn contents(&self) -> String {
            String::from_utf8_lossy(&self.0.lock()).into_owned()
        }
    }

    fn with_logs(f: impl FnOnce()) -> String {
        let sink = LogSink::default();
        let writer = sink.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_ansi(false)
            .with_writer(move || writer.clone())
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        sink.contents()
    }

    fn pool() -> Arc<BufferPool> {
        Arc::new(BufferPool::new(PoolConfig::default()).unwrap())
    }

    fn run(logger: &HttpLogger, req: http::Request<&'static str>, handler: impl Handler) -> Context {
        let mut ctx = Context::new(Request::from_http(req, "192.0.2.10:5000".parse().unwrap()));
        let chain = vec![logger.clone().boxed()];
        let endpoint = handler.into_boxed_handler();
        Next::new(&chain, &*endpoint).run(&mut ctx);
        ctx
    }

    fn echo(ctx: &mut Context) {
        let body = ctx.request_mut().read_body().unwrap();
        ctx.data(StatusCode::OK, crate::ContentType::Text, &body);
    }

    fn explode(_: &mut Context) {
        panic!("boom");
    }

    #[test]
    fn level_parsing() {
        assert_eq!("".parse::<LogLevel>().unwrap(), LogLevel::Info);
        assert_eq!("WARN".parse::<LogLevel>().unwrap(), LogLevel::Warn);
        assert_eq!("fatal".parse::<LogLevel>().unwrap(), LogLevel::Fatal);
        let err = "loud".parse::<LogLevel>().unwrap_err();
        assert!(err.to_string().contains(LEVEL_KEY));
    }

    #[test]
    fn options_from_properties() {
        let props = MapProperties::new()
            .set(REQUEST_BODY_KEY, "true")
            .set(RESPONSE_HEADER_KEY, "on")
            .set(LEVEL_KEY, "debug");
        let options = LogOptions::from_properties(&props).unwrap();
        assert!(options.request_body && options.response_header);
        assert!(!options.request_header && !options.response_body);
        assert_eq!(options.level, LogLevel::Debug);

        assert_eq!(LogOptions::from_properties(&MapProperties::new()).unwrap(), LogOptions::default());
    }

    #[test]
    fn request_body_is_logged_when_enabled() {
        let logger = HttpLogger::new(pool(), LogOptions { request_body: true, ..LogOptions::default() });
        let logs = with_logs(|| {
            let ctx = run(&logger, http::Request::post("/echo?x=1").body("abc").unwrap(), echo);
            assert_eq!(ctx.writer().size(), 3);
        });

        let request = logs.lines().find(|l| l.contains("[Request  ")).unwrap();
        assert!(request.contains("[path]: /echo"), "{request}");
        assert!(request.contains("[method]: POST"), "{request}");
        assert!(request.contains("[client ip]: 192.0.2.10"), "{request}");
        assert!(request.contains("[query]: x=1"), "{request}");
        assert!(request.contains("[data]: abc"), "{request}");

        let response = logs.lines().find(|l| l.contains("[Response ")).unwrap();
        assert!(response.contains("[status]: 200"), "{response}");
        assert!(!response.contains("[data]"), "{response}");
    }

    #[test]
    fn bodies_are_not_logged_when_disabled() {
        let logger = HttpLogger::new(pool(), LogOptions::default());
        let logs = with_logs(|| {
            run(&logger, http::Request::post("/echo").body("abc").unwrap(), echo);
        });
        assert!(logs.contains("[Request  "));
        assert!(!logs.contains("[data]"), "{logs}");
        assert!(!logs.contains("[header]"), "{logs}");
    }

    #[test]
    fn both_lines_share_the_request_id() {
        let logger = HttpLogger::new(pool(), LogOptions::default());
        let logs = with_logs(|| {
            let ctx = run(&logger, http::Request::get("/").body("").unwrap(), |_: &mut Context| {});
            assert!(ctx.request().extensions().get::<RequestId>().is_some());
        });
        let ids: Vec<&str> = logs
            .lines()
            .filter_map(|l| l.split("[Request  ").nth(1).or_else(|| l.split("[Response ").nth(1)))
            .map(|rest| &rest[..32])
            .collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(ids[0], ids[1]);
    }

    #[test]
    fn headers_and_response_body_are_rendered() {
        let logger = HttpLogger::new(pool(), LogOptions::all());
        let handler = |ctx: &mut Context| {
            ctx.set_header("x-b", "2");
            ctx.set_header("x-a", "1");
            ctx.json(StatusCode::CREATED, &serde_json::json!({ "ok": true }));
        };
        let req = http::Request::get("/h").header("x-token", "t").body("").unwrap();
        let logs = with_logs(|| {
            run(&logger, req, handler);
        });

        let request = logs.lines().find(|l| l.contains("[Request  ")).unwrap();
        assert!(request.contains("[header]: x-token=t"), "{request}");

        let response = logs.lines().find(|l| l.contains("[Response ")).unwrap();
        assert!(response.contains("[status]: 201"), "{response}");
        assert!(response.contains("[header]: content-type=application/json x-a=1 x-b=2"), "{response}");
        assert!(response.contains(r#"[data]: {"ok":true}"#), "{response}");
    }

    #[test]
    fn handler_sees_the_body_unchanged() {
        let logger = HttpLogger::new(pool(), LogOptions::all());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let out = Arc::clone(&seen);
        let handler = move |ctx: &mut Context| {
            let mut chunk = [0u8; 2];
            let n = ctx.request_mut().body_mut().read(&mut chunk).unwrap();
            out.lock().extend_from_slice(&chunk[..n]);
        };
        let logs = with_logs(|| {
            run(&logger, http::Request::post("/").body("abcdef").unwrap(), handler);
        });
        assert_eq!(*seen.lock(), b"ab");

        // Only what the handler read is captured.
        let request = logs.lines().find(|l| l.contains("[Request  ")).unwrap();
        let data = request.split("[data]: ").nth(1).and_then(|rest| rest.split_whitespace().next());
        assert_eq!(data, Some("ab"), "{request}");
    }

    #[test]
    fn buffers_are_reused_across_requests() {
        let pool = pool();
        let logger = HttpLogger::new(pool.clone(), LogOptions::all());
        with_logs(|| {
            run(&logger, http::Request::post("/").body("abc").unwrap(), echo);
        });
        let allocated = pool.stats().allocated;
        with_logs(|| {
            run(&logger, http::Request::post("/").body("abc").unwrap(), echo);
        });
        assert_eq!(pool.stats().allocated, allocated);
        assert_eq!(pool.idle(), allocated);
    }

    #[test]
    fn captures_are_released_when_the_handler_panics() {
        let pool = pool();
        let logger = HttpLogger::new(pool.clone(), LogOptions::all());
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            run(&logger, http::Request::post("/").body("abc").unwrap(), explode);
        }));
        assert!(result.is_err());
        assert_eq!(pool.idle(), pool.stats().allocated);
    }

    fn read_then_explode(ctx: &mut Context) {
        let _ = ctx.request_mut().read_body();
        panic!("boom");
    }

    #[test]
    fn request_line_survives_a_panicking_handler() {
        let logger = HttpLogger::new(pool(), LogOptions::all());
        let logs = with_logs(|| {
            let mut ctx = Context::new(Request::from_http(
                http::Request::post("/fail").body("abc").unwrap(),
                "192.0.2.10:5000".parse().unwrap(),
            ));
            let chain = vec![crate::middleware::recovery::Recovery::new().boxed(), logger.clone().boxed()];
            let endpoint = read_then_explode.into_boxed_handler();
            Next::new(&chain, &*endpoint).run(&mut ctx);
            assert_eq!(ctx.writer().status(), StatusCode::INTERNAL_SERVER_ERROR);
        });

        let request = logs.lines().find(|l| l.contains("[Request  ")).unwrap_or_else(|| panic!("{logs}"));
        assert!(request.contains("[path]: /fail"), "{request}");
        assert!(request.contains("[data]: abc"), "{request}");
        assert!(logs.contains("recovered from panic"), "{logs}");
        assert!(!logs.contains("[Response "), "{logs}");
    }
}
