//! Per-request context shared by middleware and the final handler.

use std::io::Write;

use http::header::CONTENT_TYPE;
use http::{HeaderValue, StatusCode};
use serde::Serialize;
use tracing::warn;

use crate::request::Request;
use crate::response::{BufferedResponse, ContentType, HttpResponse, ResponseWriter};
use crate::result::ApiResult;

/// Everything one request needs on its way through the chain: the inbound
/// [`Request`] and the outbound [`ResponseWriter`].
///
/// Middleware may decorate either side before calling
/// [`Next::run`](crate::middleware::Next::run); the handler at the end of the
/// chain only sees the decorated streams.
pub struct Context {
    request: Request,
    writer: Box<dyn ResponseWriter>,
}

impl Context {
    /// A context that collects its response in memory.
    pub fn new(request: Request) -> Self {
        Self::with_writer(request, Box::new(BufferedResponse::new()))
    }

    pub fn with_writer(request: Request, writer: Box<dyn ResponseWriter>) -> Self {
        Self { request, writer }
    }

    pub fn request(&self) -> &Request { &self.request }
    pub fn request_mut(&mut self) -> &mut Request { &mut self.request }
    pub fn writer(&self) -> &dyn ResponseWriter { &*self.writer }
    pub fn writer_mut(&mut self) -> &mut dyn ResponseWriter { &mut *self.writer }

    /// Shortcut for `ctx.request().param(key)`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.request.param(key)
    }

    /// Replaces the response writer with `f(current)`.
    pub fn map_writer(&mut self, f: impl FnOnce(Box<dyn ResponseWriter>) -> Box<dyn ResponseWriter>) {
        let writer = std::mem::replace(&mut self.writer, Box::new(BufferedResponse::new()));
        self.writer = f(writer);
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.writer.set_status(status);
    }

    /// Sets a response header. Invalid values are logged and skipped.
    pub fn set_header(&mut self, name: &'static str, value: &str) {
        match HeaderValue::from_str(value) {
            Ok(value) => {
                self.writer.headers_mut().insert(name, value);
            }
            Err(_) => warn!(header = name, "dropping invalid response header value"),
        }
    }

    /// Writes a body with the given status and content type.
    pub fn data(&mut self, status: StatusCode, content_type: ContentType, body: &[u8]) {
        self.writer.set_status(status);
        self.writer
            .headers_mut()
            .insert(CONTENT_TYPE, HeaderValue::from_static(content_type.as_str()));
        if let Err(e) = self.writer.write_all(body) {
            warn!(path = self.request.path(), "response write failed: {e}");
        }
    }

    /// `text/plain` body.
    pub fn text(&mut self, status: StatusCode, body: &str) {
        self.data(status, ContentType::Text, body.as_bytes());
    }

    /// JSON body. Serialization failures become a bare 500.
    pub fn json<T: Serialize + ?Sized>(&mut self, status: StatusCode, value: &T) {
        match serde_json::to_vec(value) {
            Ok(bytes) => self.data(status, ContentType::Json, &bytes),
            Err(e) => {
                warn!(path = self.request.path(), "json serialization failed: {e}");
                self.writer.set_status(StatusCode::INTERNAL_SERVER_ERROR);
            }
        }
    }

    /// Writes `result` as JSON with its own HTTP status.
    pub fn abort_with_json(&mut self, result: &ApiResult) {
        self.json(result.http_status(), result);
    }

    /// Finishes the request and produces the response for the client.
    pub fn into_response(self) -> HttpResponse {
        self.writer.into_response()
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("request", &self.request)
            .field("status", &self.writer.status())
            .finish_non_exhaustive()
    }
}
