//! The outbound side of a request: status, headers and a body sink.
//!
//! Handlers never build a response value. They write into the
//! [`ResponseWriter`] held by their [`Context`](crate::Context), and the
//! middleware in front of them may have swapped that writer for a decorator
//! (see [`ResponseCapture`](crate::capture::ResponseCapture)). The server asks
//! the outermost writer for the finished response once the chain returns.

use std::io::{self, Write};

use bytes::{Bytes, BytesMut};
use http::{HeaderMap, StatusCode};
use http_body_util::Full;

/// The response type handed to hyper.
pub type HttpResponse = http::Response<Full<Bytes>>;

// ── ContentType ───────────────────────────────────────────────────────────────

/// Common content-type values for [`Context::data`](crate::Context::data).
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ContentType {
    Html,        // text/html; charset=utf-8
    Json,        // application/json
    OctetStream, // application/octet-stream
    Text,        // text/plain; charset=utf-8
    Xml,         // application/xml
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Html        => "text/html; charset=utf-8",
            Self::Json        => "application/json",
            Self::OctetStream => "application/octet-stream",
            Self::Text        => "text/plain; charset=utf-8",
            Self::Xml         => "application/xml",
        }
    }
}

// ── ResponseWriter ────────────────────────────────────────────────────────────

/// The outbound byte sink plus the status and headers that go with it.
///
/// `write` comes from [`std::io::Write`]; `write_str` is the string shortcut.
/// Decorators must forward every call to the writer they wrap.
pub trait ResponseWriter: Write + Send {
    fn status(&self) -> StatusCode;

    fn set_status(&mut self, status: StatusCode);

    fn headers(&self) -> &HeaderMap;

    fn headers_mut(&mut self) -> &mut HeaderMap;

    /// Number of body bytes written so far.
    fn size(&self) -> usize;

    fn write_str(&mut self, s: &str) -> io::Result<usize> {
        self.write(s.as_bytes())
    }

    /// Consumes the writer and produces the response sent to the client.
    fn into_response(self: Box<Self>) -> HttpResponse;
}

impl ResponseWriter for Box<dyn ResponseWriter> {
    fn status(&self) -> StatusCode {
        (**self).status()
    }

    fn set_status(&mut self, status: StatusCode) {
        (**self).set_status(status);
    }

    fn headers(&self) -> &HeaderMap {
        (**self).headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        (**self).headers_mut()
    }

    fn size(&self) -> usize {
        (**self).size()
    }

    fn write_str(&mut self, s: &str) -> io::Result<usize> {
        (**self).write_str(s)
    }

    fn into_response(self: Box<Self>) -> HttpResponse {
        <dyn ResponseWriter>::into_response(*self)
    }
}

// ── BufferedResponse ──────────────────────────────────────────────────────────

/// The writer every request starts with: collects the body in memory.
///
/// Defaults to `200 OK` with no headers, matching what a handler that never
/// touches the writer would send.
#[derive(Debug)]
pub struct BufferedResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: BytesMut,
}

impl BufferedResponse {
    pub fn new() -> Self {
        Self { status: StatusCode::OK, headers: HeaderMap::new(), body: BytesMut::new() }
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }
}

impl Default for BufferedResponse {
    fn default() -> Self { Self::new() }
}

impl Write for BufferedResponse {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.body.extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResponseWriter for BufferedResponse {
    fn status(&self) -> StatusCode { self.status }

    fn set_status(&mut self, status: StatusCode) { self.status = status; }

    fn headers(&self) -> &HeaderMap { &self.headers }

    fn headers_mut(&mut self) -> &mut HeaderMap { &mut self.headers }

    fn size(&self) -> usize { self.body.len() }

    fn into_response(self: Box<Self>) -> HttpResponse {
        let this = *self;
        let mut response = http::Response::new(Full::new(this.body.freeze()));
        *response.status_mut() = this.status;
        *response.headers_mut() = this.headers;
        response
    }
}

/// A body-less response with the given status, for failures that happen
/// before or outside the middleware chain.
pub(crate) fn bare(status: StatusCode) -> HttpResponse {
    let mut response = http::Response::new(Full::new(Bytes::new()));
    *response.status_mut() = status;
    response
}
