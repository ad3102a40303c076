//! Incoming HTTP request type.

use std::collections::HashMap;
use std::io::{self, Read};
use std::net::{IpAddr, SocketAddr};

use bytes::Bytes;
use http::{Extensions, HeaderMap, Method, Uri};

use crate::buffer::BodyReader;

/// The inbound body stream. Middleware may replace it with a decorator.
pub type Body = Box<dyn Read + Send>;

/// An incoming HTTP request.
///
/// Everything except the body is parsed up front. The body is a stream so
/// middleware can interpose on it; [`read_body`](Request::read_body) drains
/// it in one go.
pub struct Request {
    pub(crate) method: Method,
    pub(crate) uri: Uri,
    pub(crate) headers: HeaderMap,
    pub(crate) extensions: Extensions,
    pub(crate) remote_addr: SocketAddr,
    pub(crate) params: HashMap<String, String>,
    pub(crate) body: Body,
}

impl Request {
    /// Builds a request from an `http::Request` with an in-memory body.
    ///
    /// ```rust
    /// use neve_web::Request;
    ///
    /// let req = Request::from_http(
    ///     http::Request::post("/users?page=2").body("abc").unwrap(),
    ///     "10.0.0.7:51000".parse().unwrap(),
    /// );
    /// assert_eq!(req.path(), "/users");
    /// assert_eq!(req.query(), "page=2");
    /// ```
    pub fn from_http<B: Into<Bytes>>(req: http::Request<B>, remote_addr: SocketAddr) -> Self {
        let (parts, body) = req.into_parts();
        Self::from_parts(parts, body.into(), remote_addr)
    }

    pub(crate) fn from_parts(parts: http::request::Parts, body: Bytes, remote_addr: SocketAddr) -> Self {
        Self {
            method: parts.method,
            uri: parts.uri,
            headers: parts.headers,
            extensions: parts.extensions,
            remote_addr,
            params: HashMap::new(),
            body: Box::new(BodyReader::new(body)),
        }
    }

    pub fn method(&self) -> &Method { &self.method }
    pub fn uri(&self) -> &Uri { &self.uri }
    pub fn path(&self) -> &str { self.uri.path() }
    pub fn query(&self) -> &str { self.uri.query().unwrap_or("") }
    pub fn headers(&self) -> &HeaderMap { &self.headers }
    pub fn remote_addr(&self) -> SocketAddr { self.remote_addr }
    pub fn extensions(&self) -> &Extensions { &self.extensions }
    pub fn extensions_mut(&mut self) -> &mut Extensions { &mut self.extensions }

    /// Case-insensitive header lookup. Non-UTF-8 values read as `None`.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Returns a named path parameter.
    ///
    /// For a route `/users/{id}`, `req.param("id")` on `/users/42` returns `Some("42")`.
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }

    pub fn params(&self) -> &HashMap<String, String> {
        &self.params
    }

    /// Best guess at the originating client.
    ///
    /// Behind a reverse proxy the peer address is the proxy, so the first
    /// `X-Forwarded-For` entry wins, then `X-Real-IP`, then the peer.
    pub fn client_ip(&self) -> IpAddr {
        let forwarded: Option<IpAddr> = self
            .header("x-forwarded-for")
            .and_then(|v| v.split(',').next())
            .and_then(|v| v.trim().parse().ok());
        let real = || -> Option<IpAddr> { self.header("x-real-ip").and_then(|v| v.trim().parse().ok()) };
        forwarded.or_else(real).unwrap_or_else(|| self.remote_addr.ip())
    }

    pub fn body_mut(&mut self) -> &mut (dyn Read + Send) {
        &mut *self.body
    }

    /// Reads the rest of the body into memory.
    pub fn read_body(&mut self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.body.read_to_end(&mut out)?;
        Ok(out)
    }

    /// Replaces the body stream with `f(current)`.
    pub fn map_body(&mut self, f: impl FnOnce(Body) -> Body) {
        let body = std::mem::replace(&mut self.body, Box::new(io::empty()));
        self.body = f(body);
    }
}

impl std::fmt::Debug for Request {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Request")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("remote_addr", &self.remote_addr)
            .finish_non_exhaustive()
    }
}
