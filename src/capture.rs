//! Tee wrappers that copy body bytes into a pooled side buffer.
//!
//! ```text
//! handler ── read ──▶ RequestCapture ── read ──▶ inbound body
//!                          │
//!                          └── append ──▶ CaptureBuffer ◀── HttpLogger reads after the handler
//!                          ┌── append ──▶ CaptureBuffer ◀──┘
//!                          │
//! handler ── write ─▶ ResponseCapture ── write ─▶ outbound writer
//! ```
//!
//! The wrappers only observe. Every call is forwarded to the wrapped stream
//! unchanged, and exactly the bytes the wrapped stream accepted (or produced)
//! are appended to the capture. Errors pass straight through; the capture then
//! holds whatever made it across before the failure.

use std::io::{self, Read, Write};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;

use crate::buffer::{PooledStream, SharedPool};
use crate::response::{HttpResponse, ResponseWriter};

const OPEN: u8 = 0;
const RELEASED: u8 = 1;

// ── CaptureBuffer ─────────────────────────────────────────────────────────────

/// A cloneable handle to one pooled side buffer.
///
/// One clone lives inside a wrapper, another stays with whoever installed the
/// wrapper so the bytes can be read once the handler is done.
/// [`release`](CaptureBuffer::release) returns the buffer to the pool; the
/// first caller wins, later calls and later appends are no-ops.
#[derive(Clone)]
pub struct CaptureBuffer {
    inner: Arc<CaptureInner>,
}

struct CaptureInner {
    state: AtomicU8,
    stream: Mutex<PooledStream>,
}

impl CaptureBuffer {
    pub fn new(pool: SharedPool) -> Self {
        Self {
            inner: Arc::new(CaptureInner {
                state: AtomicU8::new(OPEN),
                stream: Mutex::new(PooledStream::new(pool)),
            }),
        }
    }

    /// Appends `bytes`. Ignored once the buffer has been released.
    pub fn append(&self, bytes: &[u8]) {
        if bytes.is_empty() || self.is_released() {
            return;
        }
        self.inner.stream.lock().append(bytes);
    }

    pub fn len(&self) -> usize {
        self.inner.stream.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn to_vec(&self) -> Vec<u8> {
        self.inner.stream.lock().contents().to_vec()
    }

    /// Copies the captured bytes into `out` while holding the lock, without an
    /// intermediate allocation.
    pub fn write_into(&self, out: &mut impl Write) -> io::Result<()> {
        out.write_all(self.inner.stream.lock().contents())
    }

    /// The captured bytes as text, with invalid UTF-8 replaced.
    pub fn to_string_lossy(&self) -> String {
        String::from_utf8_lossy(self.inner.stream.lock().contents()).into_owned()
    }

    pub fn is_released(&self) -> bool {
        self.inner.state.load(Ordering::Acquire) == RELEASED
    }

    /// Returns the side buffer to its pool. Returns `true` for the call that
    /// actually released it.
    pub fn release(&self) -> bool {
        if self
            .inner
            .state
            .compare_exchange(OPEN, RELEASED, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }
        self.inner.stream.lock().close();
        true
    }
}

impl std::fmt::Debug for CaptureBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CaptureBuffer")
            .field("len", &self.len())
            .field("released", &self.is_released())
            .finish()
    }
}

// ── RequestCapture ────────────────────────────────────────────────────────────

/// Wraps an inbound body. Every byte a reader pulls through is also appended
/// to the capture.
pub struct RequestCapture<R> {
    inner: R,
    capture: CaptureBuffer,
}

impl<R: Read> RequestCapture<R> {
    pub fn new(inner: R, capture: CaptureBuffer) -> Self {
        Self { inner, capture }
    }

    pub fn capture(&self) -> &CaptureBuffer {
        &self.capture
    }

    /// Closes the wrapped source and releases the capture.
    pub fn close(self) {
        self.capture.release();
        drop(self.inner);
    }

    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: Read> Read for RequestCapture<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(out)?;
        self.capture.append(&out[..n]);
        Ok(n)
    }
}

// ── ResponseCapture ───────────────────────────────────────────────────────────

/// Wraps an outbound writer. Body bytes are forwarded first, then the part the
/// writer accepted is appended to the capture.
pub struct ResponseCapture<W> {
    inner: W,
    capture: CaptureBuffer,
}

impl<W: ResponseWriter> ResponseCapture<W> {
    pub fn new(inner: W, capture: CaptureBuffer) -> Self {
        Self { inner, capture }
    }

    pub fn capture(&self) -> &CaptureBuffer {
        &self.capture
    }

    pub fn into_parts(self) -> (W, CaptureBuffer) {
        (self.inner, self.capture)
    }
}

impl<W: ResponseWriter> Write for ResponseCapture<W> {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        let n = self.inner.write(data)?;
        self.capture.append(&data[..n]);
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: ResponseWriter + 'static> ResponseWriter for ResponseCapture<W> {
    fn status(&self) -> StatusCode {
        self.inner.status()
    }

    fn set_status(&mut self, status: StatusCode) {
        self.inner.set_status(status);
    }

    fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    fn headers_mut(&mut self) -> &mut HeaderMap {
        self.inner.headers_mut()
    }

    fn size(&self) -> usize {
        self.inner.size()
    }

    fn write_str(&mut self, s: &str) -> io::Result<usize> {
        let n = self.inner.write_str(s)?;
        self.capture.append(&s.as_bytes()[..n]);
        Ok(n)
    }

    fn into_response(self: Box<Self>) -> HttpResponse {
        Box::new(self.inner).into_response()
    }
}
