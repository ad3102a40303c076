//! Read/write handles over pooled and in-memory bytes.

use std::io::{self, Read, Write};

use bytes::{Bytes, BytesMut};

use super::pool::SharedPool;

/// Streams that know how many bytes they still hold.
pub trait ContentLength {
    fn content_length(&self) -> u64;
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum StreamState {
    Open,
    Released,
}

// ── PooledStream ──────────────────────────────────────────────────────────────

/// A `Read + Write` handle backed by a buffer borrowed from a [`Pool`].
///
/// Writes append; reads consume from a cursor that trails the writes.
/// [`close`](PooledStream::close) hands the buffer back to the pool, and only
/// the first call does anything. `Drop` closes too, so the buffer is returned
/// on every exit path.
///
/// Once closed, the stream no longer owns a buffer: reads and writes fail with
/// an I/O error and [`contents`](PooledStream::contents) is empty.
///
/// [`Pool`]: super::Pool
pub struct PooledStream {
    pool: SharedPool,
    buf: BytesMut,
    read_pos: usize,
    state: StreamState,
}

impl PooledStream {
    pub fn new(pool: SharedPool) -> Self {
        let buf = pool.get();
        Self { pool, buf, read_pos: 0, state: StreamState::Open }
    }

    /// Unread content, without consuming it. Until something is read this is
    /// everything written so far.
    pub fn contents(&self) -> &[u8] {
        &self.buf[self.read_pos..]
    }

    /// Appends `data`. Does nothing once the stream is released.
    pub fn append(&mut self, data: &[u8]) {
        if self.state == StreamState::Open {
            self.buf.extend_from_slice(data);
        }
    }

    pub fn len(&self) -> usize {
        self.buf.len() - self.read_pos
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_released(&self) -> bool {
        self.state == StreamState::Released
    }

    /// Returns the buffer to the pool. Safe to call any number of times.
    pub fn close(&mut self) {
        if self.state == StreamState::Released {
            return;
        }
        self.state = StreamState::Released;
        self.read_pos = 0;
        let buf = std::mem::take(&mut self.buf);
        self.pool.put(buf);
    }

    fn ensure_open(&self) -> io::Result<()> {
        match self.state {
            StreamState::Open => Ok(()),
            StreamState::Released => Err(io::Error::other("pooled stream already released")),
        }
    }
}

impl Read for PooledStream {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.ensure_open()?;
        let unread = &self.buf[self.read_pos..];
        let n = unread.len().min(out.len());
        out[..n].copy_from_slice(&unread[..n]);
        self.read_pos += n;
        Ok(n)
    }
}

impl Write for PooledStream {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.ensure_open()?;
        self.append(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ContentLength for PooledStream {
    fn content_length(&self) -> u64 {
        self.len() as u64
    }
}

impl Drop for PooledStream {
    fn drop(&mut self) {
        self.close();
    }
}

impl std::fmt::Debug for PooledStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledStream")
            .field("len", &self.len())
            .field("state", &self.state)
            .finish()
    }
}

// ── BodyReader ────────────────────────────────────────────────────────────────

/// An in-memory request body. Reads drain the bytes; closing is a no-op.
#[derive(Debug)]
pub struct BodyReader {
    inner: io::Cursor<Bytes>,
    len: u64,
}

impl BodyReader {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        let bytes = bytes.into();
        let len = bytes.len() as u64;
        Self { inner: io::Cursor::new(bytes), len }
    }

    pub fn empty() -> Self {
        Self::new(Bytes::new())
    }
}

impl Read for BodyReader {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        self.inner.read(out)
    }
}

impl ContentLength for BodyReader {
    /// Total body length, as announced when the reader was built.
    fn content_length(&self) -> u64 {
        self.len
    }
}
