//! Size-bounded buffer pool.
//!
//! # Eviction
//!
//! Two limits keep the pool from retaining memory it should not:
//!
//! - A buffer whose length exceeds `max_size` is dropped on [`Pool::put`]
//!   instead of being recycled. A handful of huge bodies therefore never pin
//!   huge allocations for the lifetime of the process.
//! - At most `max_idle` buffers sit in the pool. Surplus returns are dropped.
//!
//! Oversized buffers are dropped, not shrunk.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use bytes::BytesMut;
use crossbeam::queue::ArrayQueue;

use crate::config::Properties;
use crate::error::Error;

/// Default capacity reserved for a freshly allocated buffer.
pub const INITIAL_BUFFER_SIZE: usize = 1024;

/// Default length above which a returned buffer is dropped.
pub const MAX_BUFFER_SIZE: usize = 4096;

/// Default number of idle buffers the pool retains.
pub const MAX_IDLE_BUFFERS: usize = 256;

/// A reuse cache for byte buffers.
///
/// Implementations must be safe to call from any number of threads at once.
/// A buffer handed out by [`get`](Pool::get) belongs to the caller alone until
/// it comes back through [`put`](Pool::put).
pub trait Pool: Send + Sync {
    /// Returns an empty buffer, ready to be written from offset zero.
    fn get(&self) -> BytesMut;

    /// Offers a buffer back for reuse. The pool may drop it instead.
    fn put(&self, buf: BytesMut);
}

/// The pool handle passed to every component that needs buffers.
pub type SharedPool = Arc<dyn Pool>;

// ── PoolConfig ────────────────────────────────────────────────────────────────

/// Settings for [`BufferPool`].
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct PoolConfig {
    /// Capacity reserved for freshly allocated buffers.
    pub initial_size: usize,
    /// Buffers longer than this are dropped on return.
    pub max_size: usize,
    /// Upper bound on idle buffers kept for reuse.
    pub max_idle: usize,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            initial_size: INITIAL_BUFFER_SIZE,
            max_size: MAX_BUFFER_SIZE,
            max_idle: MAX_IDLE_BUFFERS,
        }
    }
}

impl PoolConfig {
    pub const INITIAL_SIZE_KEY: &'static str = "neve.web.buffer.initialSize";
    pub const MAX_SIZE_KEY: &'static str = "neve.web.buffer.maxSize";
    pub const MAX_IDLE_KEY: &'static str = "neve.web.buffer.maxIdle";

    /// Reads the pool settings, falling back to the defaults for unset keys.
    pub fn from_properties(props: &impl Properties) -> Result<Self, Error> {
        let defaults = Self::default();
        Ok(Self {
            initial_size: props.parse_or(Self::INITIAL_SIZE_KEY, defaults.initial_size)?,
            max_size: props.parse_or(Self::MAX_SIZE_KEY, defaults.max_size)?,
            max_idle: props.parse_or(Self::MAX_IDLE_KEY, defaults.max_idle)?,
        })
    }

    fn validate(&self) -> Result<(), Error> {
        if self.initial_size > self.max_size {
            return Err(Error::config(
                Self::INITIAL_SIZE_KEY,
                format!("initial size {} exceeds max size {}", self.initial_size, self.max_size),
            ));
        }
        if self.max_idle == 0 {
            return Err(Error::config(Self::MAX_IDLE_KEY, "must be at least 1"));
        }
        Ok(())
    }
}

// ── PoolStats ─────────────────────────────────────────────────────────────────

/// Snapshot of pool activity.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    /// Buffers currently waiting for reuse.
    pub idle: usize,
    /// Buffers allocated because the pool was empty.
    pub allocated: usize,
    /// Returns that went back into the pool.
    pub recycled: usize,
    /// Returns that were dropped (oversized or pool full).
    pub discarded: usize,
}

// ── BufferPool ────────────────────────────────────────────────────────────────

/// Lock-free [`Pool`] backed by a bounded `crossbeam` queue.
///
/// # Example
///
/// ```rust
/// use neve_web::buffer::{BufferPool, Pool, PoolConfig};
///
/// let pool = BufferPool::new(PoolConfig { initial_size: 64, max_size: 128, max_idle: 4 }).unwrap();
///
/// let mut buf = pool.get();
/// buf.extend_from_slice(&[0u8; 256]);
/// pool.put(buf); // too long, dropped
///
/// assert_eq!(pool.idle(), 0);
/// assert_eq!(pool.stats().discarded, 1);
/// ```
pub struct BufferPool {
    idle: ArrayQueue<BytesMut>,
    config: PoolConfig,
    allocated: AtomicUsize,
    recycled: AtomicUsize,
    discarded: AtomicUsize,
}

impl BufferPool {
    pub fn new(config: PoolConfig) -> Result<Self, Error> {
        config.validate()?;
        Ok(Self {
            idle: ArrayQueue::new(config.max_idle),
            config,
            allocated: AtomicUsize::new(0),
            recycled: AtomicUsize::new(0),
            discarded: AtomicUsize::new(0),
        })
    }

    /// Convenience for `Arc::new(BufferPool::new(config)?)` as a [`SharedPool`].
    pub fn shared(config: PoolConfig) -> Result<SharedPool, Error> {
        Ok(Arc::new(Self::new(config)?))
    }

    pub fn config(&self) -> PoolConfig {
        self.config
    }

    /// Number of buffers currently waiting for reuse.
    pub fn idle(&self) -> usize {
        self.idle.len()
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats {
            idle: self.idle.len(),
            allocated: self.allocated.load(Ordering::Relaxed),
            recycled: self.recycled.load(Ordering::Relaxed),
            discarded: self.discarded.load(Ordering::Relaxed),
        }
    }
}

impl Pool for BufferPool {
    fn get(&self) -> BytesMut {
        match self.idle.pop() {
            Some(mut buf) => {
                buf.clear();
                buf
            }
            None => {
                self.allocated.fetch_add(1, Ordering::Relaxed);
                BytesMut::with_capacity(self.config.initial_size)
            }
        }
    }

    fn put(&self, buf: BytesMut) {
        if buf.len() > self.config.max_size {
            self.discarded.fetch_add(1, Ordering::Relaxed);
            return;
        }
        match self.idle.push(buf) {
            Ok(()) => {
                self.recycled.fetch_add(1, Ordering::Relaxed);
            }
            Err(_full) => {
                self.discarded.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
