//! Pooled byte buffers.
//!
//! Logging request and response bodies means copying bytes on every request.
//! [`BufferPool`] keeps a bounded set of `BytesMut` buffers around so those
//! copies reuse memory instead of allocating; [`PooledStream`] wraps one pooled
//! buffer as a `Read + Write` handle that gives it back exactly once.
//!
//! ```rust
//! use std::io::{Read, Write};
//! use std::sync::Arc;
//! use neve_web::buffer::{BufferPool, PoolConfig, PooledStream, SharedPool};
//!
//! let pool: SharedPool = Arc::new(BufferPool::new(PoolConfig::default()).unwrap());
//!
//! let mut stream = PooledStream::new(Arc::clone(&pool));
//! stream.write_all(b"hello").unwrap();
//! assert_eq!(stream.contents(), b"hello");
//!
//! let mut out = String::new();
//! stream.read_to_string(&mut out).unwrap();
//! assert_eq!(out, "hello");
//!
//! stream.close(); // back to the pool; dropping would do the same
//! ```

mod pool;
mod stream;

pub use pool::{BufferPool, Pool, PoolConfig, PoolStats, SharedPool};
pub use stream::{BodyReader, ContentLength, PooledStream};
