//! Process-wide capture buffer pool.
//!
//! Section captures are frequent and buffers can grow to the megabyte cap,
//! so the daemon reuses them instead of reallocating per section. The pool
//! is an explicit object with its own lock — created at daemon start, torn
//! down at shutdown — not global state. Callers must not retain references
//! into a buffer after returning it.

use crate::buffer::{CaptureBuffer, DEFAULT_SIZE_LIMIT};
use std::sync::Mutex;
use tracing::trace;

/// Buffers kept alive beyond this many are dropped on release.
const DEFAULT_MAX_POOLED: usize = 8;

/// Pool of reusable [`CaptureBuffer`]s.
#[derive(Debug)]
pub struct BufferPool {
    buffer_limit: usize,
    max_pooled: usize,
    free: Mutex<Vec<CaptureBuffer>>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self::with_limits(DEFAULT_SIZE_LIMIT, DEFAULT_MAX_POOLED)
    }

    /// `buffer_limit` is the per-buffer size cap; `max_pooled` bounds how
    /// many idle buffers are retained.
    pub fn with_limits(buffer_limit: usize, max_pooled: usize) -> Self {
        Self {
            buffer_limit,
            max_pooled,
            free: Mutex::new(Vec::new()),
        }
    }

    /// Take a reset buffer from the pool, or allocate a fresh one.
    pub fn acquire(&self) -> CaptureBuffer {
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        match free.pop() {
            Some(buf) => buf,
            None => CaptureBuffer::with_limit(self.buffer_limit),
        }
    }

    /// Return a buffer for reuse. The buffer is reset; past `max_pooled`
    /// it is simply dropped.
    pub fn release(&self, mut buf: CaptureBuffer) {
        buf.reset();
        let mut free = self.free.lock().unwrap_or_else(|e| e.into_inner());
        if free.len() < self.max_pooled {
            free.push(buf);
        } else {
            trace!("buffer pool full, dropping buffer");
        }
    }

    /// Number of idle buffers currently pooled.
    pub fn idle_count(&self) -> usize {
        self.free.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for BufferPool {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_acquire_release_reuses() {
        let pool = BufferPool::with_limits(1024, 2);
        let mut buf = pool.acquire();
        buf.write_all(b"leftovers").unwrap();
        pool.release(buf);
        assert_eq!(pool.idle_count(), 1);

        let buf = pool.acquire();
        assert!(buf.is_empty());
        assert_eq!(pool.idle_count(), 0);
    }

    #[test]
    fn test_pool_bounds_idle_buffers() {
        let pool = BufferPool::with_limits(1024, 1);
        let a = pool.acquire();
        let b = pool.acquire();
        pool.release(a);
        pool.release(b);
        assert_eq!(pool.idle_count(), 1);
    }

    #[test]
    fn test_acquired_buffer_has_pool_limit() {
        let pool = BufferPool::with_limits(77, 1);
        assert_eq!(pool.acquire().limit(), 77);
    }
}
