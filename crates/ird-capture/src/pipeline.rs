//! Section collection pipeline.
//!
//! One `execute` call runs one strategy under its own timeout. Soft
//! outcomes (deadline, cap) travel on the returned buffer; only hard
//! source failures are errors, and they release the buffer back to the
//! pool before surfacing.

use crate::buffer::CaptureBuffer;
use crate::error::Result;
use crate::pool::BufferPool;
use crate::source::SectionSource;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Runs collection strategies against the shared buffer pool.
#[derive(Debug, Clone)]
pub struct SectionPipeline {
    pool: Arc<BufferPool>,
}

impl SectionPipeline {
    pub fn new(pool: Arc<BufferPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &Arc<BufferPool> {
        &self.pool
    }

    /// Run one strategy to completion or deadline.
    ///
    /// A timed-out or truncated capture is still a success; the caller
    /// checks the buffer's flags. The buffer must go back via
    /// [`Self::release`] when the caller is done with it.
    pub fn execute(
        &self,
        source: &mut dyn SectionSource,
        timeout: Duration,
    ) -> Result<CaptureBuffer> {
        let mut buf = self.pool.acquire();
        let deadline = Instant::now() + timeout;
        match source.produce(&mut buf, deadline) {
            Ok(()) => {
                info!(
                    source = %source.describe(),
                    bytes = buf.len(),
                    timed_out = buf.timed_out(),
                    truncated = buf.truncated(),
                    "section collected"
                );
                Ok(buf)
            }
            Err(e) => {
                warn!(source = %source.describe(), error = %e, "section collection failed");
                self.pool.release(buf);
                Err(e)
            }
        }
    }

    /// Return a buffer to the pool once every consumer is done with it.
    pub fn release(&self, buf: CaptureBuffer) {
        self.pool.release(buf);
    }
}
