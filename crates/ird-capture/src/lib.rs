//! Deadline-bounded section capture.
//!
//! Diagnostic sections come from sources that cannot be trusted to finish:
//! files that never hit EOF, commands that hang, blocking system calls that
//! stall. Everything in this crate is built around one rule — a capture
//! always comes back by its deadline, carrying whatever bytes it managed to
//! collect plus `timed_out`/`truncated` flags. Timeouts and truncation are
//! soft outcomes, not errors; partial diagnostic data is still useful.
//!
//! Components:
//! - [`CaptureBuffer`] — growable, capped byte buffer with `fill` (poll a
//!   readable fd until EOF/cap/deadline) and `pump` (feed a transform
//!   child while draining its output).
//! - [`BufferPool`] — process-wide buffer reuse.
//! - [`SectionSource`] — the strategy capability; file, command, and
//!   worker-thread variants.
//! - [`WorkerPool`] — deadline-awaitable handles for blocking producers.
//! - [`SectionPipeline`] — runs one source under its deadline and hands
//!   the buffer onward.

pub mod buffer;
pub mod error;
pub mod pipeline;
pub mod pool;
pub mod source;
pub mod worker;

pub use buffer::CaptureBuffer;
pub use error::{CaptureError, Result};
pub use pipeline::SectionPipeline;
pub use pool::BufferPool;
pub use source::{CommandSource, FileSource, SectionSource, WorkerSource};
pub use worker::{TaskHandle, WorkerPool};
