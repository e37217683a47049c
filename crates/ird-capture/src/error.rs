//! Error types for capture operations.
//!
//! Timeouts and truncation are deliberately absent: they are flags on
//! [`crate::CaptureBuffer`], not failures.

use thiserror::Error;

/// Errors that can occur while capturing a section.
#[derive(Error, Debug)]
pub enum CaptureError {
    /// A file descriptor operation failed hard.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Buffer growth was refused by the allocator.
    #[error("buffer allocation failed for {requested} additional bytes")]
    NoMemory { requested: usize },

    /// The worker pool has shut down and cannot take new tasks.
    #[error("worker pool is shut down")]
    WorkerUnavailable,

    /// A one-shot source was asked to produce twice.
    #[error("collection source already consumed")]
    SourceConsumed,
}

/// Result type alias for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;
