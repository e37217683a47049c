//! Error types for store operations.

use thiserror::Error;

/// Errors that can occur during report store operations.
#[derive(Error, Debug)]
pub enum StoreError {
    /// File operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Envelope serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The work directory failed its integrity check. Fatal to the store;
    /// no writes are attempted.
    #[error("work directory '{dir}' refused: {detail}")]
    PermissionDenied { dir: String, detail: String },

    /// No report with the given timestamp.
    #[error("report {timestamp_ns} not found")]
    NotFound { timestamp_ns: u64 },

    /// No such identity registered on the report.
    #[error("identity '{identity}' not registered on report {timestamp_ns}")]
    IdentityNotFound {
        timestamp_ns: u64,
        identity: String,
    },

    /// Envelope or data failed validation; the pair is unrecoverable.
    #[error("corrupt report pair: {0}")]
    CorruptEnvelope(String),

    /// Redaction failed while serving stored data.
    #[error(transparent)]
    Redact(#[from] ird_redact::RedactError),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
