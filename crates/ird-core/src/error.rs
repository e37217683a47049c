//! Error type for the orchestration layer.

use thiserror::Error;

/// Errors surfaced by the incident service.
#[derive(Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Store(#[from] ird_store::StoreError),

    #[error(transparent)]
    Capture(#[from] ird_capture::CaptureError),

    #[error(transparent)]
    Redact(#[from] ird_redact::RedactError),

    #[error(transparent)]
    Broadcast(#[from] ird_broadcast::BroadcastError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("identity '{identity}' is not authorized to receive report {timestamp_ns}")]
    NotAuthorized {
        timestamp_ns: u64,
        identity: String,
    },
}

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, ServiceError>;
