//! Error types for the broadcast workflow.

use thiserror::Error;

/// Errors that can occur while notifying consumers.
#[derive(Error, Debug)]
pub enum BroadcastError {
    /// The consent authority could not take the request.
    #[error("consent authority unavailable: {0}")]
    Authority(String),

    /// The crash-report sink rejected a delivery.
    #[error("crash report sink rejected delivery: {0}")]
    Sink(String),

    /// No consent record exists for the identity.
    #[error("no consent record for '{identity}'")]
    NotFound { identity: String },
}

/// Result type alias for broadcast operations.
pub type Result<T> = std::result::Result<T, BroadcastError>;
