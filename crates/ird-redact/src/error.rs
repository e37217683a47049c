//! Error types for redaction operations.

use thiserror::Error;

/// Errors that can occur while building policies or stripping wire data.
#[derive(Error, Debug)]
pub enum RedactError {
    /// Wire data violates protobuf framing invariants. Aborts only the
    /// current stripping pass.
    #[error("malformed wire input at byte {offset}: {detail}")]
    MalformedInput { offset: usize, detail: String },

    /// A destination writer failed; isolated to that destination.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A scrub pattern failed to compile.
    #[error("invalid scrub pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        source: regex::Error,
    },

    /// Policy children must be sorted ascending by field id.
    #[error("policy children of field {field_id} are not sorted ascending by field id")]
    UnsortedChildren { field_id: u32 },
}

impl RedactError {
    pub(crate) fn malformed(offset: usize, detail: impl Into<String>) -> Self {
        RedactError::MalformedInput {
            offset,
            detail: detail.into(),
        }
    }
}

/// Result type alias for redaction operations.
pub type Result<T> = std::result::Result<T, RedactError>;
