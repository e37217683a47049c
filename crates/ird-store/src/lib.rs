//! Durable on-disk store for redacted incident reports.
//!
//! A report on disk is a timestamp-named pair: `<timestamp_ns>.envelope`
//! (JSON metadata: who asked, what tier was applied, completion state) and
//! `<timestamp_ns>.data` (the redacted section bytes). The pairing is
//! crash-safe: an envelope is either fully persisted or the whole pair is
//! deleted, and a pair that fails to load is removed rather than served
//! half-valid.
//!
//! [`WorkDirectory`] owns the directory, serializes every mutation behind
//! one lock, refuses to operate on a directory with the wrong mode or
//! owner, and evicts oldest-first when over budget.

pub mod envelope;
pub mod error;
pub mod keys;
pub mod report_file;
pub mod work_directory;

pub use envelope::{ReportEnvelope, ReportRequest, ENVELOPE_SCHEMA_VERSION};
pub use error::{Result, StoreError};
pub use keys::{KeyManager, PlaintextKeys};
pub use report_file::ReportFile;
pub use work_directory::{StoreLimits, WorkDirectory};
