//! Incident Report Daemon Core
//!
//! Glue layer tying the subsystem crates into one service:
//! - Daemon configuration loading and validation
//! - Structured logging initialization
//! - The section registry (what to collect, under which policy)
//! - The `IncidentService` orchestration: collect → redact → persist →
//!   notify
//!
//! The binary entry point is in `main.rs`.

pub mod config;
pub mod error;
pub mod logging;
pub mod sections;
pub mod service;

pub use config::DaemonConfig;
pub use error::{Result, ServiceError};
pub use sections::{PolicySet, SectionDef, SourceKind};
pub use service::{IncidentService, ReportRequestSpec};
