//! Shared types for the incident report daemon.
//!
//! This crate holds the vocabulary the other incidentd crates agree on:
//! report identities, privacy destinations, and per-request status. It has
//! no I/O of its own; everything here is plain data.

pub mod destination;
pub mod identity;

pub use destination::{Destination, PolicySpec};
pub use identity::{ReportId, ReportIdentity, RequestStatus};
