//! Consent broadcasts and notification throttling.
//!
//! A persisted report may not be handed to its requester until the user
//! (via the consent authority) has approved it. This crate owns that
//! workflow: per-identity consent records with duplicate-notification
//! guards, the cooperative `send_broadcasts` retry contract, the
//! local-diagnostics bypass, and size/time throttling of outbound
//! notifications.
//!
//! The consent authority and crash-report sink are external collaborators
//! behind traits; nothing here talks to a transport directly.

pub mod consent;
pub mod error;
pub mod throttle;

pub use consent::{
    pending_request_uri, BroadcastOutcome, ConsentAuthority, ConsentBroadcaster, CrashReportSink,
    PendingApproval, PendingReport,
};
pub use error::{BroadcastError, Result};
pub use throttle::Throttler;
