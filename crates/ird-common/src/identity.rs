//! Report and requester identities.
//!
//! A pending report is addressed to a `(report_id, package, class)` triple:
//! the report instance itself plus the broadcast receiver that asked for
//! it. The triple is the natural key for consent records and envelope
//! request lists, so it derives a total lexicographic order.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque report instance id.
///
/// Freshly minted reports get a v4 uuid; ids arriving from callers are
/// carried verbatim.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportId(pub String);

impl ReportId {
    /// Generate a fresh report id.
    pub fn new() -> Self {
        ReportId(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for ReportId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ReportId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ReportId {
    fn from(s: &str) -> Self {
        ReportId(s.to_string())
    }
}

impl From<String> for ReportId {
    fn from(s: String) -> Self {
        ReportId(s)
    }
}

/// Natural key for one requester's interest in one report.
///
/// Ordering is lexicographic over `(report_id, package, class)` via the
/// derive, which makes the type usable as a `BTreeMap` key.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ReportIdentity {
    /// The report instance being requested.
    pub report_id: ReportId,
    /// Package name of the requesting consumer.
    pub package: String,
    /// Receiver class within the package.
    pub class: String,
}

impl ReportIdentity {
    pub fn new(
        report_id: impl Into<ReportId>,
        package: impl Into<String>,
        class: impl Into<String>,
    ) -> Self {
        Self {
            report_id: report_id.into(),
            package: package.into(),
            class: class.into(),
        }
    }
}

impl fmt::Display for ReportIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.package, self.class, self.report_id)
    }
}

/// Lifecycle of one identity's interest in a report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Collected but not yet authorized.
    #[default]
    Pending,
    /// The consent authority approved sharing.
    Approved,
    /// The consent authority denied sharing.
    Denied,
    /// The consumer has received the report.
    Committed,
}
