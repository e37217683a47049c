//! Report envelope: the metadata half of a report pair.

use ird_common::{Destination, ReportIdentity, RequestStatus};
use serde::{Deserialize, Serialize};

/// Schema version written into every envelope.
pub const ENVELOPE_SCHEMA_VERSION: &str = "1.0.0";

/// One requester's entry in an envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportRequest {
    pub identity: ReportIdentity,
    pub status: RequestStatus,
    /// Privacy tier this requester is served at.
    #[serde(default)]
    pub requested: Destination,
    /// Deliver straight to the local diagnostics sink, skipping consent.
    #[serde(default)]
    pub local_sink: bool,
}

/// Metadata describing a persisted report: its pending recipients, the
/// privacy tier applied at persist time, and completion state.
///
/// Created empty when a report begins, mutated in memory while requests
/// are added and approved, persisted whole via the owning report file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportEnvelope {
    /// Schema version for forward compatibility.
    #[serde(default = "default_schema_version")]
    pub schema_version: String,

    /// Requesters awaiting this report, ordered by arrival.
    #[serde(default)]
    pub requests: Vec<ReportRequest>,

    /// File name of the paired data file (relative to the work directory).
    pub data_file_name: String,

    /// Size of the data file in bytes at last write.
    #[serde(default)]
    pub data_file_size: u64,

    /// Integrity digest of the data file contents.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_sha256: Option<String>,

    /// Privacy tier the persisted bytes were filtered at.
    pub privacy_policy: Destination,

    /// All sections collected; the report will not grow further.
    #[serde(default)]
    pub completed: bool,

    /// Creation timestamp, nanoseconds since the epoch. Also the pair's
    /// on-disk name.
    pub timestamp_ns: u64,
}

fn default_schema_version() -> String {
    ENVELOPE_SCHEMA_VERSION.to_string()
}

impl ReportEnvelope {
    pub fn new(timestamp_ns: u64, data_file_name: impl Into<String>) -> Self {
        Self {
            schema_version: ENVELOPE_SCHEMA_VERSION.to_string(),
            requests: Vec::new(),
            data_file_name: data_file_name.into(),
            data_file_size: 0,
            data_sha256: None,
            privacy_policy: Destination::Explicit,
            completed: false,
            timestamp_ns,
        }
    }

    /// Register a requester at a privacy tier. Duplicate identities are
    /// ignored.
    pub fn add_request(&mut self, identity: ReportIdentity, requested: Destination) {
        self.add_request_full(identity, requested, false);
    }

    /// Register a requester, optionally routed to the local sink.
    pub fn add_request_full(
        &mut self,
        identity: ReportIdentity,
        requested: Destination,
        local_sink: bool,
    ) {
        if self.request(&identity).is_none() {
            self.requests.push(ReportRequest {
                identity,
                status: RequestStatus::Pending,
                requested,
                local_sink,
            });
        }
    }

    /// Drop a requester entirely (e.g. consent denied and acknowledged).
    pub fn remove_request(&mut self, identity: &ReportIdentity) {
        self.requests.retain(|r| &r.identity != identity);
    }

    pub fn request(&self, identity: &ReportIdentity) -> Option<&ReportRequest> {
        self.requests.iter().find(|r| &r.identity == identity)
    }

    /// Update one requester's status. Returns false on unknown identity.
    pub fn set_status(&mut self, identity: &ReportIdentity, status: RequestStatus) -> bool {
        match self.requests.iter_mut().find(|r| &r.identity == identity) {
            Some(r) => {
                r.status = status;
                true
            }
            None => false,
        }
    }

    /// Identities still awaiting consent or delivery.
    pub fn pending_identities(&self) -> impl Iterator<Item = &ReportIdentity> {
        self.requests
            .iter()
            .filter(|r| !matches!(r.status, RequestStatus::Committed))
            .map(|r| &r.identity)
    }

    /// Every known requester has committed; the pair can be removed.
    pub fn all_committed(&self) -> bool {
        !self.requests.is_empty()
            && self
                .requests
                .iter()
                .all(|r| matches!(r.status, RequestStatus::Committed))
    }
}
