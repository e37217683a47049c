//! Per-report consent workflow.
//!
//! State machine per identity: Unnotified → ApprovalRequested →
//! {Approved, Denied} → ReadyNotified → Committed. The broadcaster sends
//! the notifications; approval and denial arrive back through
//! [`ConsentBroadcaster::record_approval`] / [`record_denial`], and the
//! store commit removes the record.
//!
//! `send_broadcasts` is a cooperative retry contract: it does a bounded
//! round of work and tells the caller whether to call again now, later,
//! or not at all. There is no internal retry loop — backoff timing belongs
//! to the caller.

use crate::error::{BroadcastError, Result};
use crate::throttle::Throttler;
use ird_common::{ReportIdentity, RequestStatus};
use std::collections::BTreeMap;
use std::sync::Mutex;
use tracing::{debug, info, warn};

/// Notifications sent in one `send_broadcasts` round before yielding
/// `Repeat`.
const MAX_PER_ROUND: usize = 5;

/// Opaque handle to an in-flight approval request at the authority.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingApproval(pub u64);

/// External collaborator that asks the user for consent.
pub trait ConsentAuthority: Send + Sync {
    /// Start an approval flow for `identity`. `uri` names the pending
    /// request so the receiving app can address it.
    fn request_approval(&self, identity: &ReportIdentity, uri: &str) -> Result<PendingApproval>;

    /// Tell an approved requester its report is ready to fetch.
    fn notify_ready(&self, identity: &ReportIdentity) -> Result<()>;
}

/// External collaborator receiving local diagnostics directly.
pub trait CrashReportSink: Send + Sync {
    fn deliver(&self, identity: &ReportIdentity, data: &[u8]) -> Result<()>;
}

/// One report awaiting notification work, as seen by the broadcaster.
#[derive(Debug, Clone)]
pub struct PendingReport {
    pub timestamp_ns: u64,
    pub identity: ReportIdentity,
    pub status: RequestStatus,
    pub size_bytes: u64,
    /// Deliver straight to the crash-report sink, skipping consent.
    pub local_sink: bool,
    /// Report bytes, populated by the caller for `local_sink` targets only.
    pub data: Option<Vec<u8>>,
}

/// What the caller should do after a `send_broadcasts` round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BroadcastOutcome {
    /// Nothing further to send right now.
    Finished,
    /// More work remains that can proceed immediately; call again.
    Repeat,
    /// Throttled or the authority is failing; retry after a delay.
    Backoff,
}

/// Duplicate-notification guards for one identity.
#[derive(Debug, Default)]
struct ConsentRecord {
    approval_sent: bool,
    ready_sent: bool,
    pending_handle: Option<PendingApproval>,
    delivered_to_sink: bool,
}

/// Drives consent and readiness notifications for pending reports.
pub struct ConsentBroadcaster {
    authority: Box<dyn ConsentAuthority>,
    sink: Box<dyn CrashReportSink>,
    uri_authority: String,
    records: Mutex<BTreeMap<ReportIdentity, ConsentRecord>>,
    throttler: Mutex<Throttler>,
}

impl ConsentBroadcaster {
    pub fn new(
        authority: Box<dyn ConsentAuthority>,
        sink: Box<dyn CrashReportSink>,
        uri_authority: impl Into<String>,
        throttler: Throttler,
    ) -> Self {
        Self {
            authority,
            sink,
            uri_authority: uri_authority.into(),
            records: Mutex::new(BTreeMap::new()),
            throttler: Mutex::new(throttler),
        }
    }

    /// One bounded round of notification work over `pending`.
    pub fn send_broadcasts(&self, pending: &[PendingReport]) -> BroadcastOutcome {
        if self.lock_throttler().should_throttle() {
            debug!("notifications throttled");
            return BroadcastOutcome::Backoff;
        }

        let mut records = self.lock_records();
        let mut sent = 0usize;
        let mut remaining = 0usize;
        let mut failed = false;

        for report in pending {
            if matches!(report.status, RequestStatus::Denied | RequestStatus::Committed) {
                continue;
            }
            let record = records.entry(report.identity.clone()).or_default();

            let wants_work = if report.local_sink {
                !record.delivered_to_sink
            } else {
                match report.status {
                    RequestStatus::Pending => !record.approval_sent,
                    RequestStatus::Approved => !record.ready_sent,
                    _ => false,
                }
            };
            if !wants_work {
                continue;
            }
            if sent >= MAX_PER_ROUND {
                remaining += 1;
                continue;
            }

            let ok = if report.local_sink {
                self.deliver_local(report, record)
            } else if report.status == RequestStatus::Pending {
                self.request_approval(report, record)
            } else {
                self.notify_ready(report, record)
            };
            if ok {
                sent += 1;
                self.lock_throttler().add_report_size(report.size_bytes);
            } else {
                failed = true;
            }
        }

        if failed {
            BroadcastOutcome::Backoff
        } else if remaining > 0 {
            BroadcastOutcome::Repeat
        } else {
            BroadcastOutcome::Finished
        }
    }

    /// The authority approved sharing with `identity`.
    pub fn record_approval(&self, identity: &ReportIdentity) -> Result<()> {
        let mut records = self.lock_records();
        let record = records
            .get_mut(identity)
            .ok_or_else(|| BroadcastError::NotFound {
                identity: identity.to_string(),
            })?;
        record.pending_handle = None;
        info!(identity = %identity, "consent approved");
        Ok(())
    }

    /// The authority denied sharing with `identity`; the record is gone.
    pub fn record_denial(&self, identity: &ReportIdentity) -> Result<()> {
        let mut records = self.lock_records();
        if records.remove(identity).is_none() {
            return Err(BroadcastError::NotFound {
                identity: identity.to_string(),
            });
        }
        info!(identity = %identity, "consent denied");
        Ok(())
    }

    /// The identity's report is fully committed; drop its record.
    pub fn forget(&self, identity: &ReportIdentity) {
        self.lock_records().remove(identity);
    }

    /// Whether an approval notification has already gone out.
    pub fn was_approval_sent(&self, identity: &ReportIdentity) -> bool {
        self.lock_records()
            .get(identity)
            .map(|r| r.approval_sent)
            .unwrap_or(false)
    }

    /// Whether a local-sink delivery has completed for this identity.
    pub fn was_delivered_to_sink(&self, identity: &ReportIdentity) -> bool {
        self.lock_records()
            .get(identity)
            .map(|r| r.delivered_to_sink)
            .unwrap_or(false)
    }

    fn deliver_local(&self, report: &PendingReport, record: &mut ConsentRecord) -> bool {
        let data = report.data.as_deref().unwrap_or(&[]);
        match self.sink.deliver(&report.identity, data) {
            Ok(()) => {
                record.delivered_to_sink = true;
                info!(identity = %report.identity, bytes = data.len(), "delivered to local sink");
                true
            }
            Err(e) => {
                warn!(identity = %report.identity, error = %e, "local sink delivery failed");
                false
            }
        }
    }

    fn request_approval(&self, report: &PendingReport, record: &mut ConsentRecord) -> bool {
        let uri = pending_request_uri(&self.uri_authority, &report.identity);
        match self.authority.request_approval(&report.identity, &uri) {
            Ok(handle) => {
                record.approval_sent = true;
                record.pending_handle = Some(handle);
                info!(identity = %report.identity, %uri, "approval requested");
                true
            }
            Err(e) => {
                warn!(identity = %report.identity, error = %e, "approval request failed");
                false
            }
        }
    }

    fn notify_ready(&self, report: &PendingReport, record: &mut ConsentRecord) -> bool {
        match self.authority.notify_ready(&report.identity) {
            Ok(()) => {
                record.ready_sent = true;
                info!(identity = %report.identity, "ready notification sent");
                true
            }
            Err(e) => {
                warn!(identity = %report.identity, error = %e, "ready notification failed");
                false
            }
        }
    }

    fn lock_records(&self) -> std::sync::MutexGuard<'_, BTreeMap<ReportIdentity, ConsentRecord>> {
        self.records.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn lock_throttler(&self) -> std::sync::MutexGuard<'_, Throttler> {
        self.throttler.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Observable artifact identifying a pending consent request to the
/// receiving app.
pub fn pending_request_uri(authority: &str, identity: &ReportIdentity) -> String {
    format!(
        "content://{}/pending?pkg={}&receiver={}&r={}",
        authority, identity.package, identity.class, identity.report_id
    )
}
