//! The incident service: collect → redact → persist → notify.
//!
//! `IncidentService` owns the subsystem objects (work directory, buffer
//! pool, worker pool, policy set, broadcaster) and wires the data flow
//! between them. Section collections run in parallel on the worker pool,
//! each under its own deadline; a section failure costs that section only,
//! never the report.

use crate::config::DaemonConfig;
use crate::error::{Result, ServiceError};
use crate::sections::{PolicySet, SectionDef};
use ird_broadcast::{
    BroadcastOutcome, ConsentAuthority, ConsentBroadcaster, CrashReportSink, PendingReport,
    Throttler,
};
use ird_capture::{BufferPool, SectionPipeline, WorkerPool};
use ird_common::{Destination, PolicySpec, ReportIdentity, RequestStatus};
use ird_redact::{wire, RedactionFilter};
use ird_store::{StoreError, WorkDirectory};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Extra wall time allowed for a section worker beyond its own deadline
/// before the service gives up waiting on it.
const SECTION_WAIT_SLACK: Duration = Duration::from_secs(1);

/// One requester's parameters for a new report.
#[derive(Debug, Clone)]
pub struct ReportRequestSpec {
    pub identity: ReportIdentity,
    pub requested: Destination,
    /// Route to the local diagnostics sink, skipping consent.
    pub local_sink: bool,
}

impl ReportRequestSpec {
    pub fn new(identity: ReportIdentity, requested: Destination) -> Self {
        Self {
            identity,
            requested,
            local_sink: false,
        }
    }

    pub fn local(identity: ReportIdentity) -> Self {
        Self {
            identity,
            requested: Destination::Local,
            local_sink: true,
        }
    }
}

/// Daemon-wide orchestration object.
pub struct IncidentService {
    config: DaemonConfig,
    store: WorkDirectory,
    pipeline: SectionPipeline,
    workers: Arc<WorkerPool>,
    policies: PolicySet,
    sections: Vec<SectionDef>,
    broadcaster: ConsentBroadcaster,
}

impl IncidentService {
    pub fn new(
        config: DaemonConfig,
        sections: Vec<SectionDef>,
        authority: Box<dyn ConsentAuthority>,
        sink: Box<dyn CrashReportSink>,
    ) -> Result<Self> {
        config.validate()?;
        let store = WorkDirectory::open_for_current_user(&config.work_dir, config.store)?;
        let pool = Arc::new(BufferPool::with_limits(
            config.capture.buffer_limit_bytes,
            config.capture.max_pooled_buffers,
        ));
        let pipeline = SectionPipeline::new(pool);
        let workers = Arc::new(WorkerPool::new(config.capture.worker_threads));
        let policies = PolicySet::build(&sections)?;
        let throttler = Throttler::new(
            config.throttle.size_limit_bytes,
            config.throttle.refractory_period(),
        );
        let broadcaster = ConsentBroadcaster::new(
            authority,
            sink,
            config.uri_authority.clone(),
            throttler,
        );
        info!(
            work_dir = %config.work_dir.display(),
            sections = sections.len(),
            "incident service ready"
        );
        Ok(Self {
            config,
            store,
            pipeline,
            workers,
            policies,
            sections,
            broadcaster,
        })
    }

    pub fn store(&self) -> &WorkDirectory {
        &self.store
    }

    pub fn broadcaster(&self) -> &ConsentBroadcaster {
        &self.broadcaster
    }

    /// Collect a report for the given requesters.
    ///
    /// Sections run in parallel on the worker pool, each bounded by its
    /// own timeout. The assembled report is filtered once at the widest
    /// requested tier, persisted, and queued for notification. Returns the
    /// report's timestamp key.
    pub fn run_report(
        &self,
        requests: &[ReportRequestSpec],
        section_filter: Option<&[u32]>,
    ) -> Result<u64> {
        let timestamp_ns = self.store.create_report_file();

        let selected: Vec<&SectionDef> = self
            .sections
            .iter()
            .filter(|def| section_filter.map_or(true, |ids| ids.contains(&def.id)))
            .collect();

        let mut handles = Vec::with_capacity(selected.len());
        for def in &selected {
            let source = def.make_source();
            let pipeline = self.pipeline.clone();
            let timeout = def.timeout(self.config.default_section_timeout());
            let handle = self.workers.submit(move || {
                let mut source = source;
                pipeline.execute(source.as_mut(), timeout)
            })?;
            handles.push((*def, timeout, handle));
        }

        let mut body = Vec::new();
        for (def, timeout, handle) in handles {
            match handle.wait_until(Instant::now() + timeout + SECTION_WAIT_SLACK) {
                Some(Ok(buf)) => {
                    wire::write_length_delimited(&mut body, def.id, buf.data());
                    self.pipeline.release(buf);
                }
                Some(Err(e)) => {
                    // One section failing must not cost the report.
                    warn!(section = %def.name, error = %e, "section collection failed");
                }
                None => {
                    warn!(section = %def.name, "section worker overran its deadline");
                }
            }
        }

        // Persist at the widest tier anyone asked for; narrower requesters
        // are re-filtered from the stored bytes at delivery.
        let persist_tier = requests
            .iter()
            .map(|r| r.requested)
            .min()
            .unwrap_or(Destination::Explicit);
        let (tree, root) = self.policies.policy();
        let mut persisted = Vec::new();
        {
            let mut filter = RedactionFilter::new(&body, Some((tree, root)));
            filter.register(PolicySpec::new(persist_tier), Box::new(&mut persisted));
            for outcome in filter.run() {
                outcome.result?;
            }
        }

        self.store.with_report(timestamp_ns, |report| {
            let envelope = report.envelope_mut();
            for req in requests {
                envelope.add_request_full(req.identity.clone(), req.requested, req.local_sink);
            }
            envelope.privacy_policy = persist_tier;
            envelope.completed = true;
            report.write_data(&persisted)?;
            report.save_envelope()
        })?;

        let evicted = self.store.enforce_retention();
        if !evicted.is_empty() {
            debug!(evicted = evicted.len(), "retention evicted report pairs");
        }
        info!(
            timestamp_ns,
            sections = selected.len(),
            bytes = persisted.len(),
            tier = %persist_tier,
            "report persisted"
        );
        Ok(timestamp_ns)
    }

    /// One notification round over every pending identity, then commit
    /// whatever the local sink absorbed.
    pub fn broadcast_round(&self) -> BroadcastOutcome {
        let pending = self.pending_reports();
        let outcome = self.broadcaster.send_broadcasts(&pending);

        for report in &pending {
            if report.local_sink
                && report.status == RequestStatus::Pending
                && self.broadcaster.was_delivered_to_sink(&report.identity)
            {
                match self.store.commit(report.timestamp_ns, &report.identity) {
                    Ok(_) => self.broadcaster.forget(&report.identity),
                    Err(e) => {
                        warn!(identity = %report.identity, error = %e, "failed to commit sink delivery")
                    }
                }
            }
        }
        outcome
    }

    /// The consent authority approved `identity` for `timestamp_ns`.
    pub fn handle_approval(&self, timestamp_ns: u64, identity: &ReportIdentity) -> Result<()> {
        self.store.with_report(timestamp_ns, |report| {
            if !report
                .envelope_mut()
                .set_status(identity, RequestStatus::Approved)
            {
                return Err(StoreError::IdentityNotFound {
                    timestamp_ns,
                    identity: identity.to_string(),
                });
            }
            report.save_envelope()
        })?;
        self.broadcaster.record_approval(identity)?;
        Ok(())
    }

    /// The consent authority denied `identity`: its request is dropped,
    /// and the pair goes too once nobody else is waiting.
    pub fn handle_denial(&self, timestamp_ns: u64, identity: &ReportIdentity) -> Result<()> {
        let now_empty = self.store.with_report(timestamp_ns, |report| {
            report.envelope_mut().remove_request(identity);
            let empty = report.envelope().requests.is_empty();
            if !empty {
                report.save_envelope()?;
            }
            Ok(empty)
        })?;
        if now_empty {
            self.store.remove(timestamp_ns)?;
        }
        // The record may never have existed if denial raced the first
        // broadcast round.
        let _ = self.broadcaster.record_denial(identity);
        Ok(())
    }

    /// Stream the report to an approved requester at its own tier, then
    /// commit the identity.
    ///
    /// Blocks until all bytes are written.
    pub fn deliver(
        &self,
        timestamp_ns: u64,
        identity: &ReportIdentity,
        writer: &mut dyn Write,
    ) -> Result<u64> {
        let (requested, authorized) = self.store.with_report(timestamp_ns, |report| {
            match report.envelope().request(identity) {
                Some(req) => Ok((
                    req.requested,
                    req.local_sink || req.status == RequestStatus::Approved,
                )),
                None => Err(StoreError::IdentityNotFound {
                    timestamp_ns,
                    identity: identity.to_string(),
                }),
            }
        })?;
        if !authorized {
            return Err(ServiceError::NotAuthorized {
                timestamp_ns,
                identity: identity.to_string(),
            });
        }

        let (tree, root) = self.policies.policy();
        let written = self.store.with_report(timestamp_ns, |report| {
            report.start_filtering_data(writer, PolicySpec::new(requested), Some((tree, root)))
        })?;

        self.store.commit(timestamp_ns, identity)?;
        self.broadcaster.forget(identity);
        info!(timestamp_ns, identity = %identity, bytes = written, "report delivered");
        Ok(written)
    }

    /// Housekeeping tick for the daemon loop: one broadcast round plus
    /// retention enforcement.
    pub fn tick(&self) -> BroadcastOutcome {
        let outcome = self.broadcast_round();
        self.store.enforce_retention();
        outcome
    }

    /// Stop the worker pool. Further `run_report` calls fail with
    /// `WorkerUnavailable`.
    pub fn shutdown(self) {
        match Arc::try_unwrap(self.workers) {
            Ok(workers) => workers.shutdown(),
            Err(_) => warn!("worker pool still shared at shutdown"),
        }
    }

    /// Snapshot of identities awaiting notification work.
    fn pending_reports(&self) -> Vec<PendingReport> {
        let mut pending = Vec::new();
        for timestamp_ns in self.store.get_reports(0) {
            let result = self.store.with_report(timestamp_ns, |report| {
                let envelope = report.envelope();
                if !envelope.completed {
                    return Ok(Vec::new());
                }
                let mut items = Vec::new();
                for req in &envelope.requests {
                    if matches!(req.status, RequestStatus::Committed) {
                        continue;
                    }
                    // Local-sink deliveries carry their bytes; stored data
                    // is already at the local tier for such reports.
                    let data = if req.local_sink && req.status == RequestStatus::Pending {
                        Some(report.read_data()?)
                    } else {
                        None
                    };
                    items.push(PendingReport {
                        timestamp_ns,
                        identity: req.identity.clone(),
                        status: req.status,
                        size_bytes: envelope.data_file_size,
                        local_sink: req.local_sink,
                        data,
                    });
                }
                Ok(items)
            });
            match result {
                Ok(items) => pending.extend(items),
                Err(e) => warn!(timestamp_ns, error = %e, "skipping unreadable report"),
            }
        }
        pending
    }
}
