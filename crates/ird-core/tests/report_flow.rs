//! End-to-end flow over the real filesystem:
//! collect → redact → persist → consent → deliver → commit.
//!
//! Uses real file sections in a temp directory and recording stand-ins for
//! the consent authority and crash-report sink.

use ird_broadcast::{
    BroadcastError, BroadcastOutcome, ConsentAuthority, CrashReportSink, PendingApproval,
};
use ird_common::{Destination, ReportId, ReportIdentity};
use ird_core::config::DaemonConfig;
use ird_core::sections::{SectionDef, SourceKind};
use ird_core::service::{IncidentService, ReportRequestSpec};
use ird_core::ServiceError;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

// ============================================================================
// Helpers
// ============================================================================

#[derive(Default)]
struct RecordingAuthority {
    approvals: Mutex<Vec<String>>,
    readies: Mutex<Vec<String>>,
    next_handle: AtomicU64,
}

impl ConsentAuthority for RecordingAuthority {
    fn request_approval(
        &self,
        identity: &ReportIdentity,
        uri: &str,
    ) -> Result<PendingApproval, BroadcastError> {
        self.approvals.lock().unwrap().push(uri.to_string());
        let _ = identity;
        Ok(PendingApproval(
            self.next_handle.fetch_add(1, Ordering::SeqCst),
        ))
    }

    fn notify_ready(&self, identity: &ReportIdentity) -> Result<(), BroadcastError> {
        self.readies.lock().unwrap().push(identity.to_string());
        Ok(())
    }
}

struct AuthorityRef(Arc<RecordingAuthority>);

impl ConsentAuthority for AuthorityRef {
    fn request_approval(
        &self,
        identity: &ReportIdentity,
        uri: &str,
    ) -> Result<PendingApproval, BroadcastError> {
        self.0.request_approval(identity, uri)
    }
    fn notify_ready(&self, identity: &ReportIdentity) -> Result<(), BroadcastError> {
        self.0.notify_ready(identity)
    }
}

#[derive(Default)]
struct RecordingSink {
    deliveries: Mutex<Vec<(String, Vec<u8>)>>,
}

impl CrashReportSink for RecordingSink {
    fn deliver(&self, identity: &ReportIdentity, data: &[u8]) -> Result<(), BroadcastError> {
        self.deliveries
            .lock()
            .unwrap()
            .push((identity.to_string(), data.to_vec()));
        Ok(())
    }
}

struct SinkRef(Arc<RecordingSink>);

impl CrashReportSink for SinkRef {
    fn deliver(&self, identity: &ReportIdentity, data: &[u8]) -> Result<(), BroadcastError> {
        self.0.deliver(identity, data)
    }
}

struct Fixture {
    _root: TempDir,
    service: IncidentService,
    authority: Arc<RecordingAuthority>,
    sink: Arc<RecordingSink>,
    section_payloads: (Vec<u8>, Vec<u8>),
}

/// Two file-backed sections: 10 is automatic-tier, 20 is local-tier.
fn fixture() -> Fixture {
    let root = TempDir::new().unwrap();

    let work_dir = root.path().join("reports");
    fs::create_dir(&work_dir).unwrap();
    fs::set_permissions(&work_dir, fs::Permissions::from_mode(0o770)).unwrap();

    let public = b"model: test-device\n".to_vec();
    let private = b"user log: alice@example.com logged in\n".to_vec();
    let public_path = root.path().join("public.txt");
    let private_path = root.path().join("private.txt");
    fs::write(&public_path, &public).unwrap();
    fs::write(&private_path, &private).unwrap();

    let sections = vec![
        SectionDef {
            id: 10,
            name: "device_info".to_string(),
            source: SourceKind::File {
                path: public_path,
            },
            timeout_ms: Some(2_000),
            destination: Some(Destination::Automatic),
            scrub_patterns: Vec::new(),
        },
        SectionDef {
            id: 20,
            name: "user_log".to_string(),
            source: SourceKind::File {
                path: private_path,
            },
            timeout_ms: Some(2_000),
            destination: Some(Destination::Local),
            scrub_patterns: Vec::new(),
        },
    ];

    let mut config = DaemonConfig::default();
    config.work_dir = work_dir;

    let authority = Arc::new(RecordingAuthority::default());
    let sink = Arc::new(RecordingSink::default());
    let service = IncidentService::new(
        config,
        sections,
        Box::new(AuthorityRef(Arc::clone(&authority))),
        Box::new(SinkRef(Arc::clone(&sink))),
    )
    .unwrap();

    Fixture {
        _root: root,
        service,
        authority,
        sink,
        section_payloads: (public, private),
    }
}

fn framed(section_id: u32, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    ird_redact::wire::write_length_delimited(&mut out, section_id, payload);
    out
}

fn app_identity() -> ReportIdentity {
    ReportIdentity::new("report-1", "com.example.app", "ReportReceiver")
}

fn shell_identity() -> ReportIdentity {
    ReportIdentity::new(ReportId::new(), "shell", "dropbox")
}

// ============================================================================
// Tests
// ============================================================================

#[test]
fn test_full_consent_flow_for_an_app_requester() {
    let f = fixture();
    let identity = app_identity();
    let ts = f
        .service
        .run_report(
            &[ReportRequestSpec::new(identity.clone(), Destination::Explicit)],
            None,
        )
        .unwrap();

    // Round 1: approval request goes out, exactly once, with the URI.
    assert_eq!(f.service.broadcast_round(), BroadcastOutcome::Finished);
    assert_eq!(f.service.broadcast_round(), BroadcastOutcome::Finished);
    let approvals = f.authority.approvals.lock().unwrap().clone();
    assert_eq!(approvals.len(), 1);
    assert_eq!(
        approvals[0],
        "content://incidentd/pending?pkg=com.example.app&receiver=ReportReceiver&r=report-1"
    );

    // Consent arrives; the next round notifies readiness.
    f.service.handle_approval(ts, &identity).unwrap();
    f.service.broadcast_round();
    assert_eq!(f.authority.readies.lock().unwrap().len(), 1);

    // Delivery at the explicit tier: the local-tier section is stripped.
    let mut received = Vec::new();
    f.service.deliver(ts, &identity, &mut received).unwrap();
    assert_eq!(received, framed(10, &f.section_payloads.0));

    // Sole requester committed: the pair is gone.
    assert!(f.service.store().get_reports(0).is_empty());
}

#[test]
fn test_local_sink_bypasses_consent_and_commits() {
    let f = fixture();
    let identity = shell_identity();
    let _ts = f
        .service
        .run_report(&[ReportRequestSpec::local(identity)], None)
        .unwrap();

    assert_eq!(f.service.broadcast_round(), BroadcastOutcome::Finished);

    // No consent round trip for local diagnostics.
    assert!(f.authority.approvals.lock().unwrap().is_empty());
    let deliveries = f.sink.deliveries.lock().unwrap();
    assert_eq!(deliveries.len(), 1);

    // Local tier keeps both sections, in ascending field order.
    let mut expected = framed(10, &f.section_payloads.0);
    expected.extend(framed(20, &f.section_payloads.1));
    assert_eq!(deliveries[0].1, expected);
    drop(deliveries);

    // Sink delivery committed the lone requester; the pair is gone.
    assert!(f.service.store().get_reports(0).is_empty());
}

#[test]
fn test_denial_discards_the_request_and_the_pair() {
    let f = fixture();
    let identity = app_identity();
    let ts = f
        .service
        .run_report(
            &[ReportRequestSpec::new(identity.clone(), Destination::Explicit)],
            None,
        )
        .unwrap();

    f.service.broadcast_round();
    f.service.handle_denial(ts, &identity).unwrap();

    assert!(f.service.store().get_reports(0).is_empty());
    // Nothing further goes out for the denied identity.
    assert_eq!(f.service.broadcast_round(), BroadcastOutcome::Finished);
    assert_eq!(f.authority.approvals.lock().unwrap().len(), 1);
}

#[test]
fn test_unapproved_delivery_is_refused() {
    let f = fixture();
    let identity = app_identity();
    let ts = f
        .service
        .run_report(
            &[ReportRequestSpec::new(identity.clone(), Destination::Explicit)],
            None,
        )
        .unwrap();

    let mut out = Vec::new();
    let err = f.service.deliver(ts, &identity, &mut out).unwrap_err();
    assert!(matches!(err, ServiceError::NotAuthorized { .. }));
    assert!(out.is_empty());
}

#[test]
fn test_two_requesters_each_get_their_own_tier() {
    let f = fixture();
    let app = app_identity();
    let shell = shell_identity();
    let ts = f
        .service
        .run_report(
            &[
                ReportRequestSpec::new(app.clone(), Destination::Explicit),
                ReportRequestSpec::local(shell.clone()),
            ],
            None,
        )
        .unwrap();

    // The stored payload was persisted at the widest tier (local), so the
    // shell sink sees both sections.
    f.service.broadcast_round();
    assert_eq!(f.sink.deliveries.lock().unwrap().len(), 1);
    assert_eq!(
        f.sink.deliveries.lock().unwrap()[0].1.len(),
        framed(10, &f.section_payloads.0).len() + framed(20, &f.section_payloads.1).len()
    );

    // The app, once approved, is re-filtered down to the explicit tier.
    f.service.handle_approval(ts, &app).unwrap();
    let mut received = Vec::new();
    f.service.deliver(ts, &app, &mut received).unwrap();
    assert_eq!(received, framed(10, &f.section_payloads.0));

    // Both identities committed; the pair is gone.
    assert!(f.service.store().get_reports(0).is_empty());
}

#[test]
fn test_section_filter_limits_collection() {
    let f = fixture();
    let identity = shell_identity();
    let ts = f
        .service
        .run_report(&[ReportRequestSpec::local(identity.clone())], Some(&[10]))
        .unwrap();

    let expected = framed(10, &f.section_payloads.0);
    let mut received = Vec::new();
    f.service.deliver(ts, &identity, &mut received).unwrap();
    assert_eq!(received, expected);
}

#[test]
fn test_missing_section_source_does_not_sink_the_report() {
    let root = TempDir::new().unwrap();
    let work_dir = root.path().join("reports");
    fs::create_dir(&work_dir).unwrap();
    fs::set_permissions(&work_dir, fs::Permissions::from_mode(0o770)).unwrap();

    let good = root.path().join("good.txt");
    fs::write(&good, b"fine").unwrap();

    let sections = vec![
        SectionDef {
            id: 1,
            name: "good".to_string(),
            source: SourceKind::File { path: good },
            timeout_ms: Some(2_000),
            destination: Some(Destination::Automatic),
            scrub_patterns: Vec::new(),
        },
        SectionDef {
            id: 2,
            name: "missing".to_string(),
            source: SourceKind::File {
                path: PathBuf::from("/nonexistent/section"),
            },
            timeout_ms: Some(2_000),
            destination: Some(Destination::Automatic),
            scrub_patterns: Vec::new(),
        },
    ];

    let mut config = DaemonConfig::default();
    config.work_dir = work_dir;
    let service = IncidentService::new(
        config,
        sections,
        Box::new(AuthorityRef(Arc::new(RecordingAuthority::default()))),
        Box::new(SinkRef(Arc::new(RecordingSink::default()))),
    )
    .unwrap();

    let identity = shell_identity();
    let ts = service
        .run_report(&[ReportRequestSpec::local(identity.clone())], None)
        .unwrap();

    let mut received = Vec::new();
    service.deliver(ts, &identity, &mut received).unwrap();
    assert_eq!(received, framed(1, b"fine"));
}
