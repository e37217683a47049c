//! The report store's directory owner.
//!
//! One `WorkDirectory` per daemon. Every mutation — creating pairs,
//! editing envelopes, committing identities, eviction — happens under its
//! single mutex, which is what makes the multi-file invariants hold.

use crate::error::{Result, StoreError};
use crate::report_file::ReportFile;
use ird_common::ReportIdentity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::os::unix::fs::MetadataExt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Required mode bits on the work directory.
const REQUIRED_MODE: u32 = 0o770;

/// Retention budgets for the store.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct StoreLimits {
    /// Total bytes across all pairs before eviction starts.
    pub max_total_bytes: u64,
    /// Pair count before eviction starts.
    pub max_report_count: usize,
}

impl Default for StoreLimits {
    fn default() -> Self {
        Self {
            max_total_bytes: 100 * 1024 * 1024,
            max_report_count: 50,
        }
    }
}

/// Mutex-serialized owner of the on-disk report store.
#[derive(Debug)]
pub struct WorkDirectory {
    dir: PathBuf,
    limits: StoreLimits,
    reports: Mutex<BTreeMap<u64, ReportFile>>,
}

impl WorkDirectory {
    /// Open the store rooted at `dir`, owned by `uid`/`gid`.
    ///
    /// The directory must already exist with mode `0770` and the given
    /// owner; any mismatch is a fatal [`StoreError::PermissionDenied`] —
    /// the store refuses to write into a directory it cannot trust.
    /// Existing pairs are materialized; unreadable ones are deleted.
    pub fn open(dir: impl Into<PathBuf>, uid: u32, gid: u32, limits: StoreLimits) -> Result<Self> {
        let dir = dir.into();
        check_directory(&dir, uid, gid)?;

        let mut reports = BTreeMap::new();
        for entry in fs::read_dir(&dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(timestamp_ns) = name
                .to_str()
                .and_then(|n| n.strip_suffix(".envelope"))
                .and_then(|stem| stem.parse::<u64>().ok())
            else {
                continue;
            };
            match ReportFile::load(&dir, timestamp_ns) {
                Ok(report) => {
                    reports.insert(timestamp_ns, report);
                }
                Err(e) => {
                    // load already deleted the pair; the scan continues
                    warn!(timestamp_ns, error = %e, "dropped unreadable pair during scan");
                }
            }
        }
        info!(dir = %dir.display(), reports = reports.len(), "work directory opened");

        Ok(Self {
            dir,
            limits,
            reports: Mutex::new(reports),
        })
    }

    /// Open the store for the current effective uid/gid.
    pub fn open_for_current_user(dir: impl Into<PathBuf>, limits: StoreLimits) -> Result<Self> {
        let uid = unsafe { libc::geteuid() };
        let gid = unsafe { libc::getegid() };
        Self::open(dir, uid, gid, limits)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Allocate a fresh timestamp-named pair.
    ///
    /// Never fails: allocation is purely in memory, I/O failures surface
    /// on later saves. Returns the pair's timestamp key.
    pub fn create_report_file(&self) -> u64 {
        let mut reports = self.lock();
        let mut timestamp_ns = now_ns();
        // Clock collisions get the next free nanosecond slot.
        while reports.contains_key(&timestamp_ns) {
            timestamp_ns += 1;
        }
        reports.insert(timestamp_ns, ReportFile::create(&self.dir, timestamp_ns));
        timestamp_ns
    }

    /// Run `f` against one report's `ReportFile` under the store lock.
    pub fn with_report<T>(
        &self,
        timestamp_ns: u64,
        f: impl FnOnce(&mut ReportFile) -> Result<T>,
    ) -> Result<T> {
        let mut reports = self.lock();
        let report = reports
            .get_mut(&timestamp_ns)
            .ok_or(StoreError::NotFound { timestamp_ns })?;
        f(report)
    }

    /// Timestamps of reports strictly newer than `after_timestamp_ns`,
    /// ascending. O(n) over the materialized map; retention bounds n.
    pub fn get_reports(&self, after_timestamp_ns: u64) -> Vec<u64> {
        use std::ops::Bound;
        self.lock()
            .range((Bound::Excluded(after_timestamp_ns), Bound::Unbounded))
            .map(|(&ts, _)| ts)
            .collect()
    }

    pub fn report_count(&self) -> usize {
        self.lock().len()
    }

    /// Mark one identity committed. When every identity on the report has
    /// committed, the pair is unlinked; returns true in that case.
    pub fn commit(&self, timestamp_ns: u64, identity: &ReportIdentity) -> Result<bool> {
        let mut reports = self.lock();
        let report = reports
            .get_mut(&timestamp_ns)
            .ok_or(StoreError::NotFound { timestamp_ns })?;
        if !report
            .envelope_mut()
            .set_status(identity, ird_common::RequestStatus::Committed)
        {
            return Err(StoreError::IdentityNotFound {
                timestamp_ns,
                identity: identity.to_string(),
            });
        }
        if report.envelope().all_committed() {
            info!(timestamp_ns, "all identities committed, removing pair");
            report.remove_files();
            reports.remove(&timestamp_ns);
            return Ok(true);
        }
        report.save_envelope()?;
        Ok(false)
    }

    /// Commit every identity belonging to `package` across all reports.
    /// Returns the timestamps of pairs that became fully committed and
    /// were removed.
    pub fn commit_all(&self, package: &str) -> Result<Vec<u64>> {
        let mut reports = self.lock();
        let mut removed = Vec::new();
        let timestamps: Vec<u64> = reports.keys().copied().collect();
        for ts in timestamps {
            let Some(report) = reports.get_mut(&ts) else {
                continue;
            };
            let identities: Vec<ReportIdentity> = report
                .envelope()
                .requests
                .iter()
                .filter(|r| r.identity.package == package)
                .map(|r| r.identity.clone())
                .collect();
            if identities.is_empty() {
                continue;
            }
            for identity in &identities {
                report
                    .envelope_mut()
                    .set_status(identity, ird_common::RequestStatus::Committed);
            }
            if report.envelope().all_committed() {
                report.remove_files();
                reports.remove(&ts);
                removed.push(ts);
            } else {
                report.save_envelope()?;
            }
        }
        Ok(removed)
    }

    /// Discard a report outright, unlinking its pair.
    pub fn remove(&self, timestamp_ns: u64) -> Result<()> {
        let mut reports = self.lock();
        let report = reports
            .remove(&timestamp_ns)
            .ok_or(StoreError::NotFound { timestamp_ns })?;
        report.remove_files();
        Ok(())
    }

    /// Evict oldest pairs until the store is back under its budgets.
    ///
    /// Every eviction is logged; nothing is deleted silently.
    pub fn enforce_retention(&self) -> Vec<u64> {
        let mut reports = self.lock();
        let mut evicted = Vec::new();
        loop {
            let count = reports.len();
            let total_bytes: u64 = reports.values().map(|r| r.disk_usage()).sum();
            let over_count = count > self.limits.max_report_count;
            let over_bytes = total_bytes > self.limits.max_total_bytes;
            if !over_count && !over_bytes {
                break;
            }
            let Some((&oldest, _)) = reports.iter().next() else {
                break;
            };
            if let Some(report) = reports.remove(&oldest) {
                info!(
                    timestamp_ns = oldest,
                    bytes = report.disk_usage(),
                    over_count,
                    over_bytes,
                    "evicting oldest report pair"
                );
                report.remove_files();
                evicted.push(oldest);
            }
        }
        evicted
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<u64, ReportFile>> {
        self.reports.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// The integrity gate: exists, is a directory, mode 0770, expected owner.
fn check_directory(dir: &Path, uid: u32, gid: u32) -> Result<()> {
    let denied = |detail: String| StoreError::PermissionDenied {
        dir: dir.display().to_string(),
        detail,
    };
    let meta = fs::metadata(dir).map_err(|e| denied(format!("cannot stat: {}", e)))?;
    if !meta.is_dir() {
        return Err(denied("not a directory".to_string()));
    }
    let mode = meta.mode() & 0o7777;
    if mode != REQUIRED_MODE {
        return Err(denied(format!(
            "mode {:04o}, required {:04o}",
            mode, REQUIRED_MODE
        )));
    }
    if meta.uid() != uid || meta.gid() != gid {
        return Err(denied(format!(
            "owned by {}:{}, required {}:{}",
            meta.uid(),
            meta.gid(),
            uid,
            gid
        )));
    }
    Ok(())
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
