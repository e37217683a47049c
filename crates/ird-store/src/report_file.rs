//! One report's on-disk pair: envelope plus data file.

use crate::envelope::ReportEnvelope;
use crate::error::{Result, StoreError};
use ird_common::PolicySpec;
use ird_redact::{NodeId, PolicyTree, RedactionFilter};
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Owner of a `<timestamp_ns>.envelope` / `<timestamp_ns>.data` pair.
///
/// The envelope lives in memory while the report is collecting; it reaches
/// disk only through [`ReportFile::save_envelope`], which either fully
/// succeeds or deletes the pair.
#[derive(Debug)]
pub struct ReportFile {
    envelope: ReportEnvelope,
    envelope_path: PathBuf,
    data_path: PathBuf,
    timestamp_ns: u64,
}

impl ReportFile {
    /// Create a fresh in-memory pair. Nothing touches disk yet.
    pub fn create(dir: &Path, timestamp_ns: u64) -> Self {
        let data_file_name = format!("{}.data", timestamp_ns);
        Self {
            envelope: ReportEnvelope::new(timestamp_ns, &data_file_name),
            envelope_path: dir.join(format!("{}.envelope", timestamp_ns)),
            data_path: dir.join(data_file_name),
            timestamp_ns,
        }
    }

    /// Load an existing pair from disk.
    ///
    /// A pair whose envelope cannot be read or parsed is unrecoverable:
    /// both files are deleted and the error surfaced — failing closed
    /// beats serving half-valid metadata.
    pub fn load(dir: &Path, timestamp_ns: u64) -> Result<Self> {
        let envelope_path = dir.join(format!("{}.envelope", timestamp_ns));
        let data_path = dir.join(format!("{}.data", timestamp_ns));
        let parsed = fs::read(&envelope_path)
            .map_err(StoreError::Io)
            .and_then(|bytes| {
                serde_json::from_slice::<ReportEnvelope>(&bytes).map_err(StoreError::Json)
            });
        match parsed {
            Ok(envelope) => Ok(Self {
                envelope,
                envelope_path,
                data_path,
                timestamp_ns,
            }),
            Err(e) => {
                warn!(timestamp_ns, error = %e, "unreadable envelope, deleting pair");
                remove_pair(&envelope_path, &data_path);
                Err(StoreError::CorruptEnvelope(format!(
                    "envelope {} unreadable: {}",
                    timestamp_ns, e
                )))
            }
        }
    }

    pub fn timestamp_ns(&self) -> u64 {
        self.timestamp_ns
    }

    pub fn envelope(&self) -> &ReportEnvelope {
        &self.envelope
    }

    pub fn envelope_mut(&mut self) -> &mut ReportEnvelope {
        &mut self.envelope
    }

    /// Persist the envelope. Writes a temp file and renames it into place;
    /// any failure deletes the whole pair so no partial envelope survives.
    pub fn save_envelope(&self) -> Result<()> {
        let result = (|| -> Result<()> {
            let json = serde_json::to_vec_pretty(&self.envelope)?;
            let tmp_path = self.envelope_path.with_extension("envelope.tmp");
            let mut tmp = fs::File::create(&tmp_path)?;
            tmp.write_all(&json)?;
            tmp.sync_all()?;
            drop(tmp);
            fs::rename(&tmp_path, &self.envelope_path)?;
            Ok(())
        })();
        if let Err(e) = result {
            warn!(timestamp_ns = self.timestamp_ns, error = %e, "envelope save failed, deleting pair");
            self.remove_files();
            return Err(e);
        }
        debug!(timestamp_ns = self.timestamp_ns, "envelope saved");
        Ok(())
    }

    /// Write the report's redacted payload and record its size and digest
    /// in the envelope. The envelope itself still needs a
    /// [`Self::save_envelope`].
    pub fn write_data(&mut self, bytes: &[u8]) -> Result<()> {
        fs::write(&self.data_path, bytes)?;
        self.envelope.data_file_size = bytes.len() as u64;
        self.envelope.data_sha256 = Some(hex::encode(Sha256::digest(bytes)));
        Ok(())
    }

    /// Read the payload back, verifying the recorded digest.
    pub fn read_data(&self) -> Result<Vec<u8>> {
        let bytes = fs::read(&self.data_path)?;
        if let Some(expected) = &self.envelope.data_sha256 {
            let actual = hex::encode(Sha256::digest(&bytes));
            if &actual != expected {
                return Err(StoreError::CorruptEnvelope(format!(
                    "data digest mismatch for report {}: expected {}, got {}",
                    self.timestamp_ns, expected, actual
                )));
            }
        }
        Ok(bytes)
    }

    /// Run the stored payload through one redaction pass at the requested
    /// tier and write every byte to `writer`.
    ///
    /// Blocks until fully written; callers needing non-blocking delivery
    /// run this on their own thread.
    pub fn start_filtering_data(
        &self,
        writer: &mut dyn Write,
        spec: PolicySpec,
        policy: Option<(&PolicyTree, NodeId)>,
    ) -> Result<u64> {
        let data = self.read_data()?;
        let mut filter = RedactionFilter::new(&data, policy);
        filter.register(spec, Box::new(&mut *writer));
        let mut outcomes = filter.run();
        match outcomes.pop() {
            Some(outcome) => Ok(outcome.result?),
            None => Ok(0),
        }
    }

    /// Unlink both files. Missing files are fine; other unlink failures
    /// are logged and swallowed (the retention pass will retry).
    pub fn remove_files(&self) {
        remove_pair(&self.envelope_path, &self.data_path);
    }

    /// On-disk footprint of the pair.
    pub fn disk_usage(&self) -> u64 {
        let size_of = |p: &Path| fs::metadata(p).map(|m| m.len()).unwrap_or(0);
        size_of(&self.envelope_path) + size_of(&self.data_path)
    }
}

fn remove_pair(envelope_path: &Path, data_path: &Path) {
    for path in [envelope_path, data_path] {
        if let Err(e) = fs::remove_file(path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %path.display(), error = %e, "failed to unlink report file");
            }
        }
    }
}
