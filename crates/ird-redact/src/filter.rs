//! Multi-subscriber filtering fan-out.
//!
//! One captured section is often wanted at several privacy tiers at once
//! (a local shell dump, an app that got explicit consent, a crash
//! uploader). `RedactionFilter` holds the capture's raw bytes immutably,
//! takes any number of `(spec, writer)` registrations, runs one stripping
//! pass per distinct spec, and delivers each result independently — a
//! failing writer never aborts its siblings.

use crate::engine::strip;
use crate::error::RedactError;
use crate::policy::{NodeId, PolicyTree};
use ird_common::{Destination, PolicySpec};
use std::io::Write;
use tracing::{debug, warn};

/// Outcome of one registered destination.
#[derive(Debug)]
pub struct FilterOutcome {
    pub spec: PolicySpec,
    /// Bytes written on success.
    pub result: Result<u64, RedactError>,
}

/// One strip pass's product, shared by every writer that asked for the
/// same spec.
enum Pass<'a> {
    Borrowed(&'a [u8]),
    Owned(Vec<u8>),
    Failed { offset: usize, detail: String },
}

impl Pass<'_> {
    fn bytes(&self) -> Option<&[u8]> {
        match self {
            Pass::Borrowed(b) => Some(b),
            Pass::Owned(v) => Some(v),
            Pass::Failed { .. } => None,
        }
    }
}

/// Fan-out filter over one capture's raw bytes.
pub struct RedactionFilter<'a> {
    raw: &'a [u8],
    /// Policy for this section, or `None` when the section has no policy
    /// object at all (treated as all-`Explicit`).
    policy: Option<(&'a PolicyTree, NodeId)>,
    requests: Vec<(PolicySpec, Box<dyn Write + 'a>)>,
}

impl<'a> RedactionFilter<'a> {
    pub fn new(raw: &'a [u8], policy: Option<(&'a PolicyTree, NodeId)>) -> Self {
        Self {
            raw,
            policy,
            requests: Vec::new(),
        }
    }

    /// Register a destination writer at the given tier.
    pub fn register(&mut self, spec: PolicySpec, writer: Box<dyn Write + 'a>) {
        self.requests.push((spec, writer));
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    /// Run one strip pass per distinct registered spec and deliver each
    /// result to its writers. Outcomes are reported in registration order.
    pub fn run(self) -> Vec<FilterOutcome> {
        let mut passes: Vec<(PolicySpec, Pass<'a>)> = Vec::new();
        for (spec, _) in &self.requests {
            if passes.iter().any(|(s, _)| s == spec) {
                continue;
            }
            passes.push((*spec, self.run_pass(spec)));
        }

        let mut outcomes = Vec::with_capacity(self.requests.len());
        for (spec, mut writer) in self.requests {
            let pass = passes
                .iter()
                .find(|(s, _)| *s == spec)
                .map(|(_, p)| p)
                .expect("pass computed for every registered spec");
            let result = match pass {
                Pass::Failed { offset, detail } => Err(RedactError::MalformedInput {
                    offset: *offset,
                    detail: detail.clone(),
                }),
                _ => {
                    let bytes = pass.bytes().unwrap_or(&[]);
                    match writer.write_all(bytes).and_then(|_| writer.flush()) {
                        Ok(()) => Ok(bytes.len() as u64),
                        Err(e) => {
                            warn!(spec = %spec.requested, error = %e, "destination write failed");
                            Err(RedactError::Io(e))
                        }
                    }
                }
            };
            outcomes.push(FilterOutcome { spec, result });
        }
        outcomes
    }

    fn run_pass(&self, spec: &PolicySpec) -> Pass<'a> {
        match self.policy {
            _ if spec.requires_all() => Pass::Borrowed(self.raw),
            None => {
                // No policy object at all: every field is effectively
                // Explicit, so the section is all-or-nothing.
                if spec.admits(Destination::Explicit) {
                    Pass::Borrowed(self.raw)
                } else {
                    Pass::Borrowed(&[])
                }
            }
            Some((tree, root)) => match strip(self.raw, tree, root, spec) {
                Ok(filtered) => {
                    debug!(
                        spec = %spec.requested,
                        raw_bytes = self.raw.len(),
                        kept_bytes = filtered.len(),
                        "strip pass complete"
                    );
                    Pass::Owned(filtered)
                }
                Err(RedactError::MalformedInput { offset, detail }) => {
                    warn!(spec = %spec.requested, offset, %detail, "malformed section data");
                    Pass::Failed { offset, detail }
                }
                Err(other) => {
                    // strip itself performs no I/O; any other variant is a
                    // policy construction bug surfaced late. Fail the pass.
                    warn!(spec = %spec.requested, error = %other, "strip pass failed");
                    Pass::Failed {
                        offset: 0,
                        detail: other.to_string(),
                    }
                }
            },
        }
    }
}
