//! Section registry and report-level policy.
//!
//! A section definition says what to collect (file, command, or blocking
//! worker dump), under which timeout, at which destination tier, and which
//! scrub patterns apply to its content. The registry doubles as the source
//! of the report-level [`PolicySet`]: the persisted report is one wire
//! message whose fields are the sections, so filtering a whole report is
//! one pass against the report root.

use crate::error::{Result, ServiceError};
use ird_capture::{CommandSource, FileSource, SectionSource};
use ird_common::Destination;
use ird_redact::{NodeId, PolicyTree, PolicyTreeBuilder, WireKind};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// How a section's bytes are produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SourceKind {
    /// Read a file (including proc/sys pseudo-files).
    File { path: PathBuf },
    /// Spawn a command and capture stdout.
    Command { command: String, args: Vec<String> },
}

/// One entry in the section registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SectionDef {
    /// Field id of the section in the report message. Unique.
    pub id: u32,
    pub name: String,
    pub source: SourceKind,
    /// Per-section timeout; `None` uses the daemon default.
    #[serde(default)]
    pub timeout_ms: Option<u64>,
    /// Destination tier of the whole section; `None` inherits the report
    /// default (Explicit).
    #[serde(default)]
    pub destination: Option<Destination>,
    /// Scrub patterns applied to the section's content when kept.
    #[serde(default)]
    pub scrub_patterns: Vec<String>,
}

impl SectionDef {
    /// Instantiate the collection strategy for this section.
    pub fn make_source(&self) -> Box<dyn SectionSource> {
        match &self.source {
            SourceKind::File { path } => Box::new(FileSource::new(path.clone())),
            SourceKind::Command { command, args } => {
                Box::new(CommandSource::new(command.clone(), args.clone()))
            }
        }
    }

    pub fn timeout(&self, default: Duration) -> Duration {
        self.timeout_ms.map(Duration::from_millis).unwrap_or(default)
    }
}

/// The report-level policy: one tree whose root's children are the
/// sections, built once at startup and shared.
#[derive(Debug)]
pub struct PolicySet {
    tree: PolicyTree,
    report_root: NodeId,
}

impl PolicySet {
    /// Build the policy from the section registry. Sections are sorted by
    /// id to satisfy the sorted-children invariant.
    pub fn build(sections: &[SectionDef]) -> Result<Self> {
        let mut defs: Vec<&SectionDef> = sections.iter().collect();
        defs.sort_by_key(|d| d.id);
        defs.dedup_by_key(|d| d.id);
        if defs.len() != sections.len() {
            return Err(ServiceError::InvalidConfig(
                "duplicate section ids in registry".to_string(),
            ));
        }

        let mut builder = PolicyTreeBuilder::new();
        let report_root = builder.message(0);
        let mut children = Vec::with_capacity(defs.len());
        for def in defs {
            let node = builder.leaf(def.id, WireKind::LengthDelimited);
            if let Some(dest) = def.destination {
                builder.set_destination(node, dest);
            }
            for pattern in &def.scrub_patterns {
                builder.add_scrub_pattern(node, pattern)?;
            }
            children.push(node);
        }
        builder
            .set_children(report_root, children)
            .map_err(ServiceError::Redact)?;

        Ok(Self {
            tree: builder.build(),
            report_root,
        })
    }

    pub fn policy(&self) -> (&PolicyTree, NodeId) {
        (&self.tree, self.report_root)
    }
}

/// The stock registry collected when no custom one is configured.
pub fn default_sections() -> Vec<SectionDef> {
    vec![
        SectionDef {
            id: 1000,
            name: "kernel_version".to_string(),
            source: SourceKind::File {
                path: PathBuf::from("/proc/version"),
            },
            timeout_ms: Some(2_000),
            destination: Some(Destination::Automatic),
            scrub_patterns: Vec::new(),
        },
        SectionDef {
            id: 1100,
            name: "uptime".to_string(),
            source: SourceKind::File {
                path: PathBuf::from("/proc/uptime"),
            },
            timeout_ms: Some(2_000),
            destination: Some(Destination::Automatic),
            scrub_patterns: Vec::new(),
        },
        SectionDef {
            id: 2000,
            name: "meminfo".to_string(),
            source: SourceKind::File {
                path: PathBuf::from("/proc/meminfo"),
            },
            timeout_ms: Some(2_000),
            destination: Some(Destination::Explicit),
            scrub_patterns: Vec::new(),
        },
        SectionDef {
            id: 3000,
            name: "processes".to_string(),
            source: SourceKind::Command {
                command: "ps".to_string(),
                args: vec!["-eo".to_string(), "pid,ppid,stat,etime,comm".to_string()],
            },
            timeout_ms: Some(10_000),
            destination: Some(Destination::Explicit),
            scrub_patterns: Vec::new(),
        },
        SectionDef {
            id: 4000,
            name: "kernel_log".to_string(),
            source: SourceKind::Command {
                command: "dmesg".to_string(),
                args: Vec::new(),
            },
            timeout_ms: Some(10_000),
            // Log lines can carry identifiers; keep them device-local
            // unless consent widens the report, and scrub the classics.
            destination: Some(Destination::Local),
            scrub_patterns: vec![
                r"(?i)[0-9a-f]{2}(:[0-9a-f]{2}){5}".to_string(),
                r"[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}".to_string(),
            ],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use ird_common::PolicySpec;
    use ird_redact::strip;

    #[test]
    fn test_default_sections_build_policy() {
        let sections = default_sections();
        let set = PolicySet::build(&sections).unwrap();
        let (tree, root) = set.policy();
        for def in &sections {
            assert!(tree.lookup(root, def.id).is_some(), "section {}", def.id);
        }
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let mut sections = default_sections();
        sections[1].id = sections[0].id;
        assert!(matches!(
            PolicySet::build(&sections),
            Err(ServiceError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_unsorted_registry_is_sorted_internally() {
        let mut sections = default_sections();
        sections.reverse();
        assert!(PolicySet::build(&sections).is_ok());
    }

    #[test]
    fn test_report_policy_admits_by_section_tier() {
        let set = PolicySet::build(&default_sections()).unwrap();
        let (tree, root) = set.policy();

        // Report with two framed sections: 1000 (automatic), 4000 (local).
        let mut report = Vec::new();
        ird_redact::wire::write_length_delimited(&mut report, 1000, b"Linux version");
        ird_redact::wire::write_length_delimited(&mut report, 4000, b"boring log line");

        let explicit = strip(
            &report,
            tree,
            root,
            &PolicySpec::new(Destination::Explicit),
        )
        .unwrap();
        // The local-tier kernel log is stripped for an explicit request.
        let mut expected = Vec::new();
        ird_redact::wire::write_length_delimited(&mut expected, 1000, b"Linux version");
        assert_eq!(explicit, expected);
    }

    #[test]
    fn test_section_scrub_patterns_apply() {
        let set = PolicySet::build(&default_sections()).unwrap();
        let (tree, root) = set.policy();

        let mut report = Vec::new();
        ird_redact::wire::write_length_delimited(
            &mut report,
            4000,
            b"wlan0 peer aa:bb:cc:dd:ee:ff associated",
        );
        let local = strip(&report, tree, root, &PolicySpec::new(Destination::Local)).unwrap();
        // A local request keeps everything verbatim, patterns included.
        assert_eq!(local, report);
    }

    #[test]
    fn test_make_source_kinds() {
        let sections = default_sections();
        assert!(sections[0].make_source().describe().starts_with("file:"));
        assert!(sections[3].make_source().describe().starts_with("cmd:"));
    }

    #[test]
    fn test_timeout_fallback() {
        let def = SectionDef {
            id: 1,
            name: "x".to_string(),
            source: SourceKind::File {
                path: PathBuf::from("/proc/version"),
            },
            timeout_ms: None,
            destination: None,
            scrub_patterns: Vec::new(),
        };
        assert_eq!(def.timeout(Duration::from_secs(7)), Duration::from_secs(7));
    }

    #[test]
    fn test_registry_serde_roundtrip() {
        let sections = default_sections();
        let json = serde_json::to_string_pretty(&sections).unwrap();
        let back: Vec<SectionDef> = serde_json::from_str(&json).unwrap();
        assert_eq!(back.len(), sections.len());
        assert_eq!(back[0].id, sections[0].id);
    }
}
