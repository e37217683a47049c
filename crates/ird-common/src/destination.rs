//! Privacy destination tiers and request specs.
//!
//! Every redactable field carries a destination tag describing how far it
//! may travel: `Local` data never leaves the device, `Explicit` data may be
//! shared after a user-visible consent step, `Automatic` data is safe for
//! unattended upload. The derived ordering (`Local < Explicit < Automatic`)
//! is load-bearing: admission checks compare tags against the requested
//! tier, so a wider tag always survives a narrower request.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Destination tier a field is tagged with, or a request asks for.
///
/// Ordered from most restrictive (`Local`) to most permissive
/// (`Automatic`). A policy node with no tag of its own inherits its
/// parent's; that absence is modeled as `Option<Destination>` rather than a
/// fourth variant.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "snake_case")]
pub enum Destination {
    /// Stays on the device; only local diagnostics may see it.
    Local,
    /// May be shared once the user has explicitly consented.
    #[default]
    Explicit,
    /// Safe for automatic, unattended upload.
    Automatic,
}

impl Destination {
    /// Parse a destination from its snake_case name.
    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "local" => Some(Destination::Local),
            "explicit" => Some(Destination::Explicit),
            "automatic" => Some(Destination::Automatic),
            _ => None,
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Destination::Local => "local",
            Destination::Explicit => "explicit",
            Destination::Automatic => "automatic",
        };
        write!(f, "{}", s)
    }
}

/// The privacy tier a report request was made at.
///
/// A field whose effective destination is at least `requested` is admitted;
/// everything narrower is stripped. A `Local` request therefore admits
/// every field, and an `Automatic` request admits only `Automatic`-tagged
/// fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PolicySpec {
    pub requested: Destination,
}

impl PolicySpec {
    pub fn new(requested: Destination) -> Self {
        Self { requested }
    }

    /// Whether a field with the given effective destination survives this
    /// request.
    pub fn admits(&self, effective: Destination) -> bool {
        effective >= self.requested
    }

    /// True when this spec admits every destination, so no stripping pass
    /// is needed at all.
    pub fn requires_all(&self) -> bool {
        self.requested == Destination::Local
    }
}
