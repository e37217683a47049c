//! Wire-level privacy redaction for incident report sections.
//!
//! This crate implements the security-critical half of incidentd: given the
//! raw protobuf wire bytes of a collected section and a per-field privacy
//! policy, produce a copy with every inadmissible field removed.
//!
//! # Key Features
//!
//! - **Byte-exact stripping**: fields are kept or dropped whole; payload
//!   bytes are never decoded into host integers, so signed/width edge cases
//!   cannot corrupt data.
//! - **Arena-backed policy tree**: policy nodes live in a flat table and
//!   reference children by index, so self-referential schema types are just
//!   an index pointing at its own slot.
//! - **Fan-out**: one captured section can be filtered once per distinct
//!   requested tier and delivered to any number of writers, with per-writer
//!   failure isolation.
//! - **Fail-closed**: malformed wire data aborts the pass with an error
//!   rather than emitting unverified bytes.
//!
//! # Example
//!
//! ```
//! use ird_common::{Destination, PolicySpec};
//! use ird_redact::{strip, PolicyTreeBuilder, WireKind};
//!
//! let mut b = PolicyTreeBuilder::new();
//! let root = b.message(0);
//! let field = b.leaf(1, WireKind::Varint);
//! b.set_destination(field, Destination::Local);
//! b.set_children(root, vec![field]).unwrap();
//! let tree = b.build();
//!
//! // field 1, varint 150 — Local-tagged, so an explicit-tier request drops it
//! let raw = [0x08, 0x96, 0x01];
//! let out = strip(&raw, &tree, root, &PolicySpec::new(Destination::Explicit)).unwrap();
//! assert!(out.is_empty());
//! ```

pub mod engine;
pub mod error;
pub mod filter;
pub mod policy;
pub mod wire;

pub use engine::strip;
pub use error::{RedactError, Result};
pub use filter::{FilterOutcome, RedactionFilter};
pub use policy::{NodeId, PolicyNode, PolicyTree, PolicyTreeBuilder};
pub use wire::WireKind;
