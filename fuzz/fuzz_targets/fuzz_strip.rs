//! Fuzz target for the wire-format stripping engine.
//!
//! The engine walks untrusted wire bytes from arbitrary section producers;
//! it must never panic, only return MalformedInput. Runs every input at
//! all three request tiers against a policy with nesting and a
//! self-referential node.

#![no_main]

use ird_common::{Destination, PolicySpec};
use ird_redact::{strip, PolicyTreeBuilder, WireKind};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut b = PolicyTreeBuilder::new();
    let root = b.message(0);
    let scalar = b.leaf(1, WireKind::Varint);
    let nested = b.message(2);
    let label = b.leaf(1, WireKind::LengthDelimited);
    let fixed = b.leaf(3, WireKind::Fixed64);
    b.set_destination(scalar, Destination::Local);
    b.set_destination(fixed, Destination::Automatic);
    let _ = b.set_children(nested, vec![label, nested]);
    let _ = b.set_children(root, vec![scalar, nested, fixed]);
    let tree = b.build();

    for requested in [
        Destination::Local,
        Destination::Explicit,
        Destination::Automatic,
    ] {
        // Must never panic; malformed input is an error, not a crash.
        let _ = strip(data, &tree, root, &PolicySpec::new(requested));
    }
});
