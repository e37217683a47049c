//! Integration tests for stripping against a realistic section policy.
//!
//! Models a network-diagnostics section the way a schema would shape it:
//!
//! ```text
//! section {
//!   1: interface_count (varint, automatic)
//!   2: connection (message, repeated) {
//!        1: local_port  (varint, automatic)
//!        2: remote_host (string, local)
//!        3: bytes_moved (fixed64)          // inherits from connection
//!      } (explicit)
//!   3: owner_email (string, local)
//! }
//! ```

use ird_common::{Destination, PolicySpec};
use ird_redact::wire::{make_tag, write_varint};
use ird_redact::{strip, NodeId, PolicyTree, PolicyTreeBuilder, RedactError, WireKind};

fn network_policy() -> (PolicyTree, NodeId) {
    let mut b = PolicyTreeBuilder::new();
    let root = b.message(0);
    let if_count = b.leaf(1, WireKind::Varint);
    let connection = b.message(2);
    let local_port = b.leaf(1, WireKind::Varint);
    let remote_host = b.leaf(2, WireKind::LengthDelimited);
    let bytes_moved = b.leaf(3, WireKind::Fixed64);
    let owner_email = b.leaf(3, WireKind::LengthDelimited);

    b.set_destination(if_count, Destination::Automatic);
    b.set_destination(connection, Destination::Explicit);
    b.set_destination(local_port, Destination::Automatic);
    b.set_destination(remote_host, Destination::Local);
    b.set_destination(owner_email, Destination::Local);

    b.set_children(connection, vec![local_port, remote_host, bytes_moved])
        .unwrap();
    b.set_children(root, vec![if_count, connection, owner_email])
        .unwrap();
    (b.build(), root)
}

/// Hand-assemble the section: 2 interfaces, one connection, owner email.
fn sample_section() -> Vec<u8> {
    let mut connection = Vec::new();
    write_varint(&mut connection, make_tag(1, WireKind::Varint));
    write_varint(&mut connection, 443);
    write_varint(&mut connection, make_tag(2, WireKind::LengthDelimited));
    write_varint(&mut connection, 12);
    connection.extend_from_slice(b"host.example");
    write_varint(&mut connection, make_tag(3, WireKind::Fixed64));
    connection.extend_from_slice(&4096u64.to_le_bytes());

    let mut section = Vec::new();
    write_varint(&mut section, make_tag(1, WireKind::Varint));
    write_varint(&mut section, 2);
    write_varint(&mut section, make_tag(2, WireKind::LengthDelimited));
    write_varint(&mut section, connection.len() as u64);
    section.extend_from_slice(&connection);
    write_varint(&mut section, make_tag(3, WireKind::LengthDelimited));
    write_varint(&mut section, 13);
    section.extend_from_slice(b"ops@corp.test");
    section
}

#[test]
fn test_local_request_returns_input_unchanged() {
    let (tree, root) = network_policy();
    let section = sample_section();
    let out = strip(&section, &tree, root, &PolicySpec::new(Destination::Local)).unwrap();
    assert_eq!(out, section);
}

#[test]
fn test_explicit_request_strips_local_fields_and_reframes() {
    let (tree, root) = network_policy();
    let section = sample_section();
    let out = strip(
        &section,
        &tree,
        root,
        &PolicySpec::new(Destination::Explicit),
    )
    .unwrap();

    // Expected: if_count kept, connection kept minus remote_host (frame
    // length recomputed), owner_email dropped.
    let mut connection = Vec::new();
    write_varint(&mut connection, make_tag(1, WireKind::Varint));
    write_varint(&mut connection, 443);
    write_varint(&mut connection, make_tag(3, WireKind::Fixed64));
    connection.extend_from_slice(&4096u64.to_le_bytes());

    let mut expected = Vec::new();
    write_varint(&mut expected, make_tag(1, WireKind::Varint));
    write_varint(&mut expected, 2);
    write_varint(&mut expected, make_tag(2, WireKind::LengthDelimited));
    write_varint(&mut expected, connection.len() as u64);
    expected.extend_from_slice(&connection);

    assert_eq!(out, expected);
}

#[test]
fn test_automatic_request_keeps_only_automatic_leaves() {
    let (tree, root) = network_policy();
    let section = sample_section();
    let out = strip(
        &section,
        &tree,
        root,
        &PolicySpec::new(Destination::Automatic),
    )
    .unwrap();

    // The connection's own tag is the inheritance default for its
    // children, not a gate: recursion keeps the automatic-tier port and
    // drops remote_host (local) and bytes_moved (inherits explicit).
    let mut connection = Vec::new();
    write_varint(&mut connection, make_tag(1, WireKind::Varint));
    write_varint(&mut connection, 443);

    let mut expected = Vec::new();
    write_varint(&mut expected, make_tag(1, WireKind::Varint));
    write_varint(&mut expected, 2);
    write_varint(&mut expected, make_tag(2, WireKind::LengthDelimited));
    write_varint(&mut expected, connection.len() as u64);
    expected.extend_from_slice(&connection);
    assert_eq!(out, expected);
}

#[test]
fn test_admission_widens_monotonically() {
    let (tree, root) = network_policy();
    let section = sample_section();

    let local = strip(&section, &tree, root, &PolicySpec::new(Destination::Local)).unwrap();
    let explicit = strip(
        &section,
        &tree,
        root,
        &PolicySpec::new(Destination::Explicit),
    )
    .unwrap();
    let automatic = strip(
        &section,
        &tree,
        root,
        &PolicySpec::new(Destination::Automatic),
    )
    .unwrap();

    // Narrower requests keep supersets of wider requests' output.
    assert!(local.len() >= explicit.len());
    assert!(explicit.len() >= automatic.len());
}

#[test]
fn test_negative_varint_survives_bit_exact() {
    let (tree, root) = network_policy();
    // -1 as a protobuf int64: ten 0xff-ish bytes. Field 1 is automatic,
    // so it is kept under every request without being decoded.
    let mut section = Vec::new();
    write_varint(&mut section, make_tag(1, WireKind::Varint));
    section.extend_from_slice(&[0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0x01]);

    for requested in [
        Destination::Local,
        Destination::Explicit,
        Destination::Automatic,
    ] {
        let out = strip(&section, &tree, root, &PolicySpec::new(requested)).unwrap();
        assert_eq!(out, section);
    }
}

#[test]
fn test_garbage_after_valid_field_is_malformed() {
    let (tree, root) = network_policy();
    let mut section = Vec::new();
    write_varint(&mut section, make_tag(1, WireKind::Varint));
    write_varint(&mut section, 2);
    section.push(0x07); // tag with reserved wire type 7

    let err = strip(
        &section,
        &tree,
        root,
        &PolicySpec::new(Destination::Explicit),
    )
    .unwrap_err();
    assert!(matches!(err, RedactError::MalformedInput { .. }));
}

#[test]
fn test_deeply_nested_self_reference_terminates() {
    // node type: { 1: payload (local), 2: <self> } nested 64 levels deep.
    let mut b = PolicyTreeBuilder::new();
    let root = b.message(0);
    let node = b.message(2);
    let payload = b.leaf(1, WireKind::LengthDelimited);
    b.set_destination(payload, Destination::Local);
    b.set_children(node, vec![payload, node]).unwrap();
    b.set_children(root, vec![node]).unwrap();
    let tree = b.build();

    // Build innermost-out: each level wraps the previous in field 2.
    let mut frame = Vec::new();
    write_varint(&mut frame, make_tag(1, WireKind::LengthDelimited));
    write_varint(&mut frame, 4);
    frame.extend_from_slice(b"leaf");
    for _ in 0..64 {
        let mut outer = Vec::new();
        write_varint(&mut outer, make_tag(2, WireKind::LengthDelimited));
        write_varint(&mut outer, frame.len() as u64);
        outer.extend_from_slice(&frame);
        frame = outer;
    }

    let out = strip(&frame, &tree, root, &PolicySpec::new(Destination::Explicit)).unwrap();
    // Every payload stripped; 64 empty nested frames remain.
    assert!(out.len() < frame.len());
    assert!(!out.is_empty());
}
