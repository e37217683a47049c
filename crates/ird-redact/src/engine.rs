//! Recursive wire-format stripping.
//!
//! `strip` walks raw protobuf bytes against a policy node and a requested
//! tier, copying admissible fields verbatim and skipping the rest. Fields
//! are never value-decoded: a varint payload moves through the pass as the
//! bytes it arrived in, so negative and non-canonical encodings survive
//! bit-exact.
//!
//! Recursion terminates because every recursive call operates on a strictly
//! smaller sub-slice of a finite outer frame, even when the policy graph is
//! cyclic — cyclic policy is legal, cyclic data is impossible.

use crate::error::{RedactError, Result};
use crate::policy::{NodeId, PolicyTree};
use crate::wire::{self, WireKind};
use ird_common::{Destination, PolicySpec};
use regex::Regex;
use std::borrow::Cow;

/// Default destination for fields of a root with no tag of its own.
const ROOT_DEFAULT: Destination = Destination::Explicit;

/// Strip one section's raw bytes against a policy tree.
///
/// Returns the filtered copy. A spec that admits every tier returns the
/// input unchanged without walking it.
pub fn strip(raw: &[u8], tree: &PolicyTree, root: NodeId, spec: &PolicySpec) -> Result<Vec<u8>> {
    if spec.requires_all() {
        return Ok(raw.to_vec());
    }
    let parent_destination = tree.node(root).destination.unwrap_or(ROOT_DEFAULT);
    let mut out = Vec::with_capacity(raw.len());
    strip_message(tree, raw, 0, root, parent_destination, spec, &mut out)?;
    Ok(out)
}

/// Strip one message frame. `base` is the frame's offset in the outermost
/// input, used only for error reporting.
fn strip_message(
    tree: &PolicyTree,
    input: &[u8],
    base: usize,
    parent: NodeId,
    parent_destination: Destination,
    spec: &PolicySpec,
    out: &mut Vec<u8>,
) -> Result<()> {
    let rebase = |e: RedactError| match e {
        RedactError::MalformedInput { offset, detail } => RedactError::MalformedInput {
            offset: offset + base,
            detail,
        },
        other => other,
    };

    let mut pos = 0usize;
    while pos < input.len() {
        let field_start = pos;
        let tag = wire::read_varint(input, &mut pos).map_err(rebase)?;
        let (field_id, kind) = wire::split_tag(tag, base + field_start)?;
        let child = tree.lookup(parent, field_id);

        let nested_policy = match child {
            Some(c) if kind == WireKind::LengthDelimited => tree.node(c).has_children(),
            _ => false,
        };

        if nested_policy {
            // The field is itself a redactable submessage: open a fresh
            // frame, recurse over exactly the declared payload, and re-emit
            // with a length prefix computed from what was actually kept.
            let len_pos = pos;
            let declared = wire::read_varint(input, &mut pos).map_err(rebase)? as usize;
            let end = checked_end(input, pos, declared, base + len_pos)?;
            let body = &input[pos..end];
            let child_destination = tree.effective_destination(child, parent_destination);
            let mut nested = Vec::with_capacity(body.len());
            if let Some(c) = child {
                strip_message(tree, body, base + pos, c, child_destination, spec, &mut nested)?;
            }
            wire::write_varint(out, wire::make_tag(field_id, WireKind::LengthDelimited));
            wire::write_varint(out, nested.len() as u64);
            out.extend_from_slice(&nested);
            pos = end;
            continue;
        }

        // Leaf, or no policy entry at all: the whole tag+payload is kept or
        // dropped on the effective destination.
        let effective = tree.effective_destination(child, parent_destination);
        let keep = spec.admits(effective);

        match kind {
            WireKind::Varint => {
                wire::read_varint(input, &mut pos).map_err(rebase)?;
                if keep {
                    out.extend_from_slice(&input[field_start..pos]);
                }
            }
            WireKind::Fixed64 => {
                let end = checked_end(input, pos, 8, base + field_start)?;
                if keep {
                    out.extend_from_slice(&input[field_start..end]);
                }
                pos = end;
            }
            WireKind::Fixed32 => {
                let end = checked_end(input, pos, 4, base + field_start)?;
                if keep {
                    out.extend_from_slice(&input[field_start..end]);
                }
                pos = end;
            }
            WireKind::LengthDelimited => {
                let len_pos = pos;
                let declared = wire::read_varint(input, &mut pos).map_err(rebase)? as usize;
                let end = checked_end(input, pos, declared, base + len_pos)?;
                if keep {
                    let patterns = child
                        .map(|c| tree.node(c).scrub_patterns())
                        .unwrap_or(&[]);
                    match scrub_payload(patterns, &input[pos..end]) {
                        Some(clean) => {
                            wire::write_varint(
                                out,
                                wire::make_tag(field_id, WireKind::LengthDelimited),
                            );
                            wire::write_varint(out, clean.len() as u64);
                            out.extend_from_slice(&clean);
                        }
                        None => out.extend_from_slice(&input[field_start..end]),
                    }
                }
                pos = end;
            }
        }
    }
    Ok(())
}

/// Bounds-check a payload of `len` bytes starting at `pos`.
fn checked_end(input: &[u8], pos: usize, len: usize, err_offset: usize) -> Result<usize> {
    pos.checked_add(len)
        .filter(|&end| end <= input.len())
        .ok_or_else(|| {
            RedactError::malformed(
                err_offset,
                format!("declared length {} overruns enclosing frame", len),
            )
        })
}

/// Apply scrub patterns to a kept string payload.
///
/// Returns `None` when nothing changed (including non-UTF-8 payloads), so
/// the caller can copy the original bytes verbatim.
fn scrub_payload(patterns: &[Regex], body: &[u8]) -> Option<Vec<u8>> {
    if patterns.is_empty() {
        return None;
    }
    let text = std::str::from_utf8(body).ok()?;
    let mut current = Cow::Borrowed(text);
    for re in patterns {
        if let Cow::Owned(replaced) = re.replace_all(&current, "[REDACTED]") {
            current = Cow::Owned(replaced);
        }
    }
    match current {
        Cow::Borrowed(_) => None,
        Cow::Owned(s) => Some(s.into_bytes()),
    }
}
