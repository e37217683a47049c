//! Minimal protobuf wire-format operations.
//!
//! Only what redaction needs: tag and length varints, and the four wire
//! kinds. Payloads are treated as opaque byte spans; nothing here decodes a
//! value varint into a host integer, which keeps negative and oversized
//! encodings bit-exact through a strip pass.

use crate::error::{RedactError, Result};
use serde::{Deserialize, Serialize};

/// Longest legal varint encoding of a u64.
const MAX_VARINT_LEN: usize = 10;

/// Protobuf wire type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WireKind {
    /// Wire type 0: base-128 varint.
    Varint,
    /// Wire type 1: 8 fixed bytes.
    Fixed64,
    /// Wire type 2: length varint followed by that many bytes.
    LengthDelimited,
    /// Wire type 5: 4 fixed bytes.
    Fixed32,
}

impl WireKind {
    /// Decode from the low three bits of a field tag.
    pub fn from_tag_bits(bits: u8) -> Option<Self> {
        match bits {
            0 => Some(WireKind::Varint),
            1 => Some(WireKind::Fixed64),
            2 => Some(WireKind::LengthDelimited),
            5 => Some(WireKind::Fixed32),
            _ => None,
        }
    }

    /// The low three bits this kind encodes to in a field tag.
    pub fn tag_bits(&self) -> u8 {
        match self {
            WireKind::Varint => 0,
            WireKind::Fixed64 => 1,
            WireKind::LengthDelimited => 2,
            WireKind::Fixed32 => 5,
        }
    }
}

/// Read one varint, advancing `pos`.
///
/// Fails on a varint that runs past the end of `buf` or past the 10-byte
/// limit.
pub fn read_varint(buf: &[u8], pos: &mut usize) -> Result<u64> {
    let start = *pos;
    let mut value: u64 = 0;
    let mut shift = 0u32;
    loop {
        let byte = *buf
            .get(*pos)
            .ok_or_else(|| RedactError::malformed(start, "truncated varint"))?;
        *pos += 1;
        if *pos - start > MAX_VARINT_LEN {
            return Err(RedactError::malformed(start, "varint longer than 10 bytes"));
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok(value);
        }
        shift += 7;
        if shift >= 64 {
            return Err(RedactError::malformed(start, "varint overflows u64"));
        }
    }
}

/// Append the varint encoding of `value` to `out`.
pub fn write_varint(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Build a field tag from field id and wire kind.
pub fn make_tag(field_id: u32, kind: WireKind) -> u64 {
    (u64::from(field_id) << 3) | u64::from(kind.tag_bits())
}

/// Split a field tag into `(field_id, wire_kind)`.
pub fn split_tag(tag: u64, offset: usize) -> Result<(u32, WireKind)> {
    let bits = (tag & 0x7) as u8;
    let kind = WireKind::from_tag_bits(bits)
        .ok_or_else(|| RedactError::malformed(offset, format!("unknown wire type {}", bits)))?;
    let field_id = tag >> 3;
    if field_id == 0 || field_id > u64::from(u32::MAX) {
        return Err(RedactError::malformed(
            offset,
            format!("field id {} out of range", field_id),
        ));
    }
    Ok((field_id as u32, kind))
}

/// Append `[tag][length][bytes]` framing for a length-delimited field.
///
/// This is the outer section framing: sections are written to the data file
/// as length-delimited fields of the report message.
pub fn write_length_delimited(out: &mut Vec<u8>, field_id: u32, bytes: &[u8]) {
    write_varint(out, make_tag(field_id, WireKind::LengthDelimited));
    write_varint(out, bytes.len() as u64);
    out.extend_from_slice(bytes);
}
