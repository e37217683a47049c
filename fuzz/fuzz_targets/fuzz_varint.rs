//! Fuzz target for varint and tag decoding.
//!
//! Decoding arbitrary bytes must never panic, and every successful decode
//! must re-encode to bytes that decode to the same value.

#![no_main]

use ird_redact::wire::{read_varint, split_tag, write_varint};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut pos = 0;
    if let Ok(value) = read_varint(data, &mut pos) {
        let mut out = Vec::new();
        write_varint(&mut out, value);
        let mut check = 0;
        let reread = read_varint(&out, &mut check).expect("canonical encoding must decode");
        assert_eq!(reread, value);
        assert_eq!(check, out.len());
        let _ = split_tag(value, 0);
    }
});
