//! Fuzz target for envelope JSON parsing.
//!
//! Envelopes are read back from disk on every store open; parsing
//! arbitrary bytes must never panic, only return an error.

#![no_main]

use ird_store::ReportEnvelope;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let _ = serde_json::from_slice::<ReportEnvelope>(data);
});
