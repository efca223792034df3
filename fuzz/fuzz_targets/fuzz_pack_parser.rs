//! Fuzz target for pack parsing, delta entries included.

#![no_main]

use gitgate_git::PackParser;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    // No external bases: REF_DELTA entries must resolve within the pack.
    let _ = PackParser::new(data).parse(|_| Ok(None));
});
