#![no_main]

use libfuzzer_sys::fuzz_target;
use noteboard::RawSnapshot;

fuzz_target!(|data: &[u8]| {
    // Decoding arbitrary bytes must never panic.
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let Ok(raw) = RawSnapshot::from_json(text) else {
        return;
    };

    // Anything accepted re-encodes to an equivalent delta.
    let json = raw.to_json().expect("decoded delta must encode");
    let again = RawSnapshot::from_json(&json).expect("encoded delta must decode");
    assert_eq!(again, raw);
});
