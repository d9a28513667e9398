//! Fuzz target for bundle payload decoding.
//!
//! Tests that corrupt or hostile `GLYW:` payloads fail cleanly, including
//! deflate streams that expand far beyond the payload cap.

#![no_main]

use glyph_protocol::bundle::{decode_bundle, encode_bundle};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };

    let payload = format!("GLYW:{text}");
    if let Ok(bundle) = decode_bundle(&payload) {
        // A decoded bundle must survive a second cycle unchanged.
        let encoded = encode_bundle(&bundle).unwrap();
        assert_eq!(decode_bundle(&encoded).unwrap(), bundle);
    }
});
