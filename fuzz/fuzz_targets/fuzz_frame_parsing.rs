//! Fuzz target for frame parsing.
//!
//! Scanned text is untrusted; parsing must reject garbage without panicking.

#![no_main]

use glyph_protocol::frame::ParsedFrame;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    if let Ok(text) = std::str::from_utf8(data) {
        if let Ok(ParsedFrame::Chunk(chunk)) = ParsedFrame::parse(text) {
            // Anything accepted is a valid chunk and re-encodes to a parseable frame.
            assert!(chunk.index() < chunk.total());
            let again = ParsedFrame::parse(&chunk.to_frame()).unwrap();
            assert_eq!(again, ParsedFrame::Chunk(chunk));
        }
    }
});
