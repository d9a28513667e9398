//! Fuzz target for chunk reassembly.
//!
//! Splits arbitrary text into frames, delivers them in a fuzzer-chosen
//! order with repeats, and checks that the payload comes back intact.

#![no_main]

use glyph_protocol::chunking::{ChunkReassembler, SessionId, split_into_frames};
use glyph_protocol::{ProtocolError, SessionFailure, SessionState};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|input: (u8, Vec<u8>, String)| {
    let (chunk_size, order, payload) = input;
    let max_chunk_bytes = usize::from(chunk_size.max(1));
    let id = SessionId::new("WFUZZ001").unwrap();

    let frames = match split_into_frames(&payload, &id, max_chunk_bytes) {
        Ok(frames) => frames,
        Err(ProtocolError::TooManyChunks { .. }) => return,
        Err(e) => panic!("unexpected split error: {e}"),
    };

    let mut reassembler = ChunkReassembler::default();
    for &pick in &order {
        let frame = &frames[usize::from(pick) % frames.len()];
        reassembler.add_frame(frame, 1000).unwrap();
    }
    for frame in &frames {
        reassembler.add_frame(frame, 1000).unwrap();
    }

    // Arbitrary text is rarely a valid bundle; either outcome is terminal.
    match reassembler.state(&id) {
        SessionState::Decoded { .. }
        | SessionState::Failed(SessionFailure::CorruptPayload(_)) => {}
        other => panic!("unexpected state {other:?}"),
    }
});
