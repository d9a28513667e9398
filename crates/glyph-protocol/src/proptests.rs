//! Property-based tests for protocol components.
//!
//! These tests verify protocol invariants hold for arbitrary inputs:
//!
//! - Bundles survive an encode/decode cycle field for field
//! - Chunk counts and slice boundaries follow the base64 length
//! - Reassembly is independent of delivery order and repetition
//! - Interleaved sessions do not contaminate each other

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use proptest::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

use crate::bundle::{TemplateType, WebBundle, decode_bundle, encode_bundle};
use crate::chunking::{Chunk, ChunkReassembler, SessionId, SessionState, split_payload};
use crate::frame::ParsedFrame;

fn template_strategy() -> impl Strategy<Value = Option<TemplateType>> {
    prop_oneof![
        Just(None),
        Just(Some(TemplateType::Trivia)),
        Just(Some(TemplateType::Article)),
        Just(Some(TemplateType::Art)),
        Just(Some(TemplateType::Adventure)),
        "[a-z]{1,12}".prop_map(|tag| Some(TemplateType::from(tag))),
    ]
}

fn bundle_strategy(max_html: usize) -> impl Strategy<Value = WebBundle> {
    (
        ".{0,40}",
        prop::collection::vec(any::<char>(), 0..=max_html),
        template_strategy(),
        0.0f64..2.0e9,
    )
        .prop_map(|(title, html, template, created_at)| {
            let html: String = html.into_iter().collect();
            WebBundle::new(title, html, template)
                .with_created_at(created_at)
                .unwrap()
        })
}

fn session_id_strategy() -> impl Strategy<Value = SessionId> {
    "[A-Z0-9]{1,16}".prop_map(|id| SessionId::new(id).unwrap())
}

/// Feed chunks to a fresh reassembler and return the final state.
fn feed(reassembler: &mut ChunkReassembler, chunks: Vec<Chunk>) -> SessionState {
    let mut state = SessionState::Unseen;
    for chunk in chunks {
        state = reassembler.add_chunk(chunk, 1000).unwrap();
    }
    state
}

// ==================== Bundle Codec Property Tests ====================

proptest! {
    /// Any bundle decodes back to itself.
    #[test]
    fn bundle_roundtrip(bundle in bundle_strategy(2000)) {
        let payload = encode_bundle(&bundle).unwrap();
        prop_assert!(payload.starts_with("GLYW:"));
        prop_assert_eq!(decode_bundle(&payload).unwrap(), bundle);
    }

    /// Bodies up to 100,000 characters round-trip.
    #[test]
    fn large_body_roundtrip(len in 0usize..=100_000, c in any::<char>()) {
        let html: String = std::iter::repeat_n(c, len).collect();
        let bundle = WebBundle::new("big", html, None).with_created_at(1.5).unwrap();
        let payload = encode_bundle(&bundle).unwrap();
        prop_assert_eq!(decode_bundle(&payload).unwrap(), bundle);
    }

    /// Encoding is a pure function of the bundle.
    #[test]
    fn bundle_encoding_deterministic(bundle in bundle_strategy(500)) {
        prop_assert_eq!(encode_bundle(&bundle).unwrap(), encode_bundle(&bundle).unwrap());
    }

    /// Arbitrary text after the tag never panics the decoder.
    #[test]
    fn decode_arbitrary_payload_no_panic(body in ".{0,200}") {
        let _ = decode_bundle(&format!("GLYW:{body}"));
    }
}

// ==================== Chunking Property Tests ====================

proptest! {
    /// Chunk count is the base64 length over the slice size, rounded up.
    #[test]
    fn chunk_count_matches_base64_length(
        payload in ".{0,3000}",
        max_chunk_bytes in 1usize..1000,
    ) {
        let id = SessionId::new("W0000001").unwrap();
        let chunks = split_payload(&payload, &id, max_chunk_bytes).unwrap();
        let encoded = STANDARD.encode(payload.as_bytes());

        let expected = encoded.len().div_ceil(max_chunk_bytes).max(1);
        prop_assert_eq!(chunks.len(), expected);

        // No overlap, no gap.
        let joined: String = chunks.iter().map(Chunk::data).collect();
        prop_assert_eq!(joined, encoded);

        for (i, chunk) in chunks.iter().enumerate() {
            prop_assert_eq!(chunk.index() as usize, i);
            prop_assert_eq!(chunk.total() as usize, expected);
            prop_assert!(chunk.data().len() <= max_chunk_bytes);
        }
    }

    /// Every chunk survives its frame encoding.
    #[test]
    fn chunk_frames_parse_back(
        payload in ".{0,1500}",
        id in session_id_strategy(),
        max_chunk_bytes in 1usize..400,
    ) {
        for chunk in split_payload(&payload, &id, max_chunk_bytes).unwrap() {
            let frame = chunk.to_frame();
            prop_assert!(frame.starts_with("GLYC:"));
            prop_assert_eq!(ParsedFrame::parse(&frame).unwrap(), ParsedFrame::Chunk(chunk));
        }
    }
}

// ==================== Reassembly Property Tests ====================

proptest! {
    /// Any delivery order yields the same decoded bundle.
    #[test]
    fn permuted_delivery_reassembles(
        bundle in bundle_strategy(1500),
        max_chunk_bytes in 16usize..200,
        seed in any::<u64>(),
    ) {
        let id = SessionId::new("WPERM001").unwrap();
        let payload = encode_bundle(&bundle).unwrap();
        let mut chunks = split_payload(&payload, &id, max_chunk_bytes).unwrap();
        let total = chunks.len() as u32;
        chunks.shuffle(&mut StdRng::seed_from_u64(seed));

        let mut reassembler = ChunkReassembler::default();
        let state = feed(&mut reassembler, chunks);

        prop_assert_eq!(state, SessionState::Decoded { total });
        prop_assert_eq!(reassembler.take_completed(&id), Some(bundle));
    }

    /// Delivering every chunk twice changes nothing.
    #[test]
    fn repeated_delivery_is_idempotent(
        bundle in bundle_strategy(800),
        max_chunk_bytes in 16usize..120,
    ) {
        let id = SessionId::new("WIDEM001").unwrap();
        let payload = encode_bundle(&bundle).unwrap();
        let chunks = split_payload(&payload, &id, max_chunk_bytes).unwrap();
        let total = chunks.len() as u32;

        let mut reassembler = ChunkReassembler::default();
        for chunk in &chunks {
            let first = reassembler.add_chunk(chunk.clone(), 1000).unwrap();
            let second = reassembler.add_chunk(chunk.clone(), 1000).unwrap();
            prop_assert_eq!(&first, &second);
            if let SessionState::Collecting { total: seen, .. } = first {
                prop_assert_eq!(seen, total);
            }
        }

        prop_assert_eq!(reassembler.state(&id), SessionState::Decoded { total });
        prop_assert_eq!(reassembler.take_completed(&id), Some(bundle));
    }

    /// Two interleaved sessions each complete with their own bundle.
    #[test]
    fn interleaved_sessions_are_isolated(
        a in bundle_strategy(600),
        b in bundle_strategy(600),
        seed in any::<u64>(),
    ) {
        let id_a = SessionId::new("WSESSA01").unwrap();
        let id_b = SessionId::new("WSESSB01").unwrap();
        let mut chunks = split_payload(&encode_bundle(&a).unwrap(), &id_a, 40).unwrap();
        chunks.extend(split_payload(&encode_bundle(&b).unwrap(), &id_b, 40).unwrap());
        chunks.shuffle(&mut StdRng::seed_from_u64(seed));

        let mut reassembler = ChunkReassembler::default();
        feed(&mut reassembler, chunks);

        prop_assert_eq!(reassembler.take_completed(&id_a), Some(a));
        prop_assert_eq!(reassembler.take_completed(&id_b), Some(b));
    }

    /// A second total for the same session always fails it.
    #[test]
    fn total_mismatch_is_violation(total in 2u32..50, other in 2u32..50) {
        prop_assume!(total != other);
        let id = SessionId::new("WVIOL001").unwrap();

        let mut reassembler = ChunkReassembler::default();
        reassembler.add_chunk(Chunk::new(id.clone(), 0, total, "QQ==".into()).unwrap(), 1000).unwrap();
        let state = reassembler
            .add_chunk(Chunk::new(id.clone(), 1, other, "QQ==".into()).unwrap(), 1000)
            .unwrap();

        prop_assert!(
            matches!(state, SessionState::Failed(crate::error::SessionFailure::ProtocolViolation { .. })),
            "unexpected state {:?}",
            state
        );
    }

    /// Arbitrary scanned text never panics the reassembler.
    #[test]
    fn arbitrary_frames_no_panic(frames in prop::collection::vec(".{0,120}", 0..20)) {
        let mut reassembler = ChunkReassembler::default();
        for frame in &frames {
            let _ = reassembler.add_frame(frame, 1000);
        }
    }
}
