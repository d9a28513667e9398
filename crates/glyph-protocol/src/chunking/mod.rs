//! Payload chunking and session reassembly.
//!
//! The sender splits a tagged payload into `GLYC:` chunk frames that share
//! a session id; the receiver feeds scanned frames to a
//! [`ChunkReassembler`] in any order until the session completes.
//!
//! # Example
//!
//! ```
//! use glyph_protocol::chunking::{ChunkReassembler, SessionId, split_into_frames};
//!
//! // Sender side: a payload too large for one frame
//! let payload = format!("GLYW:{}", "A".repeat(1995));
//! let id = SessionId::generate();
//! let frames = split_into_frames(&payload, &id, 800).unwrap();
//! assert_eq!(frames.len(), 4); // 2000 bytes -> 2668 base64 characters
//!
//! // Receiver side: order does not matter
//! let mut reassembler = ChunkReassembler::default();
//! for frame in frames.iter().rev() {
//!     let (session, _state) = reassembler.add_frame(frame, 1000).unwrap();
//!     assert_eq!(session, id);
//! }
//! assert_eq!(reassembler.pending_progress(&id), None);
//! ```

mod chunk;
mod reassembly;
mod session_id;

pub use chunk::{
    Chunk, expected_chunk_count, join_slices, split_into_frames, split_payload, worst_case_frame_len,
};
pub use reassembly::{ChunkReassembler, SessionState};
pub use session_id::SessionId;
