//! Error types for protocol operations.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during protocol operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Frame or payload does not start with the expected literal tag.
    #[error("Tag mismatch: expected {expected:?}")]
    TagMismatch {
        /// The tag that was required.
        expected: &'static str,
    },

    /// Base64 decoding failed.
    #[error("Base64 error: {0}")]
    Base64(String),

    /// Raw deflate stream could not be inflated.
    #[error("Decompression error: {0}")]
    Decompression(String),

    /// Inflated bundle is not a valid bundle record.
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// Chunk frame body is not a valid chunk record.
    #[error("Malformed chunk: {0}")]
    MalformedChunk(String),

    /// Chunk index outside its declared total.
    #[error("Invalid chunk index: {index} >= total {total}")]
    InvalidChunkIndex {
        /// The invalid index.
        index: u32,
        /// Total number of chunks.
        total: u32,
    },

    /// Chunk count of zero or above the protocol limit.
    #[error("Too many chunks: max {max}, got {actual}")]
    TooManyChunks {
        /// Maximum allowed chunks.
        max: u32,
        /// Actual chunk count.
        actual: u64,
    },

    /// Two chunks of one session disagree on the total.
    #[error("Protocol violation in session {session_id}: total {actual} != {expected}")]
    ProtocolViolation {
        /// Offending session.
        session_id: String,
        /// Total recorded from the first chunk.
        expected: u32,
        /// Total carried by the conflicting chunk.
        actual: u32,
    },

    /// Frame belongs to a different session than the caller expected.
    #[error("Session mismatch: expected {expected}, got {actual}")]
    SessionMismatch {
        /// Session the caller is collecting.
        expected: String,
        /// Session named in the frame.
        actual: String,
    },

    /// Session id fails validation.
    #[error("Invalid session id: {0}")]
    InvalidSessionId(String),

    /// Too many pending reassembly sessions (DoS prevention).
    #[error("Too many pending reassembly sessions: {current} exceeds maximum {max}")]
    TooManyPendingSessions {
        /// Current number of pending sessions.
        current: usize,
        /// Maximum allowed sessions.
        max: usize,
    },

    /// Reassembly buffer size exceeded (DoS prevention).
    #[error("Reassembly buffer size exceeded: {size} bytes exceeds maximum {max} bytes")]
    ReassemblyBufferExceeded {
        /// Buffer size the chunk would produce.
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Inflated bundle exceeds the decompression limit.
    #[error("Payload too large: {size} bytes exceeds maximum {max} bytes")]
    PayloadTooLarge {
        /// Observed size (lower bound when the stream was cut off).
        size: usize,
        /// Maximum allowed size.
        max: usize,
    },

    /// Frame exceeds the byte capacity of the largest QR symbol.
    #[error("Frame too large: {len} bytes exceeds symbol capacity {capacity}")]
    FrameTooLarge {
        /// Frame length in bytes.
        len: usize,
        /// Capacity at the selected error correction level.
        capacity: usize,
    },

    /// QR rasterization or image encoding failed.
    #[error("Render error: {0}")]
    Render(String),

    /// Bundle field rejected before encoding.
    #[error("Invalid bundle: {0}")]
    InvalidBundle(String),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(#[from] crate::config::ConfigError),
}

impl ProtocolError {
    /// Whether this error comes from inverse-decoding a bundle payload.
    ///
    /// The reassembler reports all of these as a single corrupt payload.
    pub fn is_payload_corruption(&self) -> bool {
        matches!(
            self,
            Self::TagMismatch { .. }
                | Self::Base64(_)
                | Self::Decompression(_)
                | Self::MalformedRecord(_)
                | Self::PayloadTooLarge { .. }
        )
    }
}

/// Terminal failure of a reassembly session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionFailure {
    /// Chunks sharing a session id disagreed on the total.
    ProtocolViolation {
        /// Total recorded from the first chunk.
        expected: u32,
        /// Total carried by the conflicting chunk.
        actual: u32,
    },
    /// All chunks arrived but the joined payload did not decode.
    CorruptPayload(String),
}

impl std::fmt::Display for SessionFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ProtocolViolation { expected, actual } => {
                write!(f, "protocol violation: total {actual} != {expected}")
            }
            Self::CorruptPayload(reason) => write!(f, "corrupt payload: {reason}"),
        }
    }
}

/// Result type for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;
