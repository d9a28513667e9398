//! Frame strings: the unit rendered as one QR symbol.
//!
//! A frame is either a whole bundle payload (`GLYW:`) or one chunk record
//! (`GLYC:`). Tags are matched by exact prefix.

use crate::chunking::{Chunk, SessionId};
use crate::error::{ProtocolError, Result};

pub use crate::limits::{BUNDLE_TAG, CHUNK_TAG};

/// A scanned frame after tag dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedFrame {
    /// A whole tagged bundle payload, left encoded.
    Bundle(String),
    /// A decoded and validated chunk record.
    Chunk(Chunk),
}

impl ParsedFrame {
    /// Classify and parse a scanned frame.
    ///
    /// Surrounding ASCII whitespace, which some scanners append, is
    /// ignored.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TagMismatch`] for a frame with neither tag,
    /// or a chunk parsing error for a `GLYC:` frame whose body is invalid.
    pub fn parse(frame: &str) -> Result<Self> {
        let frame = frame.trim_matches(|c: char| c.is_ascii_whitespace());
        if frame.starts_with(CHUNK_TAG) {
            Chunk::from_frame(frame).map(Self::Chunk)
        } else if frame.starts_with(BUNDLE_TAG) {
            Ok(Self::Bundle(frame.to_string()))
        } else {
            Err(ProtocolError::TagMismatch {
                expected: CHUNK_TAG,
            })
        }
    }

    /// Session the frame belongs to.
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Chunk(chunk) => chunk.session_id().clone(),
            Self::Bundle(payload) => SessionId::for_bare_payload(payload),
        }
    }
}

/// A frame string ready to render, with its byte length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    content: String,
}

impl Frame {
    /// Wrap a frame string.
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }

    /// The frame text.
    pub fn as_str(&self) -> &str {
        &self.content
    }

    /// Number of bytes the QR symbol must hold.
    pub fn byte_len(&self) -> usize {
        self.content.len()
    }

    /// Whether the frame carries a chunk record.
    pub fn is_chunk(&self) -> bool {
        self.content.starts_with(CHUNK_TAG)
    }

    /// Consume the frame and return its text.
    pub fn into_string(self) -> String {
        self.content
    }
}

impl AsRef<str> for Frame {
    fn as_ref(&self) -> &str {
        &self.content
    }
}
