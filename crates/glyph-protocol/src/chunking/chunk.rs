//! Chunk records and splitting logic.
//!
//! A tagged payload is re-encoded with base64 as a whole and the resulting
//! string is cut into fixed-size slices. Each slice travels in a chunk
//! record serialized as compact JSON, base64-encoded and tagged `GLYC:`.
//!
//! The second base64 layer is applied even when the payload is already
//! base64 (as `GLYW:` payloads are): chunk data is always base64 whatever
//! the payload's origin, which keeps the record trivially embeddable.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use super::session_id::SessionId;
use crate::config::ConfigError;
use crate::error::{ProtocolError, Result};
use crate::limits::{CHUNK_TAG, MAX_CHUNKS_PER_SESSION, MAX_SESSION_ID_LEN};

/// One indexed slice of a payload's base64 form.
///
/// Field order is the wire order: `sessionId`, `index`, `total`, `data`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chunk {
    /// Session the chunk belongs to.
    session_id: SessionId,
    /// Zero-based position of this slice.
    index: u32,
    /// Number of slices in the session.
    total: u32,
    /// Base64 slice.
    data: String,
}

impl Chunk {
    /// Create a validated chunk.
    ///
    /// # Errors
    ///
    /// Returns an error if `total` is zero or exceeds
    /// [`MAX_CHUNKS_PER_SESSION`], if `index >= total`, or if `data`
    /// contains characters outside the standard base64 alphabet.
    pub fn new(session_id: SessionId, index: u32, total: u32, data: String) -> Result<Self> {
        let chunk = Self {
            session_id,
            index,
            total,
            data,
        };
        chunk.validate()?;
        Ok(chunk)
    }

    /// Validate index, total and data alphabet.
    pub fn validate(&self) -> Result<()> {
        if self.total == 0 || self.total > MAX_CHUNKS_PER_SESSION {
            return Err(ProtocolError::TooManyChunks {
                max: MAX_CHUNKS_PER_SESSION,
                actual: u64::from(self.total),
            });
        }

        if self.index >= self.total {
            return Err(ProtocolError::InvalidChunkIndex {
                index: self.index,
                total: self.total,
            });
        }

        if let Some(c) = self
            .data
            .chars()
            .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '+' | '/' | '=')))
        {
            return Err(ProtocolError::MalformedChunk(format!(
                "data contains non-base64 character {c:?}"
            )));
        }

        Ok(())
    }

    /// Serialize into a `GLYC:` frame string.
    pub fn to_frame(&self) -> String {
        let json = serde_json::to_vec(self).expect("chunk of strings and integers serializes");
        let mut frame = String::with_capacity(CHUNK_TAG.len() + json.len().div_ceil(3) * 4);
        frame.push_str(CHUNK_TAG);
        STANDARD.encode_string(json, &mut frame);
        frame
    }

    /// Parse and validate a `GLYC:` frame string.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::TagMismatch`] if the frame is not tagged
    /// `GLYC:`, [`ProtocolError::MalformedChunk`] if the body does not
    /// decode to a chunk record, or a validation error from [`Chunk::new`].
    pub fn from_frame(frame: &str) -> Result<Self> {
        let body = frame
            .strip_prefix(CHUNK_TAG)
            .ok_or(ProtocolError::TagMismatch {
                expected: CHUNK_TAG,
            })?;
        let json = STANDARD
            .decode(body.trim_end())
            .map_err(|e| ProtocolError::MalformedChunk(format!("base64: {e}")))?;
        let chunk: Chunk = serde_json::from_slice(&json)
            .map_err(|e| ProtocolError::MalformedChunk(format!("json: {e}")))?;
        chunk.validate()?;
        Ok(chunk)
    }

    /// Session this chunk belongs to.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Zero-based index.
    pub fn index(&self) -> u32 {
        self.index
    }

    /// Total number of chunks in the session.
    pub fn total(&self) -> u32 {
        self.total
    }

    /// Base64 slice carried by this chunk.
    pub fn data(&self) -> &str {
        &self.data
    }

    /// Check if this is the first chunk (index 0).
    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    /// Check if this is the last chunk.
    pub fn is_last(&self) -> bool {
        self.index == self.total.saturating_sub(1)
    }

    /// Consume the chunk and return its data.
    pub fn into_data(self) -> String {
        self.data
    }
}

/// Punctuation and key names of a serialized chunk record.
const CHUNK_JSON_OVERHEAD: usize = r#"{"sessionId":"","index":,"total":,"data":""}"#.len();

/// Longest chunk frame a slice of `max_chunk_bytes` characters can
/// produce: maximum session id length, maximum index and total digits.
pub fn worst_case_frame_len(max_chunk_bytes: usize) -> usize {
    let digits = MAX_CHUNKS_PER_SESSION.to_string().len();
    let json_len = CHUNK_JSON_OVERHEAD + MAX_SESSION_ID_LEN + 2 * digits + max_chunk_bytes;
    CHUNK_TAG.len() + json_len.div_ceil(3) * 4
}

/// Number of chunks [`split_payload`] produces for a payload of
/// `payload_len` bytes.
pub fn expected_chunk_count(payload_len: usize, max_chunk_bytes: usize) -> usize {
    let encoded_len = payload_len.div_ceil(3) * 4;
    encoded_len.div_ceil(max_chunk_bytes.max(1)).max(1)
}

/// Split a payload into chunks of at most `max_chunk_bytes` base64
/// characters.
///
/// The payload is opaque: any string is accepted. Slice boundaries depend
/// only on its length. An empty payload yields a single empty chunk, so
/// every transmission has at least one frame.
///
/// # Errors
///
/// Returns an error if `max_chunk_bytes` is zero or the payload would need
/// more than [`MAX_CHUNKS_PER_SESSION`] chunks.
///
/// # Example
///
/// ```
/// use glyph_protocol::chunking::{SessionId, split_payload};
///
/// let id = SessionId::new("W0000001").unwrap();
/// let chunks = split_payload(&"x".repeat(1200), &id, 800).unwrap();
/// assert_eq!(chunks.len(), 2); // 1600 base64 characters
/// assert_eq!(chunks[1].total(), 2);
/// ```
pub fn split_payload(
    payload: &str,
    session_id: &SessionId,
    max_chunk_bytes: usize,
) -> Result<Vec<Chunk>> {
    if max_chunk_bytes == 0 {
        return Err(ConfigError::InvalidValue {
            field: "chunking.max_chunk_bytes".into(),
            reason: "chunk size must be greater than zero".into(),
        }
        .into());
    }

    let encoded = STANDARD.encode(payload.as_bytes());
    let count = expected_chunk_count(payload.len(), max_chunk_bytes);
    let total = u32::try_from(count)
        .ok()
        .filter(|total| *total <= MAX_CHUNKS_PER_SESSION)
        .ok_or(ProtocolError::TooManyChunks {
            max: MAX_CHUNKS_PER_SESSION,
            actual: count as u64,
        })?;

    if encoded.is_empty() {
        return Ok(vec![Chunk::new(session_id.clone(), 0, 1, String::new())?]);
    }

    // Base64 output is ASCII, so byte offsets are character boundaries.
    (0..encoded.len())
        .step_by(max_chunk_bytes)
        .zip(0u32..)
        .map(|(start, index)| {
            let end = (start + max_chunk_bytes).min(encoded.len());
            Chunk::new(
                session_id.clone(),
                index,
                total,
                encoded[start..end].to_string(),
            )
        })
        .collect()
}

/// Split a payload and serialize every chunk into its frame string.
pub fn split_into_frames(
    payload: &str,
    session_id: &SessionId,
    max_chunk_bytes: usize,
) -> Result<Vec<String>> {
    Ok(split_payload(payload, session_id, max_chunk_bytes)?
        .iter()
        .map(Chunk::to_frame)
        .collect())
}

/// Join slices in index order and recover the original payload string.
///
/// # Errors
///
/// Returns [`ProtocolError::Base64`] if the joined slices are not valid
/// base64, or [`ProtocolError::MalformedRecord`] if the decoded bytes are
/// not UTF-8.
pub fn join_slices<'a>(slices: impl IntoIterator<Item = &'a str>) -> Result<String> {
    let joined: String = slices.into_iter().collect();
    let bytes = STANDARD
        .decode(joined)
        .map_err(|e| ProtocolError::Base64(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ProtocolError::MalformedRecord(e.to_string()))
}
