//! Session identifiers tying the chunks of one transmission together.

use std::fmt;

use rand::Rng;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};

use crate::error::{ProtocolError, Result};
use crate::limits::{GENERATED_SESSION_ID_LEN, MAX_SESSION_ID_LEN};

/// Characters used in generated ids. Omits 0/O and 1/I.
const ID_ALPHABET: &[u8] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";

/// Prefix of ids derived from bare `GLYW:` frames.
const BARE_PAYLOAD_PREFIX: &str = "GLYW-";

/// Identifier shared by every chunk of one transmitted payload.
///
/// Valid ids are 1 to [`MAX_SESSION_ID_LEN`] printable ASCII characters,
/// excluding `"` and `\` so the id never needs escaping inside a chunk.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Create a session id from a caller-chosen string.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::InvalidSessionId`] if the id is empty, too
    /// long, or contains characters outside the allowed set.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if id.is_empty() || id.len() > MAX_SESSION_ID_LEN {
            return Err(ProtocolError::InvalidSessionId(format!(
                "length must be 1..={MAX_SESSION_ID_LEN}, got {}",
                id.len()
            )));
        }
        if let Some(c) = id
            .chars()
            .find(|c| !c.is_ascii_graphic() || *c == '"' || *c == '\\')
        {
            return Err(ProtocolError::InvalidSessionId(format!(
                "invalid character {c:?}"
            )));
        }
        Ok(Self(id))
    }

    /// Generate a fresh random id such as `W7KQ2MZD`.
    pub fn generate() -> Self {
        let mut rng = OsRng;
        let mut id = String::with_capacity(GENERATED_SESSION_ID_LEN);
        id.push('W');
        for _ in 1..GENERATED_SESSION_ID_LEN {
            id.push(ID_ALPHABET[rng.gen_range(0..ID_ALPHABET.len())] as char);
        }
        Self(id)
    }

    /// Deterministic id for a frame that carries a whole bundle.
    ///
    /// Rescanning the same frame yields the same id.
    pub fn for_bare_payload(frame: &str) -> Self {
        let hash = blake3::hash(frame.as_bytes());
        let hex = hash.to_hex();
        Self(format!("{BARE_PAYLOAD_PREFIX}{}", &hex.as_str()[..16]))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for SessionId {
    type Error = ProtocolError;

    fn try_from(id: String) -> Result<Self> {
        Self::new(id)
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
