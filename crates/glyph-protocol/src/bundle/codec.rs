//! Bundle codec: canonical JSON, raw deflate, base64 and the `GLYW:` tag.
//!
//! ```text
//! WebBundle -> compact JSON -> raw deflate (level 9, 15-bit window)
//!           -> standard base64 (padded, unwrapped) -> "GLYW:" + base64
//! ```
//!
//! Decoding reverses every step and fails as a whole: there is no partial
//! recovery of a bundle.

use std::io::{Read, Write};

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use flate2::Compression;
use flate2::read::DeflateDecoder;
use flate2::write::DeflateEncoder;
use serde::{Deserialize, Serialize};

use super::record::WebBundle;
use crate::error::{ProtocolError, Result};
use crate::limits::{BUNDLE_TAG, DEFLATE_LEVEL, MAX_BUNDLE_JSON_BYTES};

/// Size figures gathered while encoding a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BundleStats {
    /// Length of the canonical JSON in bytes.
    pub json_bytes: usize,
    /// Length of the deflated JSON in bytes.
    pub compressed_bytes: usize,
    /// Length of the tagged payload string in bytes.
    pub payload_bytes: usize,
}

impl BundleStats {
    /// JSON size divided by compressed size (0.0 for empty output).
    pub fn compression_ratio(&self) -> f64 {
        if self.compressed_bytes == 0 {
            return 0.0;
        }
        self.json_bytes as f64 / self.compressed_bytes as f64
    }
}

/// Encode a bundle into its tagged payload string.
///
/// # Example
///
/// ```
/// use glyph_protocol::bundle::{WebBundle, TemplateType, encode_bundle, decode_bundle};
///
/// let bundle = WebBundle::new("T", "<p>hi</p>", Some(TemplateType::Article));
/// let payload = encode_bundle(&bundle).unwrap();
/// assert!(payload.starts_with("GLYW:"));
/// assert_eq!(decode_bundle(&payload).unwrap(), bundle);
/// ```
pub fn encode_bundle(bundle: &WebBundle) -> Result<String> {
    encode_bundle_with_stats(bundle).map(|(payload, _)| payload)
}

/// Encode a bundle and report its size at each stage.
pub fn encode_bundle_with_stats(bundle: &WebBundle) -> Result<(String, BundleStats)> {
    let json = serde_json::to_vec(bundle)
        .map_err(|e| ProtocolError::InvalidBundle(format!("serialize: {e}")))?;
    let compressed = raw_deflate(&json)?;

    let mut payload = String::with_capacity(BUNDLE_TAG.len() + compressed.len().div_ceil(3) * 4);
    payload.push_str(BUNDLE_TAG);
    STANDARD.encode_string(&compressed, &mut payload);

    let stats = BundleStats {
        json_bytes: json.len(),
        compressed_bytes: compressed.len(),
        payload_bytes: payload.len(),
    };
    Ok((payload, stats))
}

/// Decode a tagged payload string back into a bundle.
///
/// # Errors
///
/// - [`ProtocolError::TagMismatch`] if the payload lacks the `GLYW:` prefix
/// - [`ProtocolError::Base64`] if the body is not standard base64
/// - [`ProtocolError::Decompression`] if the body is not a raw deflate stream
/// - [`ProtocolError::PayloadTooLarge`] if it inflates past the size limit
/// - [`ProtocolError::MalformedRecord`] if the JSON is not a bundle
pub fn decode_bundle(payload: &str) -> Result<WebBundle> {
    let body = payload
        .strip_prefix(BUNDLE_TAG)
        .ok_or(ProtocolError::TagMismatch {
            expected: BUNDLE_TAG,
        })?;
    let compressed = STANDARD
        .decode(body)
        .map_err(|e| ProtocolError::Base64(e.to_string()))?;
    let json = raw_inflate(&compressed, MAX_BUNDLE_JSON_BYTES)?;
    serde_json::from_slice(&json).map_err(|e| ProtocolError::MalformedRecord(e.to_string()))
}

fn raw_deflate(data: &[u8]) -> Result<Vec<u8>> {
    // flate2's raw encoder always uses a 15-bit window.
    let mut encoder = DeflateEncoder::new(Vec::new(), Compression::new(DEFLATE_LEVEL));
    encoder
        .write_all(data)
        .map_err(|e| ProtocolError::InvalidBundle(format!("deflate: {e}")))?;
    encoder
        .finish()
        .map_err(|e| ProtocolError::InvalidBundle(format!("deflate: {e}")))
}

fn raw_inflate(data: &[u8], limit: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    DeflateDecoder::new(data)
        .take(limit as u64 + 1)
        .read_to_end(&mut out)
        .map_err(|e| ProtocolError::Decompression(e.to_string()))?;

    if out.len() > limit {
        return Err(ProtocolError::PayloadTooLarge {
            size: out.len(),
            max: limit,
        });
    }
    Ok(out)
}
