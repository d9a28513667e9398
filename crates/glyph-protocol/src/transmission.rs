//! Display-side pipeline: bundle to ordered chunk frames.
//!
//! Encoding is stateless and deterministic for a given bundle and session
//! id; only [`encode_bundle_frames`] draws a random id.

use serde::Serialize;
use tracing::info;

use crate::bundle::{BundleStats, WebBundle, encode_bundle_with_stats};
use crate::chunking::{SessionId, split_into_frames};
use crate::config::ProtocolConfig;
use crate::error::Result;
use crate::frame::Frame;
use crate::limits::{MAX_CHUNK_BYTES, SCAN_SECS_PER_FRAME};
use crate::render::{FrameRenderer, RenderedFrame};

/// A bundle encoded into the frames that carry it.
#[derive(Debug, Clone, PartialEq)]
pub struct Transmission {
    session_id: SessionId,
    frames: Vec<Frame>,
    stats: BundleStats,
}

impl Transmission {
    /// Session id shared by every frame.
    pub fn session_id(&self) -> &SessionId {
        &self.session_id
    }

    /// Frames in index order.
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Frame strings in index order.
    pub fn frame_strings(&self) -> Vec<String> {
        self.frames.iter().map(|f| f.as_str().to_string()).collect()
    }

    /// Number of frames.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    /// Size figures of the encoded bundle.
    pub fn bundle_stats(&self) -> &BundleStats {
        &self.stats
    }

    /// Rough time to scan every frame once.
    pub fn estimated_scan_secs(&self) -> f64 {
        self.frames.len() as f64 * SCAN_SECS_PER_FRAME
    }

    /// Render every frame in order.
    pub fn render(&self, renderer: &FrameRenderer) -> Result<Vec<RenderedFrame>> {
        self.frames.iter().map(|f| renderer.render(f.as_str())).collect()
    }

    /// Summarize the transmission, including symbol versions if the frames
    /// have been rendered.
    pub fn summary(&self, rendered: Option<&[RenderedFrame]>) -> TransmissionSummary {
        TransmissionSummary {
            session_id: self.session_id.clone(),
            frame_count: self.frames.len(),
            json_bytes: self.stats.json_bytes,
            compressed_bytes: self.stats.compressed_bytes,
            payload_bytes: self.stats.payload_bytes,
            compression_ratio: self.stats.compression_ratio(),
            max_frame_bytes: self.frames.iter().map(Frame::byte_len).max().unwrap_or(0),
            max_qr_version: rendered.and_then(|r| r.iter().map(|f| f.version).max()),
            estimated_scan_secs: self.estimated_scan_secs(),
        }
    }
}

/// Figures an operator looks at before putting frames on screen.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransmissionSummary {
    /// Session id of the frames.
    pub session_id: SessionId,
    /// Number of frames.
    pub frame_count: usize,
    /// Canonical JSON size.
    pub json_bytes: usize,
    /// Deflated size.
    pub compressed_bytes: usize,
    /// Tagged payload size.
    pub payload_bytes: usize,
    /// JSON size over deflated size.
    pub compression_ratio: f64,
    /// Longest frame in bytes.
    pub max_frame_bytes: usize,
    /// Highest symbol version among rendered frames.
    pub max_qr_version: Option<u8>,
    /// Rough time to scan every frame once.
    pub estimated_scan_secs: f64,
}

/// Encode a bundle into chunk frames under the given session id.
///
/// # Errors
///
/// Returns [`ProtocolError::Config`](crate::ProtocolError::Config) if the
/// configuration is invalid, or an encoding error.
pub fn encode_transmission(
    bundle: &WebBundle,
    session_id: SessionId,
    config: &ProtocolConfig,
) -> Result<Transmission> {
    config.validate()?;

    let (payload, stats) = encode_bundle_with_stats(bundle)?;
    let frames: Vec<Frame> =
        split_into_frames(&payload, &session_id, config.chunking.max_chunk_bytes)?
            .into_iter()
            .map(Frame::new)
            .collect();

    info!(
        session_id = %session_id,
        frames = frames.len(),
        json_bytes = stats.json_bytes,
        compressed_bytes = stats.compressed_bytes,
        "bundle encoded"
    );

    Ok(Transmission {
        session_id,
        frames,
        stats,
    })
}

/// Encode a bundle into ordered chunk frame strings with default settings
/// and a fresh session id.
///
/// # Example
///
/// ```
/// use glyph_protocol::bundle::{TemplateType, WebBundle};
/// use glyph_protocol::transmission::encode_bundle_frames;
///
/// let bundle = WebBundle::new("T", "<p>hi</p>", Some(TemplateType::Article));
/// let frames = encode_bundle_frames(&bundle).unwrap();
/// assert_eq!(frames.len(), 1);
/// assert!(frames[0].starts_with("GLYC:"));
/// ```
pub fn encode_bundle_frames(bundle: &WebBundle) -> Result<Vec<String>> {
    let (payload, _) = encode_bundle_with_stats(bundle)?;
    split_into_frames(&payload, &SessionId::generate(), MAX_CHUNK_BYTES)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bundle::TemplateType;
    use crate::chunking::ChunkReassembler;
    use crate::config::ProtocolConfigBuilder;
    use crate::error::ProtocolError;
    use crate::frame::CHUNK_TAG;

    fn article(html: String) -> WebBundle {
        WebBundle::new("Article", html, Some(TemplateType::Article))
            .with_created_at(1_750_000_000.75)
            .unwrap()
    }

    /// HTML that deflate cannot shrink much.
    fn dense_html(len: usize) -> String {
        let mut state = 0x2545_F491_u32;
        (0..len)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                char::from(b'a' + (state % 26) as u8)
            })
            .collect()
    }

    #[test]
    fn test_tiny_bundle_is_one_chunk_frame() {
        let bundle = WebBundle::new("T", "<p>hi</p>", Some(TemplateType::Article));
        let id = SessionId::new("W0000001").unwrap();
        let transmission =
            encode_transmission(&bundle, id.clone(), &ProtocolConfig::default()).unwrap();

        assert_eq!(transmission.frame_count(), 1);
        assert!(transmission.frames()[0].is_chunk());

        let mut reassembler = ChunkReassembler::default();
        let (got, state) = reassembler
            .add_frame(transmission.frames()[0].as_str(), 1000)
            .unwrap();
        assert_eq!(got, id);
        assert!(state.is_complete());
        assert_eq!(reassembler.take_completed(&id), Some(bundle));
    }

    #[test]
    fn test_large_bundle_splits() {
        let bundle = article(dense_html(6000));
        let id = SessionId::new("W0000002").unwrap();
        let transmission =
            encode_transmission(&bundle, id.clone(), &ProtocolConfig::default()).unwrap();

        assert!(transmission.frame_count() > 1);
        assert!(transmission.frame_strings().iter().all(|f| f.starts_with(CHUNK_TAG)));

        let summary = transmission.summary(None);
        assert_eq!(summary.frame_count, transmission.frame_count());
        assert!(summary.max_frame_bytes <= 1229);
        assert_eq!(summary.max_qr_version, None);
        assert!(
            (summary.estimated_scan_secs - 0.4 * transmission.frame_count() as f64).abs() < 1e-9
        );

        let mut reassembler = ChunkReassembler::default();
        for frame in transmission.frames().iter().rev() {
            reassembler.add_frame(frame.as_str(), 1000).unwrap();
        }
        assert_eq!(reassembler.take_completed(&id), Some(bundle));
    }

    #[test]
    fn test_rendered_summary() {
        let bundle = article(dense_html(1500));
        let id = SessionId::new("W0000003").unwrap();
        let transmission =
            encode_transmission(&bundle, id, &ProtocolConfig::default()).unwrap();

        let rendered = transmission.render(&FrameRenderer::default()).unwrap();
        assert_eq!(rendered.len(), transmission.frame_count());

        let summary = transmission.summary(Some(&rendered));
        let max_version = rendered.iter().map(|r| r.version).max();
        assert_eq!(summary.max_qr_version, max_version);
        assert!(summary.max_qr_version.unwrap() <= 40);
    }

    #[test]
    fn test_encoding_is_deterministic_for_fixed_id() {
        let bundle = article(dense_html(3000));
        let id = SessionId::new("W0000004").unwrap();
        let config = ProtocolConfig::default();

        let a = encode_transmission(&bundle, id.clone(), &config).unwrap();
        let b = encode_transmission(&bundle, id, &config).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ProtocolConfigBuilder::new().with_max_chunk_bytes(5000).build();
        let bundle = article("x".into());
        let result = encode_transmission(&bundle, SessionId::generate(), &config);
        assert!(matches!(result, Err(ProtocolError::Config(_))));
    }

    #[test]
    fn test_encode_bundle_frames_uses_fresh_ids() {
        let bundle = article("<p>same</p>".into());
        let a = encode_bundle_frames(&bundle).unwrap();
        let b = encode_bundle_frames(&bundle).unwrap();
        assert_ne!(a, b);
    }
}
