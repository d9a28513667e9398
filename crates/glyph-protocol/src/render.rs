//! Frame rendering: frame string to QR symbol PNG.
//!
//! Error correction and module size come from the configured length tiers;
//! the QR encoder picks the smallest symbol version that fits. Symbol
//! construction is delegated to the `qrcode` crate, rasterization and PNG
//! output to `image`.

use std::io::Cursor;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{ImageBuffer, ImageFormat, Luma};
use qrcode::QrCode;
use qrcode::types::{Color, EcLevel, Version};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{RenderConfig, RenderTier};
use crate::error::{ProtocolError, Result};
use crate::limits::{MAX_QR_VERSION, QR_V40_BYTE_CAPACITY};

/// QR error correction level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorCorrection {
    /// Recovers about 7% of codewords.
    L,
    /// Recovers about 15% of codewords.
    M,
    /// Recovers about 25% of codewords.
    Q,
    /// Recovers about 30% of codewords.
    H,
}

impl ErrorCorrection {
    fn ec_level(self) -> EcLevel {
        match self {
            Self::L => EcLevel::L,
            Self::M => EcLevel::M,
            Self::Q => EcLevel::Q,
            Self::H => EcLevel::H,
        }
    }
}

/// Byte-mode capacity of a version 40 symbol at the given level.
///
/// No frame longer than this can be rendered at that level.
pub fn byte_capacity(level: ErrorCorrection) -> usize {
    let index = match level {
        ErrorCorrection::L => 0,
        ErrorCorrection::M => 1,
        ErrorCorrection::Q => 2,
        ErrorCorrection::H => 3,
    };
    QR_V40_BYTE_CAPACITY[index]
}

/// A rendered QR symbol and the parameters chosen for it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedFrame {
    /// PNG image bytes.
    pub png: Vec<u8>,
    /// QR symbol version (1..=40).
    pub version: u8,
    /// Byte length of the encoded frame string.
    pub byte_len: usize,
    /// Error correction level used.
    pub error_correction: ErrorCorrection,
    /// Pixels per module.
    pub module_px: u32,
    /// Width and height of the image in pixels, border included.
    pub image_px: u32,
}

impl RenderedFrame {
    /// The PNG as a `data:` URI for embedding in HTML.
    pub fn to_data_uri(&self) -> String {
        let mut uri = String::from("data:image/png;base64,");
        STANDARD.encode_string(&self.png, &mut uri);
        uri
    }
}

/// Stateless renderer from frame strings to QR images.
#[derive(Debug, Clone, Default)]
pub struct FrameRenderer {
    config: RenderConfig,
}

impl FrameRenderer {
    /// Create a renderer with the given tiers and border.
    pub fn new(config: RenderConfig) -> Self {
        Self { config }
    }

    /// Tier that applies to a frame of `byte_len` bytes.
    pub fn tier_for(&self, byte_len: usize) -> RenderTier {
        self.config.tier_for(byte_len)
    }

    /// Render a frame string.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::FrameTooLarge`] if the frame does not fit a
    /// version 40 symbol at its tier's level, or [`ProtocolError::Render`]
    /// if encoding fails.
    pub fn render(&self, frame: &str) -> Result<RenderedFrame> {
        let byte_len = frame.len();
        let tier = self.tier_for(byte_len);
        let capacity = byte_capacity(tier.error_correction);
        if byte_len > capacity {
            return Err(ProtocolError::FrameTooLarge {
                len: byte_len,
                capacity,
            });
        }

        let level = tier.error_correction.ec_level();
        let code = QrCode::with_error_correction_level(frame.as_bytes(), level)
            .map_err(|e| ProtocolError::Render(e.to_string()))?;
        let version = match code.version() {
            Version::Normal(v) | Version::Micro(v) => u8::try_from(v)
                .ok()
                .filter(|v| *v <= MAX_QR_VERSION)
                .ok_or_else(|| ProtocolError::Render(format!("unexpected version {v}")))?,
        };

        let image = rasterize(&code, self.config.border_modules, tier.module_px);
        let image_px = image.width();

        let mut png = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
            .map_err(|e| ProtocolError::Render(e.to_string()))?;

        debug!(
            byte_len,
            version,
            level = ?tier.error_correction,
            module_px = tier.module_px,
            "frame rendered"
        );

        Ok(RenderedFrame {
            png,
            version,
            byte_len,
            error_correction: tier.error_correction,
            module_px: tier.module_px,
            image_px,
        })
    }
}

/// Paint modules as `module_px` squares inside a light border.
fn rasterize(code: &QrCode, border: u32, module_px: u32) -> ImageBuffer<Luma<u8>, Vec<u8>> {
    let width = code.width() as u32;
    let colors = code.to_colors();
    let size = (width + 2 * border) * module_px;

    ImageBuffer::from_fn(size, size, |x, y| {
        let mx = (x / module_px) as i64 - i64::from(border);
        let my = (y / module_px) as i64 - i64::from(border);
        let dark = (0..i64::from(width)).contains(&mx)
            && (0..i64::from(width)).contains(&my)
            && colors[(my * i64::from(width) + mx) as usize] == Color::Dark;
        if dark { Luma([0u8]) } else { Luma([255u8]) }
    })
}
