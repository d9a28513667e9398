//! # glyph-protocol
//!
//! Chunked QR transport for small self-contained web bundles.
//!
//! This crate provides:
//! - **Bundle codec**: canonical JSON, raw deflate and base64 behind the
//!   `GLYW:` tag
//! - **Chunking**: fixed-size `GLYC:` chunk frames tied together by a
//!   session id
//! - **Reassembly**: order-independent, idempotent collection of scanned
//!   frames back into a bundle
//! - **Rendering**: one QR symbol per frame, with error correction and
//!   module size picked by frame length
//!
//! ## Data flow
//!
//! ```text
//! display:  WebBundle -> GLYW: payload -> GLYC: frames -> QR symbols
//! receiver: scanned frames -> SessionStore -> GLYW: payload -> WebBundle
//! ```
//!
//! ## Example
//!
//! ```
//! use glyph_protocol::bundle::{TemplateType, WebBundle};
//! use glyph_protocol::config::ProtocolConfig;
//! use glyph_protocol::session_store::SessionStore;
//! use glyph_protocol::transmission::encode_transmission;
//! use glyph_protocol::chunking::SessionId;
//!
//! let bundle = WebBundle::new("Trivia", "<h1>Q1</h1>", Some(TemplateType::Trivia));
//! let transmission =
//!     encode_transmission(&bundle, SessionId::generate(), &ProtocolConfig::default()).unwrap();
//!
//! let store = SessionStore::default();
//! for frame in transmission.frames() {
//!     store.add_frame(frame.as_str()).unwrap();
//! }
//! assert_eq!(store.take_completed(transmission.session_id()), Some(bundle));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod bundle;
pub mod chunking;
pub mod config;
pub mod error;
pub mod frame;
pub mod limits;
pub mod render;
pub mod session_store;
pub mod transmission;

#[cfg(test)]
mod proptests;

pub use bundle::{TemplateType, WebBundle, decode_bundle, encode_bundle};
pub use chunking::{ChunkReassembler, SessionId, SessionState};
pub use config::{ConfigError, ProtocolConfig, ProtocolConfigBuilder};
pub use error::{ProtocolError, Result, SessionFailure};
pub use frame::{BUNDLE_TAG, CHUNK_TAG, Frame, ParsedFrame};
pub use render::{ErrorCorrection, FrameRenderer, RenderedFrame};
pub use session_store::{SessionEvent, SessionStore};
pub use transmission::{Transmission, encode_bundle_frames, encode_transmission};
