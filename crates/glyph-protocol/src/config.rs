//! Protocol configuration.
//!
//! Groups the tunable parameters of the sender (chunk size, render tiers)
//! and the receiver (timeouts and resource limits).
//!
//! # Example
//!
//! ```
//! use glyph_protocol::config::{ProtocolConfig, ProtocolConfigBuilder};
//! use std::time::Duration;
//!
//! // Use defaults
//! let config = ProtocolConfig::default();
//! assert!(config.validate().is_ok());
//!
//! // Or use builder for customization
//! let config = ProtocolConfigBuilder::new()
//!     .with_max_chunk_bytes(600)
//!     .with_session_timeout(Duration::from_secs(30))
//!     .build_validated()
//!     .unwrap();
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::chunking::worst_case_frame_len;
use crate::limits::{
    COMPLETED_RETENTION_SECS, DEFAULT_BORDER_MODULES, MAX_CHUNK_BYTES, MAX_FINISHED_SESSIONS,
    MAX_PENDING_REASSEMBLIES, MAX_REASSEMBLY_BUFFER, REASSEMBLY_TIMEOUT_SECS,
};
use crate::render::{ErrorCorrection, byte_capacity};

/// Largest module size accepted, in pixels.
const MAX_MODULE_PX: u32 = 64;

/// Largest quiet border accepted, in modules.
const MAX_BORDER_MODULES: u32 = 16;

/// Tier used when no configured tier matches.
const FALLBACK_TIER: RenderTier = RenderTier {
    min_bytes: 0,
    error_correction: ErrorCorrection::M,
    module_px: 10,
};

/// Main protocol configuration.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProtocolConfig {
    /// Sender-side splitting.
    pub chunking: ChunkingConfig,

    /// Receiver-side session handling.
    pub reassembly: ReassemblyConfig,

    /// QR rendering.
    pub render: RenderConfig,
}

impl ProtocolConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a configuration builder.
    pub fn builder() -> ProtocolConfigBuilder {
        ProtocolConfigBuilder::new()
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(json).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Validate the configuration.
    ///
    /// Besides range checks this verifies that the largest chunk frame the
    /// chunk size can produce fits a version 40 symbol at the error
    /// correction level its render tier selects.
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate chunking
        let max_chunk_bytes = self.chunking.max_chunk_bytes;
        if max_chunk_bytes == 0 {
            return Err(ConfigError::InvalidValue {
                field: "chunking.max_chunk_bytes".into(),
                reason: "chunk size must be greater than zero".into(),
            });
        }

        // Validate reassembly
        if self.reassembly.session_timeout.as_secs() == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reassembly.session_timeout".into(),
                reason: "session timeout must be at least one second".into(),
            });
        }

        if self.reassembly.max_pending_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reassembly.max_pending_sessions".into(),
                reason: "max pending sessions must be greater than zero".into(),
            });
        }

        if self.reassembly.max_finished_sessions == 0 {
            return Err(ConfigError::InvalidValue {
                field: "reassembly.max_finished_sessions".into(),
                reason: "max finished sessions must be greater than zero".into(),
            });
        }

        if self.reassembly.max_buffer_per_session < max_chunk_bytes {
            return Err(ConfigError::InvalidValue {
                field: "reassembly.max_buffer_per_session".into(),
                reason: format!("buffer must hold at least one chunk of {max_chunk_bytes} bytes"),
            });
        }

        // Validate render
        self.render.validate()?;

        let frame_len = worst_case_frame_len(max_chunk_bytes);
        let tier = self.render.tier_for(frame_len);
        let capacity = byte_capacity(tier.error_correction);
        if frame_len > capacity {
            return Err(ConfigError::InvalidValue {
                field: "chunking.max_chunk_bytes".into(),
                reason: format!(
                    "chunk frames reach {frame_len} bytes, over the {capacity}-byte capacity \
                     of a version 40 symbol at level {:?}",
                    tier.error_correction
                ),
            });
        }

        Ok(())
    }
}

/// Sender-side splitting configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Base64 characters per chunk slice.
    pub max_chunk_bytes: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chunk_bytes: MAX_CHUNK_BYTES,
        }
    }
}

/// Receiver-side session configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReassemblyConfig {
    /// How long a collecting session may go without a new frame.
    #[serde(with = "duration_serde")]
    pub session_timeout: Duration,

    /// How long decoded and failed sessions are remembered.
    ///
    /// Frames of a remembered session are ignored instead of starting it
    /// over.
    #[serde(with = "duration_serde")]
    pub completed_retention: Duration,

    /// Maximum number of sessions collecting at once.
    pub max_pending_sessions: usize,

    /// Maximum number of decoded or failed sessions remembered.
    pub max_finished_sessions: usize,

    /// Maximum slice data held per session, in bytes.
    pub max_buffer_per_session: usize,
}

impl Default for ReassemblyConfig {
    fn default() -> Self {
        Self {
            session_timeout: Duration::from_secs(REASSEMBLY_TIMEOUT_SECS),
            completed_retention: Duration::from_secs(COMPLETED_RETENTION_SECS),
            max_pending_sessions: MAX_PENDING_REASSEMBLIES,
            max_finished_sessions: MAX_FINISHED_SESSIONS,
            max_buffer_per_session: MAX_REASSEMBLY_BUFFER,
        }
    }
}

/// Rendering parameters for frames from `min_bytes` long upwards.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenderTier {
    /// Shortest frame, in bytes, this tier applies to.
    pub min_bytes: usize,
    /// Error correction level.
    pub error_correction: ErrorCorrection,
    /// Pixels per module.
    pub module_px: u32,
}

/// QR rendering configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    /// Light modules around the symbol.
    pub border_modules: u32,

    /// Length tiers in ascending `min_bytes` order, the first starting at 0.
    pub tiers: Vec<RenderTier>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            border_modules: DEFAULT_BORDER_MODULES,
            tiers: vec![
                FALLBACK_TIER,
                RenderTier {
                    min_bytes: 501,
                    error_correction: ErrorCorrection::L,
                    module_px: 8,
                },
                RenderTier {
                    min_bytes: 1201,
                    error_correction: ErrorCorrection::L,
                    module_px: 6,
                },
            ],
        }
    }
}

impl RenderConfig {
    /// The tier with the largest `min_bytes` not above `byte_len`.
    pub fn tier_for(&self, byte_len: usize) -> RenderTier {
        self.tiers
            .iter()
            .filter(|tier| tier.min_bytes <= byte_len)
            .max_by_key(|tier| tier.min_bytes)
            .copied()
            .unwrap_or(FALLBACK_TIER)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.border_modules > MAX_BORDER_MODULES {
            return Err(ConfigError::InvalidValue {
                field: "render.border_modules".into(),
                reason: format!("border must be at most {MAX_BORDER_MODULES} modules"),
            });
        }

        match self.tiers.first() {
            None => return Err(ConfigError::Missing("render.tiers".into())),
            Some(first) if first.min_bytes != 0 => {
                return Err(ConfigError::InvalidValue {
                    field: "render.tiers".into(),
                    reason: "first tier must start at 0 bytes".into(),
                });
            }
            Some(_) => {}
        }

        if self
            .tiers
            .windows(2)
            .any(|pair| pair[0].min_bytes >= pair[1].min_bytes)
        {
            return Err(ConfigError::InvalidValue {
                field: "render.tiers".into(),
                reason: "tiers must be in strictly ascending min_bytes order".into(),
            });
        }

        if let Some(tier) = self
            .tiers
            .iter()
            .find(|tier| tier.module_px == 0 || tier.module_px > MAX_MODULE_PX)
        {
            return Err(ConfigError::InvalidValue {
                field: "render.tiers.module_px".into(),
                reason: format!(
                    "module size {} must be between 1 and {MAX_MODULE_PX}",
                    tier.module_px
                ),
            });
        }

        Ok(())
    }
}

/// Builder for constructing `ProtocolConfig` with custom values.
///
/// Provides a fluent interface for building configuration.
#[derive(Clone, Debug, Default)]
pub struct ProtocolConfigBuilder {
    config: ProtocolConfig,
}

impl ProtocolConfigBuilder {
    /// Create a new builder with default configuration.
    pub fn new() -> Self {
        Self {
            config: ProtocolConfig::default(),
        }
    }

    /// Start from an existing configuration.
    pub fn from_config(config: ProtocolConfig) -> Self {
        Self { config }
    }

    /// Build the final configuration.
    pub fn build(self) -> ProtocolConfig {
        self.config
    }

    /// Build and validate the configuration.
    ///
    /// Returns an error if validation fails.
    pub fn build_validated(self) -> Result<ProtocolConfig, ConfigError> {
        let config = self.build();
        config.validate()?;
        Ok(config)
    }

    // ===== Chunking Configuration =====

    /// Set the slice size in base64 characters.
    pub fn with_max_chunk_bytes(mut self, bytes: usize) -> Self {
        self.config.chunking.max_chunk_bytes = bytes;
        self
    }

    // ===== Reassembly Configuration =====

    /// Set the idle timeout for collecting sessions.
    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.config.reassembly.session_timeout = timeout;
        self
    }

    /// Set how long finished sessions are remembered.
    pub fn with_completed_retention(mut self, retention: Duration) -> Self {
        self.config.reassembly.completed_retention = retention;
        self
    }

    /// Set the maximum number of collecting sessions.
    pub fn with_max_pending_sessions(mut self, max: usize) -> Self {
        self.config.reassembly.max_pending_sessions = max;
        self
    }

    /// Set the maximum number of remembered finished sessions.
    pub fn with_max_finished_sessions(mut self, max: usize) -> Self {
        self.config.reassembly.max_finished_sessions = max;
        self
    }

    /// Set the per-session buffer limit in bytes.
    pub fn with_max_buffer_per_session(mut self, bytes: usize) -> Self {
        self.config.reassembly.max_buffer_per_session = bytes;
        self
    }

    // ===== Render Configuration =====

    /// Set the quiet border width in modules.
    pub fn with_border_modules(mut self, modules: u32) -> Self {
        self.config.render.border_modules = modules;
        self
    }

    /// Replace the render tiers.
    pub fn with_render_tiers(mut self, tiers: Vec<RenderTier>) -> Self {
        self.config.render.tiers = tiers;
        self
    }
}

/// Configuration error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// Invalid configuration value.
    #[error("Invalid configuration value for '{field}': {reason}")]
    InvalidValue {
        /// The field name.
        field: String,
        /// The reason it's invalid.
        reason: String,
    },

    /// Missing required configuration.
    #[error("Missing required configuration: {0}")]
    Missing(String),

    /// Configuration text could not be parsed.
    #[error("Configuration parse error: {0}")]
    Parse(String),
}

/// Serde support for Duration serialization.
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    /// Serializable representation of Duration.
    #[derive(Serialize, Deserialize)]
    struct DurationRepr {
        secs: u64,
        #[serde(default)]
        nanos: u32,
    }

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let repr = DurationRepr {
            secs: duration.as_secs(),
            nanos: duration.subsec_nanos(),
        };
        repr.serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let repr = DurationRepr::deserialize(deserializer)?;
        Ok(Duration::new(repr.secs, repr.nanos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ProtocolConfig::default();

        assert_eq!(config.chunking.max_chunk_bytes, 800);
        assert_eq!(
            config.reassembly.session_timeout,
            Duration::from_secs(REASSEMBLY_TIMEOUT_SECS)
        );
        assert_eq!(
            config.reassembly.completed_retention,
            Duration::from_secs(COMPLETED_RETENTION_SECS)
        );
        assert_eq!(config.reassembly.max_pending_sessions, MAX_PENDING_REASSEMBLIES);
        assert_eq!(config.reassembly.max_finished_sessions, MAX_FINISHED_SESSIONS);
        assert_eq!(config.render.border_modules, 2);
        assert_eq!(config.render.tiers.len(), 3);
    }

    #[test]
    fn test_validation_valid_config() {
        assert!(ProtocolConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_tiers() {
        let render = RenderConfig::default();

        assert_eq!(render.tier_for(0).error_correction, ErrorCorrection::M);
        assert_eq!(render.tier_for(500).module_px, 10);
        assert_eq!(render.tier_for(501).error_correction, ErrorCorrection::L);
        assert_eq!(render.tier_for(501).module_px, 8);
        assert_eq!(render.tier_for(1200).module_px, 8);
        assert_eq!(render.tier_for(1201).module_px, 6);
    }

    #[test]
    fn test_tier_for_unsorted_or_empty() {
        let render = RenderConfig {
            border_modules: 2,
            tiers: vec![],
        };
        assert_eq!(render.tier_for(100), FALLBACK_TIER);
    }

    #[test]
    fn test_validation_zero_chunk_size() {
        let config = ProtocolConfigBuilder::new().with_max_chunk_bytes(0).build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "chunking.max_chunk_bytes"
        ));
    }

    #[test]
    fn test_validation_chunk_too_large_for_symbol() {
        // 2095 characters still fit version 40 at level L, 2096 do not.
        assert!(
            ProtocolConfigBuilder::new()
                .with_max_chunk_bytes(2095)
                .build_validated()
                .is_ok()
        );

        let result = ProtocolConfigBuilder::new()
            .with_max_chunk_bytes(2096)
            .build_validated();
        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { field, .. }) if field == "chunking.max_chunk_bytes"
        ));
    }

    #[test]
    fn test_validation_respects_tier_level() {
        // Forcing level H everywhere shrinks the capacity to 1273 bytes.
        let tiers = vec![RenderTier {
            min_bytes: 0,
            error_correction: ErrorCorrection::H,
            module_px: 4,
        }];
        let result = ProtocolConfigBuilder::new()
            .with_render_tiers(tiers)
            .build_validated();
        assert!(result.is_ok());

        let tiers = vec![RenderTier {
            min_bytes: 0,
            error_correction: ErrorCorrection::H,
            module_px: 4,
        }];
        let result = ProtocolConfigBuilder::new()
            .with_render_tiers(tiers)
            .with_max_chunk_bytes(1000)
            .build_validated();
        assert!(result.is_err());
    }

    #[test]
    fn test_validation_reassembly_limits() {
        let mut config = ProtocolConfig::default();
        config.reassembly.session_timeout = Duration::from_millis(500);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "reassembly.session_timeout"
        ));

        let config = ProtocolConfigBuilder::new()
            .with_max_pending_sessions(0)
            .build();
        assert!(config.validate().is_err());

        let config = ProtocolConfigBuilder::new()
            .with_max_finished_sessions(0)
            .build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "reassembly.max_finished_sessions"
        ));

        let config = ProtocolConfigBuilder::new()
            .with_max_buffer_per_session(100)
            .build();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { field, .. }) if field == "reassembly.max_buffer_per_session"
        ));
    }

    #[test]
    fn test_validation_render_tiers() {
        let config = ProtocolConfigBuilder::new().with_render_tiers(vec![]).build();
        assert!(matches!(config.validate(), Err(ConfigError::Missing(_))));

        let tier = |min_bytes, module_px| RenderTier {
            min_bytes,
            error_correction: ErrorCorrection::L,
            module_px,
        };

        let config = ProtocolConfigBuilder::new()
            .with_render_tiers(vec![tier(10, 8)])
            .build();
        assert!(config.validate().is_err());

        let config = ProtocolConfigBuilder::new()
            .with_render_tiers(vec![tier(0, 8), tier(500, 6), tier(500, 4)])
            .build();
        assert!(config.validate().is_err());

        let config = ProtocolConfigBuilder::new()
            .with_render_tiers(vec![tier(0, 0)])
            .build();
        assert!(config.validate().is_err());

        let config = ProtocolConfigBuilder::new().with_border_modules(100).build();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialization_roundtrip() {
        let original = ProtocolConfigBuilder::new()
            .with_max_chunk_bytes(640)
            .with_session_timeout(Duration::from_millis(90_500))
            .with_border_modules(4)
            .build();

        let json = serde_json::to_string(&original).expect("serialize");
        assert!(json.contains(r#""session_timeout":{"secs":90,"nanos":500000000}"#));

        let deserialized = ProtocolConfig::from_json(&json).expect("deserialize");
        assert_eq!(deserialized, original);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config =
            ProtocolConfig::from_json(r#"{"chunking":{"max_chunk_bytes":500}}"#).unwrap();
        assert_eq!(config.chunking.max_chunk_bytes, 500);
        assert_eq!(config.reassembly, ReassemblyConfig::default());

        let config =
            ProtocolConfig::from_json(r#"{"reassembly":{"session_timeout":{"secs":30}}}"#)
                .unwrap();
        assert_eq!(config.reassembly.session_timeout, Duration::from_secs(30));

        assert!(matches!(
            ProtocolConfig::from_json("{not json"),
            Err(ConfigError::Parse(_))
        ));
    }
}
