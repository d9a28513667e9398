//! Protocol limits and constants.
//!
//! All wire constants and resource limits are defined here for consistent
//! enforcement. Changing anything in the "Wire format" group changes what
//! other implementations can decode.

// === Wire format ===

/// Tag prefixed to a whole, unchunked bundle payload.
pub const BUNDLE_TAG: &str = "GLYW:";

/// Tag prefixed to a single chunk frame.
pub const CHUNK_TAG: &str = "GLYC:";

/// Base64 characters of the re-encoded payload carried per chunk.
pub const MAX_CHUNK_BYTES: usize = 800;

/// Deflate window size in bits.
///
/// Bundles are compressed with raw (header-less) deflate, which carries no
/// window parameter on the wire. Both sides must use a 32 KiB window.
pub const DEFLATE_WINDOW_BITS: u8 = 15;

/// Deflate compression level used when encoding bundles.
pub const DEFLATE_LEVEL: u32 = 9;

// === Session identifiers ===

/// Maximum length of a session id in bytes.
pub const MAX_SESSION_ID_LEN: usize = 64;

/// Length of a generated session id, including its `W` prefix.
pub const GENERATED_SESSION_ID_LEN: usize = 8;

// === Reassembly (DoS protection) ===

/// Maximum number of chunks a single session may declare.
pub const MAX_CHUNKS_PER_SESSION: u32 = 4096;

/// Maximum number of sessions collecting chunks at the same time.
pub const MAX_PENDING_REASSEMBLIES: usize = 32;

/// Maximum number of decoded or failed sessions remembered at once.
///
/// When full, the session that finished first is forgotten.
pub const MAX_FINISHED_SESSIONS: usize = 128;

/// Maximum buffered chunk data per session in bytes (4 MiB).
pub const MAX_REASSEMBLY_BUFFER: usize = 4 * 1024 * 1024;

/// Seconds without a new frame before a pending session is evicted.
pub const REASSEMBLY_TIMEOUT_SECS: u64 = 120;

/// Seconds a decoded or failed session is remembered.
pub const COMPLETED_RETENTION_SECS: u64 = 600;

/// Maximum inflated size of a bundle's JSON (4 MiB).
pub const MAX_BUNDLE_JSON_BYTES: usize = 4 * 1024 * 1024;

// === Rendering ===

/// Highest QR symbol version.
pub const MAX_QR_VERSION: u8 = 40;

/// Byte-mode capacity of a version 40 symbol, indexed L, M, Q, H.
pub const QR_V40_BYTE_CAPACITY: [usize; 4] = [2953, 2331, 1663, 1273];

/// Light modules drawn around each rendered symbol.
pub const DEFAULT_BORDER_MODULES: u32 = 2;

/// Approximate seconds a scanner needs per frame.
pub const SCAN_SECS_PER_FRAME: f64 = 0.4;
