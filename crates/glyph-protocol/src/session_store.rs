//! Thread-safe session store for the receiving side.
//!
//! [`SessionStore`] is a cheaply clonable handle around a
//! [`ChunkReassembler`]. Each call to [`SessionStore::add_frame`] holds the
//! lock for the whole insert-and-check step, so concurrent frames of one
//! session are never lost and completion is observed exactly once. Calls
//! never wait for scan input; completion and failure are published as
//! [`SessionEvent`]s to subscribers, or can be polled with
//! [`SessionStore::state`].

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::debug;

use crate::bundle::WebBundle;
use crate::chunking::{ChunkReassembler, SessionId, SessionState};
use crate::config::ReassemblyConfig;
use crate::error::{ProtocolError, Result, SessionFailure};
use crate::frame::ParsedFrame;

/// Buffered events per subscriber before the oldest are dropped.
const EVENT_CHANNEL_CAPACITY: usize = 64;

/// A session reaching a terminal state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    /// The session's bundle decoded and can be taken from the store.
    Completed {
        /// The session.
        session_id: SessionId,
        /// Number of chunks it had.
        total: u32,
    },
    /// The session failed.
    Failed {
        /// The session.
        session_id: SessionId,
        /// Why it failed.
        failure: SessionFailure,
    },
}

impl SessionEvent {
    /// Session the event is about.
    pub fn session_id(&self) -> &SessionId {
        match self {
            Self::Completed { session_id, .. } | Self::Failed { session_id, .. } => session_id,
        }
    }
}

/// Shared, injectable store of reassembly sessions.
///
/// # Example
///
/// ```
/// use glyph_protocol::session_store::{SessionEvent, SessionStore};
/// use glyph_protocol::transmission::encode_bundle_frames;
/// use glyph_protocol::bundle::WebBundle;
///
/// let bundle = WebBundle::new("T", "<p>hi</p>", None);
/// let frames = encode_bundle_frames(&bundle).unwrap();
///
/// let store = SessionStore::default();
/// let mut events = store.subscribe();
/// let (id, state) = store.add_frame(&frames[0]).unwrap();
///
/// assert!(state.is_complete());
/// assert!(matches!(events.try_recv(), Ok(SessionEvent::Completed { .. })));
/// assert_eq!(store.take_completed(&id), Some(bundle));
/// ```
#[derive(Debug, Clone)]
pub struct SessionStore {
    inner: Arc<Mutex<ChunkReassembler>>,
    events: broadcast::Sender<SessionEvent>,
}

impl SessionStore {
    /// Create a store with the given limits.
    pub fn new(config: &ReassemblyConfig) -> Self {
        Self::with_reassembler(ChunkReassembler::from_config(config))
    }

    /// Wrap an existing reassembler.
    pub fn with_reassembler(reassembler: ChunkReassembler) -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            inner: Arc::new(Mutex::new(reassembler)),
            events,
        }
    }

    /// Receive an event for every session that completes or fails from
    /// now on.
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Apply a scanned frame, using the system clock.
    pub fn add_frame(&self, frame: &str) -> Result<(SessionId, SessionState)> {
        self.add_frame_at(frame, unix_now())
    }

    /// Apply a scanned frame at the given Unix time.
    ///
    /// # Errors
    ///
    /// See [`ChunkReassembler::add_frame`].
    pub fn add_frame_at(&self, frame: &str, now: u64) -> Result<(SessionId, SessionState)> {
        let parsed = ParsedFrame::parse(frame)?;
        self.apply(parsed, now)
    }

    /// Apply a scanned frame only if it belongs to `expected`.
    ///
    /// # Errors
    ///
    /// Returns [`ProtocolError::SessionMismatch`] for a frame of any other
    /// session, leaving every session untouched.
    pub fn add_frame_for(&self, frame: &str, expected: &SessionId) -> Result<SessionState> {
        self.add_frame_for_at(frame, expected, unix_now())
    }

    /// [`SessionStore::add_frame_for`] at the given Unix time.
    pub fn add_frame_for_at(
        &self,
        frame: &str,
        expected: &SessionId,
        now: u64,
    ) -> Result<SessionState> {
        let parsed = ParsedFrame::parse(frame)?;
        let actual = parsed.session_id();
        if &actual != expected {
            return Err(ProtocolError::SessionMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
        self.apply(parsed, now).map(|(_, state)| state)
    }

    fn apply(&self, parsed: ParsedFrame, now: u64) -> Result<(SessionId, SessionState)> {
        let (id, before, after) = {
            let mut reassembler = self.lock();
            let before = reassembler.state(&parsed.session_id());
            let (id, after) = reassembler.add_parsed(parsed, now)?;
            (id, before, after)
        };

        if !before.is_terminal() {
            let event = match &after {
                SessionState::Decoded { total } => Some(SessionEvent::Completed {
                    session_id: id.clone(),
                    total: *total,
                }),
                SessionState::Failed(failure) => Some(SessionEvent::Failed {
                    session_id: id.clone(),
                    failure: failure.clone(),
                }),
                _ => None,
            };
            if let Some(event) = event {
                // No subscribers is fine; the state can still be polled.
                if self.events.send(event).is_err() {
                    debug!(session_id = %id, "no event subscribers");
                }
            }
        }

        Ok((id, after))
    }

    /// Current state of a session.
    pub fn state(&self, id: &SessionId) -> SessionState {
        self.lock().state(id)
    }

    /// A copy of the decoded bundle, if present and not yet taken.
    pub fn completed_record(&self, id: &SessionId) -> Option<WebBundle> {
        self.lock().completed_record(id).cloned()
    }

    /// Move the decoded bundle out of the store.
    pub fn take_completed(&self, id: &SessionId) -> Option<WebBundle> {
        self.lock().take_completed(id)
    }

    /// `(received, total)` for a collecting session.
    pub fn pending_progress(&self, id: &SessionId) -> Option<(usize, u32)> {
        self.lock().pending_progress(id)
    }

    /// Number of sessions still collecting.
    pub fn pending_count(&self) -> usize {
        self.lock().pending_count()
    }

    /// Number of sessions tracked in any state.
    pub fn session_count(&self) -> usize {
        self.lock().session_count()
    }

    /// Discard a session. Returns whether it existed.
    pub fn cancel(&self, id: &SessionId) -> bool {
        self.lock().cancel(id)
    }

    /// Evict expired sessions using the system clock.
    pub fn evict_expired(&self) -> usize {
        self.evict_expired_at(unix_now())
    }

    /// Evict expired sessions as of the given Unix time.
    pub fn evict_expired_at(&self, now: u64) -> usize {
        self.lock().cleanup_expired(now)
    }

    fn lock(&self) -> MutexGuard<'_, ChunkReassembler> {
        // Reassembler methods never panic mid-update.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::with_reassembler(ChunkReassembler::default())
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
