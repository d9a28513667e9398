//! Session reassembly.
//!
//! Provides the [`ChunkReassembler`] type, which collects chunk frames by
//! session id, detects completion and decodes the finished bundle.
//!
//! # Session lifecycle
//!
//! ```text
//! Unseen -> Collecting -> Decoded
//!                    \-> Failed(ProtocolViolation | CorruptPayload)
//! ```
//!
//! Decoded and failed sessions are kept as tombstones for the completed
//! retention period. A display usually keeps cycling its frames after the
//! receiver has them all; without the tombstone every further scan would
//! start the session over.
//!
//! # Resource limits
//!
//! - at most `max_pending_sessions` sessions collect at once
//! - at most `max_finished_sessions` tombstones; the oldest goes first
//! - at most `max_buffer_per_session` bytes of slice data per session
//! - pending sessions expire after `session_timeout` without a new frame
//!
//! Expired sessions are swept on the first frame of every new second, so
//! retention holds without the caller calling
//! [`ChunkReassembler::cleanup_expired`].

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::{debug, info, warn};

use super::chunk::{Chunk, join_slices};
use super::session_id::SessionId;
use crate::bundle::{WebBundle, decode_bundle};
use crate::config::ReassemblyConfig;
use crate::error::{ProtocolError, Result, SessionFailure};
use crate::frame::ParsedFrame;
use crate::limits::{
    COMPLETED_RETENTION_SECS, MAX_FINISHED_SESSIONS, MAX_PENDING_REASSEMBLIES,
    MAX_REASSEMBLY_BUFFER, REASSEMBLY_TIMEOUT_SECS,
};

/// Observable state of one session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", content = "detail", rename_all = "snake_case")]
pub enum SessionState {
    /// No frame of this session has been accepted (or it was evicted).
    Unseen,
    /// Some chunks have arrived.
    Collecting {
        /// Distinct indices received.
        received: usize,
        /// Total announced by the session's chunks.
        total: u32,
    },
    /// Every chunk arrived and the bundle decoded.
    Decoded {
        /// Number of chunks the session had.
        total: u32,
    },
    /// The session ended without a bundle.
    Failed(SessionFailure),
}

impl SessionState {
    /// Whether the bundle is available.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Decoded { .. })
    }

    /// Whether the session has ended, successfully or not.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Decoded { .. } | Self::Failed(_))
    }
}

/// A session still waiting for chunks.
#[derive(Debug)]
struct PendingSession {
    total: u32,
    /// Slices by index; the first slice stored for an index is kept.
    slices: BTreeMap<u32, String>,
    /// Time of the last accepted frame (Unix seconds).
    last_activity: u64,
    /// Bytes of slice data held.
    buffer_size: usize,
}

/// What a chunk did to a pending session.
enum Step {
    Collecting(SessionState),
    Complete,
    Violation { expected: u32, actual: u32 },
}

impl PendingSession {
    fn new(total: u32, now: u64) -> Self {
        Self {
            total,
            slices: BTreeMap::new(),
            last_activity: now,
            buffer_size: 0,
        }
    }

    fn accept(&mut self, chunk: &Chunk, now: u64, max_buffer: usize) -> Result<Step> {
        if chunk.total() != self.total {
            return Ok(Step::Violation {
                expected: self.total,
                actual: chunk.total(),
            });
        }

        if let Some(existing) = self.slices.get(&chunk.index()) {
            if existing == chunk.data() {
                debug!(
                    session_id = %chunk.session_id(),
                    index = chunk.index(),
                    "duplicate chunk"
                );
            } else {
                warn!(
                    session_id = %chunk.session_id(),
                    index = chunk.index(),
                    "conflicting duplicate chunk ignored"
                );
            }
            self.last_activity = now;
            return Ok(Step::Collecting(self.state()));
        }

        let new_size = self.buffer_size.saturating_add(chunk.data().len());
        if new_size > max_buffer {
            return Err(ProtocolError::ReassemblyBufferExceeded {
                size: new_size,
                max: max_buffer,
            });
        }

        self.buffer_size = new_size;
        self.slices.insert(chunk.index(), chunk.data().to_string());
        self.last_activity = now;

        if self.is_complete() {
            Ok(Step::Complete)
        } else {
            Ok(Step::Collecting(self.state()))
        }
    }

    /// Indices are validated against `total`, so a full map covers
    /// exactly `0..total`.
    fn is_complete(&self) -> bool {
        self.slices.len() == self.total as usize
    }

    fn is_expired(&self, now: u64, timeout_secs: u64) -> bool {
        now.saturating_sub(self.last_activity) > timeout_secs
    }

    fn state(&self) -> SessionState {
        SessionState::Collecting {
            received: self.slices.len(),
            total: self.total,
        }
    }

    fn decode(&self) -> Result<WebBundle> {
        let payload = join_slices(self.slices.values().map(String::as_str))?;
        decode_bundle(&payload)
    }
}

/// A session that reached a terminal state.
#[derive(Debug)]
struct FinishedSession {
    outcome: Outcome,
    finished_at: u64,
}

#[derive(Debug)]
enum Outcome {
    /// `record` is `None` once the caller has taken it.
    Decoded {
        total: u32,
        record: Option<WebBundle>,
    },
    Failed(SessionFailure),
}

impl FinishedSession {
    fn state(&self) -> SessionState {
        match &self.outcome {
            Outcome::Decoded { total, .. } => SessionState::Decoded { total: *total },
            Outcome::Failed(failure) => SessionState::Failed(failure.clone()),
        }
    }

    fn is_expired(&self, now: u64, retention_secs: u64) -> bool {
        now.saturating_sub(self.finished_at) > retention_secs
    }
}

#[derive(Debug)]
enum SessionEntry {
    Pending(PendingSession),
    Finished(FinishedSession),
}

/// Reassembles chunk frames into bundles.
///
/// Time is passed in explicitly as Unix seconds so callers (and tests)
/// control expiry. The reassembler is not synchronized; wrap it in a
/// [`SessionStore`](crate::session_store::SessionStore) to share it
/// between threads.
///
/// # Example
///
/// ```
/// use glyph_protocol::bundle::{WebBundle, encode_bundle};
/// use glyph_protocol::chunking::{ChunkReassembler, SessionId, split_into_frames};
///
/// let bundle = WebBundle::new("T", "<p>hi</p>".repeat(400), None);
/// let payload = encode_bundle(&bundle).unwrap();
/// let id = SessionId::new("W0000001").unwrap();
/// let frames = split_into_frames(&payload, &id, 100).unwrap();
///
/// let mut reassembler = ChunkReassembler::default();
/// for frame in frames.iter().rev() {
///     reassembler.add_frame(frame, 1000).unwrap();
/// }
/// assert!(reassembler.state(&id).is_complete());
/// assert_eq!(reassembler.take_completed(&id), Some(bundle));
/// ```
#[derive(Debug)]
pub struct ChunkReassembler {
    sessions: HashMap<SessionId, SessionEntry>,
    session_timeout_secs: u64,
    completed_retention_secs: u64,
    max_pending_sessions: usize,
    max_finished_sessions: usize,
    max_buffer_per_session: usize,
    /// Time of the last expiry sweep.
    last_sweep: u64,
}

impl ChunkReassembler {
    /// Create a reassembler with the given pending-session timeout and
    /// default limits.
    pub fn new(session_timeout_secs: u64) -> Self {
        Self::with_limits(
            session_timeout_secs,
            COMPLETED_RETENTION_SECS,
            MAX_PENDING_REASSEMBLIES,
            MAX_REASSEMBLY_BUFFER,
        )
    }

    /// Create a reassembler with explicit limits.
    pub fn with_limits(
        session_timeout_secs: u64,
        completed_retention_secs: u64,
        max_pending_sessions: usize,
        max_buffer_per_session: usize,
    ) -> Self {
        Self {
            sessions: HashMap::new(),
            session_timeout_secs,
            completed_retention_secs,
            max_pending_sessions,
            max_finished_sessions: MAX_FINISHED_SESSIONS,
            max_buffer_per_session,
            last_sweep: 0,
        }
    }

    /// Set how many decoded or failed sessions are remembered (at least one).
    pub fn with_max_finished_sessions(mut self, max: usize) -> Self {
        self.max_finished_sessions = max.max(1);
        self
    }

    /// Create a reassembler from configuration.
    pub fn from_config(config: &ReassemblyConfig) -> Self {
        Self::with_limits(
            config.session_timeout.as_secs(),
            config.completed_retention.as_secs(),
            config.max_pending_sessions,
            config.max_buffer_per_session,
        )
        .with_max_finished_sessions(config.max_finished_sessions)
    }

    /// Parse a scanned frame and apply it.
    ///
    /// Chunk frames go to their session. A bare `GLYW:` frame is decoded
    /// on the spot under [`SessionId::for_bare_payload`]; one that does not
    /// decode is rejected like any other malformed frame.
    ///
    /// Returns the session the frame belongs to and its state afterwards.
    ///
    /// # Errors
    ///
    /// Malformed frames and bare payloads that fail to decode are rejected
    /// before touching any session. Resource
    /// limits produce [`ProtocolError::TooManyPendingSessions`] or
    /// [`ProtocolError::ReassemblyBufferExceeded`]. Protocol violations and
    /// corrupt payloads are not errors: they show up as
    /// [`SessionState::Failed`].
    pub fn add_frame(&mut self, frame: &str, now: u64) -> Result<(SessionId, SessionState)> {
        self.add_parsed(ParsedFrame::parse(frame)?, now)
    }

    /// Apply a frame that has already been parsed.
    pub fn add_parsed(&mut self, frame: ParsedFrame, now: u64) -> Result<(SessionId, SessionState)> {
        match frame {
            ParsedFrame::Chunk(chunk) => {
                let id = chunk.session_id().clone();
                let state = self.add_chunk(chunk, now)?;
                Ok((id, state))
            }
            ParsedFrame::Bundle(payload) => {
                let id = SessionId::for_bare_payload(&payload);
                let state = self.add_bare_payload(&id, &payload, now)?;
                Ok((id, state))
            }
        }
    }

    /// Apply an already parsed chunk.
    pub fn add_chunk(&mut self, chunk: Chunk, now: u64) -> Result<SessionState> {
        chunk.validate()?;
        self.sweep(now);

        let id = chunk.session_id().clone();
        let timeout = self.session_timeout_secs;
        let max_buffer = self.max_buffer_per_session;

        let step = match self.sessions.get_mut(&id) {
            Some(SessionEntry::Finished(done)) => {
                debug!(session_id = %id, index = chunk.index(), "frame for finished session");
                return Ok(done.state());
            }
            Some(SessionEntry::Pending(pending)) if !pending.is_expired(now, timeout) => {
                Some(pending.accept(&chunk, now, max_buffer)?)
            }
            _ => None,
        };

        let step = match step {
            Some(step) => step,
            None => self.start_session(&chunk, now)?,
        };

        match step {
            Step::Collecting(state) => Ok(state),
            Step::Complete => Ok(self.finish(&id, now)),
            Step::Violation { expected, actual } => {
                warn!(session_id = %id, expected, actual, "chunk total mismatch");
                let failure = SessionFailure::ProtocolViolation { expected, actual };
                self.sessions.remove(&id);
                self.insert_finished(
                    id,
                    FinishedSession {
                        outcome: Outcome::Failed(failure.clone()),
                        finished_at: now,
                    },
                );
                Ok(SessionState::Failed(failure))
            }
        }
    }

    fn start_session(&mut self, chunk: &Chunk, now: u64) -> Result<Step> {
        let id = chunk.session_id();
        if self.sessions.remove(id).is_some() {
            debug!(session_id = %id, "expired session restarted");
        }

        if self.pending_count() >= self.max_pending_sessions {
            self.cleanup_expired(now);
            let current = self.pending_count();
            if current >= self.max_pending_sessions {
                warn!(session_id = %id, current, "too many pending sessions");
                return Err(ProtocolError::TooManyPendingSessions {
                    current,
                    max: self.max_pending_sessions,
                });
            }
        }

        let mut pending = PendingSession::new(chunk.total(), now);
        let step = pending.accept(chunk, now, self.max_buffer_per_session)?;
        debug!(session_id = %id, total = chunk.total(), "new session");
        self.sessions.insert(id.clone(), SessionEntry::Pending(pending));
        Ok(step)
    }

    fn finish(&mut self, id: &SessionId, now: u64) -> SessionState {
        let Some(SessionEntry::Pending(pending)) = self.sessions.remove(id) else {
            return self.state(id);
        };

        let outcome = match pending.decode() {
            Ok(record) => {
                info!(session_id = %id, total = pending.total, "session decoded");
                Outcome::Decoded {
                    total: pending.total,
                    record: Some(record),
                }
            }
            Err(e) => {
                warn!(session_id = %id, error = %e, "corrupt payload");
                Outcome::Failed(SessionFailure::CorruptPayload(e.to_string()))
            }
        };

        let finished = FinishedSession {
            outcome,
            finished_at: now,
        };
        let state = finished.state();
        self.insert_finished(id.clone(), finished);
        state
    }

    fn add_bare_payload(
        &mut self,
        id: &SessionId,
        payload: &str,
        now: u64,
    ) -> Result<SessionState> {
        self.sweep(now);
        if let Some(entry) = self.sessions.get(id) {
            return Ok(match entry {
                SessionEntry::Finished(done) => done.state(),
                SessionEntry::Pending(pending) => pending.state(),
            });
        }

        let record = decode_bundle(payload).inspect_err(|e| {
            warn!(session_id = %id, error = %e, "corrupt bare payload rejected");
        })?;
        info!(session_id = %id, "bare payload decoded");

        let finished = FinishedSession {
            outcome: Outcome::Decoded {
                total: 1,
                record: Some(record),
            },
            finished_at: now,
        };
        let state = finished.state();
        self.insert_finished(id.clone(), finished);
        Ok(state)
    }

    /// Store a tombstone, forgetting the oldest one if the table is full.
    fn insert_finished(&mut self, id: SessionId, finished: FinishedSession) {
        if self.finished_count() >= self.max_finished_sessions {
            let oldest = self
                .sessions
                .iter()
                .filter_map(|(key, entry)| match entry {
                    SessionEntry::Finished(done) => Some((done.finished_at, key)),
                    SessionEntry::Pending(_) => None,
                })
                .min()
                .map(|(_, key)| key.clone());
            if let Some(oldest) = oldest {
                debug!(session_id = %oldest, "oldest finished session dropped");
                self.sessions.remove(&oldest);
            }
        }
        self.sessions.insert(id, SessionEntry::Finished(finished));
    }

    /// Run [`cleanup_expired`](Self::cleanup_expired) at most once per
    /// second of caller time.
    fn sweep(&mut self, now: u64) {
        if now != self.last_sweep {
            self.last_sweep = now;
            self.cleanup_expired(now);
        }
    }

    /// Current state of a session.
    pub fn state(&self, id: &SessionId) -> SessionState {
        match self.sessions.get(id) {
            None => SessionState::Unseen,
            Some(SessionEntry::Pending(pending)) => pending.state(),
            Some(SessionEntry::Finished(done)) => done.state(),
        }
    }

    /// The decoded bundle of a session, if it has one and it has not been
    /// taken.
    pub fn completed_record(&self, id: &SessionId) -> Option<&WebBundle> {
        match self.sessions.get(id) {
            Some(SessionEntry::Finished(FinishedSession {
                outcome: Outcome::Decoded { record, .. },
                ..
            })) => record.as_ref(),
            _ => None,
        }
    }

    /// Move the decoded bundle out, leaving the session's tombstone.
    pub fn take_completed(&mut self, id: &SessionId) -> Option<WebBundle> {
        match self.sessions.get_mut(id) {
            Some(SessionEntry::Finished(FinishedSession {
                outcome: Outcome::Decoded { record, .. },
                ..
            })) => record.take(),
            _ => None,
        }
    }

    /// Discard a session in any state. Returns whether it existed.
    pub fn cancel(&mut self, id: &SessionId) -> bool {
        let existed = self.sessions.remove(id).is_some();
        if existed {
            debug!(session_id = %id, "session cancelled");
        }
        existed
    }

    /// Remove pending sessions idle past the timeout and tombstones past
    /// their retention.
    ///
    /// Returns the number of sessions removed.
    pub fn cleanup_expired(&mut self, now: u64) -> usize {
        let timeout = self.session_timeout_secs;
        let retention = self.completed_retention_secs;
        let before = self.sessions.len();

        self.sessions.retain(|id, entry| match entry {
            SessionEntry::Pending(pending) => {
                let expired = pending.is_expired(now, timeout);
                if expired {
                    warn!(
                        session_id = %id,
                        received = pending.slices.len(),
                        total = pending.total,
                        "abandoned session evicted"
                    );
                }
                !expired
            }
            SessionEntry::Finished(done) => !done.is_expired(now, retention),
        });

        before - self.sessions.len()
    }

    /// `(received, total)` for a session that is still collecting.
    pub fn pending_progress(&self, id: &SessionId) -> Option<(usize, u32)> {
        match self.sessions.get(id) {
            Some(SessionEntry::Pending(pending)) => Some((pending.slices.len(), pending.total)),
            _ => None,
        }
    }

    /// Number of sessions still collecting.
    pub fn pending_count(&self) -> usize {
        self.sessions
            .values()
            .filter(|entry| matches!(entry, SessionEntry::Pending(_)))
            .count()
    }

    /// Number of decoded or failed sessions remembered.
    pub fn finished_count(&self) -> usize {
        self.sessions.len() - self.pending_count()
    }

    /// Number of sessions tracked in any state.
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Maximum number of sessions collecting at once.
    pub fn max_pending_sessions(&self) -> usize {
        self.max_pending_sessions
    }

    /// Maximum number of decoded or failed sessions remembered.
    pub fn max_finished_sessions(&self) -> usize {
        self.max_finished_sessions
    }

    /// Maximum slice data per session in bytes.
    pub fn max_buffer_per_session(&self) -> usize {
        self.max_buffer_per_session
    }

    /// Slice data held across all pending sessions in bytes.
    pub fn total_buffer_size(&self) -> usize {
        self.sessions
            .values()
            .map(|entry| match entry {
                SessionEntry::Pending(pending) => pending.buffer_size,
                SessionEntry::Finished(_) => 0,
            })
            .sum()
    }
}

impl Default for ChunkReassembler {
    fn default() -> Self {
        Self::new(REASSEMBLY_TIMEOUT_SECS)
    }
}
