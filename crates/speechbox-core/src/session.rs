//! Codec session allocation for active playback streams.
//!
//! Every actively streaming device holds exactly one [`SessionId`],
//! allocated when its synthesized buffer arrives and released when
//! playback ends for any reason. The id namespace is shared by all
//! devices in the process, so the manager is handed around as an
//! `Arc<SessionManager>` service rather than hidden global state.

use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

/// Unique identity of one playback stream within the audio subsystem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionId(u64);

impl SessionId {
    /// Raw numeric value of the id.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// Snapshot of session manager usage counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionStats {
    /// Total ids handed out since the manager was created
    pub total_allocated: u64,
    /// Number of sessions currently live
    pub active: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "sessions: {} active, {} allocated total",
            self.active, self.total_allocated
        )
    }
}

/// Allocator for process-wide-unique playback session ids.
#[derive(Debug, Default)]
pub struct SessionManager {
    next_id: AtomicU64,
    active: Mutex<HashSet<SessionId>>,
}

impl SessionManager {
    /// Create a new session manager with an empty active set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh session id and mark it active.
    pub fn allocate(&self) -> SessionId {
        let id = SessionId(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        self.active.lock().insert(id);
        tracing::debug!(session = %id, "allocated codec session");
        id
    }

    /// Release a session id.
    ///
    /// Releasing an id that was never allocated, or has already been
    /// released, is a no-op.
    pub fn release(&self, id: SessionId) {
        if self.active.lock().remove(&id) {
            tracing::debug!(session = %id, "released codec session");
        }
    }

    /// Whether the given id is currently live.
    #[must_use]
    pub fn is_active(&self, id: SessionId) -> bool {
        self.active.lock().contains(&id)
    }

    /// Number of sessions currently live.
    #[must_use]
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Snapshot the usage counters.
    #[must_use]
    pub fn stats(&self) -> SessionStats {
        SessionStats {
            total_allocated: self.next_id.load(Ordering::Relaxed),
            active: self.active.lock().len(),
        }
    }
}
