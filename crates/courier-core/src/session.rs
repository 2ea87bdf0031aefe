//! Client sessions.
//!
//! A [`Session`] is the capability a client holds after bootstrap. It is bound
//! to at most one bot identity, owns one connection slot per
//! [`ChannelKind`], and counts the transport connections currently attached
//! to it so the idle sweeper never reaps a session in use.
//!
//! ```text
//! Unauthenticated ──authenticate──▶ Authenticated(identity)
//!        │                                 │
//!        └───────────close─────────────────┴──▶ Closed
//! ```

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::connection::ConnectionHandle;
use crate::error::{SessionError, SessionResult};
use crate::event::{ChannelKind, Identity};

// =============================================================================
// Session Key
// =============================================================================

/// Opaque, unguessable session key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey(Arc<str>);

impl SessionKey {
    /// Key of the one session used in single mode.
    pub const SINGLE: &'static str = "SINGLE_SESSION";

    /// Generates a new random key.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string().into())
    }

    /// The fixed single-mode key.
    pub fn single() -> Self {
        Self(Self::SINGLE.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_single(&self) -> bool {
        &*self.0 == Self::SINGLE
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionKey {
    fn from(value: &str) -> Self {
        Self(value.into())
    }
}

impl From<String> for SessionKey {
    fn from(value: String) -> Self {
        Self(value.into())
    }
}

// =============================================================================
// Session
// =============================================================================

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Authenticated(Identity),
    Closed,
}

struct SessionInner {
    state: SessionState,
    channels: HashMap<ChannelKind, ConnectionHandle>,
    last_touched: Instant,
}

/// A stateful client handle.
pub struct Session {
    key: SessionKey,
    /// Created implicitly by a connection; closed when its last connection ends.
    temporary: bool,
    inner: Mutex<SessionInner>,
    ref_count: AtomicUsize,
    closed: CancellationToken,
}

impl Session {
    pub(crate) fn new(key: SessionKey, temporary: bool) -> Self {
        Self {
            key,
            temporary,
            inner: Mutex::new(SessionInner {
                state: SessionState::Unauthenticated,
                channels: HashMap::new(),
                last_touched: Instant::now(),
            }),
            ref_count: AtomicUsize::new(0),
            closed: CancellationToken::new(),
        }
    }

    pub fn key(&self) -> &SessionKey {
        &self.key
    }

    pub fn is_temporary(&self) -> bool {
        self.temporary
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().state
    }

    /// The bound identity, if authenticated.
    pub fn identity(&self) -> Option<Identity> {
        match self.inner.lock().state {
            SessionState::Authenticated(identity) => Some(identity),
            _ => None,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity().is_some()
    }

    /// Binds the session to `identity`. Succeeds exactly once.
    pub fn authenticate(&self, identity: Identity) -> SessionResult<()> {
        let mut inner = self.inner.lock();
        match inner.state {
            SessionState::Unauthenticated => {
                inner.state = SessionState::Authenticated(identity);
                inner.last_touched = Instant::now();
                debug!(session = %self.key, identity = %identity, "Session authenticated");
                Ok(())
            }
            SessionState::Authenticated(_) => Err(SessionError::AlreadyAuthenticated),
            SessionState::Closed => Err(SessionError::IllegalSession),
        }
    }

    /// Marks the session as used now.
    pub fn touch(&self) {
        self.inner.lock().last_touched = Instant::now();
    }

    /// Time since the session was last used.
    pub fn idle_for(&self) -> Duration {
        self.inner.lock().last_touched.elapsed()
    }

    /// Number of live transport connections attached.
    pub fn ref_count(&self) -> usize {
        self.ref_count.load(Ordering::Acquire)
    }

    /// Attaches a transport connection for the lifetime of the returned guard.
    pub fn acquire(self: &Arc<Self>) -> SessionRef {
        self.ref_count.fetch_add(1, Ordering::AcqRel);
        self.touch();
        SessionRef {
            session: self.clone(),
        }
    }

    // =========================================================================
    // Channel slots
    // =========================================================================

    /// Installs `handle` in the `kind` slot, closing any previous occupant.
    pub fn register_channel(&self, kind: ChannelKind, handle: ConnectionHandle) -> SessionResult<()> {
        let previous = {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Closed {
                return Err(SessionError::IllegalSession);
            }
            inner.last_touched = Instant::now();
            inner.channels.insert(kind, handle)
        };

        if let Some(old) = previous {
            debug!(session = %self.key, channel = %kind, connection = %old.id, "Replacing channel connection");
            old.close();
        }
        Ok(())
    }

    /// Empties the `kind` slot if it still holds `handle`.
    ///
    /// Returns `false` when a newer connection already took the slot.
    pub fn release_channel(&self, kind: ChannelKind, handle: &ConnectionHandle) -> bool {
        let mut inner = self.inner.lock();
        match inner.channels.get(&kind) {
            Some(current) if current.same_as(handle) => {
                inner.channels.remove(&kind);
                true
            }
            _ => false,
        }
    }

    /// Current connection in the `kind` slot.
    pub fn channel(&self, kind: ChannelKind) -> Option<ConnectionHandle> {
        self.inner.lock().channels.get(&kind).cloned()
    }

    // =========================================================================
    // Closing
    // =========================================================================

    /// Moves to `Closed` and closes every registered connection.
    ///
    /// Returns `false` if the session was already closed.
    pub fn close(&self) -> bool {
        let connections: Vec<ConnectionHandle> = {
            let mut inner = self.inner.lock();
            if inner.state == SessionState::Closed {
                return false;
            }
            inner.state = SessionState::Closed;
            inner.channels.drain().map(|(_, handle)| handle).collect()
        };

        for handle in &connections {
            handle.close();
        }
        self.closed.cancel();
        trace!(session = %self.key, connections = connections.len(), "Session closed");
        true
    }

    pub fn is_closed(&self) -> bool {
        self.closed.is_cancelled()
    }

    /// Resolves once the session is closed.
    pub async fn closed(&self) {
        self.closed.cancelled().await
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("ref_count", &self.ref_count())
            .field("temporary", &self.temporary)
            .finish()
    }
}

// =============================================================================
// Session Ref
// =============================================================================

/// Counts one attached connection; decrements on drop.
#[derive(Debug)]
pub struct SessionRef {
    session: Arc<Session>,
}

impl SessionRef {
    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }
}

impl Deref for SessionRef {
    type Target = Session;

    fn deref(&self) -> &Session {
        &self.session
    }
}

impl Drop for SessionRef {
    fn drop(&mut self) {
        self.session.ref_count.fetch_sub(1, Ordering::AcqRel);
        self.session.touch();
    }
}
