//! Session manager: the single source of truth for session existence.
//!
//! The session table is an explicitly owned value. Components that need it
//! receive an `Arc<SessionManager>` through [`CourierContext`](crate::CourierContext);
//! there is no global registry.
//!
//! Every structural change to the table (insert, remove, sweep) happens under
//! one lock. Per-session mutations go through the session's own lock, always
//! acquired after the table lock, never before.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::bot::BotRegistry;
use crate::error::{CourierError, CourierResult, SessionError, SessionResult};
use crate::event::Identity;
use crate::session::{Session, SessionKey, SessionState};

/// Session policy.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Maximum concurrent sessions, `0` for unlimited.
    pub max_sessions: usize,
    /// Idle time after which an unused session is reaped.
    pub idle_timeout: Duration,
    /// Single-identity mode: one pre-created session, no verification.
    pub single_mode: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_sessions: 0,
            idle_timeout: Duration::from_secs(1800),
            single_mode: false,
        }
    }
}

/// Owns the mapping from session key to [`Session`].
pub struct SessionManager {
    sessions: Mutex<HashMap<SessionKey, Arc<Session>>>,
    config: SessionConfig,
    bots: Arc<dyn BotRegistry>,
}

impl SessionManager {
    pub fn new(config: SessionConfig, bots: Arc<dyn BotRegistry>) -> Self {
        Self {
            sessions: Mutex::new(HashMap::new()),
            config,
            bots,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The bot registry sessions are bound against.
    pub fn bots(&self) -> &Arc<dyn BotRegistry> {
        &self.bots
    }

    // =========================================================================
    // Creation
    // =========================================================================

    /// Creates a fresh unauthenticated session.
    pub fn create_session(&self) -> SessionResult<Arc<Session>> {
        self.insert_new(false)
    }

    /// Creates a temporary session already bound to `identity`.
    ///
    /// Used by push connections that present an identity instead of a key;
    /// the transport closes it when its last connection ends.
    pub fn create_temp_session(&self, identity: Identity) -> CourierResult<Arc<Session>> {
        if self.bots.get(identity).is_none() {
            return Err(CourierError::NotFound(identity));
        }
        let session = self.insert_new(true)?;
        session.authenticate(identity)?;
        Ok(session)
    }

    fn insert_new(&self, temporary: bool) -> SessionResult<Arc<Session>> {
        let mut sessions = self.sessions.lock();
        let limit = self.config.max_sessions;
        if limit > 0 && sessions.len() >= limit {
            warn!(limit, "Session capacity reached");
            return Err(SessionError::CapacityExceeded { limit });
        }

        let key = SessionKey::generate();
        let session = Arc::new(Session::new(key.clone(), temporary));
        sessions.insert(key.clone(), session.clone());
        debug!(session = %key, temporary, "Session created");
        Ok(session)
    }

    /// Returns the single-mode session, creating it on first call.
    ///
    /// When `preauthenticated` is set, an unbound single session is bound to
    /// the first online bot, if any.
    pub fn create_single_session(&self, preauthenticated: bool) -> Arc<Session> {
        let session = {
            let mut sessions = self.sessions.lock();
            let key = SessionKey::single();
            match sessions.get(&key) {
                Some(existing) if !existing.is_closed() => existing.clone(),
                _ => {
                    let session = Arc::new(Session::new(key.clone(), false));
                    sessions.insert(key, session.clone());
                    info!("Single session created");
                    session
                }
            }
        };

        if preauthenticated
            && session.state() == SessionState::Unauthenticated
            && let Some(bot) = self.bots.first()
        {
            // A concurrent caller may have bound it first.
            let _ = session.authenticate(bot.identity());
        }
        session
    }

    // =========================================================================
    // Lookup & authentication
    // =========================================================================

    /// Binds the session `key` to `identity`.
    pub fn authenticate(&self, key: &SessionKey, identity: Identity) -> CourierResult<Arc<Session>> {
        let session = self.require(key)?;
        if self.bots.get(identity).is_none() {
            return Err(CourierError::NotFound(identity));
        }
        session.authenticate(identity)?;
        Ok(session)
    }

    /// Looks up a live session and marks it as used.
    pub fn lookup(&self, key: &SessionKey) -> Option<Arc<Session>> {
        let session = self.sessions.lock().get(key).cloned()?;
        if session.is_closed() {
            return None;
        }
        session.touch();
        Some(session)
    }

    /// Like [`lookup`](Self::lookup), failing with `IllegalSession`.
    pub fn require(&self, key: &SessionKey) -> SessionResult<Arc<Session>> {
        self.lookup(key).ok_or(SessionError::IllegalSession)
    }

    /// Looks up a session that must already be bound.
    pub fn get_authenticated(&self, key: &SessionKey) -> SessionResult<(Arc<Session>, Identity)> {
        let session = self.require(key)?;
        match session.identity() {
            Some(identity) => Ok((session, identity)),
            None => Err(SessionError::NotVerified),
        }
    }

    /// Snapshot of every live session.
    pub fn sessions(&self) -> Vec<Arc<Session>> {
        self.sessions.lock().values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.lock().is_empty()
    }

    // =========================================================================
    // Destruction
    // =========================================================================

    /// Closes the session's connections, then removes it. Idempotent.
    pub fn close_session(&self, key: &SessionKey) -> bool {
        let mut sessions = self.sessions.lock();
        match sessions.get(key) {
            Some(session) => {
                session.close();
                sessions.remove(key);
                debug!(session = %key, "Session removed");
                true
            }
            None => false,
        }
    }

    /// Closes every session idle longer than `idle_timeout` with no attached
    /// connection. The single session is never reaped.
    pub fn sweep_expired(&self, idle_timeout: Duration) -> Vec<SessionKey> {
        let mut sessions = self.sessions.lock();
        let expired: Vec<SessionKey> = sessions
            .values()
            .filter(|s| !s.key().is_single())
            .filter(|s| s.ref_count() == 0 && s.idle_for() >= idle_timeout)
            .map(|s| s.key().clone())
            .collect();

        for key in &expired {
            if let Some(session) = sessions.get(key) {
                session.close();
            }
            sessions.remove(key);
        }

        if !expired.is_empty() {
            info!(count = expired.len(), "Swept idle sessions");
        }
        expired
    }

    /// Closes every session.
    pub fn close_all(&self) {
        let mut sessions = self.sessions.lock();
        for session in sessions.values() {
            session.close();
        }
        let count = sessions.len();
        sessions.clear();
        info!(count, "All sessions closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::tests::registry_with;
    use crate::connection::ConnectionHandle;
    use crate::event::ChannelKind;

    fn manager(max_sessions: usize) -> SessionManager {
        SessionManager::new(
            SessionConfig {
                max_sessions,
                ..Default::default()
            },
            registry_with(&[1, 2]),
        )
    }

    #[test]
    fn test_authenticate_once() {
        let mgr = manager(0);
        let s = mgr.create_session().unwrap();
        mgr.authenticate(s.key(), Identity(1)).unwrap();
        let err = mgr.authenticate(s.key(), Identity(1)).unwrap_err();
        assert!(matches!(
            err,
            CourierError::Session(SessionError::AlreadyAuthenticated)
        ));
    }

    #[test]
    fn test_unknown_key_is_illegal() {
        let mgr = manager(0);
        let key = SessionKey::from("nope");
        assert!(mgr.lookup(&key).is_none());
        assert_eq!(mgr.require(&key).unwrap_err(), SessionError::IllegalSession);
        assert!(matches!(
            mgr.authenticate(&key, Identity(1)),
            Err(CourierError::Session(SessionError::IllegalSession))
        ));
        assert_eq!(
            mgr.get_authenticated(&key).unwrap_err(),
            SessionError::IllegalSession
        );
        assert!(!mgr.close_session(&key));
    }

    #[test]
    fn test_unknown_identity_not_found() {
        let mgr = manager(0);
        let s = mgr.create_session().unwrap();
        assert!(matches!(
            mgr.authenticate(s.key(), Identity(99)),
            Err(CourierError::NotFound(Identity(99)))
        ));
        assert_eq!(
            mgr.get_authenticated(s.key()).unwrap_err(),
            SessionError::NotVerified
        );
    }

    #[test]
    fn test_capacity() {
        let mgr = manager(2);
        let a = mgr.create_session().unwrap();
        mgr.create_session().unwrap();
        assert_eq!(
            mgr.create_session().unwrap_err(),
            SessionError::CapacityExceeded { limit: 2 }
        );
        mgr.close_session(a.key());
        assert!(mgr.create_session().is_ok());
    }

    #[test]
    fn test_single_session_idempotent() {
        let mgr = manager(0);
        let a = mgr.create_single_session(true);
        let b = mgr.create_single_session(true);
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(a.identity(), Some(Identity(1)));
        assert_eq!(mgr.len(), 1);
    }

    #[test]
    fn test_temp_session_requires_bot() {
        let mgr = manager(0);
        assert!(matches!(
            mgr.create_temp_session(Identity(7)),
            Err(CourierError::NotFound(_))
        ));
        let s = mgr.create_temp_session(Identity(2)).unwrap();
        assert!(s.is_temporary());
        assert_eq!(s.identity(), Some(Identity(2)));
    }

    #[tokio::test]
    async fn test_close_session_closes_connections_first() {
        let mgr = manager(0);
        let s = mgr.create_session().unwrap();
        let (conn, _rx) = ConnectionHandle::channel("c", 4);
        s.register_channel(ChannelKind::All, conn.clone()).unwrap();

        assert!(mgr.close_session(s.key()));
        conn.closed().await;
        assert!(mgr.lookup(s.key()).is_none());
        assert!(!mgr.close_session(s.key()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_honours_ref_count() {
        let mgr = manager(0);
        let busy = mgr.create_session().unwrap();
        let idle = mgr.create_session().unwrap();
        let single = mgr.create_single_session(false);
        let guard = busy.acquire();

        tokio::time::advance(Duration::from_secs(120)).await;
        let swept = mgr.sweep_expired(Duration::from_secs(60));

        assert_eq!(swept, vec![idle.key().clone()]);
        assert!(idle.is_closed());
        assert!(mgr.lookup(busy.key()).is_some());
        assert!(mgr.lookup(single.key()).is_some());

        // Once released, the busy session becomes eligible after the timeout.
        drop(guard);
        tokio::time::advance(Duration::from_secs(30)).await;
        assert!(mgr.sweep_expired(Duration::from_secs(60)).is_empty());
        tokio::time::advance(Duration::from_secs(31)).await;
        assert_eq!(mgr.sweep_expired(Duration::from_secs(60)), vec![busy.key().clone()]);
    }

    #[test]
    fn test_close_all() {
        let mgr = manager(0);
        let a = mgr.create_session().unwrap();
        mgr.create_single_session(false);
        mgr.close_all();
        assert!(mgr.is_empty());
        assert!(a.is_closed());
    }
}
