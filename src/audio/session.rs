use dashmap::DashMap;
use std::sync::{atomic::AtomicU64, Arc};
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::{
    queue::SessionQueue,
    sink::{PlaybackToken, SessionId},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    /// Created, nothing handed to the sink yet.
    Idle,
    Playing,
    Transitioning,
    /// Queue ran dry; the session is gone from the registry.
    Draining,
}

/// Playback state of one guild.
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub queue: SessionQueue,
    pub state: PlaybackState,
    token: PlaybackToken,
    /// Shared by every session of the registry.
    tokens: Arc<AtomicU64>,
    closed: bool,
}

impl Session {
    fn new(id: SessionId, tokens: Arc<AtomicU64>) -> Self {
        Self {
            id,
            queue: SessionQueue::new(),
            state: PlaybackState::Idle,
            token: PlaybackToken::default(),
            tokens,
            closed: false,
        }
    }

    pub fn token(&self) -> PlaybackToken {
        self.token
    }

    /// Issues the token for the next `start`; older events become stale,
    /// including those of earlier sessions for the same guild.
    pub fn next_token(&mut self) -> PlaybackToken {
        self.token = PlaybackToken::issue(&self.tokens);
        self.token
    }

    /// Whether the registry has dropped this session.
    ///
    /// Holders of a stale `Arc` must re-fetch from the registry.
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

pub type SessionHandle = Arc<Mutex<Session>>;

/// Owns every live session; one lock per session.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: DashMap<SessionId, SessionHandle>,
    tokens: Arc<AtomicU64>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: SessionId) -> Option<SessionHandle> {
        self.sessions.get(&id).map(|s| s.value().clone())
    }

    /// Returns the session and whether it was just created.
    pub fn get_or_create(&self, id: SessionId) -> (SessionHandle, bool) {
        let mut created = false;
        let handle = self
            .sessions
            .entry(id)
            .or_insert_with(|| {
                created = true;
                Arc::new(Mutex::new(Session::new(id, self.tokens.clone())))
            })
            .value()
            .clone();

        if created {
            info!("🎵 Nueva sesión para guild {}", id);
        }
        (handle, created)
    }

    /// Drops the session from the registry.
    ///
    /// Takes the locked session so it can be marked closed in the same
    /// critical section; only removes the entry if it is still this session.
    pub fn remove(&self, session: &mut Session, handle: &SessionHandle) {
        session.closed = true;
        session.next_token();
        let removed = self
            .sessions
            .remove_if(&session.id, |_, current| Arc::ptr_eq(current, handle))
            .is_some();
        if removed {
            debug!("🗑️ Sesión {} eliminada", session.id);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn contains(&self, id: SessionId) -> bool {
        self.sessions.contains_key(&id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn create_is_idempotent_per_id() {
        let registry = SessionRegistry::new();
        let (first, created) = registry.get_or_create(1);
        assert!(created);
        let (again, created) = registry.get_or_create(1);
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &again));

        registry.get_or_create(2);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn removal_closes_and_invalidates_token() {
        let registry = SessionRegistry::new();
        let (handle, _) = registry.get_or_create(1);
        let mut session = handle.lock().await;
        let token = session.next_token();

        registry.remove(&mut session, &handle);
        assert!(session.is_closed());
        assert_ne!(session.token(), token);
        assert!(!registry.contains(1));
    }

    #[tokio::test]
    async fn replacement_session_never_reuses_a_token() {
        let registry = SessionRegistry::new();
        let (old, _) = registry.get_or_create(1);
        let old_token = old.lock().await.next_token();
        registry.remove(&mut *old.lock().await, &old);

        let (fresh, _) = registry.get_or_create(1);
        let fresh_token = fresh.lock().await.next_token();
        assert_ne!(fresh_token, old_token);
    }

    #[tokio::test]
    async fn removing_a_stale_handle_keeps_the_replacement() {
        let registry = SessionRegistry::new();
        let (old, _) = registry.get_or_create(1);
        registry.remove(&mut *old.lock().await, &old);

        let (fresh, created) = registry.get_or_create(1);
        assert!(created);

        registry.remove(&mut *old.lock().await, &old);
        assert!(registry.contains(1));
        assert!(Arc::ptr_eq(&registry.get(1).unwrap(), &fresh));
    }
}
