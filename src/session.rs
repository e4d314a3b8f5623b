use actix_session::Session;
use actix_session::storage::{
    CookieSessionStore, LoadError, SaveError, SessionKey, SessionStore, UpdateError,
};
use actix_web::cookie::time::Duration;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Session key under which the copilot session id is kept.
pub const COPILOT_SESSION_KEY: &str = "copilot_session_id";

type SessionState = HashMap<String, String>;

struct StoredSession {
    state: SessionState,
    expires_at: Instant,
}

/// Server-side session storage that lives as long as the process.
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    sessions: Arc<Mutex<HashMap<String, StoredSession>>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Result<MutexGuard<'_, HashMap<String, StoredSession>>, anyhow::Error> {
        self.sessions
            .lock()
            .map_err(|_| anyhow::anyhow!("in-memory session store is poisoned"))
    }

    fn expiry(ttl: &Duration) -> Instant {
        let secs = ttl.whole_seconds().max(0) as u64;
        Instant::now() + std::time::Duration::from_secs(secs)
    }

    fn sweep(sessions: &mut HashMap<String, StoredSession>) {
        let now = Instant::now();
        sessions.retain(|_, stored| stored.expires_at > now);
    }

    pub fn len(&self) -> usize {
        self.lock().map(|sessions| sessions.len()).unwrap_or(0)
    }
}

impl SessionStore for InMemoryBackend {
    async fn load(&self, session_key: &SessionKey) -> Result<Option<SessionState>, LoadError> {
        let mut sessions = self.lock().map_err(LoadError::Other)?;
        let key = session_key.as_ref();
        let expired = match sessions.get(key) {
            Some(stored) if stored.expires_at > Instant::now() => return Ok(Some(stored.state.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            sessions.remove(key);
        }
        Ok(None)
    }

    async fn save(&self, session_state: SessionState, ttl: &Duration) -> Result<SessionKey, SaveError> {
        let session_key = actix_session::storage::generate_session_key();
        let mut sessions = self.lock().map_err(SaveError::Other)?;
        Self::sweep(&mut sessions);
        sessions.insert(
            session_key.as_ref().to_string(),
            StoredSession {
                state: session_state,
                expires_at: Self::expiry(ttl),
            },
        );
        Ok(session_key)
    }

    async fn update(
        &self,
        session_key: SessionKey,
        session_state: SessionState,
        ttl: &Duration,
    ) -> Result<SessionKey, UpdateError> {
        let mut sessions = self.lock().map_err(UpdateError::Other)?;
        Self::sweep(&mut sessions);
        sessions.insert(
            session_key.as_ref().to_string(),
            StoredSession {
                state: session_state,
                expires_at: Self::expiry(ttl),
            },
        );
        Ok(session_key)
    }

    async fn update_ttl(&self, session_key: &SessionKey, ttl: &Duration) -> Result<(), anyhow::Error> {
        let mut sessions = self.lock()?;
        if let Some(stored) = sessions.get_mut(session_key.as_ref()) {
            stored.expires_at = Self::expiry(ttl);
        }
        Ok(())
    }

    async fn delete(&self, session_key: &SessionKey) -> Result<(), anyhow::Error> {
        let mut sessions = self.lock()?;
        sessions.remove(session_key.as_ref());
        Ok(())
    }
}

#[derive(Clone)]
pub enum RuntimeSessionStore {
    Cookie(Arc<CookieSessionStore>),
    InMemory(InMemoryBackend),
}

impl RuntimeSessionStore {
    pub fn new_cookie() -> Self {
        RuntimeSessionStore::Cookie(Arc::new(CookieSessionStore::default()))
    }

    pub fn new_inmemory() -> Self {
        RuntimeSessionStore::InMemory(InMemoryBackend::new())
    }
}

impl SessionStore for RuntimeSessionStore {
    async fn load(&self, session_key: &SessionKey) -> Result<Option<SessionState>, LoadError> {
        match self {
            RuntimeSessionStore::Cookie(s) => s.load(session_key).await,
            RuntimeSessionStore::InMemory(s) => s.load(session_key).await,
        }
    }

    async fn save(&self, session_state: SessionState, ttl: &Duration) -> Result<SessionKey, SaveError> {
        match self {
            RuntimeSessionStore::Cookie(s) => s.save(session_state, ttl).await,
            RuntimeSessionStore::InMemory(s) => s.save(session_state, ttl).await,
        }
    }

    async fn update(
        &self,
        session_key: SessionKey,
        session_state: SessionState,
        ttl: &Duration,
    ) -> Result<SessionKey, UpdateError> {
        match self {
            RuntimeSessionStore::Cookie(s) => s.update(session_key, session_state, ttl).await,
            RuntimeSessionStore::InMemory(s) => s.update(session_key, session_state, ttl).await,
        }
    }

    async fn update_ttl(&self, session_key: &SessionKey, ttl: &Duration) -> Result<(), anyhow::Error> {
        match self {
            RuntimeSessionStore::Cookie(s) => s.update_ttl(session_key, ttl).await,
            RuntimeSessionStore::InMemory(s) => s.update_ttl(session_key, ttl).await,
        }
    }

    async fn delete(&self, session_key: &SessionKey) -> Result<(), anyhow::Error> {
        match self {
            RuntimeSessionStore::Cookie(s) => s.delete(session_key).await,
            RuntimeSessionStore::InMemory(s) => s.delete(session_key).await,
        }
    }
}

/// Returns the copilot session id stored in the HTTP session, minting one on
/// first use.
pub fn copilot_session_id(session: &Session) -> Result<String, actix_web::Error> {
    if let Some(id) = session.get::<String>(COPILOT_SESSION_KEY)? {
        return Ok(id);
    }
    let id = uuid::Uuid::new_v4().to_string();
    session.insert(COPILOT_SESSION_KEY, &id)?;
    Ok(id)
}
