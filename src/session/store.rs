//! Process-wide session bookkeeping.
//!
//! The store is the single shared mutable structure in the system: a map
//! from session identifier to session, guarded by an async `RwLock` so
//! create/get/delete are atomic with respect to one another under
//! concurrent connections. Entries are inserted only after a successful
//! handshake and removed exactly once — on explicit close, detected
//! disconnect, or idle expiry.

use crate::capability::CapabilityRegistry;
use crate::error::{BridgeError, BridgeResult};
use crate::session::session::Session;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{info, warn};

/// Default idle lifetime before a session is reaped.
pub const DEFAULT_SESSION_IDLE_SECS: u64 = 300;

/// Sweep interval for the idle reaper.
const REAPER_INTERVAL_SECS: u64 = 30;

/// Generate a fresh opaque session identifier.
///
/// uuid v4 carries 122 bits of randomness; collisions within a process
/// lifetime are negligible, and the token is never derived from client
/// input.
pub fn generate_session_id() -> String {
    format!("ses_{}", uuid::Uuid::new_v4().simple())
}

pub struct SessionStore {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
        }
    }

    /// Create a session: generate its identifier, complete the handshake
    /// transition, and register the entry.
    ///
    /// The entry becomes visible to `get` only after `activate` succeeds,
    /// so the store never holds a session that is still awaiting its
    /// handshake.
    pub async fn create(
        &self,
        capabilities: Arc<CapabilityRegistry>,
    ) -> BridgeResult<Arc<Session>> {
        let id = generate_session_id();
        let session = Session::new(id.clone(), capabilities);
        session.activate().await?;
        let session = Arc::new(session);

        let mut sessions = self.sessions.write().await;
        if sessions.contains_key(&id) {
            return Err(BridgeError::internal("Session identifier collision"));
        }
        sessions.insert(id, session.clone());

        info!(
            session_id = %session.id(),
            live_sessions = sessions.len(),
            "Session created"
        );

        Ok(session)
    }

    /// Look up a live session.
    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    /// Remove a session, closing it. Idempotent: deleting an unknown id is
    /// a no-op and returns false.
    pub async fn delete(&self, id: &str) -> bool {
        let removed = self.sessions.write().await.remove(id);
        match removed {
            Some(session) => {
                session.close().await;
                info!(session_id = %id, "Session removed");
                true
            }
            None => false,
        }
    }

    /// Number of live sessions.
    pub async fn count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Start the background task that expires idle sessions.
    ///
    /// This should be called once when the server starts.
    pub fn start_reaper(self: Arc<Self>, idle_timeout: Duration) {
        tokio::spawn(async move {
            let mut interval =
                tokio::time::interval(Duration::from_secs(REAPER_INTERVAL_SECS));
            loop {
                interval.tick().await;
                self.reap_idle(idle_timeout).await;
            }
        });
    }

    /// Close and remove sessions idle beyond `idle_timeout`.
    pub async fn reap_idle(&self, idle_timeout: Duration) {
        let mut expired = Vec::new();
        {
            let sessions = self.sessions.read().await;
            for (id, session) in sessions.iter() {
                if session.idle_for().await > idle_timeout {
                    expired.push((id.clone(), session.clone()));
                }
            }
        }

        for (id, session) in expired {
            warn!(session_id = %id, "Expiring idle session");
            session
                .push_event(
                    "session/closing",
                    serde_json::json!({ "reason": "idle timeout" }),
                )
                .await;
            self.delete(&id).await;
        }
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn empty_registry() -> Arc<CapabilityRegistry> {
        Arc::new(CapabilityRegistry::new())
    }

    #[test]
    fn test_session_ids_are_unique_and_prefixed() {
        let a = generate_session_id();
        let b = generate_session_id();
        assert_ne!(a, b);
        assert!(a.starts_with("ses_"));
        assert_eq!(a.len(), 4 + 32);
    }

    #[tokio::test]
    async fn test_create_get_delete_roundtrip() {
        let store = SessionStore::new();
        let session = store.create(empty_registry()).await.unwrap();
        let id = session.id().to_string();

        assert_eq!(store.count().await, 1);
        assert!(store.get(&id).await.is_some());

        assert!(store.delete(&id).await);
        assert!(store.get(&id).await.is_none());
        assert_eq!(store.count().await, 0);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = SessionStore::new();
        let session = store.create(empty_registry()).await.unwrap();
        let id = session.id().to_string();

        assert!(store.delete(&id).await);
        assert!(!store.delete(&id).await);
        assert!(!store.delete("ses_never_existed").await);
    }

    #[tokio::test]
    async fn test_created_sessions_are_active() {
        let store = SessionStore::new();
        let session = store.create(empty_registry()).await.unwrap();
        assert_eq!(
            session.state().await,
            crate::session::SessionState::Active
        );
    }

    #[tokio::test]
    async fn test_delete_closes_session() {
        let store = SessionStore::new();
        let session = store.create(empty_registry()).await.unwrap();
        let id = session.id().to_string();
        store.delete(&id).await;
        assert!(session.is_closed().await);
    }

    #[tokio::test]
    async fn test_concurrent_creates_yield_distinct_ids() {
        let store = Arc::new(SessionStore::new());
        let registry = empty_registry();

        let mut handles = Vec::new();
        for _ in 0..16 {
            let store = store.clone();
            let registry = registry.clone();
            handles.push(tokio::spawn(async move {
                store.create(registry).await.unwrap().id().to_string()
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.unwrap());
        }
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), 16);
        assert_eq!(store.count().await, 16);
    }

    #[tokio::test]
    async fn test_reap_idle_expires_stale_sessions() {
        let store = SessionStore::new();
        let session = store.create(empty_registry()).await.unwrap();
        let id = session.id().to_string();

        // Nothing is stale yet
        store.reap_idle(Duration::from_secs(60)).await;
        assert_eq!(store.count().await, 1);

        // With a zero timeout everything is stale
        store.reap_idle(Duration::ZERO).await;
        assert_eq!(store.count().await, 0);
        assert!(store.get(&id).await.is_none());
        assert!(session.is_closed().await);
    }
}
