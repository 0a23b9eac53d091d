//! In-memory session store with lazy expiry.
//!
//! Expiry is checked when a session is read. Expired sessions are not
//! disconnected here: [`SessionStore::lookup`] and
//! [`SessionStore::remove_if_expired`] return the evicted record so the caller
//! can close its connection.

use crate::models::SessionContext;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

/// Outcome of reading a session id.
#[derive(Debug, Clone)]
pub enum SessionLookup {
    Live(SessionContext),
    /// Past its timeout; the record has just been evicted
    Expired(SessionContext),
    Missing,
}

#[derive(Debug, Clone)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<String, SessionContext>>>,
    timeout: Duration,
}

impl SessionStore {
    pub fn new(timeout: Duration) -> Self {
        Self {
            sessions: Arc::new(RwLock::new(HashMap::new())),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn is_expired(&self, session: &SessionContext) -> bool {
        let idle = Utc::now().signed_duration_since(session.last_activity);
        // Negative idle time (clock skew) counts as fresh
        idle.to_std().is_ok_and(|idle| idle > self.timeout)
    }

    /// Create and register a fresh session.
    pub async fn create(&self) -> SessionContext {
        let session = SessionContext::new();
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session.clone());
        debug!(session_id = %session.id, "Session created");
        session
    }

    /// A live session, or `None` when it never existed or has expired.
    ///
    /// Expired records are evicted by this call.
    pub async fn get(&self, session_id: &str) -> Option<SessionContext> {
        match self.lookup(session_id).await {
            SessionLookup::Live(session) => Some(session),
            SessionLookup::Expired(_) | SessionLookup::Missing => None,
        }
    }

    /// Like [`get`](Self::get), but hands back an evicted record so the
    /// caller can release what it holds.
    pub async fn lookup(&self, session_id: &str) -> SessionLookup {
        {
            let sessions = self.sessions.read().await;
            match sessions.get(session_id) {
                None => return SessionLookup::Missing,
                Some(session) if !self.is_expired(session) => {
                    return SessionLookup::Live(session.clone());
                }
                Some(_) => {}
            }
        }
        // Re-check under the write lock in case the session was refreshed
        match self.remove_if_expired(session_id).await {
            Some(session) => SessionLookup::Expired(session),
            None => match self.sessions.read().await.get(session_id) {
                Some(session) => SessionLookup::Live(session.clone()),
                None => SessionLookup::Missing,
            },
        }
    }

    /// Refresh `last_activity` and persist.
    pub async fn update(&self, mut session: SessionContext) -> SessionContext {
        session.touch();
        self.insert(session.clone()).await;
        session
    }

    /// Persist a session exactly as given.
    pub async fn insert(&self, session: SessionContext) {
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    /// Remove a session, returning it if it was present.
    pub async fn delete(&self, session_id: &str) -> Option<SessionContext> {
        self.sessions.write().await.remove(session_id)
    }

    /// Number of stored records, including expired ones not yet evicted.
    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Ids of records past their timeout, without evicting them.
    pub async fn expired_ids(&self) -> Vec<String> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| self.is_expired(s))
            .map(|s| s.id.clone())
            .collect()
    }

    /// Evict a record if it is still expired, returning it.
    pub async fn remove_if_expired(&self, session_id: &str) -> Option<SessionContext> {
        let mut sessions = self.sessions.write().await;
        if !sessions.get(session_id).is_some_and(|s| self.is_expired(s)) {
            return None;
        }
        debug!(session_id = %session_id, "Session expired");
        sessions.remove(session_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio_test::block_on;

    fn store() -> SessionStore {
        SessionStore::new(Duration::from_secs(60 * 60))
    }

    fn stale(mut session: SessionContext) -> SessionContext {
        session.last_activity = Utc::now() - chrono::Duration::hours(2);
        session
    }

    #[test]
    fn test_create_and_get() {
        block_on(async {
            let store = store();
            let session = store.create().await;
            let fetched = store.get(&session.id).await.unwrap();
            assert_eq!(fetched.id, session.id);
        });
    }

    #[test]
    fn test_unknown_id_is_absent() {
        block_on(async {
            assert!(store().get("never-issued").await.is_none());
        });
    }

    #[test]
    fn test_expired_session_is_absent_and_evicted() {
        block_on(async {
            let store = store();
            let session = store.create().await;
            store.insert(stale(session.clone())).await;
            assert_eq!(store.len().await, 1);

            assert!(store.get(&session.id).await.is_none());
            assert!(store.is_empty().await);
        });
    }

    #[test]
    fn test_lookup_returns_evicted_record() {
        block_on(async {
            let store = store();
            let session = store.create().await;
            store.insert(stale(session.clone())).await;

            match store.lookup(&session.id).await {
                SessionLookup::Expired(evicted) => assert_eq!(evicted.id, session.id),
                other => panic!("expected an expired session, got {:?}", other),
            }
            assert!(matches!(store.lookup(&session.id).await, SessionLookup::Missing));
        });
    }

    #[test]
    fn test_remove_if_expired_keeps_refreshed_session() {
        block_on(async {
            let store = store();
            let session = stale(store.create().await);
            store.insert(session.clone()).await;
            assert_eq!(store.expired_ids().await, vec![session.id.clone()]);

            store.update(session.clone()).await;

            assert!(store.remove_if_expired(&session.id).await.is_none());
            assert!(store.get(&session.id).await.is_some());
        });
    }

    #[test]
    fn test_update_refreshes_activity() {
        block_on(async {
            let store = store();
            let session = stale(store.create().await);
            let updated = store.update(session).await;
            assert!(store.get(&updated.id).await.is_some());
        });
    }

    #[test]
    fn test_delete() {
        block_on(async {
            let store = store();
            let session = store.create().await;
            assert!(store.delete(&session.id).await.is_some());
            assert!(store.get(&session.id).await.is_none());
            assert!(store.delete(&session.id).await.is_none());
        });
    }

    #[test]
    fn test_expired_ids_and_removal() {
        block_on(async {
            let store = store();
            let fresh = store.create().await;
            let old = store.create().await;
            store.insert(stale(old.clone())).await;

            assert_eq!(store.expired_ids().await, vec![old.id.clone()]);
            assert!(store.remove_if_expired(&fresh.id).await.is_none());
            assert_eq!(store.remove_if_expired(&old.id).await.unwrap().id, old.id);
            assert!(store.get(&fresh.id).await.is_some());
            assert_eq!(store.len().await, 1);
        });
    }
}
