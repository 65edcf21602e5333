//! In-process storage backend.
//!
//! Backed by lock-free concurrent maps, so concurrent login attempts from
//! different users never contend. `DashMap::remove` is atomic, which is
//! exactly the get-and-remove guarantee `take_state` needs. Single
//! instance only; everything is lost on restart.

use async_trait::async_trait;
use dashmap::DashMap;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::access_token::AccessTokenRecord;
use crate::session::{AuthorizationState, OAuthSessionData};
use crate::store::{AccessTokenStore, AuthStore, CleanupStats};

/// In-process state/session store.
#[derive(Debug, Default)]
pub struct MemoryAuthStore {
    states: DashMap<String, AuthorizationState>,
    sessions: DashMap<String, OAuthSessionData>,
}

impl MemoryAuthStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AuthStore for MemoryAuthStore {
    async fn put_state(&self, state: AuthorizationState) -> AuthResult<()> {
        self.states.insert(state.state.clone(), state);
        Ok(())
    }

    async fn take_state(&self, state: &str) -> AuthResult<Option<AuthorizationState>> {
        // remove() is atomic: exactly one of two racing callers gets the
        // value.
        Ok(self.states.remove(state).map(|(_, value)| value))
    }

    async fn put_session(&self, session: OAuthSessionData) -> AuthResult<()> {
        self.sessions.insert(session.id.clone(), session);
        Ok(())
    }

    async fn get_session(&self, session_id: &str) -> AuthResult<Option<OAuthSessionData>> {
        let session = match self.sessions.get(session_id) {
            Some(entry) => entry.clone(),
            None => return Ok(None),
        };

        if session.is_expired() {
            self.sessions.remove(session_id);
            return Ok(None);
        }

        Ok(Some(session))
    }

    async fn delete_session(&self, session_id: &str) -> AuthResult<()> {
        self.sessions.remove(session_id);
        Ok(())
    }

    async fn cleanup_expired(&self) -> AuthResult<CleanupStats> {
        let now = OffsetDateTime::now_utc();

        let states_before = self.states.len();
        self.states.retain(|_, state| state.expires_at >= now);

        let sessions_before = self.sessions.len();
        self.sessions.retain(|_, session| session.expires_at >= now);

        Ok(CleanupStats {
            states_removed: (states_before - self.states.len()) as u64,
            sessions_removed: (sessions_before - self.sessions.len()) as u64,
        })
    }
}

/// In-process access-token store.
#[derive(Debug, Default)]
pub struct MemoryAccessTokenStore {
    tokens: DashMap<String, AccessTokenRecord>,
}

impl MemoryAccessTokenStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AccessTokenStore for MemoryAccessTokenStore {
    async fn insert(&self, record: AccessTokenRecord) -> AuthResult<()> {
        self.tokens.insert(record.id.clone(), record);
        Ok(())
    }

    async fn find_by_digest(&self, digest: &str) -> AuthResult<Option<AccessTokenRecord>> {
        Ok(self
            .tokens
            .iter()
            .find(|entry| entry.digest == digest)
            .map(|entry| entry.clone()))
    }

    async fn get(&self, id: &str) -> AuthResult<Option<AccessTokenRecord>> {
        Ok(self.tokens.get(id).map(|entry| entry.clone()))
    }

    async fn list(&self) -> AuthResult<Vec<AccessTokenRecord>> {
        let mut records: Vec<_> = self.tokens.iter().map(|entry| entry.clone()).collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(records)
    }

    async fn touch_last_used(&self, id: &str, when: OffsetDateTime) -> AuthResult<()> {
        if let Some(mut entry) = self.tokens.get_mut(id) {
            entry.last_used_at = Some(when);
        }
        Ok(())
    }

    async fn delete(&self, id: &str) -> AuthResult<bool> {
        Ok(self.tokens.remove(id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn state(name: &str, ttl_secs: i64) -> AuthorizationState {
        let mut s = AuthorizationState::new(name, "verifier", None, Duration::from_secs(300));
        s.expires_at = OffsetDateTime::now_utc() + time::Duration::seconds(ttl_secs);
        s
    }

    fn session(id: &str, ttl_secs: i64) -> OAuthSessionData {
        let now = OffsetDateTime::now_utc();
        OAuthSessionData {
            id: id.to_string(),
            user_id: "u1@example.com".to_string(),
            email: Some("u1@example.com".to_string()),
            name: None,
            groups: vec![],
            provider: "test".to_string(),
            created_at: now,
            expires_at: now + time::Duration::seconds(ttl_secs),
        }
    }

    #[tokio::test]
    async fn test_take_state_is_single_use() {
        let store = MemoryAuthStore::new();
        store.put_state(state("s1", 300)).await.unwrap();

        assert!(store.take_state("s1").await.unwrap().is_some());
        assert!(store.take_state("s1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_concurrent_take_state_resolves_once() {
        let store = Arc::new(MemoryAuthStore::new());
        store.put_state(state("s1", 300)).await.unwrap();

        let a = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.take_state("s1").await.unwrap() })
        };
        let b = {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.take_state("s1").await.unwrap() })
        };

        let (a, b) = (a.await.unwrap(), b.await.unwrap());
        assert!(
            a.is_some() ^ b.is_some(),
            "exactly one racing take may succeed"
        );
    }

    #[tokio::test]
    async fn test_expired_state_is_still_returned() {
        // Expiry policy belongs to the orchestrator; the store hands back
        // whatever it consumed.
        let store = MemoryAuthStore::new();
        store.put_state(state("s1", -10)).await.unwrap();

        let taken = store.take_state("s1").await.unwrap().unwrap();
        assert!(taken.is_expired());
    }

    #[tokio::test]
    async fn test_expired_session_lazily_deleted_on_read() {
        let store = MemoryAuthStore::new();
        store.put_session(session("sess-1", -10)).await.unwrap();

        assert!(store.get_session("sess-1").await.unwrap().is_none());
        // Physically removed, not just hidden
        assert!(store.sessions.get("sess-1").is_none());
    }

    #[tokio::test]
    async fn test_delete_session_is_idempotent() {
        let store = MemoryAuthStore::new();
        store.put_session(session("sess-1", 300)).await.unwrap();

        store.delete_session("sess-1").await.unwrap();
        store.delete_session("sess-1").await.unwrap();
        assert!(store.get_session("sess-1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cleanup_counts_removed_rows() {
        let store = MemoryAuthStore::new();
        store.put_state(state("fresh", 300)).await.unwrap();
        store.put_state(state("stale", -10)).await.unwrap();
        store.put_session(session("live", 300)).await.unwrap();
        store.put_session(session("dead-1", -10)).await.unwrap();
        store.put_session(session("dead-2", -10)).await.unwrap();

        let stats = store.cleanup_expired().await.unwrap();
        assert_eq!(stats.states_removed, 1);
        assert_eq!(stats.sessions_removed, 2);
        assert_eq!(stats.total(), 3);

        assert!(store.take_state("fresh").await.unwrap().is_some());
        assert!(store.get_session("live").await.unwrap().is_some());
    }
}
