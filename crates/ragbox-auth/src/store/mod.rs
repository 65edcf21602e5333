//! Storage traits for authentication data.
//!
//! Two interchangeable backends exist: the in-process implementation in
//! [`memory`] for single-instance deployments, and the PostgreSQL
//! implementation in the `ragbox-auth-postgres` crate for multi-instance
//! consistency.
//!
//! The correctness-critical operation is [`AuthStore::take_state`]: the
//! atomic get-and-remove that makes a login attempt's authorization state
//! single-use and blocks authorization-code replay.

pub mod memory;

pub use memory::{MemoryAccessTokenStore, MemoryAuthStore};

use async_trait::async_trait;
use time::OffsetDateTime;

use crate::AuthResult;
use crate::access_token::AccessTokenRecord;
use crate::session::{AuthorizationState, OAuthSessionData};

/// Row counts removed by an expiry sweep, for observability.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CleanupStats {
    /// Authorization-state records removed.
    pub states_removed: u64,
    /// Session records removed.
    pub sessions_removed: u64,
}

impl CleanupStats {
    /// Total records removed.
    #[must_use]
    pub fn total(&self) -> u64 {
        self.states_removed + self.sessions_removed
    }
}

/// Persistence for authorization state and sessions.
#[async_trait]
pub trait AuthStore: Send + Sync {
    /// Stores one login attempt's authorization state.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the write fails.
    async fn put_state(&self, state: AuthorizationState) -> AuthResult<()>;

    /// Atomically removes and returns the authorization state for a
    /// `state` value.
    ///
    /// When two callbacks race on the same `state` — even on different
    /// application instances — at most one observes `Some`. Expired
    /// records are still returned (and removed); the caller decides
    /// between `StateExpired` and proceeding.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the operation fails.
    async fn take_state(&self, state: &str) -> AuthResult<Option<AuthorizationState>>;

    /// Stores an authenticated session.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the write fails.
    async fn put_session(&self, session: OAuthSessionData) -> AuthResult<()>;

    /// Looks up a session by id.
    ///
    /// A session past its expiry is deleted as a side effect of the read
    /// and reported as absent (lazy expiry); the periodic sweep only
    /// reclaims storage, never decides validity.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the read fails.
    async fn get_session(&self, session_id: &str) -> AuthResult<Option<OAuthSessionData>>;

    /// Deletes a session. Idempotent: deleting an absent session is not
    /// an error.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the delete fails.
    async fn delete_session(&self, session_id: &str) -> AuthResult<()>;

    /// Removes all expired authorization state and sessions, returning
    /// the counts removed.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the sweep fails.
    async fn cleanup_expired(&self) -> AuthResult<CleanupStats>;
}

/// Persistence for machine-client access tokens.
///
/// Only digests and display prefixes are ever stored; the registry never
/// hands a raw secret to this layer after creation returns.
#[async_trait]
pub trait AccessTokenStore: Send + Sync {
    /// Stores a new token record.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the write fails.
    async fn insert(&self, record: AccessTokenRecord) -> AuthResult<()>;

    /// Looks up a record by the SHA-256 digest of the presented token.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the read fails.
    async fn find_by_digest(&self, digest: &str) -> AuthResult<Option<AccessTokenRecord>>;

    /// Looks up a record by id.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the read fails.
    async fn get(&self, id: &str) -> AuthResult<Option<AccessTokenRecord>>;

    /// Lists all token records.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the read fails.
    async fn list(&self) -> AuthResult<Vec<AccessTokenRecord>>;

    /// Records when a token was last presented. Best-effort; callers
    /// tolerate failure.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the update fails.
    async fn touch_last_used(&self, id: &str, when: OffsetDateTime) -> AuthResult<()>;

    /// Deletes (revokes) a token. Returns `false` if no record existed.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the delete fails.
    async fn delete(&self, id: &str) -> AuthResult<bool>;
}
