//! PostgreSQL storage backend for ragbox-auth.
//!
//! Persists the two short-lived login entities (one-time authorization
//! state, sessions) and the access-token registry, for multi-instance
//! deployments where every application instance must observe the same
//! state.
//!
//! The single-use guarantee for authorization state rides on
//! `DELETE ... RETURNING`: one statement, atomic under read-committed
//! isolation, so two callbacks racing on different instances can never
//! both consume one `state` row.
//!
//! # Example
//!
//! ```ignore
//! use ragbox_auth_postgres::{PostgresAuthStore, ensure_schema};
//!
//! let store = PostgresAuthStore::connect("postgres://localhost/ragbox").await?;
//! ensure_schema(store.pool()).await?;
//! ```

pub mod access_token;
pub mod schema;
pub mod session;
pub mod state;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx_core::pool::Pool;
use sqlx_postgres::Postgres;
use time::OffsetDateTime;

use ragbox_auth::access_token::AccessTokenRecord;
use ragbox_auth::session::{AuthorizationState, OAuthSessionData};
use ragbox_auth::store::{AccessTokenStore, AuthStore, CleanupStats};
use ragbox_auth::{AuthError, AuthResult};

pub use schema::ensure_schema;

/// PostgreSQL connection pool type alias.
pub type PgPool = Pool<Postgres>;

// =============================================================================
// Error Types
// =============================================================================

/// Errors from the storage layer, converted to `AuthError::Storage` at
/// the trait boundary.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(#[from] sqlx_core::Error),

    /// A stored row could not be decoded into its entity.
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl StorageError {
    /// Create a `CorruptRow` error.
    #[must_use]
    pub fn corrupt_row(message: impl Into<String>) -> Self {
        Self::CorruptRow(message.into())
    }

    /// Returns `true` if this is a database error.
    #[must_use]
    pub fn is_database_error(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}

impl From<StorageError> for AuthError {
    fn from(err: StorageError) -> Self {
        AuthError::storage(err.to_string())
    }
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

// =============================================================================
// State/Session Store
// =============================================================================

/// PostgreSQL implementation of [`AuthStore`].
#[derive(Debug, Clone)]
pub struct PostgresAuthStore {
    pool: Arc<PgPool>,
}

impl PostgresAuthStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    /// Create a store by connecting to the database.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails.
    pub async fn connect(database_url: &str) -> StorageResult<Self> {
        use sqlx_core::pool::PoolOptions;
        let pool = PoolOptions::<Postgres>::new().connect(database_url).await?;
        Ok(Self::new(Arc::new(pool)))
    }

    /// Get a reference to the connection pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Get the Arc-wrapped pool, for sharing with other stores.
    #[must_use]
    pub fn pool_arc(&self) -> Arc<PgPool> {
        Arc::clone(&self.pool)
    }
}

#[async_trait]
impl AuthStore for PostgresAuthStore {
    async fn put_state(&self, auth_state: AuthorizationState) -> AuthResult<()> {
        state::insert(&self.pool, &auth_state).await.map_err(Into::into)
    }

    async fn take_state(&self, state_value: &str) -> AuthResult<Option<AuthorizationState>> {
        state::take(&self.pool, state_value).await.map_err(Into::into)
    }

    async fn put_session(&self, session: OAuthSessionData) -> AuthResult<()> {
        session::insert(&self.pool, &session).await.map_err(Into::into)
    }

    async fn get_session(&self, session_id: &str) -> AuthResult<Option<OAuthSessionData>> {
        session::get_live(&self.pool, session_id)
            .await
            .map_err(Into::into)
    }

    async fn delete_session(&self, session_id: &str) -> AuthResult<()> {
        session::delete(&self.pool, session_id)
            .await
            .map_err(Into::into)
    }

    async fn cleanup_expired(&self) -> AuthResult<CleanupStats> {
        let states_removed = state::delete_expired(&self.pool).await?;
        let sessions_removed = session::delete_expired(&self.pool).await?;
        Ok(CleanupStats {
            states_removed,
            sessions_removed,
        })
    }
}

// =============================================================================
// Access Token Store
// =============================================================================

/// PostgreSQL implementation of [`AccessTokenStore`].
#[derive(Debug, Clone)]
pub struct PostgresAccessTokenStore {
    pool: Arc<PgPool>,
}

impl PostgresAccessTokenStore {
    /// Create a store over an existing connection pool.
    #[must_use]
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AccessTokenStore for PostgresAccessTokenStore {
    async fn insert(&self, record: AccessTokenRecord) -> AuthResult<()> {
        access_token::insert(&self.pool, &record)
            .await
            .map_err(Into::into)
    }

    async fn find_by_digest(&self, digest: &str) -> AuthResult<Option<AccessTokenRecord>> {
        access_token::find_by_digest(&self.pool, digest)
            .await
            .map_err(Into::into)
    }

    async fn get(&self, id: &str) -> AuthResult<Option<AccessTokenRecord>> {
        access_token::get(&self.pool, id).await.map_err(Into::into)
    }

    async fn list(&self) -> AuthResult<Vec<AccessTokenRecord>> {
        access_token::list(&self.pool).await.map_err(Into::into)
    }

    async fn touch_last_used(&self, id: &str, when: OffsetDateTime) -> AuthResult<()> {
        access_token::touch_last_used(&self.pool, id, when)
            .await
            .map_err(Into::into)
    }

    async fn delete(&self, id: &str) -> AuthResult<bool> {
        access_token::delete(&self.pool, id)
            .await
            .map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_converts_to_auth_storage() {
        let err = StorageError::corrupt_row("bad scopes column");
        let auth: AuthError = err.into();
        assert!(matches!(auth, AuthError::Storage { .. }));
        assert!(auth.to_string().contains("bad scopes column"));
    }

    #[test]
    fn test_storage_error_predicates() {
        assert!(!StorageError::corrupt_row("x").is_database_error());
    }
}
