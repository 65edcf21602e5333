//! Table creation.
//!
//! Three tables: one-time authorization state (keyed by the state value),
//! sessions (keyed by session id), and access tokens (digest-unique).
//! Expiry columns are indexed so the periodic sweep deletes by range
//! instead of scanning.

use sqlx_core::query::query;

use crate::{PgPool, StorageResult};

const CREATE_OAUTH_STATE: &str = r#"
CREATE TABLE IF NOT EXISTS oauth_state (
    state         TEXT PRIMARY KEY,
    code_verifier TEXT NOT NULL,
    redirect_after TEXT,
    created_at    TIMESTAMPTZ NOT NULL,
    expires_at    TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_OAUTH_STATE_EXPIRY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS oauth_state_expires_at_idx ON oauth_state (expires_at)";

const CREATE_OAUTH_SESSION: &str = r#"
CREATE TABLE IF NOT EXISTS oauth_session (
    id         TEXT PRIMARY KEY,
    user_id    TEXT NOT NULL,
    email      TEXT,
    name       TEXT,
    group_names TEXT[] NOT NULL DEFAULT '{}',
    provider   TEXT NOT NULL,
    created_at TIMESTAMPTZ NOT NULL,
    expires_at TIMESTAMPTZ NOT NULL
)
"#;

const CREATE_OAUTH_SESSION_EXPIRY_INDEX: &str =
    "CREATE INDEX IF NOT EXISTS oauth_session_expires_at_idx ON oauth_session (expires_at)";

const CREATE_ACCESS_TOKEN: &str = r#"
CREATE TABLE IF NOT EXISTS access_token (
    id           TEXT PRIMARY KEY,
    name         TEXT NOT NULL,
    prefix       TEXT NOT NULL,
    digest       TEXT NOT NULL UNIQUE,
    scopes       TEXT[] NOT NULL,
    collections  TEXT[],
    created_by   TEXT,
    expires_at   TIMESTAMPTZ,
    last_used_at TIMESTAMPTZ,
    created_at   TIMESTAMPTZ NOT NULL
)
"#;

/// Creates the auth tables and indexes if they do not exist.
///
/// # Errors
///
/// Returns an error if any DDL statement fails.
pub async fn ensure_schema(pool: &PgPool) -> StorageResult<()> {
    for statement in [
        CREATE_OAUTH_STATE,
        CREATE_OAUTH_STATE_EXPIRY_INDEX,
        CREATE_OAUTH_SESSION,
        CREATE_OAUTH_SESSION_EXPIRY_INDEX,
        CREATE_ACCESS_TOKEN,
    ] {
        query(statement).execute(pool).await?;
    }

    tracing::debug!("ensured auth schema");
    Ok(())
}
