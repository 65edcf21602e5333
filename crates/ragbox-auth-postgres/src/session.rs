//! Session rows.
//!
//! Reads are lazy about expiry: a row past `expires_at` is deleted on
//! the spot and reported as absent, so validity never depends on the
//! periodic sweep having run.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use ragbox_auth::session::OAuthSessionData;

use crate::{PgPool, StorageResult};

type SessionRow = (
    String,
    String,
    Option<String>,
    Option<String>,
    Vec<String>,
    String,
    OffsetDateTime,
    OffsetDateTime,
);

fn from_row(row: SessionRow) -> OAuthSessionData {
    OAuthSessionData {
        id: row.0,
        user_id: row.1,
        email: row.2,
        name: row.3,
        groups: row.4,
        provider: row.5,
        created_at: row.6,
        expires_at: row.7,
    }
}

/// Inserts a new session.
pub(crate) async fn insert(pool: &PgPool, session: &OAuthSessionData) -> StorageResult<()> {
    query(
        r#"
        INSERT INTO oauth_session
            (id, user_id, email, name, group_names, provider, created_at, expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(&session.id)
    .bind(&session.user_id)
    .bind(&session.email)
    .bind(&session.name)
    .bind(&session.groups)
    .bind(&session.provider)
    .bind(session.created_at)
    .bind(session.expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Fetches a live session, deleting it if it has expired.
pub(crate) async fn get_live(
    pool: &PgPool,
    session_id: &str,
) -> StorageResult<Option<OAuthSessionData>> {
    let row: Option<SessionRow> = query_as(
        r#"
        SELECT id, user_id, email, name, group_names, provider, created_at, expires_at
        FROM oauth_session
        WHERE id = $1
        "#,
    )
    .bind(session_id)
    .fetch_optional(pool)
    .await?;

    let Some(session) = row.map(from_row) else {
        return Ok(None);
    };

    if session.is_expired() {
        delete(pool, session_id).await?;
        tracing::debug!(session_id, "lazily removed expired session");
        return Ok(None);
    }

    Ok(Some(session))
}

/// Deletes a session. Idempotent.
pub(crate) async fn delete(pool: &PgPool, session_id: &str) -> StorageResult<()> {
    query("DELETE FROM oauth_session WHERE id = $1")
        .bind(session_id)
        .execute(pool)
        .await?;

    Ok(())
}

/// Deletes expired sessions, returning the count removed.
pub(crate) async fn delete_expired(pool: &PgPool) -> StorageResult<u64> {
    let result = query("DELETE FROM oauth_session WHERE expires_at < NOW()")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
