//! One-time authorization state rows.
//!
//! The consume path is the replay-prevention mechanism for the whole
//! PKCE handshake, so it is a single `DELETE ... RETURNING`: the read
//! and the delete commit together, and under concurrent callbacks —
//! including callbacks hitting different application instances — the row
//! comes back to at most one of them.

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use ragbox_auth::session::AuthorizationState;

use crate::{PgPool, StorageResult};

type StateRow = (
    String,
    String,
    Option<String>,
    OffsetDateTime,
    OffsetDateTime,
);

fn from_row(row: StateRow) -> AuthorizationState {
    AuthorizationState {
        state: row.0,
        code_verifier: row.1,
        redirect_after: row.2,
        created_at: row.3,
        expires_at: row.4,
    }
}

/// Inserts one login attempt's state.
pub(crate) async fn insert(pool: &PgPool, state: &AuthorizationState) -> StorageResult<()> {
    query(
        r#"
        INSERT INTO oauth_state (state, code_verifier, redirect_after, created_at, expires_at)
        VALUES ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(&state.state)
    .bind(&state.code_verifier)
    .bind(&state.redirect_after)
    .bind(state.created_at)
    .bind(state.expires_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Atomically consumes the state row, returning it if it existed.
///
/// Expired rows are returned too; the orchestrator decides between
/// `StateExpired` and proceeding, and either way the row is gone.
pub(crate) async fn take(pool: &PgPool, state: &str) -> StorageResult<Option<AuthorizationState>> {
    let row: Option<StateRow> = query_as(
        r#"
        DELETE FROM oauth_state
        WHERE state = $1
        RETURNING state, code_verifier, redirect_after, created_at, expires_at
        "#,
    )
    .bind(state)
    .fetch_optional(pool)
    .await?;

    Ok(row.map(from_row))
}

/// Deletes expired state rows, returning the count removed.
pub(crate) async fn delete_expired(pool: &PgPool) -> StorageResult<u64> {
    let result = query("DELETE FROM oauth_state WHERE expires_at < NOW()")
        .execute(pool)
        .await?;

    Ok(result.rows_affected())
}
