//! Access-token rows.
//!
//! Only the digest and display prefix ever reach this table; the scopes
//! column stores the wire names and rejects rows that no longer parse
//! against the vocabulary rather than silently dropping grants.

use std::collections::BTreeSet;
use std::str::FromStr;

use sqlx_core::query::query;
use sqlx_core::query_as::query_as;
use time::OffsetDateTime;

use ragbox_auth::access_token::{AccessTokenRecord, Scope};

use crate::{PgPool, StorageError, StorageResult};

type TokenRow = (
    String,
    String,
    String,
    String,
    Vec<String>,
    Option<Vec<String>>,
    Option<String>,
    Option<OffsetDateTime>,
    Option<OffsetDateTime>,
    OffsetDateTime,
);

fn from_row(row: TokenRow) -> StorageResult<AccessTokenRecord> {
    let mut scopes = BTreeSet::new();
    for raw in &row.4 {
        let scope = Scope::from_str(raw).map_err(|_| {
            StorageError::corrupt_row(format!("access token '{}' has unknown scope '{raw}'", row.0))
        })?;
        scopes.insert(scope);
    }

    Ok(AccessTokenRecord {
        id: row.0,
        name: row.1,
        prefix: row.2,
        digest: row.3,
        scopes,
        collections: row.5,
        created_by: row.6,
        expires_at: row.7,
        last_used_at: row.8,
        created_at: row.9,
    })
}

fn scope_names(record: &AccessTokenRecord) -> Vec<String> {
    record.scopes.iter().map(|s| s.as_str().to_string()).collect()
}

/// Inserts a new token record.
pub(crate) async fn insert(pool: &PgPool, record: &AccessTokenRecord) -> StorageResult<()> {
    query(
        r#"
        INSERT INTO access_token
            (id, name, prefix, digest, scopes, collections, created_by,
             expires_at, last_used_at, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(&record.id)
    .bind(&record.name)
    .bind(&record.prefix)
    .bind(&record.digest)
    .bind(scope_names(record))
    .bind(&record.collections)
    .bind(&record.created_by)
    .bind(record.expires_at)
    .bind(record.last_used_at)
    .bind(record.created_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Looks up a record by token digest.
pub(crate) async fn find_by_digest(
    pool: &PgPool,
    digest: &str,
) -> StorageResult<Option<AccessTokenRecord>> {
    let row: Option<TokenRow> = query_as(
        r#"
        SELECT id, name, prefix, digest, scopes, collections, created_by,
               expires_at, last_used_at, created_at
        FROM access_token
        WHERE digest = $1
        "#,
    )
    .bind(digest)
    .fetch_optional(pool)
    .await?;

    row.map(from_row).transpose()
}

/// Looks up a record by id.
pub(crate) async fn get(pool: &PgPool, id: &str) -> StorageResult<Option<AccessTokenRecord>> {
    let row: Option<TokenRow> = query_as(
        r#"
        SELECT id, name, prefix, digest, scopes, collections, created_by,
               expires_at, last_used_at, created_at
        FROM access_token
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(from_row).transpose()
}

/// Lists all records, oldest first.
pub(crate) async fn list(pool: &PgPool) -> StorageResult<Vec<AccessTokenRecord>> {
    let rows: Vec<TokenRow> = query_as(
        r#"
        SELECT id, name, prefix, digest, scopes, collections, created_by,
               expires_at, last_used_at, created_at
        FROM access_token
        ORDER BY created_at
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(from_row).collect()
}

/// Updates the last-used timestamp.
pub(crate) async fn touch_last_used(
    pool: &PgPool,
    id: &str,
    when: OffsetDateTime,
) -> StorageResult<()> {
    query("UPDATE access_token SET last_used_at = $2 WHERE id = $1")
        .bind(id)
        .bind(when)
        .execute(pool)
        .await?;

    Ok(())
}

/// Deletes (revokes) a record, reporting whether one existed.
pub(crate) async fn delete(pool: &PgPool, id: &str) -> StorageResult<bool> {
    let result = query("DELETE FROM access_token WHERE id = $1")
        .bind(id)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}
