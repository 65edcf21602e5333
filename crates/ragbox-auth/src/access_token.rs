//! Access-token registry for non-interactive clients.
//!
//! Machine clients (ingesters, CI) authenticate with long-lived bearer
//! tokens instead of the browser login flow. A token is 32 random bytes,
//! base64url-encoded behind a fixed `rgb_` marker. Only the SHA-256
//! digest and a 12-character display prefix are stored; the plaintext is
//! returned exactly once at creation and is unrecoverable afterwards.
//!
//! Validation failures — malformed, expired, revoked, never-issued — are
//! all reported as "no token" so callers cannot probe which tokens exist.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::AuthResult;
use crate::error::AuthError;
use crate::store::AccessTokenStore;

/// Marker prepended to every issued token.
pub const TOKEN_MARKER: &str = "rgb_";

/// Length of the stored display prefix.
pub const DISPLAY_PREFIX_LEN: usize = 12;

/// The fixed scope vocabulary.
///
/// Creation rejects any request naming a scope outside this set.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum Scope {
    /// Read documents and chunks.
    #[serde(rename = "documents:read")]
    DocumentsRead,
    /// Create, update, and delete documents.
    #[serde(rename = "documents:write")]
    DocumentsWrite,
    /// Read sync state.
    #[serde(rename = "sync:read")]
    SyncRead,
    /// Mark syncs complete and prune orphans.
    #[serde(rename = "sync:write")]
    SyncWrite,
    /// Run searches and answer-generating queries.
    #[serde(rename = "query")]
    Query,
    /// Administrative operations, including token management.
    #[serde(rename = "admin")]
    Admin,
}

impl Scope {
    /// Every scope in the vocabulary.
    pub const ALL: [Scope; 6] = [
        Scope::DocumentsRead,
        Scope::DocumentsWrite,
        Scope::SyncRead,
        Scope::SyncWrite,
        Scope::Query,
        Scope::Admin,
    ];

    /// The wire representation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DocumentsRead => "documents:read",
            Self::DocumentsWrite => "documents:write",
            Self::SyncRead => "sync:read",
            Self::SyncWrite => "sync:write",
            Self::Query => "query",
            Self::Admin => "admin",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Scope {
    type Err = AuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "documents:read" => Ok(Self::DocumentsRead),
            "documents:write" => Ok(Self::DocumentsWrite),
            "sync:read" => Ok(Self::SyncRead),
            "sync:write" => Ok(Self::SyncWrite),
            "query" => Ok(Self::Query),
            "admin" => Ok(Self::Admin),
            other => Err(AuthError::invalid_scope(format!(
                "unknown scope '{other}'"
            ))),
        }
    }
}

/// Stored metadata for one access token.
///
/// Never contains the plaintext secret, only its digest and display
/// prefix.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccessTokenRecord {
    /// Opaque token id.
    pub id: String,

    /// Human-readable name ("ci-ingester").
    pub name: String,

    /// First characters of the issued token, for UI identification.
    pub prefix: String,

    /// Hex SHA-256 digest of the full token.
    #[serde(default, skip_serializing)]
    pub digest: String,

    /// Granted scopes.
    pub scopes: BTreeSet<Scope>,

    /// Collections this token is restricted to; `None` means
    /// unrestricted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub collections: Option<Vec<String>>,

    /// Admin identity that created the token.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<String>,

    /// Optional expiry; `None` means the token never expires.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub expires_at: Option<OffsetDateTime>,

    /// When the token was last presented.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "time::serde::rfc3339::option"
    )]
    pub last_used_at: Option<OffsetDateTime>,

    /// When the token was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl AccessTokenRecord {
    /// Returns `true` if the token has an expiry in the past.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_at
            .is_some_and(|at| OffsetDateTime::now_utc() > at)
    }
}

/// Parameters for creating a token.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccessToken {
    /// Human-readable name.
    pub name: String,

    /// Requested scopes, in wire form.
    pub scopes: Vec<String>,

    /// Optional collection restriction.
    #[serde(default)]
    pub collections: Option<Vec<String>>,

    /// Creating admin identity.
    #[serde(default)]
    pub created_by: Option<String>,

    /// Optional expiry.
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub expires_at: Option<OffsetDateTime>,
}

/// A freshly created token: metadata plus the plaintext secret.
///
/// The only moment the plaintext exists outside the caller's hands.
#[derive(Debug)]
pub struct CreatedAccessToken {
    /// The stored metadata record.
    pub record: AccessTokenRecord,

    /// The full token. Losing it after this is permanent.
    pub token: String,
}

/// What a validated token is allowed to do; handed to the caller for
/// enforcement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessTokenGrant {
    /// Id of the matched token record.
    pub token_id: String,

    /// Granted scopes.
    pub scopes: BTreeSet<Scope>,

    /// Collection restriction, if any.
    pub collections: Option<Vec<String>>,
}

/// Create/validate/revoke operations over the token store.
pub struct AccessTokenService {
    store: Arc<dyn AccessTokenStore>,
}

impl AccessTokenService {
    /// Creates a service over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn AccessTokenStore>) -> Self {
        Self { store }
    }

    /// Mints a new token.
    ///
    /// Scope validation happens before any randomness is generated, so a
    /// rejected request stores nothing.
    ///
    /// # Errors
    ///
    /// - `InvalidScope` if a requested scope is outside the vocabulary
    /// - `Storage` if persisting the record fails
    pub async fn create(&self, request: NewAccessToken) -> AuthResult<CreatedAccessToken> {
        let mut scopes = BTreeSet::new();
        for raw in &request.scopes {
            scopes.insert(Scope::from_str(raw)?);
        }

        let token = generate_token();
        let record = AccessTokenRecord {
            id: Uuid::new_v4().to_string(),
            name: request.name,
            prefix: token[..DISPLAY_PREFIX_LEN].to_string(),
            digest: digest_token(&token),
            scopes,
            collections: request.collections,
            created_by: request.created_by,
            expires_at: request.expires_at,
            last_used_at: None,
            created_at: OffsetDateTime::now_utc(),
        };

        self.store.insert(record.clone()).await?;
        tracing::info!(token_id = %record.id, name = %record.name, "created access token");

        Ok(CreatedAccessToken { record, token })
    }

    /// Validates a presented token.
    ///
    /// Returns `None` for anything that should not authenticate —
    /// missing marker, unknown digest, expired, revoked — without
    /// distinguishing which, so callers leak nothing about what exists.
    /// On success the last-used time is updated best-effort.
    ///
    /// # Errors
    ///
    /// Returns `Storage` only for lookup failures, never for rejected
    /// tokens.
    pub async fn validate(&self, token: &str) -> AuthResult<Option<AccessTokenGrant>> {
        if !token.starts_with(TOKEN_MARKER) {
            return Ok(None);
        }

        let Some(record) = self.store.find_by_digest(&digest_token(token)).await? else {
            return Ok(None);
        };

        if record.is_expired() {
            tracing::debug!(token_id = %record.id, "rejected expired access token");
            return Ok(None);
        }

        if let Err(e) = self
            .store
            .touch_last_used(&record.id, OffsetDateTime::now_utc())
            .await
        {
            tracing::warn!(token_id = %record.id, error = %e, "failed to update token last-used time");
        }

        Ok(Some(AccessTokenGrant {
            token_id: record.id,
            scopes: record.scopes,
            collections: record.collections,
        }))
    }

    /// Looks up token metadata by id.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the read fails.
    pub async fn get(&self, id: &str) -> AuthResult<Option<AccessTokenRecord>> {
        self.store.get(id).await
    }

    /// Lists all token metadata.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the read fails.
    pub async fn list(&self) -> AuthResult<Vec<AccessTokenRecord>> {
        self.store.list().await
    }

    /// Revokes a token immediately and unconditionally. Subsequent
    /// `validate` calls simply find nothing.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the delete fails.
    pub async fn delete(&self, id: &str) -> AuthResult<bool> {
        let deleted = self.store.delete(id).await?;
        if deleted {
            tracing::info!(token_id = %id, "revoked access token");
        }
        Ok(deleted)
    }
}

/// Generates a token: marker + base64url of 32 random bytes.
fn generate_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill(&mut bytes[..]);
    format!("{TOKEN_MARKER}{}", URL_SAFE_NO_PAD.encode(bytes))
}

/// Hex SHA-256 digest of the full token string.
fn digest_token(token: &str) -> String {
    hex::encode(Sha256::digest(token.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryAccessTokenStore;

    fn service() -> AccessTokenService {
        AccessTokenService::new(Arc::new(MemoryAccessTokenStore::new()))
    }

    fn request(scopes: &[&str]) -> NewAccessToken {
        NewAccessToken {
            name: "ci-ingester".to_string(),
            scopes: scopes.iter().map(|s| (*s).to_string()).collect(),
            collections: None,
            created_by: Some("admin@example.com".to_string()),
            expires_at: None,
        }
    }

    #[test]
    fn test_scope_parse_roundtrip() {
        for scope in Scope::ALL {
            assert_eq!(Scope::from_str(scope.as_str()).unwrap(), scope);
        }
    }

    #[test]
    fn test_scope_parse_rejects_unknown() {
        let err = Scope::from_str("made-up-scope").unwrap_err();
        assert!(matches!(err, AuthError::InvalidScope { .. }));
    }

    #[test]
    fn test_scope_serde_uses_wire_names() {
        let json = serde_json::to_string(&Scope::DocumentsWrite).unwrap();
        assert_eq!(json, "\"documents:write\"");
        let parsed: Scope = serde_json::from_str("\"sync:read\"").unwrap();
        assert_eq!(parsed, Scope::SyncRead);
    }

    #[test]
    fn test_token_format() {
        let token = generate_token();
        assert!(token.starts_with(TOKEN_MARKER));
        assert_eq!(token.len(), TOKEN_MARKER.len() + 43);
        assert_ne!(generate_token(), generate_token());
    }

    #[tokio::test]
    async fn test_create_returns_plaintext_once() {
        let service = service();
        let created = service
            .create(request(&["documents:read", "query"]))
            .await
            .unwrap();

        assert!(created.token.starts_with(TOKEN_MARKER));
        assert_eq!(created.record.prefix, created.token[..DISPLAY_PREFIX_LEN]);
        // The record carries only the digest, never the plaintext
        assert_ne!(created.record.digest, created.token);
        assert_eq!(created.record.digest, digest_token(&created.token));
        assert!(!created.record.digest.contains(&created.token));

        // And the serialized record exposes neither digest nor token
        let json = serde_json::to_string(&created.record).unwrap();
        assert!(!json.contains(&created.token));
        assert!(!json.contains(&created.record.digest));
    }

    #[tokio::test]
    async fn test_create_rejects_unknown_scope_and_stores_nothing() {
        let service = service();
        let err = service
            .create(request(&["documents:write", "made-up-scope"]))
            .await
            .unwrap_err();

        assert!(matches!(err, AuthError::InvalidScope { .. }));
        assert!(service.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_validate_roundtrip_and_last_used() {
        let service = service();
        let created = service
            .create(request(&["documents:read", "query"]))
            .await
            .unwrap();

        let grant = service.validate(&created.token).await.unwrap().unwrap();
        assert_eq!(grant.token_id, created.record.id);
        assert!(grant.scopes.contains(&Scope::DocumentsRead));
        assert!(grant.scopes.contains(&Scope::Query));
        assert!(grant.collections.is_none());

        let record = service.get(&created.record.id).await.unwrap().unwrap();
        assert!(record.last_used_at.is_some());
    }

    #[tokio::test]
    async fn test_validate_rejects_wrong_marker() {
        let service = service();
        service.create(request(&["query"])).await.unwrap();

        assert!(service.validate("sk_not_ours").await.unwrap().is_none());
        assert!(service.validate("").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_validate_rejects_unknown_token() {
        let service = service();
        assert!(service.validate(&generate_token()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_validate_rejects_expired_token() {
        let service = service();
        let mut req = request(&["query"]);
        req.expires_at = Some(OffsetDateTime::now_utc() - time::Duration::seconds(1));
        let created = service.create(req).await.unwrap();

        assert!(service.validate(&created.token).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_revoked_token_stops_validating() {
        let service = service();
        let created = service.create(request(&["query"])).await.unwrap();

        assert!(service.delete(&created.record.id).await.unwrap());
        assert!(service.validate(&created.token).await.unwrap().is_none());
        // Revoking again reports nothing to delete
        assert!(!service.delete(&created.record.id).await.unwrap());
    }

    #[tokio::test]
    async fn test_collection_restriction_flows_to_grant() {
        let service = service();
        let mut req = request(&["documents:read"]);
        req.collections = Some(vec!["handbook".to_string()]);
        let created = service.create(req).await.unwrap();

        let grant = service.validate(&created.token).await.unwrap().unwrap();
        assert_eq!(grant.collections, Some(vec!["handbook".to_string()]));
    }
}
