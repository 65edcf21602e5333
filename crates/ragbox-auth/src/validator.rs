//! ID-token validation.
//!
//! Verifies a provider ID token's signature against the cached key set,
//! then checks issuer, audience, and expiry. Every failure mode is a
//! distinct [`AuthError`] kind so callers can branch — expired vs.
//! malformed vs. wrong audience — when choosing user-facing messaging.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Validation, decode, decode_header};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::AuthResult;
use crate::error::AuthError;
use crate::jwks::JwksCache;
use crate::provider::ProviderConfig;

/// Standard OIDC ID-token claims, with everything unrecognized collected
/// into `extra`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    /// Issuer identifier.
    pub iss: String,

    /// Subject identifier.
    pub sub: String,

    /// Audience; a single string or an array on the wire.
    #[serde(deserialize_with = "deserialize_audience")]
    pub aud: Vec<String>,

    /// Expiration time (Unix timestamp).
    pub exp: i64,

    /// Issued-at time (Unix timestamp).
    pub iat: i64,

    /// Email address, when the provider includes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Display name, when the provider includes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// All other claims.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

/// Custom deserializer for audience, which may be a string or an array.
fn deserialize_audience<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => Ok(vec![s]),
        OneOrMany::Many(v) => Ok(v),
    }
}

/// The result of verifying an ID token.
///
/// Transient: produced per callback and handed straight to the claim
/// mapper, never persisted.
#[derive(Debug, Clone)]
pub struct ValidatedIdToken {
    /// OIDC subject.
    pub subject: String,

    /// Email address, when asserted.
    pub email: Option<String>,

    /// Display name, when asserted.
    pub name: Option<String>,

    /// Group names extracted from the provider's groups claim.
    pub groups: Vec<String>,

    /// When the token was issued.
    pub issued_at: OffsetDateTime,

    /// When the token expires.
    pub expires_at: OffsetDateTime,

    /// The full validated claim set.
    pub claims: serde_json::Map<String, serde_json::Value>,
}

/// Validates ID tokens for one configured provider.
pub struct IdTokenValidator {
    issuer: String,
    client_id: String,
    groups_claim: String,
    leeway: Duration,
    jwks: Arc<JwksCache>,
}

impl IdTokenValidator {
    /// Clock-skew tolerance applied to `exp`/`iat` checks.
    pub const DEFAULT_LEEWAY: Duration = Duration::from_secs(60);

    /// Creates a validator for the given provider, verifying against the
    /// given key cache.
    #[must_use]
    pub fn new(provider: &ProviderConfig, jwks: Arc<JwksCache>) -> Self {
        Self {
            issuer: provider.issuer.clone(),
            client_id: provider.client_id.clone(),
            groups_claim: provider.groups_claim.clone(),
            leeway: Self::DEFAULT_LEEWAY,
            jwks,
        }
    }

    /// Verifies signature, issuer, audience, and expiry of a raw ID token.
    ///
    /// # Errors
    ///
    /// - `InvalidToken` — malformed token, missing/unknown `kid`, or bad
    ///   signature
    /// - `TokenExpired` — `exp` has passed
    /// - `InvalidIssuer` / `InvalidAudience` — claim mismatches
    /// - `Jwks` — the key set could not be obtained
    pub async fn validate(&self, raw: &str) -> AuthResult<ValidatedIdToken> {
        let header = decode_header(raw)
            .map_err(|e| AuthError::invalid_token(format!("malformed token header: {e}")))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::invalid_token("token header is missing key id (kid)"))?;

        let (decoding_key, key_alg) = self.jwks.get_key(&kid).await?;

        // Prefer the key's declared algorithm over the (attacker-chosen)
        // token header.
        let algorithm = key_alg.unwrap_or(header.alg);

        let mut validation = Validation::new(algorithm);
        validation.set_audience(&[&self.client_id]);
        validation.leeway = self.leeway.as_secs();
        // Issuer is compared manually below so the mismatch error can
        // carry both values.

        let token_data = decode::<IdTokenClaims>(raw, &decoding_key, &validation)
            .map_err(|e| map_jwt_error(&e))?;
        let claims = token_data.claims;

        if claims.iss != self.issuer {
            return Err(AuthError::invalid_issuer(&self.issuer, &claims.iss));
        }

        tracing::debug!(subject = %claims.sub, issuer = %claims.iss, "validated ID token");
        self.build_validated(claims)
    }

    /// Forces a key-set refresh, for operator-triggered rotation recovery.
    ///
    /// # Errors
    ///
    /// Returns `Jwks` if the fetch fails.
    pub async fn refresh_jwks(&self) -> AuthResult<()> {
        self.jwks.force_refresh().await
    }

    /// Builds the [`ValidatedIdToken`] view from verified claims.
    fn build_validated(&self, claims: IdTokenClaims) -> AuthResult<ValidatedIdToken> {
        let issued_at = OffsetDateTime::from_unix_timestamp(claims.iat)
            .map_err(|_| AuthError::invalid_token(format!("invalid iat claim: {}", claims.iat)))?;
        let expires_at = OffsetDateTime::from_unix_timestamp(claims.exp)
            .map_err(|_| AuthError::invalid_token(format!("invalid exp claim: {}", claims.exp)))?;

        let groups = extract_groups(&claims.extra, &self.groups_claim);

        let claim_map = match serde_json::to_value(&claims) {
            Ok(serde_json::Value::Object(map)) => map,
            _ => serde_json::Map::new(),
        };

        Ok(ValidatedIdToken {
            subject: claims.sub,
            email: claims.email,
            name: claims.name,
            groups,
            issued_at,
            expires_at,
            claims: claim_map,
        })
    }
}

/// Maps `jsonwebtoken` failures onto the error taxonomy.
fn map_jwt_error(err: &jsonwebtoken::errors::Error) -> AuthError {
    match err.kind() {
        ErrorKind::ExpiredSignature => AuthError::TokenExpired,
        ErrorKind::InvalidAudience => AuthError::InvalidAudience,
        ErrorKind::InvalidSignature => AuthError::invalid_token("signature verification failed"),
        other => AuthError::invalid_token(format!("token validation failed: {other:?}")),
    }
}

/// Reads group names from a claim that may be an array of strings or a
/// comma-separated string.
fn extract_groups(extra: &HashMap<String, serde_json::Value>, claim: &str) -> Vec<String> {
    match extra.get(claim) {
        Some(serde_json::Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(String::from)
            .collect(),
        Some(serde_json::Value::String(joined)) => joined
            .split(',')
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::JwksConfig;
    use url::Url;

    fn test_validator() -> IdTokenValidator {
        let provider = ProviderConfig::custom(
            "test",
            "Test",
            "https://idp.example.com",
            Url::parse("https://idp.example.com/authorize").unwrap(),
            Url::parse("https://idp.example.com/token").unwrap(),
            Url::parse("https://idp.example.com/jwks").unwrap(),
            "ragbox-client",
        );
        let jwks = Arc::new(
            JwksCache::new(provider.jwks_uri.clone(), JwksConfig::default(), false).unwrap(),
        );
        IdTokenValidator::new(&provider, jwks)
    }

    #[tokio::test]
    async fn test_malformed_token_rejected_before_key_fetch() {
        let validator = test_validator();
        let err = validator.validate("not-a-jwt").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken { .. }));
    }

    #[test]
    fn test_claims_deserialize_string_audience() {
        let json = r#"{
            "iss": "https://idp.example.com",
            "sub": "u1",
            "aud": "ragbox-client",
            "exp": 1700000000,
            "iat": 1699999000,
            "email": "u1@example.com",
            "groups": ["eng", "ops"]
        }"#;

        let claims: IdTokenClaims = serde_json::from_str(json).unwrap();
        assert_eq!(claims.aud, vec!["ragbox-client"]);
        assert_eq!(claims.email.as_deref(), Some("u1@example.com"));
        assert!(claims.extra.contains_key("groups"));
    }

    #[test]
    fn test_claims_deserialize_array_audience() {
        let json = r#"{
            "iss": "https://idp.example.com",
            "sub": "u1",
            "aud": ["a", "b"],
            "exp": 1700000000,
            "iat": 1699999000
        }"#;

        let claims: IdTokenClaims = serde_json::from_str(json).unwrap();
        assert_eq!(claims.aud, vec!["a", "b"]);
    }

    #[test]
    fn test_extract_groups_from_array() {
        let mut extra = HashMap::new();
        extra.insert(
            "groups".to_string(),
            serde_json::json!(["eng", "ops", 42]),
        );
        assert_eq!(extract_groups(&extra, "groups"), vec!["eng", "ops"]);
    }

    #[test]
    fn test_extract_groups_from_comma_separated_string() {
        let mut extra = HashMap::new();
        extra.insert(
            "memberOf".to_string(),
            serde_json::json!("eng, ops,  research"),
        );
        assert_eq!(
            extract_groups(&extra, "memberOf"),
            vec!["eng", "ops", "research"]
        );
    }

    #[test]
    fn test_extract_groups_missing_claim() {
        let extra = HashMap::new();
        assert!(extract_groups(&extra, "groups").is_empty());
    }

    #[test]
    fn test_jwt_error_mapping() {
        let expired = jsonwebtoken::errors::Error::from(ErrorKind::ExpiredSignature);
        assert!(matches!(map_jwt_error(&expired), AuthError::TokenExpired));

        let audience = jsonwebtoken::errors::Error::from(ErrorKind::InvalidAudience);
        assert!(matches!(map_jwt_error(&audience), AuthError::InvalidAudience));

        let signature = jsonwebtoken::errors::Error::from(ErrorKind::InvalidSignature);
        assert!(matches!(
            map_jwt_error(&signature),
            AuthError::InvalidToken { .. }
        ));
    }
}
