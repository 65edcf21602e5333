//! Provider JWKS fetching and caching.
//!
//! ID-token signatures are verified against the provider's published key
//! set, which rotates. This cache keeps up to `max_keys` decoded keys for
//! a bounded TTL and caps network refreshes per rolling minute, so a
//! rotation storm or a burst of validation failures cannot flood the
//! provider.
//!
//! Fetch failures leave previously cached keys in place; they keep
//! serving until their TTL lapses. [`JwksCache::force_refresh`] is the
//! operator escape hatch when a provider rotates faster than the TTL.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet, PublicKeyUse};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::{Mutex, RwLock};
use url::Url;

use crate::AuthResult;
use crate::config::JwksConfig;
use crate::error::AuthError;

/// A decoded signing key with its fetch time.
struct CachedKey {
    key: DecodingKey,
    algorithm: Option<Algorithm>,
    fetched_at: Instant,
}

/// Rolling 60-second refresh budget.
#[derive(Debug)]
struct RefreshWindow {
    window_start: Instant,
    used: u32,
}

impl RefreshWindow {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            used: 0,
        }
    }

    /// Takes one refresh slot, rolling the window when a minute has passed.
    fn try_acquire(&mut self, now: Instant, limit: u32) -> bool {
        if now.duration_since(self.window_start) >= Duration::from_secs(60) {
            self.window_start = now;
            self.used = 0;
        }

        if self.used < limit {
            self.used += 1;
            true
        } else {
            false
        }
    }
}

/// Cached, rate-limited source of one provider's signing keys.
pub struct JwksCache {
    jwks_uri: Url,
    http_client: reqwest::Client,
    config: JwksConfig,
    keys: RwLock<HashMap<String, CachedKey>>,
    refreshes: Mutex<RefreshWindow>,
}

impl std::fmt::Debug for JwksCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwksCache")
            .field("jwks_uri", &self.jwks_uri)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl JwksCache {
    /// Creates a cache for one JWKS endpoint.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the endpoint is plain HTTP without
    /// `allow_http`, or the HTTP client cannot be built.
    pub fn new(jwks_uri: Url, config: JwksConfig, allow_http: bool) -> AuthResult<Self> {
        if jwks_uri.scheme() != "https" && !(allow_http && jwks_uri.scheme() == "http") {
            return Err(AuthError::configuration(format!(
                "JWKS endpoint must use https: {jwks_uri}"
            )));
        }

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            jwks_uri,
            http_client,
            config,
            keys: RwLock::new(HashMap::new()),
            refreshes: Mutex::new(RefreshWindow::new(Instant::now())),
        })
    }

    /// Returns the decoding key for a `kid`, fetching the key set on a
    /// cache miss.
    ///
    /// # Errors
    ///
    /// - `Jwks` if the key set cannot be fetched (including an exhausted
    ///   refresh budget) and the cache cannot answer.
    /// - `InvalidToken` if the key set is fresh but does not contain the
    ///   requested `kid`.
    pub async fn get_key(&self, kid: &str) -> AuthResult<(DecodingKey, Option<Algorithm>)> {
        if let Some(found) = self.cached(kid).await {
            tracing::trace!(kid, "JWKS cache hit");
            return Ok(found);
        }

        tracing::debug!(kid, jwks_uri = %self.jwks_uri, "JWKS cache miss");
        self.refresh().await?;

        self.cached(kid)
            .await
            .ok_or_else(|| AuthError::invalid_token(format!("unknown signing key id '{kid}'")))
    }

    /// Busts the cache and fetches a fresh key set immediately.
    ///
    /// Used operationally when a provider rotates keys faster than the
    /// cache TTL, or after a signature-verification failure.
    ///
    /// # Errors
    ///
    /// Returns `Jwks` if the fetch fails or the refresh budget is
    /// exhausted. The cache stays empty in that case.
    pub async fn force_refresh(&self) -> AuthResult<()> {
        tracing::debug!(jwks_uri = %self.jwks_uri, "forced JWKS refresh");
        self.keys.write().await.clear();
        self.refresh().await
    }

    /// Looks up an unexpired cached key.
    async fn cached(&self, kid: &str) -> Option<(DecodingKey, Option<Algorithm>)> {
        let keys = self.keys.read().await;
        keys.get(kid)
            .filter(|cached| cached.fetched_at.elapsed() < self.config.cache_ttl)
            .map(|cached| (cached.key.clone(), cached.algorithm))
    }

    /// Fetches the key set and replaces the cache contents.
    ///
    /// The refresh budget is consumed before the network call; a denied
    /// slot fails without touching the provider. A failed fetch leaves
    /// existing entries in place.
    async fn refresh(&self) -> AuthResult<()> {
        {
            let mut window = self.refreshes.lock().await;
            if !window.try_acquire(Instant::now(), self.config.max_refreshes_per_minute) {
                tracing::warn!(
                    jwks_uri = %self.jwks_uri,
                    limit = self.config.max_refreshes_per_minute,
                    "JWKS refresh budget exhausted"
                );
                return Err(AuthError::jwks(
                    "JWKS refresh rate limit exceeded; serving cached keys until the window rolls",
                ));
            }
        }

        let response = self
            .http_client
            .get(self.jwks_uri.as_str())
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(jwks_uri = %self.jwks_uri, error = %e, "JWKS fetch failed");
                AuthError::jwks(format!("failed to fetch key set: {e}"))
            })?;

        if !response.status().is_success() {
            return Err(AuthError::jwks(format!(
                "key set endpoint returned HTTP {}",
                response.status().as_u16()
            )));
        }

        let jwk_set: JwkSet = response
            .json()
            .await
            .map_err(|e| AuthError::jwks(format!("failed to parse key set: {e}")))?;

        let indexed = index_keys(&jwk_set, self.config.max_keys, Instant::now());
        tracing::debug!(
            jwks_uri = %self.jwks_uri,
            keys = indexed.len(),
            "cached provider signing keys"
        );

        *self.keys.write().await = indexed;
        Ok(())
    }
}

/// Indexes a key set by `kid`, skipping encryption keys and anything
/// `DecodingKey` cannot represent, keeping at most `max_keys` entries.
fn index_keys(jwk_set: &JwkSet, max_keys: usize, now: Instant) -> HashMap<String, CachedKey> {
    jwk_set
        .keys
        .iter()
        .filter(|jwk| !matches!(jwk.common.public_key_use, Some(PublicKeyUse::Encryption)))
        .filter_map(|jwk| {
            let kid = jwk.common.key_id.clone()?;
            let key = DecodingKey::from_jwk(jwk).ok()?;
            Some((
                kid,
                CachedKey {
                    key,
                    algorithm: jwk_algorithm(jwk),
                    fetched_at: now,
                },
            ))
        })
        .take(max_keys)
        .collect()
}

/// Extracts the declared algorithm from a JWK.
fn jwk_algorithm(jwk: &Jwk) -> Option<Algorithm> {
    use jsonwebtoken::jwk::KeyAlgorithm;

    jwk.common.key_algorithm.and_then(|alg| match alg {
        KeyAlgorithm::RS256 => Some(Algorithm::RS256),
        KeyAlgorithm::RS384 => Some(Algorithm::RS384),
        KeyAlgorithm::RS512 => Some(Algorithm::RS512),
        KeyAlgorithm::ES256 => Some(Algorithm::ES256),
        KeyAlgorithm::ES384 => Some(Algorithm::ES384),
        KeyAlgorithm::PS256 => Some(Algorithm::PS256),
        KeyAlgorithm::PS384 => Some(Algorithm::PS384),
        KeyAlgorithm::PS512 => Some(Algorithm::PS512),
        KeyAlgorithm::EdDSA => Some(Algorithm::EdDSA),
        _ => None,
    })
}
