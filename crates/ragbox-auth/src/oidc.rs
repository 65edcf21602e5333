//! The OIDC protocol state machine.
//!
//! One login attempt moves `Unauthenticated → PendingAuthorization →
//! Authenticated → (logout | expiry) → Unauthenticated`:
//!
//! 1. [`OidcService::initiate_login`] writes one-time authorization state
//!    and hands back the provider authorization URL.
//! 2. The provider redirects to the callback;
//!    [`OidcService::handle_callback`] consumes the state atomically,
//!    exchanges the code, validates the ID token, and persists a session.
//! 3. [`OidcService::validate_session`] / [`OidcService::get_authorization`]
//!    serve every later request from the session cookie.
//! 4. [`OidcService::logout`] deletes the session.
//!
//! The code exchange is never retried: providers treat authorization
//! codes as single-use, and a replayed exchange looks like an attack.

use std::sync::Arc;

use serde::Deserialize;
use url::Url;

use crate::AuthResult;
use crate::claims::ClaimMapper;
use crate::config::AuthConfig;
use crate::error::AuthError;
use crate::jwks::JwksCache;
use crate::pkce::{PkceChallenge, PkceVerifier, generate_state};
use crate::principal::{Authorization, PrincipalRegistry};
use crate::provider::ProviderConfig;
use crate::session::{AuthorizationState, OAuthSessionData};
use crate::store::AuthStore;
use crate::validator::IdTokenValidator;

/// A started login attempt.
#[derive(Debug, Clone)]
pub struct LoginInitiation {
    /// Provider authorization URL to redirect the browser to.
    pub authorization_url: Url,

    /// The CSRF state bound to this attempt.
    pub state: String,
}

/// A completed callback: the new session plus where the browser wanted
/// to go.
#[derive(Debug, Clone)]
pub struct CallbackOutcome {
    /// The persisted session.
    pub session: OAuthSessionData,

    /// Post-login redirect target captured at initiation.
    pub redirect_after: Option<String>,
}

/// Token-endpoint response. Only `id_token` matters here; the provider
/// access token is not used.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    access_token: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    token_type: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    expires_in: Option<u64>,
}

/// OAuth error body some providers return on a failed exchange.
#[derive(Debug, Deserialize)]
struct OAuthErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

/// The orchestrator for one configured identity provider.
pub struct OidcService {
    provider: ProviderConfig,
    config: AuthConfig,
    store: Arc<dyn AuthStore>,
    validator: IdTokenValidator,
    mapper: ClaimMapper,
    http_client: reqwest::Client,
}

impl OidcService {
    /// Wires up the flow for one provider.
    ///
    /// # Errors
    ///
    /// Returns `Configuration` if the config fails validation, an
    /// endpoint is plain HTTP without `allow_http`, or the HTTP client
    /// cannot be built.
    pub fn new(
        provider: ProviderConfig,
        config: AuthConfig,
        store: Arc<dyn AuthStore>,
        registry: Arc<dyn PrincipalRegistry>,
    ) -> AuthResult<Self> {
        config
            .validate()
            .map_err(|e| AuthError::configuration(e.to_string()))?;

        for endpoint in [&provider.authorization_endpoint, &provider.token_endpoint] {
            if endpoint.scheme() != "https" && !config.allow_http {
                return Err(AuthError::configuration(format!(
                    "provider endpoint must use https: {endpoint}"
                )));
            }
        }

        let jwks = Arc::new(JwksCache::new(
            provider.jwks_uri.clone(),
            config.jwks.clone(),
            config.allow_http,
        )?);
        let validator = IdTokenValidator::new(&provider, jwks);
        let mapper = ClaimMapper::new(registry, config.session_max_age);

        let http_client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| AuthError::configuration(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            provider,
            config,
            store,
            validator,
            mapper,
            http_client,
        })
    }

    /// The configured provider.
    #[must_use]
    pub fn provider(&self) -> &ProviderConfig {
        &self.provider
    }

    /// Starts a login attempt.
    ///
    /// Generates the CSRF state and PKCE verifier, persists them as
    /// authorization state, and returns the provider authorization URL.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the state cannot be persisted.
    pub async fn initiate_login(
        &self,
        redirect_after: Option<String>,
    ) -> AuthResult<LoginInitiation> {
        let state = generate_state();
        let verifier = PkceVerifier::generate();
        let challenge = PkceChallenge::from_verifier(&verifier);

        self.store
            .put_state(AuthorizationState::new(
                state.clone(),
                verifier.into_inner(),
                redirect_after,
                self.config.state_ttl,
            ))
            .await?;

        let mut url = self.provider.authorization_endpoint.clone();
        url.query_pairs_mut()
            .append_pair("response_type", "code")
            .append_pair("client_id", &self.provider.client_id)
            .append_pair("redirect_uri", self.config.redirect_uri.as_str())
            .append_pair("scope", &self.provider.scopes.join(" "))
            .append_pair("state", &state)
            .append_pair("code_challenge", challenge.as_str())
            .append_pair("code_challenge_method", "S256");

        tracing::debug!(provider = %self.provider.id, "initiated login");

        Ok(LoginInitiation {
            authorization_url: url,
            state,
        })
    }

    /// Handles the provider callback.
    ///
    /// Consumes the authorization state atomically, exchanges the code,
    /// validates the ID token, and persists the resulting session. No
    /// session is created and no further state consumed on any failure.
    ///
    /// # Errors
    ///
    /// - `InvalidState` — unknown, already-consumed, or swept state
    /// - `StateExpired` — state outlived its TTL (and stays consumed)
    /// - `TokenExchange` — provider rejected the code, network failure,
    ///   or a response without an ID token
    /// - validator errors pass through unchanged
    pub async fn handle_callback(&self, code: &str, state: &str) -> AuthResult<CallbackOutcome> {
        let auth_state = self
            .store
            .take_state(state)
            .await?
            .ok_or(AuthError::InvalidState)?;

        if auth_state.is_expired() {
            tracing::debug!(provider = %self.provider.id, "callback with expired state");
            return Err(AuthError::StateExpired);
        }

        let token_response = self.exchange_code(code, &auth_state.code_verifier).await?;
        let id_token = token_response.id_token.ok_or_else(|| {
            AuthError::token_exchange("token response did not include an ID token")
        })?;

        let validated = self.validator.validate(&id_token).await?;
        let session = self.mapper.map_to_session(&validated, &self.provider.id);
        self.store.put_session(session.clone()).await?;

        tracing::info!(
            user = %session.user_id,
            provider = %self.provider.id,
            "authenticated user"
        );

        Ok(CallbackOutcome {
            session,
            redirect_after: auth_state.redirect_after,
        })
    }

    /// Looks up a live session. Expired sessions are lazily deleted by
    /// the store and reported as absent.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the lookup fails.
    pub async fn validate_session(&self, session_id: &str) -> AuthResult<Option<OAuthSessionData>> {
        self.store.get_session(session_id).await
    }

    /// Resolves the authorization value for a live session.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the lookup or principal resolution fails.
    pub async fn get_authorization(&self, session_id: &str) -> AuthResult<Option<Authorization>> {
        match self.validate_session(session_id).await? {
            Some(session) => Ok(Some(self.mapper.authorize_session(&session).await?)),
            None => Ok(None),
        }
    }

    /// Ends a session. Idempotent: logging out an absent session is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// Returns `Storage` if the delete fails.
    pub async fn logout(&self, session_id: &str) -> AuthResult<()> {
        self.store.delete_session(session_id).await?;
        tracing::debug!(provider = %self.provider.id, "logged out session");
        Ok(())
    }

    /// Forces a provider key-set refresh.
    ///
    /// # Errors
    ///
    /// Returns `Jwks` if the fetch fails.
    pub async fn refresh_jwks(&self) -> AuthResult<()> {
        self.validator.refresh_jwks().await
    }

    /// Exchanges an authorization code for tokens at the provider.
    async fn exchange_code(&self, code: &str, code_verifier: &str) -> AuthResult<TokenResponse> {
        let mut params = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.config.redirect_uri.as_str()),
            ("client_id", &self.provider.client_id),
            ("code_verifier", code_verifier),
        ];

        if let Some(secret) = &self.provider.client_secret {
            params.push(("client_secret", secret.as_str()));
        }

        tracing::debug!(
            token_endpoint = %self.provider.token_endpoint,
            "exchanging authorization code"
        );

        let response = self
            .http_client
            .post(self.provider.token_endpoint.as_str())
            .form(&params)
            .send()
            .await
            .map_err(|e| AuthError::token_exchange(format!("request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();

            if let Ok(oauth_error) = serde_json::from_str::<OAuthErrorResponse>(&body) {
                return Err(AuthError::token_exchange(format!(
                    "provider rejected code exchange: {} ({})",
                    oauth_error.error,
                    oauth_error.error_description.unwrap_or_default()
                )));
            }

            return Err(AuthError::token_exchange(format!(
                "token endpoint returned HTTP {status}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| AuthError::token_exchange(format!("invalid token response: {e}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::principal::MemoryPrincipalRegistry;
    use crate::store::MemoryAuthStore;

    fn test_provider() -> ProviderConfig {
        ProviderConfig::custom(
            "test",
            "Test IdP",
            "https://idp.example.com",
            Url::parse("https://idp.example.com/authorize").unwrap(),
            Url::parse("https://idp.example.com/token").unwrap(),
            Url::parse("https://idp.example.com/jwks").unwrap(),
            "ragbox-client",
        )
    }

    fn test_service() -> OidcService {
        OidcService::new(
            test_provider(),
            AuthConfig::new(Url::parse("https://app.example.com/oauth/callback").unwrap()),
            Arc::new(MemoryAuthStore::new()),
            Arc::new(MemoryPrincipalRegistry::new()),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_initiate_login_builds_authorization_url() {
        let service = test_service();
        let initiation = service.initiate_login(None).await.unwrap();

        let url = &initiation.authorization_url;
        assert!(url.as_str().starts_with("https://idp.example.com/authorize?"));

        let params: std::collections::HashMap<_, _> = url.query_pairs().collect();
        assert_eq!(params["response_type"], "code");
        assert_eq!(params["client_id"], "ragbox-client");
        assert_eq!(
            params["redirect_uri"],
            "https://app.example.com/oauth/callback"
        );
        assert_eq!(params["scope"], "openid email profile");
        assert_eq!(params["state"], initiation.state.as_str());
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(params["code_challenge"].len(), 43);
    }

    #[tokio::test]
    async fn test_initiate_login_generates_unique_state() {
        let service = test_service();
        let a = service.initiate_login(None).await.unwrap();
        let b = service.initiate_login(None).await.unwrap();
        assert_ne!(a.state, b.state);
    }

    #[tokio::test]
    async fn test_callback_with_unknown_state() {
        let service = test_service();
        let err = service
            .handle_callback("some-code", "never-issued")
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InvalidState));
    }

    #[tokio::test]
    async fn test_callback_with_expired_state_consumes_it() {
        let store = Arc::new(MemoryAuthStore::new());
        let service = OidcService::new(
            test_provider(),
            AuthConfig::new(Url::parse("https://app.example.com/oauth/callback").unwrap()),
            Arc::clone(&store) as Arc<dyn AuthStore>,
            Arc::new(MemoryPrincipalRegistry::new()),
        )
        .unwrap();

        let mut state =
            AuthorizationState::new("s1", "verifier", None, std::time::Duration::from_secs(300));
        state.expires_at = time::OffsetDateTime::now_utc() - time::Duration::seconds(1);
        store.put_state(state).await.unwrap();

        let err = service.handle_callback("code", "s1").await.unwrap_err();
        assert!(matches!(err, AuthError::StateExpired));

        // The expired state was consumed: a retry is InvalidState
        let err = service.handle_callback("code", "s1").await.unwrap_err();
        assert!(matches!(err, AuthError::InvalidState));
    }

    #[test]
    fn test_http_provider_endpoints_rejected_without_allow_http() {
        let provider = ProviderConfig::custom(
            "test",
            "Test",
            "http://idp.local",
            Url::parse("http://idp.local/authorize").unwrap(),
            Url::parse("http://idp.local/token").unwrap(),
            Url::parse("http://idp.local/jwks").unwrap(),
            "client",
        );

        let result = OidcService::new(
            provider,
            AuthConfig::new(Url::parse("https://app.example.com/cb").unwrap()),
            Arc::new(MemoryAuthStore::new()),
            Arc::new(MemoryPrincipalRegistry::new()),
        );
        assert!(matches!(result, Err(AuthError::Configuration { .. })));
    }
}
