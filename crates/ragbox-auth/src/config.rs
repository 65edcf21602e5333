//! Authentication subsystem configuration.
//!
//! All durations deserialize from humantime strings ("5m", "24h"), so the
//! subsystem config can sit directly inside the application's config file.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

/// Top-level configuration for the OIDC login flow and session handling.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Redirect URI registered with the identity provider.
    ///
    /// This is where the provider sends the browser after login; it must
    /// resolve to the callback handler.
    pub redirect_uri: Url,

    /// Lifetime of one login attempt's authorization state.
    ///
    /// A callback arriving later than this fails with `StateExpired`.
    #[serde(with = "humantime_serde")]
    pub state_ttl: Duration,

    /// Absolute session lifetime, fixed at creation.
    ///
    /// Sessions never extend on activity.
    #[serde(with = "humantime_serde")]
    pub session_max_age: Duration,

    /// Timeout for requests to the provider's token endpoint.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,

    /// Session cookie settings.
    #[serde(default)]
    pub cookie: CookieConfig,

    /// Provider key-set cache settings.
    #[serde(default)]
    pub jwks: JwksConfig,

    /// Allow plain-HTTP provider endpoints. Testing only.
    #[serde(default)]
    pub allow_http: bool,
}

impl AuthConfig {
    /// Creates a configuration with defaults for everything but the
    /// redirect URI.
    #[must_use]
    pub fn new(redirect_uri: Url) -> Self {
        Self {
            redirect_uri,
            state_ttl: Duration::from_secs(300),            // 5 minutes
            session_max_age: Duration::from_secs(24 * 3600), // 24 hours
            request_timeout: Duration::from_secs(30),
            cookie: CookieConfig::default(),
            jwks: JwksConfig::default(),
            allow_http: false,
        }
    }

    /// Sets the authorization-state TTL.
    #[must_use]
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = ttl;
        self
    }

    /// Sets the absolute session lifetime.
    #[must_use]
    pub fn with_session_max_age(mut self, max_age: Duration) -> Self {
        self.session_max_age = max_age;
        self
    }

    /// Sets the provider request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the cookie configuration.
    #[must_use]
    pub fn with_cookie(mut self, cookie: CookieConfig) -> Self {
        self.cookie = cookie;
        self
    }

    /// Sets the JWKS cache configuration.
    #[must_use]
    pub fn with_jwks(mut self, jwks: JwksConfig) -> Self {
        self.jwks = jwks;
        self
    }

    /// Allows plain-HTTP provider endpoints. Testing only.
    #[must_use]
    pub fn with_allow_http(mut self, allow: bool) -> Self {
        self.allow_http = allow;
        self
    }

    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if a duration is zero, the
    /// cookie name is empty, or the redirect URI is plain HTTP without
    /// `allow_http`.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.state_ttl.is_zero() {
            return Err(ConfigError::InvalidValue(
                "state_ttl must be > 0".to_string(),
            ));
        }

        if self.session_max_age.is_zero() {
            return Err(ConfigError::InvalidValue(
                "session_max_age must be > 0".to_string(),
            ));
        }

        if self.cookie.name.is_empty() {
            return Err(ConfigError::InvalidValue(
                "cookie name cannot be empty".to_string(),
            ));
        }

        if self.redirect_uri.scheme() != "https" && !self.allow_http {
            return Err(ConfigError::InvalidValue(format!(
                "redirect_uri must use https (got '{}'); set allow_http for local development",
                self.redirect_uri.scheme()
            )));
        }

        if self.jwks.max_keys == 0 {
            return Err(ConfigError::InvalidValue(
                "jwks.max_keys must be > 0".to_string(),
            ));
        }

        if self.jwks.max_refreshes_per_minute == 0 {
            return Err(ConfigError::InvalidValue(
                "jwks.max_refreshes_per_minute must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Session cookie settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CookieConfig {
    /// Cookie name.
    pub name: String,

    /// Mark the cookie `Secure`. Disable only for non-TLS development.
    pub secure: bool,

    /// Mark the cookie `HttpOnly`.
    pub http_only: bool,

    /// Cookie max-age. Usually matches the session lifetime.
    #[serde(with = "humantime_serde")]
    pub max_age: Duration,
}

impl Default for CookieConfig {
    fn default() -> Self {
        Self {
            name: "ragbox_session".to_string(),
            secure: true,
            http_only: true,
            max_age: Duration::from_secs(24 * 3600), // 24 hours
        }
    }
}

/// Provider JWKS cache settings.
///
/// The cache bounds both memory (key count) and provider load (refreshes
/// per minute), so key-rotation storms and validation-failure bursts never
/// turn into a fetch flood.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct JwksConfig {
    /// How long a fetched key remains usable.
    #[serde(with = "humantime_serde")]
    pub cache_ttl: Duration,

    /// Maximum number of keys retained from one key set.
    pub max_keys: usize,

    /// Network refresh budget per rolling 60-second window.
    pub max_refreshes_per_minute: u32,

    /// HTTP timeout for key-set fetches.
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
}

impl Default for JwksConfig {
    fn default() -> Self {
        Self {
            cache_ttl: Duration::from_secs(3600), // 1 hour
            max_keys: 8,
            max_refreshes_per_minute: 5,
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Configuration validation errors.
#[derive(Debug, Clone, thiserror::Error)]
pub enum ConfigError {
    /// An invalid configuration value was provided.
    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    /// A required configuration value is missing.
    #[error("Missing required configuration: {0}")]
    Missing(String),
}
