//! Authentication error taxonomy.
//!
//! Every failure the OIDC orchestrator, token validator, or access-token
//! registry can produce is a distinct variant here. Callers branch on the
//! kind (expired vs. malformed vs. wrong audience) instead of parsing
//! messages, and the HTTP layer maps each kind to a precise status code.
//!
//! None of these errors are retried automatically: authorization codes are
//! single-use by provider contract, so a failed exchange is reported, never
//! replayed.

/// Errors produced by the authentication subsystem.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The callback carried a `state` value with no stored counterpart.
    ///
    /// Either the state was never issued, already consumed (replay), or
    /// swept after expiry.
    #[error("Invalid or unknown authorization state")]
    InvalidState,

    /// The authorization state existed but outlived its TTL.
    ///
    /// The state is consumed on this path too, so a retry observes
    /// `InvalidState`, not `StateExpired`.
    #[error("Authorization state has expired")]
    StateExpired,

    /// The ID token's expiration time has passed.
    #[error("ID token has expired")]
    TokenExpired,

    /// The ID token is malformed or its signature does not verify.
    #[error("Invalid token: {message}")]
    InvalidToken {
        /// Description of why the token is invalid.
        message: String,
    },

    /// The ID token's issuer does not match the configured provider.
    #[error("Invalid issuer: expected {expected}, got {actual}")]
    InvalidIssuer {
        /// The configured issuer.
        expected: String,
        /// The issuer asserted by the token.
        actual: String,
    },

    /// The ID token's audience does not include the configured client id.
    #[error("Invalid audience: token audience does not include the configured client id")]
    InvalidAudience,

    /// The provider's key set could not be fetched or parsed.
    #[error("JWKS error: {message}")]
    Jwks {
        /// Description of the key-set failure.
        message: String,
    },

    /// The provider rejected the code exchange, or the exchange failed on
    /// the network.
    #[error("Token exchange failed: {message}")]
    TokenExchange {
        /// Description of the exchange failure.
        message: String,
    },

    /// Provider or subsystem settings are missing or invalid.
    #[error("Configuration error: {message}")]
    Configuration {
        /// Description of the configuration problem.
        message: String,
    },

    /// An access-token request named a scope outside the fixed vocabulary.
    #[error("Invalid scope: {message}")]
    InvalidScope {
        /// Description of the scope violation.
        message: String,
    },

    /// The state/session or access-token store failed.
    #[error("Storage error: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
    },
}

impl AuthError {
    /// Creates a new `InvalidToken` error.
    #[must_use]
    pub fn invalid_token(message: impl Into<String>) -> Self {
        Self::InvalidToken {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidIssuer` error.
    #[must_use]
    pub fn invalid_issuer(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::InvalidIssuer {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    /// Creates a new `Jwks` error.
    #[must_use]
    pub fn jwks(message: impl Into<String>) -> Self {
        Self::Jwks {
            message: message.into(),
        }
    }

    /// Creates a new `TokenExchange` error.
    #[must_use]
    pub fn token_exchange(message: impl Into<String>) -> Self {
        Self::TokenExchange {
            message: message.into(),
        }
    }

    /// Creates a new `Configuration` error.
    #[must_use]
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Creates a new `InvalidScope` error.
    #[must_use]
    pub fn invalid_scope(message: impl Into<String>) -> Self {
        Self::InvalidScope {
            message: message.into(),
        }
    }

    /// Creates a new `Storage` error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    /// Returns `true` for client-caused protocol errors (HTTP 400).
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidState | Self::StateExpired | Self::InvalidScope { .. }
        )
    }

    /// Returns `true` for credential problems (HTTP 401).
    #[must_use]
    pub fn is_credential_error(&self) -> bool {
        matches!(
            self,
            Self::TokenExpired
                | Self::InvalidToken { .. }
                | Self::InvalidIssuer { .. }
                | Self::InvalidAudience
        )
    }

    /// Returns `true` for infrastructure failures (HTTP 500).
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(
            self,
            Self::Jwks { .. }
                | Self::TokenExchange { .. }
                | Self::Configuration { .. }
                | Self::Storage { .. }
        )
    }

    /// The HTTP status this error maps to at the OAuth surface.
    #[must_use]
    pub fn http_status(&self) -> u16 {
        if self.is_client_error() {
            400
        } else if self.is_credential_error() {
            401
        } else {
            500
        }
    }

    /// A stable machine-readable error code for response bodies and logs.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidState => "invalid_state",
            Self::StateExpired => "state_expired",
            Self::TokenExpired => "token_expired",
            Self::InvalidToken { .. } => "invalid_token",
            Self::InvalidIssuer { .. } => "invalid_issuer",
            Self::InvalidAudience => "invalid_audience",
            Self::Jwks { .. } => "jwks_error",
            Self::TokenExchange { .. } => "token_exchange_error",
            Self::Configuration { .. } => "configuration_error",
            Self::InvalidScope { .. } => "invalid_scope",
            Self::Storage { .. } => "storage_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        assert_eq!(
            AuthError::InvalidState.to_string(),
            "Invalid or unknown authorization state"
        );
        assert_eq!(
            AuthError::invalid_token("garbage header").to_string(),
            "Invalid token: garbage header"
        );
        let err = AuthError::invalid_issuer("https://a.example.com", "https://b.example.com");
        assert!(err.to_string().contains("https://a.example.com"));
        assert!(err.to_string().contains("https://b.example.com"));
    }

    #[test]
    fn test_error_predicates() {
        assert!(AuthError::InvalidState.is_client_error());
        assert!(AuthError::StateExpired.is_client_error());
        assert!(!AuthError::InvalidState.is_credential_error());

        assert!(AuthError::TokenExpired.is_credential_error());
        assert!(AuthError::InvalidAudience.is_credential_error());
        assert!(!AuthError::TokenExpired.is_server_error());

        assert!(AuthError::jwks("fetch failed").is_server_error());
        assert!(AuthError::token_exchange("HTTP 500").is_server_error());
        assert!(AuthError::storage("pool exhausted").is_server_error());
    }

    #[test]
    fn test_http_status_mapping() {
        assert_eq!(AuthError::InvalidState.http_status(), 400);
        assert_eq!(AuthError::StateExpired.http_status(), 400);
        assert_eq!(AuthError::invalid_scope("made-up").http_status(), 400);
        assert_eq!(AuthError::TokenExpired.http_status(), 401);
        assert_eq!(AuthError::invalid_token("bad sig").http_status(), 401);
        assert_eq!(AuthError::InvalidAudience.http_status(), 401);
        assert_eq!(AuthError::jwks("down").http_status(), 500);
        assert_eq!(AuthError::configuration("missing client id").http_status(), 500);
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(AuthError::InvalidState.kind(), "invalid_state");
        assert_eq!(AuthError::StateExpired.kind(), "state_expired");
        assert_eq!(AuthError::invalid_token("x").kind(), "invalid_token");
        assert_eq!(AuthError::token_exchange("x").kind(), "token_exchange_error");
    }
}
