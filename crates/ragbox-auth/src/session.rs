//! Stored authentication entities.
//!
//! Two short-lived records back the login flow: [`AuthorizationState`]
//! covers the window between redirecting to the provider and the callback
//! (consumed exactly once), and [`OAuthSessionData`] is the authenticated
//! browser session (absolute expiry, read on every request).

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// One login attempt's PKCE and CSRF material.
///
/// Created when login is initiated, consumed exactly once by the callback
/// (read-and-delete), or swept after expiry — whichever happens first.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthorizationState {
    /// Random CSRF token, the row key.
    pub state: String,

    /// PKCE code verifier held server-side until the code exchange.
    pub code_verifier: String,

    /// Where to send the browser after a successful login.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_after: Option<String>,

    /// When this login attempt started.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When this login attempt stops being honored.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl AuthorizationState {
    /// Creates a state record expiring `ttl` from now.
    #[must_use]
    pub fn new(
        state: impl Into<String>,
        code_verifier: impl Into<String>,
        redirect_after: Option<String>,
        ttl: Duration,
    ) -> Self {
        let now = OffsetDateTime::now_utc();
        Self {
            state: state.into(),
            code_verifier: code_verifier.into(),
            redirect_after,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// Returns `true` once the TTL has lapsed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }
}

/// An authenticated browser session.
///
/// The expiry is fixed when the session is created; activity never
/// extends it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthSessionData {
    /// Session id, carried in the session cookie.
    pub id: String,

    /// Stable user identity: email when the provider supplies one,
    /// otherwise the OIDC subject.
    pub user_id: String,

    /// Email address from the ID token, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,

    /// Display name from the ID token, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    /// Group names from the ID token's groups claim.
    #[serde(default)]
    pub groups: Vec<String>,

    /// Id of the provider that issued the identity.
    pub provider: String,

    /// When the session was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// Absolute expiry.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,
}

impl OAuthSessionData {
    /// Generates a fresh random session id.
    #[must_use]
    pub fn generate_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// Returns `true` once the absolute expiry has passed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }
}
