//! Axum HTTP surface.
//!
//! Two routers: [`oauth::oauth_router`] for the browser login flow and
//! [`tokens::admin_token_router`] for access-token administration. Both
//! are mounted by the application's route layer.

pub mod oauth;
pub mod tokens;

pub use oauth::{OAuthState, oauth_router};
pub use tokens::{AdminGate, TokenAdminState, admin_token_router};

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use cookie::{Cookie, SameSite};
use serde::Serialize;

use crate::config::CookieConfig;
use crate::error::AuthError;

/// JSON error body returned by every endpoint.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Stable machine-readable error code.
    pub error: String,
    /// Human-readable description.
    pub message: String,
}

/// Maps an [`AuthError`] to its response.
pub(crate) fn error_response(err: &AuthError) -> Response {
    let status = StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

    if status.is_server_error() {
        tracing::warn!(error = %err, kind = err.kind(), "auth request failed");
    } else {
        tracing::debug!(error = %err, kind = err.kind(), "auth request rejected");
    }

    (
        status,
        Json(ErrorBody {
            error: err.kind().to_string(),
            message: err.to_string(),
        }),
    )
        .into_response()
}

/// Builds the session cookie for a new session.
pub(crate) fn session_cookie(config: &CookieConfig, session_id: String) -> Cookie<'static> {
    let mut cookie = Cookie::new(config.name.clone(), session_id);
    cookie.set_path("/");
    cookie.set_http_only(config.http_only);
    cookie.set_secure(config.secure);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(time::Duration::seconds(config.max_age.as_secs() as i64));
    cookie
}

/// Builds the cookie that clears the session cookie.
pub(crate) fn clear_session_cookie(config: &CookieConfig) -> Cookie<'static> {
    let mut cookie = Cookie::new(config.name.clone(), String::new());
    cookie.set_path("/");
    cookie.set_http_only(config.http_only);
    cookie.set_secure(config.secure);
    cookie.set_same_site(SameSite::Lax);
    cookie.set_max_age(time::Duration::ZERO);
    cookie
}
