//! Browser login flow endpoints.
//!
//! - `GET /oauth/login` — start a login, returning the provider URL
//! - `GET /oauth/callback` — the provider redirect target; sets the
//!   session cookie
//! - `POST /oauth/logout` — clear the session
//! - `GET /oauth/userinfo` — identity behind the current session

use std::sync::Arc;

use axum::Json;
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};

use crate::config::CookieConfig;
use crate::error::AuthError;
use crate::http::{clear_session_cookie, error_response, session_cookie, ErrorBody};
use crate::oidc::OidcService;
use crate::session::OAuthSessionData;

/// Shared state for the login-flow endpoints.
#[derive(Clone)]
pub struct OAuthState {
    /// The protocol orchestrator.
    pub service: Arc<OidcService>,
    /// Session cookie settings.
    pub cookie: CookieConfig,
}

/// Builds the `/oauth` router.
pub fn oauth_router(state: OAuthState) -> Router {
    Router::new()
        .route("/oauth/login", get(login_handler))
        .route("/oauth/callback", get(callback_handler))
        .route("/oauth/logout", post(logout_handler))
        .route("/oauth/userinfo", get(userinfo_handler))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    /// Where to send the browser after a successful login.
    #[serde(default)]
    pub redirect_after: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    /// Provider authorization URL to redirect to.
    pub authorization_url: String,
    /// The CSRF state bound to this attempt.
    pub state: String,
}

/// Handler for `GET /oauth/login`.
async fn login_handler(
    State(state): State<OAuthState>,
    Query(params): Query<LoginParams>,
) -> Response {
    match state.service.initiate_login(params.redirect_after).await {
        Ok(initiation) => Json(LoginResponse {
            authorization_url: initiation.authorization_url.into(),
            state: initiation.state,
        })
        .into_response(),
        Err(e) => error_response(&e),
    }
}

#[derive(Debug, Deserialize)]
pub struct CallbackParams {
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    /// Error code the provider reports instead of a code.
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub error_description: Option<String>,
}

/// Handler for `GET /oauth/callback`.
async fn callback_handler(
    State(state): State<OAuthState>,
    Query(params): Query<CallbackParams>,
    jar: CookieJar,
) -> Response {
    // The provider can land here with an error instead of a code
    if let Some(provider_error) = params.error {
        let message = params.error_description.unwrap_or_default();
        tracing::debug!(error = %provider_error, message = %message, "provider returned error callback");
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "provider_error".to_string(),
                message: format!("{provider_error} {message}").trim().to_string(),
            }),
        )
            .into_response();
    }

    let (Some(code), Some(callback_state)) = (params.code, params.state) else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorBody {
                error: "invalid_request".to_string(),
                message: "callback requires code and state parameters".to_string(),
            }),
        )
            .into_response();
    };

    match state.service.handle_callback(&code, &callback_state).await {
        Ok(outcome) => {
            let jar = jar.add(session_cookie(&state.cookie, outcome.session.id.clone()));
            let target = safe_redirect_target(outcome.redirect_after.as_deref());
            (jar, Redirect::to(target)).into_response()
        }
        Err(e) => error_response(&e),
    }
}

/// Confines the post-login redirect to same-origin paths.
fn safe_redirect_target(requested: Option<&str>) -> &str {
    match requested {
        Some(path) if path.starts_with('/') && !path.starts_with("//") => path,
        _ => "/",
    }
}

#[derive(Debug, Serialize)]
pub struct LogoutResponse {
    /// Confirmation message.
    pub message: String,
}

/// Handler for `POST /oauth/logout`.
///
/// A no-op when no session cookie is present.
async fn logout_handler(State(state): State<OAuthState>, jar: CookieJar) -> Response {
    if let Some(cookie) = jar.get(&state.cookie.name) {
        if let Err(e) = state.service.logout(cookie.value()).await {
            return error_response(&e);
        }
    }

    let jar = jar.add(clear_session_cookie(&state.cookie));
    (
        jar,
        Json(LogoutResponse {
            message: "logged out".to_string(),
        }),
    )
        .into_response()
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfoResponse {
    /// Stable user identity.
    pub user_id: String,
    /// Email address, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    /// Display name, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Group memberships.
    pub groups: Vec<String>,
}

impl From<OAuthSessionData> for UserInfoResponse {
    fn from(session: OAuthSessionData) -> Self {
        Self {
            user_id: session.user_id,
            email: session.email,
            name: session.name,
            groups: session.groups,
        }
    }
}

/// Handler for `GET /oauth/userinfo`.
async fn userinfo_handler(State(state): State<OAuthState>, jar: CookieJar) -> Response {
    let Some(cookie) = jar.get(&state.cookie.name) else {
        return unauthorized();
    };

    match state.service.validate_session(cookie.value()).await {
        Ok(Some(session)) => Json(UserInfoResponse::from(session)).into_response(),
        Ok(None) => unauthorized(),
        Err(e) => error_response(&e),
    }
}

fn unauthorized() -> Response {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorBody {
            error: "unauthorized".to_string(),
            message: AuthError::invalid_token("no valid session").to_string(),
        }),
    )
        .into_response()
}
