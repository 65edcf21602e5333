//! Access-token administration endpoints.
//!
//! Create/list/get/delete over the token registry, admin-only. The admin
//! check is an injected capability function — the surrounding application
//! decides what "admin" means (its own JWT middleware, basic auth, ...)
//! and this router only asks the question.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use serde::Serialize;

use crate::access_token::{AccessTokenRecord, AccessTokenService, NewAccessToken};
use crate::http::{error_response, ErrorBody};

/// Capability check deciding whether a request may administer tokens.
pub type AdminGate = Arc<dyn Fn(&HeaderMap) -> bool + Send + Sync>;

/// Shared state for the token-administration endpoints.
#[derive(Clone)]
pub struct TokenAdminState {
    /// The token registry.
    pub service: Arc<AccessTokenService>,
    /// Injected admin capability check.
    pub admin_gate: AdminGate,
}

/// Builds the `/admin/tokens` router.
pub fn admin_token_router(state: TokenAdminState) -> Router {
    Router::new()
        .route("/admin/tokens", get(list_handler).post(create_handler))
        .route(
            "/admin/tokens/{id}",
            get(get_handler).delete(delete_handler),
        )
        .with_state(state)
}

/// Response for a freshly created token. The `token` field is the one
/// and only disclosure of the plaintext.
#[derive(Debug, Serialize)]
pub struct CreateTokenResponse {
    /// The plaintext token.
    pub token: String,
    /// The stored metadata.
    #[serde(flatten)]
    pub record: AccessTokenRecord,
}

fn forbidden() -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(ErrorBody {
            error: "forbidden".to_string(),
            message: "token administration requires an admin identity".to_string(),
        }),
    )
        .into_response()
}

fn not_found(id: &str) -> Response {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            error: "not_found".to_string(),
            message: format!("no access token with id '{id}'"),
        }),
    )
        .into_response()
}

/// Handler for `POST /admin/tokens`.
async fn create_handler(
    State(state): State<TokenAdminState>,
    headers: HeaderMap,
    Json(request): Json<NewAccessToken>,
) -> Response {
    if !(state.admin_gate)(&headers) {
        return forbidden();
    }

    match state.service.create(request).await {
        Ok(created) => (
            StatusCode::CREATED,
            Json(CreateTokenResponse {
                token: created.token,
                record: created.record,
            }),
        )
            .into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handler for `GET /admin/tokens`.
async fn list_handler(State(state): State<TokenAdminState>, headers: HeaderMap) -> Response {
    if !(state.admin_gate)(&headers) {
        return forbidden();
    }

    match state.service.list().await {
        Ok(records) => Json(records).into_response(),
        Err(e) => error_response(&e),
    }
}

/// Handler for `GET /admin/tokens/{id}`.
async fn get_handler(
    State(state): State<TokenAdminState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !(state.admin_gate)(&headers) {
        return forbidden();
    }

    match state.service.get(&id).await {
        Ok(Some(record)) => Json(record).into_response(),
        Ok(None) => not_found(&id),
        Err(e) => error_response(&e),
    }
}

/// Handler for `DELETE /admin/tokens/{id}`.
async fn delete_handler(
    State(state): State<TokenAdminState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Response {
    if !(state.admin_gate)(&headers) {
        return forbidden();
    }

    match state.service.delete(&id).await {
        Ok(true) => StatusCode::NO_CONTENT.into_response(),
        Ok(false) => not_found(&id),
        Err(e) => error_response(&e),
    }
}
