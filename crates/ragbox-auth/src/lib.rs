//! # ragbox-auth
//!
//! Authentication subsystem for the RAG-in-a-Box server.
//!
//! This crate provides:
//! - OAuth 2.0 authorization-code login with PKCE against external OIDC
//!   providers
//! - ID-token validation against cached, rate-limited provider key sets
//! - Session and one-time authorization-state storage (in-process and
//!   PostgreSQL backends)
//! - Claim-to-principal mapping for permission-aware retrieval
//! - A long-lived access-token registry for machine clients
//!
//! ## Modules
//!
//! - [`config`] - Subsystem configuration
//! - [`provider`] - Identity provider catalog
//! - [`oidc`] - The login-flow orchestrator
//! - [`validator`] / [`jwks`] - ID-token validation and key caching
//! - [`claims`] / [`principal`] - Claim-to-identity mapping
//! - [`store`] - Storage traits and the in-process backend
//! - [`access_token`] - Machine-client token registry
//! - [`http`] - Axum handlers for the OAuth and admin surfaces
//! - [`cleanup`] - Periodic expiry sweep

pub mod access_token;
pub mod claims;
pub mod cleanup;
pub mod config;
pub mod error;
pub mod http;
pub mod jwks;
pub mod oidc;
pub mod pkce;
pub mod principal;
pub mod provider;
pub mod session;
pub mod store;
pub mod validator;

pub use access_token::{
    AccessTokenGrant, AccessTokenRecord, AccessTokenService, CreatedAccessToken, NewAccessToken,
    Scope,
};
pub use claims::ClaimMapper;
pub use cleanup::spawn_cleanup;
pub use config::{AuthConfig, ConfigError, CookieConfig, JwksConfig};
pub use error::AuthError;
pub use http::{OAuthState, TokenAdminState, admin_token_router, oauth_router};
pub use jwks::JwksCache;
pub use oidc::{CallbackOutcome, LoginInitiation, OidcService};
pub use principal::{
    Authorization, MemoryPrincipalRegistry, PrincipalKind, PrincipalRef, PrincipalRegistry,
};
pub use provider::ProviderConfig;
pub use session::{AuthorizationState, OAuthSessionData};
pub use store::{
    AccessTokenStore, AuthStore, CleanupStats, MemoryAccessTokenStore, MemoryAuthStore,
};
pub use validator::{IdTokenValidator, ValidatedIdToken};

/// Type alias for authentication results.
pub type AuthResult<T> = Result<T, AuthError>;
