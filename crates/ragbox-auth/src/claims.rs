//! Claim-to-identity mapping.
//!
//! Turns a [`ValidatedIdToken`] into (a) an [`Authorization`] value tied
//! to user/group principals, and (b) a session record to persist. Both
//! are pure given their inputs except for the registry upserts, which are
//! idempotent — repeated logins never duplicate principal records.

use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;

use crate::AuthResult;
use crate::principal::{Authorization, PrincipalRegistry};
use crate::session::OAuthSessionData;
use crate::validator::ValidatedIdToken;

/// Maps validated claims onto principals and session records.
pub struct ClaimMapper {
    registry: Arc<dyn PrincipalRegistry>,
    session_max_age: Duration,
}

impl ClaimMapper {
    /// Creates a mapper writing through the given principal registry.
    #[must_use]
    pub fn new(registry: Arc<dyn PrincipalRegistry>, session_max_age: Duration) -> Self {
        Self {
            registry,
            session_max_age,
        }
    }

    /// The identity key for a token: email when present, subject
    /// otherwise.
    fn identity_key(token: &ValidatedIdToken) -> &str {
        token.email.as_deref().unwrap_or(&token.subject)
    }

    /// Resolves the authorization value for a validated token.
    ///
    /// # Errors
    ///
    /// Propagates registry failures as `Storage` errors.
    pub async fn map_to_authorization(&self, token: &ValidatedIdToken) -> AuthResult<Authorization> {
        self.authorize(
            Self::identity_key(token),
            token.name.as_deref(),
            &token.groups,
        )
        .await
    }

    /// Packages a validated token into a session record with an absolute
    /// expiry.
    #[must_use]
    pub fn map_to_session(&self, token: &ValidatedIdToken, provider: &str) -> OAuthSessionData {
        let now = OffsetDateTime::now_utc();
        OAuthSessionData {
            id: OAuthSessionData::generate_id(),
            user_id: Self::identity_key(token).to_string(),
            email: token.email.clone(),
            name: token.name.clone(),
            groups: token.groups.clone(),
            provider: provider.to_string(),
            created_at: now,
            expires_at: now + self.session_max_age,
        }
    }

    /// Re-derives the authorization value from a stored session.
    ///
    /// The session already carries the identity key and group names the
    /// token produced, so this runs the same principal resolution without
    /// the original token.
    ///
    /// # Errors
    ///
    /// Propagates registry failures as `Storage` errors.
    pub async fn authorize_session(&self, session: &OAuthSessionData) -> AuthResult<Authorization> {
        self.authorize(&session.user_id, session.name.as_deref(), &session.groups)
            .await
    }

    async fn authorize(
        &self,
        user_key: &str,
        display_name: Option<&str>,
        groups: &[String],
    ) -> AuthResult<Authorization> {
        let user = self.registry.ensure_user(user_key, display_name).await?;

        let mut group_refs = Vec::with_capacity(groups.len());
        for group in groups {
            group_refs.push(self.registry.ensure_group(group).await?);
        }

        Ok(Authorization {
            user,
            groups: group_refs,
        })
    }
}
