//! Principal registry seam.
//!
//! Authorization decisions downstream (permission-aware retrieval) are
//! expressed in terms of principals — internal identity records for users
//! and groups. The registry itself lives outside this subsystem; the
//! claim mapper only needs idempotent "resolve or create" operations, so
//! that is the whole interface.

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AuthResult;

/// What kind of identity a principal names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PrincipalKind {
    /// An individual user.
    User,
    /// A named group of users.
    Group,
}

/// Reference to an internal identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrincipalRef {
    /// Stable internal id.
    pub id: String,

    /// User or group.
    pub kind: PrincipalKind,

    /// The key the principal was registered under (email, subject, or
    /// group name).
    pub name: String,
}

/// The authorization value consumed by the permission-aware search path.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Authorization {
    /// The authenticated user's principal.
    pub user: PrincipalRef,

    /// Principals for every group the user belongs to.
    pub groups: Vec<PrincipalRef>,
}

/// Resolve-or-create access to the identity/group registry.
///
/// Both operations are idempotent: registering the same key twice returns
/// the same principal, never a duplicate record.
#[async_trait]
pub trait PrincipalRegistry: Send + Sync {
    /// Resolves (or creates) the user principal for an identity key.
    async fn ensure_user(&self, key: &str, display_name: Option<&str>)
    -> AuthResult<PrincipalRef>;

    /// Resolves (or creates) the group principal for a group name.
    async fn ensure_group(&self, name: &str) -> AuthResult<PrincipalRef>;
}

/// In-process principal registry.
///
/// Suitable for tests and single-instance deployments; state is lost on
/// restart.
#[derive(Debug, Default)]
pub struct MemoryPrincipalRegistry {
    users: DashMap<String, PrincipalRef>,
    groups: DashMap<String, PrincipalRef>,
}

impl MemoryPrincipalRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PrincipalRegistry for MemoryPrincipalRegistry {
    async fn ensure_user(
        &self,
        key: &str,
        _display_name: Option<&str>,
    ) -> AuthResult<PrincipalRef> {
        let principal = self
            .users
            .entry(key.to_string())
            .or_insert_with(|| PrincipalRef {
                id: Uuid::new_v4().to_string(),
                kind: PrincipalKind::User,
                name: key.to_string(),
            })
            .clone();
        Ok(principal)
    }

    async fn ensure_group(&self, name: &str) -> AuthResult<PrincipalRef> {
        let principal = self
            .groups
            .entry(name.to_string())
            .or_insert_with(|| PrincipalRef {
                id: Uuid::new_v4().to_string(),
                kind: PrincipalKind::Group,
                name: name.to_string(),
            })
            .clone();
        Ok(principal)
    }
}
