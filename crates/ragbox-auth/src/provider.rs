//! Identity provider catalog.
//!
//! Static endpoint templates for known providers (Google, Azure AD, Okta,
//! Keycloak) plus a constructor for arbitrary OIDC-compatible providers.
//! A [`ProviderConfig`] is pure data: the orchestrator consumes whichever
//! one it is given, so adding a provider never touches the flow logic.
//!
//! There is no discovery-document fetch; every endpoint is spelled out
//! here.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::config::ConfigError;

/// Fully-specified configuration for one OIDC identity provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Unique identifier for this provider (e.g., "google", "okta").
    pub id: String,

    /// Human-readable name for display.
    pub name: String,

    /// Issuer string, compared verbatim against the `iss` claim.
    pub issuer: String,

    /// Authorization endpoint the browser is redirected to.
    pub authorization_endpoint: Url,

    /// Token endpoint for the authorization-code exchange.
    pub token_endpoint: Url,

    /// UserInfo endpoint, where the provider publishes one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<Url>,

    /// JSON Web Key Set endpoint for ID-token signature keys.
    pub jwks_uri: Url,

    /// OAuth client id registered with the provider.
    pub client_id: String,

    /// OAuth client secret (None for public clients).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_secret: Option<String>,

    /// Scopes requested at login.
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Claim carrying the user's group names.
    #[serde(default = "default_groups_claim")]
    pub groups_claim: String,
}

fn default_scopes() -> Vec<String> {
    vec![
        "openid".to_string(),
        "email".to_string(),
        "profile".to_string(),
    ]
}

fn default_groups_claim() -> String {
    "groups".to_string()
}

impl ProviderConfig {
    /// Creates a provider from explicit endpoints.
    #[must_use]
    pub fn custom(
        id: impl Into<String>,
        name: impl Into<String>,
        issuer: impl Into<String>,
        authorization_endpoint: Url,
        token_endpoint: Url,
        jwks_uri: Url,
        client_id: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            issuer: issuer.into(),
            authorization_endpoint,
            token_endpoint,
            userinfo_endpoint: None,
            jwks_uri,
            client_id: client_id.into(),
            client_secret: None,
            scopes: default_scopes(),
            groups_claim: default_groups_claim(),
        }
    }

    /// Google's published OAuth 2.0 endpoints.
    ///
    /// # Errors
    ///
    /// Never fails in practice; the template URLs are static.
    pub fn google(client_id: impl Into<String>) -> Result<Self, ConfigError> {
        Ok(Self::custom(
            "google",
            "Google",
            "https://accounts.google.com",
            parse_endpoint("https://accounts.google.com/o/oauth2/v2/auth")?,
            parse_endpoint("https://oauth2.googleapis.com/token")?,
            parse_endpoint("https://www.googleapis.com/oauth2/v3/certs")?,
            client_id,
        )
        .with_userinfo_endpoint(parse_endpoint(
            "https://openidconnect.googleapis.com/v1/userinfo",
        )?))
    }

    /// Azure AD (Entra ID) endpoints for a tenant.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the tenant produces an
    /// unparseable URL.
    pub fn azure(tenant: &str, client_id: impl Into<String>) -> Result<Self, ConfigError> {
        let base = format!("https://login.microsoftonline.com/{tenant}");
        Ok(Self::custom(
            "azure",
            "Azure AD",
            format!("{base}/v2.0"),
            parse_endpoint(&format!("{base}/oauth2/v2.0/authorize"))?,
            parse_endpoint(&format!("{base}/oauth2/v2.0/token"))?,
            parse_endpoint(&format!("{base}/discovery/v2.0/keys"))?,
            client_id,
        )
        .with_userinfo_endpoint(parse_endpoint(
            "https://graph.microsoft.com/oidc/userinfo",
        )?))
    }

    /// Okta endpoints for an org domain, using the default authorization
    /// server.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the domain produces an
    /// unparseable URL.
    pub fn okta(domain: &str, client_id: impl Into<String>) -> Result<Self, ConfigError> {
        let issuer = format!("https://{domain}/oauth2/default");
        Ok(Self::custom(
            "okta",
            "Okta",
            issuer.clone(),
            parse_endpoint(&format!("{issuer}/v1/authorize"))?,
            parse_endpoint(&format!("{issuer}/v1/token"))?,
            parse_endpoint(&format!("{issuer}/v1/keys"))?,
            client_id,
        )
        .with_userinfo_endpoint(parse_endpoint(&format!("{issuer}/v1/userinfo"))?))
    }

    /// Keycloak endpoints for a realm.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if the base URL or realm
    /// produces an unparseable URL.
    pub fn keycloak(
        base_url: &str,
        realm: &str,
        client_id: impl Into<String>,
    ) -> Result<Self, ConfigError> {
        let issuer = format!("{}/realms/{realm}", base_url.trim_end_matches('/'));
        Ok(Self::custom(
            "keycloak",
            "Keycloak",
            issuer.clone(),
            parse_endpoint(&format!("{issuer}/protocol/openid-connect/auth"))?,
            parse_endpoint(&format!("{issuer}/protocol/openid-connect/token"))?,
            parse_endpoint(&format!("{issuer}/protocol/openid-connect/certs"))?,
            client_id,
        )
        .with_userinfo_endpoint(parse_endpoint(&format!(
            "{issuer}/protocol/openid-connect/userinfo"
        ))?))
    }

    /// Sets the client secret.
    #[must_use]
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Sets the requested scopes.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<impl Into<String>>) -> Self {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Sets the userinfo endpoint.
    #[must_use]
    pub fn with_userinfo_endpoint(mut self, endpoint: Url) -> Self {
        self.userinfo_endpoint = Some(endpoint);
        self
    }

    /// Sets the claim carrying group names.
    #[must_use]
    pub fn with_groups_claim(mut self, claim: impl Into<String>) -> Self {
        self.groups_claim = claim.into();
        self
    }

    /// Returns `true` if this provider uses a confidential client.
    #[must_use]
    pub fn is_confidential(&self) -> bool {
        self.client_secret.is_some()
    }
}

fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    Url::parse(raw)
        .map_err(|e| ConfigError::InvalidValue(format!("invalid provider endpoint '{raw}': {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_google_preset() {
        let provider = ProviderConfig::google("client-123").unwrap();
        assert_eq!(provider.id, "google");
        assert_eq!(provider.issuer, "https://accounts.google.com");
        assert_eq!(
            provider.token_endpoint.as_str(),
            "https://oauth2.googleapis.com/token"
        );
        assert!(provider.userinfo_endpoint.is_some());
        assert!(!provider.is_confidential());
    }

    #[test]
    fn test_azure_preset_interpolates_tenant() {
        let provider = ProviderConfig::azure("contoso-tenant", "client-456").unwrap();
        assert_eq!(
            provider.issuer,
            "https://login.microsoftonline.com/contoso-tenant/v2.0"
        );
        assert!(
            provider
                .jwks_uri
                .as_str()
                .contains("contoso-tenant/discovery/v2.0/keys")
        );
    }

    #[test]
    fn test_okta_preset() {
        let provider = ProviderConfig::okta("dev-1234.okta.com", "client").unwrap();
        assert_eq!(provider.issuer, "https://dev-1234.okta.com/oauth2/default");
        assert_eq!(
            provider.authorization_endpoint.as_str(),
            "https://dev-1234.okta.com/oauth2/default/v1/authorize"
        );
    }

    #[test]
    fn test_keycloak_preset_trims_trailing_slash() {
        let provider = ProviderConfig::keycloak("https://sso.example.com/", "main", "rag").unwrap();
        assert_eq!(provider.issuer, "https://sso.example.com/realms/main");
        assert_eq!(
            provider.token_endpoint.as_str(),
            "https://sso.example.com/realms/main/protocol/openid-connect/token"
        );
    }

    #[test]
    fn test_custom_builder() {
        let provider = ProviderConfig::custom(
            "corp",
            "Corp SSO",
            "https://sso.corp.example.com",
            Url::parse("https://sso.corp.example.com/authorize").unwrap(),
            Url::parse("https://sso.corp.example.com/token").unwrap(),
            Url::parse("https://sso.corp.example.com/jwks").unwrap(),
            "ragbox",
        )
        .with_client_secret("s3cret")
        .with_scopes(vec!["openid", "email"])
        .with_groups_claim("memberOf");

        assert!(provider.is_confidential());
        assert_eq!(provider.scopes, vec!["openid", "email"]);
        assert_eq!(provider.groups_claim, "memberOf");
    }

    #[test]
    fn test_default_scopes_and_groups_claim() {
        let provider = ProviderConfig::google("c").unwrap();
        assert_eq!(provider.scopes, vec!["openid", "email", "profile"]);
        assert_eq!(provider.groups_claim, "groups");
    }

    #[test]
    fn test_serde_roundtrip() {
        let provider = ProviderConfig::google("client-123").unwrap();
        let json = serde_json::to_string(&provider).unwrap();
        let parsed: ProviderConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.issuer, provider.issuer);
        assert_eq!(parsed.client_id, provider.client_id);
        // Absent secret is not serialized
        assert!(!json.contains("client_secret"));
    }
}
