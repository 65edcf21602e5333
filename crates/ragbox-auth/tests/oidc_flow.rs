//! End-to-end login flow against a stubbed identity provider.
//!
//! The stub serves a real JWKS for a freshly generated RSA key and a
//! token endpoint returning ID tokens signed with it, so the whole
//! pipeline runs: initiate -> callback -> code exchange -> signature
//! validation -> claim mapping -> session.

use std::sync::Arc;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::traits::PublicKeyParts;
use rsa::{RsaPrivateKey, RsaPublicKey};
use serde_json::json;
use time::OffsetDateTime;
use url::Url;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use ragbox_auth::config::AuthConfig;
use ragbox_auth::error::AuthError;
use ragbox_auth::oidc::OidcService;
use ragbox_auth::principal::{MemoryPrincipalRegistry, PrincipalKind};
use ragbox_auth::provider::ProviderConfig;
use ragbox_auth::session::AuthorizationState;
use ragbox_auth::store::{AuthStore, MemoryAuthStore};

const CLIENT_ID: &str = "ragbox-client";
const KID: &str = "itest-key";

/// A stubbed provider: signing key, JWKS endpoint, and the service wired
/// against it. Token-endpoint behavior is mounted per test.
struct TestIdp {
    server: MockServer,
    encoding_key: EncodingKey,
    store: Arc<MemoryAuthStore>,
    service: OidcService,
}

impl TestIdp {
    async fn start() -> Self {
        let mut rng = rand::rngs::OsRng;
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("generate RSA key");
        let public_key = RsaPublicKey::from(&private_key);

        let pem = private_key
            .to_pkcs1_pem(rsa::pkcs1::LineEnding::LF)
            .expect("encode signing key");
        let encoding_key =
            EncodingKey::from_rsa_pem(pem.as_bytes()).expect("load signing key");

        let server = MockServer::start().await;

        let jwks = json!({
            "keys": [{
                "kty": "RSA",
                "kid": KID,
                "use": "sig",
                "alg": "RS256",
                "n": URL_SAFE_NO_PAD.encode(public_key.n().to_bytes_be()),
                "e": URL_SAFE_NO_PAD.encode(public_key.e().to_bytes_be()),
            }]
        });
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(jwks))
            .mount(&server)
            .await;

        let base = server.uri();
        let provider = ProviderConfig::custom(
            "stub",
            "Stub IdP",
            base.clone(),
            Url::parse(&format!("{base}/authorize")).unwrap(),
            Url::parse(&format!("{base}/token")).unwrap(),
            Url::parse(&format!("{base}/jwks")).unwrap(),
            CLIENT_ID,
        );

        let config = AuthConfig::new(Url::parse("http://app.local/oauth/callback").unwrap())
            .with_allow_http(true);

        let store = Arc::new(MemoryAuthStore::new());
        let service = OidcService::new(
            provider,
            config,
            Arc::clone(&store) as Arc<dyn AuthStore>,
            Arc::new(MemoryPrincipalRegistry::new()),
        )
        .unwrap();

        Self {
            server,
            encoding_key,
            store,
            service,
        }
    }

    fn sign(&self, claims: &serde_json::Value) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = Some(KID.to_string());
        encode(&header, claims, &self.encoding_key).expect("sign test token")
    }

    /// Claims a well-behaved provider would assert for user u1.
    fn good_claims(&self) -> serde_json::Value {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        json!({
            "iss": self.server.uri(),
            "sub": "u1",
            "aud": CLIENT_ID,
            "exp": now + 3600,
            "iat": now,
            "email": "u1@example.com",
            "name": "User One",
            "groups": ["eng"],
        })
    }

    /// Mounts a token endpoint returning the given ID token.
    async fn mount_token_endpoint(&self, id_token: String) {
        Mock::given(method("POST"))
            .and(path("/token"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "access_token": "provider-access-token",
                "token_type": "Bearer",
                "expires_in": 3600,
                "id_token": id_token,
            })))
            .mount(&self.server)
            .await;
    }
}

#[tokio::test]
async fn test_full_login_flow_and_state_replay() {
    let idp = TestIdp::start().await;
    idp.mount_token_endpoint(idp.sign(&idp.good_claims())).await;

    // Initiate: authorization URL carries state + PKCE challenge
    let initiation = idp
        .service
        .initiate_login(Some("/docs".to_string()))
        .await
        .unwrap();
    let params: std::collections::HashMap<_, _> =
        initiation.authorization_url.query_pairs().collect();
    assert_eq!(params["state"], initiation.state.as_str());
    assert_eq!(params["code_challenge_method"], "S256");

    // Callback: exchanges the code, validates the token, creates a session
    let outcome = idp
        .service
        .handle_callback("good-code", &initiation.state)
        .await
        .unwrap();
    assert_eq!(outcome.session.user_id, "u1@example.com");
    assert_eq!(outcome.session.email.as_deref(), Some("u1@example.com"));
    assert_eq!(outcome.session.groups, vec!["eng"]);
    assert_eq!(outcome.session.provider, "stub");
    assert_eq!(outcome.redirect_after.as_deref(), Some("/docs"));

    // The session resolves and maps to principals
    let session = idp
        .service
        .validate_session(&outcome.session.id)
        .await
        .unwrap()
        .expect("session is live");
    assert_eq!(session.user_id, "u1@example.com");

    let authorization = idp
        .service
        .get_authorization(&outcome.session.id)
        .await
        .unwrap()
        .expect("authorization resolves");
    assert_eq!(authorization.user.name, "u1@example.com");
    assert_eq!(authorization.user.kind, PrincipalKind::User);
    assert_eq!(authorization.groups.len(), 1);
    assert_eq!(authorization.groups[0].name, "eng");

    // Replay: the state was consumed by the first callback
    let err = idp
        .service
        .handle_callback("good-code", &initiation.state)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState));

    // Logout is unconditional and idempotent
    idp.service.logout(&outcome.session.id).await.unwrap();
    idp.service.logout(&outcome.session.id).await.unwrap();
    assert!(
        idp.service
            .validate_session(&outcome.session.id)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn test_expired_state_then_invalid_state() {
    let idp = TestIdp::start().await;
    idp.mount_token_endpoint(idp.sign(&idp.good_claims())).await;

    let mut state = AuthorizationState::new("s-exp", "verifier", None, Duration::from_secs(300));
    state.expires_at = OffsetDateTime::now_utc() - time::Duration::seconds(1);
    idp.store.put_state(state).await.unwrap();

    let err = idp
        .service
        .handle_callback("good-code", "s-exp")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::StateExpired));

    // Expiry consumed the state; the retry sees InvalidState
    let err = idp
        .service
        .handle_callback("good-code", "s-exp")
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState));
}

#[tokio::test]
async fn test_expired_id_token() {
    let idp = TestIdp::start().await;
    let mut claims = idp.good_claims();
    let now = OffsetDateTime::now_utc().unix_timestamp();
    claims["iat"] = json!(now - 7200);
    claims["exp"] = json!(now - 3600);
    idp.mount_token_endpoint(idp.sign(&claims)).await;

    let initiation = idp.service.initiate_login(None).await.unwrap();
    let err = idp
        .service
        .handle_callback("good-code", &initiation.state)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenExpired));
}

#[tokio::test]
async fn test_wrong_audience() {
    let idp = TestIdp::start().await;
    let mut claims = idp.good_claims();
    claims["aud"] = json!("someone-else");
    idp.mount_token_endpoint(idp.sign(&claims)).await;

    let initiation = idp.service.initiate_login(None).await.unwrap();
    let err = idp
        .service
        .handle_callback("good-code", &initiation.state)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidAudience));
}

#[tokio::test]
async fn test_wrong_issuer() {
    let idp = TestIdp::start().await;
    let mut claims = idp.good_claims();
    claims["iss"] = json!("https://evil.example.com");
    idp.mount_token_endpoint(idp.sign(&claims)).await;

    let initiation = idp.service.initiate_login(None).await.unwrap();
    let err = idp
        .service
        .handle_callback("good-code", &initiation.state)
        .await
        .unwrap_err();
    match err {
        AuthError::InvalidIssuer { expected, actual } => {
            assert_eq!(expected, idp.server.uri());
            assert_eq!(actual, "https://evil.example.com");
        }
        other => panic!("expected InvalidIssuer, got {other:?}"),
    }
}

#[tokio::test]
async fn test_provider_rejects_code_exchange() {
    let idp = TestIdp::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "code already redeemed",
        })))
        .mount(&idp.server)
        .await;

    let initiation = idp.service.initiate_login(None).await.unwrap();
    let err = idp
        .service
        .handle_callback("stale-code", &initiation.state)
        .await
        .unwrap_err();
    match err {
        AuthError::TokenExchange { message } => {
            assert!(message.contains("invalid_grant"));
        }
        other => panic!("expected TokenExchange, got {other:?}"),
    }

    // The failed exchange still consumed the state: no retry path
    let err = idp
        .service
        .handle_callback("stale-code", &initiation.state)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidState));
}

#[tokio::test]
async fn test_token_response_without_id_token() {
    let idp = TestIdp::start().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "provider-access-token",
            "token_type": "Bearer",
        })))
        .mount(&idp.server)
        .await;

    let initiation = idp.service.initiate_login(None).await.unwrap();
    let err = idp
        .service
        .handle_callback("good-code", &initiation.state)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::TokenExchange { .. }));
}

#[tokio::test]
async fn test_token_signed_by_unknown_key() {
    let idp = TestIdp::start().await;

    // A second key the JWKS has never published
    let mut rng = rand::rngs::OsRng;
    let rogue = RsaPrivateKey::new(&mut rng, 2048).unwrap();
    let pem = rogue.to_pkcs1_pem(rsa::pkcs1::LineEnding::LF).unwrap();
    let rogue_key = EncodingKey::from_rsa_pem(pem.as_bytes()).unwrap();

    let mut header = Header::new(Algorithm::RS256);
    header.kid = Some("rogue-key".to_string());
    let id_token = encode(&header, &idp.good_claims(), &rogue_key).unwrap();
    idp.mount_token_endpoint(id_token).await;

    let initiation = idp.service.initiate_login(None).await.unwrap();
    let err = idp
        .service
        .handle_callback("good-code", &initiation.state)
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::InvalidToken { .. }));
}
