//! Integration tests for the OAuth flow: discovery, authorization URLs,
//! code exchange, and refresh.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{Duration, Utc};
use mangoapps_client::{Client, Config, Error, MemoryTokenStore, PkcePair, Token, TokenStore};
use serde_json::json;
use wiremock::matchers::{any, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn test_config(server: &MockServer) -> Config {
    Config::new("example.mangoapps.com", "test_client", "test_secret")
        .map(|config| config.with_base_url(server.uri()))
        .unwrap()
}

/// Mount a well-formed discovery document and assert it is fetched exactly
/// `expect` times over the test.
async fn mount_discovery(server: &MockServer, expect: u64) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": server.uri(),
            "authorization_endpoint": format!("{}/oauth/authorize", server.uri()),
            "token_endpoint": format!("{}/oauth/token", server.uri()),
            "userinfo_endpoint": format!("{}/oauth/userinfo", server.uri()),
        })))
        .expect(expect)
        .mount(server)
        .await;
}

/// Discovery is resolved on first use and cached for the session; two
/// authorization URLs plus a direct metadata read hit the endpoint once.
#[tokio::test]
async fn discovery_is_fetched_once_per_session() {
    let server = MockServer::start().await;
    mount_discovery(&server, 1).await;

    let client = Client::new(test_config(&server)).unwrap();

    let document = client.oauth().discovery().await.unwrap();
    assert_eq!(document.token_endpoint, format!("{}/oauth/token", server.uri()));

    client.authorization_url("state_1", None, "S256", &[]).await.unwrap();
    client.authorization_url("state_2", None, "S256", &[]).await.unwrap();
}

#[tokio::test]
async fn discovery_missing_token_endpoint_fails() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "issuer": server.uri(),
            "authorization_endpoint": format!("{}/oauth/authorize", server.uri()),
        })))
        .mount(&server)
        .await;

    let client = Client::new(test_config(&server)).unwrap();
    let err = client.authorization_url("state", None, "S256", &[]).await.unwrap_err();

    assert!(matches!(err, Error::Discovery(ref msg) if msg.contains("token_endpoint")));
}

#[tokio::test]
async fn discovery_http_failure_surfaces_status() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let client = Client::new(test_config(&server)).unwrap();
    let err = client.oauth().discovery().await.unwrap_err();

    assert!(matches!(err, Error::Discovery(ref msg) if msg.contains("500")));
}

/// The authorization URL carries the full protocol parameter set, the PKCE
/// challenge when one is supplied, and caller extras.
#[tokio::test]
async fn authorization_url_contains_protocol_params() {
    let server = MockServer::start().await;
    mount_discovery(&server, 1).await;

    let client = Client::new(test_config(&server)).unwrap();
    let pkce = PkcePair::generate();

    let raw = client
        .authorization_url(
            "csrf_state",
            Some(&pkce.challenge),
            "S256",
            &[("prompt".to_string(), "consent".to_string())],
        )
        .await
        .unwrap();

    let parsed = url::Url::parse(&raw).unwrap();
    assert_eq!(parsed.path(), "/oauth/authorize");

    let pairs: Vec<(String, String)> =
        parsed.query_pairs().map(|(k, v)| (k.to_string(), v.to_string())).collect();
    let find = |key: &str| {
        pairs.iter().find(|(k, _)| k.as_str() == key).map(|(_, v)| v.clone())
    };

    assert_eq!(find("response_type").as_deref(), Some("code"));
    assert_eq!(find("client_id").as_deref(), Some("test_client"));
    assert_eq!(find("redirect_uri").as_deref(), Some("https://localhost:3000/oauth/callback"));
    assert_eq!(find("scope").as_deref(), Some("openid profile offline_access"));
    assert_eq!(find("state").as_deref(), Some("csrf_state"));
    assert_eq!(find("code_challenge").as_deref(), Some(pkce.challenge.as_str()));
    assert_eq!(find("code_challenge_method").as_deref(), Some("S256"));
    assert_eq!(find("prompt").as_deref(), Some("consent"));
}

#[tokio::test]
async fn authorization_url_without_challenge_omits_pkce_params() {
    let server = MockServer::start().await;
    mount_discovery(&server, 1).await;

    let client = Client::new(test_config(&server)).unwrap();
    let raw = client.authorization_url("state", None, "S256", &[]).await.unwrap();

    assert!(!raw.contains("code_challenge"));
    assert!(raw.contains("response_type=code"));
}

/// Extra parameters must not be able to override protocol-mandated fields.
#[tokio::test]
async fn extras_cannot_override_protocol_params() {
    let server = MockServer::start().await;
    mount_discovery(&server, 1).await;

    let client = Client::new(test_config(&server)).unwrap();
    let raw = client
        .authorization_url(
            "state",
            None,
            "S256",
            &[
                ("response_type".to_string(), "token".to_string()),
                ("state".to_string(), "forged".to_string()),
                ("login_hint".to_string(), "ada@example.com".to_string()),
            ],
        )
        .await
        .unwrap();

    let parsed = url::Url::parse(&raw).unwrap();
    let response_types: Vec<String> = parsed
        .query_pairs()
        .filter(|(k, _)| k == "response_type")
        .map(|(_, v)| v.to_string())
        .collect();
    assert_eq!(response_types, vec!["code".to_string()]);

    let states: Vec<String> = parsed
        .query_pairs()
        .filter(|(k, _)| k == "state")
        .map(|(_, v)| v.to_string())
        .collect();
    assert_eq!(states, vec!["state".to_string()]);

    // Benign extras still pass through.
    let keys: HashSet<String> = parsed.query_pairs().map(|(k, _)| k.to_string()).collect();
    assert!(keys.contains("login_hint"));
}

/// The code exchange posts the form-encoded grant (with PKCE verifier),
/// returns the minted token, and persists it to the configured store.
#[tokio::test]
async fn exchange_code_returns_and_persists_token() {
    let server = MockServer::start().await;
    mount_discovery(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=auth_code_123"))
        .and(body_string_contains("client_id=test_client"))
        .and(body_string_contains("client_secret=test_secret"))
        .and(body_string_contains("code_verifier=verifier_abc"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "minted_access",
            "token_type": "Bearer",
            "expires_in": 3600,
            "refresh_token": "minted_refresh",
        })))
        .expect(1)
        .mount(&server)
        .await;

    let store = Arc::new(MemoryTokenStore::new());
    let config = test_config(&server).with_token_store(store.clone());
    let client = Client::new(config).unwrap();

    let token = client.authenticate("auth_code_123", Some("verifier_abc")).await.unwrap();

    assert_eq!(token.access_token, "minted_access");
    assert_eq!(token.refresh_token.as_deref(), Some("minted_refresh"));
    let expires_at = token.expires_at.unwrap();
    assert!(expires_at > Utc::now() + Duration::seconds(3500));

    // Persisted on creation.
    let persisted = store.load().await.unwrap().unwrap();
    assert_eq!(persisted, token);

    assert!(client.is_authenticated().await);
}

#[tokio::test]
async fn exchange_code_surfaces_provider_error() {
    let server = MockServer::start().await;
    mount_discovery(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "authorization code is expired",
        })))
        .mount(&server)
        .await;

    let client = Client::new(test_config(&server)).unwrap();
    let err = client.authenticate("stale_code", None).await.unwrap_err();

    match err {
        Error::TokenExchange(msg) => {
            assert!(msg.contains("invalid_grant"));
            assert!(msg.contains("authorization code is expired"));
        }
        other => panic!("expected TokenExchange error, got {other:?}"),
    }
}

/// Refreshing mints a new token without mutating the old one; providers that
/// omit the refresh token from the response keep the previous one.
#[tokio::test]
async fn refresh_mints_new_token_and_inherits_refresh_token() {
    let server = MockServer::start().await;
    mount_discovery(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=old_refresh"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new_access",
            "token_type": "Bearer",
            "expires_in": 3600,
        })))
        .expect(1)
        .mount(&server)
        .await;

    let client = Client::new(test_config(&server)).unwrap();

    let old = Token {
        access_token: "old_access".to_string(),
        refresh_token: Some("old_refresh".to_string()),
        token_type: "Bearer".to_string(),
        expires_at: Some(Utc::now() - Duration::seconds(10)),
    };

    let refreshed = client.oauth().refresh(&old).await.unwrap();

    assert_eq!(refreshed.access_token, "new_access");
    assert_eq!(refreshed.refresh_token.as_deref(), Some("old_refresh"));
    // The old value is untouched.
    assert_eq!(old.access_token, "old_access");
}

/// A token without refresh material short-circuits before any network call.
#[tokio::test]
async fn refresh_without_refresh_token_makes_no_network_call() {
    let server = MockServer::start().await;
    Mock::given(any()).respond_with(ResponseTemplate::new(500)).expect(0).mount(&server).await;

    let client = Client::new(test_config(&server)).unwrap();
    let token = Token {
        access_token: "access_only".to_string(),
        refresh_token: None,
        token_type: "Bearer".to_string(),
        expires_at: None,
    };

    let err = client.oauth().refresh(&token).await.unwrap_err();
    match err {
        Error::TokenExpired(msg) => assert_eq!(msg, "No refresh token available"),
        other => panic!("expected TokenExpired error, got {other:?}"),
    }
}

#[tokio::test]
async fn refresh_failure_wraps_provider_detail() {
    let server = MockServer::start().await;
    mount_discovery(&server, 1).await;

    Mock::given(method("POST"))
        .and(path("/oauth/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "refresh token revoked",
        })))
        .mount(&server)
        .await;

    let client = Client::new(test_config(&server)).unwrap();
    let token = Token {
        access_token: "access".to_string(),
        refresh_token: Some("revoked".to_string()),
        token_type: "Bearer".to_string(),
        expires_at: None,
    };

    let err = client.oauth().refresh(&token).await.unwrap_err();
    match err {
        Error::TokenExpired(msg) => {
            assert!(msg.starts_with("Token refresh failed"));
            assert!(msg.contains("refresh token revoked"));
        }
        other => panic!("expected TokenExpired error, got {other:?}"),
    }
}
