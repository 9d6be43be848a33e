//! Integration tests for token acquisition

use std::time::Duration;

use putsync_core::config::{AuthConfig, RemoteConfig};
use putsync_remote::auth::{authenticate, exchange_credentials, validate_token};
use putsync_remote::RemoteError;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

const TIMEOUT: Duration = Duration::from_secs(5);

fn remote_config(server: &MockServer) -> RemoteConfig {
    RemoteConfig {
        api_base_url: server.uri(),
        client_id: "4785".to_string(),
        client_secret: "s3cret".to_string(),
        ..RemoteConfig::default()
    }
}

#[tokio::test]
async fn test_exchange_credentials_returns_token() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/oauth2/authorizations/clients/4785/laptop"))
        .and(query_param("client_secret", "s3cret"))
        .and(query_param("client_name", "laptop"))
        // "alice:pw" in base64
        .and(header("authorization", "Basic YWxpY2U6cHc="))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "tok-1"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let token = exchange_credentials(
        &reqwest::Client::new(),
        &remote_config(&server),
        "laptop",
        "alice",
        "pw",
        TIMEOUT,
    )
    .await
    .unwrap();
    assert_eq!(token, "tok-1");
}

#[tokio::test]
async fn test_exchange_credentials_401_is_invalid_credentials() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let result = exchange_credentials(
        &reqwest::Client::new(),
        &remote_config(&server),
        "laptop",
        "alice",
        "wrong",
        TIMEOUT,
    )
    .await;
    assert!(matches!(result, Err(RemoteError::InvalidCredentials)));
}

#[tokio::test]
async fn test_exchange_credentials_server_error() {
    let server = MockServer::start().await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let result = exchange_credentials(
        &reqwest::Client::new(),
        &remote_config(&server),
        "laptop",
        "alice",
        "pw",
        TIMEOUT,
    )
    .await;
    assert!(matches!(result, Err(RemoteError::UnexpectedStatus(503))));
}

#[tokio::test]
async fn test_password_token_prefix_skips_exchange() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth2/validate"))
        .and(header("authorization", "Bearer abc"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"result": "OK", "user_id": 12})),
        )
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let auth = AuthConfig {
        username: Some("alice".to_string()),
        password: Some("token/abc".to_string()),
        token: None,
    };
    let token = authenticate(&auth, &remote_config(&server), TIMEOUT)
        .await
        .unwrap();
    assert_eq!(token, "abc");
}

#[tokio::test]
async fn test_validate_token_without_user_is_invalid() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/oauth2/validate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"result": "OK", "user_id": null})),
        )
        .mount(&server)
        .await;

    let result = validate_token(&reqwest::Client::new(), &server.uri(), "stale", TIMEOUT).await;
    assert!(matches!(result, Err(RemoteError::InvalidCredentials)));
}
