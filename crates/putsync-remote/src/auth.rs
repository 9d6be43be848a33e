//! Token acquisition for put.io
//!
//! A configured token (or a password of the form `token/<t>`) is validated
//! and used directly. Otherwise the username and password are exchanged for
//! a token bound to this machine's host name.

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, info};

use putsync_core::config::{AuthConfig, RemoteConfig};

use crate::RemoteError;

/// Name this machine registers its token under
pub fn default_client_name() -> String {
    std::env::var("HOSTNAME")
        .ok()
        .or_else(|| std::fs::read_to_string("/etc/hostname").ok())
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "putsync".to_string())
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct ValidateResponse {
    #[serde(default)]
    user_id: Option<i64>,
}

/// Authenticates with the configured credentials and returns an access token
///
/// # Errors
/// Returns `RemoteError::InvalidCredentials` when the service rejects the
/// credentials or none are configured.
pub async fn authenticate(
    auth: &AuthConfig,
    remote: &RemoteConfig,
    timeout: Duration,
) -> Result<String, RemoteError> {
    let client = Client::new();
    if let Some(token) = auth.direct_token() {
        info!("Validating authentication token");
        validate_token(&client, &remote.api_base_url, token, timeout).await?;
        return Ok(token.to_string());
    }

    let (username, password) = auth.credentials().ok_or(RemoteError::InvalidCredentials)?;
    info!(username, "Authenticating");
    exchange_credentials(
        &client,
        remote,
        &default_client_name(),
        username,
        password,
        timeout,
    )
    .await
}

/// Checks that `token` belongs to an account
pub async fn validate_token(
    client: &Client,
    api_base_url: &str,
    token: &str,
    timeout: Duration,
) -> Result<(), RemoteError> {
    let url = format!("{}/oauth2/validate", api_base_url.trim_end_matches('/'));
    let response = client
        .get(&url)
        .bearer_auth(token)
        .timeout(timeout)
        .send()
        .await?;

    match response.status() {
        StatusCode::UNAUTHORIZED => return Err(RemoteError::InvalidCredentials),
        s if !s.is_success() => return Err(RemoteError::UnexpectedStatus(s.as_u16())),
        _ => {}
    }

    let body: ValidateResponse = response
        .json()
        .await
        .map_err(|e| RemoteError::InvalidResponse(format!("oauth2/validate: {}", e)))?;
    match body.user_id {
        Some(user_id) => {
            debug!(user_id, "Token is valid");
            Ok(())
        }
        None => Err(RemoteError::InvalidCredentials),
    }
}

/// Exchanges a username and password for an access token
///
/// # Arguments
/// * `client_name` - Host name the token is registered under
pub async fn exchange_credentials(
    client: &Client,
    remote: &RemoteConfig,
    client_name: &str,
    username: &str,
    password: &str,
    timeout: Duration,
) -> Result<String, RemoteError> {
    let mut url = url::Url::parse(&format!(
        "{}/oauth2/authorizations/clients/",
        remote.api_base_url.trim_end_matches('/')
    ))
    .map_err(|e| RemoteError::InvalidResponse(format!("invalid API URL: {}", e)))?;
    url.path_segments_mut()
        .map_err(|_| RemoteError::InvalidResponse("API URL cannot have a path".to_string()))?
        .pop_if_empty()
        .push(&remote.client_id)
        .push(client_name);
    url.query_pairs_mut()
        .append_pair("client_secret", &remote.client_secret)
        .append_pair("client_name", client_name);

    let response = client
        .put(url)
        .basic_auth(username, Some(password))
        .timeout(timeout)
        .send()
        .await?;

    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(RemoteError::InvalidCredentials);
    }
    if status.is_client_error() || status.is_server_error() {
        return Err(RemoteError::UnexpectedStatus(status.as_u16()));
    }

    let body: TokenResponse = response
        .json()
        .await
        .map_err(|e| RemoteError::InvalidResponse(format!("json decode error: {}", e)))?;
    info!("Authenticated");
    Ok(body.access_token)
}
