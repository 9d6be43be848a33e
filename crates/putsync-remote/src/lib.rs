//! putsync Remote - put.io API client
//!
//! Provides async clients for:
//! - Token acquisition (direct token or username/password exchange)
//! - Folder listing, creation, deletion and moves via the put.io REST API
//! - Ranged downloads and resumable (tus) uploads
//! - The websocket channel that pushes remote change notifications
//!
//! ## Modules
//!
//! - [`auth`] - Credential exchange and token validation
//! - [`client`] - REST client, implements `IRemoteFileService`
//! - [`tus`] - Resumable upload sessions
//! - [`notifier`] - Websocket change notifier, implements `IChangeNotifier`

pub mod auth;
pub mod client;
pub mod notifier;
pub mod tus;

pub use client::PutioClient;
pub use notifier::WebSocketNotifier;

use thiserror::Error;

/// Errors that can occur when talking to put.io
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The access token was rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// The username/password pair was rejected
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The requested file or folder does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// The service answered with a status the operation does not accept
    #[error("Unexpected status: {0}")]
    UnexpectedStatus(u16),

    /// The call did not complete within its time limit
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A network-level error occurred
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response could not be parsed or was missing data
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl RemoteError {
    /// Returns true if retrying with the same credentials cannot succeed
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            RemoteError::Unauthorized(_) | RemoteError::InvalidCredentials
        )
    }
}

/// Returns true if any error in the chain is an authentication failure
pub fn is_auth_error(err: &anyhow::Error) -> bool {
    err.chain()
        .any(|cause| cause.downcast_ref::<RemoteError>().is_some_and(RemoteError::is_auth))
}
