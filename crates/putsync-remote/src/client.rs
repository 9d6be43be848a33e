//! put.io REST API client
//!
//! Provides a typed HTTP client for the put.io v2 API. Handles the
//! authorization header, per-call timeouts, JSON deserialization and the
//! mapping of error statuses to [`RemoteError`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use putsync_remote::PutioClient;
//! use putsync_core::ports::IRemoteFileService;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let client = PutioClient::with_base_url("access-token", "https://api.put.io/v2");
//! for file in client.list(0).await? {
//!     println!("{} {}", file.id, file.name);
//! }
//! # Ok(())
//! # }
//! ```

use std::io;
use std::time::Duration;

use anyhow::{Context, Result};
use futures_util::TryStreamExt;
use reqwest::{header, Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use tokio_util::io::StreamReader;
use tracing::debug;

use putsync_core::config::RemoteConfig;
use putsync_core::ports::{ByteReader, IRemoteFileService, RemoteFile, UploadResult};

use crate::RemoteError;

/// Upper bound for a single API call when none is configured
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Content type put.io reports for folders
const FOLDER_CONTENT_TYPE: &str = "application/x-directory";

// ============================================================================
// put.io API response types
// ============================================================================

/// A file or folder as serialized by the API
#[derive(Debug, Deserialize)]
pub(crate) struct ApiFile {
    id: i64,
    name: String,
    #[serde(default)]
    parent_id: Option<i64>,
    #[serde(default)]
    size: Option<u64>,
    #[serde(default)]
    crc32: Option<String>,
    #[serde(default)]
    content_type: Option<String>,
    #[serde(default)]
    file_type: Option<String>,
}

impl ApiFile {
    fn is_dir(&self) -> bool {
        self.file_type.as_deref() == Some("FOLDER")
            || self.content_type.as_deref() == Some(FOLDER_CONTENT_TYPE)
    }
}

impl From<ApiFile> for RemoteFile {
    fn from(f: ApiFile) -> Self {
        let is_dir = f.is_dir();
        RemoteFile {
            id: f.id,
            parent_id: f.parent_id.unwrap_or(0),
            name: f.name,
            size: if is_dir { 0 } else { f.size.unwrap_or(0) },
            crc32: if is_dir { String::new() } else { f.crc32.unwrap_or_default() },
            is_dir,
        }
    }
}

/// Response of `GET /files/list` and `POST /files/list/continue`
#[derive(Debug, Deserialize)]
struct ListResponse {
    files: Vec<ApiFile>,
    #[serde(default)]
    cursor: Option<String>,
}

/// Response wrapping a single file
#[derive(Debug, Deserialize)]
struct FileResponse {
    file: ApiFile,
}

/// Response of `GET /files/{id}/url`
#[derive(Debug, Deserialize)]
struct UrlResponse {
    url: String,
}

// ============================================================================
// PutioClient
// ============================================================================

/// HTTP client for put.io API calls
///
/// Every request except the two streaming transfers is bounded by
/// `request_timeout`.
pub struct PutioClient {
    /// The underlying HTTP client
    client: Client,
    /// Base URL for API requests, without a trailing slash
    base_url: String,
    /// Endpoint that creates tus upload sessions
    upload_url: String,
    /// OAuth access token
    access_token: String,
    /// Per-call time limit
    request_timeout: Duration,
}

impl PutioClient {
    /// Creates a client for the endpoints in `config`
    ///
    /// # Arguments
    /// * `access_token` - A valid put.io access token
    /// * `config` - Remote endpoint configuration
    /// * `request_timeout` - Upper bound for each non-streaming call
    pub fn new(
        access_token: impl Into<String>,
        config: &RemoteConfig,
        request_timeout: Duration,
    ) -> Self {
        Self {
            client: Client::new(),
            base_url: config.api_base_url.trim_end_matches('/').to_string(),
            upload_url: config.upload_url.clone(),
            access_token: access_token.into(),
            request_timeout,
        }
    }

    /// Creates a client whose API and upload endpoints live under `base_url`
    /// (useful for testing)
    pub fn with_base_url(access_token: impl Into<String>, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client: Client::new(),
            upload_url: format!("{}/files/", base_url),
            base_url,
            access_token: access_token.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Overrides the per-call time limit
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Returns a reference to the current access token
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Returns the endpoint that creates upload sessions
    pub fn upload_url(&self) -> &str {
        &self.upload_url
    }

    pub(crate) fn http_client(&self) -> &Client {
        &self.client
    }

    pub(crate) fn request_timeout(&self) -> Duration {
        self.request_timeout
    }

    /// Creates an authenticated, time-limited request for an API path
    ///
    /// # Arguments
    /// * `method` - HTTP method
    /// * `path` - API path relative to the base URL (e.g. "/files/list")
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        self.client
            .request(method, &url)
            .bearer_auth(&self.access_token)
            .timeout(self.request_timeout)
    }

    async fn fetch_file(&self, builder: RequestBuilder, what: &str) -> Result<RemoteFile> {
        let response = send_checked(builder, what).await?;
        let body: FileResponse = response
            .json()
            .await
            .with_context(|| format!("Failed to parse {} response", what))?;
        Ok(body.file.into())
    }
}

/// Sends a request and maps error statuses to [`RemoteError`]
pub(crate) async fn send_checked(builder: RequestBuilder, what: &str) -> Result<Response, RemoteError> {
    let response = builder.send().await?;
    check_status(response, what)
}

fn check_status(response: Response, what: &str) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    debug!(status = status.as_u16(), what, "API call failed");
    Err(match status {
        StatusCode::UNAUTHORIZED => RemoteError::Unauthorized(what.to_string()),
        StatusCode::NOT_FOUND => RemoteError::NotFound(what.to_string()),
        other => RemoteError::UnexpectedStatus(other.as_u16()),
    })
}

// ============================================================================
// IRemoteFileService implementation
// ============================================================================

#[async_trait::async_trait]
impl IRemoteFileService for PutioClient {
    #[tracing::instrument(skip(self))]
    async fn list(&self, folder_id: i64) -> Result<Vec<RemoteFile>> {
        let response = send_checked(
            self.request(Method::GET, "/files/list")
                .query(&[("parent_id", folder_id.to_string())]),
            "files/list",
        )
        .await
        .with_context(|| format!("Failed to list folder {}", folder_id))?;
        let mut page: ListResponse = response
            .json()
            .await
            .context("Failed to parse files/list response")?;

        let mut files: Vec<RemoteFile> = page.files.drain(..).map(RemoteFile::from).collect();
        while let Some(cursor) = page.cursor.take().filter(|c| !c.is_empty()) {
            debug!(folder_id, fetched = files.len(), "Fetching next listing page");
            let response = send_checked(
                self.request(Method::POST, "/files/list/continue")
                    .form(&[("cursor", cursor.as_str())]),
                "files/list/continue",
            )
            .await
            .with_context(|| format!("Failed to continue listing folder {}", folder_id))?;
            page = response
                .json()
                .await
                .context("Failed to parse files/list/continue response")?;
            files.extend(page.files.drain(..).map(RemoteFile::from));
        }

        debug!(folder_id, count = files.len(), "Listed folder");
        Ok(files)
    }

    #[tracing::instrument(skip(self))]
    async fn get(&self, file_id: i64) -> Result<RemoteFile> {
        self.fetch_file(
            self.request(Method::GET, &format!("/files/{}", file_id)),
            "files/get",
        )
        .await
        .with_context(|| format!("Failed to get file {}", file_id))
    }

    #[tracing::instrument(skip(self))]
    async fn create_folder(&self, name: &str, parent_id: i64) -> Result<RemoteFile> {
        let parent = parent_id.to_string();
        self.fetch_file(
            self.request(Method::POST, "/files/create-folder")
                .form(&[("name", name), ("parent_id", parent.as_str())]),
            "files/create-folder",
        )
        .await
        .with_context(|| format!("Failed to create folder {:?} under {}", name, parent_id))
    }

    #[tracing::instrument(skip(self))]
    async fn delete(&self, file_ids: &[i64]) -> Result<()> {
        let ids = file_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        send_checked(
            self.request(Method::POST, "/files/delete")
                .form(&[("file_ids", ids.as_str())]),
            "files/delete",
        )
        .await
        .with_context(|| format!("Failed to delete files [{}]", ids))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn move_file(&self, file_id: i64, parent_id: i64, new_name: &str) -> Result<()> {
        let file = file_id.to_string();
        let parent = parent_id.to_string();
        send_checked(
            self.request(Method::POST, "/files/move").form(&[
                ("file_id", file.as_str()),
                ("parent_id", parent.as_str()),
                ("name", new_name),
            ]),
            "files/move",
        )
        .await
        .with_context(|| format!("Failed to move file {} to {}/{:?}", file_id, parent_id, new_name))?;
        Ok(())
    }

    #[tracing::instrument(skip(self))]
    async fn open_read(&self, file_id: i64, offset: u64) -> Result<ByteReader> {
        let response = send_checked(
            self.request(Method::GET, &format!("/files/{}/url", file_id)),
            "files/url",
        )
        .await
        .with_context(|| format!("Failed to get download URL of file {}", file_id))?;
        let UrlResponse { url } = response
            .json()
            .await
            .context("Failed to parse files/url response")?;

        // Only the response headers are time-limited; the body is guarded
        // by the caller's stall watchdog.
        let request = self
            .client
            .get(&url)
            .header(header::RANGE, format!("bytes={}-", offset))
            .send();
        let response = tokio::time::timeout(self.request_timeout, request)
            .await
            .map_err(|_| RemoteError::Timeout(format!("download of file {}", file_id)))?
            .context("Failed to send download request")?;

        if response.status() != StatusCode::PARTIAL_CONTENT {
            return Err(RemoteError::UnexpectedStatus(response.status().as_u16()))
                .with_context(|| format!("Ranged download of file {} from {}", file_id, offset));
        }

        debug!(file_id, offset, "Opened ranged download");
        let stream = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        Ok(Box::new(StreamReader::new(Box::pin(stream))))
    }

    async fn create_upload(&self, name: &str, parent_id: i64, size: u64) -> Result<String> {
        crate::tus::create_upload(self, name, parent_id, size).await
    }

    async fn append_upload(
        &self,
        session_url: &str,
        offset: u64,
        body: ByteReader,
    ) -> Result<UploadResult> {
        crate::tus::send_file(self, session_url, offset, body).await
    }

    async fn upload_offset(&self, session_url: &str) -> Result<u64> {
        crate::tus::get_offset(self, session_url).await
    }

    async fn terminate_upload(&self, session_url: &str) -> Result<()> {
        crate::tus::terminate_upload(self, session_url).await
    }
}
