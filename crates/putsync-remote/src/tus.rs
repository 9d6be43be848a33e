//! Resumable uploads (tus 1.0) to upload.put.io
//!
//! A session is created with the final length up front, then the body is
//! streamed with one `PATCH` per attempt. An interrupted attempt is resumed by
//! asking the server for its offset with `HEAD`.
//!
//! The session endpoints authenticate with `Authorization: token <t>` rather
//! than the bearer scheme used by the REST API.

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use reqwest::{header, Body, RequestBuilder, Response, StatusCode};
use tokio_util::io::ReaderStream;
use tracing::debug;

use putsync_core::ports::{ByteReader, UploadResult};

use crate::client::PutioClient;
use crate::RemoteError;

const UPLOAD_LENGTH: &str = "upload-length";
const UPLOAD_METADATA: &str = "upload-metadata";
const UPLOAD_OFFSET: &str = "upload-offset";
const FILE_ID: &str = "putio-file-id";
const FILE_CRC32: &str = "putio-file-crc32";
const OFFSET_CONTENT_TYPE: &str = "application/offset+octet-stream";

/// Encodes tus `Upload-Metadata`: comma-separated `key base64(value)` pairs
pub fn encode_metadata(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(k, v)| format!("{} {}", k, BASE64.encode(v.as_bytes())))
        .collect::<Vec<_>>()
        .join(",")
}

fn authorize(client: &PutioClient, builder: RequestBuilder) -> RequestBuilder {
    builder.header(header::AUTHORIZATION, format!("token {}", client.access_token()))
}

fn expect_status(response: Response, expected: StatusCode) -> Result<Response, RemoteError> {
    let status = response.status();
    debug!(status = status.as_u16(), "Upload endpoint answered");
    if status == expected {
        return Ok(response);
    }
    if status == StatusCode::UNAUTHORIZED {
        return Err(RemoteError::Unauthorized("upload".to_string()));
    }
    Err(RemoteError::UnexpectedStatus(status.as_u16()))
}

fn header_str<'a>(response: &'a Response, name: &str) -> Option<&'a str> {
    response.headers().get(name).and_then(|v| v.to_str().ok())
}

/// Creates an upload session for `name` under `parent_id`
///
/// # Returns
/// The session URL from the `Location` header
#[tracing::instrument(skip(client))]
pub async fn create_upload(
    client: &PutioClient,
    name: &str,
    parent_id: i64,
    size: u64,
) -> Result<String> {
    let parent = parent_id.to_string();
    let metadata = encode_metadata(&[
        ("name", name),
        ("parent_id", parent.as_str()),
        ("no-torrent", "true"),
    ]);

    let request = authorize(
        client,
        client
            .http_client()
            .post(client.upload_url())
            .timeout(client.request_timeout())
            .header(header::CONTENT_LENGTH, "0")
            .header(UPLOAD_LENGTH, size.to_string())
            .header(UPLOAD_METADATA, metadata),
    );
    let response = request.send().await.context("Failed to create upload session")?;
    let response = expect_status(response, StatusCode::CREATED)
        .with_context(|| format!("Creating upload session for {:?}", name))?;

    let location = header_str(&response, header::LOCATION.as_str())
        .filter(|l| !l.is_empty())
        .ok_or_else(|| RemoteError::InvalidResponse("missing Location header".to_string()))?;

    debug!(location, "Upload session created");
    Ok(location.to_string())
}

/// Streams `body` to the session starting at `offset`
///
/// The request itself has no overall time limit; callers guard the body
/// with a stall watchdog.
#[tracing::instrument(skip(client, body))]
pub async fn send_file(
    client: &PutioClient,
    session_url: &str,
    offset: u64,
    body: ByteReader,
) -> Result<UploadResult> {
    let request = authorize(
        client,
        client
            .http_client()
            .patch(session_url)
            .header(header::CONTENT_TYPE, OFFSET_CONTENT_TYPE)
            .header(UPLOAD_OFFSET, offset.to_string())
            .body(Body::wrap_stream(ReaderStream::new(body))),
    );
    let response = request.send().await.context("Failed to send upload body")?;
    let response = expect_status(response, StatusCode::NO_CONTENT)?;

    let file_id = header_str(&response, FILE_ID)
        .and_then(|v| v.parse::<i64>().ok())
        .ok_or_else(|| {
            RemoteError::InvalidResponse(format!("cannot parse {} header", FILE_ID))
        })?;
    let crc32 = header_str(&response, FILE_CRC32).unwrap_or_default().to_string();

    debug!(file_id, crc32 = %crc32, "Upload completed");
    Ok(UploadResult { file_id, crc32 })
}

/// Asks the server how many bytes it has received for the session
#[tracing::instrument(skip(client))]
pub async fn get_offset(client: &PutioClient, session_url: &str) -> Result<u64> {
    let request = authorize(
        client,
        client
            .http_client()
            .head(session_url)
            .timeout(client.request_timeout()),
    );
    let response = request.send().await.context("Failed to query upload offset")?;
    let response = expect_status(response, StatusCode::OK)?;

    let offset = header_str(&response, UPLOAD_OFFSET)
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| {
            RemoteError::InvalidResponse(format!("cannot parse {} header", UPLOAD_OFFSET))
        })?;

    debug!(offset, "Server upload offset");
    Ok(offset)
}

/// Discards the session on the server
#[tracing::instrument(skip(client))]
pub async fn terminate_upload(client: &PutioClient, session_url: &str) -> Result<()> {
    let request = authorize(
        client,
        client
            .http_client()
            .delete(session_url)
            .timeout(client.request_timeout()),
    );
    let response = request.send().await.context("Failed to terminate upload")?;
    expect_status(response, StatusCode::NO_CONTENT)?;
    Ok(())
}
