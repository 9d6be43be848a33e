//! Integration tests for resumable upload sessions

use putsync_core::ports::{ByteReader, IRemoteFileService};
use putsync_remote::RemoteError;
use wiremock::matchers::{body_bytes, header, headers, method, path};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn reader(bytes: &'static [u8]) -> ByteReader {
    Box::new(bytes)
}

#[tokio::test]
async fn test_create_upload_sends_tus_headers() {
    let (server, client) = common::setup_putio_mock().await;
    Mock::given(method("POST"))
        .and(path("/files/"))
        .and(header("upload-length", "1234"))
        .and(headers(
            "upload-metadata",
            vec!["name YS50eHQ=", "parent_id MTA=", "no-torrent dHJ1ZQ=="],
        ))
        .and(header("authorization", "token test-access-token"))
        .respond_with(
            ResponseTemplate::new(201)
                .append_header("Location", format!("{}/files/session-1", server.uri()).as_str()),
        )
        .expect(1)
        .mount(&server)
        .await;

    let location = client.create_upload("a.txt", 10, 1234).await.unwrap();
    assert_eq!(location, format!("{}/files/session-1", server.uri()));
}

#[tokio::test]
async fn test_create_upload_rejects_other_status() {
    let (server, client) = common::setup_putio_mock().await;
    Mock::given(method("POST"))
        .and(path("/files/"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let err = client.create_upload("a.txt", 10, 1).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RemoteError>(),
        Some(RemoteError::UnexpectedStatus(200))
    ));
}

#[tokio::test]
async fn test_append_upload_streams_from_offset() {
    let (server, client) = common::setup_putio_mock().await;
    Mock::given(method("PATCH"))
        .and(path("/files/session-1"))
        .and(header("upload-offset", "6"))
        .and(header("content-type", "application/offset+octet-stream"))
        .and(body_bytes(b"world".to_vec()))
        .respond_with(
            ResponseTemplate::new(204)
                .append_header("putio-file-id", "555")
                .append_header("putio-file-crc32", "3610a686"),
        )
        .expect(1)
        .mount(&server)
        .await;

    let url = format!("{}/files/session-1", server.uri());
    let result = client.append_upload(&url, 6, reader(b"world")).await.unwrap();
    assert_eq!(result.file_id, 555);
    assert_eq!(result.crc32, "3610a686");
}

#[tokio::test]
async fn test_append_upload_requires_file_id() {
    let (server, client) = common::setup_putio_mock().await;
    Mock::given(method("PATCH"))
        .and(path("/files/session-2"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    let url = format!("{}/files/session-2", server.uri());
    let err = client.append_upload(&url, 0, reader(b"x")).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RemoteError>(),
        Some(RemoteError::InvalidResponse(_))
    ));
}

#[tokio::test]
async fn test_upload_offset_reads_header() {
    let (server, client) = common::setup_putio_mock().await;
    Mock::given(method("HEAD"))
        .and(path("/files/session-3"))
        .respond_with(ResponseTemplate::new(200).append_header("upload-offset", "4096"))
        .mount(&server)
        .await;

    let url = format!("{}/files/session-3", server.uri());
    assert_eq!(client.upload_offset(&url).await.unwrap(), 4096);
}

#[tokio::test]
async fn test_terminate_upload_expects_no_content() {
    let (server, client) = common::setup_putio_mock().await;
    Mock::given(method("DELETE"))
        .and(path("/files/session-4"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("DELETE"))
        .and(path("/files/session-5"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    client
        .terminate_upload(&format!("{}/files/session-4", server.uri()))
        .await
        .unwrap();
    assert!(client
        .terminate_upload(&format!("{}/files/session-5", server.uri()))
        .await
        .is_err());
}

#[tokio::test]
async fn test_rejected_token_is_auth_error() {
    let (server, client) = common::setup_putio_mock().await;
    Mock::given(method("HEAD"))
        .and(path("/files/session-6"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client
        .upload_offset(&format!("{}/files/session-6", server.uri()))
        .await
        .unwrap_err();
    assert!(putsync_remote::is_auth_error(&err));
}
