//! Integration tests for folder listing, metadata and file operations

use putsync_core::ports::IRemoteFileService;
use putsync_remote::{is_auth_error, PutioClient, RemoteError};
use tokio::io::AsyncReadExt;
use wiremock::matchers::{body_string_contains, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use crate::common;

// ============================================================================
// Listing
// ============================================================================

#[tokio::test]
async fn test_list_maps_files_and_folders() {
    let (server, client) = common::setup_putio_mock().await;
    common::mount_list(
        &server,
        10,
        serde_json::json!([
            common::folder_json(11, 10, "docs"),
            common::file_json(12, 10, "a.txt", 100, "0000abcd"),
        ]),
    )
    .await;

    let files = client.list(10).await.expect("list failed");

    assert_eq!(files.len(), 2);
    assert!(files[0].is_dir);
    assert_eq!(files[0].name, "docs");
    assert!(!files[1].is_dir);
    assert_eq!(files[1].size, 100);
    assert_eq!(files[1].crc32, "0000abcd");
}

#[tokio::test]
async fn test_list_follows_cursor() {
    let (server, client) = common::setup_putio_mock().await;

    Mock::given(method("GET"))
        .and(path("/files/list"))
        .and(query_param("parent_id", "0"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [common::file_json(1, 0, "one", 1, "01")],
            "cursor": "page-2"
        })))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/files/list/continue"))
        .and(body_string_contains("cursor=page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [common::file_json(2, 0, "two", 2, "02")],
            "cursor": null
        })))
        .expect(1)
        .mount(&server)
        .await;

    let files = client.list(0).await.expect("list failed");
    let names: Vec<&str> = files.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["one", "two"]);
}

#[tokio::test]
async fn test_list_sends_bearer_token() {
    let (server, client) = common::setup_putio_mock().await;
    Mock::given(method("GET"))
        .and(path("/files/list"))
        .and(header("authorization", "Bearer test-access-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})))
        .expect(1)
        .mount(&server)
        .await;

    assert!(client.list(3).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_unauthorized_is_classified_as_auth_error() {
    let (server, client) = common::setup_putio_mock().await;
    Mock::given(method("GET"))
        .and(path("/files/list"))
        .respond_with(ResponseTemplate::new(401))
        .mount(&server)
        .await;

    let err = client.list(0).await.unwrap_err();
    assert!(is_auth_error(&err));
}

#[tokio::test]
async fn test_get_missing_file_is_not_found() {
    let (server, client) = common::setup_putio_mock().await;
    Mock::given(method("GET"))
        .and(path("/files/99"))
        .respond_with(ResponseTemplate::new(404))
        .mount(&server)
        .await;

    let err = client.get(99).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RemoteError>(),
        Some(RemoteError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_slow_call_hits_request_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/files/5"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_delay(std::time::Duration::from_secs(5))
                .set_body_json(serde_json::json!({"file": common::folder_json(5, 0, "x")})),
        )
        .mount(&server)
        .await;

    let client = PutioClient::with_base_url("t", server.uri())
        .with_request_timeout(std::time::Duration::from_millis(200));
    assert!(client.get(5).await.is_err());
}

// ============================================================================
// Folder operations
// ============================================================================

#[tokio::test]
async fn test_create_folder_posts_form() {
    let (server, client) = common::setup_putio_mock().await;
    Mock::given(method("POST"))
        .and(path("/files/create-folder"))
        .and(body_string_contains("name=photos"))
        .and(body_string_contains("parent_id=10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "file": common::folder_json(77, 10, "photos")
        })))
        .expect(1)
        .mount(&server)
        .await;

    let folder = client.create_folder("photos", 10).await.unwrap();
    assert_eq!(folder.id, 77);
    assert!(folder.is_dir);
}

#[tokio::test]
async fn test_delete_joins_ids() {
    let (server, client) = common::setup_putio_mock().await;
    Mock::given(method("POST"))
        .and(path("/files/delete"))
        .and(body_string_contains("file_ids=1%2C2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "OK"})))
        .expect(1)
        .mount(&server)
        .await;

    client.delete(&[1, 2]).await.unwrap();
}

#[tokio::test]
async fn test_move_sends_target_parent_and_name() {
    let (server, client) = common::setup_putio_mock().await;
    Mock::given(method("POST"))
        .and(path("/files/move"))
        .and(body_string_contains("file_id=42"))
        .and(body_string_contains("parent_id=7"))
        .and(body_string_contains("name=renamed.txt"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"status": "OK"})))
        .expect(1)
        .mount(&server)
        .await;

    client.move_file(42, 7, "renamed.txt").await.unwrap();
}

// ============================================================================
// Ranged downloads
// ============================================================================

#[tokio::test]
async fn test_open_read_requests_range_from_offset() {
    let (server, client) = common::setup_putio_mock().await;
    let content: Vec<u8> = (0..5000u32).map(|i| (i % 251) as u8).collect();
    common::mount_ranged_download(&server, 42, &content, 1000).await;

    let mut reader = client.open_read(42, 1000).await.expect("open_read failed");
    let mut buf = Vec::new();
    reader.read_to_end(&mut buf).await.unwrap();

    assert_eq!(buf.len(), 4000);
    assert_eq!(buf, content[1000..]);
}

#[tokio::test]
async fn test_open_read_rejects_full_content_response() {
    let (server, client) = common::setup_putio_mock().await;
    Mock::given(method("GET"))
        .and(path("/files/8/url"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": format!("{}/download/8", server.uri())
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/download/8"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"whole file".to_vec()))
        .mount(&server)
        .await;

    let err = client.open_read(8, 0).await.err().expect("expected an error");
    assert!(matches!(
        err.downcast_ref::<RemoteError>(),
        Some(RemoteError::UnexpectedStatus(200))
    ));
}
