//! Shared test helpers for put.io integration tests
//!
//! Each helper mounts the necessary mock endpoints. [`setup_putio_mock`]
//! returns a configured PutioClient pointing at the mock server.

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use putsync_remote::PutioClient;

pub const TOKEN: &str = "test-access-token";

/// Starts a mock server and returns a client for it
pub async fn setup_putio_mock() -> (MockServer, PutioClient) {
    let server = MockServer::start().await;
    let client = PutioClient::with_base_url(TOKEN, server.uri());
    (server, client)
}

/// JSON for a folder entry
pub fn folder_json(id: i64, parent_id: i64, name: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "parent_id": parent_id,
        "name": name,
        "size": 0,
        "content_type": "application/x-directory",
        "file_type": "FOLDER"
    })
}

/// JSON for a regular file entry
pub fn file_json(id: i64, parent_id: i64, name: &str, size: u64, crc32: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "parent_id": parent_id,
        "name": name,
        "size": size,
        "crc32": crc32,
        "content_type": "application/octet-stream",
        "file_type": "FILE"
    })
}

/// Mounts `GET /files/list?parent_id=<id>` returning a single page
pub async fn mount_list(server: &MockServer, parent_id: i64, files: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path("/files/list"))
        .and(query_param("parent_id", parent_id.to_string()))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": files,
            "parent": folder_json(parent_id, 0, "parent"),
            "cursor": null
        })))
        .mount(server)
        .await;
}

/// Mounts the download URL lookup and a ranged download of `content`
/// starting at `offset`
pub async fn mount_ranged_download(server: &MockServer, file_id: i64, content: &[u8], offset: usize) {
    Mock::given(method("GET"))
        .and(path(format!("/files/{}/url", file_id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "url": format!("{}/download/{}", server.uri(), file_id)
        })))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path(format!("/download/{}", file_id)))
        .and(wiremock::matchers::header("range", format!("bytes={}-", offset).as_str()))
        .respond_with(
            ResponseTemplate::new(206)
                .set_body_bytes(content[offset..].to_vec())
                .append_header("Content-Type", "application/octet-stream"),
        )
        .mount(server)
        .await;
}
