//! Shared test helpers for Drive API integration tests
//!
//! Provides wiremock-based mock server setup for Google Drive endpoints.
//! Each helper mounts the necessary mock endpoints; [`setup_drive_mock`]
//! returns a provider pointing at the mock server.

use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use drivemig_drive::{DriveClient, GoogleDriveProvider};

pub const FOLDER_MIME: &str = "application/vnd.google-apps.folder";

/// Starts a mock server and returns it with a provider bound to it
pub async fn setup_drive_mock() -> (MockServer, GoogleDriveProvider) {
    let server = MockServer::start().await;
    let client = DriveClient::with_base_url("test-access-token", server.uri());
    (server, GoogleDriveProvider::new(client))
}

/// JSON for a plain file resource
pub fn file_json(id: &str, name: &str, size: u64, md5: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "mimeType": "text/plain",
        "size": size.to_string(),
        "md5Checksum": md5,
        "modifiedTime": "2026-01-15T10:00:00.000Z"
    })
}

/// JSON for a folder resource
pub fn folder_json(id: &str, name: &str) -> serde_json::Value {
    serde_json::json!({
        "id": id,
        "name": name,
        "mimeType": FOLDER_MIME,
        "modifiedTime": "2026-01-10T09:00:00.000Z"
    })
}

/// Mounts `GET /files/<id>` returning the given resource
pub async fn mount_get_file(server: &MockServer, id: &str, body: serde_json::Value) {
    Mock::given(method("GET"))
        .and(path(format!("/files/{}", id)))
        .respond_with(ResponseTemplate::new(200).set_body_json(body))
        .mount(server)
        .await;
}

/// Mounts a two-page listing of `folder_id`
///
/// The second page is matched on `pageToken=page-2` and mounted with a
/// higher priority than the first.
pub async fn mount_paginated_listing(
    server: &MockServer,
    page1: serde_json::Value,
    page2: serde_json::Value,
) {
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param("pageToken", "page-2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": page2
        })))
        .with_priority(1)
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": page1,
            "nextPageToken": "page-2"
        })))
        .with_priority(2)
        .mount(server)
        .await;
}

/// Mounts an endpoint answering with a Google API error envelope
pub async fn mount_error(
    server: &MockServer,
    http_method: &str,
    url_path: &str,
    status: u16,
    reason: &str,
) {
    Mock::given(method(http_method))
        .and(path(url_path))
        .respond_with(ResponseTemplate::new(status).set_body_json(serde_json::json!({
            "error": {
                "code": status,
                "message": format!("{} error", reason),
                "errors": [{"domain": "global", "reason": reason}]
            }
        })))
        .mount(server)
        .await;
}
