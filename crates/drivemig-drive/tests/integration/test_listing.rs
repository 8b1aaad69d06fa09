//! Integration tests for listings, lookups and metadata reads

use drivemig_core::domain::{newtypes::NodeId, NodeKind};
use drivemig_core::ports::IStorageProvider;
use wiremock::matchers::{header, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

#[tokio::test]
async fn test_list_children_single_page() {
    let (server, provider) = common::setup_drive_mock().await;

    Mock::given(method("GET"))
        .and(path("/files"))
        .and(header("authorization", "Bearer test-access-token"))
        .and(query_param("q", "'src-root' in parents and trashed = false"))
        .and(query_param("pageSize", "1000"))
        .and(query_param("supportsAllDrives", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [
                common::folder_json("folder-a", "A"),
                common::file_json("file-1", "a.txt", 5, "abc123")
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let page = provider.list_children(&id("src-root"), None).await.unwrap();
    assert!(page.next_page_token.is_none());
    assert_eq!(page.nodes.len(), 2);

    let folder = &page.nodes[0];
    assert_eq!(folder.kind, NodeKind::Folder);
    assert_eq!(folder.parent_id, Some(id("src-root")));

    let file = &page.nodes[1];
    assert_eq!(file.kind, NodeKind::File);
    assert_eq!(file.size_bytes, Some(5));
    assert_eq!(file.checksum.as_deref(), Some("abc123"));
    assert_eq!(file.parent_id, Some(id("src-root")));
}

#[tokio::test]
async fn test_list_children_follows_page_token() {
    let (server, provider) = common::setup_drive_mock().await;
    common::mount_paginated_listing(
        &server,
        serde_json::json!([common::file_json("file-1", "a.txt", 1, "aa")]),
        serde_json::json!([common::file_json("file-2", "b.txt", 2, "bb")]),
    )
    .await;

    let first = provider.list_children(&id("src-root"), None).await.unwrap();
    assert_eq!(first.nodes[0].id, id("file-1"));
    let token = first.next_page_token.expect("first page has a continuation");

    let second = provider
        .list_children(&id("src-root"), Some(&token))
        .await
        .unwrap();
    assert_eq!(second.nodes[0].id, id("file-2"));
    assert!(second.next_page_token.is_none());
}

#[tokio::test]
async fn test_list_empty_folder() {
    let (server, provider) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({})))
        .mount(&server)
        .await;

    let page = provider.list_children(&id("empty"), None).await.unwrap();
    assert!(page.nodes.is_empty());
}

#[tokio::test]
async fn test_find_child_folder_by_name() {
    let (server, provider) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .and(query_param(
            "q",
            format!(
                "'dst-root' in parents and name = 'Bob\\'s' and mimeType = '{}' and trashed = false",
                common::FOLDER_MIME
            ),
        ))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "files": [common::folder_json("existing-1", "Bob's")]
        })))
        .mount(&server)
        .await;

    let found = provider
        .find_child(&id("dst-root"), "Bob's", NodeKind::Folder)
        .await
        .unwrap()
        .expect("folder should be found");
    assert_eq!(found.id, id("existing-1"));
    assert!(found.is_folder());
}

#[tokio::test]
async fn test_find_child_returns_none_when_absent() {
    let (server, provider) = common::setup_drive_mock().await;
    Mock::given(method("GET"))
        .and(path("/files"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"files": []})))
        .mount(&server)
        .await;

    let found = provider
        .find_child(&id("dst-root"), "a.txt", NodeKind::File)
        .await
        .unwrap();
    assert!(found.is_none());
}

#[tokio::test]
async fn test_get_metadata_and_node() {
    let (server, provider) = common::setup_drive_mock().await;
    let mut body = common::file_json("copy-1", "a.txt", 5, "abc123");
    body["parents"] = serde_json::json!(["dst-a"]);
    common::mount_get_file(&server, "copy-1", body).await;

    let meta = provider.get_metadata(&id("copy-1")).await.unwrap();
    assert_eq!(meta.checksum.as_deref(), Some("abc123"));
    assert_eq!(meta.size_bytes, Some(5));
    assert_eq!(meta.mime_type.as_deref(), Some("text/plain"));
    assert!(meta.modified_time.is_some());

    let node = provider.get_node(&id("copy-1")).await.unwrap();
    assert_eq!(node.parent_id, Some(id("dst-a")));
}

#[tokio::test]
async fn test_get_node_of_root_folder() {
    let (server, provider) = common::setup_drive_mock().await;
    common::mount_get_file(&server, "src-root", common::folder_json("src-root", "Source")).await;

    let node = provider.get_node(&id("src-root")).await.unwrap();
    assert!(node.is_folder());
    assert!(node.parent_id.is_none());
}
