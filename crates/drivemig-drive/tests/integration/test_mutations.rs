//! Integration tests for folder creation, copies and sharing

use chrono::{TimeZone, Utc};
use drivemig_core::domain::{newtypes::NodeId, ShareGrant, SharingMetadata};
use drivemig_core::ports::{IStorageProvider, NodeAttributes};
use wiremock::matchers::{body_partial_json, method, path, query_param};
use wiremock::{Mock, ResponseTemplate};

use crate::common;

fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

#[tokio::test]
async fn test_create_folder_with_modified_time() {
    let (server, provider) = common::setup_drive_mock().await;
    Mock::given(method("POST"))
        .and(path("/files"))
        .and(body_partial_json(serde_json::json!({
            "name": "A",
            "parents": ["dst-root"],
            "mimeType": common::FOLDER_MIME,
            "modifiedTime": "2026-01-10T09:00:00Z"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "new-a"})))
        .expect(1)
        .mount(&server)
        .await;

    let attrs = NodeAttributes {
        modified_time: Some(Utc.with_ymd_and_hms(2026, 1, 10, 9, 0, 0).unwrap()),
        sharing: None,
    };
    let created = provider
        .create_folder(&id("dst-root"), "A", &attrs)
        .await
        .unwrap();
    assert_eq!(created, id("new-a"));
}

#[tokio::test]
async fn test_copy_file_into_parent() {
    let (server, provider) = common::setup_drive_mock().await;
    Mock::given(method("POST"))
        .and(path("/files/file-1/copy"))
        .and(query_param("supportsAllDrives", "true"))
        .and(body_partial_json(serde_json::json!({
            "name": "a.txt",
            "parents": ["dst-a"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "copy-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let copy = provider
        .copy_file(&id("file-1"), &id("dst-a"), "a.txt", &NodeAttributes::default())
        .await
        .unwrap();
    assert_eq!(copy, id("copy-1"));
}

#[tokio::test]
async fn test_copy_recreates_non_owner_grants() {
    let (server, provider) = common::setup_drive_mock().await;
    Mock::given(method("POST"))
        .and(path("/files/file-1/copy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "copy-1"})))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/files/copy-1/permissions"))
        .and(query_param("sendNotificationEmail", "false"))
        .and(body_partial_json(serde_json::json!({
            "role": "writer",
            "type": "user",
            "emailAddress": "ana@example.com"
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "perm-1"})))
        .expect(1)
        .mount(&server)
        .await;

    let attrs = NodeAttributes {
        modified_time: None,
        sharing: Some(SharingMetadata {
            grants: vec![
                ShareGrant {
                    role: "owner".to_string(),
                    grantee_type: "user".to_string(),
                    email_address: Some("me@example.com".to_string()),
                },
                ShareGrant {
                    role: "writer".to_string(),
                    grantee_type: "user".to_string(),
                    email_address: Some("ana@example.com".to_string()),
                },
            ],
        }),
    };

    let copy = provider
        .copy_file(&id("file-1"), &id("dst-a"), "a.txt", &attrs)
        .await
        .unwrap();
    assert_eq!(copy, id("copy-1"));
}

#[tokio::test]
async fn test_failed_grant_does_not_fail_copy() {
    let (server, provider) = common::setup_drive_mock().await;
    Mock::given(method("POST"))
        .and(path("/files/file-1/copy"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"id": "copy-1"})))
        .mount(&server)
        .await;
    common::mount_error(&server, "POST", "/files/copy-1/permissions", 400, "invalidSharingRequest")
        .await;

    let attrs = NodeAttributes {
        modified_time: None,
        sharing: Some(SharingMetadata {
            grants: vec![ShareGrant {
                role: "reader".to_string(),
                grantee_type: "anyone".to_string(),
                email_address: None,
            }],
        }),
    };
    let copy = provider
        .copy_file(&id("file-1"), &id("dst-a"), "a.txt", &attrs)
        .await
        .unwrap();
    assert_eq!(copy, id("copy-1"));
}
