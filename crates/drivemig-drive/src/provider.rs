//! GoogleDriveProvider - IStorageProvider implementation for Google Drive v3
//!
//! Wraps the [`DriveClient`] and maps Drive `files` resources onto the
//! port-level [`Node`] and [`ObjectMetadata`] types.
//!
//! ## Design Notes
//!
//! - Every port method issues one Drive request, except `create_folder`
//!   and `copy_file` with sharing attributes, which add one permission
//!   request per transferable grant.
//! - Shared drives are supported (`supportsAllDrives` on every call).
//! - Google-native documents carry neither `size` nor `md5Checksum`; the
//!   corresponding fields stay `None`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use drivemig_core::domain::{
    newtypes::NodeId, Node, NodeKind, ObjectMetadata, ShareGrant, SharingMetadata,
};
use drivemig_core::ports::{IStorageProvider, ListPage, NodeAttributes, StorageError};

use crate::client::DriveClient;
use crate::DriveError;

/// MIME type Drive uses for folders
pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";

/// Page size used for folder listings (Drive maximum)
const LIST_PAGE_SIZE: &str = "1000";

/// Fields requested for every file resource
const FILE_FIELDS: &str =
    "id,name,mimeType,size,md5Checksum,modifiedTime,parents,permissions(role,type,emailAddress)";

// ============================================================================
// Drive API resource types
// ============================================================================

/// Drive `files` resource, restricted to the requested fields
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    mime_type: Option<String>,
    /// Drive serializes int64 values as strings
    size: Option<String>,
    md5_checksum: Option<String>,
    modified_time: Option<DateTime<Utc>>,
    #[serde(default)]
    parents: Vec<String>,
    permissions: Option<Vec<DrivePermission>>,
}

/// Drive `permissions` resource
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DrivePermission {
    role: String,
    #[serde(rename = "type")]
    grantee_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    email_address: Option<String>,
}

/// Response of `files.list`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
    next_page_token: Option<String>,
}

/// Response of `files.create` / `files.copy` with `fields=id`
#[derive(Debug, Deserialize)]
struct CreatedFile {
    id: String,
}

/// Request body of `files.create` / `files.copy`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct FileBody<'a> {
    name: &'a str,
    parents: [&'a str; 1],
    #[serde(skip_serializing_if = "Option::is_none")]
    mime_type: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    modified_time: Option<DateTime<Utc>>,
}

// ============================================================================
// Resource conversion
// ============================================================================

fn parse_id(raw: &str) -> Result<NodeId, DriveError> {
    NodeId::new(raw)
        .map_err(|e| DriveError::InvalidResponse(format!("Invalid file id '{}': {}", raw, e)))
}

impl DriveFile {
    fn kind(&self) -> NodeKind {
        if self.mime_type.as_deref() == Some(FOLDER_MIME_TYPE) {
            NodeKind::Folder
        } else {
            NodeKind::File
        }
    }

    fn size_bytes(&self) -> Result<Option<u64>, DriveError> {
        self.size
            .as_deref()
            .map(|s| {
                s.parse::<u64>().map_err(|e| {
                    DriveError::InvalidResponse(format!("Invalid size '{}': {}", s, e))
                })
            })
            .transpose()
    }

    fn sharing(&self) -> Option<SharingMetadata> {
        self.permissions.as_ref().map(|perms| SharingMetadata {
            grants: perms
                .iter()
                .map(|p| ShareGrant {
                    role: p.role.clone(),
                    grantee_type: p.grantee_type.clone(),
                    email_address: p.email_address.clone(),
                })
                .collect(),
        })
    }

    fn metadata(&self) -> Result<ObjectMetadata, DriveError> {
        Ok(ObjectMetadata {
            checksum: self.md5_checksum.clone(),
            size_bytes: self.size_bytes()?,
            modified_time: self.modified_time,
            mime_type: self.mime_type.clone(),
        })
    }

    /// Converts to a [`Node`]; `parent` overrides the reported parents
    fn into_node(self, parent: Option<&NodeId>) -> Result<Node, DriveError> {
        let parent_id = match parent {
            Some(p) => Some(p.clone()),
            None => self.parents.first().map(|p| parse_id(p)).transpose()?,
        };
        let kind = self.kind();
        let size_bytes = match kind {
            NodeKind::File => self.size_bytes()?,
            NodeKind::Folder => None,
        };
        let sharing = self.sharing();

        Ok(Node {
            id: parse_id(&self.id)?,
            name: self.name,
            parent_id,
            kind,
            size_bytes,
            modified_time: self.modified_time,
            checksum: self.md5_checksum,
            mime_type: self.mime_type,
            sharing,
        })
    }
}

/// Escapes a literal for use inside a single-quoted Drive query string
fn escape_query_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

// ============================================================================
// GoogleDriveProvider
// ============================================================================

/// Storage provider implementation that delegates to the Google Drive API
pub struct GoogleDriveProvider {
    client: DriveClient,
}

impl GoogleDriveProvider {
    /// Creates a new provider wrapping the given client
    pub fn new(client: DriveClient) -> Self {
        Self { client }
    }

    /// Returns a reference to the underlying client
    pub fn client(&self) -> &DriveClient {
        &self.client
    }

    async fn get_file(&self, id: &NodeId) -> Result<DriveFile, DriveError> {
        let path = format!("/files/{}", id.as_str());
        self.client
            .send_json(
                self.client
                    .request(Method::GET, &path)
                    .query(&[("fields", FILE_FIELDS), ("supportsAllDrives", "true")]),
            )
            .await
    }

    async fn query_files(
        &self,
        q: &str,
        page_size: &str,
        page_token: Option<&str>,
    ) -> Result<FileList, DriveError> {
        let fields = format!("nextPageToken,files({})", FILE_FIELDS);
        let mut request = self.client.request(Method::GET, "/files").query(&[
            ("q", q),
            ("pageSize", page_size),
            ("orderBy", "folder,name"),
            ("fields", fields.as_str()),
            ("supportsAllDrives", "true"),
            ("includeItemsFromAllDrives", "true"),
        ]);
        if let Some(token) = page_token {
            request = request.query(&[("pageToken", token)]);
        }
        self.client.send_json(request).await
    }

    /// Recreates transferable grants on `file_id`
    ///
    /// Sharing is best-effort: a failed grant is logged and the remaining
    /// grants are still applied.
    async fn apply_sharing(&self, file_id: &NodeId, sharing: &SharingMetadata) {
        let path = format!("/files/{}/permissions", file_id.as_str());
        for grant in sharing.transferable_grants() {
            let body = DrivePermission {
                role: grant.role.clone(),
                grantee_type: grant.grantee_type.clone(),
                email_address: grant.email_address.clone(),
            };
            let request = self
                .client
                .request(Method::POST, &path)
                .query(&[("sendNotificationEmail", "false"), ("supportsAllDrives", "true")])
                .json(&body);

            if let Err(e) = self.client.send(request).await {
                warn!(
                    file_id = %file_id,
                    role = %grant.role,
                    grantee = grant.email_address.as_deref().unwrap_or(&grant.grantee_type),
                    error = %e,
                    "Failed to recreate sharing grant"
                );
            }
        }
    }

    async fn post_file(
        &self,
        path: &str,
        body: &FileBody<'_>,
        attributes: &NodeAttributes,
    ) -> Result<NodeId, DriveError> {
        let created: CreatedFile = self
            .client
            .send_json(
                self.client
                    .request(Method::POST, path)
                    .query(&[("fields", "id"), ("supportsAllDrives", "true")])
                    .json(body),
            )
            .await?;
        let id = parse_id(&created.id)?;

        if let Some(sharing) = &attributes.sharing {
            self.apply_sharing(&id, sharing).await;
        }
        Ok(id)
    }
}

#[async_trait]
impl IStorageProvider for GoogleDriveProvider {
    async fn list_children(
        &self,
        folder_id: &NodeId,
        page_token: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        let q = format!(
            "'{}' in parents and trashed = false",
            escape_query_literal(folder_id.as_str())
        );
        let list = self.query_files(&q, LIST_PAGE_SIZE, page_token).await?;

        let mut nodes = Vec::with_capacity(list.files.len());
        for file in list.files {
            nodes.push(file.into_node(Some(folder_id))?);
        }
        debug!(
            folder_id = %folder_id,
            count = nodes.len(),
            has_more = list.next_page_token.is_some(),
            "Listed folder page"
        );

        Ok(ListPage {
            nodes,
            next_page_token: list.next_page_token,
        })
    }

    async fn find_child(
        &self,
        parent_id: &NodeId,
        name: &str,
        kind: NodeKind,
    ) -> Result<Option<Node>, StorageError> {
        let mime_clause = match kind {
            NodeKind::Folder => format!("mimeType = '{}'", FOLDER_MIME_TYPE),
            NodeKind::File => format!("mimeType != '{}'", FOLDER_MIME_TYPE),
        };
        let q = format!(
            "'{}' in parents and name = '{}' and {} and trashed = false",
            escape_query_literal(parent_id.as_str()),
            escape_query_literal(name),
            mime_clause
        );
        let list = self.query_files(&q, "10", None).await?;

        match list.files.into_iter().next() {
            Some(file) => Ok(Some(file.into_node(Some(parent_id))?)),
            None => Ok(None),
        }
    }

    async fn create_folder(
        &self,
        parent_id: &NodeId,
        name: &str,
        attributes: &NodeAttributes,
    ) -> Result<NodeId, StorageError> {
        let body = FileBody {
            name,
            parents: [parent_id.as_str()],
            mime_type: Some(FOLDER_MIME_TYPE),
            modified_time: attributes.modified_time,
        };
        let id = self.post_file("/files", &body, attributes).await?;
        debug!(parent_id = %parent_id, name, folder_id = %id, "Created folder");
        Ok(id)
    }

    async fn copy_file(
        &self,
        source_id: &NodeId,
        destination_parent_id: &NodeId,
        name: &str,
        attributes: &NodeAttributes,
    ) -> Result<NodeId, StorageError> {
        let path = format!("/files/{}/copy", source_id.as_str());
        let body = FileBody {
            name,
            parents: [destination_parent_id.as_str()],
            mime_type: None,
            modified_time: attributes.modified_time,
        };
        let id = self.post_file(&path, &body, attributes).await?;
        debug!(source_id = %source_id, copy_id = %id, "Copied file");
        Ok(id)
    }

    async fn get_metadata(&self, id: &NodeId) -> Result<ObjectMetadata, StorageError> {
        let file = self.get_file(id).await?;
        Ok(file.metadata()?)
    }

    async fn get_node(&self, id: &NodeId) -> Result<Node, StorageError> {
        let file = self.get_file(id).await?;
        Ok(file.into_node(None)?)
    }
}
