//! Source tree nodes
//!
//! A [`Node`] is one entity of the remote tree, either a folder or a file,
//! as reported by the storage provider's listing calls. The walker
//! normalizes `parent_id` to the folder it listed the node from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::NodeId;

/// Kind of a remote tree entity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Folder,
    File,
}

impl NodeKind {
    /// Stable lowercase name used in storage and reports
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Folder => "folder",
            NodeKind::File => "file",
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One permission grant on a remote object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShareGrant {
    /// Role granted (`reader`, `commenter`, `writer`, `owner`, ...)
    pub role: String,
    /// Grantee type (`user`, `group`, `domain`, `anyone`)
    pub grantee_type: String,
    /// Grantee address, absent for `anyone` grants
    pub email_address: Option<String>,
}

/// Sharing state of a remote object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharingMetadata {
    pub grants: Vec<ShareGrant>,
}

impl SharingMetadata {
    /// Grants that can be recreated on a copy (ownership cannot be)
    pub fn transferable_grants(&self) -> impl Iterator<Item = &ShareGrant> {
        self.grants.iter().filter(|g| g.role != "owner")
    }

    pub fn is_empty(&self) -> bool {
        self.transferable_grants().next().is_none()
    }
}

/// Integrity-relevant metadata of a single remote object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMetadata {
    /// Provider-supplied content hash (MD5 hex for Drive)
    pub checksum: Option<String>,
    /// Size in bytes, absent for provider-native documents
    pub size_bytes: Option<u64>,
    /// Last modification timestamp
    pub modified_time: Option<DateTime<Utc>>,
    /// MIME type as reported by the provider
    pub mime_type: Option<String>,
}

/// A folder or file in the remote tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub name: String,
    /// Containing folder; `None` only for the migration root
    pub parent_id: Option<NodeId>,
    pub kind: NodeKind,
    /// Size in bytes (files only)
    pub size_bytes: Option<u64>,
    pub modified_time: Option<DateTime<Utc>>,
    /// Provider-supplied checksum (files only)
    pub checksum: Option<String>,
    pub mime_type: Option<String>,
    pub sharing: Option<SharingMetadata>,
}

impl Node {
    /// Creates a folder node with no optional metadata
    pub fn folder(id: NodeId, name: impl Into<String>, parent_id: Option<NodeId>) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id,
            kind: NodeKind::Folder,
            size_bytes: None,
            modified_time: None,
            checksum: None,
            mime_type: None,
            sharing: None,
        }
    }

    /// Creates a file node of the given size
    pub fn file(id: NodeId, name: impl Into<String>, parent_id: NodeId, size_bytes: u64) -> Self {
        Self {
            id,
            name: name.into(),
            parent_id: Some(parent_id),
            kind: NodeKind::File,
            size_bytes: Some(size_bytes),
            modified_time: None,
            checksum: None,
            mime_type: None,
            sharing: None,
        }
    }

    pub fn with_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.checksum = Some(checksum.into());
        self
    }

    pub fn with_modified_time(mut self, modified_time: DateTime<Utc>) -> Self {
        self.modified_time = Some(modified_time);
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_sharing(mut self, sharing: SharingMetadata) -> Self {
        self.sharing = Some(sharing);
        self
    }

    pub fn is_folder(&self) -> bool {
        self.kind == NodeKind::Folder
    }

    pub fn is_file(&self) -> bool {
        self.kind == NodeKind::File
    }

    /// Integrity metadata carried by the listing
    pub fn metadata(&self) -> ObjectMetadata {
        ObjectMetadata {
            checksum: self.checksum.clone(),
            size_bytes: self.size_bytes,
            modified_time: self.modified_time,
            mime_type: self.mime_type.clone(),
        }
    }

    /// Bytes accounted for when this node is transferred
    pub fn transfer_bytes(&self) -> u64 {
        self.size_bytes.unwrap_or(0)
    }
}
