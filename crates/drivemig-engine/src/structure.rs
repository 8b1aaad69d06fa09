//! Destination folder structure
//!
//! [`StructureBuilder`] gives every source folder exactly one destination
//! counterpart. Creation is write-ahead: the mapping entry is persisted as
//! in-flight before the remote call, so a crash between "folder created"
//! and "mapping recorded" is detected on the next run, which looks the
//! folder up by name instead of creating a duplicate.
//!
//! ## Lookups
//!
//! A lookup by name is made before creating unless the destination parent
//! was itself created by this run (it then holds nothing this run did not
//! put there), and always before retrying a failed create.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

use drivemig_core::domain::{MappingEntry, Node, NodeId, NodeKind, TransferStatus};
use drivemig_core::ports::{IStorageProvider, NodeAttributes};
use tracing::{debug, info, warn};

use crate::error::StructureError;
use crate::mapping::MappingTable;
use crate::progress::{ProgressEvent, ProgressTracker};
use crate::retry::{with_retry, RetryPolicy};

/// How a source folder got its destination counterpart
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FolderOutcome {
    /// Already mapped; no remote call was made
    Cached(NodeId),
    /// Created by this call
    Created(NodeId),
    /// An existing destination folder of the same name was adopted
    Reused(NodeId),
}

impl FolderOutcome {
    pub fn destination_id(&self) -> &NodeId {
        match self {
            FolderOutcome::Cached(id) | FolderOutcome::Created(id) | FolderOutcome::Reused(id) => id,
        }
    }
}

/// Options controlling folder creation
#[derive(Debug, Clone)]
pub struct StructureOptions {
    pub source_root: NodeId,
    pub destination_root: NodeId,
    pub preserve_dates: bool,
    pub preserve_sharing: bool,
    pub retry: RetryPolicy,
}

/// Maps source folders onto destination folders
pub struct StructureBuilder {
    provider: Arc<dyn IStorageProvider>,
    mapping: Arc<MappingTable>,
    progress: Arc<ProgressTracker>,
    options: StructureOptions,
}

impl StructureBuilder {
    pub fn new(
        provider: Arc<dyn IStorageProvider>,
        mapping: Arc<MappingTable>,
        progress: Arc<ProgressTracker>,
        options: StructureOptions,
    ) -> Self {
        Self {
            provider,
            mapping,
            progress,
            options,
        }
    }

    /// Returns the destination folder for `node`, creating it if needed
    ///
    /// The parent of `node` must already be mapped; the walker guarantees
    /// this by emitting folders before their children.
    ///
    /// # Arguments
    /// * `node` - A source folder as emitted by the walker
    /// * `path` - Its path relative to the source root
    ///
    /// # Errors
    ///
    /// - `MissingParent` if the parent has no destination counterpart
    /// - `CreateFailed` if the folder could neither be found nor created
    /// - `Store` if the write-ahead record could not be persisted
    pub async fn ensure_destination_folder(
        &self,
        node: &Node,
        path: &str,
    ) -> Result<FolderOutcome, StructureError> {
        if node.id == self.options.source_root {
            return self.map_root(node).await;
        }

        let existing = self.mapping.get(&node.id);
        if let Some(destination) = existing.as_ref().and_then(|e| e.resolved_destination()) {
            debug!(folder_id = %node.id, %destination, "Folder already mapped");
            return Ok(FolderOutcome::Cached(destination.clone()));
        }
        if existing.is_none() {
            self.progress.record(ProgressEvent::FolderDiscovered);
        }

        let parent_id = node
            .parent_id
            .clone()
            .unwrap_or_else(|| self.options.source_root.clone());
        let Some(parent_destination) = self.mapping.destination_of(&parent_id) else {
            self.progress.record(ProgressEvent::FolderFailed);
            return Err(StructureError::MissingParent {
                folder_id: node.id.clone(),
                parent_id,
            });
        };

        // An entry that exists but is not done may belong to a create whose
        // response never arrived
        let look_up_first = existing.is_some() || !self.mapping.is_fresh(&parent_destination);

        let mut entry = existing.unwrap_or_else(|| {
            MappingEntry::new(node.clone(), path, Some(parent_destination.clone()))
        });
        entry.node = node.clone();
        entry.path = path.to_string();
        entry.destination_parent_id = Some(parent_destination.clone());
        entry.mark_in_flight();
        self.mapping.upsert(entry);
        self.mapping.persist(&node.id).await?;

        let attributes = self.attributes_for(node);
        let attempts = AtomicU32::new(0);
        let provider = &self.provider;
        let parent = &parent_destination;
        let name = node.name.as_str();
        let attributes = &attributes;
        let attempts_ref = &attempts;

        let result = with_retry(&self.options.retry, "create_folder", move |attempt| async move {
            attempts_ref.store(attempt, Ordering::Relaxed);
            if look_up_first || attempt > 1 {
                if let Some(found) = provider.find_child(parent, name, NodeKind::Folder).await? {
                    return Ok((found.id, false));
                }
            }
            provider
                .create_folder(parent, name, attributes)
                .await
                .map(|id| (id, true))
        })
        .await;
        let attempt_count = attempts.load(Ordering::Relaxed);

        match result {
            Ok((destination, created)) => {
                self.mapping.update(&node.id, |e| {
                    e.attempt_count = attempt_count;
                    if created {
                        e.mark_succeeded(destination.clone());
                    } else {
                        e.mark_skipped(destination.clone());
                    }
                });
                self.mapping.persist(&node.id).await?;

                if created {
                    info!(folder_id = %node.id, %path, %destination, "Created destination folder");
                    self.mapping.mark_fresh(destination.clone());
                    self.progress.record(ProgressEvent::FolderCreated);
                    Ok(FolderOutcome::Created(destination))
                } else {
                    info!(folder_id = %node.id, %path, %destination, "Reusing existing destination folder");
                    self.progress.record(ProgressEvent::FolderReused);
                    Ok(FolderOutcome::Reused(destination))
                }
            }
            Err(reason) => {
                warn!(folder_id = %node.id, %path, error = %reason, "Failed to create destination folder");
                self.mapping.update(&node.id, |e| {
                    e.attempt_count = attempt_count;
                    e.mark_failed(TransferStatus::FailedTerminal, reason.to_string());
                });
                self.mapping.persist(&node.id).await?;
                self.progress.record(ProgressEvent::FolderFailed);
                Err(StructureError::CreateFailed {
                    folder_id: node.id.clone(),
                    reason,
                })
            }
        }
    }

    /// The source root maps onto the configured destination root
    async fn map_root(&self, node: &Node) -> Result<FolderOutcome, StructureError> {
        let destination = self.options.destination_root.clone();
        if self.mapping.destination_of(&node.id).as_ref() != Some(&destination) {
            let mut root = node.clone();
            root.parent_id = None;
            let mut entry = MappingEntry::new(root, "", None);
            entry.mark_skipped(destination.clone());
            self.mapping.upsert(entry);
            self.mapping.persist(&node.id).await?;
        }
        Ok(FolderOutcome::Cached(destination))
    }

    fn attributes_for(&self, node: &Node) -> NodeAttributes {
        NodeAttributes {
            modified_time: if self.options.preserve_dates {
                node.modified_time
            } else {
                None
            },
            sharing: if self.options.preserve_sharing {
                node.sharing.clone()
            } else {
                None
            },
        }
    }
}
