//! In-memory mapping table
//!
//! [`MappingTable`] holds the mapping entries of one migration scope in a
//! concurrent map and tracks which of them changed since the last
//! checkpoint. Changes are written to the [`IMappingStore`] in batches by
//! [`MappingTable::checkpoint`], or immediately with
//! [`MappingTable::persist`] where a write-ahead record is required.
//!
//! Entries are cloned in and out; no reference into the map is ever held
//! across an await point.

use std::sync::Arc;

use dashmap::{DashMap, DashSet};
use drivemig_core::domain::{MappingEntry, MappingTally, NodeId, TransferStatus};
use drivemig_core::ports::IMappingStore;
use tracing::{debug, warn};

/// Mapping entries of one scope, with dirty tracking
pub struct MappingTable {
    scope: String,
    entries: DashMap<NodeId, MappingEntry>,
    dirty: DashSet<NodeId>,
    /// Destination folders created by this run; known to be empty of
    /// anything but what this run put there
    fresh_destinations: DashSet<NodeId>,
    store: Arc<dyn IMappingStore>,
}

impl MappingTable {
    /// Creates an empty table
    pub fn new(scope: impl Into<String>, store: Arc<dyn IMappingStore>) -> Self {
        Self {
            scope: scope.into(),
            entries: DashMap::new(),
            dirty: DashSet::new(),
            fresh_destinations: DashSet::new(),
            store,
        }
    }

    /// Creates a table holding every persisted entry of `scope`
    ///
    /// # Errors
    ///
    /// Returns the store error if the entries cannot be loaded.
    pub async fn load(scope: impl Into<String>, store: Arc<dyn IMappingStore>) -> anyhow::Result<Self> {
        let table = Self::new(scope, store);
        let entries = table.store.load_entries(&table.scope).await?;
        debug!(scope = %table.scope, count = entries.len(), "Loaded mapping entries");
        for entry in entries {
            table.entries.insert(entry.source_id().clone(), entry);
        }
        Ok(table)
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, source_id: &NodeId) -> Option<MappingEntry> {
        self.entries.get(source_id).map(|e| e.value().clone())
    }

    pub fn status(&self, source_id: &NodeId) -> Option<TransferStatus> {
        self.entries.get(source_id).map(|e| e.status)
    }

    /// Destination id of a finished entry
    pub fn destination_of(&self, source_id: &NodeId) -> Option<NodeId> {
        self.entries
            .get(source_id)
            .and_then(|e| e.resolved_destination().cloned())
    }

    /// Inserts or replaces an entry and marks it dirty
    pub fn upsert(&self, entry: MappingEntry) {
        let id = entry.source_id().clone();
        self.entries.insert(id.clone(), entry);
        self.dirty.insert(id);
    }

    /// Applies `change` to an existing entry and marks it dirty
    ///
    /// # Returns
    /// `false` if no entry exists for `source_id`
    pub fn update<F>(&self, source_id: &NodeId, change: F) -> bool
    where
        F: FnOnce(&mut MappingEntry),
    {
        let updated = match self.entries.get_mut(source_id) {
            Some(mut entry) => {
                change(entry.value_mut());
                true
            }
            None => false,
        };
        if updated {
            self.dirty.insert(source_id.clone());
        }
        updated
    }

    /// Writes one entry to the store immediately
    ///
    /// # Errors
    ///
    /// Returns the store error; the entry stays dirty.
    pub async fn persist(&self, source_id: &NodeId) -> anyhow::Result<()> {
        let Some(entry) = self.get(source_id) else {
            return Ok(());
        };
        self.dirty.remove(source_id);
        if let Err(e) = self.store.save_entries(&self.scope, &[entry]).await {
            self.dirty.insert(source_id.clone());
            return Err(e);
        }
        Ok(())
    }

    /// Writes every dirty entry to the store in one batch
    ///
    /// # Returns
    /// The number of entries written
    ///
    /// # Errors
    ///
    /// Returns the store error; the batch stays dirty for the next
    /// checkpoint.
    pub async fn checkpoint(&self) -> anyhow::Result<usize> {
        let ids: Vec<NodeId> = self.dirty.iter().map(|id| id.key().clone()).collect();
        if ids.is_empty() {
            return Ok(0);
        }

        let mut batch = Vec::with_capacity(ids.len());
        for id in &ids {
            self.dirty.remove(id);
            if let Some(entry) = self.get(id) {
                batch.push(entry);
            }
        }

        if let Err(e) = self.store.save_entries(&self.scope, &batch).await {
            warn!(scope = %self.scope, count = batch.len(), error = %e, "Checkpoint failed");
            for id in ids {
                self.dirty.insert(id);
            }
            return Err(e);
        }

        debug!(scope = %self.scope, count = batch.len(), "Checkpointed mapping entries");
        Ok(batch.len())
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Records a destination folder created by this run
    pub fn mark_fresh(&self, destination_id: NodeId) {
        self.fresh_destinations.insert(destination_id);
    }

    /// True when `destination_id` was created by this run
    pub fn is_fresh(&self, destination_id: &NodeId) -> bool {
        self.fresh_destinations.contains(destination_id)
    }

    /// Snapshot of the entries matching `predicate`, in path order
    pub fn entries_where<P>(&self, predicate: P) -> Vec<MappingEntry>
    where
        P: Fn(&MappingEntry) -> bool,
    {
        let mut matching: Vec<MappingEntry> = self
            .entries
            .iter()
            .filter(|e| predicate(e.value()))
            .map(|e| e.value().clone())
            .collect();
        matching.sort_by(|a, b| a.path.cmp(&b.path));
        matching
    }

    /// Per-status counts over all entries
    pub fn tally(&self) -> MappingTally {
        let mut tally = MappingTally::default();
        for entry in self.entries.iter() {
            tally.record(entry.value());
        }
        tally
    }
}
