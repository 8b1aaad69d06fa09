//! Shared test helpers for engine integration tests
//!
//! [`FakeDrive`] is an in-memory storage provider with scripted failures.
//! A failure can fire before the call takes effect, or after it (the
//! effect happens but the response is lost). [`MemoryStore`] is an
//! in-memory mapping store.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use drivemig_core::config::MigrationConfig;
use drivemig_core::domain::{
    MappingEntry, MigrationRun, Node, NodeId, NodeKind, ObjectMetadata, RunId, RunReport,
};
use drivemig_core::ports::{IMappingStore, IStorageProvider, ListPage, NodeAttributes, StorageError};
use tokio_util::sync::CancellationToken;

pub fn id(s: &str) -> NodeId {
    NodeId::new(s).unwrap()
}

/// Migration settings with short delays suitable for tests
pub fn test_migration_config() -> MigrationConfig {
    MigrationConfig {
        max_retries: 3,
        retry_delay_seconds: 1,
        max_backoff_seconds: 4,
        batch_size: 4,
        workers: 2,
        ..MigrationConfig::default()
    }
}

// ============================================================================
// FakeDrive
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    List,
    Find,
    CreateFolder,
    Copy,
    Metadata,
    GetNode,
}

#[derive(Debug, Clone)]
struct Scripted {
    op: Op,
    /// Matches a node id or a name; `None` matches any call
    subject: Option<String>,
    error: StorageError,
    after_effect: bool,
}

#[derive(Default)]
struct State {
    nodes: HashMap<NodeId, Node>,
    children: HashMap<NodeId, Vec<NodeId>>,
    next_id: u64,
    calls: HashMap<Op, usize>,
    failures: VecDeque<Scripted>,
    corruptions: HashMap<String, u32>,
    /// Names or ids whose next copy never answers
    stalls: Vec<String>,
}

/// Tracks copies in progress and the highest number seen at once
#[derive(Default)]
struct Concurrency {
    current: AtomicUsize,
    peak: AtomicUsize,
}

struct InFlight<'a>(&'a Concurrency);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a Concurrency) -> Self {
        let now = counter.current.fetch_add(1, Ordering::SeqCst) + 1;
        counter.peak.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.current.fetch_sub(1, Ordering::SeqCst);
    }
}

/// In-memory remote store
pub struct FakeDrive {
    state: Mutex<State>,
    page_size: usize,
    copy_delay: Option<Duration>,
    cancel_after: Mutex<Option<(usize, CancellationToken)>>,
    copies: Concurrency,
}

impl FakeDrive {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
            page_size: 100,
            copy_delay: None,
            cancel_after: Mutex::new(None),
            copies: Concurrency::default(),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Every copy takes `delay` before it lands
    pub fn with_copy_delay(mut self, delay: Duration) -> Self {
        self.copy_delay = Some(delay);
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, State> {
        self.state.lock().unwrap()
    }

    pub fn add_node(&self, node: Node) -> NodeId {
        let mut state = self.state();
        let node_id = node.id.clone();
        if let Some(parent) = &node.parent_id {
            state
                .children
                .entry(parent.clone())
                .or_default()
                .push(node_id.clone());
        }
        state.nodes.insert(node_id.clone(), node);
        node_id
    }

    pub fn add_folder(&self, parent: Option<&str>, folder_id: &str, name: &str) -> NodeId {
        self.add_node(Node::folder(id(folder_id), name, parent.map(id)))
    }

    pub fn add_file(&self, parent: &str, file_id: &str, name: &str, size: u64) -> NodeId {
        self.add_node(
            Node::file(id(file_id), name, id(parent), size)
                .with_checksum(format!("md5-{}", file_id))
                .with_mime_type("text/plain"),
        )
    }

    /// The next matching call fails without taking effect
    pub fn fail_next(&self, op: Op, subject: Option<&str>, error: StorageError) {
        self.script(op, subject, error, false);
    }

    /// The next matching call takes effect, then reports `error`
    pub fn lose_next_response(&self, op: Op, subject: Option<&str>, error: StorageError) {
        self.script(op, subject, error, true);
    }

    fn script(&self, op: Op, subject: Option<&str>, error: StorageError, after_effect: bool) {
        self.state().failures.push_back(Scripted {
            op,
            subject: subject.map(String::from),
            error,
            after_effect,
        });
    }

    /// Cancels `token` once `copies` copy calls have completed
    pub fn cancel_after_copies(&self, copies: usize, token: CancellationToken) {
        *self.cancel_after.lock().unwrap() = Some((copies, token));
    }

    /// The next copy of `subject` (an id or a name) hangs without effect
    pub fn stall_next_copy(&self, subject: &str) {
        self.state().stalls.push(subject.to_string());
    }

    /// Most copy calls ever in progress at the same time
    pub fn peak_concurrent_copies(&self) -> usize {
        self.copies.peak.load(Ordering::SeqCst)
    }

    /// The next `times` copies of the file named `name` come out damaged
    pub fn corrupt_copies_of(&self, name: &str, times: u32) {
        self.state().corruptions.insert(name.to_string(), times);
    }

    pub fn calls(&self, op: Op) -> usize {
        self.state().calls.get(&op).copied().unwrap_or(0)
    }

    pub fn children_of(&self, folder_id: &NodeId) -> Vec<Node> {
        let state = self.state();
        state
            .children
            .get(folder_id)
            .map(|ids| ids.iter().filter_map(|i| state.nodes.get(i).cloned()).collect())
            .unwrap_or_default()
    }

    pub fn child_named(&self, folder_id: &NodeId, name: &str) -> Option<Node> {
        self.children_of(folder_id).into_iter().find(|n| n.name == name)
    }

    pub fn count_named(&self, folder_id: &NodeId, name: &str) -> usize {
        self.children_of(folder_id)
            .iter()
            .filter(|n| n.name == name)
            .count()
    }

    /// Counts calls and pops the first scripted failure matching the call
    fn begin(&self, op: Op, keys: &[&str]) -> Option<Scripted> {
        let mut state = self.state();
        *state.calls.entry(op).or_default() += 1;
        let position = state.failures.iter().position(|s| {
            s.op == op
                && s.subject
                    .as_deref()
                    .map_or(true, |subject| keys.contains(&subject))
        })?;
        state.failures.remove(position)
    }

    fn not_found(node_id: &NodeId) -> StorageError {
        StorageError::NotFound(node_id.to_string())
    }
}

#[async_trait]
impl IStorageProvider for FakeDrive {
    async fn list_children(
        &self,
        folder_id: &NodeId,
        page_token: Option<&str>,
    ) -> Result<ListPage, StorageError> {
        if let Some(s) = self.begin(Op::List, &[folder_id.as_str()]) {
            return Err(s.error);
        }
        let children = self.children_of(folder_id);
        let offset: usize = page_token.and_then(|t| t.parse().ok()).unwrap_or(0);
        let end = (offset + self.page_size).min(children.len());
        Ok(ListPage {
            nodes: children[offset.min(end)..end].to_vec(),
            next_page_token: (end < children.len()).then(|| end.to_string()),
        })
    }

    async fn find_child(
        &self,
        parent_id: &NodeId,
        name: &str,
        kind: NodeKind,
    ) -> Result<Option<Node>, StorageError> {
        if let Some(s) = self.begin(Op::Find, &[parent_id.as_str(), name]) {
            return Err(s.error);
        }
        Ok(self
            .children_of(parent_id)
            .into_iter()
            .find(|n| n.name == name && n.kind == kind))
    }

    async fn create_folder(
        &self,
        parent_id: &NodeId,
        name: &str,
        attributes: &NodeAttributes,
    ) -> Result<NodeId, StorageError> {
        let scripted = self.begin(Op::CreateFolder, &[parent_id.as_str(), name]);
        if let Some(s) = scripted.as_ref().filter(|s| !s.after_effect) {
            return Err(s.error.clone());
        }
        let created = {
            let mut state = self.state();
            state.next_id += 1;
            id(&format!("new-folder-{}", state.next_id))
        };
        let mut folder = Node::folder(created.clone(), name, Some(parent_id.clone()));
        folder.modified_time = attributes.modified_time;
        self.add_node(folder);
        match scripted {
            Some(s) => Err(s.error),
            None => Ok(created),
        }
    }

    async fn copy_file(
        &self,
        source_id: &NodeId,
        destination_parent_id: &NodeId,
        name: &str,
        attributes: &NodeAttributes,
    ) -> Result<NodeId, StorageError> {
        let _in_flight = InFlight::enter(&self.copies);
        let scripted = self.begin(Op::Copy, &[source_id.as_str(), name]);
        if let Some(s) = scripted.as_ref().filter(|s| !s.after_effect) {
            return Err(s.error.clone());
        }
        let stalled = {
            let mut state = self.state();
            let position = state
                .stalls
                .iter()
                .position(|s| s == source_id.as_str() || s == name);
            position.map(|p| state.stalls.remove(p)).is_some()
        };
        if stalled {
            std::future::pending::<()>().await;
        }
        if let Some(delay) = self.copy_delay {
            tokio::time::sleep(delay).await;
        }

        let copied = {
            let mut state = self.state();
            let source = state
                .nodes
                .get(source_id)
                .cloned()
                .ok_or_else(|| Self::not_found(source_id))?;
            state.next_id += 1;
            let copy_id = id(&format!("copy-{}", state.next_id));

            let mut copy = source;
            copy.id = copy_id.clone();
            copy.name = name.to_string();
            copy.parent_id = Some(destination_parent_id.clone());
            copy.modified_time = attributes.modified_time;
            copy.sharing = attributes.sharing.clone();
            if let Some(remaining) = state.corruptions.get_mut(name) {
                if *remaining > 0 {
                    *remaining -= 1;
                    copy.size_bytes = copy.size_bytes.map(|s| s + 1);
                    copy.checksum = Some("corrupted".to_string());
                }
            }
            copy
        };
        let copy_id = self.add_node(copied);
        if let Some((limit, token)) = self.cancel_after.lock().unwrap().as_ref() {
            if self.calls(Op::Copy) >= *limit {
                token.cancel();
            }
        }
        match scripted {
            Some(s) => Err(s.error),
            None => Ok(copy_id),
        }
    }

    async fn get_metadata(&self, node_id: &NodeId) -> Result<ObjectMetadata, StorageError> {
        if let Some(s) = self.begin(Op::Metadata, &[node_id.as_str()]) {
            return Err(s.error);
        }
        self.state()
            .nodes
            .get(node_id)
            .map(Node::metadata)
            .ok_or_else(|| Self::not_found(node_id))
    }

    async fn get_node(&self, node_id: &NodeId) -> Result<Node, StorageError> {
        if let Some(s) = self.begin(Op::GetNode, &[node_id.as_str()]) {
            return Err(s.error);
        }
        self.state()
            .nodes
            .get(node_id)
            .cloned()
            .ok_or_else(|| Self::not_found(node_id))
    }
}

// ============================================================================
// MemoryStore
// ============================================================================

#[derive(Default)]
struct StoreState {
    entries: HashMap<String, HashMap<NodeId, MappingEntry>>,
    runs: Vec<(MigrationRun, bool)>,
    reports: Vec<RunReport>,
    save_entry_calls: usize,
}

/// In-memory mapping store
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<StoreState>,
}

impl MemoryStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn entry(&self, scope: &str, source_id: &NodeId) -> Option<MappingEntry> {
        self.state
            .lock()
            .unwrap()
            .entries
            .get(scope)
            .and_then(|e| e.get(source_id).cloned())
    }

    pub fn entries(&self, scope: &str) -> Vec<MappingEntry> {
        self.state
            .lock()
            .unwrap()
            .entries
            .get(scope)
            .map(|e| e.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn reports(&self) -> Vec<RunReport> {
        self.state.lock().unwrap().reports.clone()
    }

    pub fn run(&self, run_id: &RunId) -> Option<(MigrationRun, bool)> {
        self.state
            .lock()
            .unwrap()
            .runs
            .iter()
            .find(|(r, _)| r.id() == run_id)
            .cloned()
    }
}

#[async_trait]
impl IMappingStore for MemoryStore {
    async fn save_run(&self, run: &MigrationRun) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.runs.iter_mut().find(|(r, _)| r.id() == run.id()) {
            Some(slot) => slot.0 = run.clone(),
            None => state.runs.push((run.clone(), false)),
        }
        Ok(())
    }

    async fn find_resumable_run(&self, scope: &str) -> anyhow::Result<Option<MigrationRun>> {
        let state = self.state.lock().unwrap();
        Ok(state
            .runs
            .iter()
            .rev()
            .find(|(r, archived)| !archived && !r.state().is_terminal() && r.scope() == scope)
            .map(|(r, _)| r.clone()))
    }

    async fn archive_run(&self, run: &MigrationRun, report: &RunReport) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        match state.runs.iter_mut().find(|(r, _)| r.id() == run.id()) {
            Some(slot) => *slot = (run.clone(), true),
            None => state.runs.push((run.clone(), true)),
        }
        state.reports.push(report.clone());
        Ok(())
    }

    async fn load_entries(&self, scope: &str) -> anyhow::Result<Vec<MappingEntry>> {
        Ok(self.entries(scope))
    }

    async fn get_entry(
        &self,
        scope: &str,
        source_id: &NodeId,
    ) -> anyhow::Result<Option<MappingEntry>> {
        Ok(self.entry(scope, source_id))
    }

    async fn save_entries(&self, scope: &str, entries: &[MappingEntry]) -> anyhow::Result<()> {
        let mut state = self.state.lock().unwrap();
        state.save_entry_calls += 1;
        let table = state.entries.entry(scope.to_string()).or_default();
        for entry in entries {
            table.insert(entry.source_id().clone(), entry.clone());
        }
        Ok(())
    }
}
