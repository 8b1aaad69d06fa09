//! Remote tree walker
//!
//! [`TreeWalker`] enumerates the source tree depth-first, one node at a
//! time. It is pull-based: nothing is listed until the caller asks for the
//! next node, so memory stays bounded by the depth of the tree and the
//! width of one listing page rather than by the size of the tree.
//!
//! ## Ordering
//!
//! - The root folder is emitted first
//! - A folder is always emitted before any of its children
//! - The files of a folder are emitted before its subfolders are entered
//!
//! ## Resumption
//!
//! The whole walker position lives in a serializable [`WalkCursor`]. A
//! walker rebuilt from a checkpointed cursor continues from the same
//! position; nodes emitted after the checkpoint are emitted again.
//!
//! The cursor stays proportional to the depth of the tree and the size of
//! the pending stack. Folders already walked are tracked in memory only;
//! after a resume, cycles are still caught against the chain of folders
//! leading to the current one.

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use drivemig_core::domain::{Node, NodeId};
use drivemig_core::ports::IStorageProvider;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::WalkError;
use crate::retry::{with_retry, RetryPolicy};

/// One node produced by the walker
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkedNode {
    /// The node, with `parent_id` set to the folder it was listed from
    pub node: Node,
    /// `/`-separated path relative to the root; empty for the root itself
    pub path: String,
    /// Zero for the root
    pub depth: usize,
}

/// Safety limits for one walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalkOptions {
    pub max_depth: usize,
    pub max_nodes: u64,
}

impl Default for WalkOptions {
    fn default() -> Self {
        Self {
            max_depth: 64,
            max_nodes: 1_000_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Listing {
    folder: WalkedNode,
    /// Token of the next page to fetch; `None` before the first page
    page_token: Option<String>,
    /// Subfolders seen so far, entered once the listing completes
    subfolders: Vec<WalkedNode>,
}

/// Serializable position of a [`TreeWalker`]
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkCursor {
    /// Folders waiting to be emitted and listed, top of stack last
    stack: Vec<WalkedNode>,
    /// Folder currently being listed
    listing: Option<Listing>,
    /// Listed nodes not yet emitted
    buffer: VecDeque<WalkedNode>,
    /// Ids of the entered folders from the root down, one per depth
    trail: Vec<NodeId>,
    #[serde(skip)]
    visited: HashSet<NodeId>,
    skipped: HashSet<NodeId>,
    emitted: u64,
    finished: bool,
}

impl WalkCursor {
    /// Cursor positioned before the root
    pub fn at_root(root: Node) -> Self {
        let mut root = root;
        root.parent_id = None;
        Self {
            stack: vec![WalkedNode {
                node: root,
                path: String::new(),
                depth: 0,
            }],
            ..Default::default()
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    /// Nodes emitted so far
    pub fn emitted(&self) -> u64 {
        self.emitted
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

fn join_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", parent, name)
    }
}

// ============================================================================
// TreeWalker
// ============================================================================

/// Depth-first walker over the remote source tree
pub struct TreeWalker {
    provider: Arc<dyn IStorageProvider>,
    retry: RetryPolicy,
    options: WalkOptions,
    cursor: WalkCursor,
}

impl TreeWalker {
    /// Creates a walker starting at `root`
    pub fn new(
        provider: Arc<dyn IStorageProvider>,
        root: Node,
        retry: RetryPolicy,
        options: WalkOptions,
    ) -> Self {
        Self::from_cursor(provider, WalkCursor::at_root(root), retry, options)
    }

    /// Rebuilds a walker from a checkpointed cursor
    pub fn from_cursor(
        provider: Arc<dyn IStorageProvider>,
        cursor: WalkCursor,
        retry: RetryPolicy,
        options: WalkOptions,
    ) -> Self {
        Self {
            provider,
            retry,
            options,
            cursor,
        }
    }

    pub fn cursor(&self) -> &WalkCursor {
        &self.cursor
    }

    /// Prevents the descendants of `folder_id` from being listed or emitted
    ///
    /// Used when a folder could not be mapped to the destination. Takes
    /// effect immediately for a folder that was just emitted.
    pub fn skip_subtree(&mut self, folder_id: &NodeId) {
        self.cursor.skipped.insert(folder_id.clone());
        if self
            .cursor
            .listing
            .as_ref()
            .is_some_and(|l| &l.folder.node.id == folder_id)
        {
            self.cursor.listing = None;
        }
        self.cursor
            .buffer
            .retain(|n| n.node.parent_id.as_ref() != Some(folder_id));
    }

    fn emit(&mut self, walked: WalkedNode) -> Option<Result<WalkedNode, WalkError>> {
        if self.cursor.emitted >= self.options.max_nodes {
            self.cursor.finished = true;
            return Some(Err(WalkError::TooManyNodes {
                limit: self.options.max_nodes,
            }));
        }
        self.cursor.emitted += 1;
        Some(Ok(walked))
    }

    /// Returns the next node, `None` once the tree is exhausted
    ///
    /// An `Err` abandons one subtree; calling `next` again continues the
    /// walk, except after [`WalkError::TooManyNodes`].
    ///
    /// Cancelling the returned future leaves the cursor unchanged.
    pub async fn next(&mut self) -> Option<Result<WalkedNode, WalkError>> {
        loop {
            if let Some(walked) = self.cursor.buffer.pop_front() {
                return self.emit(walked);
            }
            if self.cursor.finished {
                return None;
            }

            if let Some(listing) = &self.cursor.listing {
                let folder = listing.folder.clone();
                let page_token = listing.page_token.clone();
                let provider = &self.provider;
                let folder_id = &folder.node.id;
                let token = page_token.as_deref();

                let page = with_retry(&self.retry, "list_children", move |_| {
                    provider.list_children(folder_id, token)
                })
                .await;

                match page {
                    Ok(page) => self.absorb_page(&folder, page.nodes, page.next_page_token),
                    Err(reason) => {
                        warn!(
                            folder_id = %folder.node.id,
                            path = %folder.path,
                            error = %reason,
                            "Listing failed, abandoning subtree"
                        );
                        self.cursor.listing = None;
                        return Some(Err(WalkError::List {
                            folder_id: folder.node.id,
                            path: folder.path,
                            reason,
                        }));
                    }
                }
                continue;
            }

            let Some(folder) = self.cursor.stack.pop() else {
                debug!(emitted = self.cursor.emitted, "Walk finished");
                self.cursor.finished = true;
                return None;
            };

            if self.cursor.skipped.contains(&folder.node.id) {
                continue;
            }
            self.cursor.trail.truncate(folder.depth);
            let revisit = self.cursor.trail.contains(&folder.node.id)
                || !self.cursor.visited.insert(folder.node.id.clone());
            if revisit {
                return Some(Err(WalkError::Cycle {
                    folder_id: folder.node.id,
                    path: folder.path,
                }));
            }
            if folder.depth > self.options.max_depth {
                return Some(Err(WalkError::DepthExceeded {
                    folder_id: folder.node.id,
                    path: folder.path,
                    depth: self.options.max_depth,
                }));
            }
            self.cursor.trail.push(folder.node.id.clone());

            self.cursor.listing = Some(Listing {
                folder: folder.clone(),
                page_token: None,
                subfolders: Vec::new(),
            });
            return self.emit(folder);
        }
    }

    fn absorb_page(
        &mut self,
        folder: &WalkedNode,
        nodes: Vec<Node>,
        next_page_token: Option<String>,
    ) {
        let Some(listing) = self.cursor.listing.as_mut() else {
            return;
        };

        for mut node in nodes {
            node.parent_id = Some(folder.node.id.clone());
            let walked = WalkedNode {
                path: join_path(&folder.path, &node.name),
                depth: folder.depth + 1,
                node,
            };
            if walked.node.is_folder() {
                listing.subfolders.push(walked);
            } else {
                self.cursor.buffer.push_back(walked);
            }
        }

        match next_page_token {
            Some(token) => listing.page_token = Some(token),
            None => {
                if let Some(done) = self.cursor.listing.take() {
                    self.cursor.stack.extend(done.subfolders.into_iter().rev());
                }
            }
        }
    }

    /// Drains the walker, collecting nodes and errors
    ///
    /// Stops early after a fatal error.
    pub async fn collect(mut self) -> (Vec<WalkedNode>, Vec<WalkError>) {
        let mut nodes = Vec::new();
        let mut errors = Vec::new();
        while let Some(next) = self.next().await {
            match next {
                Ok(walked) => nodes.push(walked),
                Err(err) => {
                    let fatal = err.is_fatal();
                    errors.push(err);
                    if fatal {
                        break;
                    }
                }
            }
        }
        (nodes, errors)
    }
}
