//! Read-only tree comparison
//!
//! Walks a source and a destination tree with the same [`TreeWalker`]
//! the migration uses and compares them by relative path. Nothing is
//! written to either side and no mapping state is consulted, so the
//! comparison also works for trees copied by other tools.
//!
//! ## Matching
//!
//! Files are matched by path. A matched pair whose sizes differ is a size
//! mismatch; otherwise, if both sides report a checksum and they differ,
//! it is a checksum mismatch. Folders are compared as path sets.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use drivemig_core::domain::{Node, NodeId};
use drivemig_core::ports::IStorageProvider;
use serde::Serialize;
use tracing::info;

use crate::error::{MigrationError, WalkError};
use crate::retry::{with_retry, RetryPolicy};
use crate::walker::{TreeWalker, WalkOptions, WalkedNode};

/// Extension key for files without one
pub const NO_EXTENSION: &str = "no_extension";

// ============================================================================
// Statistics
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TypeStats {
    pub count: u64,
    pub total_bytes: u64,
}

/// Folder depth statistics; a top-level folder has depth 0
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DepthStats {
    pub max_depth: usize,
    pub average_depth: f64,
    pub distribution: BTreeMap<usize, u64>,
}

/// Totals of one tree; the root folder itself is not counted
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TreeStats {
    pub files: u64,
    pub folders: u64,
    pub total_bytes: u64,
    pub file_types: BTreeMap<String, TypeStats>,
    pub depth: DepthStats,
}

impl TreeStats {
    pub fn from_nodes(nodes: &[WalkedNode]) -> Self {
        let mut stats = TreeStats::default();
        let mut depth_sum = 0usize;

        for walked in nodes.iter().filter(|w| w.depth > 0) {
            if walked.node.is_folder() {
                let depth = walked.depth - 1;
                stats.folders += 1;
                depth_sum += depth;
                stats.depth.max_depth = stats.depth.max_depth.max(depth);
                *stats.depth.distribution.entry(depth).or_default() += 1;
            } else {
                let bytes = walked.node.size_bytes.unwrap_or(0);
                stats.files += 1;
                stats.total_bytes += bytes;
                let types = stats.file_types.entry(extension_of(&walked.path)).or_default();
                types.count += 1;
                types.total_bytes += bytes;
            }
        }
        if stats.folders > 0 {
            stats.depth.average_depth = depth_sum as f64 / stats.folders as f64;
        }
        stats
    }

    /// The `n` most common extensions, most frequent first
    pub fn top_file_types(&self, n: usize) -> Vec<(&str, &TypeStats)> {
        let mut types: Vec<_> = self
            .file_types
            .iter()
            .map(|(ext, stats)| (ext.as_str(), stats))
            .collect();
        types.sort_by(|a, b| b.1.count.cmp(&a.1.count).then(a.0.cmp(b.0)));
        types.truncate(n);
        types
    }
}

/// Lower-cased text after the last dot of the path, as the original
/// tooling keyed its type breakdown
fn extension_of(path: &str) -> String {
    match path.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => NO_EXTENSION.to_string(),
    }
}

// ============================================================================
// Discrepancies
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MissingFile {
    pub path: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SizeMismatch {
    pub path: String,
    pub source_size: u64,
    pub destination_size: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Discrepancies {
    pub missing_files: Vec<MissingFile>,
    pub size_mismatches: Vec<SizeMismatch>,
    pub checksum_mismatches: Vec<String>,
    pub missing_folders: Vec<String>,
    pub extra_folders: Vec<String>,
}

impl Discrepancies {
    pub fn is_empty(&self) -> bool {
        self.missing_files.is_empty()
            && self.size_mismatches.is_empty()
            && self.checksum_mismatches.is_empty()
            && self.missing_folders.is_empty()
            && self.extra_folders.is_empty()
    }
}

/// Per-path lists produced for a detailed comparison
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ComparisonDetails {
    pub matching_files: Vec<String>,
    pub different_files: Vec<SizeMismatch>,
    pub missing_files: Vec<String>,
    pub matching_folders: Vec<String>,
    pub missing_folders: Vec<String>,
    pub extra_folders: Vec<String>,
}

/// Result of comparing two trees
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeComparison {
    pub source: TreeStats,
    pub destination: TreeStats,
    pub discrepancies: Discrepancies,
    /// Destination files as a percentage of source files
    pub completion_percent: f64,
    pub elapsed_secs: f64,
    /// Files listed on both sides per second of walking
    pub files_per_second: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<ComparisonDetails>,
    /// Folders that could not be listed; their contents are absent
    pub listing_errors: Vec<String>,
}

impl TreeComparison {
    /// Compares two walked trees
    ///
    /// # Arguments
    /// * `source` - Nodes of the source tree, root included
    /// * `destination` - Nodes of the destination tree, root included
    /// * `detailed` - Also produce the per-path [`ComparisonDetails`]
    pub fn from_nodes(source: &[WalkedNode], destination: &[WalkedNode], detailed: bool) -> Self {
        let source_files = files_by_path(source);
        let destination_files = files_by_path(destination);
        let source_folders = folder_paths(source);
        let destination_folders = folder_paths(destination);

        let mut discrepancies = Discrepancies::default();
        let mut matching_files = Vec::new();

        for (path, file) in &source_files {
            let source_size = file.size_bytes.unwrap_or(0);
            let Some(copy) = destination_files.get(path) else {
                discrepancies.missing_files.push(MissingFile {
                    path: (*path).to_string(),
                    size: source_size,
                });
                continue;
            };

            let destination_size = copy.size_bytes.unwrap_or(0);
            if source_size != destination_size {
                discrepancies.size_mismatches.push(SizeMismatch {
                    path: (*path).to_string(),
                    source_size,
                    destination_size,
                });
            } else if checksums_differ(file, copy) {
                discrepancies.checksum_mismatches.push((*path).to_string());
            } else {
                matching_files.push((*path).to_string());
            }
        }

        discrepancies.missing_folders = source_folders
            .difference(&destination_folders)
            .map(|p| (*p).to_string())
            .collect();
        discrepancies.extra_folders = destination_folders
            .difference(&source_folders)
            .map(|p| (*p).to_string())
            .collect();
        discrepancies.missing_files.sort_by(|a, b| a.path.cmp(&b.path));
        discrepancies.size_mismatches.sort_by(|a, b| a.path.cmp(&b.path));
        discrepancies.checksum_mismatches.sort();
        matching_files.sort();

        let details = detailed.then(|| ComparisonDetails {
            matching_files,
            different_files: discrepancies.size_mismatches.clone(),
            missing_files: discrepancies
                .missing_files
                .iter()
                .map(|f| f.path.clone())
                .collect(),
            matching_folders: source_folders
                .intersection(&destination_folders)
                .map(|p| (*p).to_string())
                .collect(),
            missing_folders: discrepancies.missing_folders.clone(),
            extra_folders: discrepancies.extra_folders.clone(),
        });

        let completion_percent = if source_files.is_empty() {
            100.0
        } else {
            destination_files.len() as f64 / source_files.len() as f64 * 100.0
        };

        Self {
            source: TreeStats::from_nodes(source),
            destination: TreeStats::from_nodes(destination),
            discrepancies,
            completion_percent,
            elapsed_secs: 0.0,
            files_per_second: 0.0,
            details,
            listing_errors: Vec::new(),
        }
    }

    /// True when the trees hold the same folders and matching files
    pub fn is_identical(&self) -> bool {
        self.discrepancies.is_empty() && self.listing_errors.is_empty()
    }
}

fn files_by_path(nodes: &[WalkedNode]) -> HashMap<&str, &Node> {
    nodes
        .iter()
        .filter(|w| w.node.is_file())
        .map(|w| (w.path.as_str(), &w.node))
        .collect()
}

fn folder_paths(nodes: &[WalkedNode]) -> BTreeSet<&str> {
    nodes
        .iter()
        .filter(|w| w.node.is_folder() && w.depth > 0)
        .map(|w| w.path.as_str())
        .collect()
}

fn checksums_differ(source: &Node, destination: &Node) -> bool {
    match (&source.checksum, &destination.checksum) {
        (Some(a), Some(b)) => !a.eq_ignore_ascii_case(b),
        _ => false,
    }
}

// ============================================================================
// Remote entry points
// ============================================================================

/// Walks one tree to completion
///
/// # Returns
/// The root and every node below it, plus the folders that could not be
/// listed
///
/// # Errors
///
/// Fails if the root is unreachable or not a folder, or if the walk hits
/// its node limit.
pub async fn walk_tree(
    provider: Arc<dyn IStorageProvider>,
    root_id: &NodeId,
    retry: RetryPolicy,
    options: WalkOptions,
) -> Result<(Vec<WalkedNode>, Vec<WalkError>), MigrationError> {
    let root = {
        let provider = &provider;
        with_retry(&retry, "get_node", move |_| provider.get_node(root_id))
            .await
            .map_err(|e| MigrationError::Fatal(format!("Cannot access folder {}: {}", root_id, e)))?
    };
    if !root.is_folder() {
        return Err(MigrationError::Fatal(format!("{} is not a folder", root_id)));
    }

    let (nodes, errors) = TreeWalker::new(provider, root, retry, options)
        .collect()
        .await;
    if let Some(fatal) = errors.iter().find(|e| e.is_fatal()) {
        return Err(fatal.clone().into());
    }
    Ok((nodes, errors))
}

/// Compares a source tree with a destination tree
///
/// # Errors
///
/// As [`walk_tree`], for either side.
pub async fn compare_trees(
    provider: Arc<dyn IStorageProvider>,
    source_root: &NodeId,
    destination_root: &NodeId,
    retry: RetryPolicy,
    options: WalkOptions,
    detailed: bool,
) -> Result<TreeComparison, MigrationError> {
    let started = Instant::now();
    info!(source = %source_root, destination = %destination_root, "Comparing trees");

    let (source, destination) = tokio::join!(
        walk_tree(provider.clone(), source_root, retry.clone(), options),
        walk_tree(provider, destination_root, retry, options),
    );
    let (source_nodes, source_errors) = source?;
    let (destination_nodes, destination_errors) = destination?;

    let mut comparison = TreeComparison::from_nodes(&source_nodes, &destination_nodes, detailed);
    comparison.listing_errors = source_errors
        .iter()
        .chain(destination_errors.iter())
        .map(|e| e.to_string())
        .collect();

    let elapsed = started.elapsed().as_secs_f64();
    comparison.elapsed_secs = elapsed;
    if elapsed > 0.0 {
        comparison.files_per_second =
            (comparison.source.files + comparison.destination.files) as f64 / elapsed;
    }

    info!(
        source_files = comparison.source.files,
        destination_files = comparison.destination.files,
        completion = %format!("{:.1}", comparison.completion_percent),
        identical = comparison.is_identical(),
        "Comparison finished"
    );
    Ok(comparison)
}
