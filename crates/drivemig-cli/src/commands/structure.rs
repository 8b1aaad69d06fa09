//! Print-structure command - Shows the source and destination trees
//!
//! Both trees are walked through the same throttled provider as a
//! migration would use. Folders are listed before files, each group
//! sorted by name.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use drivemig_core::config::Config;
use drivemig_core::domain::{NodeId, NodeKind};
use drivemig_core::ports::IStorageProvider;
use drivemig_engine::compare::walk_tree;
use drivemig_engine::walker::{WalkOptions, WalkedNode};
use drivemig_engine::RetryPolicy;
use serde::Serialize;

use super::EXIT_OK;
use crate::output::{format_bytes, get_formatter, plural, OutputFormat, OutputFormatter};

#[derive(Debug)]
pub struct StructureCommand {
    pub test: bool,
}

/// One folder or file of a printed tree
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TreeEntry {
    pub id: String,
    pub name: String,
    pub kind: NodeKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeEntry>,
}

impl StructureCommand {
    pub async fn execute(
        &self,
        config: &Config,
        provider: Arc<dyn IStorageProvider>,
        format: OutputFormat,
    ) -> Result<u8> {
        let formatter = get_formatter(format);
        let (source, destination) = config.roots(self.test);
        let source = NodeId::new(source).context("Invalid source folder id")?;
        let destination = NodeId::new(destination).context("Invalid destination folder id")?;

        let retry = RetryPolicy::from_config(&config.migration);
        let options = WalkOptions {
            max_depth: config.migration.max_depth,
            max_nodes: config.migration.max_nodes,
        };

        let (source_nodes, source_errors) =
            walk_tree(provider.clone(), &source, retry.clone(), options)
                .await
                .context("Failed to walk the source tree")?;
        let (destination_nodes, destination_errors) =
            walk_tree(provider, &destination, retry, options)
                .await
                .context("Failed to walk the destination tree")?;

        let source_tree = build_tree(&source_nodes);
        let destination_tree = build_tree(&destination_nodes);

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "source": source_tree,
                "destination": destination_tree,
                "listing_errors": source_errors
                    .iter()
                    .chain(destination_errors.iter())
                    .map(|e| e.to_string())
                    .collect::<Vec<_>>(),
            }));
            return Ok(EXIT_OK);
        }

        for (title, tree) in [("Source", &source_tree), ("Destination", &destination_tree)] {
            formatter.heading(&format!("{} structure:", title));
            if let Some(tree) = tree {
                for line in render_tree(tree) {
                    formatter.info(&line);
                }
                let (folders, files, bytes) = totals(tree);
                formatter.info(&format!(
                    "{}, {}, {}",
                    plural(folders, "folder"),
                    plural(files, "file"),
                    format_bytes(bytes)
                ));
            }
        }

        report_listing_errors(
            formatter.as_ref(),
            source_errors
                .iter()
                .chain(destination_errors.iter())
                .map(|e| e.to_string()),
        );
        Ok(EXIT_OK)
    }
}

fn report_listing_errors(formatter: &dyn OutputFormatter, errors: impl Iterator<Item = String>) {
    for error in errors {
        formatter.warn(&error);
    }
}

/// Rebuilds the tree from walked nodes
///
/// Returns `None` if the walk produced no root.
pub fn build_tree(nodes: &[WalkedNode]) -> Option<TreeEntry> {
    let root = nodes.iter().find(|n| n.depth == 0)?;

    let mut children: HashMap<&NodeId, Vec<&WalkedNode>> = HashMap::new();
    for walked in nodes.iter().filter(|n| n.depth > 0) {
        if let Some(parent) = &walked.node.parent_id {
            children.entry(parent).or_default().push(walked);
        }
    }

    fn entry(walked: &WalkedNode, children: &HashMap<&NodeId, Vec<&WalkedNode>>) -> TreeEntry {
        let mut kids: Vec<TreeEntry> = children
            .get(&walked.node.id)
            .map(|list| list.iter().map(|child| entry(child, children)).collect())
            .unwrap_or_default();
        kids.sort_by(|a, b| {
            (a.kind != NodeKind::Folder, &a.name).cmp(&(b.kind != NodeKind::Folder, &b.name))
        });
        TreeEntry {
            id: walked.node.id.to_string(),
            name: walked.node.name.clone(),
            kind: walked.node.kind,
            size: walked.node.size_bytes,
            children: kids,
        }
    }

    Some(entry(root, &children))
}

/// One line per entry, indented two spaces per level
pub fn render_tree(root: &TreeEntry) -> Vec<String> {
    fn walk(entry: &TreeEntry, depth: usize, lines: &mut Vec<String>) {
        let indent = "  ".repeat(depth);
        match entry.kind {
            NodeKind::Folder => lines.push(format!("{}\u{1f4c1} {}/", indent, entry.name)),
            NodeKind::File => lines.push(format!(
                "{}\u{1f4c4} {} ({})",
                indent,
                entry.name,
                entry
                    .size
                    .map(format_bytes)
                    .unwrap_or_else(|| "native document".to_string())
            )),
        }
        for child in &entry.children {
            walk(child, depth + 1, lines);
        }
    }

    let mut lines = Vec::new();
    walk(root, 0, &mut lines);
    lines
}

/// Folders (root excluded), files and bytes below `root`
fn totals(root: &TreeEntry) -> (u64, u64, u64) {
    root.children.iter().fold((0, 0, 0), |(folders, files, bytes), child| {
        let (f, n, b) = match child.kind {
            NodeKind::Folder => {
                let (f, n, b) = totals(child);
                (f + 1, n, b)
            }
            NodeKind::File => (0, 1, child.size.unwrap_or(0)),
        };
        (folders + f, files + n, bytes + b)
    })
}
