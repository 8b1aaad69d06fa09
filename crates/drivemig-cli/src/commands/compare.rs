//! Compare command - Diffs the source tree against the destination
//!
//! Nothing is transferred. Entries are matched by their path relative to
//! each root, so the command works on destinations produced by any tool.

use std::sync::Arc;

use anyhow::{Context, Result};
use drivemig_core::config::Config;
use drivemig_core::domain::NodeId;
use drivemig_core::ports::IStorageProvider;
use drivemig_engine::compare::{compare_trees, TreeComparison, TreeStats};
use drivemig_engine::walker::WalkOptions;
use drivemig_engine::RetryPolicy;

use super::EXIT_OK;
use crate::output::{
    format_bytes, format_duration, get_formatter, plural, print_capped, OutputFormat,
    OutputFormatter,
};

/// Entries listed per section in human output
const LIST_LIMIT: usize = 10;
/// File types shown per tree in human output
const TOP_FILE_TYPES: usize = 5;

#[derive(Debug)]
pub struct CompareCommand {
    pub test: bool,
    pub detailed: bool,
}

impl CompareCommand {
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

        let comparison = compare_trees(
            provider,
            &source,
            &destination,
            RetryPolicy::from_config(&config.migration),
            WalkOptions {
                max_depth: config.migration.max_depth,
                max_nodes: config.migration.max_nodes,
            },
            self.detailed,
        )
        .await
        .context("Comparison failed")?;

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&comparison)?);
        } else {
            print_comparison(formatter.as_ref(), &comparison);
        }
        Ok(EXIT_OK)
    }
}

fn print_stats(formatter: &dyn OutputFormatter, title: &str, stats: &TreeStats) {
    formatter.heading(title);
    formatter.info(&format!(
        "{}, {}, {}",
        plural(stats.files, "file"),
        plural(stats.folders, "folder"),
        format_bytes(stats.total_bytes)
    ));
    formatter.info(&format!(
        "Depth: max {}, average {:.1}",
        stats.depth.max_depth, stats.depth.average_depth
    ));
    for (extension, types) in stats.top_file_types(TOP_FILE_TYPES) {
        formatter.info(&format!(
            "  .{:<12} {:>6}  {}",
            extension,
            types.count,
            format_bytes(types.total_bytes)
        ));
    }
}

fn print_comparison(formatter: &dyn OutputFormatter, comparison: &TreeComparison) {
    print_stats(formatter, "Source:", &comparison.source);
    print_stats(formatter, "Destination:", &comparison.destination);

    let d = &comparison.discrepancies;
    if !d.missing_files.is_empty() {
        formatter.heading(&format!("Missing files ({}):", d.missing_files.len()));
        print_capped(formatter, &d.missing_files, LIST_LIMIT, |f| {
            format!("{} ({})", f.path, format_bytes(f.size))
        });
    }
    if !d.size_mismatches.is_empty() {
        formatter.heading(&format!("Size mismatches ({}):", d.size_mismatches.len()));
        print_capped(formatter, &d.size_mismatches, LIST_LIMIT, |m| {
            format!(
                "{}: {} -> {}",
                m.path,
                format_bytes(m.source_size),
                format_bytes(m.destination_size)
            )
        });
    }
    if !d.checksum_mismatches.is_empty() {
        formatter.heading(&format!(
            "Checksum mismatches ({}):",
            d.checksum_mismatches.len()
        ));
        print_capped(formatter, &d.checksum_mismatches, LIST_LIMIT, |p| p.clone());
    }
    if !d.missing_folders.is_empty() {
        formatter.heading(&format!("Missing folders ({}):", d.missing_folders.len()));
        print_capped(formatter, &d.missing_folders, LIST_LIMIT, |p| p.clone());
    }
    if !d.extra_folders.is_empty() {
        formatter.heading(&format!("Extra folders ({}):", d.extra_folders.len()));
        print_capped(formatter, &d.extra_folders, LIST_LIMIT, |p| p.clone());
    }

    if let Some(details) = &comparison.details {
        formatter.heading("Details:");
        formatter.info(&format!("Matching files:   {}", details.matching_files.len()));
        print_capped(formatter, &details.matching_files, LIST_LIMIT, |p| p.clone());
        formatter.info(&format!("Different files:  {}", details.different_files.len()));
        print_capped(formatter, &details.different_files, LIST_LIMIT, |m| {
            m.path.clone()
        });
        formatter.info(&format!("Missing files:    {}", details.missing_files.len()));
        print_capped(formatter, &details.missing_files, LIST_LIMIT, |p| p.clone());
        formatter.info(&format!(
            "Matching folders: {}",
            details.matching_folders.len()
        ));
        print_capped(formatter, &details.matching_folders, LIST_LIMIT, |p| {
            p.clone()
        });
        formatter.info(&format!("Missing folders:  {}", details.missing_folders.len()));
        print_capped(formatter, &details.missing_folders, LIST_LIMIT, |p| p.clone());
        formatter.info(&format!("Extra folders:    {}", details.extra_folders.len()));
        print_capped(formatter, &details.extra_folders, LIST_LIMIT, |p| p.clone());
    }

    for error in &comparison.listing_errors {
        formatter.warn(error);
    }

    formatter.heading("Summary:");
    formatter.info(&format!(
        "Completion: {:.1}%",
        comparison.completion_percent
    ));
    formatter.info(&format!(
        "Compared in {} ({:.1} files/s)",
        format_duration(comparison.elapsed_secs),
        comparison.files_per_second
    ));
    if comparison.is_identical() {
        formatter.success("Destination matches source");
    } else {
        formatter.warn("Destination differs from source");
    }
}
