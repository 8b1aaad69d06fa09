//! Migrate command - Runs (or resumes) a migration
//!
//! 1. Opens the SQLite state database holding the mapping table
//! 2. Builds the orchestrator over the throttled Drive provider
//! 3. Installs SIGINT/SIGTERM handlers that trigger a graceful drain
//! 4. Runs to a terminal state and renders the final report

use std::sync::Arc;

use anyhow::{Context, Result};
use drivemig_cache::{DatabasePool, SqliteMappingStore};
use drivemig_core::config::Config;
use drivemig_core::domain::{RunOutcome, RunReport};
use drivemig_core::ports::IStorageProvider;
use drivemig_engine::{MigrationOptions, MigrationOrchestrator};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::EXIT_CONFIG;
use crate::output::{
    format_bytes, format_duration, get_formatter, plural, print_capped, OutputFormat,
    OutputFormatter,
};

/// Failures listed in human output before truncating
const FAILURE_LIST_LIMIT: usize = 10;

#[derive(Debug)]
pub struct MigrateCommand {
    pub test: bool,
}

impl MigrateCommand {
    /// Runs the migration and returns the process exit code
    pub async fn execute(
        &self,
        config: &Config,
        provider: Arc<dyn IStorageProvider>,
        format: OutputFormat,
    ) -> Result<u8> {
        let formatter = get_formatter(format);

        let options = match MigrationOptions::from_config(config, self.test) {
            Ok(options) => options,
            Err(e) => {
                formatter.error(&e.to_string());
                return Ok(EXIT_CONFIG);
            }
        };

        let db_path = &config.state.database_path;
        let pool = DatabasePool::new(db_path)
            .await
            .context("Failed to open state database")?;
        let store = Arc::new(SqliteMappingStore::new(pool.pool().clone()));
        info!(database = %db_path.display(), "Opened state database");

        if self.test {
            formatter.info(&format!(
                "Test mode: at most {} from {}",
                plural(config.test.max_test_files as u64, "file"),
                options.source_root
            ));
        }
        formatter.info(&format!(
            "Migrating {} -> {}",
            options.source_root, options.destination_root
        ));

        let cancel = CancellationToken::new();
        tokio::spawn(shutdown_signal(cancel.clone()));

        let orchestrator = MigrationOrchestrator::new(provider, store, options);
        let report = orchestrator.run(cancel).await;
        pool.close().await;

        if format.is_json() {
            formatter.print_json(&serde_json::to_value(&report)?);
        } else {
            print_report(formatter.as_ref(), &report);
            if let Some(dir) = &orchestrator.options().report_directory {
                formatter.info(&format!(
                    "Report: {}",
                    dir.join(report.file_name()).display()
                ));
            }
        }
        Ok(report.exit_code())
    }
}

/// Waits for SIGTERM or SIGINT and triggers the cancellation token
///
/// In-flight transfers finish, state is checkpointed and the run exits
/// as interrupted; running drivemig again resumes it.
async fn shutdown_signal(token: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C), draining in-flight transfers");
        }
        _ = terminate => {
            info!("Received SIGTERM, draining in-flight transfers");
        }
    }

    token.cancel();
}

fn print_report(formatter: &dyn OutputFormatter, report: &RunReport) {
    match report.outcome {
        RunOutcome::Done if report.failures.is_empty() => formatter.success(&format!(
            "Migration completed in {}",
            format_duration(report.elapsed_secs)
        )),
        RunOutcome::Done => formatter.warn(&format!(
            "Migration completed in {} with {}",
            format_duration(report.elapsed_secs),
            plural(report.failures.len() as u64, "failure")
        )),
        RunOutcome::Interrupted => formatter.warn(
            "Migration interrupted; run drivemig again with the same configuration to resume",
        ),
        RunOutcome::Failed => formatter.error(&format!(
            "Migration failed: {}",
            report.fatal_error.as_deref().unwrap_or("unknown error")
        )),
    }

    formatter.info(&format!("Run:        {}", report.run_id));
    if report.resumed {
        formatter.info("Resumed:    yes");
    }
    formatter.info(&format!(
        "Folders:    {} ({} created, {} reused)",
        report.folders, report.folders_created, report.folders_reused
    ));
    formatter.info(&format!(
        "Files:      {} ({} successful, {} failed, {} skipped)",
        report.files, report.successful, report.failed, report.skipped
    ));
    if report.validated > 0 || report.validation_mismatches > 0 {
        formatter.info(&format!(
            "Validated:  {} ({} mismatched, {} repaired)",
            report.validated, report.validation_mismatches, report.repaired
        ));
    }
    formatter.info(&format!(
        "Copied:     {}",
        format_bytes(report.bytes_transferred)
    ));
    if report.files_per_second > 0.0 {
        formatter.info(&format!("Speed:      {:.1} files/s", report.files_per_second));
    }

    if !report.failures.is_empty() {
        formatter.heading("Failures:");
        print_capped(formatter, &report.failures, FAILURE_LIST_LIMIT, |f| {
            format!("[{:?}] {} ({}): {}", f.kind, f.path, f.source_id, f.reason)
        });
    }
}
