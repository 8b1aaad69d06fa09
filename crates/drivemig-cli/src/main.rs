//! drivemig CLI - Migrates a Google Drive folder tree into another folder
//!
//! Modes:
//! - Full migration (default), resumable after an interruption
//! - `--test`: migration of the configured test folder, capped at
//!   `test.max_test_files` files
//! - `--print-structure`: prints the source and destination trees
//! - `--compare [--detailed]`: read-only diff of source and destination
//!
//! ## Exit codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0    | Run reached `Done`, or the read-only command succeeded |
//! | 1    | Run `Failed`, or an unrecoverable error |
//! | 2    | Invalid configuration or missing credentials |
//! | 130  | Interrupted by SIGINT/SIGTERM after a graceful drain |

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use drivemig_core::config::LoggingConfig;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    build_provider, compare::CompareCommand, load_config, migrate::MigrateCommand,
    resolve_config_path, structure::StructureCommand, EXIT_CONFIG, EXIT_FAILURE,
};
use output::{get_formatter, OutputFormat};

#[derive(Debug, Parser)]
#[command(
    name = "drivemig",
    version,
    about = "Migrate a Google Drive folder tree into another folder"
)]
pub struct Cli {
    /// Configuration file (YAML or JSON)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Operate on the configured test folder, capped at test.max_test_files files
    #[arg(long)]
    test: bool,

    /// Print the source and destination trees and exit
    #[arg(long, conflicts_with = "compare")]
    print_structure: bool,

    /// Compare source and destination without transferring anything
    #[arg(long)]
    compare: bool,

    /// With --compare, list matching, different and missing entries
    #[arg(long, requires = "compare")]
    detailed: bool,

    /// Log level; RUST_LOG takes precedence
    #[arg(long, value_name = "LEVEL", value_parser = ["trace", "debug", "info", "warn", "error"])]
    log_level: Option<String>,

    /// Output in JSON format
    #[arg(long)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    /// Level used when `RUST_LOG` is unset
    fn log_level(&self, logging: &LoggingConfig) -> String {
        match (&self.log_level, self.verbose) {
            (Some(level), _) => level.clone(),
            (None, 0) => logging.level.clone(),
            (None, 1) => "debug".to_string(),
            (None, _) => "trace".to_string(),
        }
    }
}

fn init_tracing(level: &str, format: &str) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr);

    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let format = OutputFormat::from_json_flag(cli.json);
    let formatter = get_formatter(format);

    let config_path = resolve_config_path(cli.config.as_deref());
    let config = match load_config(&config_path, cli.test) {
        Ok(config) => config,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    init_tracing(&cli.log_level(&config.logging), &config.logging.format);
    info!(
        config_path = %config_path.display(),
        test_mode = cli.test,
        "Loaded configuration"
    );

    let provider = match build_provider(&config) {
        Ok(provider) => provider,
        Err(e) => {
            formatter.error(&e.to_string());
            return ExitCode::from(EXIT_CONFIG);
        }
    };

    let result = if cli.print_structure {
        StructureCommand { test: cli.test }
            .execute(&config, provider, format)
            .await
    } else if cli.compare {
        CompareCommand {
            test: cli.test,
            detailed: cli.detailed,
        }
        .execute(&config, provider, format)
        .await
    } else {
        MigrateCommand { test: cli.test }
            .execute(&config, provider, format)
            .await
    };

    match result {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            formatter.error(&format!("{:#}", e));
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
