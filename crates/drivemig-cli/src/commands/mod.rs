//! Command implementations and the setup they share
//!
//! Setup problems (missing or invalid configuration, missing access token)
//! are reported as [`SetupError`] and exit with [`EXIT_CONFIG`]; everything
//! after setup reports its own exit code.

pub mod compare;
pub mod migrate;
pub mod structure;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use drivemig_core::config::{Config, ValidationError};
use drivemig_core::ports::IStorageProvider;
use drivemig_drive::token::{load_access_token, TokenError};
use drivemig_drive::{DriveClient, GoogleDriveProvider};
use drivemig_engine::{RateLimiter, ThrottledProvider};
use thiserror::Error;
use tracing::debug;

pub const EXIT_OK: u8 = 0;
pub const EXIT_FAILURE: u8 = 1;
pub const EXIT_CONFIG: u8 = 2;

/// Configuration file looked up in the working directory first
pub const LOCAL_CONFIG_FILE: &str = "config.yaml";

/// Errors raised before any command runs
#[derive(Debug, Error)]
pub enum SetupError {
    #[error("Configuration file {} not found", .0.display())]
    MissingConfig(PathBuf),

    #[error("Failed to load configuration from {}: {source}", .path.display())]
    Load {
        path: PathBuf,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid configuration: {}", join_errors(.0))]
    Invalid(Vec<ValidationError>),

    #[error(transparent)]
    Credentials(#[from] TokenError),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

/// Picks `--config`, else `./config.yaml` if present, else the platform path
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        return path.to_path_buf();
    }
    let local = PathBuf::from(LOCAL_CONFIG_FILE);
    if local.exists() {
        local
    } else {
        Config::default_path()
    }
}

/// Loads and validates the configuration
///
/// # Errors
///
/// Returns [`SetupError`] if the file is missing, unparsable or invalid.
/// Test mode additionally requires `test.folder_id`.
pub fn load_config(path: &Path, test_mode: bool) -> Result<Config, SetupError> {
    if !path.exists() {
        return Err(SetupError::MissingConfig(path.to_path_buf()));
    }
    let config = Config::load(path).map_err(|source| SetupError::Load {
        path: path.to_path_buf(),
        source,
    })?;

    let errors = if test_mode {
        config.validate_for_test_mode()
    } else {
        config.validate()
    };
    if !errors.is_empty() {
        return Err(SetupError::Invalid(errors));
    }
    Ok(config)
}

/// Builds the rate-limited Google Drive provider
///
/// Every remote call of a command goes through the returned provider, so
/// walking, copying and validating share one budget.
///
/// # Errors
///
/// Returns [`SetupError::Credentials`] if no access token is available.
pub fn build_provider(config: &Config) -> Result<Arc<dyn IStorageProvider>, SetupError> {
    let token = load_access_token(&config.credentials.token_path)?;
    let timeout = config.migration.timeout();

    let client = DriveClient::new(token).with_timeout(timeout);
    let drive: Arc<dyn IStorageProvider> = Arc::new(GoogleDriveProvider::new(client));
    let limiter = Arc::new(RateLimiter::from_config(&config.performance));

    debug!(
        limit = limiter.limit(),
        window_secs = limiter.window().as_secs(),
        timeout_secs = timeout.as_secs(),
        "Built throttled Drive provider"
    );
    Ok(Arc::new(
        ThrottledProvider::new(drive, limiter).with_call_timeout(timeout),
    ))
}
