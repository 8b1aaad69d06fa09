//! Configuration module for drivemig.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! JSON configuration files are accepted as well since JSON parses as YAML.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for drivemig.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub source: SourceConfig,
    pub destination: DestinationConfig,
    pub migration: MigrationConfig,
    pub performance: PerformanceConfig,
    pub test: TestConfig,
    pub credentials: CredentialsConfig,
    pub state: StateConfig,
    pub logging: LoggingConfig,
}

/// Source tree location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Id of the folder whose contents are migrated.
    pub folder_id: String,
}

/// Destination tree location.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DestinationConfig {
    /// Id of the folder the source contents are copied into.
    pub folder_id: String,
}

/// Migration engine behaviour.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Copy source `modified_time` onto created folders and copied files.
    pub preserve_dates: bool,
    /// Recreate source sharing grants on created folders and copied files.
    pub preserve_sharing: bool,
    /// Maximum attempts per remote operation, and maximum repairs per file.
    pub max_retries: u32,
    /// Base delay of the exponential backoff.
    pub retry_delay_seconds: u64,
    /// Upper bound of a single backoff delay.
    pub max_backoff_seconds: u64,
    /// Validate every copy against the source checksum.
    pub validate_checksums: bool,
    /// Deadline of a single remote attempt.
    pub timeout_seconds: u64,
    /// Tasks between mapping checkpoints; also bounds the task queue.
    pub batch_size: usize,
    /// Re-copy files that fail validation.
    pub auto_fix_missing: bool,
    /// Re-validate every succeeded file after the transfer phase.
    pub final_validation: bool,
    /// Size of the transfer worker pool.
    pub workers: usize,
    /// Deepest folder nesting the walker will descend into.
    pub max_depth: usize,
    /// Sanity limit on the number of nodes a single walk may visit.
    pub max_nodes: u64,
}

/// Global API budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    /// API calls allowed per window.
    pub user_rate_limit: u32,
    /// Window length in seconds.
    pub user_time_window: u64,
}

/// `--test` mode settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TestConfig {
    /// Source subfolder used instead of `source.folder_id`.
    pub folder_id: Option<String>,
    /// Destination folder for test runs; defaults to `destination.folder_id`.
    pub destination_folder_id: Option<String>,
    /// Maximum number of files a test run transfers.
    pub max_test_files: usize,
}

/// Access credentials.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    /// JSON file holding the OAuth access token.
    pub token_path: PathBuf,
}

/// Durable state locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// SQLite database holding the mapping table.
    pub database_path: PathBuf,
    /// Directory final JSON reports are written to.
    pub report_directory: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Output format: `text` or `json`.
    pub format: String,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML (or JSON) file at `path`.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/drivemig/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("drivemig")
            .join("config.yaml")
    }

    /// Source and destination roots for a run, honouring test mode.
    pub fn roots(&self, test_mode: bool) -> (String, String) {
        if test_mode {
            let source = self
                .test
                .folder_id
                .clone()
                .unwrap_or_else(|| self.source.folder_id.clone());
            let destination = self
                .test
                .destination_folder_id
                .clone()
                .unwrap_or_else(|| self.destination.folder_id.clone());
            (source, destination)
        } else {
            (
                self.source.folder_id.clone(),
                self.destination.folder_id.clone(),
            )
        }
    }
}

impl MigrationConfig {
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_seconds)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_secs(self.max_backoff_seconds)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

impl PerformanceConfig {
    pub fn window(&self) -> Duration {
        Duration::from_secs(self.user_time_window)
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            preserve_dates: true,
            preserve_sharing: false,
            max_retries: 3,
            retry_delay_seconds: 1,
            max_backoff_seconds: 64,
            validate_checksums: true,
            timeout_seconds: 300,
            batch_size: 100,
            auto_fix_missing: true,
            final_validation: true,
            workers: 4,
            max_depth: 64,
            max_nodes: 1_000_000,
        }
    }
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            user_rate_limit: 12_000,
            user_time_window: 60,
        }
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self {
            folder_id: None,
            destination_folder_id: None,
            max_test_files: 10,
        }
    }
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            token_path: PathBuf::from("./token.json"),
        }
    }
}

impl Default for StateConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("~/.local/share"))
            .join("drivemig");
        Self {
            database_path: data_dir.join("state.db"),
            report_directory: PathBuf::from("./reports"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"migration.batch_size"`.
    pub field: String,
    /// Human-readable explanation.
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Valid values for `logging.level`.
const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Valid values for `logging.format`.
const VALID_LOG_FORMATS: &[&str] = &["text", "json"];

/// Values shipped in sample configurations that must be replaced.
const PLACEHOLDER_IDS: &[&str] = &["folder_id", "replace_me", "changeme", "xxx", "todo"];

/// Returns why `id` is not a usable folder id, or `None` if it looks real.
fn folder_id_problem(id: &str) -> Option<String> {
    let trimmed = id.trim();
    if trimmed.is_empty() {
        return Some("is required".to_string());
    }
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("your_")
        || lower.starts_with("your-")
        || (trimmed.starts_with('<') && trimmed.ends_with('>'))
        || PLACEHOLDER_IDS.contains(&lower.as_str())
    {
        return Some(format!("'{}' is a placeholder, set a real folder id", id));
    }
    if !trimmed
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
    {
        return Some(format!("'{}' contains invalid characters", id));
    }
    None
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();

        // --- roots ---
        if let Some(message) = folder_id_problem(&self.source.folder_id) {
            errors.push(ValidationError {
                field: "source.folder_id".into(),
                message,
            });
        }
        if let Some(message) = folder_id_problem(&self.destination.folder_id) {
            errors.push(ValidationError {
                field: "destination.folder_id".into(),
                message,
            });
        }
        if !self.source.folder_id.is_empty()
            && self.source.folder_id == self.destination.folder_id
        {
            errors.push(ValidationError {
                field: "destination.folder_id".into(),
                message: "must differ from source.folder_id".into(),
            });
        }

        // --- migration ---
        if self.migration.max_retries == 0 {
            errors.push(ValidationError {
                field: "migration.max_retries".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.migration.timeout_seconds == 0 {
            errors.push(ValidationError {
                field: "migration.timeout_seconds".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.migration.batch_size == 0 {
            errors.push(ValidationError {
                field: "migration.batch_size".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.migration.workers == 0 || self.migration.workers > 64 {
            errors.push(ValidationError {
                field: "migration.workers".into(),
                message: "must be in range 1..=64".into(),
            });
        }
        if self.migration.max_depth == 0 {
            errors.push(ValidationError {
                field: "migration.max_depth".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.migration.max_nodes == 0 {
            errors.push(ValidationError {
                field: "migration.max_nodes".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.migration.max_backoff_seconds < self.migration.retry_delay_seconds {
            errors.push(ValidationError {
                field: "migration.max_backoff_seconds".into(),
                message: format!(
                    "max_backoff_seconds ({}) must not be below retry_delay_seconds ({})",
                    self.migration.max_backoff_seconds, self.migration.retry_delay_seconds
                ),
            });
        }

        // --- performance ---
        if self.performance.user_rate_limit == 0 {
            errors.push(ValidationError {
                field: "performance.user_rate_limit".into(),
                message: "must be greater than 0".into(),
            });
        }
        if self.performance.user_time_window == 0 {
            errors.push(ValidationError {
                field: "performance.user_time_window".into(),
                message: "must be greater than 0".into(),
            });
        }

        // --- test ---
        if self.test.max_test_files == 0 {
            errors.push(ValidationError {
                field: "test.max_test_files".into(),
                message: "must be greater than 0".into(),
            });
        }
        for (field, value) in [
            ("test.folder_id", &self.test.folder_id),
            ("test.destination_folder_id", &self.test.destination_folder_id),
        ] {
            if let Some(message) = value.as_deref().and_then(folder_id_problem) {
                errors.push(ValidationError {
                    field: field.into(),
                    message,
                });
            }
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            errors.push(ValidationError {
                field: "logging.level".into(),
                message: format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            });
        }
        if !VALID_LOG_FORMATS.contains(&self.logging.format.as_str()) {
            errors.push(ValidationError {
                field: "logging.format".into(),
                message: format!(
                    "invalid format '{}'; valid options: {}",
                    self.logging.format,
                    VALID_LOG_FORMATS.join(", ")
                ),
            });
        }

        errors
    }

    /// Validation for `--test` runs: everything in [`validate`](Self::validate)
    /// plus a required `test.folder_id`.
    pub fn validate_for_test_mode(&self) -> Vec<ValidationError> {
        let mut errors = self.validate();
        if self.test.folder_id.is_none() {
            errors.push(ValidationError {
                field: "test.folder_id".into(),
                message: "is required in test mode".into(),
            });
        }
        errors
    }
}

// ---------------------------------------------------------------------------
// ConfigBuilder
// ---------------------------------------------------------------------------

/// Builder for constructing a [`Config`] programmatically.
///
/// Starts from [`Config::default`] and allows selective overrides.
///
/// # Example
///
/// ```rust,no_run
/// use drivemig_core::config::ConfigBuilder;
///
/// let config = ConfigBuilder::new()
///     .source_folder_id("1AbCdEf")
///     .destination_folder_id("9ZyXwV")
///     .max_retries(5)
///     .build_validated()
///     .expect("valid configuration");
/// ```
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    /// Create a new builder initialised with [`Config::default`] values.
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    // --- roots ---

    pub fn source_folder_id(mut self, id: impl Into<String>) -> Self {
        self.config.source.folder_id = id.into();
        self
    }

    pub fn destination_folder_id(mut self, id: impl Into<String>) -> Self {
        self.config.destination.folder_id = id.into();
        self
    }

    // --- migration ---

    pub fn preserve_dates(mut self, enabled: bool) -> Self {
        self.config.migration.preserve_dates = enabled;
        self
    }

    pub fn preserve_sharing(mut self, enabled: bool) -> Self {
        self.config.migration.preserve_sharing = enabled;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.migration.max_retries = n;
        self
    }

    pub fn retry_delay_seconds(mut self, seconds: u64) -> Self {
        self.config.migration.retry_delay_seconds = seconds;
        self
    }

    pub fn validate_checksums(mut self, enabled: bool) -> Self {
        self.config.migration.validate_checksums = enabled;
        self
    }

    pub fn timeout_seconds(mut self, seconds: u64) -> Self {
        self.config.migration.timeout_seconds = seconds;
        self
    }

    pub fn batch_size(mut self, n: usize) -> Self {
        self.config.migration.batch_size = n;
        self
    }

    pub fn auto_fix_missing(mut self, enabled: bool) -> Self {
        self.config.migration.auto_fix_missing = enabled;
        self
    }

    pub fn final_validation(mut self, enabled: bool) -> Self {
        self.config.migration.final_validation = enabled;
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.migration.workers = n;
        self
    }

    // --- performance ---

    pub fn user_rate_limit(mut self, n: u32) -> Self {
        self.config.performance.user_rate_limit = n;
        self
    }

    pub fn user_time_window(mut self, seconds: u64) -> Self {
        self.config.performance.user_time_window = seconds;
        self
    }

    // --- test ---

    pub fn test_folder_id(mut self, id: impl Into<String>) -> Self {
        self.config.test.folder_id = Some(id.into());
        self
    }

    pub fn max_test_files(mut self, n: usize) -> Self {
        self.config.test.max_test_files = n;
        self
    }

    // --- state / logging ---

    pub fn database_path(mut self, path: PathBuf) -> Self {
        self.config.state.database_path = path;
        self
    }

    pub fn report_directory(mut self, path: PathBuf) -> Self {
        self.config.state.report_directory = path;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    // --- build ---

    /// Consume the builder and return the finished [`Config`].
    pub fn build(self) -> Config {
        self.config
    }

    /// Build and validate in one step. Returns `Err` with the list of
    /// validation errors if the configuration is invalid.
    pub fn build_validated(self) -> Result<Config, Vec<ValidationError>> {
        let config = self.build();
        let errors = config.validate();
        if errors.is_empty() {
            Ok(config)
        } else {
            Err(errors)
        }
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
