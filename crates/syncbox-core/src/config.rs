//! Configuration module for Syncbox.
//!
//! Provides typed configuration structs that map to the YAML configuration file,
//! with loading, validation, defaults, and a builder pattern for programmatic use.
//! [`Config`] also implements the [`ISyncSettings`] port consumed by the
//! coordination layer.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::domain::{RetryPolicy, SyncboxId};
use crate::ports::ISyncSettings;

// ---------------------------------------------------------------------------
// Config struct with sub-sections
// ---------------------------------------------------------------------------

/// Top-level configuration for Syncbox.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub retry: RetryConfig,
    pub transfers: TransfersConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

/// Synchronization scope settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Server-assigned id of the syncbox this client mirrors.
    pub syncbox_id: i64,
    /// Root directory of the local mirror.
    pub root: PathBuf,
    /// Where downloads are staged before they are completed.
    pub temp_download_folder: Option<PathBuf>,
    /// Folder for trace output; `None` disables tracing to disk.
    pub trace_folder: Option<PathBuf>,
    /// Version string reported to the server.
    pub client_version: String,
}

/// Retry caps for queued changes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Transient failures tolerated per change before it is abandoned.
    pub max_failure_retries: u8,
    /// Not-found failures tolerated per change before it is abandoned.
    pub max_not_founds: u8,
    /// Debounce interval (ms) of the shared download-error timer.
    pub download_error_delay_ms: u64,
}

/// Concurrency limits handed to the driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransfersConfig {
    pub max_concurrent_uploads: u32,
    pub max_concurrent_downloads: u32,
}

/// Persistent queue store location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the SQLite queue database.
    pub database: PathBuf,
}

/// Logging / tracing settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level: `trace`, `debug`, `info`, `warn`, or `error`.
    pub level: String,
    /// Path to the log file.
    pub file: PathBuf,
}

// ---------------------------------------------------------------------------
// Config::load()
// ---------------------------------------------------------------------------

impl Config {
    /// Load configuration from a YAML file at `path`.
    ///
    /// Paths starting with `~` are expanded to the home directory.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config.with_expanded_paths())
    }

    /// Expands a leading `~` in every path setting.
    pub fn with_expanded_paths(mut self) -> Self {
        self.sync.root = expand_tilde(&self.sync.root);
        self.sync.temp_download_folder =
            self.sync.temp_download_folder.as_deref().map(expand_tilde);
        self.sync.trace_folder = self.sync.trace_folder.as_deref().map(expand_tilde);
        self.storage.database = expand_tilde(&self.storage.database);
        self.logging.file = expand_tilde(&self.logging.file);
        self
    }

    /// Try to load from `path`; fall back to [`Config::default`] on any error.
    pub fn load_or_default(path: &Path) -> Self {
        Self::load(path).unwrap_or_default()
    }

    /// Platform-appropriate default path for the configuration file.
    ///
    /// Typically `$XDG_CONFIG_HOME/syncbox/config.yaml` on Linux.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("~/.config"))
            .join("syncbox")
            .join("config.yaml")
    }

    /// Serialize the configuration back to YAML.
    pub fn to_yaml(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }
}

// ---------------------------------------------------------------------------
// Config::default()
// ---------------------------------------------------------------------------

fn data_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("~/.local/share"))
        .join("syncbox")
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            syncbox_id: 1,
            root: dirs::home_dir()
                .unwrap_or_else(|| PathBuf::from("~"))
                .join("Syncbox"),
            temp_download_folder: Some(data_dir().join("downloads")),
            trace_folder: None,
            client_version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        let policy = RetryPolicy::default();
        Self {
            max_failure_retries: policy.max_failure_retries,
            max_not_founds: policy.max_not_founds,
            download_error_delay_ms: 5_000,
        }
    }
}

impl Default for TransfersConfig {
    fn default() -> Self {
        Self {
            max_concurrent_uploads: 4,
            max_concurrent_downloads: 8,
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database: data_dir().join("queue.db"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: data_dir().join("syncbox.log"),
        }
    }
}

// ---------------------------------------------------------------------------
// Config::validate()
// ---------------------------------------------------------------------------

/// A single validation error found in the configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationError {
    /// Dotted path to the offending field, e.g. `"retry.download_error_delay_ms"`.
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

/// Expands a leading `~` to the home directory.
///
/// Paths without the prefix, or any path when no home directory is known,
/// are returned unchanged.
pub fn expand_tilde(path: &Path) -> PathBuf {
    match path.strip_prefix("~") {
        Ok(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| path.to_path_buf()),
        Err(_) => path.to_path_buf(),
    }
}

fn is_absolute_or_tilde(path: &Path) -> bool {
    path.is_absolute() || path.to_string_lossy().starts_with('~')
}

impl Config {
    /// Validate the configuration and return all errors found.
    ///
    /// An empty vector means the configuration is valid.
    pub fn validate(&self) -> Vec<ValidationError> {
        let mut errors = Vec::new();
        let mut push = |field: &str, message: String| {
            errors.push(ValidationError {
                field: field.into(),
                message,
            });
        };

        // --- sync ---
        if self.sync.syncbox_id <= 0 {
            push("sync.syncbox_id", "must be greater than 0".into());
        }
        if !is_absolute_or_tilde(&self.sync.root) {
            push(
                "sync.root",
                format!("must be an absolute path: {}", self.sync.root.display()),
            );
        }
        if let Some(folder) = &self.sync.temp_download_folder {
            if !is_absolute_or_tilde(folder) {
                push(
                    "sync.temp_download_folder",
                    format!("must be an absolute path: {}", folder.display()),
                );
            }
        }
        if self.sync.client_version.trim().is_empty() {
            push("sync.client_version", "must not be empty".into());
        }

        // --- retry ---
        if self.retry.download_error_delay_ms == 0 {
            push("retry.download_error_delay_ms", "must be greater than 0".into());
        }

        // --- transfers ---
        if self.transfers.max_concurrent_uploads == 0 {
            push("transfers.max_concurrent_uploads", "must be greater than 0".into());
        }
        if self.transfers.max_concurrent_downloads == 0 {
            push("transfers.max_concurrent_downloads", "must be greater than 0".into());
        }

        // --- logging ---
        if !VALID_LOG_LEVELS.contains(&self.logging.level.as_str()) {
            push(
                "logging.level",
                format!(
                    "invalid level '{}'; valid options: {}",
                    self.logging.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            );
        }

        errors
    }
}

// ---------------------------------------------------------------------------
// ISyncSettings implementation
// ---------------------------------------------------------------------------

impl ISyncSettings for Config {
    fn syncbox_id(&self) -> SyncboxId {
        SyncboxId::new(self.sync.syncbox_id)
    }

    fn trace_folder(&self) -> Option<&Path> {
        self.sync.trace_folder.as_deref()
    }

    fn client_version(&self) -> &str {
        &self.sync.client_version
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.retry.max_failure_retries, self.retry.max_not_founds)
    }

    fn temp_download_folder(&self) -> Option<&Path> {
        self.sync.temp_download_folder.as_deref()
    }

    fn download_error_delay(&self) -> Duration {
        Duration::from_millis(self.retry.download_error_delay_ms)
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
/// use syncbox_core::config::ConfigBuilder;
/// use std::path::PathBuf;
///
/// let config = ConfigBuilder::new()
///     .sync_root(PathBuf::from("/home/user/Syncbox"))
///     .retry_max_failure_retries(5)
///     .logging_level("debug")
///     .build();
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

    // --- sync ---

    pub fn syncbox_id(mut self, id: i64) -> Self {
        self.config.sync.syncbox_id = id;
        self
    }

    pub fn sync_root(mut self, root: PathBuf) -> Self {
        self.config.sync.root = root;
        self
    }

    pub fn temp_download_folder(mut self, folder: Option<PathBuf>) -> Self {
        self.config.sync.temp_download_folder = folder;
        self
    }

    pub fn trace_folder(mut self, folder: Option<PathBuf>) -> Self {
        self.config.sync.trace_folder = folder;
        self
    }

    pub fn client_version(mut self, version: impl Into<String>) -> Self {
        self.config.sync.client_version = version.into();
        self
    }

    // --- retry ---

    pub fn retry_max_failure_retries(mut self, n: u8) -> Self {
        self.config.retry.max_failure_retries = n;
        self
    }

    pub fn retry_max_not_founds(mut self, n: u8) -> Self {
        self.config.retry.max_not_founds = n;
        self
    }

    pub fn retry_download_error_delay_ms(mut self, ms: u64) -> Self {
        self.config.retry.download_error_delay_ms = ms;
        self
    }

    // --- transfers ---

    pub fn max_concurrent_uploads(mut self, n: u32) -> Self {
        self.config.transfers.max_concurrent_uploads = n;
        self
    }

    pub fn max_concurrent_downloads(mut self, n: u32) -> Self {
        self.config.transfers.max_concurrent_downloads = n;
        self
    }

    // --- storage / logging ---

    pub fn storage_database(mut self, path: PathBuf) -> Self {
        self.config.storage.database = path;
        self
    }

    pub fn logging_level(mut self, level: impl Into<String>) -> Self {
        self.config.logging.level = level.into();
        self
    }

    pub fn logging_file(mut self, file: PathBuf) -> Self {
        self.config.logging.file = file;
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

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // -- Defaults --

    #[test]
    fn default_config_has_sensible_values() {
        let cfg = Config::default();
        assert_eq!(cfg.sync.syncbox_id, 1);
        assert!(cfg.sync.root.to_string_lossy().contains("Syncbox"));
        assert!(cfg.sync.trace_folder.is_none());
        assert_eq!(cfg.retry.max_failure_retries, 3);
        assert_eq!(cfg.retry.max_not_founds, 2);
        assert_eq!(cfg.retry.download_error_delay_ms, 5_000);
        assert_eq!(cfg.transfers.max_concurrent_uploads, 4);
        assert_eq!(cfg.transfers.max_concurrent_downloads, 8);
        assert!(cfg.storage.database.ends_with("syncbox/queue.db"));
        assert_eq!(cfg.logging.level, "info");
    }

    #[test]
    fn default_config_passes_validation() {
        let errors = Config::default().validate();
        assert!(errors.is_empty(), "unexpected validation errors: {errors:?}");
    }

    // -- Loading --

    #[test]
    fn load_from_yaml_file() {
        let yaml = r#"
sync:
  syncbox_id: 42
  root: /tmp/test-syncbox
  temp_download_folder: /tmp/test-syncbox-downloads
  trace_folder: /tmp/trace
  client_version: "2.1.0"
retry:
  max_failure_retries: 5
  max_not_founds: 1
  download_error_delay_ms: 250
transfers:
  max_concurrent_uploads: 2
  max_concurrent_downloads: 3
storage:
  database: /tmp/queue.db
logging:
  level: debug
  file: /tmp/test.log
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.sync.syncbox_id, 42);
        assert_eq!(cfg.sync.root, PathBuf::from("/tmp/test-syncbox"));
        assert_eq!(cfg.sync.trace_folder, Some(PathBuf::from("/tmp/trace")));
        assert_eq!(cfg.sync.client_version, "2.1.0");
        assert_eq!(cfg.retry.max_failure_retries, 5);
        assert_eq!(cfg.retry.max_not_founds, 1);
        assert_eq!(cfg.retry.download_error_delay_ms, 250);
        assert_eq!(cfg.transfers.max_concurrent_uploads, 2);
        assert_eq!(cfg.storage.database, PathBuf::from("/tmp/queue.db"));
        assert_eq!(cfg.logging.level, "debug");
    }

    #[test]
    fn load_partial_yaml_fills_defaults() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"logging:\n  level: warn\n  file: /tmp/x.log\n")
            .unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        assert_eq!(cfg.logging.level, "warn");
        assert_eq!(cfg.retry.max_failure_retries, 3);
    }

    #[test]
    fn load_or_default_returns_default_on_missing_file() {
        let cfg = Config::load_or_default(Path::new("/nonexistent/config.yaml"));
        assert_eq!(cfg.retry.download_error_delay_ms, 5_000);
    }

    #[test]
    fn load_returns_error_on_invalid_yaml() {
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(b"not: [valid: yaml: {{{").unwrap();
        tmp.flush().unwrap();

        assert!(Config::load(tmp.path()).is_err());
    }

    #[test]
    fn yaml_roundtrip() {
        let cfg = ConfigBuilder::new().syncbox_id(7).build();
        let yaml = cfg.to_yaml().unwrap();
        let parsed: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed.sync.syncbox_id, 7);
    }

    // -- Validation --

    #[test]
    fn validate_catches_non_positive_syncbox_id() {
        let cfg = ConfigBuilder::new().syncbox_id(0).build();
        assert!(cfg.validate().iter().any(|e| e.field == "sync.syncbox_id"));
    }

    #[test]
    fn validate_catches_relative_paths() {
        let cfg = ConfigBuilder::new()
            .sync_root(PathBuf::from("relative/root"))
            .temp_download_folder(Some(PathBuf::from("tmp")))
            .build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "sync.root"));
        assert!(errors.iter().any(|e| e.field == "sync.temp_download_folder"));
    }

    #[test]
    fn expand_tilde_leaves_absolute_paths() {
        assert_eq!(
            expand_tilde(Path::new("/var/lib/syncbox/queue.db")),
            PathBuf::from("/var/lib/syncbox/queue.db")
        );
    }

    #[test]
    fn expand_tilde_uses_home() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(
                expand_tilde(Path::new("~/syncbox/queue.db")),
                home.join("syncbox/queue.db")
            );
        }
    }

    #[test]
    fn load_expands_tilde_in_staging_folder() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let yaml = r#"
sync:
  syncbox_id: 3
  root: ~/Syncbox
  temp_download_folder: ~/.local/share/syncbox/downloads
  trace_folder: null
  client_version: "1.0"
storage:
  database: ~/queue.db
"#;
        let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
        tmp.write_all(yaml.as_bytes()).unwrap();
        tmp.flush().unwrap();

        let cfg = Config::load(tmp.path()).expect("load config");
        let staging = ISyncSettings::temp_download_folder(&cfg).unwrap();
        assert!(staging.is_absolute());
        assert_eq!(staging, home.join(".local/share/syncbox/downloads"));
        assert_eq!(cfg.sync.root, home.join("Syncbox"));
        assert_eq!(cfg.storage.database, home.join("queue.db"));
    }

    #[test]
    fn validate_accepts_tilde_paths() {
        let cfg = ConfigBuilder::new()
            .sync_root(PathBuf::from("~/Syncbox"))
            .build();
        assert!(cfg.validate().is_empty());
    }

    #[test]
    fn validate_catches_zero_delay_and_concurrency() {
        let cfg = ConfigBuilder::new()
            .retry_download_error_delay_ms(0)
            .max_concurrent_uploads(0)
            .max_concurrent_downloads(0)
            .build();
        let errors = cfg.validate();
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn validate_catches_invalid_log_level() {
        let cfg = ConfigBuilder::new().logging_level("verbose").build();
        let errors = cfg.validate();
        assert!(errors.iter().any(|e| e.field == "logging.level"));
    }

    #[test]
    fn validate_accepts_all_valid_log_levels() {
        for level in VALID_LOG_LEVELS {
            let cfg = ConfigBuilder::new().logging_level(*level).build();
            assert!(cfg.validate().is_empty(), "level {level} should be valid");
        }
    }

    #[test]
    fn validate_catches_empty_client_version() {
        let cfg = ConfigBuilder::new().client_version("  ").build();
        assert!(cfg
            .validate()
            .iter()
            .any(|e| e.field == "sync.client_version"));
    }

    // -- Settings port --

    #[test]
    fn config_implements_sync_settings() {
        let cfg = ConfigBuilder::new()
            .syncbox_id(11)
            .retry_max_failure_retries(4)
            .retry_max_not_founds(1)
            .retry_download_error_delay_ms(750)
            .trace_folder(Some(PathBuf::from("/tmp/trace")))
            .client_version("9.9")
            .build();
        let settings: &dyn ISyncSettings = &cfg;

        assert_eq!(settings.syncbox_id(), SyncboxId::new(11));
        assert_eq!(settings.retry_policy(), RetryPolicy::new(4, 1));
        assert_eq!(settings.download_error_delay(), Duration::from_millis(750));
        assert_eq!(settings.trace_folder(), Some(Path::new("/tmp/trace")));
        assert_eq!(settings.client_version(), "9.9");
    }

    // -- Builder --

    #[test]
    fn builder_build_validated_fails_for_invalid_config() {
        let result = ConfigBuilder::new()
            .syncbox_id(-1)
            .logging_level("nope")
            .build_validated();
        let errors = result.unwrap_err();
        assert!(errors.len() >= 2);
    }

    #[test]
    fn builder_build_validated_succeeds_for_valid_config() {
        let result = ConfigBuilder::new()
            .sync_root(PathBuf::from("/srv/syncbox"))
            .build_validated();
        assert!(result.is_ok());
    }

    // -- default_path --

    #[test]
    fn default_path_ends_with_config_yaml() {
        let p = Config::default_path();
        assert!(p.ends_with("syncbox/config.yaml"));
    }

    #[test]
    fn validation_error_display() {
        let err = ValidationError {
            field: "retry.download_error_delay_ms".into(),
            message: "must be greater than 0".into(),
        };
        assert_eq!(
            err.to_string(),
            "retry.download_error_delay_ms: must be greater than 0"
        );
    }
}
