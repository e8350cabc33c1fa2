//! Config command - View and manage Syncbox configuration
//!
//! Provides the `syncbox config` CLI command which:
//! 1. Shows the effective configuration (YAML or JSON)
//! 2. Sets individual configuration values via dot-notation keys
//! 3. Validates the configuration file and reports errors
//! 4. Prints the configuration file location

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Subcommand;
use syncbox_core::config::Config;
use tracing::info;

use super::CommandContext;
use crate::output::OutputFormat;

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Display current configuration
    Show,
    /// Set a configuration value
    Set {
        /// Configuration key (e.g., "retry.max_failure_retries")
        key: String,
        /// New value
        value: String,
    },
    /// Validate configuration file
    Validate,
    /// Print the configuration file path
    Path,
}

/// Keys accepted by `config set`, with a short description
const SETTABLE_KEYS: &[(&str, &str)] = &[
    ("sync.syncbox_id", "Server-assigned syncbox id"),
    ("sync.root", "Local mirror directory"),
    ("sync.temp_download_folder", "Download staging folder (none to unset)"),
    ("sync.trace_folder", "Trace output folder (none to unset)"),
    ("sync.client_version", "Version reported to the server"),
    ("retry.max_failure_retries", "Transient failures before abandoning"),
    ("retry.max_not_founds", "Not-found failures before abandoning"),
    ("retry.download_error_delay_ms", "Download retry debounce (ms)"),
    ("transfers.max_concurrent_uploads", "Parallel uploads"),
    ("transfers.max_concurrent_downloads", "Parallel downloads"),
    ("storage.database", "Queue store path"),
    ("logging.level", "trace|debug|info|warn|error"),
    ("logging.file", "Log file path"),
];

impl ConfigCommand {
    pub async fn execute(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        match self {
            ConfigCommand::Show => self.execute_show(ctx, format),
            ConfigCommand::Set { key, value } => self.execute_set(ctx, key, value, format),
            ConfigCommand::Validate => self.execute_validate(ctx, format),
            ConfigCommand::Path => self.execute_path(ctx, format),
        }
    }

    fn execute_show(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let formatter = ctx.formatter(format);
        info!(config_path = %ctx.config_path.display(), "Showing configuration");

        if format.is_json() {
            let json = serde_json::to_value(&ctx.config)
                .context("Failed to serialize configuration to JSON")?;
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success(&format!("Configuration ({})", ctx.config_path.display()));
        if !ctx.config_path.exists() {
            formatter.info("(file not found, showing defaults)");
        }
        formatter.info("");
        let yaml = ctx
            .config
            .to_yaml()
            .context("Failed to serialize configuration to YAML")?;
        for line in yaml.lines() {
            formatter.info(line);
        }
        Ok(())
    }

    fn execute_set(
        &self,
        ctx: &CommandContext,
        key: &str,
        value: &str,
        format: OutputFormat,
    ) -> Result<()> {
        let formatter = ctx.formatter(format);
        let config_path = &ctx.config_path;
        let mut config = ctx.config.clone();

        info!(key = %key, value = %value, "Setting configuration value");

        if let Err(e) = apply_config_value(&mut config, key, value) {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "error": e.to_string(),
                }));
            } else {
                formatter.error(&format!("Failed to set '{key}': {e}"));
                formatter.info("");
                formatter.info("Supported keys:");
                for (name, description) in SETTABLE_KEYS {
                    formatter.info(&format!("  {name:<38} {description}"));
                }
            }
            return Ok(());
        }

        let errors: Vec<String> = config
            .validate()
            .iter()
            .filter(|e| e.field == key)
            .map(|e| e.message.clone())
            .collect();
        if !errors.is_empty() {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "success": false,
                    "key": key,
                    "value": value,
                    "errors": errors,
                }));
            } else {
                formatter.error(&format!("Invalid value for '{key}': {}", errors.join("; ")));
            }
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create configuration directory")?;
        }
        let yaml = config.to_yaml().context("Failed to serialize configuration")?;
        std::fs::write(config_path, yaml).context("Failed to write configuration file")?;

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "key": key,
                "value": value,
                "config_path": config_path.display().to_string(),
            }));
        } else {
            formatter.success(&format!("Set {key} = {value}"));
            formatter.info(&format!("Saved to {}", config_path.display()));
        }
        Ok(())
    }

    fn execute_validate(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let formatter = ctx.formatter(format);
        let config_path = &ctx.config_path;

        if !config_path.exists() {
            if format.is_json() {
                formatter.print_json(&serde_json::json!({
                    "valid": false,
                    "config_path": config_path.display().to_string(),
                    "errors": ["Configuration file not found. Using defaults."],
                }));
            } else {
                formatter.info(&format!(
                    "Configuration file not found at {}",
                    config_path.display()
                ));
                formatter.info(
                    "Using default configuration. Run 'syncbox config set <key> <value>' to create one.",
                );
            }
            return Ok(());
        }

        // Reload strictly: the context fell back to defaults on parse errors
        let config = match Config::load(config_path) {
            Ok(config) => config,
            Err(e) => {
                if format.is_json() {
                    formatter.print_json(&serde_json::json!({
                        "valid": false,
                        "config_path": config_path.display().to_string(),
                        "errors": [format!("Failed to parse configuration: {e:#}")],
                    }));
                } else {
                    formatter.error(&format!("Failed to parse configuration: {e:#}"));
                    formatter.info(&format!("File: {}", config_path.display()));
                }
                return Ok(());
            }
        };

        info!(config_path = %config_path.display(), "Validating configuration");
        let errors = config.validate();

        if format.is_json() {
            let error_strings: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            formatter.print_json(&serde_json::json!({
                "valid": errors.is_empty(),
                "config_path": config_path.display().to_string(),
                "errors": error_strings,
            }));
        } else if errors.is_empty() {
            formatter.success("Configuration is valid");
            formatter.info(&format!("File: {}", config_path.display()));
        } else {
            formatter.error(&format!(
                "Configuration has {} error{}:",
                errors.len(),
                if errors.len() == 1 { "" } else { "s" }
            ));
            formatter.info(&format!("File: {}", config_path.display()));
            formatter.info("");
            for error in &errors {
                formatter.info(&format!("  {} - {}", error.field, error.message));
            }
        }
        Ok(())
    }

    fn execute_path(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let formatter = ctx.formatter(format);
        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "config_path": ctx.config_path.display().to_string(),
                "exists": ctx.config_path.exists(),
            }));
        } else {
            println!("{}", ctx.config_path.display());
        }
        Ok(())
    }
}

fn optional_path(value: &str) -> Option<PathBuf> {
    if value.is_empty() || value == "none" {
        None
    } else {
        Some(PathBuf::from(value))
    }
}

/// Apply a dot-notation key/value pair to a Config struct
fn apply_config_value(config: &mut Config, key: &str, value: &str) -> Result<()> {
    match key {
        // --- sync ---
        "sync.syncbox_id" => {
            config.sync.syncbox_id = value
                .parse::<i64>()
                .context("Expected an integer for sync.syncbox_id")?;
        }
        "sync.root" => config.sync.root = PathBuf::from(value),
        "sync.temp_download_folder" => config.sync.temp_download_folder = optional_path(value),
        "sync.trace_folder" => config.sync.trace_folder = optional_path(value),
        "sync.client_version" => config.sync.client_version = value.to_string(),

        // --- retry ---
        "retry.max_failure_retries" => {
            config.retry.max_failure_retries = value
                .parse::<u8>()
                .context("Expected an integer between 0 and 255")?;
        }
        "retry.max_not_founds" => {
            config.retry.max_not_founds = value
                .parse::<u8>()
                .context("Expected an integer between 0 and 255")?;
        }
        "retry.download_error_delay_ms" => {
            config.retry.download_error_delay_ms = value
                .parse::<u64>()
                .context("Expected a positive integer")?;
        }

        // --- transfers ---
        "transfers.max_concurrent_uploads" => {
            config.transfers.max_concurrent_uploads = value
                .parse::<u32>()
                .context("Expected a positive integer")?;
        }
        "transfers.max_concurrent_downloads" => {
            config.transfers.max_concurrent_downloads = value
                .parse::<u32>()
                .context("Expected a positive integer")?;
        }

        // --- storage ---
        "storage.database" => config.storage.database = PathBuf::from(value),

        // --- logging ---
        "logging.level" => config.logging.level = value.to_string(),
        "logging.file" => config.logging.file = PathBuf::from(value),

        _ => anyhow::bail!("Unknown configuration key: '{}'", key),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_retry_caps() {
        let mut config = Config::default();
        apply_config_value(&mut config, "retry.max_failure_retries", "9").unwrap();
        apply_config_value(&mut config, "retry.max_not_founds", "0").unwrap();
        assert_eq!(config.retry.max_failure_retries, 9);
        assert_eq!(config.retry.max_not_founds, 0);
    }

    #[test]
    fn test_apply_rejects_out_of_range_cap() {
        let mut config = Config::default();
        assert!(apply_config_value(&mut config, "retry.max_failure_retries", "300").is_err());
    }

    #[test]
    fn test_apply_optional_folder_can_be_unset() {
        let mut config = Config::default();
        apply_config_value(&mut config, "sync.temp_download_folder", "/tmp/stage").unwrap();
        assert_eq!(
            config.sync.temp_download_folder,
            Some(PathBuf::from("/tmp/stage"))
        );
        apply_config_value(&mut config, "sync.temp_download_folder", "none").unwrap();
        assert_eq!(config.sync.temp_download_folder, None);
    }

    #[test]
    fn test_apply_unknown_key() {
        let mut config = Config::default();
        let err = apply_config_value(&mut config, "sync.poll_interval", "5").unwrap_err();
        assert!(err.to_string().contains("Unknown configuration key"));
    }

    #[test]
    fn test_every_settable_key_is_accepted() {
        for (key, _) in SETTABLE_KEYS {
            let mut config = Config::default();
            let value = if key.starts_with("sync.syncbox")
                || key.starts_with("retry.")
                || key.starts_with("transfers.")
            {
                "3"
            } else {
                "/tmp/value"
            };
            apply_config_value(&mut config, key, value).unwrap();
        }
    }

    #[test]
    fn test_set_then_validate_reports_zero_transfer_limit() {
        let mut config = Config::default();
        apply_config_value(&mut config, "transfers.max_concurrent_uploads", "0").unwrap();
        assert!(config
            .validate()
            .iter()
            .any(|e| e.field == "transfers.max_concurrent_uploads"));
    }
}
