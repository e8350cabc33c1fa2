//! Syncbox CLI - Inspect and maintain the Syncbox queue store
//!
//! Provides commands for:
//! - Viewing queue status by state
//! - Listing and purging queued changes
//! - Applying schema migrations
//! - Viewing and validating configuration

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use syncbox_core::config::Config;
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, migrate::MigrateCommand, queue::QueueCommand, status::StatusCommand,
    CommandContext,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "syncbox", version, about = "Syncbox change queue maintenance")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show queue status
    Status(StatusCommand),
    /// List or purge queued changes
    #[command(subcommand)]
    Queue(QueueCommand),
    /// Apply pending schema migrations to the queue store
    Migrate(MigrateCommand),
    /// View and validate configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

/// Picks the log filter: `-v` flags win, then `--quiet`, then the config
fn log_filter(verbose: u8, quiet: bool, config: &Config) -> String {
    match (verbose, quiet) {
        (0, true) => "warn".to_string(),
        (0, false) => config.logging.level.clone(),
        (1, _) => "debug".to_string(),
        _ => "trace".to_string(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config_path = cli.config.clone().unwrap_or_else(Config::default_path);
    let config = Config::load_or_default(&config_path);

    let filter = log_filter(cli.verbose, cli.quiet, &config);
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };
    let ctx = CommandContext {
        config_path,
        config,
        quiet: cli.quiet,
    };

    match cli.command {
        Commands::Status(cmd) => cmd.execute(&ctx, format).await,
        Commands::Queue(cmd) => cmd.execute(&ctx, format).await,
        Commands::Migrate(cmd) => cmd.execute(&ctx, format).await,
        Commands::Config(cmd) => cmd.execute(&ctx, format).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_filter_precedence() {
        let mut config = Config::default();
        config.logging.level = "error".to_string();

        assert_eq!(log_filter(0, false, &config), "error");
        assert_eq!(log_filter(0, true, &config), "warn");
        assert_eq!(log_filter(1, true, &config), "debug");
        assert_eq!(log_filter(3, false, &config), "trace");
    }

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "syncbox",
            "queue",
            "list",
            "--state",
            "terminal",
            "--json",
            "--config",
            "/tmp/alt.yaml",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/alt.yaml")));
        assert!(matches!(cli.command, Commands::Queue(_)));
    }
}
