//! Migrate command - Create or upgrade the queue store schema
//!
//! Opens (or creates) the queue database without touching its schema, reports
//! the recorded version and the migrations after it, then applies them unless
//! `--dry-run` is given.

use anyhow::{Context, Result};
use clap::Args;
use syncbox_cache::migrations::latest_schema_version;
use syncbox_cache::DatabasePool;
use tracing::info;

use super::CommandContext;
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct MigrateCommand {
    /// Only report pending migrations
    #[arg(long)]
    pub dry_run: bool,
}

impl MigrateCommand {
    pub async fn execute(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let formatter = ctx.formatter(format);
        let db_path = ctx.database_path();

        let pool = DatabasePool::connect(&db_path)
            .await
            .with_context(|| format!("Failed to open queue store at {}", db_path.display()))?;

        let current = pool
            .schema_version()
            .await
            .context("Failed to read schema version")?;
        let pending = pool
            .pending_migrations()
            .await
            .context("Failed to list pending migrations")?;
        let latest = latest_schema_version()?;

        let applied = if self.dry_run || pending.is_empty() {
            0
        } else {
            pool.migrate().await.context("Migration failed")?
        };
        info!(current, latest, applied, dry_run = self.dry_run, "Migration finished");

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "database": db_path.display().to_string(),
                "from_version": current,
                "latest_version": latest,
                "pending": pending,
                "applied": applied,
                "dry_run": self.dry_run,
            }));
            return Ok(());
        }

        if pending.is_empty() {
            formatter.success(&format!("Queue store is up to date (version {current})"));
        } else if self.dry_run {
            formatter.success(&format!(
                "{} migration(s) pending: version {current} -> {latest}",
                pending.len()
            ));
            for version in &pending {
                formatter.info(&format!("would apply {version}"));
            }
        } else {
            formatter.success(&format!(
                "Applied {applied} migration(s): version {current} -> {latest}"
            ));
        }
        formatter.field("Queue store", &db_path.display().to_string());

        Ok(())
    }
}
