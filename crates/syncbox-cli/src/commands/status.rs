//! Status command - Display queue status
//!
//! Provides the `syncbox status` CLI command which:
//! 1. Shows the queue store location and schema version
//! 2. Shows queued change counts by state for the configured syncbox
//! 3. Shows the oldest unfinished change and the retry caps in effect

use anyhow::{Context, Result};
use clap::Args;
use syncbox_core::ports::{IQueueStore, ISyncSettings, QueueState};
use tracing::info;

use super::CommandContext;
use crate::output::OutputFormat;

#[derive(Debug, Args)]
pub struct StatusCommand {}

impl StatusCommand {
    pub async fn execute(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let formatter = ctx.formatter(format);
        let db_path = ctx.database_path();

        let Some((pool, store)) = ctx.open_store().await? else {
            formatter.error(&format!(
                "No queue store at {}. Run 'syncbox migrate' to create it.",
                db_path.display()
            ));
            return Ok(());
        };

        let syncbox_id = ctx.syncbox_id();
        info!(syncbox_id = %syncbox_id, "Showing queue status");

        let counts = store
            .count_by_state(syncbox_id)
            .await
            .context("Failed to count queued changes")?;
        let count = |state: QueueState| counts.get(state.as_str()).copied().unwrap_or(0);
        let total: u64 = counts.values().sum();

        let unfinished = store
            .unfinished(syncbox_id)
            .await
            .context("Failed to load unfinished changes")?;
        let oldest = unfinished.first();

        let schema_version = pool
            .schema_version()
            .await
            .context("Failed to read schema version")?;
        let policy = ctx.config.retry_policy();

        if format.is_json() {
            let json = serde_json::json!({
                "syncbox_id": syncbox_id.as_i64(),
                "database": db_path.display().to_string(),
                "schema_version": schema_version,
                "total": total,
                "by_state": {
                    "pending": count(QueueState::Pending),
                    "dispatched": count(QueueState::Dispatched),
                    "terminal": count(QueueState::Terminal),
                },
                "oldest_unfinished": oldest.map(|e| serde_json::json!({
                    "change_id": e.id().to_string(),
                    "path": e.change.path().display().to_string(),
                    "enqueued_at": e.enqueued_at.to_rfc3339(),
                })),
                "retry": {
                    "max_failure_retries": policy.max_failure_retries,
                    "max_not_founds": policy.max_not_founds,
                },
            });
            formatter.print_json(&json);
            return Ok(());
        }

        formatter.success(&format!("Syncbox {syncbox_id}"));
        formatter.field("Queue store", &db_path.display().to_string());
        formatter.field("Schema version", &schema_version.to_string());
        formatter.info("");
        formatter.field("Pending", &count(QueueState::Pending).to_string());
        formatter.field("Dispatched", &count(QueueState::Dispatched).to_string());
        formatter.field("Terminal", &count(QueueState::Terminal).to_string());
        formatter.field("Total", &total.to_string());

        if let Some(entry) = oldest {
            formatter.info("");
            formatter.field(
                "Oldest unfinished",
                &format!(
                    "{} (since {})",
                    entry.change.path().display(),
                    entry.enqueued_at.format("%Y-%m-%d %H:%M:%S")
                ),
            );
        }

        formatter.info("");
        formatter.field(
            "Retry caps",
            &format!(
                "{} transient, {} not found",
                policy.max_failure_retries, policy.max_not_founds
            ),
        );

        if count(QueueState::Dispatched) > 0 {
            formatter.warn(
                "Dispatched changes are redelivered on the next start (at-least-once delivery)",
            );
        }
        if count(QueueState::Terminal) > 0 {
            formatter.info("Run 'syncbox queue list --state terminal' to inspect abandoned changes");
        }

        Ok(())
    }
}
