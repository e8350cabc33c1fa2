//! Queue command - List and purge queued changes
//!
//! Provides the `syncbox queue` CLI command which:
//! 1. Lists queued changes, oldest first, filtered by state or path prefix
//! 2. Purges terminal (abandoned) changes of the configured syncbox

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Subcommand, ValueEnum};
use syncbox_core::ports::{IQueueStore, QueueFilter, QueueState, QueuedChange};
use tracing::info;

use super::CommandContext;
use crate::output::OutputFormat;

/// Queue state as accepted on the command line
#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum StateArg {
    Pending,
    Dispatched,
    Terminal,
}

impl From<StateArg> for QueueState {
    fn from(arg: StateArg) -> Self {
        match arg {
            StateArg::Pending => QueueState::Pending,
            StateArg::Dispatched => QueueState::Dispatched,
            StateArg::Terminal => QueueState::Terminal,
        }
    }
}

#[derive(Debug, Subcommand)]
pub enum QueueCommand {
    /// List queued changes, oldest first
    List {
        /// Only show changes in this state
        #[arg(long, value_enum)]
        state: Option<StateArg>,
        /// Only show changes under this path
        #[arg(long)]
        path_prefix: Option<PathBuf>,
        /// Maximum number of changes to show
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
    /// Delete every terminal change
    Purge,
}

impl QueueCommand {
    pub async fn execute(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        match self {
            QueueCommand::List {
                state,
                path_prefix,
                limit,
            } => {
                let mut filter = QueueFilter::new()
                    .with_syncbox_id(ctx.syncbox_id())
                    .with_limit(*limit);
                if let Some(state) = state {
                    filter = filter.with_state((*state).into());
                }
                if let Some(prefix) = path_prefix {
                    filter = filter.with_path_prefix(prefix.clone());
                }
                self.execute_list(ctx, &filter, format).await
            }
            QueueCommand::Purge => self.execute_purge(ctx, format).await,
        }
    }

    async fn execute_list(
        &self,
        ctx: &CommandContext,
        filter: &QueueFilter,
        format: OutputFormat,
    ) -> Result<()> {
        let formatter = ctx.formatter(format);
        let Some((_pool, store)) = ctx.open_store().await? else {
            formatter.error("No queue store found. Run 'syncbox migrate' first.");
            return Ok(());
        };

        let entries = store
            .query(filter)
            .await
            .context("Failed to query queued changes")?;
        info!(count = entries.len(), "Listing queued changes");

        if format.is_json() {
            let json: Vec<serde_json::Value> = entries.iter().map(entry_to_json).collect();
            formatter.print_json(&serde_json::Value::Array(json));
            return Ok(());
        }

        if entries.is_empty() {
            formatter.success("No queued changes");
            return Ok(());
        }

        formatter.success(&format!("{} queued change(s)", entries.len()));
        for entry in &entries {
            formatter.info("");
            formatter.info(&format!(
                "[{}] {} {} ({})",
                entry.state,
                entry.change.direction(),
                entry.change.path().display(),
                entry.change.kind(),
            ));
            formatter.field("Change id", &entry.id().to_string());
            formatter.field(
                "Failures",
                &format!(
                    "{} transient, {} not found",
                    entry.change.failure_counter(),
                    entry.change.not_found_counter()
                ),
            );
            formatter.field(
                "Enqueued",
                &entry.enqueued_at.format("%Y-%m-%d %H:%M:%S").to_string(),
            );
            if let Some(ref error) = entry.last_error {
                formatter.field("Last error", error);
            }
        }

        Ok(())
    }

    async fn execute_purge(&self, ctx: &CommandContext, format: OutputFormat) -> Result<()> {
        let formatter = ctx.formatter(format);
        let Some((_pool, store)) = ctx.open_store().await? else {
            formatter.error("No queue store found. Nothing to purge.");
            return Ok(());
        };

        let purged = store
            .purge_terminal(ctx.syncbox_id())
            .await
            .context("Failed to purge terminal changes")?;
        info!(purged, "Purged terminal changes");

        if format.is_json() {
            formatter.print_json(&serde_json::json!({
                "success": true,
                "purged": purged,
            }));
        } else {
            formatter.success(&format!("Purged {purged} terminal change(s)"));
        }
        Ok(())
    }
}

fn entry_to_json(entry: &QueuedChange) -> serde_json::Value {
    serde_json::json!({
        "change_id": entry.id().to_string(),
        "state": entry.state.as_str(),
        "direction": entry.change.direction().as_str(),
        "kind": entry.change.kind().name(),
        "path": entry.change.path().display().to_string(),
        "event_id": entry.change.event_id().map(|id| id.as_i64()),
        "failure_counter": entry.change.failure_counter(),
        "not_found_counter": entry.change.not_found_counter(),
        "last_error": entry.last_error,
        "enqueued_at": entry.enqueued_at.to_rfc3339(),
        "updated_at": entry.updated_at.to_rfc3339(),
    })
}

#[cfg(test)]
mod tests {
    use syncbox_core::domain::{ChangeKind, EventId, FileChange, SyncboxId, TransferDirection};

    use super::*;

    #[test]
    fn test_entry_json_shape() {
        let mut change =
            FileChange::new(ChangeKind::Deleted, "/gone.txt", TransferDirection::Download)
                .unwrap();
        change.set_event_id(EventId::new(5).unwrap());
        change.record_not_found();
        let mut entry = QueuedChange::pending(SyncboxId::new(1), change);
        entry.state = QueueState::Terminal;
        entry.last_error = Some("not found failure: 404".to_string());

        let json = entry_to_json(&entry);
        assert_eq!(json["state"], "terminal");
        assert_eq!(json["direction"], "download");
        assert_eq!(json["event_id"], 5);
        assert_eq!(json["not_found_counter"], 1);
        assert_eq!(json["last_error"], "not found failure: 404");
    }

    #[test]
    fn test_state_arg_maps_to_queue_state() {
        assert_eq!(QueueState::from(StateArg::Dispatched), QueueState::Dispatched);
    }
}
