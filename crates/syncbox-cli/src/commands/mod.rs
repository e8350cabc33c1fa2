//! CLI subcommands

pub mod config;
pub mod migrate;
pub mod queue;
pub mod status;

use std::path::PathBuf;

use anyhow::{Context, Result};
use syncbox_cache::{DatabasePool, SqliteQueueStore};
use syncbox_core::config::{expand_tilde, Config};
use syncbox_core::domain::SyncboxId;
use syncbox_core::ports::ISyncSettings;

use crate::output::{get_formatter, OutputFormat, OutputFormatter};

/// Settings shared by every command
pub struct CommandContext {
    /// Config file the settings were read from (it may not exist)
    pub config_path: PathBuf,
    pub config: Config,
    pub quiet: bool,
}

impl CommandContext {
    pub fn formatter(&self, format: OutputFormat) -> Box<dyn OutputFormatter> {
        get_formatter(format, self.quiet)
    }

    pub fn syncbox_id(&self) -> SyncboxId {
        self.config.syncbox_id()
    }

    pub fn database_path(&self) -> PathBuf {
        expand_tilde(&self.config.storage.database)
    }

    /// Opens the queue store, applying pending migrations
    ///
    /// Returns `None` if the database file does not exist yet.
    pub async fn open_store(&self) -> Result<Option<(DatabasePool, SqliteQueueStore)>> {
        let db_path = self.database_path();
        if !db_path.exists() {
            return Ok(None);
        }

        let pool = DatabasePool::new(&db_path)
            .await
            .with_context(|| format!("Failed to open queue store at {}", db_path.display()))?;
        let store = SqliteQueueStore::new(pool.pool().clone());
        Ok(Some((pool, store)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context_with_database(db: PathBuf) -> CommandContext {
        let mut config = Config::default();
        config.storage.database = db;
        CommandContext {
            config_path: PathBuf::from("/nonexistent/config.yaml"),
            config,
            quiet: true,
        }
    }

    #[tokio::test]
    async fn test_open_store_missing_database() {
        let dir = tempfile::tempdir().unwrap();
        let ctx = context_with_database(dir.path().join("queue.db"));
        assert!(ctx.open_store().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_open_store_existing_database() {
        let dir = tempfile::tempdir().unwrap();
        let db = dir.path().join("queue.db");
        DatabasePool::new(&db).await.unwrap();

        let ctx = context_with_database(db);
        let (pool, _store) = ctx.open_store().await.unwrap().unwrap();
        assert!(pool.pending_migrations().await.unwrap().is_empty());
    }
}
