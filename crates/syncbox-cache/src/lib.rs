//! Syncbox Cache - Persistent queue storage
//!
//! SQLite-based storage for:
//! - Queued changes and their lifecycle state
//! - Per-change failure counters and last error
//! - The schema version, upgraded through ordered migrations
//!
//! ## Architecture
//!
//! This crate implements the `IQueueStore` port from `syncbox-core` using
//! SQLite as the storage backend. It is a driven (secondary) adapter in the
//! hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteQueueStore`] - `IQueueStore` implementation
//! - [`migrations`] - Versioned schema scripts
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use syncbox_cache::{DatabasePool, SqliteQueueStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/syncbox/queue.db")).await?;
//! let store = SqliteQueueStore::new(pool.pool().clone());
//! // Use store as IQueueStore...
//! # Ok(())
//! # }
//! ```

pub mod migrations;
pub mod pool;
pub mod queue_store;

pub use pool::DatabasePool;
pub use queue_store::SqliteQueueStore;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Serialization or deserialization of domain types failed
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}
