//! Database connection pool management
//!
//! Provides a wrapper around SQLx's SqlitePool with:
//! - Automatic directory creation for database files
//! - WAL journal mode for concurrent reads
//! - Versioned schema migration on open, tracked in `PRAGMA user_version`
//! - In-memory mode for testing

use std::path::Path;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::migrations::schema_migrations;
use crate::CacheError;

/// Manages a pool of SQLite connections for the Syncbox queue store
///
/// The pool is configured with:
/// - WAL journal mode for concurrent read access
/// - 5 max connections for file-based databases
/// - 1 connection for in-memory databases (required for data persistence)
/// - 5-second busy timeout to handle write contention
pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens the database file and applies pending migrations
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection cannot be established,
    /// or `CacheError::MigrationFailed` if schema migrations fail.
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        let db = Self::connect(db_path).await?;
        let applied = db.migrate().await?;

        tracing::info!(
            path = %db_path.display(),
            applied,
            "Database pool initialized"
        );

        Ok(db)
    }

    /// Opens the database file without touching its schema
    ///
    /// Parent directories and the file itself are created if missing.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection cannot be established.
    pub async fn connect(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to connect to database at {}: {}",
                    db_path.display(),
                    e
                ))
            })?;

        Ok(Self { pool })
    }

    /// Creates an in-memory database pool for testing
    ///
    /// Uses a single connection that is never recycled, since SQLite
    /// in-memory databases are per-connection.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::ConnectionFailed` if the connection cannot be established,
    /// or `CacheError::MigrationFailed` if schema migrations fail.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| {
                CacheError::ConnectionFailed(format!("Failed to create in-memory database: {}", e))
            })?;

        let db = Self { pool };
        db.migrate().await?;

        tracing::debug!("In-memory database pool initialized");

        Ok(db)
    }

    /// Returns a reference to the underlying SQLite connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Reads the schema version recorded in the database
    ///
    /// # Errors
    ///
    /// Returns `CacheError::QueryFailed` if the pragma cannot be read.
    pub async fn schema_version(&self) -> Result<u32, CacheError> {
        let version: i64 = sqlx::query_scalar("PRAGMA user_version")
            .fetch_one(&self.pool)
            .await?;
        u32::try_from(version).map_err(|_| {
            CacheError::MigrationFailed(format!("Invalid schema version {version}"))
        })
    }

    /// Versions of the migrations not yet applied, in order
    ///
    /// # Errors
    ///
    /// Returns `CacheError::QueryFailed` if the current version cannot be read.
    pub async fn pending_migrations(&self) -> Result<Vec<u32>, CacheError> {
        let current = self.schema_version().await?;
        let migrations = schema_migrations()?;
        Ok(migrations
            .migrations_after(current)
            .map(|(version, _)| version)
            .collect())
    }

    /// Applies every migration newer than the recorded schema version
    ///
    /// Each migration runs in its own transaction together with the
    /// `user_version` bump, so a failed script leaves the database at the
    /// previous version. Returns how many migrations were applied.
    ///
    /// # Errors
    ///
    /// Returns `CacheError::MigrationFailed` if a script fails.
    pub async fn migrate(&self) -> Result<usize, CacheError> {
        let current = self.schema_version().await?;
        let migrations = schema_migrations()?;

        let mut applied = 0;
        for (version, sql) in migrations.migrations_after(current) {
            let mut tx = self.pool.begin().await?;

            sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(|e| {
                CacheError::MigrationFailed(format!("Migration {version} failed: {e}"))
            })?;
            sqlx::raw_sql(&format!("PRAGMA user_version = {version}"))
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    CacheError::MigrationFailed(format!(
                        "Failed to record schema version {version}: {e}"
                    ))
                })?;

            tx.commit().await?;
            tracing::debug!(version, "Applied migration");
            applied += 1;
        }

        if applied > 0 {
            tracing::info!(from = current, applied, "Database migrations completed");
        }
        Ok(applied)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migrations::latest_schema_version;

    #[tokio::test]
    async fn test_in_memory_is_fully_migrated() {
        let db = DatabasePool::in_memory().await.unwrap();
        assert_eq!(
            db.schema_version().await.unwrap(),
            latest_schema_version().unwrap()
        );
        assert!(db.pending_migrations().await.unwrap().is_empty());
        assert_eq!(db.migrate().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_file_database_migrates_once() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("queue.db");

        let fresh = DatabasePool::connect(&path).await.unwrap();
        assert_eq!(fresh.schema_version().await.unwrap(), 0);
        assert_eq!(fresh.pending_migrations().await.unwrap(), vec![1, 2, 3]);
        assert_eq!(fresh.migrate().await.unwrap(), 3);
        fresh.pool().close().await;

        let reopened = DatabasePool::new(&path).await.unwrap();
        assert_eq!(reopened.schema_version().await.unwrap(), 3);
        assert_eq!(reopened.migrate().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_partial_schema_resumes_after_recorded_version() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.db");

        let db = DatabasePool::connect(&path).await.unwrap();
        let list = schema_migrations().unwrap();
        let (_, first) = list.migrations_after(0).next().unwrap();
        sqlx::raw_sql(first).execute(db.pool()).await.unwrap();
        sqlx::raw_sql("PRAGMA user_version = 1")
            .execute(db.pool())
            .await
            .unwrap();

        assert_eq!(db.pending_migrations().await.unwrap(), vec![2, 3]);
        assert_eq!(db.migrate().await.unwrap(), 2);
    }
}
