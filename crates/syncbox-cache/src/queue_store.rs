//! SQLite implementation of IQueueStore
//!
//! ## Type Mapping
//!
//! | Domain Type     | SQL Type | Strategy                                   |
//! |-----------------|----------|--------------------------------------------|
//! | ChangeId        | TEXT     | UUID string via `.to_string()` / `FromStr` |
//! | SyncboxId       | INTEGER  | `as_i64()` / `SyncboxId::new()`            |
//! | FileChange      | TEXT     | serde_json serialization                   |
//! | QueueState      | TEXT     | `as_str()` / `FromStr`                     |
//! | DateTime<Utc>   | TEXT     | ISO 8601, microsecond precision, `Z`       |
//!
//! `path`, `direction` and the failure counters are mirrored out of the JSON
//! so they can be filtered and listed without decoding every row.

use std::collections::HashMap;

use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};

use syncbox_core::domain::{ChangeId, FileChange, SyncboxId};
use syncbox_core::ports::{IQueueStore, QueueFilter, QueueState, QueuedChange};

use crate::CacheError;

/// SQLite-based implementation of the queue store port
pub struct SqliteQueueStore {
    pool: SqlitePool,
}

impl SqliteQueueStore {
    /// Creates a new store with the given connection pool
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

/// Format a timestamp with fixed-width fractions so text order is time order
fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a DateTime<Utc> from an ISO 8601 string
fn parse_datetime(s: &str) -> Result<DateTime<Utc>, CacheError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            CacheError::SerializationError(format!("Failed to parse datetime '{}': {}", s, e))
        })
}

fn change_to_json(change: &FileChange) -> Result<String, CacheError> {
    serde_json::to_string(change)
        .map_err(|e| CacheError::SerializationError(format!("Failed to serialize change: {e}")))
}

/// Reconstruct a QueuedChange from a database row
fn queued_change_from_row(row: &SqliteRow) -> Result<QueuedChange, CacheError> {
    let change_id: String = row.get("change_id");
    let syncbox_id: i64 = row.get("syncbox_id");
    let state: String = row.get("state");
    let change_json: String = row.get("change_json");
    let last_error: Option<String> = row.get("last_error");
    let enqueued_at: String = row.get("enqueued_at");
    let updated_at: String = row.get("updated_at");

    let change: FileChange = serde_json::from_str(&change_json).map_err(|e| {
        CacheError::SerializationError(format!("Failed to decode change {change_id}: {e}"))
    })?;
    let state: QueueState = state
        .parse()
        .map_err(|e| CacheError::SerializationError(format!("{e}")))?;

    Ok(QueuedChange {
        syncbox_id: SyncboxId::new(syncbox_id),
        change,
        state,
        last_error,
        enqueued_at: parse_datetime(&enqueued_at)?,
        updated_at: parse_datetime(&updated_at)?,
    })
}

/// Escapes LIKE wildcards so a path prefix matches literally
fn escape_like(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn rows_to_changes(rows: &[SqliteRow]) -> Result<Vec<QueuedChange>, CacheError> {
    rows.iter().map(queued_change_from_row).collect()
}

// ============================================================================
// IQueueStore implementation
// ============================================================================

#[async_trait::async_trait]
impl IQueueStore for SqliteQueueStore {
    async fn save(&self, entry: &QueuedChange) -> anyhow::Result<()> {
        let id = entry.id().to_string();
        let change = &entry.change;
        let change_json = change_to_json(change)?;
        let path = change.path().to_string_lossy().into_owned();

        sqlx::query(
            "INSERT INTO queued_changes \
             (change_id, syncbox_id, path, direction, state, change_json, last_error, \
              failure_counter, not_found_counter, enqueued_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(change_id) DO UPDATE SET \
              syncbox_id = excluded.syncbox_id, \
              path = excluded.path, \
              direction = excluded.direction, \
              state = excluded.state, \
              change_json = excluded.change_json, \
              last_error = excluded.last_error, \
              failure_counter = excluded.failure_counter, \
              not_found_counter = excluded.not_found_counter, \
              updated_at = excluded.updated_at",
        )
        .bind(&id)
        .bind(entry.syncbox_id.as_i64())
        .bind(&path)
        .bind(change.direction().as_str())
        .bind(entry.state.as_str())
        .bind(&change_json)
        .bind(&entry.last_error)
        .bind(i64::from(change.failure_counter()))
        .bind(i64::from(change.not_found_counter()))
        .bind(format_datetime(&entry.enqueued_at))
        .bind(format_datetime(&entry.updated_at))
        .execute(&self.pool)
        .await?;

        tracing::trace!(change_id = %id, state = %entry.state, "Saved queued change");
        Ok(())
    }

    async fn get(&self, id: &ChangeId) -> anyhow::Result<Option<QueuedChange>> {
        let row = sqlx::query("SELECT * FROM queued_changes WHERE change_id = ?")
            .bind(id.to_string())
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(ref r) => Ok(Some(queued_change_from_row(r)?)),
            None => Ok(None),
        }
    }

    async fn set_state(
        &self,
        id: &ChangeId,
        state: QueueState,
        last_error: Option<&str>,
    ) -> anyhow::Result<()> {
        let result = sqlx::query(
            "UPDATE queued_changes \
             SET state = ?, last_error = COALESCE(?, last_error), updated_at = ? \
             WHERE change_id = ?",
        )
        .bind(state.as_str())
        .bind(last_error)
        .bind(format_datetime(&Utc::now()))
        .bind(id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("No queued change with id {id}");
        }
        tracing::trace!(change_id = %id, state = %state, "Updated queue state");
        Ok(())
    }

    async fn record_failure(&self, change: &FileChange, error: &str) -> anyhow::Result<()> {
        let change_json = change_to_json(change)?;

        let result = sqlx::query(
            "UPDATE queued_changes \
             SET state = 'pending', change_json = ?, last_error = ?, \
                 failure_counter = ?, not_found_counter = ?, updated_at = ? \
             WHERE change_id = ?",
        )
        .bind(&change_json)
        .bind(error)
        .bind(i64::from(change.failure_counter()))
        .bind(i64::from(change.not_found_counter()))
        .bind(format_datetime(&Utc::now()))
        .bind(change.id().to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            anyhow::bail!("No queued change with id {}", change.id());
        }
        tracing::trace!(
            change_id = %change.id(),
            failures = change.failure_counter(),
            not_founds = change.not_found_counter(),
            "Recorded failure"
        );
        Ok(())
    }

    async fn remove(&self, id: &ChangeId) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM queued_changes WHERE change_id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await?;

        tracing::trace!(change_id = %id, "Removed queued change");
        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, filter: &QueueFilter) -> anyhow::Result<Vec<QueuedChange>> {
        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("SELECT * FROM queued_changes WHERE 1=1");

        if let Some(syncbox_id) = filter.syncbox_id {
            query.push(" AND syncbox_id = ").push_bind(syncbox_id.as_i64());
        }

        if let Some(state) = filter.state {
            query.push(" AND state = ").push_bind(state.as_str());
        }

        if let Some(ref prefix) = filter.path_prefix {
            query
                .push(" AND path LIKE ")
                .push_bind(format!("{}%", escape_like(&prefix.to_string_lossy())))
                .push(" ESCAPE '\\'");
        }

        query.push(" ORDER BY enqueued_at ASC, rowid ASC");

        if let Some(limit) = filter.limit {
            query.push(" LIMIT ").push_bind(i64::from(limit));
        }

        let rows = query.build().fetch_all(&self.pool).await?;
        Ok(rows_to_changes(&rows)?)
    }

    async fn count_by_state(
        &self,
        syncbox_id: SyncboxId,
    ) -> anyhow::Result<HashMap<String, u64>> {
        let rows = sqlx::query(
            "SELECT state, COUNT(*) as count FROM queued_changes \
             WHERE syncbox_id = ? GROUP BY state",
        )
        .bind(syncbox_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        let mut counts = HashMap::new();
        for row in &rows {
            let state: String = row.get("state");
            let count: i64 = row.get("count");
            counts.insert(state, count as u64);
        }

        Ok(counts)
    }

    async fn purge_terminal(&self, syncbox_id: SyncboxId) -> anyhow::Result<u64> {
        let result =
            sqlx::query("DELETE FROM queued_changes WHERE syncbox_id = ? AND state = 'terminal'")
                .bind(syncbox_id.as_i64())
                .execute(&self.pool)
                .await?;

        tracing::debug!(
            syncbox_id = %syncbox_id,
            purged = result.rows_affected(),
            "Purged terminal changes"
        );
        Ok(result.rows_affected())
    }

    async fn unfinished(&self, syncbox_id: SyncboxId) -> anyhow::Result<Vec<QueuedChange>> {
        let rows = sqlx::query(
            "SELECT * FROM queued_changes \
             WHERE syncbox_id = ? AND state IN ('pending', 'dispatched') \
             ORDER BY enqueued_at ASC, rowid ASC",
        )
        .bind(syncbox_id.as_i64())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows_to_changes(&rows)?)
    }
}
