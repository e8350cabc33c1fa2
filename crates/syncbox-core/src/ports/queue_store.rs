//! Persistent queue store port (driven/secondary port)
//!
//! This module defines the interface for durable storage of queued changes.
//! Entries must survive a crash between dispatch and completion: a change is
//! only removed once its completion has been processed, so after a restart
//! every unfinished entry is delivered again (at-least-once). Deduplication
//! on restart is the driver's job.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, in-memory, ...) and don't need domain-level classification.
//! - The `QueueFilter` struct provides a composable query mechanism
//!   without exposing storage implementation details.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::{
    errors::DomainError,
    newtypes::{ChangeId, SyncboxId},
    FileChange,
};

// ============================================================================
// QueueState / QueuedChange
// ============================================================================

/// Where a stored change is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueState {
    /// Waiting to be dispatched (new, or awaiting a retry)
    Pending,
    /// Handed to a transfer; not yet completed
    Dispatched,
    /// Retries exhausted; kept for reporting until purged
    Terminal,
}

impl QueueState {
    /// Returns the state name used in storage
    pub fn as_str(&self) -> &'static str {
        match self {
            QueueState::Pending => "pending",
            QueueState::Dispatched => "dispatched",
            QueueState::Terminal => "terminal",
        }
    }

    /// Returns true if the entry still needs processing
    pub fn is_unfinished(&self) -> bool {
        matches!(self, QueueState::Pending | QueueState::Dispatched)
    }
}

impl fmt::Display for QueueState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for QueueState {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(QueueState::Pending),
            "dispatched" => Ok(QueueState::Dispatched),
            "terminal" => Ok(QueueState::Terminal),
            other => Err(DomainError::ValidationFailed(format!(
                "Unknown queue state: {other}"
            ))),
        }
    }
}

/// A change as persisted in the queue store
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedChange {
    /// Syncbox the change belongs to
    pub syncbox_id: SyncboxId,
    /// The change itself, including its failure counters
    pub change: FileChange,
    /// Lifecycle state
    pub state: QueueState,
    /// Message of the most recent failure, if any
    pub last_error: Option<String>,
    /// When the change was first stored
    pub enqueued_at: DateTime<Utc>,
    /// When the entry was last written
    pub updated_at: DateTime<Utc>,
}

impl QueuedChange {
    /// Creates a pending entry for a freshly detected change
    pub fn pending(syncbox_id: SyncboxId, change: FileChange) -> Self {
        let now = Utc::now();
        Self {
            syncbox_id,
            change,
            state: QueueState::Pending,
            last_error: None,
            enqueued_at: now,
            updated_at: now,
        }
    }

    /// Returns the change id
    pub fn id(&self) -> &ChangeId {
        self.change.id()
    }
}

// ============================================================================
// QueueFilter
// ============================================================================

/// Filter criteria for querying stored changes
///
/// All fields are optional; when `None`, no filtering is applied for that
/// field. Multiple filters are combined with AND logic.
#[derive(Debug, Clone, Default)]
pub struct QueueFilter {
    /// Filter by syncbox
    pub syncbox_id: Option<SyncboxId>,
    /// Filter by lifecycle state
    pub state: Option<QueueState>,
    /// Filter by path prefix
    pub path_prefix: Option<PathBuf>,
    /// Maximum number of entries to return
    pub limit: Option<u32>,
}

impl QueueFilter {
    /// Creates a new empty filter (matches all entries)
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the syncbox filter
    pub fn with_syncbox_id(mut self, syncbox_id: SyncboxId) -> Self {
        self.syncbox_id = Some(syncbox_id);
        self
    }

    /// Sets the state filter
    pub fn with_state(mut self, state: QueueState) -> Self {
        self.state = Some(state);
        self
    }

    /// Sets the path prefix filter
    pub fn with_path_prefix(mut self, prefix: impl Into<PathBuf>) -> Self {
        self.path_prefix = Some(prefix.into());
        self
    }

    /// Caps the number of returned entries
    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Returns true if no filters are set
    pub fn is_empty(&self) -> bool {
        self.syncbox_id.is_none()
            && self.state.is_none()
            && self.path_prefix.is_none()
            && self.limit.is_none()
    }
}

// ============================================================================
// IQueueStore trait
// ============================================================================

/// Port trait for durable queue storage
///
/// ## Implementation Notes
///
/// - `save` is an upsert keyed by the change id.
/// - Entries are returned oldest first (by `enqueued_at`), which preserves
///   detection order for changes to the same path.
/// - `count_by_state` returns a map keyed by [`QueueState::as_str`].
#[async_trait::async_trait]
pub trait IQueueStore: Send + Sync {
    /// Inserts or replaces an entry
    async fn save(&self, entry: &QueuedChange) -> anyhow::Result<()>;

    /// Retrieves an entry by change id
    async fn get(&self, id: &ChangeId) -> anyhow::Result<Option<QueuedChange>>;

    /// Updates the lifecycle state of an entry
    async fn set_state(
        &self,
        id: &ChangeId,
        state: QueueState,
        last_error: Option<&str>,
    ) -> anyhow::Result<()>;

    /// Persists the failure counters of `change` and moves it back to pending
    async fn record_failure(&self, change: &FileChange, error: &str) -> anyhow::Result<()>;

    /// Deletes an entry, returning true if it existed
    async fn remove(&self, id: &ChangeId) -> anyhow::Result<bool>;

    /// Queries entries matching the filter, oldest first
    async fn query(&self, filter: &QueueFilter) -> anyhow::Result<Vec<QueuedChange>>;

    /// Counts entries grouped by state for a syncbox
    async fn count_by_state(&self, syncbox_id: SyncboxId)
        -> anyhow::Result<HashMap<String, u64>>;

    /// Deletes every terminal entry of a syncbox, returning how many
    async fn purge_terminal(&self, syncbox_id: SyncboxId) -> anyhow::Result<u64>;

    /// Returns every pending or dispatched entry of a syncbox, oldest first
    async fn unfinished(&self, syncbox_id: SyncboxId) -> anyhow::Result<Vec<QueuedChange>> {
        let mut entries = self
            .query(&QueueFilter::new().with_syncbox_id(syncbox_id))
            .await?;
        entries.retain(|entry| entry.state.is_unfinished());
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ChangeKind, TransferDirection};

    #[test]
    fn test_queue_state_roundtrip() {
        for state in [
            QueueState::Pending,
            QueueState::Dispatched,
            QueueState::Terminal,
        ] {
            assert_eq!(state.as_str().parse::<QueueState>().unwrap(), state);
        }
        assert!("archived".parse::<QueueState>().is_err());
    }

    #[test]
    fn test_unfinished_states() {
        assert!(QueueState::Pending.is_unfinished());
        assert!(QueueState::Dispatched.is_unfinished());
        assert!(!QueueState::Terminal.is_unfinished());
    }

    #[test]
    fn test_pending_entry() {
        let change =
            FileChange::new(ChangeKind::Created, "/a.txt", TransferDirection::Upload).unwrap();
        let id = *change.id();
        let entry = QueuedChange::pending(SyncboxId::new(9), change);
        assert_eq!(entry.id(), &id);
        assert_eq!(entry.state, QueueState::Pending);
        assert!(entry.last_error.is_none());
    }

    #[test]
    fn test_filter_builder() {
        let filter = QueueFilter::new()
            .with_syncbox_id(SyncboxId::new(1))
            .with_state(QueueState::Terminal)
            .with_path_prefix("/docs")
            .with_limit(10);
        assert!(!filter.is_empty());
        assert_eq!(filter.limit, Some(10));
        assert!(QueueFilter::new().is_empty());
    }
}
