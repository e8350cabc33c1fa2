//! Sync-data provider port (driven/secondary port)
//!
//! The sync-data provider owns the local sync database. The core calls it to
//! finish an event once its network operation has completed, to merge
//! metadata returned by the server, to look up the current local state of a
//! path, and to surface changes whose retries were exhausted.

use std::path::Path;

use crate::domain::{EventId, FileChange, TransferFailure};

/// Port trait for the local sync-data provider
#[async_trait::async_trait]
pub trait ISyncDataProvider: Send + Sync {
    /// Marks the event as completed
    ///
    /// `temp_download_folder` is supplied for downloads, where the completed
    /// content still sits in the temporary download area.
    async fn complete_event(
        &self,
        event_id: EventId,
        temp_download_folder: Option<&Path>,
    ) -> anyhow::Result<()>;

    /// Merges server-side metadata for a change into local state
    async fn merge_metadata(&self, change: &FileChange) -> anyhow::Result<()>;

    /// Returns the current local state recorded for `path`, if any
    async fn lookup(&self, path: &Path) -> anyhow::Result<Option<FileChange>>;

    /// Reports a change whose retries were exhausted
    async fn report_terminal_failure(
        &self,
        change: &FileChange,
        failure: &TransferFailure,
    ) -> anyhow::Result<()>;
}
