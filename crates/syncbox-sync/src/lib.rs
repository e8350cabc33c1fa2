//! Syncbox Sync - Queue and transfer coordination
//!
//! Provides:
//! - Event completion bound to the sync-data provider
//! - Upload/download tasks awaited first-completed-first-processed
//! - Per-change retry bookkeeping with independent transient / not-found caps
//! - A shared, coalescing download-error timer
//! - Batch lookups restored to request order
//!
//! ## Modules
//!
//! - [`completion`] - `EventIdAndCompletionProcessor`
//! - [`task`] - `AsyncUploadDownloadTask`
//! - [`entry`] - Queue entries carrying sync data or a running task
//! - [`retry`] - The shared failed-changes queue
//! - [`error_timer`] - Debounced download-error re-drive
//! - [`scheduler`] - In-flight transfer set
//! - [`ordering`] - `resultOrder` restoration and batch lookups
//! - [`queue`] - `ProcessingQueue`, the driver-facing facade

pub mod completion;
pub mod entry;
pub mod error_timer;
pub mod ordering;
pub mod queue;
pub mod retry;
pub mod scheduler;
pub mod task;

use std::path::PathBuf;

use syncbox_core::domain::{DomainError, TransferFailure};
use thiserror::Error;

pub use completion::EventIdAndCompletionProcessor;
pub use entry::{
    PossiblyStreamableFileChangeWithSyncData, PossiblyStreamableFileChangeWithUploadDownloadTask,
};
pub use error_timer::DownloadErrorTimer;
pub use queue::{
    IQueueObserver, ProcessOutcome, ProcessingQueue, QueueSnapshot, TransferLimits,
};
pub use retry::FailedChangesQueue;
pub use scheduler::{TransferOutcome, TransferScheduler};
pub use task::AsyncUploadDownloadTask;

/// Errors that can occur while coordinating queued changes
#[derive(Debug, Error)]
pub enum SyncError {
    /// A domain-level error propagated from syncbox-core
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// The persistent queue store failed
    #[error("Queue store error: {0}")]
    Store(#[source] anyhow::Error),

    /// The sync-data provider failed
    #[error("Sync data provider error: {0}")]
    Provider(#[source] anyhow::Error),

    /// No queued entry has the given change id
    #[error("Unknown change: {0}")]
    UnknownChange(String),

    /// The queue was shut down
    #[error("Processing queue has been shut down")]
    ShutDown,

    /// A change exhausted its retries and was removed from processing
    #[error("Giving up on {}: {last} ({transient} transient, {not_found} not found)", path.display())]
    TerminalFailure {
        /// Path of the abandoned change
        path: PathBuf,
        /// Transient failures counted
        transient: u8,
        /// Not-found failures counted
        not_found: u8,
        /// The failure that exhausted the retries
        last: TransferFailure,
    },
}

impl SyncError {
    /// Returns true for errors that stem from a defect in the caller
    ///
    /// These are never retried.
    pub fn is_defect(&self) -> bool {
        matches!(self, SyncError::Domain(_) | SyncError::UnknownChange(_))
    }
}
