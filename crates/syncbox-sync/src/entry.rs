//! Queue entries
//!
//! [`PossiblyStreamableFileChangeWithSyncData`] is the record a processing
//! queue holds for each change: the change, its optional stream, and every
//! collaborator needed to transfer and complete it, plus the retry
//! bookkeeping shared across entries (failed-changes queue, download-error
//! timer, retry caps).
//!
//! Entries are built through [`EntryBuilder`]; a missing collaborator fails
//! the build with `DomainError::MissingCollaborator`, so an entry that exists
//! is always complete.
//!
//! [`PossiblyStreamableFileChangeWithUploadDownloadTask`] pairs an entry with
//! the task currently transferring it.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use syncbox_core::domain::{
    ChangeId, DomainError, EventId, FailureKind, FileChange, HasResultOrder, ResultOrder,
    RetryDecision, RetryPolicy, StreamContext, SyncboxId, TransferDirection, TransferFailure,
};
use syncbox_core::ports::{ISyncDataProvider, ISyncSettings};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::completion::EventIdAndCompletionProcessor;
use crate::error_timer::DownloadErrorTimer;
use crate::retry::FailedChangesQueue;
use crate::task::AsyncUploadDownloadTask;

// ============================================================================
// PossiblyStreamableFileChangeWithSyncData
// ============================================================================

/// A queued change with everything needed to process it
pub struct PossiblyStreamableFileChangeWithSyncData {
    file_change: FileChange,
    stream: Option<StreamContext>,
    result_order: ResultOrder,
    sync_data: Arc<dyn ISyncDataProvider>,
    settings: Arc<dyn ISyncSettings>,
    syncbox_id: SyncboxId,
    temp_download_folder: Option<PathBuf>,
    temp_download_file_id: Option<Uuid>,
    download_error_timer: DownloadErrorTimer,
    retry_policy: RetryPolicy,
    failed_changes: FailedChangesQueue,
}

impl PossiblyStreamableFileChangeWithSyncData {
    /// Starts building an entry for `file_change`
    pub fn builder(file_change: FileChange, result_order: ResultOrder) -> EntryBuilder {
        EntryBuilder::new(file_change, result_order)
    }

    /// Returns the change id
    pub fn id(&self) -> &ChangeId {
        self.file_change.id()
    }

    /// Returns the queued change
    pub fn file_change(&self) -> &FileChange {
        &self.file_change
    }

    /// Returns the queued change mutably
    pub fn file_change_mut(&mut self) -> &mut FileChange {
        &mut self.file_change
    }

    /// Returns the stream, if any
    pub fn stream(&self) -> Option<&StreamContext> {
        self.stream.as_ref()
    }

    /// Returns the sync-data provider
    pub fn sync_data(&self) -> &Arc<dyn ISyncDataProvider> {
        &self.sync_data
    }

    /// Returns the sync settings
    pub fn settings(&self) -> &Arc<dyn ISyncSettings> {
        &self.settings
    }

    /// Returns the syncbox the change belongs to
    pub fn syncbox_id(&self) -> SyncboxId {
        self.syncbox_id
    }

    /// Returns the folder downloads are staged in
    pub fn temp_download_folder(&self) -> Option<&Path> {
        self.temp_download_folder.as_deref()
    }

    /// Returns the staging file id of a download
    pub fn temp_download_file_id(&self) -> Option<Uuid> {
        self.temp_download_file_id
    }

    /// Returns the staging path of a download (`folder/file_id`)
    pub fn temp_download_path(&self) -> Option<PathBuf> {
        match (&self.temp_download_folder, self.temp_download_file_id) {
            (Some(folder), Some(id)) => Some(folder.join(id.to_string())),
            _ => None,
        }
    }

    /// Returns the shared download-error timer
    pub fn download_error_timer(&self) -> &DownloadErrorTimer {
        &self.download_error_timer
    }

    /// Transient failures tolerated before giving up
    pub fn max_failure_retries(&self) -> u8 {
        self.retry_policy.max_failure_retries
    }

    /// Not-found failures tolerated before giving up
    pub fn max_not_founds(&self) -> u8 {
        self.retry_policy.max_not_founds
    }

    /// Returns the shared failed-changes queue
    pub fn failed_changes(&self) -> &FailedChangesQueue {
        &self.failed_changes
    }

    /// Builds the completion processor for `event_id`
    ///
    /// Falls back to the event id already recorded on the change; without
    /// either, the processor completes nothing.
    ///
    /// # Errors
    /// Propagates `EventIdAndCompletionProcessor::new` validation errors
    pub fn completion_processor(
        &self,
        event_id: Option<EventId>,
    ) -> Result<EventIdAndCompletionProcessor, DomainError> {
        self.completion_binder()(event_id)
    }

    /// Captures what a transfer task needs to build its completion
    /// processor once the server has answered
    pub fn completion_binder(
        &self,
    ) -> impl FnOnce(Option<EventId>) -> Result<EventIdAndCompletionProcessor, DomainError>
           + Send
           + 'static {
        let known_event = self.file_change.event_id();
        let syncbox_id = self.syncbox_id;
        let sync_data = Arc::clone(&self.sync_data);
        let settings = Arc::clone(&self.settings);
        let temp_download_folder = self.temp_download_folder.clone();

        move |event_id| {
            let event_id = event_id.or(known_event).map_or(0, |id| id.as_i64());
            EventIdAndCompletionProcessor::new(
                event_id,
                syncbox_id,
                Some(sync_data),
                Some(settings),
                temp_download_folder,
            )
        }
    }

    /// Counts a failed attempt and decides whether to retry
    ///
    /// The matching counter on the change is incremented, a snapshot is
    /// appended to the failed-changes queue, and download failures arm the
    /// shared error timer.
    pub fn record_failure(&mut self, failure: &TransferFailure) -> RetryDecision {
        match failure.kind() {
            FailureKind::Transient => self.file_change.record_failure(),
            FailureKind::NotFound => self.file_change.record_not_found(),
        };
        self.failed_changes.push(self.file_change.clone());

        if self.file_change.direction() == TransferDirection::Download {
            self.download_error_timer.trigger();
        }

        let decision = self.retry_policy.evaluate(
            self.file_change.failure_counter(),
            self.file_change.not_found_counter(),
        );

        warn!(
            change_id = %self.file_change.id(),
            path = %self.file_change.path().display(),
            failure = %failure,
            transient = self.file_change.failure_counter(),
            not_found = self.file_change.not_found_counter(),
            terminal = decision.is_terminal(),
            "Transfer attempt failed"
        );

        decision
    }

    /// Disposes the stream, if any
    ///
    /// Returns true if this call released it.
    pub fn dispose_stream(&self) -> bool {
        self.stream.as_ref().is_some_and(StreamContext::dispose)
    }

    /// Retires the entry, releasing its stream and returning the change
    pub fn release(self) -> FileChange {
        if self.dispose_stream() {
            debug!(change_id = %self.file_change.id(), "Released entry stream");
        }
        self.file_change
    }

    /// Pairs the entry with the task transferring it
    pub fn with_task(
        self,
        task: AsyncUploadDownloadTask,
    ) -> PossiblyStreamableFileChangeWithUploadDownloadTask {
        PossiblyStreamableFileChangeWithUploadDownloadTask { entry: self, task }
    }
}

impl HasResultOrder for PossiblyStreamableFileChangeWithSyncData {
    fn result_order(&self) -> ResultOrder {
        self.result_order
    }
}

impl fmt::Debug for PossiblyStreamableFileChangeWithSyncData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PossiblyStreamableFileChangeWithSyncData")
            .field("file_change", &self.file_change)
            .field("stream", &self.stream)
            .field("result_order", &self.result_order)
            .field("syncbox_id", &self.syncbox_id)
            .field("temp_download_file_id", &self.temp_download_file_id)
            .field("retry_policy", &self.retry_policy)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// EntryBuilder
// ============================================================================

/// Builder for [`PossiblyStreamableFileChangeWithSyncData`]
///
/// `sync_data`, `settings`, `download_error_timer` and `failed_changes` are
/// required. The syncbox id, temp download folder and retry caps default to
/// the values from `settings`; downloads get a fresh staging file id.
pub struct EntryBuilder {
    file_change: FileChange,
    result_order: ResultOrder,
    stream: Option<StreamContext>,
    sync_data: Option<Arc<dyn ISyncDataProvider>>,
    settings: Option<Arc<dyn ISyncSettings>>,
    syncbox_id: Option<SyncboxId>,
    temp_download_folder: Option<PathBuf>,
    temp_download_file_id: Option<Uuid>,
    download_error_timer: Option<DownloadErrorTimer>,
    retry_policy: Option<RetryPolicy>,
    failed_changes: Option<FailedChangesQueue>,
}

impl EntryBuilder {
    fn new(file_change: FileChange, result_order: ResultOrder) -> Self {
        Self {
            file_change,
            result_order,
            stream: None,
            sync_data: None,
            settings: None,
            syncbox_id: None,
            temp_download_folder: None,
            temp_download_file_id: None,
            download_error_timer: None,
            retry_policy: None,
            failed_changes: None,
        }
    }

    /// Sets the byte stream bound to the change (none for metadata-only changes)
    pub fn stream(mut self, stream: Option<StreamContext>) -> Self {
        self.stream = stream;
        self
    }

    /// Sets the sync-data provider (required)
    pub fn sync_data(mut self, sync_data: Arc<dyn ISyncDataProvider>) -> Self {
        self.sync_data = Some(sync_data);
        self
    }

    /// Sets the settings source (required)
    pub fn settings(mut self, settings: Arc<dyn ISyncSettings>) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Overrides the syncbox id taken from the settings
    pub fn syncbox_id(mut self, syncbox_id: SyncboxId) -> Self {
        self.syncbox_id = Some(syncbox_id);
        self
    }

    /// Overrides the download staging folder taken from the settings
    pub fn temp_download_folder(mut self, folder: PathBuf) -> Self {
        self.temp_download_folder = Some(folder);
        self
    }

    /// Sets the staging file id; downloads get a fresh one otherwise
    pub fn temp_download_file_id(mut self, id: Uuid) -> Self {
        self.temp_download_file_id = Some(id);
        self
    }

    /// Sets the shared download-error timer (required)
    pub fn download_error_timer(mut self, timer: DownloadErrorTimer) -> Self {
        self.download_error_timer = Some(timer);
        self
    }

    /// Overrides the retry policy taken from the settings
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = Some(policy);
        self
    }

    /// Sets the shared failed-changes queue (required)
    pub fn failed_changes(mut self, queue: FailedChangesQueue) -> Self {
        self.failed_changes = Some(queue);
        self
    }

    /// Validates and builds the entry
    ///
    /// # Errors
    /// Returns `DomainError::MissingCollaborator` naming the first required
    /// field that was not supplied
    pub fn build(self) -> Result<PossiblyStreamableFileChangeWithSyncData, DomainError> {
        let sync_data = self
            .sync_data
            .ok_or(DomainError::MissingCollaborator("sync_data"))?;
        let settings = self
            .settings
            .ok_or(DomainError::MissingCollaborator("settings"))?;
        let download_error_timer = self
            .download_error_timer
            .ok_or(DomainError::MissingCollaborator("download_error_timer"))?;
        let failed_changes = self
            .failed_changes
            .ok_or(DomainError::MissingCollaborator("failed_changes"))?;

        let is_download = self.file_change.direction() == TransferDirection::Download;
        let temp_download_folder = self
            .temp_download_folder
            .or_else(|| settings.temp_download_folder().map(Path::to_path_buf));
        let temp_download_file_id = self
            .temp_download_file_id
            .or_else(|| is_download.then(Uuid::new_v4));

        Ok(PossiblyStreamableFileChangeWithSyncData {
            syncbox_id: self.syncbox_id.unwrap_or_else(|| settings.syncbox_id()),
            retry_policy: self.retry_policy.unwrap_or_else(|| settings.retry_policy()),
            file_change: self.file_change,
            stream: self.stream,
            result_order: self.result_order,
            sync_data,
            settings,
            temp_download_folder,
            temp_download_file_id,
            download_error_timer,
            failed_changes,
        })
    }
}

// ============================================================================
// PossiblyStreamableFileChangeWithUploadDownloadTask
// ============================================================================

/// A queue entry paired with the task transferring it
#[derive(Debug)]
pub struct PossiblyStreamableFileChangeWithUploadDownloadTask {
    entry: PossiblyStreamableFileChangeWithSyncData,
    task: AsyncUploadDownloadTask,
}

impl PossiblyStreamableFileChangeWithUploadDownloadTask {
    /// Returns the id of the change being transferred
    pub fn id(&self) -> &ChangeId {
        self.entry.id()
    }

    /// Returns the queue entry
    pub fn entry(&self) -> &PossiblyStreamableFileChangeWithSyncData {
        &self.entry
    }

    /// Returns the running task
    pub fn task(&self) -> &AsyncUploadDownloadTask {
        &self.task
    }

    /// Returns the direction of the running task
    pub fn direction(&self) -> TransferDirection {
        self.task.direction()
    }

    /// Splits into entry and task
    pub fn into_parts(
        self,
    ) -> (
        PossiblyStreamableFileChangeWithSyncData,
        AsyncUploadDownloadTask,
    ) {
        (self.entry, self.task)
    }
}

impl HasResultOrder for PossiblyStreamableFileChangeWithUploadDownloadTask {
    fn result_order(&self) -> ResultOrder {
        self.entry.result_order
    }
}

// ============================================================================
// Tests
// ============================================================================
