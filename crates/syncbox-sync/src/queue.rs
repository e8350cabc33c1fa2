//! Processing queue - the driver-facing facade
//!
//! A [`ProcessingQueue`] owns every queue entry of one syncbox. It persists
//! each change before accepting it, dispatches transfers through the
//! [`TransferScheduler`], and applies the retry policy to whatever comes
//! back.
//!
//! ## Entry lifecycle
//!
//! ```text
//!              enqueue / recover
//!                     │
//!                     ▼
//!   ┌──────────────► pending ──dispatch──► in flight ──process_next──┐
//!   │                 ▲    │                                         │
//!   │ timer fires     │    └──supersede──► released                  │
//!   │                 │                                              ▼
//! awaiting re-drive ◄─┴── retry (download / upload) ◄── failure ◄── outcome
//!                                                         │          │
//!                                           terminal ◄────┘          └──► completed
//! ```
//!
//! The queue is single-owner (`&mut self`): the driver serializes every
//! mutation of the shared failed-changes queue and error timer by calling
//! into the queue from one task.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use syncbox_core::config::TransfersConfig;
use syncbox_core::domain::{
    ChangeId, EventId, FailureKind, FileChange, HasResultOrder, ResultOrder, RetryDecision,
    StreamContext, SyncboxId, TransferDirection, TransferFailure,
};
use syncbox_core::ports::{
    IQueueStore, ISyncDataProvider, ISyncSettings, ITransferExecutor, QueueState, QueuedChange,
    TransferRequest,
};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::entry::PossiblyStreamableFileChangeWithSyncData;
use crate::error_timer::DownloadErrorTimer;
use crate::retry::FailedChangesQueue;
use crate::scheduler::{TransferOutcome, TransferScheduler};
use crate::task::AsyncUploadDownloadTask;
use crate::SyncError;

// ============================================================================
// Observer / outcome types
// ============================================================================

/// Receives the final outcome of every change
///
/// Exactly one callback is made per change that leaves the queue through
/// completion or retry exhaustion. Superseded changes and changes still
/// queued at shutdown produce no callback.
pub trait IQueueObserver: Send + Sync {
    /// The change was transferred and its event completed
    fn on_completed(&self, change: &FileChange, event_id: Option<EventId>);

    /// The change exhausted its retries and was abandoned
    fn on_failed(&self, change: &FileChange, error: &SyncError);
}

/// What [`ProcessingQueue::process_next`] did with one finished transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Transfer and completion succeeded; the entry is gone
    Completed {
        id: ChangeId,
        event_id: Option<EventId>,
    },
    /// The transfer failed and will be retried
    Retrying {
        id: ChangeId,
        attempt: u8,
        /// True if the retry waits for the download-error timer
        waiting_for_timer: bool,
    },
    /// Retries are exhausted; the entry is gone
    Abandoned { id: ChangeId, kind: FailureKind },
}

/// Per-direction concurrency caps applied by [`ProcessingQueue::dispatch`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferLimits {
    pub max_uploads: usize,
    pub max_downloads: usize,
}

impl TransferLimits {
    /// Creates limits; zero caps are raised to one
    pub fn new(max_uploads: usize, max_downloads: usize) -> Self {
        Self {
            max_uploads: max_uploads.max(1),
            max_downloads: max_downloads.max(1),
        }
    }

    fn for_direction(&self, direction: TransferDirection) -> usize {
        match direction {
            TransferDirection::Upload => self.max_uploads,
            TransferDirection::Download => self.max_downloads,
        }
    }
}

impl From<&TransfersConfig> for TransferLimits {
    fn from(config: &TransfersConfig) -> Self {
        Self::new(
            config.max_concurrent_uploads as usize,
            config.max_concurrent_downloads as usize,
        )
    }
}

impl Default for TransferLimits {
    fn default() -> Self {
        Self::new(4, 8)
    }
}

/// Point-in-time view of a queue, for status reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    pub pending: usize,
    pub awaiting_redrive: usize,
    pub in_flight: usize,
    pub failed_changes: usize,
    pub timer_armed: bool,
    /// Detection time of the oldest queued (not in-flight) change
    pub oldest_detected_at: Option<DateTime<Utc>>,
}

// ============================================================================
// ProcessingQueue
// ============================================================================

type Entry = PossiblyStreamableFileChangeWithSyncData;

/// Queue of changes for one syncbox, from intake to completion
pub struct ProcessingQueue {
    syncbox_id: SyncboxId,
    sync_data: Arc<dyn ISyncDataProvider>,
    settings: Arc<dyn ISyncSettings>,
    store: Arc<dyn IQueueStore>,
    executor: Arc<dyn ITransferExecutor>,
    observer: Arc<dyn IQueueObserver>,
    timer: DownloadErrorTimer,
    timer_fires: watch::Receiver<u64>,
    failed_changes: FailedChangesQueue,
    limits: TransferLimits,
    pending: VecDeque<Entry>,
    awaiting_redrive: Vec<Entry>,
    scheduler: TransferScheduler,
    next_order: usize,
    shut_down: bool,
}

impl ProcessingQueue {
    /// Creates an empty queue for the syncbox named by `settings`
    pub fn new(
        settings: Arc<dyn ISyncSettings>,
        sync_data: Arc<dyn ISyncDataProvider>,
        store: Arc<dyn IQueueStore>,
        executor: Arc<dyn ITransferExecutor>,
        observer: Arc<dyn IQueueObserver>,
    ) -> Self {
        let timer = DownloadErrorTimer::new(settings.download_error_delay());
        let timer_fires = timer.subscribe();

        info!(
            syncbox_id = %settings.syncbox_id(),
            max_failure_retries = settings.retry_policy().max_failure_retries,
            max_not_founds = settings.retry_policy().max_not_founds,
            "Creating processing queue"
        );

        Self {
            syncbox_id: settings.syncbox_id(),
            sync_data,
            settings,
            store,
            executor,
            observer,
            timer,
            timer_fires,
            failed_changes: FailedChangesQueue::new(),
            limits: TransferLimits::default(),
            pending: VecDeque::new(),
            awaiting_redrive: Vec::new(),
            scheduler: TransferScheduler::new(),
            next_order: 0,
            shut_down: false,
        }
    }

    /// Sets the per-direction concurrency caps
    pub fn with_limits(mut self, limits: TransferLimits) -> Self {
        self.limits = limits;
        self
    }

    // --- accessors ---

    /// Returns the syncbox this queue serves
    pub fn syncbox_id(&self) -> SyncboxId {
        self.syncbox_id
    }

    /// Returns the shared failed-changes queue
    pub fn failed_changes(&self) -> &FailedChangesQueue {
        &self.failed_changes
    }

    /// Returns the shared download-error timer
    pub fn download_error_timer(&self) -> &DownloadErrorTimer {
        &self.timer
    }

    /// Entries waiting to be dispatched
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Entries waiting for the download-error timer
    pub fn awaiting_redrive_len(&self) -> usize {
        self.awaiting_redrive.len()
    }

    /// Transfers in flight
    pub fn in_flight_len(&self) -> usize {
        self.scheduler.len()
    }

    /// Every active entry, wherever it is
    pub fn len(&self) -> usize {
        self.pending.len() + self.awaiting_redrive.len() + self.scheduler.len()
    }

    /// Returns true if no entry is active
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns true if `id` is still active
    pub fn contains(&self, id: &ChangeId) -> bool {
        self.scheduler.contains(id)
            || self.pending.iter().any(|e| e.id() == id)
            || self.awaiting_redrive.iter().any(|e| e.id() == id)
    }

    /// Returns true once [`shutdown`](Self::shutdown) was called
    pub fn is_shut_down(&self) -> bool {
        self.shut_down
    }

    /// Captures the current queue state
    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            pending: self.pending.len(),
            awaiting_redrive: self.awaiting_redrive.len(),
            in_flight: self.scheduler.len(),
            failed_changes: self.failed_changes.len(),
            timer_armed: self.timer.is_armed(),
            oldest_detected_at: self
                .pending
                .iter()
                .chain(self.awaiting_redrive.iter())
                .map(|e| e.file_change().detected_at())
                .min(),
        }
    }

    fn ensure_running(&self) -> Result<(), SyncError> {
        if self.shut_down {
            Err(SyncError::ShutDown)
        } else {
            Ok(())
        }
    }

    fn build_entry(
        &mut self,
        change: FileChange,
        stream: Option<StreamContext>,
    ) -> Result<Entry, SyncError> {
        let order = ResultOrder::new(self.next_order);
        self.next_order += 1;

        let entry = Entry::builder(change, order)
            .stream(stream)
            .sync_data(Arc::clone(&self.sync_data))
            .settings(Arc::clone(&self.settings))
            .syncbox_id(self.syncbox_id)
            .download_error_timer(self.timer.clone())
            .failed_changes(self.failed_changes.clone())
            .build()?;
        Ok(entry)
    }

    // ========================================================================
    // Intake
    // ========================================================================

    /// Persists a change and queues it for dispatch
    ///
    /// # Errors
    /// - `SyncError::ShutDown` after shutdown
    /// - `SyncError::Store` if the change could not be persisted
    pub async fn enqueue(
        &mut self,
        change: FileChange,
        stream: Option<StreamContext>,
    ) -> Result<ChangeId, SyncError> {
        self.ensure_running()?;

        let entry = self.build_entry(change, stream)?;
        self.store
            .save(&QueuedChange::pending(
                self.syncbox_id,
                entry.file_change().clone(),
            ))
            .await
            .map_err(SyncError::Store)?;

        let id = *entry.id();
        info!(
            change_id = %id,
            path = %entry.file_change().path().display(),
            kind = entry.file_change().kind().name(),
            direction = %entry.file_change().direction(),
            "Change enqueued"
        );
        self.pending.push_back(entry);
        Ok(id)
    }

    /// Reloads unfinished changes from the queue store
    ///
    /// Entries already active in this queue are skipped; everything else is
    /// queued again without a stream. Returns how many were recovered.
    ///
    /// # Errors
    /// Returns `SyncError::Store` if the store cannot be read or updated
    pub async fn recover(&mut self) -> Result<usize, SyncError> {
        self.ensure_running()?;

        let stored = self
            .store
            .unfinished(self.syncbox_id)
            .await
            .map_err(SyncError::Store)?;

        let active: HashSet<ChangeId> = self
            .pending
            .iter()
            .chain(self.awaiting_redrive.iter())
            .map(|e| *e.id())
            .collect();

        let mut recovered = 0;
        for queued in stored {
            if active.contains(queued.id()) || self.scheduler.contains(queued.id()) {
                continue;
            }
            if queued.state == QueueState::Dispatched {
                self.store
                    .set_state(queued.id(), QueueState::Pending, queued.last_error.as_deref())
                    .await
                    .map_err(SyncError::Store)?;
            }
            debug!(change_id = %queued.id(), state = %queued.state, "Recovering change");
            let entry = self.build_entry(queued.change, None)?;
            self.pending.push_back(entry);
            recovered += 1;
        }

        info!(recovered, "Recovered unfinished changes");
        Ok(recovered)
    }

    // ========================================================================
    // Dispatch
    // ========================================================================

    fn spawn_transfer(&self, entry: &Entry) -> AsyncUploadDownloadTask {
        let direction = entry.file_change().direction();
        let request = TransferRequest {
            change: entry.file_change().clone(),
            stream: entry.stream().and_then(StreamContext::lease),
            temp_download_path: entry.temp_download_path(),
        };
        let executor = Arc::clone(&self.executor);
        let bind = entry.completion_binder();

        AsyncUploadDownloadTask::spawn(direction, async move {
            let event_id = executor.execute(request).await?;
            bind(event_id).map_err(|err| TransferFailure::transient(err.to_string()))
        })
    }

    /// Starts transfers for pending entries
    ///
    /// Entries stay pending while their direction is at its concurrency cap,
    /// while another change to the same path is in flight, or while an
    /// earlier change to the path waits for the download-error timer. A held
    /// entry also holds every later entry for its path, so same-path changes
    /// run in detection order. Returns how many transfers were started.
    ///
    /// # Errors
    /// Returns `SyncError::Store` if an entry could not be marked dispatched;
    /// that entry and all later ones stay pending
    pub async fn dispatch(&mut self) -> Result<usize, SyncError> {
        self.ensure_running()?;

        let mut held = VecDeque::new();
        let mut held_paths: HashSet<PathBuf> = self
            .awaiting_redrive
            .iter()
            .map(|e| e.file_change().path().to_path_buf())
            .collect();
        let mut dispatched = 0;

        while let Some(entry) = self.pending.pop_front() {
            let path = entry.file_change().path();
            let direction = entry.file_change().direction();
            let at_capacity =
                self.scheduler.in_flight_count(direction) >= self.limits.for_direction(direction);

            if at_capacity || held_paths.contains(path) || self.scheduler.is_path_in_flight(path) {
                held_paths.insert(path.to_path_buf());
                held.push_back(entry);
                continue;
            }

            if let Err(err) = self
                .store
                .set_state(entry.id(), QueueState::Dispatched, None)
                .await
            {
                held.push_back(entry);
                held.extend(self.pending.drain(..));
                self.pending = held;
                return Err(SyncError::Store(err));
            }

            let task = self.spawn_transfer(&entry);
            self.scheduler.dispatch(entry.with_task(task));
            dispatched += 1;
        }

        self.pending = held;
        if dispatched > 0 {
            debug!(
                dispatched,
                in_flight = self.scheduler.len(),
                pending = self.pending.len(),
                "Dispatched transfers"
            );
        }
        Ok(dispatched)
    }

    // ========================================================================
    // Completion
    // ========================================================================

    /// Waits for the next transfer to finish and applies its outcome
    ///
    /// Returns `Ok(None)` when nothing is in flight.
    ///
    /// # Errors
    /// - `SyncError::ShutDown` after shutdown
    /// - `SyncError::Store` if the outcome could not be persisted; the entry
    ///   is requeued and its transfer runs again
    pub async fn process_next(&mut self) -> Result<Option<ProcessOutcome>, SyncError> {
        self.ensure_running()?;

        let Some(TransferOutcome {
            mut entry, result, ..
        }) = self.scheduler.next_completed().await
        else {
            return Ok(None);
        };

        let outcome = match result {
            Ok(processor) => {
                let event_id = processor.event_id();
                if let Some(event_id) = event_id {
                    entry.file_change_mut().set_event_id(event_id);
                }
                self.finish_success(entry, event_id).await?
            }
            Err(failure) => self.finish_failure(entry, failure).await?,
        };
        Ok(Some(outcome))
    }

    async fn finish_success(
        &mut self,
        entry: Entry,
        event_id: Option<EventId>,
    ) -> Result<ProcessOutcome, SyncError> {
        let id = *entry.id();

        if let Err(err) = self.store.remove(&id).await {
            warn!(change_id = %id, error = %err, "Could not remove completed change, requeueing");
            self.requeue(entry);
            return Err(SyncError::Store(err));
        }

        if let Err(err) = self.sync_data.merge_metadata(entry.file_change()).await {
            warn!(change_id = %id, error = %err, "Metadata merge failed after completion");
        }

        self.failed_changes.purge(&id);
        let change = entry.release();

        info!(
            change_id = %id,
            path = %change.path().display(),
            event_id = ?event_id,
            "Change completed"
        );
        self.observer.on_completed(&change, event_id);
        Ok(ProcessOutcome::Completed { id, event_id })
    }

    async fn finish_failure(
        &mut self,
        mut entry: Entry,
        failure: TransferFailure,
    ) -> Result<ProcessOutcome, SyncError> {
        let id = *entry.id();
        let decision = entry.record_failure(&failure);
        let message = failure.to_string();

        if let Err(err) = self
            .store
            .record_failure(entry.file_change(), &message)
            .await
        {
            warn!(change_id = %id, error = %err, "Could not record failure, requeueing");
            self.requeue_for_retry(entry);
            return Err(SyncError::Store(err));
        }

        match decision {
            RetryDecision::Retry { attempt } => {
                let waiting_for_timer = self.requeue_for_retry(entry);
                debug!(change_id = %id, attempt, waiting_for_timer, "Change queued for retry");
                Ok(ProcessOutcome::Retrying {
                    id,
                    attempt,
                    waiting_for_timer,
                })
            }
            RetryDecision::Terminal(kind) => {
                if let Err(err) = self
                    .store
                    .set_state(&id, QueueState::Terminal, Some(&message))
                    .await
                {
                    warn!(
                        change_id = %id,
                        error = %err,
                        "Could not mark change terminal, requeueing"
                    );
                    self.requeue_for_retry(entry);
                    return Err(SyncError::Store(err));
                }

                let change = entry.release();
                if let Err(err) = self
                    .sync_data
                    .report_terminal_failure(&change, &failure)
                    .await
                {
                    warn!(change_id = %id, error = %err, "Could not report terminal failure");
                }

                let err = SyncError::TerminalFailure {
                    path: change.path().to_path_buf(),
                    transient: change.failure_counter(),
                    not_found: change.not_found_counter(),
                    last: failure,
                };
                error!(change_id = %id, error = %err, "Change abandoned");
                self.observer.on_failed(&change, &err);

                Ok(ProcessOutcome::Abandoned { id, kind })
            }
        }
    }

    /// Puts an entry back ahead of every later change to its path
    fn requeue(&mut self, entry: Entry) {
        let order = entry.result_order();
        let path = entry.file_change().path();
        let pos = self
            .pending
            .iter()
            .position(|e| e.file_change().path() == path && e.result_order() > order)
            .unwrap_or(self.pending.len());
        self.pending.insert(pos, entry);
    }

    /// Requeues a failed entry; returns true if it waits for the timer
    ///
    /// Downloads wait for the next fire of an armed download-error timer.
    /// Everything else goes straight back to pending.
    fn requeue_for_retry(&mut self, entry: Entry) -> bool {
        let waiting_for_timer = entry.file_change().direction() == TransferDirection::Download
            && self.timer.is_armed();
        if waiting_for_timer {
            self.awaiting_redrive.push(entry);
        } else {
            self.requeue(entry);
        }
        waiting_for_timer
    }

    // ========================================================================
    // Retry bookkeeping
    // ========================================================================

    /// Removes and returns every recorded failure snapshot, oldest first
    pub fn drain_failed(&self) -> Vec<FileChange> {
        self.failed_changes.drain()
    }

    /// Moves entries waiting on the download-error timer back to pending
    ///
    /// Each entry goes back ahead of later changes to its path. Returns how
    /// many entries were moved.
    pub fn redrive_downloads(&mut self) -> usize {
        let count = self.awaiting_redrive.len();
        if count > 0 {
            info!(count, "Re-driving failed downloads");
            for entry in std::mem::take(&mut self.awaiting_redrive) {
                self.requeue(entry);
            }
        }
        count
    }

    /// Re-drives waiting downloads if the timer fired since the last check
    pub fn poll_timer(&mut self) -> usize {
        if matches!(self.timer_fires.has_changed(), Ok(true)) {
            self.timer_fires.borrow_and_update();
            self.redrive_downloads()
        } else {
            0
        }
    }

    /// Drops every queued (not in-flight) entry for `path`
    ///
    /// Superseded entries release their streams and leave the store; no
    /// observer callback is made. In-flight transfers for the path are left
    /// alone. Returns how many entries were dropped.
    ///
    /// # Errors
    /// Returns `SyncError::Store` if a superseded entry could not be removed
    pub async fn supersede(&mut self, path: &Path) -> Result<usize, SyncError> {
        self.ensure_running()?;

        let matches_path = |e: &Entry| e.file_change().path() == path;

        let (mut superseded, keep): (Vec<Entry>, Vec<Entry>) =
            std::mem::take(&mut self.pending)
                .into_iter()
                .partition(matches_path);
        self.pending = keep.into();

        let (waiting, keep): (Vec<Entry>, Vec<Entry>) =
            std::mem::take(&mut self.awaiting_redrive)
                .into_iter()
                .partition(matches_path);
        self.awaiting_redrive = keep;
        superseded.extend(waiting);

        let count = superseded.len();
        for entry in superseded {
            let id = *entry.id();
            self.failed_changes.purge(&id);
            entry.release();
            info!(change_id = %id, path = %path.display(), "Change superseded");
            self.store.remove(&id).await.map_err(SyncError::Store)?;
        }
        Ok(count)
    }

    /// Drops one queued (not in-flight) entry by id
    ///
    /// The entry's stream is released and it leaves the store. Returns the
    /// dropped change.
    ///
    /// # Errors
    /// - `SyncError::UnknownChange` if no queued entry has this id
    /// - `SyncError::Store` if the entry could not be removed
    pub async fn cancel(&mut self, id: &ChangeId) -> Result<FileChange, SyncError> {
        self.ensure_running()?;

        let entry = if let Some(pos) = self.pending.iter().position(|e| e.id() == id) {
            self.pending.remove(pos)
        } else if let Some(pos) = self.awaiting_redrive.iter().position(|e| e.id() == id) {
            Some(self.awaiting_redrive.remove(pos))
        } else {
            None
        };
        let entry = entry.ok_or_else(|| SyncError::UnknownChange(id.to_string()))?;

        self.failed_changes.purge(id);
        let change = entry.release();
        info!(change_id = %id, path = %change.path().display(), "Change cancelled");
        self.store.remove(id).await.map_err(SyncError::Store)?;
        Ok(change)
    }

    // ========================================================================
    // Driving loop
    // ========================================================================

    /// Dispatches and processes until no entry is left
    ///
    /// Waits on the download-error timer when only timer-held downloads
    /// remain. Returns every outcome in processing order.
    ///
    /// # Errors
    /// Propagates the first error from dispatch or processing
    pub async fn run_until_idle(&mut self) -> Result<Vec<ProcessOutcome>, SyncError> {
        let mut outcomes = Vec::new();
        loop {
            self.ensure_running()?;
            self.poll_timer();
            self.dispatch().await?;

            if let Some(outcome) = self.process_next().await? {
                outcomes.push(outcome);
                continue;
            }
            // Nothing in flight: pending entries can only be held behind
            // timer-held downloads
            if self.awaiting_redrive.is_empty() {
                if self.pending.is_empty() {
                    break;
                }
                continue;
            }
            if self.timer_fires.changed().await.is_err() {
                break;
            }
            self.redrive_downloads();
        }
        Ok(outcomes)
    }

    // ========================================================================
    // Shutdown
    // ========================================================================

    /// Stops the queue
    ///
    /// Cancels the error timer, aborts in-flight transfers and releases
    /// every stream. No observer callback is made afterwards. Stored entries
    /// are kept so [`recover`](Self::recover) can pick them up on the next
    /// start. Returns how many entries were dropped.
    pub fn shutdown(&mut self) -> usize {
        if self.shut_down {
            return 0;
        }
        self.shut_down = true;
        self.timer.cancel();

        let aborted = self.scheduler.abort_all();
        let mut released = 0;
        for entry in self.pending.drain(..).chain(self.awaiting_redrive.drain(..)) {
            entry.release();
            released += 1;
        }

        info!(aborted, released, "Processing queue shut down");
        aborted + released
    }
}

impl std::fmt::Debug for ProcessingQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessingQueue")
            .field("syncbox_id", &self.syncbox_id)
            .field("pending", &self.pending.len())
            .field("awaiting_redrive", &self.awaiting_redrive.len())
            .field("in_flight", &self.scheduler.len())
            .field("shut_down", &self.shut_down)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
