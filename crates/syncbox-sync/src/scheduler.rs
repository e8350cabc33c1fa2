//! Transfer scheduler - the in-flight set of upload/download tasks
//!
//! The [`TransferScheduler`] holds every dispatched transfer and yields them
//! back first-completed-first-processed. For each finished task it:
//!
//! 1. extracts the [`EventIdAndCompletionProcessor`] (a faulted or aborted
//!    task becomes a transient failure),
//! 2. completes the event with the sync-data provider, passing the temp
//!    download folder for downloads,
//! 3. drops the task from the in-flight set whatever the outcome.
//!
//! ## Flow
//!
//! ```text
//! dispatch ──→ FuturesUnordered ──→ next_completed ──→ TransferOutcome
//!                   │                     │
//!              task + complete      in-flight map entry removed
//! ```
//!
//! A completion failure is reported as a transient [`TransferFailure`], the
//! same way a network failure is.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use futures_util::future::BoxFuture;
use futures_util::stream::FuturesUnordered;
use futures_util::{FutureExt, StreamExt};
use syncbox_core::domain::{ChangeId, TransferDirection, TransferFailure};
use tokio::task::AbortHandle;
use tracing::{debug, info};

use crate::completion::EventIdAndCompletionProcessor;
use crate::entry::{
    PossiblyStreamableFileChangeWithSyncData, PossiblyStreamableFileChangeWithUploadDownloadTask,
};

// ============================================================================
// TransferOutcome
// ============================================================================

/// A finished transfer, correlated back to its queue entry
#[derive(Debug)]
pub struct TransferOutcome {
    /// The entry the task was transferring
    pub entry: PossiblyStreamableFileChangeWithSyncData,
    /// Direction of the finished task
    pub direction: TransferDirection,
    /// The completed processor, or why the transfer or completion failed
    pub result: Result<EventIdAndCompletionProcessor, TransferFailure>,
}

impl TransferOutcome {
    /// Returns true if the transfer and its completion both succeeded
    pub fn is_success(&self) -> bool {
        self.result.is_ok()
    }
}

struct InFlight {
    path: PathBuf,
    direction: TransferDirection,
    abort: AbortHandle,
}

// ============================================================================
// TransferScheduler
// ============================================================================

/// Set of in-flight transfers, yielded as they finish
///
/// The set never retains a finished task: every task is removed exactly
/// once, by the [`next_completed`](Self::next_completed) call that yields it
/// or by [`abort_all`](Self::abort_all).
#[derive(Default)]
pub struct TransferScheduler {
    running: FuturesUnordered<BoxFuture<'static, TransferOutcome>>,
    in_flight: HashMap<ChangeId, InFlight>,
}

impl TransferScheduler {
    /// Creates an empty scheduler
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a running transfer to the in-flight set
    pub fn dispatch(&mut self, item: PossiblyStreamableFileChangeWithUploadDownloadTask) {
        let (entry, task) = item.into_parts();
        let id = *entry.id();
        let direction = task.direction();

        info!(
            change_id = %id,
            path = %entry.file_change().path().display(),
            direction = %direction,
            "Dispatching transfer"
        );

        self.in_flight.insert(
            id,
            InFlight {
                path: entry.file_change().path().to_path_buf(),
                direction,
                abort: task.abort_handle(),
            },
        );

        self.running.push(
            async move {
                let result = match task.await {
                    Ok(processor) => match processor.complete(direction).await {
                        Ok(()) => Ok(processor),
                        Err(err) => Err(TransferFailure::transient(format!(
                            "completion failed: {err}"
                        ))),
                    },
                    Err(failure) => Err(failure),
                };
                TransferOutcome {
                    entry,
                    direction,
                    result,
                }
            }
            .boxed(),
        );
    }

    /// Waits for the next transfer to finish
    ///
    /// Returns `None` immediately when nothing is in flight.
    pub async fn next_completed(&mut self) -> Option<TransferOutcome> {
        let outcome = self.running.next().await?;
        self.in_flight.remove(outcome.entry.id());

        match &outcome.result {
            Ok(processor) => debug!(
                change_id = %outcome.entry.id(),
                event_id = ?processor.event_id(),
                remaining = self.in_flight.len(),
                "Transfer completed"
            ),
            Err(failure) => debug!(
                change_id = %outcome.entry.id(),
                failure = %failure,
                remaining = self.in_flight.len(),
                "Transfer failed"
            ),
        }

        Some(outcome)
    }

    /// Number of transfers in flight
    pub fn len(&self) -> usize {
        self.in_flight.len()
    }

    /// Returns true if nothing is in flight
    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    /// Returns true if the change is in flight
    pub fn contains(&self, id: &ChangeId) -> bool {
        self.in_flight.contains_key(id)
    }

    /// Returns true if any in-flight transfer targets `path`
    pub fn is_path_in_flight(&self, path: &Path) -> bool {
        self.in_flight.values().any(|f| f.path == path)
    }

    /// Number of in-flight transfers in one direction
    pub fn in_flight_count(&self, direction: TransferDirection) -> usize {
        self.in_flight
            .values()
            .filter(|f| f.direction == direction)
            .count()
    }

    /// Cancels every in-flight transfer and forgets it
    ///
    /// The entries are dropped without completion, which releases their
    /// streams. Returns how many transfers were cancelled.
    pub fn abort_all(&mut self) -> usize {
        let count = self.in_flight.len();
        for (id, in_flight) in self.in_flight.drain() {
            debug!(change_id = %id, "Aborting transfer");
            in_flight.abort.abort();
        }
        self.running = FuturesUnordered::new();
        count
    }
}

impl std::fmt::Debug for TransferScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransferScheduler")
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use syncbox_core::domain::{
        ChangeKind, EventId, FailureKind, FileChange, ResultOrder, RetryPolicy, StreamContext,
        SyncboxId,
    };

    use super::*;
    use crate::completion::tests::{DropCounter, MockSettings, MockSyncData};
    use crate::error_timer::DownloadErrorTimer;
    use crate::retry::FailedChangesQueue;
    use crate::task::AsyncUploadDownloadTask;

    struct Fixture {
        data: Arc<MockSyncData>,
        timer: DownloadErrorTimer,
        failed: FailedChangesQueue,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                data: Arc::new(MockSyncData::default()),
                timer: DownloadErrorTimer::new(Duration::from_millis(10)),
                failed: FailedChangesQueue::new(),
            }
        }

        fn entry(
            &self,
            path: &str,
            direction: TransferDirection,
            stream: Option<StreamContext>,
        ) -> PossiblyStreamableFileChangeWithSyncData {
            let change = FileChange::new(ChangeKind::Modified, path, direction).unwrap();
            PossiblyStreamableFileChangeWithSyncData::builder(change, ResultOrder::new(0))
                .stream(stream)
                .sync_data(self.data.clone())
                .settings(Arc::new(MockSettings::default()))
                .download_error_timer(self.timer.clone())
                .failed_changes(self.failed.clone())
                .retry_policy(RetryPolicy::default())
                .build()
                .unwrap()
        }

        /// Spawns a transfer that sleeps, then succeeds with `event`
        fn succeed_after(
            &self,
            entry: PossiblyStreamableFileChangeWithSyncData,
            millis: u64,
            event: i64,
        ) -> PossiblyStreamableFileChangeWithUploadDownloadTask {
            let processor = entry
                .completion_processor(Some(EventId::new(event).unwrap()))
                .unwrap();
            let direction = entry.file_change().direction();
            let task = AsyncUploadDownloadTask::spawn(direction, async move {
                tokio::time::sleep(Duration::from_millis(millis)).await;
                Ok(processor)
            });
            entry.with_task(task)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_yields_in_completion_order() {
        let fx = Fixture::new();
        let mut scheduler = TransferScheduler::new();

        scheduler.dispatch(fx.succeed_after(
            fx.entry("/slow", TransferDirection::Upload, None),
            300,
            1,
        ));
        scheduler.dispatch(fx.succeed_after(
            fx.entry("/fast", TransferDirection::Upload, None),
            10,
            2,
        ));
        scheduler.dispatch(fx.succeed_after(
            fx.entry("/medium", TransferDirection::Upload, None),
            100,
            3,
        ));
        assert_eq!(scheduler.len(), 3);
        assert!(scheduler.is_path_in_flight(Path::new("/fast")));

        let mut order = Vec::new();
        while let Some(outcome) = scheduler.next_completed().await {
            assert!(outcome.is_success());
            order.push(outcome.entry.file_change().path().to_path_buf());
        }

        assert_eq!(
            order,
            vec![
                PathBuf::from("/fast"),
                PathBuf::from("/medium"),
                PathBuf::from("/slow")
            ]
        );
        assert!(scheduler.is_empty());
        assert_eq!(fx.data.completed.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_faulted_task_is_removed_and_reported() {
        let fx = Fixture::new();
        let mut scheduler = TransferScheduler::new();

        let entry = fx.entry("/boom", TransferDirection::Upload, None);
        let id = *entry.id();
        let explode = true;
        let task = AsyncUploadDownloadTask::spawn(TransferDirection::Upload, async move {
            if explode {
                panic!("transfer exploded");
            }
            Ok(EventIdAndCompletionProcessor::without_event(
                SyncboxId::new(1),
            ))
        });
        scheduler.dispatch(entry.with_task(task));
        assert!(scheduler.contains(&id));

        let outcome = scheduler.next_completed().await.unwrap();
        let failure = outcome.result.unwrap_err();
        assert_eq!(failure.kind(), FailureKind::Transient);
        assert!(!scheduler.contains(&id));
        assert!(scheduler.next_completed().await.is_none());
        assert!(fx.data.completed.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_download_completion_receives_temp_folder() {
        let fx = Fixture::new();
        let mut scheduler = TransferScheduler::new();

        let entry = fx.entry("/dl", TransferDirection::Download, None);
        scheduler.dispatch(fx.succeed_after(entry, 0, 44));
        assert_eq!(scheduler.in_flight_count(TransferDirection::Download), 1);
        assert_eq!(scheduler.in_flight_count(TransferDirection::Upload), 0);

        let outcome = scheduler.next_completed().await.unwrap();
        assert_eq!(outcome.direction, TransferDirection::Download);

        let completed = fx.data.completed.lock().unwrap();
        assert_eq!(completed[0].0.as_i64(), 44);
        assert_eq!(
            completed[0].1.as_deref(),
            Some(Path::new("/tmp/syncbox-downloads"))
        );
    }

    #[tokio::test]
    async fn test_completion_failure_is_transient() {
        let data = Arc::new(MockSyncData {
            fail_complete: true,
            ..MockSyncData::default()
        });
        let fx = Fixture {
            data,
            ..Fixture::new()
        };
        let mut scheduler = TransferScheduler::new();
        scheduler.dispatch(fx.succeed_after(
            fx.entry("/c", TransferDirection::Upload, None),
            0,
            5,
        ));

        let outcome = scheduler.next_completed().await.unwrap();
        let failure = outcome.result.unwrap_err();
        assert_eq!(failure.kind(), FailureKind::Transient);
        assert!(failure.message().starts_with("completion failed"));
        assert!(scheduler.is_empty());
    }

    #[tokio::test]
    async fn test_abort_all_releases_streams() {
        let fx = Fixture::new();
        let mut scheduler = TransferScheduler::new();

        let drops = Arc::new(AtomicUsize::new(0));
        let stream = StreamContext::new(
            ChangeId::new(),
            DropCounter::new(Cursor::new(vec![0u8; 8]), drops.clone()),
        );
        let entry = fx.entry("/s", TransferDirection::Upload, Some(stream));
        let task = AsyncUploadDownloadTask::spawn(TransferDirection::Upload, async {
            tokio::time::sleep(Duration::from_secs(3600)).await;
            Ok(EventIdAndCompletionProcessor::without_event(
                SyncboxId::new(1),
            ))
        });
        scheduler.dispatch(entry.with_task(task));

        assert_eq!(scheduler.abort_all(), 1);
        assert!(scheduler.is_empty());
        assert_eq!(drops.load(Ordering::SeqCst), 1);
        assert!(scheduler.next_completed().await.is_none());
    }
}
