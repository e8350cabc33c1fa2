//! Upload/download tasks
//!
//! An [`AsyncUploadDownloadTask`] is a spawned transfer paired with its
//! direction. Awaiting it yields the [`EventIdAndCompletionProcessor`] the
//! transfer produced, or the failure that ended it. A task that panics or is
//! aborted still resolves: the fault is reported as a transient
//! [`TransferFailure`] so it is never dropped unobserved.

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use syncbox_core::domain::{TransferDirection, TransferFailure};
use tokio::task::{AbortHandle, JoinError, JoinHandle};

use crate::completion::EventIdAndCompletionProcessor;

/// What a transfer task resolves to
pub type TransferResult = Result<EventIdAndCompletionProcessor, TransferFailure>;

/// A running upload or download
pub struct AsyncUploadDownloadTask {
    direction: TransferDirection,
    handle: JoinHandle<TransferResult>,
}

impl AsyncUploadDownloadTask {
    /// Spawns `transfer` on the current Tokio runtime
    ///
    /// # Panics
    /// Panics if called outside of a Tokio runtime.
    pub fn spawn<F>(direction: TransferDirection, transfer: F) -> Self
    where
        F: Future<Output = TransferResult> + Send + 'static,
    {
        Self {
            direction,
            handle: tokio::spawn(transfer),
        }
    }

    /// Wraps an already spawned transfer
    pub fn from_handle(direction: TransferDirection, handle: JoinHandle<TransferResult>) -> Self {
        Self { direction, handle }
    }

    /// Returns the transfer direction
    pub fn direction(&self) -> TransferDirection {
        self.direction
    }

    /// Returns true once the transfer has finished (or was aborted)
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Cancels the transfer
    ///
    /// Awaiting the task afterwards yields a transient failure.
    pub fn abort(&self) {
        self.handle.abort();
    }

    /// Returns a handle that can cancel the transfer after the task has
    /// been moved elsewhere
    pub fn abort_handle(&self) -> AbortHandle {
        self.handle.abort_handle()
    }
}

fn fault_to_failure(err: JoinError) -> TransferFailure {
    if err.is_cancelled() {
        TransferFailure::transient("transfer task was cancelled")
    } else {
        TransferFailure::transient(format!("transfer task panicked: {err}"))
    }
}

impl Future for AsyncUploadDownloadTask {
    type Output = TransferResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle)
            .poll(cx)
            .map(|joined| joined.unwrap_or_else(|err| Err(fault_to_failure(err))))
    }
}

impl fmt::Debug for AsyncUploadDownloadTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncUploadDownloadTask")
            .field("direction", &self.direction)
            .field("finished", &self.handle.is_finished())
            .finish()
    }
}
