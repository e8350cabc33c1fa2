//! Transfer executor port (driven/secondary port)
//!
//! The executor performs the network half of a change: it pushes an upload
//! body or pulls a download into the temporary download area, and reports the
//! server event id the round trip produced. Failures are classified with the
//! [`TransferFailure`] taxonomy so the retry bookkeeping can count them.

use std::fmt;
use std::path::PathBuf;

use crate::domain::{EventId, FileChange, StreamLease, TransferFailure};

/// One transfer attempt handed to the executor
pub struct TransferRequest {
    /// Snapshot of the change being transferred
    pub change: FileChange,
    /// Stream for this attempt; returned to its context when dropped
    pub stream: Option<StreamLease>,
    /// Destination for download content, if the change is a download
    pub temp_download_path: Option<PathBuf>,
}

impl fmt::Debug for TransferRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransferRequest")
            .field("change", &self.change)
            .field("has_stream", &self.stream.is_some())
            .field("temp_download_path", &self.temp_download_path)
            .finish()
    }
}

/// Port trait for the network transfer layer
#[async_trait::async_trait]
pub trait ITransferExecutor: Send + Sync {
    /// Runs one upload or download attempt
    ///
    /// Returns the server event id assigned to the change, if the server
    /// acknowledged one.
    async fn execute(&self, request: TransferRequest) -> Result<Option<EventId>, TransferFailure>;
}
