//! Sync settings port
//!
//! Read-only view of the configuration the coordination layer needs. The
//! YAML-backed [`Config`](crate::config::Config) implements it; drivers may
//! supply their own implementation.

use std::path::Path;
use std::time::Duration;

use crate::domain::{RetryPolicy, SyncboxId};

/// Port trait for sync configuration
pub trait ISyncSettings: Send + Sync {
    /// Syncbox these settings apply to
    fn syncbox_id(&self) -> SyncboxId;

    /// Folder for trace output, if tracing to disk is enabled
    fn trace_folder(&self) -> Option<&Path>;

    /// Version string reported to the server
    fn client_version(&self) -> &str;

    /// Retry caps for queued changes
    fn retry_policy(&self) -> RetryPolicy;

    /// Folder where downloads are staged before completion
    fn temp_download_folder(&self) -> Option<&Path>;

    /// Debounce interval of the shared download-error timer
    fn download_error_delay(&self) -> Duration;
}
