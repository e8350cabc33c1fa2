//! Port definitions (hexagonal architecture interfaces)
//!
//! This module defines the port traits that form the boundaries of the
//! change-tracking core. The coordination crate depends on these traits;
//! their implementations live in adapter crates or in the embedding driver.
//!
//! ## Ports Overview
//!
//! - [`ISyncDataProvider`] - Completes events, merges metadata, looks up
//!   local state
//! - [`ISyncSettings`] - Read-only sync configuration
//! - [`IQueueStore`] - Durable storage for queued and failed changes
//! - [`ITransferExecutor`] - Runs upload and download attempts

pub mod queue_store;
pub mod sync_data;
pub mod sync_settings;
pub mod transfer;

pub use queue_store::{IQueueStore, QueueFilter, QueueState, QueuedChange};
pub use sync_data::ISyncDataProvider;
pub use sync_settings::ISyncSettings;
pub use transfer::{ITransferExecutor, TransferRequest};
