//! Event completion
//!
//! An [`EventIdAndCompletionProcessor`] is the unit of "what happens when this
//! event's network operation finishes". It binds the server-assigned event id
//! to the sync-data provider and settings needed to mark that event completed.
//!
//! A processor with event id `0` carries no event: completing it is a no-op.
//! A processor for a real event cannot be built without both collaborators.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use syncbox_core::domain::{DomainError, EventId, SyncboxId, TransferDirection};
use syncbox_core::ports::{ISyncDataProvider, ISyncSettings};
use tracing::debug;

use crate::SyncError;

#[derive(Clone)]
struct EventBinding {
    event_id: EventId,
    sync_data: Arc<dyn ISyncDataProvider>,
    settings: Arc<dyn ISyncSettings>,
}

/// Completes one server event once its transfer has finished
#[derive(Clone)]
pub struct EventIdAndCompletionProcessor {
    syncbox_id: SyncboxId,
    binding: Option<EventBinding>,
    temp_download_folder: Option<PathBuf>,
}

impl EventIdAndCompletionProcessor {
    /// Creates a processor for `event_id`
    ///
    /// An `event_id` of `0` means "no event"; the collaborators are then
    /// optional and ignored.
    ///
    /// # Errors
    /// - `DomainError::InvalidEventId` if `event_id` is negative
    /// - `DomainError::MissingCollaborator` if `event_id` is non-zero and
    ///   `sync_data` or `settings` is missing
    pub fn new(
        event_id: i64,
        syncbox_id: SyncboxId,
        sync_data: Option<Arc<dyn ISyncDataProvider>>,
        settings: Option<Arc<dyn ISyncSettings>>,
        temp_download_folder: Option<PathBuf>,
    ) -> Result<Self, DomainError> {
        if event_id == 0 {
            return Ok(Self {
                syncbox_id,
                binding: None,
                temp_download_folder,
            });
        }

        let event_id = EventId::new(event_id)?;
        let sync_data = sync_data.ok_or(DomainError::MissingCollaborator("sync_data"))?;
        let settings = settings.ok_or(DomainError::MissingCollaborator("settings"))?;

        Ok(Self {
            syncbox_id,
            binding: Some(EventBinding {
                event_id,
                sync_data,
                settings,
            }),
            temp_download_folder,
        })
    }

    /// Creates a processor that completes nothing
    pub fn without_event(syncbox_id: SyncboxId) -> Self {
        Self {
            syncbox_id,
            binding: None,
            temp_download_folder: None,
        }
    }

    /// Returns the bound event id, if any
    pub fn event_id(&self) -> Option<EventId> {
        self.binding.as_ref().map(|b| b.event_id)
    }

    /// Returns the syncbox the event belongs to
    pub fn syncbox_id(&self) -> SyncboxId {
        self.syncbox_id
    }

    /// Returns the folder passed on completion of downloads
    ///
    /// Falls back to the settings' temp download folder when none was given
    /// explicitly.
    pub fn temp_download_folder(&self) -> Option<&Path> {
        self.temp_download_folder.as_deref().or_else(|| {
            self.binding
                .as_ref()
                .and_then(|b| b.settings.temp_download_folder())
        })
    }

    /// Marks the event completed with the sync-data provider
    ///
    /// The temp download folder is passed only for downloads.
    ///
    /// # Errors
    /// Returns `SyncError::Provider` if the provider rejects the completion
    pub async fn complete(&self, direction: TransferDirection) -> Result<(), SyncError> {
        let Some(binding) = &self.binding else {
            debug!(syncbox_id = %self.syncbox_id, "No event to complete");
            return Ok(());
        };

        let temp_folder = match direction {
            TransferDirection::Download => self.temp_download_folder(),
            TransferDirection::Upload => None,
        };

        debug!(
            event_id = %binding.event_id,
            syncbox_id = %self.syncbox_id,
            direction = %direction,
            "Completing event"
        );

        binding
            .sync_data
            .complete_event(binding.event_id, temp_folder)
            .await
            .map_err(SyncError::Provider)
    }
}

impl fmt::Debug for EventIdAndCompletionProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventIdAndCompletionProcessor")
            .field("event_id", &self.event_id())
            .field("syncbox_id", &self.syncbox_id)
            .field("temp_download_folder", &self.temp_download_folder)
            .finish()
    }
}
