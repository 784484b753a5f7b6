//! Index acquisition events.
//!
//! Published by the update applier after the update's transaction has
//! committed. Every subscriber gets its own receiver; drop it to
//! unsubscribe.

use index_types::{FileInfo, FolderInfo, IndexInfo};
use tokio::sync::broadcast;

/// Capacity of each event broadcast buffer.
pub const INDEX_EVENT_CAPACITY: usize = 1024;

/// Records newly applied from one peer batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexRecordAcquired {
    /// The folder the records belong to.
    pub folder: FolderInfo,
    /// Records that replaced the stored state.
    pub records: Vec<FileInfo>,
    /// The peer's progress after the batch.
    pub index_info: IndexInfo,
}

/// A peer's advertised index for a folder is now completely replicated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FullIndexAcquired {
    /// The folder.
    pub folder: FolderInfo,
    /// The peer's progress at the moment it became complete.
    pub index_info: IndexInfo,
}

/// Event streams exposed to status and UI layers.
#[derive(Debug, Clone)]
pub struct IndexEvents {
    record_acquired: broadcast::Sender<IndexRecordAcquired>,
    full_acquired: broadcast::Sender<FullIndexAcquired>,
}

impl IndexEvents {
    /// Create both streams with no subscribers.
    pub fn new() -> Self {
        let (record_acquired, _) = broadcast::channel(INDEX_EVENT_CAPACITY);
        let (full_acquired, _) = broadcast::channel(INDEX_EVENT_CAPACITY);
        Self {
            record_acquired,
            full_acquired,
        }
    }

    /// Subscribe to "index record acquired" events.
    pub fn subscribe_record_acquired(&self) -> broadcast::Receiver<IndexRecordAcquired> {
        self.record_acquired.subscribe()
    }

    /// Subscribe to "full index acquired" events.
    pub fn subscribe_full_acquired(&self) -> broadcast::Receiver<FullIndexAcquired> {
        self.full_acquired.subscribe()
    }

    pub(crate) fn publish_record_acquired(&self, event: IndexRecordAcquired) {
        let records = event.records.len();
        if self.record_acquired.send(event).is_err() {
            tracing::trace!("No subscribers for {} acquired records", records);
        }
    }

    pub(crate) fn publish_full_acquired(&self, event: FullIndexAcquired) {
        tracing::info!(
            "Index of {} for folder {} fully acquired",
            event.index_info.device_id,
            event.folder.folder_id
        );
        let _ = self.full_acquired.send(event);
    }
}

impl Default for IndexEvents {
    fn default() -> Self {
        Self::new()
    }
}
