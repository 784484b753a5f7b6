//! Transactional application of one index update.

use crate::activity::Activity;
use crate::config::Configuration;
use crate::error::PipelineError;
use crate::events::{FullIndexAcquired, IndexEvents, IndexRecordAcquired};
use crate::merger::{MergeResult, RecordMerger};
use index_core::is_remote_index_acquired;
use index_store::SqliteIndexRepository;
use index_types::{FolderInfo, IndexInfo, IndexUpdate};
use std::sync::Arc;

/// Result of applying one update.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyOutcome {
    /// Number of records that replaced the stored state.
    pub applied: usize,
    /// The peer's progress after the update.
    pub index_info: IndexInfo,
    /// Whether this update completed the peer's advertised index.
    pub became_fully_acquired: bool,
}

/// Applies updates to the index, one transaction per update.
#[derive(Clone)]
pub struct UpdateApplier {
    repository: SqliteIndexRepository,
    merger: Arc<dyn RecordMerger>,
    config: Arc<dyn Configuration>,
    events: IndexEvents,
    activity: Activity,
}

impl UpdateApplier {
    /// Create an applier.
    pub fn new(
        repository: SqliteIndexRepository,
        merger: Arc<dyn RecordMerger>,
        config: Arc<dyn Configuration>,
        events: IndexEvents,
        activity: Activity,
    ) -> Self {
        Self {
            repository,
            merger,
            config,
            events,
            activity,
        }
    }

    /// Event streams this applier publishes to.
    pub fn events(&self) -> &IndexEvents {
        &self.events
    }

    /// Apply `update` atomically.
    ///
    /// Events are published only after the transaction commits. On error
    /// nothing is written and nothing is published.
    pub async fn apply(&self, update: &IndexUpdate) -> Result<ApplyOutcome, PipelineError> {
        let mut tx = self.repository.begin().await?;

        let before = tx
            .find_index_info(&update.peer_device_id, &update.folder)
            .await?;
        let was_acquired = is_remote_index_acquired(before.as_ref(), &update.peer_index);

        let MergeResult {
            index_info,
            applied,
        } = self.merger.merge(update, &mut tx).await?;

        let folder = self
            .config
            .folder(&update.folder)
            .unwrap_or_else(|| FolderInfo::unlabeled(update.folder.as_str()));

        tx.commit().await?;

        let is_acquired = is_remote_index_acquired(Some(&index_info), &update.peer_index);
        let became_fully_acquired = !was_acquired && is_acquired;
        let outcome = ApplyOutcome {
            applied: applied.len(),
            index_info: index_info.clone(),
            became_fully_acquired,
        };

        if !applied.is_empty() {
            self.events.publish_record_acquired(IndexRecordAcquired {
                folder: folder.clone(),
                records: applied,
                index_info: index_info.clone(),
            });
        }
        if became_fully_acquired {
            self.events
                .publish_full_acquired(FullIndexAcquired { folder, index_info });
        }

        self.activity.mark();
        Ok(outcome)
    }
}
