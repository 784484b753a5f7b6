//! Record merging inside an index transaction.

use async_trait::async_trait;
use index_core::{advance_index_info, is_newer};
use index_store::{IndexTransaction, StorageError};
use index_types::{FileInfo, IndexInfo, IndexUpdate};

/// What merging one batch changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeResult {
    /// The peer's progress after the batch (already written).
    pub index_info: IndexInfo,
    /// Records that replaced the stored state, in batch order.
    pub applied: Vec<FileInfo>,
}

/// Applies a decoded batch to the index within the caller's transaction.
///
/// Any error aborts the caller's transaction.
#[async_trait]
pub trait RecordMerger: Send + Sync {
    /// Merge `update` into the index through `tx`.
    async fn merge(
        &self,
        update: &IndexUpdate,
        tx: &mut IndexTransaction,
    ) -> Result<MergeResult, StorageError>;
}

/// Default merger: last-modified / version wins.
///
/// A remote record is stored when there is no local record for its path or
/// when it is newer than the local one. The peer's progress is advanced to
/// the highest record sequence in the batch whether or not any record was
/// applied, so replaying a batch leaves everything unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionedRecordMerger;

#[async_trait]
impl RecordMerger for VersionedRecordMerger {
    async fn merge(
        &self,
        update: &IndexUpdate,
        tx: &mut IndexTransaction,
    ) -> Result<MergeResult, StorageError> {
        let folder = update.folder.as_str();
        let stored = tx.find_index_info(&update.peer_device_id, folder).await?;

        let mut applied = Vec::new();
        for record in &update.records {
            let local = tx.find_file_info(folder, &record.path).await?;
            if !is_newer(record, local.as_ref()) {
                continue;
            }

            let info = record.to_file_info(folder)?;
            let blocks = record.to_file_blocks(folder)?;
            tx.update_file_info(&info, blocks.as_ref()).await?;
            applied.push(info);
        }

        let batch_max = update.records.iter().map(|r| r.sequence).max();
        let index_info = advance_index_info(
            stored,
            folder,
            &update.peer_device_id,
            &update.peer_index,
            batch_max,
        );
        tx.update_index_info(&index_info).await?;

        tracing::debug!(
            "Merged {}/{} records for folder {} from {}",
            applied.len(),
            update.records.len(),
            folder,
            update.peer_device_id
        );

        Ok(MergeResult {
            index_info,
            applied,
        })
    }
}
