//! Record merge rules.
//!
//! These decide whether a remote record replaces the stored one and how a
//! peer's [`IndexInfo`] advances after a batch. They are deliberately
//! free of I/O so that the transactional merger in `index-node` stays a
//! thin loop around them.

use index_types::{DeviceId, FileInfo, IndexInfo, PeerIndexInfo, RemoteFileRecord};

/// Check whether `remote` should replace the locally stored record.
///
/// A record is newer when no local record exists, or when its
/// `(last_modified, current version value)` pair is strictly greater than
/// the local one. Re-sending an already applied record is therefore a
/// no-op.
pub fn is_newer(remote: &RemoteFileRecord, local: Option<&FileInfo>) -> bool {
    let Some(local) = local else {
        return true;
    };

    let remote_key = (
        remote.last_modified,
        remote.versions.last().map(|v| v.value).unwrap_or(0),
    );
    let local_key = (
        local.last_modified,
        local.current_version().map(|v| v.value).unwrap_or(0),
    );

    remote_key > local_key
}

/// Compute a peer's index progress after processing a batch.
///
/// - If the stored entry belongs to a different index generation than the
///   one the peer advertises, progress restarts from zero.
/// - `local_sequence` rises to the highest record sequence in the batch
///   (`batch_max_sequence`) and never decreases.
/// - `max_sequence` is the advertised value, raised if necessary so that
///   `local_sequence <= max_sequence` always holds.
pub fn advance_index_info(
    stored: Option<IndexInfo>,
    folder: &str,
    device_id: &DeviceId,
    peer: &PeerIndexInfo,
    batch_max_sequence: Option<u64>,
) -> IndexInfo {
    let previous_local = stored
        .filter(|info| info.index_id == peer.index_id)
        .map(|info| info.local_sequence)
        .unwrap_or(0);

    let local_sequence = previous_local.max(batch_max_sequence.unwrap_or(0));

    IndexInfo {
        folder: folder.to_string(),
        device_id: device_id.clone(),
        index_id: peer.index_id,
        local_sequence,
        max_sequence: peer.max_sequence.max(local_sequence),
    }
}

/// Check whether a peer's advertised index has been fully replicated.
pub fn is_remote_index_acquired(stored: Option<&IndexInfo>, peer: &PeerIndexInfo) -> bool {
    match stored {
        Some(info) => {
            info.index_id == peer.index_id
                && info.is_fully_acquired()
                && info.local_sequence >= peer.max_sequence
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use index_types::{FileType, IndexId, Version};

    fn remote(last_modified: i64, version: u64) -> RemoteFileRecord {
        RemoteFileRecord {
            path: "a.txt".into(),
            file_type: FileType::File,
            size: 1,
            last_modified,
            deleted: false,
            versions: vec![Version::new(1, version)],
            sequence: 1,
            blocks: vec![],
        }
    }

    fn local(last_modified: i64, version: u64) -> FileInfo {
        FileInfo::file("docs", "a.txt", 1, "00", last_modified, vec![Version::new(1, version)])
    }

    fn peer(index: u64, max: u64) -> PeerIndexInfo {
        PeerIndexInfo {
            index_id: IndexId::new(index),
            max_sequence: max,
        }
    }

    fn stored(index: u64, local_sequence: u64, max_sequence: u64) -> IndexInfo {
        IndexInfo {
            folder: "docs".into(),
            device_id: DeviceId::from("peer"),
            index_id: IndexId::new(index),
            local_sequence,
            max_sequence,
        }
    }

    #[test]
    fn missing_local_record_is_always_older() {
        assert!(is_newer(&remote(0, 0), None));
    }

    #[test]
    fn identical_record_is_not_newer() {
        assert!(!is_newer(&remote(100, 3), Some(&local(100, 3))));
    }

    #[test]
    fn later_modification_wins() {
        assert!(is_newer(&remote(101, 1), Some(&local(100, 9))));
        assert!(!is_newer(&remote(99, 9), Some(&local(100, 1))));
    }

    #[test]
    fn version_breaks_timestamp_tie() {
        assert!(is_newer(&remote(100, 4), Some(&local(100, 3))));
        assert!(!is_newer(&remote(100, 2), Some(&local(100, 3))));
    }

    #[test]
    fn first_batch_creates_progress() {
        let device = DeviceId::from("peer");
        let info = advance_index_info(None, "docs", &device, &peer(7, 5), Some(3));
        assert_eq!(info.index_id, IndexId::new(7));
        assert_eq!(info.local_sequence, 3);
        assert_eq!(info.max_sequence, 5);
    }

    #[test]
    fn local_sequence_never_decreases() {
        let device = DeviceId::from("peer");
        let info = advance_index_info(Some(stored(7, 4, 5)), "docs", &device, &peer(7, 5), Some(2));
        assert_eq!(info.local_sequence, 4);
    }

    #[test]
    fn new_generation_resets_progress() {
        let device = DeviceId::from("peer");
        let info = advance_index_info(Some(stored(7, 4, 5)), "docs", &device, &peer(8, 9), Some(1));
        assert_eq!(info.index_id, IndexId::new(8));
        assert_eq!(info.local_sequence, 1);
        assert_eq!(info.max_sequence, 9);
    }

    #[test]
    fn max_sequence_covers_local_sequence() {
        let device = DeviceId::from("peer");
        let info = advance_index_info(None, "docs", &device, &peer(7, 2), Some(6));
        assert_eq!(info.local_sequence, 6);
        assert_eq!(info.max_sequence, 6);
    }

    #[test]
    fn acquisition_requires_matching_generation() {
        assert!(!is_remote_index_acquired(None, &peer(7, 0)));
        assert!(is_remote_index_acquired(Some(&stored(7, 5, 5)), &peer(7, 5)));
        assert!(!is_remote_index_acquired(Some(&stored(7, 5, 5)), &peer(8, 5)));
        assert!(!is_remote_index_acquired(Some(&stored(7, 4, 5)), &peer(7, 5)));
    }

    #[test]
    fn acquisition_uses_latest_advertised_max() {
        // Stored progress was complete for an older advertisement.
        assert!(!is_remote_index_acquired(Some(&stored(7, 5, 5)), &peer(7, 8)));
    }
}
