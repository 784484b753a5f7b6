//! Live per-folder status view.
//!
//! The aggregator seeds folder stats and per-peer progress from storage,
//! then follows the store's stats events and the applier's record events.
//! After each change it republishes the whole status map through a
//! latest-value channel: a new subscriber sees the current map at once
//! and every later one after that.
//!
//! Folders that hold index data but are not configured are listed under
//! their id, both when seeded and when they first show up in an event.

use crate::config::Configuration;
use crate::events::{IndexEvents, IndexRecordAcquired};
use index_core::{upsert_index_info, FolderStatus};
use index_store::{FolderStatsUpdated, SqliteIndexRepository, StorageResult};
use index_types::{FolderInfo, FolderStats, IndexInfo};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;

/// Full status map keyed by folder id.
pub type FolderStatusMap = Arc<BTreeMap<String, FolderStatus>>;

/// Maintains and publishes the status of every folder.
#[derive(Debug)]
pub struct FolderStatusAggregator {
    snapshot: watch::Receiver<FolderStatusMap>,
    task: JoinHandle<()>,
}

/// Mutable state owned by the aggregator task.
struct State {
    folders: Vec<FolderInfo>,
    stats: HashMap<String, FolderStats>,
    index_info: HashMap<String, Vec<IndexInfo>>,
}

impl State {
    async fn load(
        repository: &SqliteIndexRepository,
        config: &dyn Configuration,
    ) -> StorageResult<Self> {
        let mut tx = repository.begin().await?;
        let all_stats = tx.find_all_folder_stats().await?;
        let all_index_info = tx.find_all_index_infos().await?;
        tx.rollback().await?;

        let mut stats = HashMap::new();
        for folder_stats in all_stats {
            stats.insert(folder_stats.folder.clone(), folder_stats);
        }
        let mut index_info: HashMap<String, Vec<IndexInfo>> = HashMap::new();
        for info in all_index_info {
            upsert_index_info(index_info.entry(info.folder.clone()).or_default(), info);
        }

        let mut state = Self {
            folders: config.folders(),
            stats,
            index_info,
        };
        let stored: BTreeSet<String> = state
            .stats
            .keys()
            .chain(state.index_info.keys())
            .cloned()
            .collect();
        for folder in stored {
            state.know_folder(FolderInfo::unlabeled(folder));
        }
        Ok(state)
    }

    fn know_folder(&mut self, folder: FolderInfo) {
        if !self.folders.iter().any(|f| f.folder_id == folder.folder_id) {
            self.folders.push(folder);
        }
    }

    fn apply_stats(&mut self, event: FolderStatsUpdated) {
        for stats in event.stats {
            self.know_folder(FolderInfo::unlabeled(stats.folder.as_str()));
            self.stats.insert(stats.folder.clone(), stats);
        }
    }

    fn apply_record_acquired(&mut self, event: IndexRecordAcquired) {
        let folder = event.index_info.folder.clone();
        self.know_folder(event.folder);
        upsert_index_info(self.index_info.entry(folder).or_default(), event.index_info);
    }

    fn snapshot(&self) -> FolderStatusMap {
        Arc::new(FolderStatus::build_all(
            &self.folders,
            &self.stats,
            &self.index_info,
        ))
    }
}

impl FolderStatusAggregator {
    /// Seed from storage and start following events.
    pub async fn start(
        repository: SqliteIndexRepository,
        config: Arc<dyn Configuration>,
        events: &IndexEvents,
    ) -> StorageResult<Self> {
        // Subscribe before seeding so nothing committed in between is missed.
        let stats_rx = repository.subscribe_folder_stats();
        let records_rx = events.subscribe_record_acquired();

        let state = State::load(&repository, config.as_ref()).await?;
        let (publisher, snapshot) = watch::channel(state.snapshot());
        tracing::info!("Folder status seeded for {} folders", state.folders.len());

        let task = tokio::spawn(run(
            state, repository, config, stats_rx, records_rx, publisher,
        ));

        Ok(Self { snapshot, task })
    }

    /// Current status of one folder.
    ///
    /// Unknown folders get a zero-valued status.
    pub fn folder_status(&self, folder_id: &str) -> FolderStatus {
        self.snapshot
            .borrow()
            .get(folder_id)
            .cloned()
            .unwrap_or_else(|| FolderStatus::dummy(folder_id))
    }

    /// Current status of every folder, ordered by label.
    pub fn folder_status_list(&self) -> Vec<FolderStatus> {
        let snapshot = self.snapshot();
        FolderStatus::sorted_by_label(snapshot.values())
    }

    /// The current status map.
    pub fn snapshot(&self) -> FolderStatusMap {
        self.snapshot.borrow().clone()
    }

    /// Live stream of the full status map, starting with the current one.
    pub fn subscribe(&self) -> watch::Receiver<FolderStatusMap> {
        let mut receiver = self.snapshot.clone();
        receiver.mark_changed();
        receiver
    }

    /// Stop following events. Existing subscribers keep the last map.
    pub fn close(&self) {
        self.task.abort();
    }
}

impl Drop for FolderStatusAggregator {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// What one received event did to the state.
enum Step {
    Changed,
    /// State must be re-read from storage.
    Reload,
    Closed,
}

async fn run(
    mut state: State,
    repository: SqliteIndexRepository,
    config: Arc<dyn Configuration>,
    mut stats_rx: broadcast::Receiver<FolderStatsUpdated>,
    mut records_rx: broadcast::Receiver<IndexRecordAcquired>,
    publisher: watch::Sender<FolderStatusMap>,
) {
    let mut stats_open = true;
    let mut records_open = true;

    while stats_open || records_open {
        let step = tokio::select! {
            event = stats_rx.recv(), if stats_open => match event {
                Ok(event) if event.index_cleared => {
                    tracing::info!("Index cleared, reloading folder status");
                    Step::Reload
                }
                Ok(event) => {
                    state.apply_stats(event);
                    Step::Changed
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Folder status missed {} stats events", missed);
                    Step::Reload
                }
                Err(RecvError::Closed) => {
                    stats_open = false;
                    Step::Closed
                }
            },
            event = records_rx.recv(), if records_open => match event {
                Ok(event) => {
                    state.apply_record_acquired(event);
                    Step::Changed
                }
                Err(RecvError::Lagged(missed)) => {
                    tracing::warn!("Folder status missed {} index events", missed);
                    Step::Reload
                }
                Err(RecvError::Closed) => {
                    records_open = false;
                    Step::Closed
                }
            },
        };

        match step {
            Step::Changed => {}
            Step::Closed => continue,
            Step::Reload => match State::load(&repository, config.as_ref()).await {
                Ok(reloaded) => state = reloaded,
                Err(e) => tracing::error!("Failed to reload folder status: {}", e),
            },
        }

        publisher.send_replace(state.snapshot());
    }
    tracing::debug!("Folder status aggregator stopped");
}
