//! Wiring of the index services.

use crate::activity::Activity;
use crate::aggregator::FolderStatusAggregator;
use crate::applier::UpdateApplier;
use crate::config::{Config, Configuration};
use crate::error::NodeError;
use crate::events::IndexEvents;
use crate::merger::VersionedRecordMerger;
use crate::pipeline::IndexUpdatePipeline;
use index_store::{SqliteIndexRepository, SqliteTempRepository, TempRepository};
use std::sync::Arc;

/// The running index services of one node.
#[derive(Debug)]
pub struct IndexNode {
    repository: SqliteIndexRepository,
    events: IndexEvents,
    activity: Activity,
    pipeline: IndexUpdatePipeline,
    aggregator: FolderStatusAggregator,
}

impl IndexNode {
    /// Open the databases named in `config` and start all services.
    pub async fn start(config: Config) -> Result<Self, NodeError> {
        let repository =
            SqliteIndexRepository::open(&config.storage.database, config.storage.max_connections)
                .await?;
        let temp = SqliteTempRepository::open(&config.storage.temp_database).await?;
        tracing::info!(
            "Opened index {} and overflow store {}",
            config.storage.database.display(),
            config.storage.temp_database.display()
        );

        Self::with_stores(Arc::new(config), repository, Arc::new(temp)).await
    }

    /// Start all services on already opened stores.
    pub async fn with_stores(
        config: Arc<dyn Configuration>,
        repository: SqliteIndexRepository,
        temp: Arc<dyn TempRepository>,
    ) -> Result<Self, NodeError> {
        let events = IndexEvents::new();
        let activity = Activity::new();

        let aggregator =
            FolderStatusAggregator::start(repository.clone(), config.clone(), &events).await?;

        let applier = UpdateApplier::new(
            repository.clone(),
            Arc::new(VersionedRecordMerger),
            config,
            events.clone(),
            activity.clone(),
        );
        let pipeline = IndexUpdatePipeline::start(applier, temp, activity.clone()).await?;

        Ok(Self {
            repository,
            events,
            activity,
            pipeline,
            aggregator,
        })
    }

    /// The ingestion pipeline.
    pub fn pipeline(&self) -> &IndexUpdatePipeline {
        &self.pipeline
    }

    /// The live folder status view.
    pub fn aggregator(&self) -> &FolderStatusAggregator {
        &self.aggregator
    }

    /// Index acquisition event streams.
    pub fn events(&self) -> &IndexEvents {
        &self.events
    }

    /// The index store.
    pub fn repository(&self) -> &SqliteIndexRepository {
        &self.repository
    }

    /// Liveness of the pipeline.
    pub fn activity(&self) -> &Activity {
        &self.activity
    }

    /// Stop all services.
    pub async fn stop(self) {
        let Self {
            repository,
            pipeline,
            aggregator,
            ..
        } = self;

        pipeline.stop().await;
        aggregator.close();
        repository.close().await;
    }
}
