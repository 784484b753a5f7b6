//! # index-node
//!
//! Runtime services of the bep-index synchronization core.
//!
//! ```text
//! peer batch ─▶ IndexUpdatePipeline ─▶ UpdateApplier ─▶ SqliteIndexRepository
//!                  │      ▲                 │                  │
//!                  ▼      │                 ▼                  ▼
//!              overflow store          IndexEvents       stats events
//!                                           │                  │
//!                                           └──▶ FolderStatusAggregator ─▶ watch
//! ```
//!
//! - [`IndexUpdatePipeline`]: accepts batches without blocking on their
//!   application, spilling to the overflow store when the applier is busy
//! - [`UpdateApplier`]: one transaction per batch, events after commit
//! - [`FolderStatusAggregator`]: live per-folder status map
//! - [`ConnectionHandleTracker`]: current outbound handle of a peer
//! - [`IndexNode`]: wires the above together from a [`Config`]
//!
//! ## Example
//!
//! ```ignore
//! use bep_index_node::{Config, IndexNode};
//!
//! let node = IndexNode::start(Config::default()).await?;
//! let receipt = node
//!     .pipeline()
//!     .submit("docs", records, peer_index, peer_device_id)
//!     .await?;
//! let outcome = receipt.completion().await?;
//! println!("{:?}", node.aggregator().folder_status("docs"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod activity;
pub mod aggregator;
pub mod applier;
pub mod config;
pub mod connection;
pub mod error;
pub mod events;
mod handoff;
pub mod merger;
pub mod node;
pub mod pipeline;

pub use activity::Activity;
pub use aggregator::{FolderStatusAggregator, FolderStatusMap};
pub use applier::{ApplyOutcome, UpdateApplier};
pub use config::{Config, ConfigError, Configuration, FolderConfig, StorageConfig};
pub use connection::{ConnectionHandleTracker, OutboundHandle};
pub use error::{NodeError, PipelineError};
pub use events::{FullIndexAcquired, IndexEvents, IndexRecordAcquired};
pub use merger::{MergeResult, RecordMerger, VersionedRecordMerger};
pub use node::IndexNode;
pub use pipeline::{IndexUpdatePipeline, SubmitReceipt};
