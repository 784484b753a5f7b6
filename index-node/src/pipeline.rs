//! Index update ingestion pipeline.
//!
//! Submissions are handed straight to the applier when it is idle. When it
//! is busy the update is written to the overflow store and only its key is
//! queued in memory; a drainer task feeds queued updates back to the
//! applier in submission order.
//!
//! ```text
//! submit ──try_give──────────────────────────▶ applier ──▶ index
//!    │                                            ▲
//!    └─spill─▶ temp store ─key─▶ drainer ──give───┘
//! ```
//!
//! While any spilled update is still waiting, new submissions spill too, so
//! the fast path never overtakes the overflow path.
//!
//! A spilled update stays in the overflow store until the applier is done
//! with it. If the process stops first it is replayed, in its original
//! position, after the next start.

use crate::activity::Activity;
use crate::applier::{ApplyOutcome, UpdateApplier};
use crate::error::PipelineError;
use crate::handoff::{rendezvous, Giver, Taker};
use index_store::TempRepository;
use index_types::{DeviceId, IndexUpdate, PeerIndexInfo, RemoteFileRecord, TempKey};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::task::JoinHandle;

type Reply = oneshot::Sender<Result<ApplyOutcome, PipelineError>>;

/// Completion signal for one submitted update.
#[derive(Debug)]
pub struct SubmitReceipt {
    receiver: oneshot::Receiver<Result<ApplyOutcome, PipelineError>>,
}

impl SubmitReceipt {
    /// Wait until the update has been applied (or has failed).
    ///
    /// Returns [`PipelineError::Shutdown`] if the pipeline stopped first. A
    /// spilled update stays in the overflow store in that case and is
    /// applied after the next start.
    pub async fn completion(self) -> Result<ApplyOutcome, PipelineError> {
        self.receiver.await.unwrap_or(Err(PipelineError::Shutdown))
    }
}

/// An update on its way to the applier.
struct Job {
    update: IndexUpdate,
    reply: Option<Reply>,
    /// Overflow entry to remove once the update has been applied.
    spilled: Option<TempKey>,
}

/// A spilled update waiting for the drainer.
struct Pending {
    key: TempKey,
    reply: Option<Reply>,
}

struct Shared {
    /// Serializes submissions.
    ingest: Mutex<()>,
    giver: Giver<Job>,
    pending: mpsc::UnboundedSender<Pending>,
    /// Spilled updates not yet handed to the applier.
    backlog: AtomicUsize,
    temp: Arc<dyn TempRepository>,
    activity: Activity,
}

/// The ingestion pipeline and its two background tasks.
pub struct IndexUpdatePipeline {
    shared: Arc<Shared>,
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl std::fmt::Debug for IndexUpdatePipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IndexUpdatePipeline")
            .field("backlog", &self.backlog())
            .field("stopped", &*self.shutdown.borrow())
            .finish()
    }
}

impl IndexUpdatePipeline {
    /// Start the drainer and applier tasks.
    ///
    /// Updates left in the overflow store by a previous run are queued
    /// first, oldest first, before any new submission.
    pub async fn start(
        applier: UpdateApplier,
        temp: Arc<dyn TempRepository>,
        activity: Activity,
    ) -> Result<Self, PipelineError> {
        let (giver, taker) = rendezvous();
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        let (shutdown, _) = watch::channel(false);

        let shared = Arc::new(Shared {
            ingest: Mutex::new(()),
            giver,
            pending: pending_tx,
            backlog: AtomicUsize::new(0),
            temp,
            activity,
        });

        let recovered = shared.temp.keys().await?;
        if !recovered.is_empty() {
            tracing::info!("Recovering {} spilled index updates", recovered.len());
        }
        for key in recovered {
            shared.backlog.fetch_add(1, Ordering::SeqCst);
            shared
                .pending
                .send(Pending { key, reply: None })
                .map_err(|_| PipelineError::Shutdown)?;
        }

        let tasks = vec![
            tokio::spawn(run_drainer(
                shared.clone(),
                pending_rx,
                shutdown.subscribe(),
            )),
            tokio::spawn(run_applier(
                applier,
                taker,
                shared.temp.clone(),
                shutdown.subscribe(),
            )),
        ];

        Ok(Self {
            shared,
            shutdown,
            tasks,
        })
    }

    /// Submit a decoded batch from one peer for one folder.
    ///
    /// Never waits for the update to be applied; await the returned receipt
    /// for that.
    pub async fn submit(
        &self,
        folder: &str,
        records: Vec<RemoteFileRecord>,
        peer_index: PeerIndexInfo,
        peer_device_id: DeviceId,
    ) -> Result<SubmitReceipt, PipelineError> {
        self.submit_update(IndexUpdate {
            folder: folder.to_string(),
            records,
            peer_device_id,
            peer_index,
        })
        .await
    }

    /// Submit an already wrapped update.
    pub async fn submit_update(&self, update: IndexUpdate) -> Result<SubmitReceipt, PipelineError> {
        if *self.shutdown.borrow() {
            return Err(PipelineError::Shutdown);
        }

        let _guard = self.shared.ingest.lock().await;
        self.shared.activity.mark();

        let (reply, receiver) = oneshot::channel();
        let receipt = SubmitReceipt { receiver };
        let job = Job {
            update,
            reply: Some(reply),
            spilled: None,
        };

        let job = if self.shared.backlog.load(Ordering::SeqCst) == 0 {
            match self.shared.giver.try_give(job) {
                Ok(()) => return Ok(receipt),
                Err(job) => job,
            }
        } else {
            job
        };

        let bytes = job.update.to_bytes()?;
        let key = self.shared.temp.push(&bytes).await?;
        self.shared.backlog.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(
            "Spilled update for folder {} from {} ({} records, {} bytes) as {}",
            job.update.folder,
            job.update.peer_device_id,
            job.update.records.len(),
            bytes.len(),
            key
        );

        self.shared
            .pending
            .send(Pending {
                key,
                reply: job.reply,
            })
            .map_err(|_| PipelineError::Shutdown)?;

        Ok(receipt)
    }

    /// Spilled updates not yet handed to the applier.
    pub fn backlog(&self) -> usize {
        self.shared.backlog.load(Ordering::SeqCst)
    }

    /// Stop both tasks.
    ///
    /// The update being applied, if any, finishes first. Spilled updates
    /// that were not applied remain in the overflow store, in order.
    pub async fn stop(mut self) {
        self.shutdown.send_replace(true);
        for task in self.tasks.drain(..) {
            if let Err(e) = task.await {
                tracing::error!("Pipeline task failed: {}", e);
            }
        }
        tracing::info!("Index update pipeline stopped");
    }
}

impl Drop for IndexUpdatePipeline {
    fn drop(&mut self) {
        self.shutdown.send_replace(true);
    }
}

/// Feed spilled updates to the applier in spill order.
async fn run_drainer(
    shared: Arc<Shared>,
    mut pending: mpsc::UnboundedReceiver<Pending>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let Pending { key, reply } = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            next = pending.recv() => match next {
                Some(pending) => pending,
                None => break,
            },
        };
        shared.activity.mark();

        let bytes = match shared.temp.peek(&key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::warn!("Spilled update {} is missing from the overflow store", key);
                shared.backlog.fetch_sub(1, Ordering::SeqCst);
                continue;
            }
            Err(e) => {
                tracing::error!("Failed to read spilled update {}: {}", key, e);
                shared.backlog.fetch_sub(1, Ordering::SeqCst);
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e.into()));
                }
                continue;
            }
        };

        let update = match IndexUpdate::from_bytes(&bytes) {
            Ok(update) => update,
            Err(e) => {
                tracing::error!("Dropping undecodable spilled update {}: {}", key, e);
                discard(shared.temp.as_ref(), &key).await;
                shared.backlog.fetch_sub(1, Ordering::SeqCst);
                if let Some(reply) = reply {
                    let _ = reply.send(Err(e.into()));
                }
                continue;
            }
        };

        let job = Job {
            update,
            reply,
            spilled: Some(key),
        };
        let handed = tokio::select! {
            biased;
            _ = shutdown.changed() => false,
            result = shared.giver.give(job) => result.is_ok(),
        };
        if !handed {
            // Left in the overflow store for the next start.
            break;
        }
        shared.backlog.fetch_sub(1, Ordering::SeqCst);
    }
    tracing::debug!("Overflow drainer stopped");
}

/// Apply updates one at a time.
async fn run_applier(
    applier: UpdateApplier,
    taker: Taker<Job>,
    temp: Arc<dyn TempRepository>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        let slot = tokio::select! {
            biased;
            _ = shutdown.changed() => break,
            slot = taker.offer() => slot,
        };
        let Some(mut slot) = slot else { break };

        let job = tokio::select! {
            biased;
            _ = shutdown.changed() => {
                slot.close();
                if let Ok(job) = slot.try_recv() {
                    process(&applier, temp.as_ref(), job).await;
                }
                break;
            }
            job = &mut slot => match job {
                Ok(job) => job,
                Err(_) => continue,
            },
        };

        process(&applier, temp.as_ref(), job).await;
    }
    tracing::debug!("Update applier stopped");
}

async fn process(applier: &UpdateApplier, temp: &dyn TempRepository, job: Job) {
    let Job {
        update,
        reply,
        spilled,
    } = job;
    let result = applier.apply(&update).await;

    match &result {
        Ok(outcome) => tracing::debug!(
            "Applied update for folder {} from {}: {} of {} records",
            update.folder,
            update.peer_device_id,
            outcome.applied,
            update.records.len()
        ),
        Err(e) => tracing::error!(
            "Failed to apply update for folder {} from {}: {}",
            update.folder,
            update.peer_device_id,
            e
        ),
    }

    if let Some(key) = spilled {
        discard(temp, &key).await;
    }
    if let Some(reply) = reply {
        let _ = reply.send(result);
    }
}

async fn discard(temp: &dyn TempRepository, key: &TempKey) {
    if let Err(e) = temp.pop(key).await {
        tracing::error!("Failed to remove spilled update {}: {}", key, e);
    }
}
