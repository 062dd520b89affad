// SPDX-License-Identifier: MIT
// Copyright 2026 Roland Dreier <roland@rolandd.dev>

//! Bounded worker pool for deferred (slow) enrichment.
//!
//! Each worker owns a bounded queue. Jobs are routed by (account, asset) so
//! jobs for one asset run in submission order on the same worker. Submission
//! never blocks: a full queue is reported to the caller.

use crate::db::Storage;
use crate::error::StorageError;
use crate::models::{AccountProfile, AssetFields, AssetState, Event, EventFields, MobileLocation};
use crate::services::address::{AddressResolution, AddressResolver, CellResolution};
use crate::services::geozone::{GeozoneLookup, ZoneCache};
use futures_util::future::join_all;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Which deferred lookups a job should perform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EnrichmentRequest {
    pub cell_location: bool,
    pub address: bool,
}

impl EnrichmentRequest {
    pub fn is_empty(&self) -> bool {
        !self.cell_location && !self.address
    }
}

/// One deferred enrichment. Carries snapshots; the worker never touches the
/// caller's live state.
#[derive(Debug, Clone)]
pub struct BackgroundJob {
    pub event: Event,
    pub account: AccountProfile,
    pub asset: AssetState,
    pub request: EnrichmentRequest,
}

/// What a completed job changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct JobReport {
    /// Event fields re-persisted
    pub changed: EventFields,
    /// Serving cell was written to the asset's cell cache
    pub serving_cell_cached: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum JobError {
    #[error("Failed to persist enrichment: {0}")]
    Persistence(#[from] StorageError),

    #[error("Background worker dropped the job")]
    Dropped,
}

#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error("Background queue is full")]
    QueueFull,

    #[error("Background dispatcher is shut down")]
    Closed,
}

/// Completion handle for one job.
#[derive(Debug)]
pub struct JobHandle {
    rx: oneshot::Receiver<Result<JobReport, JobError>>,
}

impl JobHandle {
    /// Wait for the job to finish.
    pub async fn wait(self) -> Result<JobReport, JobError> {
        self.rx.await.unwrap_or(Err(JobError::Dropped))
    }
}

struct Queued {
    job: BackgroundJob,
    reply: oneshot::Sender<Result<JobReport, JobError>>,
}

/// Shared by all workers.
struct Worker {
    storage: Arc<dyn Storage>,
    resolver: AddressResolver,
    zones: Option<Arc<dyn GeozoneLookup>>,
}

/// Fixed-size pool of enrichment workers.
pub struct BackgroundDispatcher {
    senders: Vec<mpsc::Sender<Queued>>,
    workers: Vec<JoinHandle<()>>,
}

impl BackgroundDispatcher {
    /// Spawn `workers` tasks, each with a queue of `queue_size` jobs.
    /// Must be called from within a tokio runtime.
    pub fn new(
        workers: usize,
        queue_size: usize,
        storage: Arc<dyn Storage>,
        resolver: AddressResolver,
        zones: Option<Arc<dyn GeozoneLookup>>,
    ) -> Self {
        let workers = workers.max(1);
        let queue_size = queue_size.max(1);
        let shared = Arc::new(Worker {
            storage,
            resolver,
            zones,
        });

        let mut senders = Vec::with_capacity(workers);
        let mut handles = Vec::with_capacity(workers);
        for id in 0..workers {
            let (tx, rx) = mpsc::channel(queue_size);
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(id, rx, Arc::clone(&shared))));
        }

        tracing::info!(workers, queue_size, "Background dispatcher started");
        Self {
            senders,
            workers: handles,
        }
    }

    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// Queue a job without waiting.
    pub fn submit(&self, job: BackgroundJob) -> Result<JobHandle, DispatchError> {
        let worker = self.route(&job.event.account_id, &job.event.asset_id);
        let (reply, rx) = oneshot::channel();
        self.senders[worker]
            .try_send(Queued { job, reply })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => DispatchError::QueueFull,
                mpsc::error::TrySendError::Closed(_) => DispatchError::Closed,
            })?;
        Ok(JobHandle { rx })
    }

    fn route(&self, account_id: &str, asset_id: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        account_id.hash(&mut hasher);
        asset_id.hash(&mut hasher);
        (hasher.finish() % self.senders.len() as u64) as usize
    }

    /// Stop accepting jobs, drain the queues and wait for all workers.
    pub async fn shutdown(self) {
        let Self { senders, workers } = self;
        drop(senders);
        for result in join_all(workers).await {
            if let Err(e) = result {
                tracing::error!(error = %e, "Background worker panicked");
            }
        }
        tracing::info!("Background dispatcher stopped");
    }
}

async fn run_worker(id: usize, mut rx: mpsc::Receiver<Queued>, worker: Arc<Worker>) {
    while let Some(Queued { job, reply }) = rx.recv().await {
        let account_id = job.event.account_id.clone();
        let asset_id = job.event.asset_id.clone();
        let timestamp = job.event.timestamp;

        let result = worker.run(job).await;
        if let Err(e) = &result {
            tracing::error!(
                worker = id,
                account_id = %account_id,
                asset_id = %asset_id,
                timestamp,
                error = %e,
                "Background enrichment failed"
            );
        }
        // Caller may have dropped the handle.
        let _ = reply.send(result);
    }
    tracing::debug!(worker = id, "Background worker stopped");
}

impl Worker {
    /// Slow-path enrichment. Never evaluates rules.
    async fn run(&self, job: BackgroundJob) -> Result<JobReport, JobError> {
        let BackgroundJob {
            mut event,
            account,
            mut asset,
            request,
        } = job;
        let mut report = JobReport::default();

        if request.cell_location {
            if let CellResolution::Located(fields) = self
                .resolver
                .resolve_cell_location(&mut event, &asset, false)
                .await
            {
                report.changed |= fields;
                if let Some(cell) = event.serving_cell.clone() {
                    let location = fields
                        .contains(EventFields::CELL_LOCATION)
                        .then(|| MobileLocation {
                            point: event.cell_point,
                            accuracy_m: fields
                                .contains(EventFields::CELL_ACCURACY)
                                .then_some(event.cell_accuracy_m),
                        });
                    asset.set_last_serving_cell(cell, location);
                    match self
                        .storage
                        .save_asset_fields(&asset, AssetFields::SERVING_CELL)
                        .await
                    {
                        Ok(()) => report.serving_cell_cached = true,
                        Err(e) => tracing::warn!(
                            asset_id = %event.asset_id,
                            error = %e,
                            "Unable to cache serving cell"
                        ),
                    }
                }
            }
        }

        if request.address {
            let mut zones = ZoneCache::new(self.zones.clone(), &event.account_id);
            if let AddressResolution::Updated(fields) = self
                .resolver
                .resolve(&mut event, &account, false, &mut zones)
                .await
            {
                report.changed |= fields;
            }
        }

        if !report.changed.is_empty() {
            self.storage
                .persist_event_fields(&event, report.changed)
                .await?;
            tracing::info!(
                account_id = %event.account_id,
                asset_id = %event.asset_id,
                timestamp = event.timestamp,
                fields = ?report.changed.names(),
                address = %event.address,
                "Deferred enrichment persisted"
            );
        }

        Ok(report)
    }
}
