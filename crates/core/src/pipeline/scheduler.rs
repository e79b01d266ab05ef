//! Bounded-concurrency batch scheduler.

use futures::FutureExt;
use std::collections::VecDeque;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::relay::ProgressRelay;
use super::types::BatchSummary;
use crate::asset::{AssetId, AssetRecord, AssetStatus, AssetStore};
use crate::metrics::{BATCHES_TOTAL, COMPRESSION_DURATION, COMPRESSION_JOBS, JOBS_IN_FLIGHT};
use crate::service::{CompressedAsset, ProcessingService, ServiceError};

/// Error type for batch runs.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SchedulerError {
    /// Another batch is still running.
    #[error("A batch is already in progress")]
    BatchInProgress,

    #[error("Invalid concurrency limit: {0} (must be at least 1)")]
    InvalidConcurrency(usize),

    /// The processing service became unusable; the batch was aborted.
    #[error("Processing service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// How one job ended.
#[derive(Debug)]
enum JobOutcome {
    Succeeded,
    Failed,
    /// The record was removed while its job ran.
    Discarded,
    Unavailable(String),
}

impl JobOutcome {
    fn label(&self) -> &'static str {
        match self {
            JobOutcome::Succeeded => "success",
            JobOutcome::Failed | JobOutcome::Unavailable(_) => "failed",
            JobOutcome::Discarded => "discarded",
        }
    }
}

/// Clears the running flag when the batch ends, however it ends.
struct BatchGuard<'a>(&'a AtomicBool);

impl<'a> BatchGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BatchGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

struct InFlight;

impl InFlight {
    fn enter() -> Self {
        JOBS_IN_FLIGHT.inc();
        Self
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        JOBS_IN_FLIGHT.dec();
    }
}

/// Runs compression batches over the `Ready` records of a store.
pub struct JobScheduler<S: ProcessingService> {
    store: AssetStore,
    runner: Arc<JobRunner<S>>,
    target_size_kb: AtomicU32,
    running: AtomicBool,
}

impl<S: ProcessingService + 'static> JobScheduler<S> {
    pub fn new(store: AssetStore, service: Arc<S>, target_size_kb: u32) -> Self {
        Self {
            runner: Arc::new(JobRunner {
                relay: ProgressRelay::new(store.clone()),
                store: store.clone(),
                service,
            }),
            store,
            target_size_kb: AtomicU32::new(target_size_kb),
            running: AtomicBool::new(false),
        }
    }

    /// Target size passed to the service, in KB.
    pub fn target_size_kb(&self) -> u32 {
        self.target_size_kb.load(Ordering::Relaxed)
    }

    /// Changes the target size. Takes effect from the next batch.
    pub fn set_target_size_kb(&self, kb: u32) {
        self.target_size_kb.store(kb, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Compresses every record that is `Ready` now, at most `limit` at once.
    ///
    /// Individual job failures are recorded on their records; the batch only
    /// errors when it cannot start or the service becomes unavailable.
    pub async fn run_batch(&self, limit: usize) -> Result<BatchSummary, SchedulerError> {
        if limit == 0 {
            BATCHES_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(SchedulerError::InvalidConcurrency(limit));
        }
        let Some(_guard) = BatchGuard::acquire(&self.running) else {
            BATCHES_TOTAL.with_label_values(&["rejected"]).inc();
            return Err(SchedulerError::BatchInProgress);
        };

        let started = Instant::now();
        let target_size_kb = self.target_size_kb();
        let mut pending: VecDeque<AssetId> = self
            .store
            .with_status(AssetStatus::Ready)
            .await
            .iter()
            .map(|r| r.id)
            .collect();

        let mut summary = BatchSummary {
            queued: pending.len(),
            concurrency_limit: limit,
            ..Default::default()
        };
        info!(
            queued = summary.queued,
            limit, target_size_kb, "Starting compression batch"
        );

        // Jobs run on their own tasks; this loop never has to poll them.
        let mut in_flight = JoinSet::new();
        let mut unavailable: Option<String> = None;

        loop {
            while unavailable.is_none() && in_flight.len() < limit {
                let Some(id) = pending.pop_front() else {
                    break;
                };
                match self.store.begin_processing(&id).await {
                    Ok(record) => {
                        debug!(asset_id = %id, "Admitted compression job");
                        summary.admitted += 1;
                        let runner = Arc::clone(&self.runner);
                        in_flight.spawn(async move { runner.run(record, target_size_kb).await });
                    }
                    Err(e) => {
                        debug!(asset_id = %id, "Skipping queued asset: {}", e);
                        summary.skipped += 1;
                    }
                }
            }

            let Some(joined) = in_flight.join_next().await else {
                break;
            };
            let outcome = match joined {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!("Compression task did not complete: {}", e);
                    JobOutcome::Discarded
                }
            };
            match outcome {
                JobOutcome::Succeeded => summary.succeeded += 1,
                JobOutcome::Failed => summary.failed += 1,
                JobOutcome::Discarded => summary.skipped += 1,
                JobOutcome::Unavailable(message) => {
                    summary.failed += 1;
                    if unavailable.is_none() {
                        error!("Processing service unavailable, stopping admission: {}", message);
                        unavailable = Some(message);
                    }
                }
            }
        }

        // Left Ready when admission stopped early
        summary.skipped += pending.len();
        summary.duration_ms = started.elapsed().as_millis() as u64;

        if let Some(message) = unavailable {
            BATCHES_TOTAL.with_label_values(&["aborted"]).inc();
            warn!(
                succeeded = summary.succeeded,
                failed = summary.failed,
                not_started = pending.len(),
                "Compression batch aborted"
            );
            return Err(SchedulerError::ServiceUnavailable(message));
        }

        BATCHES_TOTAL.with_label_values(&["completed"]).inc();
        info!(
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            duration_ms = summary.duration_ms,
            "Compression batch finished"
        );
        Ok(summary)
    }
}

/// Runs single jobs on behalf of a scheduler.
struct JobRunner<S: ProcessingService> {
    store: AssetStore,
    service: Arc<S>,
    relay: ProgressRelay,
}

impl<S: ProcessingService + 'static> JobRunner<S> {
    /// Runs one job to a settled record. A panicking job settles as failed.
    async fn run(&self, record: Arc<AssetRecord>, target_size_kb: u32) -> JobOutcome {
        let id = record.id;
        match AssertUnwindSafe(self.run_job(record, target_size_kb))
            .catch_unwind()
            .await
        {
            Ok(outcome) => outcome,
            Err(_) => {
                error!(asset_id = %id, "Compression job panicked");
                let outcome = self
                    .settle(&id, Err(ServiceError::Other("Compression job panicked".to_string())))
                    .await;
                COMPRESSION_JOBS.with_label_values(&[outcome.label()]).inc();
                outcome
            }
        }
    }

    async fn run_job(&self, record: Arc<AssetRecord>, target_size_kb: u32) -> JobOutcome {
        let id = record.id;
        let started = Instant::now();

        let result = {
            let _in_flight = InFlight::enter();
            match self.relay.attach(self.service.as_ref(), id).await {
                Ok(mut subscription) => {
                    let dispatch =
                        self.service
                            .compress(&record.source_locator, target_size_kb, &id);
                    let result = self.relay.drive(&mut subscription, dispatch).await;
                    self.relay.detach(subscription);
                    result
                }
                Err(e) => Err(e),
            }
        };

        let outcome = self.settle(&id, result).await;
        COMPRESSION_JOBS.with_label_values(&[outcome.label()]).inc();
        COMPRESSION_DURATION
            .with_label_values(&[outcome.label()])
            .observe(started.elapsed().as_secs_f64());
        outcome
    }

    async fn settle(
        &self,
        id: &AssetId,
        result: Result<CompressedAsset, ServiceError>,
    ) -> JobOutcome {
        match result {
            Ok(compressed) => {
                let size = compressed.compressed_size_bytes;
                match self
                    .store
                    .mark_succeeded(
                        id,
                        compressed.original_size_bytes,
                        size,
                        compressed.data,
                    )
                    .await
                {
                    Ok(_) => {
                        debug!(asset_id = %id, size, "Compression succeeded");
                        JobOutcome::Succeeded
                    }
                    Err(e) => {
                        debug!(asset_id = %id, "Discarding compression result: {}", e);
                        JobOutcome::Discarded
                    }
                }
            }
            Err(e) => {
                let message = e.to_string();
                warn!(asset_id = %id, "Compression failed: {}", message);
                let recorded = self.store.mark_failed(id, &message).await;

                if e.is_fatal() {
                    JobOutcome::Unavailable(message)
                } else if let Err(e) = recorded {
                    debug!(asset_id = %id, "Discarding compression failure: {}", e);
                    JobOutcome::Discarded
                } else {
                    JobOutcome::Failed
                }
            }
        }
    }
}
