//! Pipeline processor: one entry point over ingestion, scheduling and export.

use std::path::Path;
use std::sync::Arc;
use tokio::sync::broadcast;

use super::config::PipelineConfig;
use super::export::{ExportAggregator, ExportError};
use super::ingest::Ingestor;
use super::scheduler::{JobScheduler, SchedulerError};
use super::types::{BatchSummary, ExportSummary, IngestReport, PastedAsset, PipelineStatus};
use crate::asset::{AssetId, AssetRecord, AssetStore, Locator, StoreEvent};
use crate::service::{ExportItemInfo, ProcessingService};

/// The asset pipeline.
///
/// Owns the record store and wires every component to the same store and
/// processing service.
pub struct PipelineProcessor<S: ProcessingService> {
    config: PipelineConfig,
    store: AssetStore,
    service: Arc<S>,
    ingestor: Ingestor<S>,
    scheduler: JobScheduler<S>,
    exporter: ExportAggregator<S>,
}

impl<S: ProcessingService + 'static> PipelineProcessor<S> {
    /// Creates a new pipeline processor with an empty store.
    pub fn new(config: PipelineConfig, service: S) -> Self {
        let store = AssetStore::new(config.event_buffer);
        let service = Arc::new(service);

        Self {
            ingestor: Ingestor::new(store.clone(), Arc::clone(&service)),
            scheduler: JobScheduler::new(store.clone(), Arc::clone(&service), config.max_size_kb),
            exporter: ExportAggregator::new(store.clone(), Arc::clone(&service)),
            config,
            store,
            service,
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn store(&self) -> &AssetStore {
        &self.store
    }

    pub fn service(&self) -> &Arc<S> {
        &self.service
    }

    /// Subscribes to the store change feed.
    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.store.subscribe()
    }

    pub async fn records(&self) -> Vec<Arc<AssetRecord>> {
        self.store.snapshot().await
    }

    pub async fn ingest<I>(&self, locators: I) -> IngestReport
    where
        I: IntoIterator<Item = Locator>,
    {
        self.ingestor.ingest(locators).await
    }

    pub async fn ingest_pasted(&self, items: Vec<PastedAsset>) -> IngestReport {
        self.ingestor.ingest_pasted(items).await
    }

    /// Current target size in KB.
    pub fn max_size_kb(&self) -> u32 {
        self.scheduler.target_size_kb()
    }

    /// Changes the target size used by later batches.
    pub fn set_max_size_kb(&self, kb: u32) {
        self.scheduler.set_target_size_kb(kb);
    }

    /// Runs a batch with an explicit concurrency limit.
    pub async fn run_batch(&self, limit: usize) -> Result<BatchSummary, SchedulerError> {
        self.scheduler.run_batch(limit).await
    }

    /// Runs a batch with the configured concurrency limit.
    pub async fn compress_all(&self) -> Result<BatchSummary, SchedulerError> {
        self.scheduler
            .run_batch(self.config.effective_concurrency())
            .await
    }

    pub async fn export_all(&self, destination: &Path) -> Result<ExportSummary, ExportError> {
        self.exporter.export_all(destination).await
    }

    pub async fn export_one(
        &self,
        id: &AssetId,
        destination: &Path,
    ) -> Result<ExportItemInfo, ExportError> {
        self.exporter.export_one(id, destination).await
    }

    /// Stops tracking one record. A running job for it finishes in the
    /// service but its results are discarded.
    pub async fn remove(&self, id: &AssetId) -> bool {
        self.store.remove(id).await
    }

    pub async fn clear(&self) -> usize {
        self.store.clear().await
    }

    pub async fn status(&self) -> PipelineStatus {
        PipelineStatus {
            batch_running: self.scheduler.is_running(),
            counts: self.store.counts().await,
            max_size_kb: self.max_size_kb(),
            concurrency_limit: self.config.effective_concurrency(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetStatus;
    use crate::testing::MockProcessingService;

    #[tokio::test]
    async fn test_status_reflects_config() {
        let config = PipelineConfig::default().with_max_size_kb(300).with_concurrency(3);
        let processor = PipelineProcessor::new(config, MockProcessingService::new());

        let status = processor.status().await;
        assert!(!status.batch_running);
        assert_eq!(status.max_size_kb, 300);
        assert_eq!(status.concurrency_limit, 3);
        assert_eq!(status.counts.total(), 0);

        processor.set_max_size_kb(100);
        assert_eq!(processor.status().await.max_size_kb, 100);
    }

    #[tokio::test]
    async fn test_change_feed_sees_ingestion() {
        let processor = PipelineProcessor::new(PipelineConfig::default(), MockProcessingService::new());
        let mut events = processor.subscribe();

        let report = processor.ingest(vec![Locator::from("/a.jpg")]).await;
        match events.recv().await.unwrap() {
            StoreEvent::Upserted(record) => {
                assert_eq!(record.id, report.created[0]);
                assert_eq!(record.status, AssetStatus::Hydrating);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        report.hydration.wait().await;
    }

    #[tokio::test]
    async fn test_compress_all_and_clear() {
        let processor = PipelineProcessor::new(
            PipelineConfig::default().with_concurrency(2),
            MockProcessingService::new(),
        );
        processor
            .ingest(vec![Locator::from("/a.jpg"), Locator::from("/b.jpg")])
            .await
            .hydration
            .wait()
            .await;

        let summary = processor.compress_all().await.unwrap();
        assert_eq!(summary.succeeded, 2);
        assert_eq!(summary.concurrency_limit, 2);

        assert_eq!(processor.clear().await, 2);
        assert!(processor.records().await.is_empty());
    }
}
