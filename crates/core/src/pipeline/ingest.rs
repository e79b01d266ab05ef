//! Asset ingestion: dedup, placeholders and asynchronous hydration.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::types::{HydrationHandle, IngestReport, PastedAsset};
use crate::asset::{AssetRecord, AssetStore, Locator};
use crate::metrics::{ASSETS_INGESTED, ASSETS_SKIPPED, HYDRATIONS_TOTAL};
use crate::service::ProcessingService;

/// Message stored on records whose metadata could not be loaded.
pub const HYDRATION_FAILED_MESSAGE: &str = "Failed to load asset";

/// Accepts new assets into the store.
pub struct Ingestor<S: ProcessingService> {
    store: AssetStore,
    service: Arc<S>,
}

impl<S: ProcessingService + 'static> Ingestor<S> {
    pub fn new(store: AssetStore, service: Arc<S>) -> Self {
        Self { store, service }
    }

    /// Tracks the given locators.
    ///
    /// Placeholders exist in the store by the time this returns; metadata is
    /// loaded in the background, one independent task per record.
    pub async fn ingest<I>(&self, locators: I) -> IngestReport
    where
        I: IntoIterator<Item = Locator>,
    {
        self.ingest_from(locators, "picker").await
    }

    /// Persists pasted images through the service, then tracks them.
    ///
    /// Items the service cannot persist are skipped and counted.
    pub async fn ingest_pasted(&self, items: Vec<PastedAsset>) -> IngestReport {
        let mut locators = Vec::with_capacity(items.len());
        let mut persist_failures = 0;
        let mut replaced = 0;

        for item in &items {
            match self
                .service
                .persist_pasted_asset(&item.data, item.filename())
                .await
            {
                Ok(locator) => {
                    if self.store.find_by_locator(&locator).await.is_some() {
                        warn!(
                            filename = item.filename(),
                            locator = %locator,
                            "Pasted image overwrote the file of a tracked asset"
                        );
                        replaced += 1;
                    }
                    locators.push(locator);
                }
                Err(e) => {
                    warn!(filename = item.filename(), "Failed to persist pasted image: {}", e);
                    persist_failures += 1;
                }
            }
        }

        let mut report = self.ingest_from(locators, "paste").await;
        report.persist_failures = persist_failures;
        report.replaced = replaced;
        report
    }

    async fn ingest_from<I>(&self, locators: I, source: &str) -> IngestReport
    where
        I: IntoIterator<Item = Locator>,
    {
        let batch = self.store.insert_placeholders(locators).await;

        ASSETS_INGESTED
            .with_label_values(&[source])
            .inc_by(batch.created.len() as u64);
        ASSETS_SKIPPED.inc_by(batch.skipped as u64);

        if !batch.created.is_empty() || batch.skipped > 0 {
            info!(
                source,
                created = batch.created.len(),
                skipped = batch.skipped,
                "Ingested assets"
            );
        }

        let created = batch.created.iter().map(|r| r.id).collect();
        let tasks = batch
            .created
            .into_iter()
            .map(|record| self.spawn_hydration(record))
            .collect();

        IngestReport {
            created,
            skipped: batch.skipped,
            persist_failures: 0,
            replaced: 0,
            hydration: HydrationHandle::new(tasks),
        }
    }

    fn spawn_hydration(&self, record: Arc<AssetRecord>) -> JoinHandle<()> {
        let store = self.store.clone();
        let service = Arc::clone(&self.service);

        tokio::spawn(async move {
            let outcome = match service.hydrate(&record.source_locator).await {
                Ok(hydrated) => store
                    .mark_ready(&record.id, hydrated.size_bytes, hydrated.preview)
                    .await
                    .map(|_| "success"),
                Err(e) => {
                    warn!(
                        asset_id = %record.id,
                        locator = %record.source_locator,
                        "Hydration failed: {}", e
                    );
                    store
                        .mark_hydration_failed(&record.id, HYDRATION_FAILED_MESSAGE)
                        .await
                        .map(|_| "failed")
                }
            };

            match outcome {
                Ok(result) => HYDRATIONS_TOTAL.with_label_values(&[result]).inc(),
                Err(e) => {
                    // Record removed while its metadata was loading
                    debug!(asset_id = %record.id, "Discarding hydration result: {}", e);
                    HYDRATIONS_TOTAL.with_label_values(&["discarded"]).inc();
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::AssetStatus;
    use crate::testing::MockProcessingService;
    use std::time::Duration;

    fn harness() -> (Ingestor<MockProcessingService>, AssetStore, MockProcessingService) {
        let store = AssetStore::default();
        let service = MockProcessingService::new();
        let ingestor = Ingestor::new(store.clone(), Arc::new(service.clone()));
        (ingestor, store, service)
    }

    #[tokio::test]
    async fn test_placeholders_exist_before_hydration() {
        let (ingestor, store, service) = harness();
        service.set_hydrate_delay(Duration::from_millis(200)).await;

        let report = ingestor
            .ingest(vec![Locator::from("/a.jpg"), Locator::from("/b.jpg")])
            .await;

        assert_eq!(report.created.len(), 2);
        for id in &report.created {
            assert_eq!(store.get(id).await.unwrap().status, AssetStatus::Hydrating);
        }

        report.hydration.wait().await;
        assert_eq!(store.counts().await.ready, 2);
    }

    #[tokio::test]
    async fn test_duplicate_locators_are_skipped() {
        let (ingestor, store, _service) = harness();

        let first = ingestor.ingest(vec![Locator::from("/a.jpg")]).await;
        first.hydration.wait().await;

        let second = ingestor
            .ingest(vec![Locator::from("/a.jpg"), Locator::from("/b.jpg")])
            .await;
        assert_eq!(second.created.len(), 1);
        assert_eq!(second.skipped, 1);
        second.hydration.wait().await;
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_hydration_failure_marks_record_failed() {
        let (ingestor, store, service) = harness();
        service.fail_hydrate("/broken.png").await;

        let report = ingestor
            .ingest(vec![Locator::from("/broken.png"), Locator::from("/fine.png")])
            .await;
        report.hydration.wait().await;

        let records = store.snapshot().await;
        assert_eq!(records[0].status, AssetStatus::Failed);
        assert_eq!(records[0].error_message.as_deref(), Some(HYDRATION_FAILED_MESSAGE));
        assert_eq!(records[1].status, AssetStatus::Ready);
        assert_eq!(records[1].original_size_bytes, Some(service.default_size_bytes()));
    }

    #[tokio::test]
    async fn test_slow_hydration_does_not_block_others() {
        let (ingestor, store, service) = harness();
        service
            .set_hydrate_delay_for("/slow.png", Duration::from_secs(30))
            .await;

        let report = ingestor
            .ingest(vec![Locator::from("/slow.png"), Locator::from("/fast.png")])
            .await;
        let fast = report.created[1];

        tokio::time::timeout(Duration::from_secs(5), async {
            loop {
                if store.get(&fast).await.unwrap().status == AssetStatus::Ready {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("fast asset should hydrate while slow one is pending");

        assert_eq!(
            store.get(&report.created[0]).await.unwrap().status,
            AssetStatus::Hydrating
        );
    }

    #[tokio::test]
    async fn test_removed_record_discards_hydration() {
        let (ingestor, store, service) = harness();
        service.set_hydrate_delay(Duration::from_millis(50)).await;

        let report = ingestor.ingest(vec![Locator::from("/gone.png")]).await;
        store.remove(&report.created[0]).await;
        report.hydration.wait().await;

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_ingest_pasted() {
        let (ingestor, store, service) = harness();
        service.fail_persist("bad.png").await;

        let report = ingestor
            .ingest_pasted(vec![
                PastedAsset::new(vec![1, 2, 3], None),
                PastedAsset::new(vec![4], Some("bad.png".to_string())),
            ])
            .await;
        assert_eq!(report.created.len(), 1);
        assert_eq!(report.persist_failures, 1);
        report.hydration.wait().await;

        let records = store.snapshot().await;
        assert_eq!(records[0].display_name, "pasted-image.png");
        assert_eq!(records[0].status, AssetStatus::Ready);
        assert_eq!(service.persisted().await, vec!["pasted-image.png".to_string()]);
    }

    #[tokio::test]
    async fn test_pasting_same_image_twice_is_deduped() {
        let (ingestor, store, _service) = harness();

        let paste = || vec![PastedAsset::new(vec![9], Some("clip.png".to_string()))];
        ingestor.ingest_pasted(paste()).await.hydration.wait().await;
        let again = ingestor.ingest_pasted(paste()).await;

        assert_eq!(again.created.len(), 0);
        assert_eq!(again.skipped, 1);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_paste_reusing_a_tracked_name_is_reported() {
        let (ingestor, store, service) = harness();

        let first = ingestor
            .ingest_pasted(vec![PastedAsset::new(vec![1; 8], Some("image.png".to_string()))])
            .await;
        assert_eq!(first.replaced, 0);
        first.hydration.wait().await;

        let second = ingestor
            .ingest_pasted(vec![PastedAsset::new(vec![2; 64], Some("image.png".to_string()))])
            .await;
        assert_eq!(second.replaced, 1);
        assert_eq!(second.skipped, 1);
        assert!(second.created.is_empty());
        assert_eq!(store.len().await, 1);
        assert_eq!(service.persisted().await.len(), 2);
    }
}
