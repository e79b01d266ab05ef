//! Export of compressed results.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use crate::asset::{AssetId, AssetRecord, AssetStatus, AssetStore};
use crate::metrics::EXPORTS_TOTAL;
use crate::service::{ExportItem, ExportItemInfo, ProcessingService, ServiceError};

use super::types::ExportSummary;

/// Error type for exports. Exports never change record status.
#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("Asset not found: {0}")]
    NotFound(AssetId),

    #[error("Asset {id} has no compressed result (status: {status})")]
    NotSucceeded { id: AssetId, status: AssetStatus },

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Default file name for an exported record.
pub fn suggested_file_name(record: &AssetRecord) -> String {
    format!("compressed_{}", record.display_name)
}

/// Makes every name unique by inserting ` (n)` before the extension.
fn unique_names<I>(names: I) -> Vec<String>
where
    I: IntoIterator<Item = String>,
{
    let mut taken = HashSet::new();
    let mut out = Vec::new();

    for name in names {
        let mut candidate = name.clone();
        let mut n = 2;
        while taken.contains(&candidate) {
            candidate = match name.rfind('.') {
                Some(dot) if dot > 0 => format!("{} ({}){}", &name[..dot], n, &name[dot..]),
                _ => format!("{} ({})", name, n),
            };
            n += 1;
        }
        taken.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

/// Hands succeeded results to the processing service for writing.
pub struct ExportAggregator<S: ProcessingService> {
    store: AssetStore,
    service: Arc<S>,
}

impl<S: ProcessingService> ExportAggregator<S> {
    pub fn new(store: AssetStore, service: Arc<S>) -> Self {
        Self { store, service }
    }

    /// Exports every succeeded record as one combined archive.
    ///
    /// Does nothing, and does not call the service, when there is nothing
    /// to export.
    pub async fn export_all(&self, destination: &Path) -> Result<ExportSummary, ExportError> {
        let records: Vec<_> = self
            .store
            .with_status(AssetStatus::Succeeded)
            .await
            .into_iter()
            .filter_map(|record| record.result.clone().map(|data| (record, data)))
            .collect();

        if records.is_empty() {
            info!("No compressed assets to export");
            return Ok(ExportSummary::default());
        }

        let names = unique_names(records.iter().map(|(r, _)| suggested_file_name(r)));
        let items: Vec<ExportItem> = names
            .into_iter()
            .zip(records)
            .map(|(name, (_, data))| ExportItem { name, data })
            .collect();
        let infos: Vec<ExportItemInfo> = items.iter().map(ExportItemInfo::from).collect();

        match self.service.export_batch(items, destination).await {
            Ok(()) => {
                EXPORTS_TOTAL.with_label_values(&["batch", "success"]).inc();
                info!(
                    destination = %destination.display(),
                    items = infos.len(),
                    "Exported compressed assets"
                );
                Ok(ExportSummary {
                    destination: Some(destination.to_path_buf()),
                    items: infos,
                })
            }
            Err(e) => {
                EXPORTS_TOTAL.with_label_values(&["batch", "failed"]).inc();
                warn!(destination = %destination.display(), "Combined export failed: {}", e);
                Err(e.into())
            }
        }
    }

    /// Exports one succeeded record to `destination`.
    pub async fn export_one(
        &self,
        id: &AssetId,
        destination: &Path,
    ) -> Result<ExportItemInfo, ExportError> {
        let record = self.store.get(id).await.ok_or(ExportError::NotFound(*id))?;
        let data = match (&record.status, &record.result) {
            (AssetStatus::Succeeded, Some(data)) => data.clone(),
            _ => {
                return Err(ExportError::NotSucceeded {
                    id: *id,
                    status: record.status,
                })
            }
        };

        match self.service.export_single(&data, destination).await {
            Ok(()) => {
                EXPORTS_TOTAL.with_label_values(&["single", "success"]).inc();
                info!(asset_id = %id, destination = %destination.display(), "Exported asset");
                Ok(ExportItemInfo {
                    name: suggested_file_name(&record),
                    size_bytes: data.len() as u64,
                })
            }
            Err(e) => {
                EXPORTS_TOTAL.with_label_values(&["single", "failed"]).inc();
                warn!(asset_id = %id, "Export failed: {}", e);
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetData, Locator, PreviewHandle};
    use crate::testing::MockProcessingService;
    use std::path::PathBuf;

    async fn succeeded(store: &AssetStore, path: &str, bytes: Vec<u8>) -> AssetId {
        let batch = store.insert_placeholders([Locator::from(path)]).await;
        let id = batch.created[0].id;
        store.mark_ready(&id, 100, PreviewHandle::new("data:,")).await.unwrap();
        store.begin_processing(&id).await.unwrap();
        let size = bytes.len() as u64;
        store
            .mark_succeeded(&id, 100, size, AssetData::new(bytes))
            .await
            .unwrap();
        id
    }

    fn aggregator() -> (ExportAggregator<MockProcessingService>, AssetStore, MockProcessingService) {
        let store = AssetStore::default();
        let service = MockProcessingService::new();
        (
            ExportAggregator::new(store.clone(), Arc::new(service.clone())),
            store,
            service,
        )
    }

    #[test]
    fn test_unique_names() {
        let names = unique_names(
            ["a.jpg", "a.jpg", "b.png", "a.jpg", "noext", "noext", ".cfg", ".cfg"]
                .into_iter()
                .map(String::from),
        );
        assert_eq!(
            names,
            vec!["a.jpg", "a (2).jpg", "b.png", "a (3).jpg", "noext", "noext (2)", ".cfg", ".cfg (2)"]
        );
    }

    #[tokio::test]
    async fn test_export_all_with_nothing_calls_nothing() {
        let (aggregator, store, service) = aggregator();
        store.insert_placeholders([Locator::from("/a.jpg")]).await;

        let summary = aggregator.export_all(Path::new("/out.zip")).await.unwrap();
        assert!(summary.is_empty());
        assert!(summary.destination.is_none());
        assert!(service.batch_exports().await.is_empty());
    }

    #[tokio::test]
    async fn test_export_all_names_items() {
        let (aggregator, store, service) = aggregator();
        succeeded(&store, "/x/cat.jpg", vec![1, 2]).await;
        succeeded(&store, "/y/cat.jpg", vec![3]).await;

        let summary = aggregator.export_all(Path::new("/out.zip")).await.unwrap();
        assert_eq!(summary.destination, Some(PathBuf::from("/out.zip")));
        let names: Vec<_> = summary.items.iter().map(|i| i.name.as_str()).collect();
        assert_eq!(names, vec!["compressed_cat.jpg", "compressed_cat (2).jpg"]);

        let exports = service.batch_exports().await;
        assert_eq!(exports.len(), 1);
        assert_eq!(exports[0].items.len(), 2);
        assert_eq!(exports[0].destination, PathBuf::from("/out.zip"));
    }

    #[tokio::test]
    async fn test_export_one_preconditions() {
        let (aggregator, store, _service) = aggregator();
        let batch = store.insert_placeholders([Locator::from("/a.jpg")]).await;
        let pending = batch.created[0].id;

        let err = aggregator
            .export_one(&AssetId::new(), Path::new("/o.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::NotFound(_)));

        let err = aggregator
            .export_one(&pending, Path::new("/o.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ExportError::NotSucceeded { status: AssetStatus::Hydrating, .. }
        ));
    }

    #[tokio::test]
    async fn test_export_failure_keeps_status() {
        let (aggregator, store, service) = aggregator();
        let id = succeeded(&store, "/a.jpg", vec![7; 4]).await;
        service.fail_exports("disk full").await;

        let err = aggregator
            .export_one(&id, Path::new("/o.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExportError::Service(_)));
        assert!(aggregator.export_all(Path::new("/o.zip")).await.is_err());
        assert_eq!(store.get(&id).await.unwrap().status, AssetStatus::Succeeded);
    }

    #[tokio::test]
    async fn test_export_one() {
        let (aggregator, store, service) = aggregator();
        let id = succeeded(&store, "/dir/dog.png", vec![7; 4]).await;

        let info = aggregator
            .export_one(&id, Path::new("/o/dog.png"))
            .await
            .unwrap();
        assert_eq!(info.name, "compressed_dog.png");
        assert_eq!(info.size_bytes, 4);
        assert_eq!(service.single_exports().await, vec![PathBuf::from("/o/dog.png")]);
    }
}
