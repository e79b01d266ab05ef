//! Types for the pipeline module.

use serde::Serialize;
use std::path::PathBuf;
use tokio::task::JoinHandle;

use crate::asset::{AssetId, StatusCounts};
use crate::service::ExportItemInfo;

/// Binary data pasted from the clipboard.
#[derive(Debug, Clone)]
pub struct PastedAsset {
    pub data: Vec<u8>,
    /// Original file name, if the clipboard carried one.
    pub filename: Option<String>,
}

impl PastedAsset {
    pub const DEFAULT_FILENAME: &'static str = "pasted-image.png";

    pub fn new(data: Vec<u8>, filename: Option<String>) -> Self {
        Self { data, filename }
    }

    pub fn filename(&self) -> &str {
        self.filename
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(Self::DEFAULT_FILENAME)
    }
}

/// Outstanding hydration tasks of one ingestion.
///
/// Dropping the handle does not cancel hydration.
#[derive(Debug, Default)]
pub struct HydrationHandle {
    tasks: Vec<JoinHandle<()>>,
}

impl HydrationHandle {
    pub(crate) fn new(tasks: Vec<JoinHandle<()>>) -> Self {
        Self { tasks }
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Waits until every hydration of the ingestion has settled.
    pub async fn wait(self) {
        for task in self.tasks {
            if let Err(e) = task.await {
                tracing::error!("Hydration task panicked: {}", e);
            }
        }
    }
}

/// Result of one ingestion call.
#[derive(Debug, Default)]
pub struct IngestReport {
    /// Ids of the placeholders created, in ingestion order.
    pub created: Vec<AssetId>,
    /// Locators skipped as duplicates.
    pub skipped: usize,
    /// Pasted items that could not be persisted.
    pub persist_failures: usize,
    /// Pasted items whose persisted file replaced one already tracked.
    pub replaced: usize,
    pub hydration: HydrationHandle,
}

/// Outcome of one batch run.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    /// Records captured as `Ready` when the batch started.
    pub queued: usize,
    /// Records that were actually dispatched.
    pub admitted: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Queued records that were not dispatched or whose result was discarded.
    pub skipped: usize,
    pub concurrency_limit: usize,
    pub duration_ms: u64,
}

/// Outcome of a combined export.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ExportSummary {
    /// Where the export was written. `None` when there was nothing to export.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub destination: Option<PathBuf>,
    pub items: Vec<ExportItemInfo>,
}

impl ExportSummary {
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// Overall pipeline status.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStatus {
    /// Whether a batch is currently running.
    pub batch_running: bool,
    pub counts: StatusCounts,
    pub max_size_kb: u32,
    pub concurrency_limit: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pasted_asset_default_name() {
        assert_eq!(PastedAsset::new(vec![], None).filename(), "pasted-image.png");
        assert_eq!(
            PastedAsset::new(vec![], Some("  ".into())).filename(),
            "pasted-image.png"
        );
        assert_eq!(
            PastedAsset::new(vec![], Some("shot.jpg".into())).filename(),
            "shot.jpg"
        );
    }

    #[test]
    fn test_batch_summary_serialization() {
        let summary = BatchSummary {
            queued: 3,
            admitted: 3,
            succeeded: 2,
            failed: 1,
            skipped: 0,
            concurrency_limit: 2,
            duration_ms: 15,
        };
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"succeeded\":2"));
        assert!(json.contains("\"concurrency_limit\":2"));
    }

    #[tokio::test]
    async fn test_empty_hydration_handle() {
        let handle = HydrationHandle::default();
        assert!(handle.is_empty());
        handle.wait().await;
    }
}
