//! Types exchanged with the processing service.

use futures::stream::BoxStream;
use serde::Serialize;

use crate::asset::{AssetData, PreviewHandle};

/// Metadata loaded for a freshly ingested asset.
#[derive(Debug, Clone)]
pub struct HydratedAsset {
    pub size_bytes: u64,
    pub preview: PreviewHandle,
}

/// Output of one compression job.
#[derive(Debug, Clone)]
pub struct CompressedAsset {
    pub original_size_bytes: u64,
    pub compressed_size_bytes: u64,
    pub data: AssetData,
}

/// One entry of a combined export.
#[derive(Debug, Clone)]
pub struct ExportItem {
    /// File name inside the export.
    pub name: String,
    pub data: AssetData,
}

/// Summary of an export item, for logging and reports.
#[derive(Debug, Clone, Serialize)]
pub struct ExportItemInfo {
    pub name: String,
    pub size_bytes: u64,
}

impl From<&ExportItem> for ExportItemInfo {
    fn from(item: &ExportItem) -> Self {
        Self {
            name: item.name.clone(),
            size_bytes: item.data.len() as u64,
        }
    }
}

/// Progress notifications (0-100) for one job.
///
/// Ends once the job's `compress` call has settled.
pub type ProgressStream = BoxStream<'static, u8>;
