//! Trait definitions for the processing service.

use async_trait::async_trait;
use std::path::Path;

use super::error::ServiceError;
use super::types::{CompressedAsset, ExportItem, HydratedAsset, ProgressStream};
use crate::asset::{AssetData, AssetId, Locator};

/// Backend that reads, compresses and exports assets.
///
/// The pipeline treats it as a black box: file access, the compression
/// algorithm and archive packaging all live behind this trait.
#[async_trait]
pub trait ProcessingService: Send + Sync {
    /// Returns the name of this service implementation.
    fn name(&self) -> &str;

    /// Loads the size and a renderable preview of an asset.
    async fn hydrate(&self, locator: &Locator) -> Result<HydratedAsset, ServiceError>;

    /// Compresses an asset to at most `target_size_kb` where possible.
    ///
    /// Progress is published on the topic for `job_id` while the call runs.
    async fn compress(
        &self,
        locator: &Locator,
        target_size_kb: u32,
        job_id: &AssetId,
    ) -> Result<CompressedAsset, ServiceError>;

    /// Subscribes to progress notifications for `job_id`.
    ///
    /// Notifications published before the subscription are not replayed, so
    /// callers must subscribe before dispatching the job.
    async fn subscribe_progress(&self, job_id: &AssetId) -> Result<ProgressStream, ServiceError>;

    /// Stores pasted binary data and returns a locator for it.
    async fn persist_pasted_asset(
        &self,
        data: &[u8],
        filename: &str,
    ) -> Result<Locator, ServiceError>;

    /// Writes one asset to `destination`.
    async fn export_single(&self, data: &AssetData, destination: &Path)
        -> Result<(), ServiceError>;

    /// Writes several assets as one combined export at `destination`.
    async fn export_batch(
        &self,
        items: Vec<ExportItem>,
        destination: &Path,
    ) -> Result<(), ServiceError>;

    /// Checks that the service is properly configured and ready.
    async fn validate(&self) -> Result<(), ServiceError> {
        Ok(())
    }
}
