//! Mock processing service for testing.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{RwLock, Semaphore};

use crate::asset::{AssetData, AssetId, Locator, PreviewHandle};
use crate::service::{
    CompressedAsset, ExportItem, ExportItemInfo, HydratedAsset, ProcessingService, ProgressHub,
    ProgressStream, ServiceError,
};

/// Size reported for every hydrated asset.
const DEFAULT_SIZE_BYTES: u64 = 200_000;

/// Configured failure for a compression job.
#[derive(Debug, Clone)]
enum CompressFailure {
    Message(String),
    Unavailable,
}

/// A recorded combined export for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedBatchExport {
    pub items: Vec<ExportItemInfo>,
    pub destination: PathBuf,
}

/// Mock implementation of the ProcessingService trait.
///
/// Provides controllable behavior for testing:
/// - Hydration latency (global or per locator) and failures
/// - Compression latency, progress steps and failures
/// - A completion gate holding jobs until released
/// - Call recording and peak concurrency tracking
///
/// # Example
///
/// ```rust,ignore
/// use leap_core::testing::MockProcessingService;
///
/// let service = MockProcessingService::new();
/// service.fail_compress("/pics/broken.jpg", "Unsupported image format: tiff").await;
/// service.hold_completions().await;
///
/// // ... run a batch, then let one job finish
/// service.release(1).await;
///
/// assert_eq!(service.max_concurrent(), 2);
/// ```
#[derive(Debug, Clone)]
pub struct MockProcessingService {
    progress: ProgressHub,
    hydrate_delay: Arc<RwLock<Duration>>,
    hydrate_delays: Arc<RwLock<HashMap<String, Duration>>>,
    hydrate_failures: Arc<RwLock<HashSet<String>>>,
    compress_delay: Arc<RwLock<Duration>>,
    progress_steps: Arc<RwLock<Vec<u8>>>,
    compress_failures: Arc<RwLock<HashMap<String, CompressFailure>>>,
    gate: Arc<RwLock<Option<Arc<Semaphore>>>>,
    compress_calls: Arc<RwLock<Vec<Locator>>>,
    target_sizes: Arc<RwLock<Vec<u32>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
    persist_failures: Arc<RwLock<HashSet<String>>>,
    persisted: Arc<RwLock<Vec<String>>>,
    export_error: Arc<RwLock<Option<String>>>,
    single_exports: Arc<RwLock<Vec<PathBuf>>>,
    batch_exports: Arc<RwLock<Vec<RecordedBatchExport>>>,
}

impl Default for MockProcessingService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockProcessingService {
    /// Create a new mock service. Jobs take 10ms and report 0, 25, 50, 75, 100.
    pub fn new() -> Self {
        Self {
            progress: ProgressHub::default(),
            hydrate_delay: Arc::new(RwLock::new(Duration::ZERO)),
            hydrate_delays: Arc::new(RwLock::new(HashMap::new())),
            hydrate_failures: Arc::new(RwLock::new(HashSet::new())),
            compress_delay: Arc::new(RwLock::new(Duration::from_millis(10))),
            progress_steps: Arc::new(RwLock::new(vec![0, 25, 50, 75, 100])),
            compress_failures: Arc::new(RwLock::new(HashMap::new())),
            gate: Arc::new(RwLock::new(None)),
            compress_calls: Arc::new(RwLock::new(Vec::new())),
            target_sizes: Arc::new(RwLock::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
            persist_failures: Arc::new(RwLock::new(HashSet::new())),
            persisted: Arc::new(RwLock::new(Vec::new())),
            export_error: Arc::new(RwLock::new(None)),
            single_exports: Arc::new(RwLock::new(Vec::new())),
            batch_exports: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Size reported by `hydrate` and used as the original size.
    pub fn default_size_bytes(&self) -> u64 {
        DEFAULT_SIZE_BYTES
    }

    // -------------------------------------------------------------------------
    // Hydration
    // -------------------------------------------------------------------------

    pub async fn set_hydrate_delay(&self, delay: Duration) {
        *self.hydrate_delay.write().await = delay;
    }

    /// Overrides the hydration delay for one locator.
    pub async fn set_hydrate_delay_for(&self, locator: &str, delay: Duration) {
        self.hydrate_delays
            .write()
            .await
            .insert(locator.to_string(), delay);
    }

    /// Makes hydration of `locator` fail.
    pub async fn fail_hydrate(&self, locator: &str) {
        self.hydrate_failures.write().await.insert(locator.to_string());
    }

    // -------------------------------------------------------------------------
    // Compression
    // -------------------------------------------------------------------------

    /// Total simulated duration of one job, spread over its progress steps.
    pub async fn set_compress_delay(&self, delay: Duration) {
        *self.compress_delay.write().await = delay;
    }

    pub async fn set_progress_steps(&self, steps: Vec<u8>) {
        *self.progress_steps.write().await = steps;
    }

    /// Makes compression of `locator` fail with `message` as the error text.
    pub async fn fail_compress(&self, locator: &str, message: &str) {
        self.compress_failures.write().await.insert(
            locator.to_string(),
            CompressFailure::Message(message.to_string()),
        );
    }

    /// Makes compression of `locator` fail with `ServiceError::Unavailable`.
    pub async fn fail_compress_fatal(&self, locator: &str) {
        self.compress_failures
            .write()
            .await
            .insert(locator.to_string(), CompressFailure::Unavailable);
    }

    /// Holds every job before its last progress step until released.
    pub async fn hold_completions(&self) {
        *self.gate.write().await = Some(Arc::new(Semaphore::new(0)));
    }

    /// Lets `count` held jobs complete.
    pub async fn release(&self, count: usize) {
        if let Some(gate) = self.gate.read().await.as_ref() {
            gate.add_permits(count);
        }
    }

    /// Locators passed to `compress`, in call order.
    pub async fn compress_calls(&self) -> Vec<Locator> {
        self.compress_calls.read().await.clone()
    }

    /// Target sizes passed to `compress`, in call order.
    pub async fn target_sizes(&self) -> Vec<u32> {
        self.target_sizes.read().await.clone()
    }

    /// Jobs currently inside `compress`.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Highest number of concurrent `compress` calls observed.
    pub fn max_concurrent(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    // -------------------------------------------------------------------------
    // Paste and export
    // -------------------------------------------------------------------------

    /// Makes persisting a pasted image named `filename` fail.
    pub async fn fail_persist(&self, filename: &str) {
        self.persist_failures.write().await.insert(filename.to_string());
    }

    /// File names of persisted pasted images.
    pub async fn persisted(&self) -> Vec<String> {
        self.persisted.read().await.clone()
    }

    /// Makes every export fail with `reason`.
    pub async fn fail_exports(&self, reason: &str) {
        *self.export_error.write().await = Some(reason.to_string());
    }

    pub async fn single_exports(&self) -> Vec<PathBuf> {
        self.single_exports.read().await.clone()
    }

    pub async fn batch_exports(&self) -> Vec<RecordedBatchExport> {
        self.batch_exports.read().await.clone()
    }

    async fn check_export(&self) -> Result<(), ServiceError> {
        match self.export_error.read().await.as_ref() {
            Some(reason) => Err(ServiceError::export_failed(reason)),
            None => Ok(()),
        }
    }
}

/// Decrements the in-flight counter when a job ends.
struct InFlightGuard(Arc<AtomicUsize>);

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl ProcessingService for MockProcessingService {
    fn name(&self) -> &str {
        "mock"
    }

    async fn hydrate(&self, locator: &Locator) -> Result<HydratedAsset, ServiceError> {
        let delay = match self.hydrate_delays.read().await.get(locator.as_str()) {
            Some(delay) => *delay,
            None => *self.hydrate_delay.read().await,
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        if self.hydrate_failures.read().await.contains(locator.as_str()) {
            return Err(ServiceError::read_failed(locator, "mock read failure"));
        }

        Ok(HydratedAsset {
            size_bytes: DEFAULT_SIZE_BYTES,
            preview: PreviewHandle::new(format!("mock-preview:{}", locator)),
        })
    }

    async fn compress(
        &self,
        locator: &Locator,
        target_size_kb: u32,
        job_id: &AssetId,
    ) -> Result<CompressedAsset, ServiceError> {
        self.compress_calls.write().await.push(locator.clone());
        self.target_sizes.write().await.push(target_size_kb);

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let _guard = InFlightGuard(Arc::clone(&self.in_flight));

        let topic = self.progress.open(job_id);
        let steps = self.progress_steps.read().await.clone();
        let pause = *self.compress_delay.read().await / (steps.len().max(1) as u32);
        let failure = self.compress_failures.read().await.get(locator.as_str()).cloned();

        if let Some(failure) = failure {
            if let Some(first) = steps.first() {
                topic.report(*first);
            }
            tokio::time::sleep(pause).await;
            return Err(match failure {
                CompressFailure::Message(message) => ServiceError::Other(message),
                CompressFailure::Unavailable => {
                    ServiceError::Unavailable("mock service disconnected".to_string())
                }
            });
        }

        let (last, rest) = match steps.split_last() {
            Some((last, rest)) => (Some(*last), rest),
            None => (None, &steps[..]),
        };
        for step in rest {
            topic.report(*step);
            tokio::time::sleep(pause).await;
        }

        let gate = self.gate.read().await.clone();
        if let Some(gate) = gate {
            if let Ok(permit) = gate.acquire().await {
                permit.forget();
            }
        }

        if let Some(last) = last {
            topic.report(last);
        }

        let compressed_size = DEFAULT_SIZE_BYTES / 2;
        Ok(CompressedAsset {
            original_size_bytes: DEFAULT_SIZE_BYTES,
            compressed_size_bytes: compressed_size,
            data: AssetData::new(vec![0u8; compressed_size as usize]),
        })
    }

    async fn subscribe_progress(&self, job_id: &AssetId) -> Result<ProgressStream, ServiceError> {
        Ok(self.progress.subscribe(job_id))
    }

    async fn persist_pasted_asset(
        &self,
        _data: &[u8],
        filename: &str,
    ) -> Result<Locator, ServiceError> {
        if self.persist_failures.read().await.contains(filename) {
            return Err(ServiceError::Other(format!("cannot persist {}", filename)));
        }
        self.persisted.write().await.push(filename.to_string());
        Ok(Locator::new(format!("/mock/paste/{}", filename)))
    }

    async fn export_single(
        &self,
        _data: &AssetData,
        destination: &Path,
    ) -> Result<(), ServiceError> {
        self.check_export().await?;
        self.single_exports
            .write()
            .await
            .push(destination.to_path_buf());
        Ok(())
    }

    async fn export_batch(
        &self,
        items: Vec<ExportItem>,
        destination: &Path,
    ) -> Result<(), ServiceError> {
        self.check_export().await?;
        self.batch_exports.write().await.push(RecordedBatchExport {
            items: items.iter().map(ExportItemInfo::from).collect(),
            destination: destination.to_path_buf(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn test_compress_reports_steps() {
        let service = MockProcessingService::new();
        let job = AssetId::new();
        let stream = service.subscribe_progress(&job).await.unwrap();

        let result = service
            .compress(&Locator::from("/a.jpg"), 500, &job)
            .await
            .unwrap();
        assert_eq!(result.compressed_size_bytes, DEFAULT_SIZE_BYTES / 2);
        assert_eq!(result.data.len() as u64, result.compressed_size_bytes);

        // Topic closed once compress returned
        let ticks: Vec<u8> = stream.collect().await;
        assert_eq!(ticks, vec![0, 25, 50, 75, 100]);
        assert_eq!(service.in_flight(), 0);
        assert_eq!(service.max_concurrent(), 1);
    }

    #[tokio::test]
    async fn test_configured_failures() {
        let service = MockProcessingService::new();
        service.fail_compress("/a.jpg", "nope").await;
        service.fail_compress_fatal("/b.jpg").await;
        service.fail_hydrate("/c.jpg").await;

        let err = service
            .compress(&Locator::from("/a.jpg"), 500, &AssetId::new())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "nope");

        let err = service
            .compress(&Locator::from("/b.jpg"), 500, &AssetId::new())
            .await
            .unwrap_err();
        assert!(err.is_fatal());

        assert!(service.hydrate(&Locator::from("/c.jpg")).await.is_err());
        assert!(service.hydrate(&Locator::from("/d.jpg")).await.is_ok());
    }

    #[tokio::test]
    async fn test_gate_holds_completion() {
        let service = MockProcessingService::new();
        service.hold_completions().await;

        let job = AssetId::new();
        let worker = service.clone();
        let handle = tokio::spawn(async move {
            worker.compress(&Locator::from("/a.jpg"), 500, &job).await
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!handle.is_finished());
        assert_eq!(service.in_flight(), 1);

        service.release(1).await;
        assert!(handle.await.unwrap().is_ok());
    }
}
