//! Types for tracked assets.

use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use super::error::StoreError;

/// Unique identifier of a tracked asset.
///
/// Also used as the job id when the asset is dispatched for compression.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AssetId(Uuid);

impl AssetId {
    /// Generates a fresh random id.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for AssetId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for AssetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque reference to where an asset came from (usually a file path).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Locator(String);

impl Locator {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Last path component, accepting both `/` and `\` separators.
    pub fn display_name(&self) -> String {
        self.0
            .rsplit(['/', '\\'])
            .next()
            .filter(|name| !name.is_empty())
            .unwrap_or("unknown")
            .to_string()
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        let name = self.display_name();
        let (stem, ext) = name.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Locator {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

impl From<String> for Locator {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&Path> for Locator {
    fn from(value: &Path) -> Self {
        Self(value.to_string_lossy().to_string())
    }
}

/// Binary payload produced by the processing service.
///
/// Cloning is cheap; the bytes are shared.
#[derive(Clone, PartialEq, Eq)]
pub struct AssetData(Arc<[u8]>);

impl AssetData {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Arc::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for AssetData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl fmt::Debug for AssetData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AssetData({} bytes)", self.0.len())
    }
}

/// Renderable preview of an asset, as a `data:` URL.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PreviewHandle(String);

impl PreviewHandle {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    /// Encodes raw bytes as a base64 data URL.
    pub fn from_bytes(mime: &str, bytes: &[u8]) -> Self {
        Self(format!(
            "data:{};base64,{}",
            mime,
            general_purpose::STANDARD.encode(bytes)
        ))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Guesses the image MIME type from a lowercased extension.
pub fn mime_for_extension(ext: Option<&str>) -> &'static str {
    match ext {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("gif") => "image/gif",
        _ => "application/octet-stream",
    }
}

/// Lifecycle status of an asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssetStatus {
    /// Placeholder created, metadata not loaded yet.
    Hydrating,
    /// Metadata loaded, waiting for a batch.
    Ready,
    /// A compression job is in flight.
    Processing,
    Succeeded,
    Failed,
}

impl AssetStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hydrating => "hydrating",
            Self::Ready => "ready",
            Self::Processing => "processing",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed)
    }

    /// Whether `next` is a legal successor of this status.
    pub fn can_transition_to(&self, next: AssetStatus) -> bool {
        matches!(
            (self, next),
            (Self::Hydrating, Self::Ready)
                | (Self::Hydrating, Self::Failed)
                | (Self::Ready, Self::Processing)
                | (Self::Processing, Self::Succeeded)
                | (Self::Processing, Self::Failed)
        )
    }
}

impl fmt::Display for AssetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One tracked asset.
///
/// Records are immutable once published; every change produces a new record
/// through one of the transition methods below.
#[derive(Debug, Clone, Serialize)]
pub struct AssetRecord {
    pub id: AssetId,
    pub source_locator: Locator,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_size_bytes: Option<u64>,
    #[serde(skip)]
    pub preview: Option<PreviewHandle>,
    #[serde(skip)]
    pub result: Option<AssetData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_size_bytes: Option<u64>,
    pub status: AssetStatus,
    pub progress_percent: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl AssetRecord {
    /// Creates a `Hydrating` placeholder for a locator.
    pub fn placeholder(locator: Locator) -> Self {
        Self {
            id: AssetId::new(),
            display_name: locator.display_name(),
            source_locator: locator,
            original_size_bytes: None,
            preview: None,
            result: None,
            result_size_bytes: None,
            status: AssetStatus::Hydrating,
            progress_percent: 0,
            error_message: None,
            created_at: Utc::now(),
        }
    }

    fn transition(
        &self,
        next: AssetStatus,
        operation: &'static str,
    ) -> Result<Self, StoreError> {
        if !self.status.can_transition_to(next) {
            return Err(StoreError::InvalidTransition {
                id: self.id,
                current: self.status,
                operation,
            });
        }
        let mut record = self.clone();
        record.status = next;
        Ok(record)
    }

    pub fn hydrated(&self, size_bytes: u64, preview: PreviewHandle) -> Result<Self, StoreError> {
        let mut record = self.transition(AssetStatus::Ready, "hydrate")?;
        record.original_size_bytes = Some(size_bytes);
        record.preview = Some(preview);
        Ok(record)
    }

    pub fn hydration_failed(&self, message: impl Into<String>) -> Result<Self, StoreError> {
        let mut record = self.transition(AssetStatus::Failed, "fail hydration of")?;
        record.error_message = Some(message.into());
        Ok(record)
    }

    pub fn processing(&self) -> Result<Self, StoreError> {
        let mut record = self.transition(AssetStatus::Processing, "start processing")?;
        record.progress_percent = 0;
        Ok(record)
    }

    /// Applies a progress tick. Ticks never lower the current value.
    pub fn with_progress(&self, percent: u8) -> Result<Self, StoreError> {
        if self.status != AssetStatus::Processing {
            return Err(StoreError::InvalidTransition {
                id: self.id,
                current: self.status,
                operation: "report progress for",
            });
        }
        let mut record = self.clone();
        record.progress_percent = self.progress_percent.max(percent.min(100));
        Ok(record)
    }

    pub fn succeeded(
        &self,
        original_size_bytes: u64,
        result_size_bytes: u64,
        result: AssetData,
    ) -> Result<Self, StoreError> {
        let mut record = self.transition(AssetStatus::Succeeded, "complete")?;
        record.original_size_bytes = Some(original_size_bytes);
        record.result_size_bytes = Some(result_size_bytes);
        record.result = Some(result);
        record.progress_percent = 100;
        Ok(record)
    }

    pub fn processing_failed(&self, message: impl Into<String>) -> Result<Self, StoreError> {
        let mut record = self.transition(AssetStatus::Failed, "fail")?;
        record.error_message = Some(message.into());
        record.progress_percent = 0;
        Ok(record)
    }

    /// Size reduction in percent, once both sizes are known.
    pub fn reduction_percent(&self) -> Option<f64> {
        let original = self.original_size_bytes?;
        let compressed = self.result_size_bytes?;
        if original == 0 {
            return None;
        }
        Some((1.0 - compressed as f64 / original as f64) * 100.0)
    }
}
