//! Processing service boundary.
//!
//! This module provides the `ProcessingService` trait the pipeline talks to,
//! plus a local implementation that works on files and shells out to
//! ImageMagick for the actual encoding.
//!
//! # Features
//!
//! - Metadata hydration (size and a `data:` URL preview)
//! - Target-size compression with per-job progress topics
//! - Persisting pasted images
//! - Single-file and ZIP exports
//!
//! # Example
//!
//! ```ignore
//! use leap_core::service::{LocalProcessingService, ProcessingService};
//!
//! let service = LocalProcessingService::with_defaults();
//! service.validate().await?;
//!
//! let job = AssetId::new();
//! let mut progress = service.subscribe_progress(&job).await?;
//! let result = service.compress(&Locator::from("/pics/cat.jpg"), 500, &job).await?;
//! println!("{} -> {} bytes", result.original_size_bytes, result.compressed_size_bytes);
//! ```

mod config;
mod error;
mod local;
mod progress;
mod traits;
mod types;

pub use config::LocalServiceConfig;
pub use error::ServiceError;
pub use local::LocalProcessingService;
pub use progress::{ProgressHub, ProgressTopic};
pub use traits::ProcessingService;
pub use types::{CompressedAsset, ExportItem, ExportItemInfo, HydratedAsset, ProgressStream};
