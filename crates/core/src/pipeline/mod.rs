//! Batch asset pipeline.
//!
//! This module provides the `PipelineProcessor` which coordinates:
//! - Ingestion: dedup, placeholder records and background hydration
//! - Scheduling: bounded-concurrency compression batches
//! - Progress relay: per-job progress forwarded into the store
//! - Export: single and combined exports of compressed results
//!
//! # Example
//!
//! ```ignore
//! use leap_core::pipeline::{PipelineConfig, PipelineProcessor};
//! use leap_core::service::LocalProcessingService;
//!
//! let processor = PipelineProcessor::new(
//!     PipelineConfig::default(),
//!     LocalProcessingService::with_defaults(),
//! );
//!
//! let report = processor.ingest(paths.into_iter().map(Locator::from)).await;
//! report.hydration.wait().await;
//!
//! let summary = processor.compress_all().await?;
//! println!("{} compressed, {} failed", summary.succeeded, summary.failed);
//!
//! processor.export_all(Path::new("compressed.zip")).await?;
//! ```

mod config;
mod export;
mod ingest;
mod processor;
mod relay;
mod scheduler;
mod types;

pub use config::{default_concurrency, PipelineConfig};
pub use export::{suggested_file_name, ExportAggregator, ExportError};
pub use ingest::{Ingestor, HYDRATION_FAILED_MESSAGE};
pub use processor::PipelineProcessor;
pub use relay::{ProgressRelay, ProgressSubscription};
pub use scheduler::{JobScheduler, SchedulerError};
pub use types::{
    BatchSummary, ExportSummary, HydrationHandle, IngestReport, PastedAsset, PipelineStatus,
};
