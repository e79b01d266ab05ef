//! Testing utilities and mock implementations.
//!
//! This module provides a mock implementation of the `ProcessingService`
//! trait, allowing the whole pipeline to be exercised without ImageMagick or
//! a file system.
//!
//! # Example
//!
//! ```rust,ignore
//! use leap_core::pipeline::{PipelineConfig, PipelineProcessor};
//! use leap_core::testing::{fixtures, MockProcessingService};
//!
//! let service = MockProcessingService::new();
//! let processor = PipelineProcessor::new(PipelineConfig::default(), service.clone());
//!
//! processor.ingest(fixtures::locators(3)).await.hydration.wait().await;
//! processor.run_batch(2).await?;
//! assert_eq!(service.max_concurrent(), 2);
//! ```

mod mock_service;

pub use mock_service::{MockProcessingService, RecordedBatchExport};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::asset::Locator;
    use crate::pipeline::PastedAsset;

    /// `count` distinct JPEG locators: `/pics/image-1.jpg`, `/pics/image-2.jpg`, ...
    pub fn locators(count: usize) -> Vec<Locator> {
        (1..=count)
            .map(|i| Locator::new(format!("/pics/image-{}.jpg", i)))
            .collect()
    }

    /// A pasted image with a few bytes of PNG signature.
    pub fn pasted_png(filename: Option<&str>) -> PastedAsset {
        PastedAsset::new(
            vec![0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a],
            filename.map(String::from),
        )
    }
}
