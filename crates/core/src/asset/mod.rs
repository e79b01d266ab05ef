//! Asset record store.
//!
//! Holds every asset tracked by the compressor and its per-asset state. The
//! store is the single source of truth for the pipeline: ingestion creates
//! records here, the scheduler and progress relay move them through their
//! lifecycle, and the export aggregator reads the finished ones.
//!
//! ```text
//! Hydrating ──▶ Ready ──▶ Processing ──▶ Succeeded
//!     │                        │
//!     └──────▶ Failed ◀────────┘
//! ```

mod error;
mod store;
mod types;

pub use error::StoreError;
pub use store::{AssetStore, PlaceholderBatch, StatusCounts, StoreEvent};
pub use types::{
    mime_for_extension, AssetData, AssetId, AssetRecord, AssetStatus, Locator, PreviewHandle,
};
