pub mod asset;
pub mod config;
pub mod metrics;
pub mod pipeline;
pub mod service;
pub mod testing;

pub use asset::{
    AssetData, AssetId, AssetRecord, AssetStatus, AssetStore, Locator, PreviewHandle,
    StatusCounts, StoreError, StoreEvent,
};
pub use config::{
    load_config, load_config_from_env, load_config_from_str, validate_config, Config,
    ConfigError,
};
pub use pipeline::{
    BatchSummary, ExportError, ExportSummary, IngestReport, PastedAsset, PipelineConfig,
    PipelineProcessor, PipelineStatus, SchedulerError,
};
pub use service::{LocalProcessingService, LocalServiceConfig, ProcessingService, ServiceError};
