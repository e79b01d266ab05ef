//! Prometheus metrics for a compression run.
//!
//! Registers the core pipeline metrics plus a few gauges describing the final
//! state of the run, collected from the processor before encoding.

use anyhow::{Context, Result};
use once_cell::sync::Lazy;
use prometheus::{Encoder, IntGauge, IntGaugeVec, Opts, Registry, TextEncoder};

use leap_core::{PipelineProcessor, ProcessingService};

/// Global metrics registry.
pub static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    let registry = Registry::new();
    register_metrics(&registry);
    registry
});

/// Records by current status (collected dynamically).
pub static RECORDS_BY_STATUS: Lazy<IntGaugeVec> = Lazy::new(|| {
    IntGaugeVec::new(
        Opts::new("leap_records_by_status", "Current record count by status"),
        &["status"],
    )
    .unwrap()
});

/// Target size used for the run, in KB.
pub static TARGET_SIZE_KB: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("leap_target_size_kb", "Target size per image in KB").unwrap()
});

/// Concurrency limit used for the run.
pub static CONCURRENCY_LIMIT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("leap_concurrency_limit", "Maximum parallel compression jobs").unwrap()
});

fn register_metrics(registry: &Registry) {
    registry
        .register(Box::new(RECORDS_BY_STATUS.clone()))
        .unwrap();
    registry.register(Box::new(TARGET_SIZE_KB.clone())).unwrap();
    registry
        .register(Box::new(CONCURRENCY_LIMIT.clone()))
        .unwrap();

    // Core metrics (ingestion, scheduling, progress, export)
    for metric in leap_core::metrics::all_metrics() {
        registry.register(metric).unwrap();
    }
}

/// Encode all metrics as Prometheus text format.
pub fn encode_metrics() -> Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .context("Failed to encode metrics")?;
    String::from_utf8(buffer).context("Metrics output is not UTF-8")
}

/// Collect dynamic metrics from the processor's current state.
pub async fn collect_dynamic_metrics<S: ProcessingService + 'static>(
    processor: &PipelineProcessor<S>,
) {
    let status = processor.status().await;
    TARGET_SIZE_KB.set(status.max_size_kb as i64);
    CONCURRENCY_LIMIT.set(status.concurrency_limit as i64);

    let counts = status.counts;
    for (label, count) in [
        ("hydrating", counts.hydrating),
        ("ready", counts.ready),
        ("processing", counts.processing),
        ("succeeded", counts.succeeded),
        ("failed", counts.failed),
    ] {
        RECORDS_BY_STATUS
            .with_label_values(&[label])
            .set(count as i64);
    }
}
