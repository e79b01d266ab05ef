//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Ingestion (assets ingested, dedup skips, hydration results)
//! - Scheduling (jobs, durations, in-flight jobs, batches)
//! - Progress relay and exports

use once_cell::sync::Lazy;
use prometheus::{HistogramOpts, HistogramVec, IntCounter, IntCounterVec, IntGauge, Opts};

// =============================================================================
// Ingestion
// =============================================================================

/// Assets accepted for tracking, by source.
pub static ASSETS_INGESTED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("leap_assets_ingested_total", "Total assets accepted for tracking"),
        &["source"], // "picker", "paste"
    )
    .unwrap()
});

/// Locators skipped because they were already tracked.
pub static ASSETS_SKIPPED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "leap_assets_skipped_total",
        "Total locators skipped as duplicates",
    )
    .unwrap()
});

/// Hydrations by result.
pub static HYDRATIONS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("leap_hydrations_total", "Total metadata hydrations"),
        &["result"], // "success", "failed", "discarded"
    )
    .unwrap()
});

// =============================================================================
// Scheduling
// =============================================================================

/// Compression jobs by result.
pub static COMPRESSION_JOBS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("leap_compression_jobs_total", "Total compression jobs"),
        &["result"], // "success", "failed", "discarded"
    )
    .unwrap()
});

/// Compression job duration in seconds.
pub static COMPRESSION_DURATION: Lazy<HistogramVec> = Lazy::new(|| {
    HistogramVec::new(
        HistogramOpts::new(
            "leap_compression_duration_seconds",
            "Duration of compression jobs",
        )
        .buckets(vec![0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
        &["result"],
    )
    .unwrap()
});

/// Jobs currently in flight.
pub static JOBS_IN_FLIGHT: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new("leap_jobs_in_flight", "Compression jobs currently in flight").unwrap()
});

/// Batches by result.
pub static BATCHES_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("leap_batches_total", "Total batch runs"),
        &["result"], // "completed", "aborted", "rejected"
    )
    .unwrap()
});

// =============================================================================
// Progress relay
// =============================================================================

/// Live progress subscriptions.
pub static PROGRESS_SUBSCRIPTIONS: Lazy<IntGauge> = Lazy::new(|| {
    IntGauge::new(
        "leap_progress_subscriptions",
        "Progress subscriptions currently attached",
    )
    .unwrap()
});

/// Progress ticks written to the store.
pub static PROGRESS_UPDATES: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "leap_progress_updates_total",
        "Total progress ticks applied to records",
    )
    .unwrap()
});

// =============================================================================
// Export
// =============================================================================

/// Exports by kind and result.
pub static EXPORTS_TOTAL: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("leap_exports_total", "Total export requests"),
        &["kind", "result"], // kind: "single", "batch"
    )
    .unwrap()
});

// =============================================================================
// Helper functions
// =============================================================================

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        // Ingestion
        Box::new(ASSETS_INGESTED.clone()),
        Box::new(ASSETS_SKIPPED.clone()),
        Box::new(HYDRATIONS_TOTAL.clone()),
        // Scheduling
        Box::new(COMPRESSION_JOBS.clone()),
        Box::new(COMPRESSION_DURATION.clone()),
        Box::new(JOBS_IN_FLIGHT.clone()),
        Box::new(BATCHES_TOTAL.clone()),
        // Progress relay
        Box::new(PROGRESS_SUBSCRIPTIONS.clone()),
        Box::new(PROGRESS_UPDATES.clone()),
        // Export
        Box::new(EXPORTS_TOTAL.clone()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn test_all_metrics_register() {
        let registry = Registry::new();
        for metric in all_metrics() {
            registry.register(metric).unwrap();
        }
        COMPRESSION_JOBS.with_label_values(&["success"]).inc();
        let families = registry.gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "leap_compression_jobs_total"));
    }
}
