//! Configuration for the asset pipeline.

use serde::{Deserialize, Serialize};

/// Configuration for the compression pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Target size per compressed image, in KB.
    #[serde(default = "default_max_size_kb")]
    pub max_size_kb: u32,

    /// Maximum parallel compression jobs. Derived from the CPU count when unset.
    #[serde(default)]
    pub concurrency: Option<usize>,

    /// Capacity of the store change feed.
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,
}

fn default_max_size_kb() -> u32 {
    500
}

fn default_event_buffer() -> usize {
    256
}

/// Half the available cores, kept within 2..=4.
pub fn default_concurrency() -> usize {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    (cpus / 2).clamp(2, 4)
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_size_kb: default_max_size_kb(),
            concurrency: None,
            event_buffer: default_event_buffer(),
        }
    }
}

impl PipelineConfig {
    /// Concurrency limit to use for a batch.
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.unwrap_or_else(default_concurrency)
    }

    /// Sets the target size in KB.
    pub fn with_max_size_kb(mut self, kb: u32) -> Self {
        self.max_size_kb = kb;
        self
    }

    /// Sets the concurrency limit.
    pub fn with_concurrency(mut self, limit: usize) -> Self {
        self.concurrency = Some(limit);
        self
    }

    /// Sets the change feed capacity.
    pub fn with_event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }
}
