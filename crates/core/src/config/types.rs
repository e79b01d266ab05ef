use serde::{Deserialize, Serialize};

use crate::pipeline::PipelineConfig;
use crate::service::LocalServiceConfig;

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub service: LocalServiceConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_serializes_to_toml() {
        let config = Config::default();
        let toml = toml::to_string(&config).unwrap();
        assert!(toml.contains("[pipeline]"));
        assert!(toml.contains("max_size_kb = 500"));
        assert!(toml.contains("[service]"));
        assert!(toml.contains("magick_path = \"magick\""));
    }

    #[test]
    fn test_empty_sections_use_defaults() {
        let config: Config = toml::from_str("[pipeline]\n[service]\n").unwrap();
        assert_eq!(config.pipeline.max_size_kb, 500);
        assert_eq!(config.pipeline.concurrency, None);
        assert_eq!(config.service.timeout_secs, 300);
    }
}
