use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Target size, concurrency and event buffer are not 0
/// - Encoder timeout is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let pipeline = &config.pipeline;
    if pipeline.max_size_kb == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.max_size_kb cannot be 0".to_string(),
        ));
    }
    if pipeline.concurrency == Some(0) {
        return Err(ConfigError::ValidationError(
            "pipeline.concurrency cannot be 0".to_string(),
        ));
    }
    if pipeline.event_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "pipeline.event_buffer cannot be 0".to_string(),
        ));
    }

    if config.service.timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "service.timeout_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::PipelineConfig;

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&Config::default()).is_ok());
    }

    #[test]
    fn test_validate_zero_values_fail() {
        let cases = [
            PipelineConfig::default().with_max_size_kb(0),
            PipelineConfig::default().with_concurrency(0),
            PipelineConfig::default().with_event_buffer(0),
        ];
        for pipeline in cases {
            let config = Config {
                pipeline,
                ..Default::default()
            };
            let err = validate_config(&config).unwrap_err();
            assert!(matches!(err, ConfigError::ValidationError(_)));
        }
    }

    #[test]
    fn test_validate_timeout_zero_fails() {
        let mut config = Config::default();
        config.service.timeout_secs = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("service.timeout_secs"));
    }
}
