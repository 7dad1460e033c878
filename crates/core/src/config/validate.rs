use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Server port is not 0
/// - Transfer chunk size is not 0
/// - Coordinator concurrency and event buffer are not 0
/// - Storage retention is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.transfer.chunk_size_bytes == 0 {
        return Err(ConfigError::ValidationError(
            "transfer.chunk_size_bytes cannot be 0".to_string(),
        ));
    }

    if config.coordinator.max_concurrent_jobs == 0 {
        return Err(ConfigError::ValidationError(
            "coordinator.max_concurrent_jobs cannot be 0".to_string(),
        ));
    }

    if config.coordinator.event_buffer == 0 {
        return Err(ConfigError::ValidationError(
            "coordinator.event_buffer cannot be 0".to_string(),
        ));
    }

    if config.storage.retention_secs == 0 {
        return Err(ConfigError::ValidationError(
            "storage.retention_secs cannot be 0".to_string(),
        ));
    }

    Ok(())
}
