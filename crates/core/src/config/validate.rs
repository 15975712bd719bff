use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Store URL is not empty
/// - Search fan-out and highlight window are at least 1
/// - Server port is not 0
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.store.url.trim().is_empty() {
        return Err(ConfigError::ValidationError(
            "store.url cannot be empty".to_string(),
        ));
    }

    if config.search.max_concurrent_fetches == 0 {
        return Err(ConfigError::ValidationError(
            "search.max_concurrent_fetches must be at least 1".to_string(),
        ));
    }

    if config.search.highlight_secs == 0 {
        return Err(ConfigError::ValidationError(
            "search.highlight_secs must be at least 1".to_string(),
        ));
    }

    if config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    Ok(())
}
