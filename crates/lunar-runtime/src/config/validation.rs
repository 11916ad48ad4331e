//! Configuration validation utilities.

use super::error::{ConfigError, ConfigResult};
use super::schema::{ConnectionConfig, LoggingConfig, LogOutput, LunarConfig, PluginsConfig, RetryConfig};

/// Validates the entire configuration.
pub fn validate_config(config: &LunarConfig) -> ConfigResult<()> {
    validate_connection(&config.connection)?;
    validate_plugins(&config.plugins)?;
    validate_logging(&config.logging)?;
    Ok(())
}

fn validate_connection(connection: &ConnectionConfig) -> ConfigResult<()> {
    validate_url(&connection.url)?;

    if connection.request_timeout_secs == 0 {
        return Err(ConfigError::validation(
            "Request timeout must be greater than 0",
        ));
    }

    validate_retry_config(&connection.retry)
}

fn validate_retry_config(retry: &RetryConfig) -> ConfigResult<()> {
    if retry.initial_delay_ms == 0 {
        return Err(ConfigError::validation(
            "Initial retry delay must be greater than 0",
        ));
    }

    if retry.max_delay_ms < retry.initial_delay_ms {
        return Err(ConfigError::validation(
            "Max retry delay must be greater than or equal to initial delay",
        ));
    }

    if retry.backoff_multiplier.is_nan() || retry.backoff_multiplier < 1.0 {
        return Err(ConfigError::validation(
            "Backoff multiplier must be at least 1.0",
        ));
    }

    Ok(())
}

fn validate_url(url: &str) -> ConfigResult<()> {
    if url.trim().is_empty() {
        return Err(ConfigError::missing_field("connection.url"));
    }

    let valid_schemes = ["ws://", "wss://"];
    if !valid_schemes.iter().any(|s| url.starts_with(s)) {
        return Err(ConfigError::invalid_url(
            url,
            format!("URL must start with one of: {valid_schemes:?}"),
        ));
    }

    Ok(())
}

fn validate_plugins(plugins: &PluginsConfig) -> ConfigResult<()> {
    if plugins.trigger_prefix.is_empty() {
        return Err(ConfigError::validation("Trigger prefix must not be empty"));
    }

    if plugins.watch_interval_ms == 0 {
        return Err(ConfigError::validation(
            "Watch interval must be greater than 0",
        ));
    }

    if plugins.dir.as_os_str().is_empty() {
        return Err(ConfigError::missing_field("plugins.dir"));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> ConfigResult<()> {
    if logging.output == LogOutput::File && logging.file_path.is_none() {
        return Err(ConfigError::missing_field("logging.file_path"));
    }
    Ok(())
}
