use super::{types::Config, ConfigError};

/// Validate configuration
/// Currently validates:
/// - Required connection values are non-empty
/// - Container and queue names are non-empty
/// - Timeouts and batch size are non-zero (batch size at most 32)
/// - Server port is not 0 when the server is enabled
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    let required = [
        ("storage.connection_string", &config.storage.connection_string),
        (
            "storage.updated_items_container",
            &config.storage.updated_items_container,
        ),
        ("storage.report_container", &config.storage.report_container),
        ("institution_api.endpoint", &config.institution_api.endpoint),
        ("institution_api.api_key", &config.institution_api.api_key),
        ("queues.update_queue", &config.queues.update_queue),
        ("queues.notification_queue", &config.queues.notification_queue),
    ];
    for (name, value) in required {
        if value.trim().is_empty() {
            return Err(ConfigError::ValidationError(format!(
                "{} cannot be empty",
                name
            )));
        }
    }

    if config.api_client_timeout_secs == 0 {
        return Err(ConfigError::ValidationError(
            "api_client_timeout_secs cannot be 0".to_string(),
        ));
    }

    if config.queues.batch_size == 0 || config.queues.batch_size > 32 {
        return Err(ConfigError::ValidationError(
            "queues.batch_size must be between 1 and 32".to_string(),
        ));
    }

    if config.queues.max_dequeue_count == 0 {
        return Err(ConfigError::ValidationError(
            "queues.max_dequeue_count cannot be 0".to_string(),
        ));
    }

    if config.server.enabled && config.server.port == 0 {
        return Err(ConfigError::ValidationError(
            "server.port cannot be 0".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config_from_str;

    fn valid_config() -> Config {
        load_config_from_str(
            r#"
[storage]
connection_string = "UseDevelopmentStorage=true"

[institution_api]
endpoint = "https://institutions.example.org/api"
api_key = "static-key"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&valid_config()).is_ok());
    }

    #[test]
    fn test_validate_empty_api_key_fails() {
        let mut config = valid_config();
        config.institution_api.api_key = "  ".to_string();
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(ref m) if m.contains("api_key")));
    }

    #[test]
    fn test_validate_zero_timeout_fails() {
        let mut config = valid_config();
        config.api_client_timeout_secs = 0;
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::ValidationError(_))
        ));
    }

    #[test]
    fn test_validate_batch_size_bounds() {
        let mut config = valid_config();
        config.queues.batch_size = 33;
        assert!(validate_config(&config).is_err());
        config.queues.batch_size = 0;
        assert!(validate_config(&config).is_err());
        config.queues.batch_size = 32;
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_port_zero_only_matters_when_enabled() {
        let mut config = valid_config();
        config.server.port = 0;
        assert!(validate_config(&config).is_err());
        config.server.enabled = false;
        assert!(validate_config(&config).is_ok());
    }
}
