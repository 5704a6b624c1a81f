use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;

use super::{types::Config, ConfigError};

/// Load configuration, layering (lowest to highest priority):
/// an optional TOML file, the service's flat environment variables, and
/// `ITEMUPDATE_`-prefixed overrides (`__` separates nested keys).
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let mut figment = Figment::new();

    if let Some(path) = path {
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }
        figment = figment.merge(Toml::file(path));
    }

    let config: Config = figment
        .merge(Env::raw().filter_map(|key| env_key_path(key.as_str()).map(Into::into)))
        .merge(Env::prefixed("ITEMUPDATE_").split("__"))
        .extract()
        .map_err(|e| ConfigError::ParseError(e.to_string()))?;

    Ok(config)
}

/// Load configuration from TOML string (useful for testing)
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::ParseError(e.to_string()))
}

/// Maps the flat environment variable names used by the deployment to
/// their nested config path. Matching is case-insensitive.
pub fn env_key_path(key: &str) -> Option<&'static str> {
    let path = match key.to_ascii_uppercase().as_str() {
        "AZUREWEBJOBSSTORAGE" => "storage.connection_string",
        "UPDATED_ITEMS_CONTAINER" => "storage.updated_items_container",
        "REPORT_CONTAINER" => "storage.report_container",
        "INSTITUTION_API_ENDPOINT" => "institution_api.endpoint",
        "INSTITUTION_API_KEY" => "institution_api.api_key",
        "UPDATE_QUEUE" => "queues.update_queue",
        "NOTIFICATION_QUEUE" => "queues.notification_queue",
        "API_CLIENT_TIMEOUT" => "api_client_timeout_secs",
        _ => return None,
    };
    Some(path)
}
