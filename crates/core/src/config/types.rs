use serde::{Deserialize, Deserializer, Serialize};
use std::net::IpAddr;

use crate::catalog::Region;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub institution_api: InstitutionApiConfig,
    #[serde(default)]
    pub queues: QueueConfig,
    #[serde(default)]
    pub catalog: CatalogConfig,
    #[serde(default)]
    pub update: UpdateConfig,
    #[serde(default)]
    pub server: ServerConfig,
    /// Timeout in seconds for the institution API and catalog requests.
    #[serde(default = "default_api_client_timeout")]
    pub api_client_timeout_secs: u64,
}

fn default_api_client_timeout() -> u64 {
    90
}

/// Storage account configuration (blobs and queues share one account).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Storage connection string (`AccountName=...;AccountKey=...` form).
    #[serde(deserialize_with = "lossy_string")]
    pub connection_string: String,
    /// Container holding staged item snapshots, keyed `<job_id>.json`.
    #[serde(
        default = "default_updated_items_container",
        deserialize_with = "lossy_string"
    )]
    pub updated_items_container: String,
    /// Container receiving update reports, keyed `<job_id>.json`.
    #[serde(default = "default_report_container", deserialize_with = "lossy_string")]
    pub report_container: String,
}

fn default_updated_items_container() -> String {
    "updated-items-container".to_string()
}

fn default_report_container() -> String {
    "reports-container".to_string()
}

/// Institution API (credential resolver) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InstitutionApiConfig {
    /// Base URL; requests go to `{endpoint}/{institution_id}/api-key`.
    #[serde(deserialize_with = "lossy_string")]
    pub endpoint: String,
    /// Static application key sent as the `code` query parameter.
    #[serde(deserialize_with = "lossy_string")]
    pub api_key: String,
}

/// Queue names and polling behaviour.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct QueueConfig {
    /// Queue the worker consumes update jobs from.
    #[serde(default = "default_update_queue", deserialize_with = "lossy_string")]
    pub update_queue: String,
    /// Queue completed jobs are forwarded to.
    #[serde(
        default = "default_notification_queue",
        deserialize_with = "lossy_string"
    )]
    pub notification_queue: String,
    /// Delay between polls when the queue was empty (milliseconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    /// Messages fetched (and processed concurrently) per poll. Max 32.
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,
    /// How long a received message stays invisible to other consumers.
    #[serde(default = "default_visibility_timeout")]
    pub visibility_timeout_secs: u32,
    /// Deliveries allowed before a message is moved to the poison queue.
    #[serde(default = "default_max_dequeue_count")]
    pub max_dequeue_count: u32,
    /// Encoding of message bodies on the wire.
    #[serde(default)]
    pub message_encoding: MessageEncoding,
}

fn default_update_queue() -> String {
    "update-queue".to_string()
}

fn default_notification_queue() -> String {
    "notification-queue".to_string()
}

fn default_poll_interval() -> u64 {
    2000
}

fn default_batch_size() -> u32 {
    16
}

fn default_visibility_timeout() -> u32 {
    300
}

fn default_max_dequeue_count() -> u32 {
    5
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            update_queue: default_update_queue(),
            notification_queue: default_notification_queue(),
            poll_interval_ms: default_poll_interval(),
            batch_size: default_batch_size(),
            visibility_timeout_secs: default_visibility_timeout(),
            max_dequeue_count: default_max_dequeue_count(),
            message_encoding: MessageEncoding::default(),
        }
    }
}

impl QueueConfig {
    /// Name of the queue that receives messages past `max_dequeue_count`.
    pub fn poison_queue(&self) -> String {
        format!("{}-poison", self.update_queue)
    }
}

/// Queue message body encoding.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MessageEncoding {
    /// Base64 text, as written by the Functions queue binding.
    #[default]
    Base64,
    /// Raw UTF-8 JSON.
    None,
}

/// Catalog (Alma) client configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CatalogConfig {
    #[serde(default)]
    pub region: Region,
    /// Overrides the regional API host (proxies, tests).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

/// Pipeline policy switches.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct UpdateConfig {
    #[serde(default)]
    pub missing_credential: MissingCredentialPolicy,
    /// Skip the catalog call when a report for the job already exists.
    #[serde(default)]
    pub skip_completed_jobs: bool,
}

/// What to do when no institution credential could be resolved.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MissingCredentialPolicy {
    /// Continue with the literal credential `"None"`; the catalog rejects it.
    #[default]
    Placeholder,
    /// Stop before constructing the catalog client.
    Abort,
}

/// Health/metrics HTTP server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8080
}

/// Accepts any scalar as a string. Environment values such as a numeric API
/// key arrive typed as integers.
fn lossy_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Scalar {
        Str(String),
        Int(i64),
        UInt(u64),
        Float(f64),
        Bool(bool),
    }

    Ok(match Scalar::deserialize(deserializer)? {
        Scalar::Str(s) => s,
        Scalar::Int(i) => i.to_string(),
        Scalar::UInt(u) => u.to_string(),
        Scalar::Float(f) => f.to_string(),
        Scalar::Bool(b) => b.to_string(),
    })
}

/// Sanitized config for logs and the health endpoint (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub storage: SanitizedStorageConfig,
    pub institution_api: SanitizedInstitutionApiConfig,
    pub queues: QueueConfig,
    pub catalog: CatalogConfig,
    pub update: UpdateConfig,
    pub server: ServerConfig,
    pub api_client_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedStorageConfig {
    pub connection_configured: bool,
    pub updated_items_container: String,
    pub report_container: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedInstitutionApiConfig {
    pub endpoint: String,
    pub api_key_configured: bool,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            storage: SanitizedStorageConfig {
                connection_configured: !config.storage.connection_string.is_empty(),
                updated_items_container: config.storage.updated_items_container.clone(),
                report_container: config.storage.report_container.clone(),
            },
            institution_api: SanitizedInstitutionApiConfig {
                endpoint: config.institution_api.endpoint.clone(),
                api_key_configured: !config.institution_api.api_key.is_empty(),
            },
            queues: config.queues.clone(),
            catalog: config.catalog.clone(),
            update: config.update.clone(),
            server: config.server.clone(),
            api_client_timeout_secs: config.api_client_timeout_secs,
        }
    }
}
