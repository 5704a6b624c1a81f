//! Alma REST API client.

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

use super::{CatalogApi, CatalogConnector, CatalogError, CatalogSettings};
use crate::job::ItemRecord;

/// Alma client bound to one institution's API key.
pub struct AlmaClient {
    client: Client,
    base_url: Url,
    api_key: String,
}

impl AlmaClient {
    /// Create a client for the settings' region, or for `base_url` when given.
    pub fn new(settings: CatalogSettings, base_url: Option<&str>) -> Result<Self, CatalogError> {
        let raw = base_url.unwrap_or_else(|| settings.region.base_url());
        let base_url = Url::parse(raw)
            .map_err(|e| CatalogError::Validation(format!("invalid base URL {}: {}", raw, e)))?;
        if base_url.cannot_be_a_base() {
            return Err(CatalogError::Validation(format!("invalid base URL {}", raw)));
        }

        let client = Client::builder().timeout(settings.timeout).build()?;

        Ok(Self {
            client,
            base_url,
            api_key: settings.credential,
        })
    }

    fn item_url(&self, mms_id: &str, holding_id: &str, item_pid: &str) -> Result<Url, CatalogError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| CatalogError::Validation("base URL cannot hold a path".into()))?
            .pop_if_empty()
            .extend(["almaws", "v1", "bibs", mms_id, "holdings", holding_id, "items", item_pid]);
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct AlmaErrorBody {
    #[serde(rename = "errorList")]
    error_list: AlmaErrorList,
}

#[derive(Debug, Deserialize)]
struct AlmaErrorList {
    #[serde(default)]
    error: Vec<AlmaError>,
}

#[derive(Debug, Deserialize)]
struct AlmaError {
    #[serde(rename = "errorCode", default)]
    code: Option<String>,
    #[serde(rename = "errorMessage", default)]
    message: Option<String>,
}

/// Pull readable messages out of an Alma error body; fall back to the raw text.
fn error_message(body: &str) -> String {
    let parsed = match serde_json::from_str::<AlmaErrorBody>(body) {
        Ok(parsed) => parsed,
        Err(_) => return body.trim().to_string(),
    };

    let messages: Vec<String> = parsed
        .error_list
        .error
        .into_iter()
        .filter_map(|e| match (e.code, e.message) {
            (Some(code), Some(message)) => Some(format!("{}: {}", code, message.trim())),
            (None, Some(message)) => Some(message.trim().to_string()),
            (Some(code), None) => Some(code),
            (None, None) => None,
        })
        .collect();

    if messages.is_empty() {
        body.trim().to_string()
    } else {
        messages.join("; ")
    }
}

#[async_trait]
impl CatalogApi for AlmaClient {
    async fn update_item(
        &self,
        mms_id: &str,
        holding_id: &str,
        item_pid: &str,
        record: &ItemRecord,
    ) -> Result<Value, CatalogError> {
        for (name, value) in [("mms_id", mms_id), ("holding_id", holding_id), ("item_pid", item_pid)] {
            if value.trim().is_empty() {
                return Err(CatalogError::Validation(format!("{} is empty", name)));
            }
        }
        if self.api_key.is_empty() {
            return Err(CatalogError::Validation("API key is empty".to_string()));
        }

        let url = self.item_url(mms_id, holding_id, item_pid)?;
        debug!(
            "Alma update item: mms_id={}, holding_id={}, item_pid={}",
            mms_id, holding_id, item_pid
        );

        let response = self
            .client
            .put(url)
            .header(AUTHORIZATION, format!("apikey {}", self.api_key))
            .header(ACCEPT, "application/json")
            .json(record)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let message = error_message(&body);
            return Err(match status {
                StatusCode::NOT_FOUND => CatalogError::NotFound(format!(
                    "item {}/{}/{}: {}",
                    mms_id, holding_id, item_pid, message
                )),
                StatusCode::BAD_REQUEST => CatalogError::InvalidInput(message),
                _ => CatalogError::Api {
                    status: status.as_u16(),
                    message,
                },
            });
        }

        response.json().await.map_err(|e| {
            CatalogError::Parse(format!("Failed to parse item response: {}", e))
        })
    }
}

/// Builds [`AlmaClient`]s, optionally against a fixed base URL.
#[derive(Debug, Clone, Default)]
pub struct AlmaConnector {
    base_url: Option<String>,
}

impl AlmaConnector {
    pub fn new(base_url: Option<String>) -> Self {
        Self { base_url }
    }
}

impl CatalogConnector for AlmaConnector {
    fn connect(&self, settings: CatalogSettings) -> Result<Box<dyn CatalogApi>, CatalogError> {
        Ok(Box::new(AlmaClient::new(settings, self.base_url.as_deref())?))
    }
}
