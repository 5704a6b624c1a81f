//! Azure Blob Storage implementation of [`ObjectStore`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde_json::Value;
use tracing::debug;

use super::transport::{error_from_response, Body, StorageTransport};
use super::{ObjectStore, StorageAccount, StorageError};

/// Blob client for one storage account.
#[derive(Debug, Clone)]
pub struct AzureBlobStore {
    transport: StorageTransport,
}

impl AzureBlobStore {
    pub fn new(account: StorageAccount, timeout: Duration) -> Result<Self, StorageError> {
        Ok(Self {
            transport: StorageTransport::new(account, timeout)?,
        })
    }

    /// Create a client straight from a connection string.
    pub fn from_connection_string(
        connection_string: &str,
        timeout: Duration,
    ) -> Result<Self, StorageError> {
        Self::new(StorageAccount::from_connection_string(connection_string)?, timeout)
    }

    fn blob_url(&self, container: &str, key: &str) -> Result<Url, StorageError> {
        let mut url = self.transport.account().blob_endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| StorageError::InvalidRequest("blob endpoint cannot be a base".into()))?
            .pop_if_empty()
            .push(container)
            .push(key);
        Ok(url)
    }
}

#[async_trait]
impl ObjectStore for AzureBlobStore {
    async fn get_json(&self, container: &str, key: &str) -> Result<Option<Value>, StorageError> {
        let url = self.blob_url(container, key)?;
        debug!("Downloading blob {}/{}", container, key);

        let response = self.transport.send(Method::GET, url, &[], None).await?;
        if !response.status().is_success() {
            return Err(error_from_response(response, &format!("{}/{}", container, key)).await);
        }

        let bytes = response.bytes().await?;
        if bytes.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }

        let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
            StorageError::Decode(format!("blob {}/{} is not valid JSON: {}", container, key, e))
        })?;

        Ok(match value {
            Value::Null => None,
            other => Some(other),
        })
    }

    async fn put_json(
        &self,
        container: &str,
        key: &str,
        value: &Value,
    ) -> Result<(), StorageError> {
        let url = self.blob_url(container, key)?;
        let bytes = serde_json::to_vec(value)
            .map_err(|e| StorageError::InvalidRequest(format!("cannot serialize blob: {}", e)))?;

        debug!("Uploading blob {}/{} ({} bytes)", container, key, bytes.len());

        let response = self
            .transport
            .send(
                Method::PUT,
                url,
                &[("x-ms-blob-type", "BlockBlob")],
                Some(Body {
                    bytes,
                    content_type: "application/json",
                }),
            )
            .await?;

        if !response.status().is_success() {
            return Err(error_from_response(response, &format!("{}/{}", container, key)).await);
        }
        Ok(())
    }

    async fn exists(&self, container: &str, key: &str) -> Result<bool, StorageError> {
        let url = self.blob_url(container, key)?;
        let response = self.transport.send(Method::HEAD, url, &[], None).await?;

        match response.status() {
            StatusCode::NOT_FOUND => Ok(false),
            status if status.is_success() => Ok(true),
            _ => Err(error_from_response(response, &format!("{}/{}", container, key)).await),
        }
    }
}
