//! Object storage and queue access.
//!
//! Three traits describe what the update pipeline and the worker need from
//! the storage account:
//!
//! - [`ObjectStore`]: JSON blobs addressed by container + key
//! - [`NotificationSink`]: enqueue a JSON payload on a named queue
//! - [`MessageSource`]: receive/delete/forward raw queue messages
//!
//! [`AzureBlobStore`] and [`AzureQueueClient`] implement them against the
//! Azure Storage REST API, authenticated from a storage connection string.

mod account;
mod blob;
mod queue;
mod transport;

pub use account::{StorageAccount, StorageCredential};
pub use blob::AzureBlobStore;
pub use queue::{decode_message, encode_message, AzureQueueClient};

use async_trait::async_trait;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to the storage account.
#[derive(Debug, Error)]
pub enum StorageError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Blob or queue does not exist (404).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Service returned an error status.
    #[error("Storage API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response or stored content could not be decoded.
    #[error("Failed to decode response: {0}")]
    Decode(String),

    /// Connection string is malformed or incomplete.
    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    /// Request could not be built or signed.
    #[error("Failed to build request: {0}")]
    InvalidRequest(String),
}

/// A message received from a queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueMessage {
    pub id: String,
    pub pop_receipt: String,
    /// Number of times this message has been delivered, this delivery included.
    pub dequeue_count: u32,
    /// Message text as stored on the queue (possibly base64).
    pub text: String,
}

/// Blob storage for JSON documents.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Fetch and decode a JSON blob. An empty blob or a JSON `null` yields
    /// `Ok(None)`; a missing blob is `Err(NotFound)`.
    async fn get_json(&self, container: &str, key: &str) -> Result<Option<Value>, StorageError>;

    /// Write a JSON blob, replacing any existing one.
    async fn put_json(&self, container: &str, key: &str, value: &Value)
        -> Result<(), StorageError>;

    /// Whether a blob exists.
    async fn exists(&self, container: &str, key: &str) -> Result<bool, StorageError>;
}

/// Destination for completion notifications.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    /// Enqueue a JSON payload on the named queue.
    async fn enqueue(&self, queue: &str, payload: &Value) -> Result<(), StorageError>;
}

/// Source of inbound job messages.
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Receive up to `max_messages`, hiding them for `visibility_timeout`.
    async fn receive(
        &self,
        queue: &str,
        max_messages: u32,
        visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, StorageError>;

    /// Remove a handled message.
    async fn delete(&self, queue: &str, message: &QueueMessage) -> Result<(), StorageError>;

    /// Put message text, already encoded, on a queue (creating it if needed).
    async fn send_text(&self, queue: &str, text: &str) -> Result<(), StorageError>;
}
