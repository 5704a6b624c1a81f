//! Mock object store, notification sink and message source for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::storage::{MessageSource, NotificationSink, ObjectStore, QueueMessage, StorageError};

/// A recorded blob write for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedPut {
    pub container: String,
    pub key: String,
    pub value: Value,
}

/// Mock implementation of the ObjectStore trait.
///
/// Blobs live in memory keyed by `(container, key)`. A blob stored as JSON
/// `null` reads back as `None`, like an empty blob.
///
/// # Example
///
/// ```rust,ignore
/// use itemupdate_core::testing::MockObjectStore;
///
/// let store = MockObjectStore::new();
/// store.insert("updated-items-container", "J1.json", fixtures::staged_item("M1", "H1", "P1")).await;
///
/// // ... run the pipeline ...
///
/// let puts = store.recorded_puts().await;
/// assert_eq!(puts[0].key, "J1.json");
/// ```
#[derive(Debug, Default)]
pub struct MockObjectStore {
    blobs: Arc<RwLock<HashMap<(String, String), Value>>>,
    gets: Arc<RwLock<Vec<(String, String)>>>,
    puts: Arc<RwLock<Vec<RecordedPut>>>,
    /// If set, the next get will fail with this error.
    next_get_error: Arc<RwLock<Option<StorageError>>>,
    /// If set, the next put will fail with this error.
    next_put_error: Arc<RwLock<Option<StorageError>>>,
    /// If set, the next exists check will fail with this error.
    next_exists_error: Arc<RwLock<Option<StorageError>>>,
}

impl MockObjectStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a blob.
    pub async fn insert(&self, container: &str, key: &str, value: Value) {
        self.blobs
            .write()
            .await
            .insert((container.to_string(), key.to_string()), value);
    }

    /// Current content of a blob.
    pub async fn blob(&self, container: &str, key: &str) -> Option<Value> {
        self.blobs
            .read()
            .await
            .get(&(container.to_string(), key.to_string()))
            .cloned()
    }

    /// Get all recorded reads as `(container, key)`.
    pub async fn recorded_gets(&self) -> Vec<(String, String)> {
        self.gets.read().await.clone()
    }

    /// Get all recorded writes.
    pub async fn recorded_puts(&self) -> Vec<RecordedPut> {
        self.puts.read().await.clone()
    }

    pub async fn put_count(&self) -> usize {
        self.puts.read().await.len()
    }

    pub async fn set_next_get_error(&self, error: StorageError) {
        *self.next_get_error.write().await = Some(error);
    }

    pub async fn set_next_put_error(&self, error: StorageError) {
        *self.next_put_error.write().await = Some(error);
    }

    pub async fn set_next_exists_error(&self, error: StorageError) {
        *self.next_exists_error.write().await = Some(error);
    }
}

#[async_trait]
impl ObjectStore for MockObjectStore {
    async fn get_json(&self, container: &str, key: &str) -> Result<Option<Value>, StorageError> {
        self.gets
            .write()
            .await
            .push((container.to_string(), key.to_string()));

        if let Some(err) = self.next_get_error.write().await.take() {
            return Err(err);
        }

        match self.blob(container, key).await {
            Some(Value::Null) => Ok(None),
            Some(value) => Ok(Some(value)),
            None => Err(StorageError::NotFound(format!("{}/{}", container, key))),
        }
    }

    async fn put_json(
        &self,
        container: &str,
        key: &str,
        value: &Value,
    ) -> Result<(), StorageError> {
        if let Some(err) = self.next_put_error.write().await.take() {
            return Err(err);
        }

        self.puts.write().await.push(RecordedPut {
            container: container.to_string(),
            key: key.to_string(),
            value: value.clone(),
        });
        self.insert(container, key, value.clone()).await;
        Ok(())
    }

    async fn exists(&self, container: &str, key: &str) -> Result<bool, StorageError> {
        if let Some(err) = self.next_exists_error.write().await.take() {
            return Err(err);
        }
        Ok(self.blob(container, key).await.is_some())
    }
}

/// A recorded notification for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedNotification {
    pub queue: String,
    pub payload: Value,
}

/// Mock implementation of the NotificationSink trait.
#[derive(Debug, Default)]
pub struct MockNotificationSink {
    sent: Arc<RwLock<Vec<RecordedNotification>>>,
    /// If set, the next enqueue will fail with this error.
    next_error: Arc<RwLock<Option<StorageError>>>,
}

impl MockNotificationSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get all notifications that were enqueued.
    pub async fn recorded_notifications(&self) -> Vec<RecordedNotification> {
        self.sent.read().await.clone()
    }

    pub async fn notification_count(&self) -> usize {
        self.sent.read().await.len()
    }

    pub async fn set_next_error(&self, error: StorageError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl NotificationSink for MockNotificationSink {
    async fn enqueue(&self, queue: &str, payload: &Value) -> Result<(), StorageError> {
        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        self.sent.write().await.push(RecordedNotification {
            queue: queue.to_string(),
            payload: payload.clone(),
        });
        Ok(())
    }
}

/// Mock implementation of the MessageSource trait.
///
/// Messages are handed out once; a test that wants redelivery pushes the
/// message again with a higher dequeue count.
#[derive(Debug, Default)]
pub struct MockMessageSource {
    pending: Arc<RwLock<HashMap<String, VecDeque<QueueMessage>>>>,
    deleted: Arc<RwLock<Vec<(String, QueueMessage)>>>,
    sent: Arc<RwLock<Vec<(String, String)>>>,
    receive_calls: Arc<RwLock<usize>>,
    next_id: Arc<RwLock<u64>>,
    /// If set, the next receive will fail with this error.
    next_receive_error: Arc<RwLock<Option<StorageError>>>,
}

impl MockMessageSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a message with the given text and dequeue count.
    pub async fn push_message(&self, queue: &str, text: &str, dequeue_count: u32) -> QueueMessage {
        let id = {
            let mut next_id = self.next_id.write().await;
            *next_id += 1;
            *next_id
        };
        let message = QueueMessage {
            id: format!("msg-{}", id),
            pop_receipt: format!("receipt-{}", id),
            dequeue_count,
            text: text.to_string(),
        };
        self.pending
            .write()
            .await
            .entry(queue.to_string())
            .or_default()
            .push_back(message.clone());
        message
    }

    /// Messages not yet received from a queue.
    pub async fn pending_count(&self, queue: &str) -> usize {
        self.pending
            .read()
            .await
            .get(queue)
            .map(VecDeque::len)
            .unwrap_or(0)
    }

    /// Get all deleted messages as `(queue, message)`.
    pub async fn recorded_deletes(&self) -> Vec<(String, QueueMessage)> {
        self.deleted.read().await.clone()
    }

    /// Get all raw sends as `(queue, text)`.
    pub async fn recorded_sends(&self) -> Vec<(String, String)> {
        self.sent.read().await.clone()
    }

    pub async fn receive_calls(&self) -> usize {
        *self.receive_calls.read().await
    }

    pub async fn set_next_receive_error(&self, error: StorageError) {
        *self.next_receive_error.write().await = Some(error);
    }
}

#[async_trait]
impl MessageSource for MockMessageSource {
    async fn receive(
        &self,
        queue: &str,
        max_messages: u32,
        _visibility_timeout: Duration,
    ) -> Result<Vec<QueueMessage>, StorageError> {
        *self.receive_calls.write().await += 1;

        if let Some(err) = self.next_receive_error.write().await.take() {
            return Err(err);
        }

        let mut pending = self.pending.write().await;
        let Some(messages) = pending.get_mut(queue) else {
            return Ok(Vec::new());
        };
        let count = messages.len().min(max_messages as usize);
        Ok(messages.drain(..count).collect())
    }

    async fn delete(&self, queue: &str, message: &QueueMessage) -> Result<(), StorageError> {
        self.deleted
            .write()
            .await
            .push((queue.to_string(), message.clone()));
        Ok(())
    }

    async fn send_text(&self, queue: &str, text: &str) -> Result<(), StorageError> {
        self.sent
            .write()
            .await
            .push((queue.to_string(), text.to_string()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tokio_test::{assert_err, assert_ok};

    #[tokio::test]
    async fn test_object_store_round_trip_and_errors() {
        let store = MockObjectStore::new();
        store.insert("c", "k.json", json!({"a": 1})).await;
        store.insert("c", "null.json", Value::Null).await;

        assert_eq!(store.get_json("c", "k.json").await.unwrap(), Some(json!({"a": 1})));
        assert_eq!(store.get_json("c", "null.json").await.unwrap(), None);
        assert!(matches!(
            store.get_json("c", "missing.json").await,
            Err(StorageError::NotFound(_))
        ));

        store.set_next_put_error(StorageError::Decode("x".into())).await;
        assert_err!(store.put_json("c", "r.json", &json!({})).await);
        assert_ok!(store.put_json("c", "r.json", &json!({})).await);
        assert_eq!(store.put_count().await, 1);
        assert!(store.exists("c", "r.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_message_source_hands_out_in_batches() {
        let source = MockMessageSource::new();
        for i in 0..3 {
            source.push_message("q", &format!("m{}", i), 1).await;
        }

        let first = source.receive("q", 2, Duration::from_secs(30)).await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(first[0].text, "m0");
        assert_eq!(source.pending_count("q").await, 1);

        let rest = source.receive("q", 2, Duration::from_secs(30)).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert!(source
            .receive("other", 2, Duration::from_secs(30))
            .await
            .unwrap()
            .is_empty());
    }
}
