//! Mock catalog connector and client for testing.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::RwLock;

use crate::catalog::{CatalogApi, CatalogConnector, CatalogError, CatalogSettings};
use crate::job::ItemRecord;

/// A recorded item update for test assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedCatalogUpdate {
    /// Credential of the client that made the call.
    pub credential: String,
    pub mms_id: String,
    pub holding_id: String,
    pub item_pid: String,
    pub record: ItemRecord,
}

/// Mock implementation of the CatalogConnector trait.
///
/// Every client it builds records into the connector, so a test only needs
/// to hold on to the connector.
///
/// # Example
///
/// ```rust,ignore
/// use itemupdate_core::testing::MockCatalogConnector;
///
/// let catalog = MockCatalogConnector::new();
/// catalog.reject_credential("None").await;
///
/// // ... run the pipeline ...
///
/// assert_eq!(catalog.connections()[0].credential, "None");
/// assert_eq!(catalog.update_count().await, 1);
/// ```
#[derive(Debug, Default)]
pub struct MockCatalogConnector {
    // `connect` is synchronous, so connection records use a std mutex.
    connections: Arc<Mutex<Vec<CatalogSettings>>>,
    next_connect_error: Arc<Mutex<Option<CatalogError>>>,
    updates: Arc<RwLock<Vec<RecordedCatalogUpdate>>>,
    /// If set, the next update will fail with this error.
    next_error: Arc<RwLock<Option<CatalogError>>>,
    /// Credential the catalog answers with 400 Invalid input.
    rejected_credential: Arc<RwLock<Option<String>>>,
}

impl MockCatalogConnector {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
        mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Settings passed to every `connect` call.
    pub fn connections(&self) -> Vec<CatalogSettings> {
        Self::lock(&self.connections).clone()
    }

    pub fn connect_count(&self) -> usize {
        Self::lock(&self.connections).len()
    }

    pub fn set_next_connect_error(&self, error: CatalogError) {
        *Self::lock(&self.next_connect_error) = Some(error);
    }

    /// Get all item updates that were submitted (including failed ones).
    pub async fn recorded_updates(&self) -> Vec<RecordedCatalogUpdate> {
        self.updates.read().await.clone()
    }

    pub async fn update_count(&self) -> usize {
        self.updates.read().await.len()
    }

    pub async fn set_next_error(&self, error: CatalogError) {
        *self.next_error.write().await = Some(error);
    }

    /// Make updates made with `credential` fail with `InvalidInput`.
    pub async fn reject_credential(&self, credential: &str) {
        *self.rejected_credential.write().await = Some(credential.to_string());
    }
}

impl CatalogConnector for MockCatalogConnector {
    fn connect(&self, settings: CatalogSettings) -> Result<Box<dyn CatalogApi>, CatalogError> {
        Self::lock(&self.connections).push(settings.clone());

        if let Some(err) = Self::lock(&self.next_connect_error).take() {
            return Err(err);
        }

        Ok(Box::new(MockCatalogClient {
            credential: settings.credential,
            updates: Arc::clone(&self.updates),
            next_error: Arc::clone(&self.next_error),
            rejected_credential: Arc::clone(&self.rejected_credential),
        }))
    }
}

/// Client handed out by [`MockCatalogConnector`].
struct MockCatalogClient {
    credential: String,
    updates: Arc<RwLock<Vec<RecordedCatalogUpdate>>>,
    next_error: Arc<RwLock<Option<CatalogError>>>,
    rejected_credential: Arc<RwLock<Option<String>>>,
}

#[async_trait]
impl CatalogApi for MockCatalogClient {
    async fn update_item(
        &self,
        mms_id: &str,
        holding_id: &str,
        item_pid: &str,
        record: &ItemRecord,
    ) -> Result<Value, CatalogError> {
        self.updates.write().await.push(RecordedCatalogUpdate {
            credential: self.credential.clone(),
            mms_id: mms_id.to_string(),
            holding_id: holding_id.to_string(),
            item_pid: item_pid.to_string(),
            record: record.clone(),
        });

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        if self.rejected_credential.read().await.as_deref() == Some(self.credential.as_str()) {
            return Err(CatalogError::InvalidInput(
                "API-key not defined or not configured to allow this API.".to_string(),
            ));
        }

        serde_json::to_value(record).map_err(|e| CatalogError::Parse(e.to_string()))
    }
}
