//! Mock credential resolver for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::credentials::{CredentialError, CredentialResolver};

/// Mock implementation of the CredentialResolver trait.
///
/// Institutions without a configured key resolve to `Ok(None)`.
#[derive(Debug, Default)]
pub struct MockCredentialResolver {
    keys: Arc<RwLock<HashMap<i64, String>>>,
    calls: Arc<RwLock<Vec<i64>>>,
    /// If set, the next resolve will fail with this error.
    next_error: Arc<RwLock<Option<CredentialError>>>,
}

impl MockCredentialResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolver that knows one institution.
    pub async fn with_key(institution_id: i64, key: &str) -> Self {
        let resolver = Self::new();
        resolver.set_key(institution_id, key).await;
        resolver
    }

    pub async fn set_key(&self, institution_id: i64, key: &str) {
        self.keys
            .write()
            .await
            .insert(institution_id, key.to_string());
    }

    /// Institution ids that were looked up, in order.
    pub async fn recorded_calls(&self) -> Vec<i64> {
        self.calls.read().await.clone()
    }

    pub async fn call_count(&self) -> usize {
        self.calls.read().await.len()
    }

    pub async fn set_next_error(&self, error: CredentialError) {
        *self.next_error.write().await = Some(error);
    }
}

#[async_trait]
impl CredentialResolver for MockCredentialResolver {
    async fn resolve(&self, institution_id: i64) -> Result<Option<String>, CredentialError> {
        self.calls.write().await.push(institution_id);

        if let Some(err) = self.next_error.write().await.take() {
            return Err(err);
        }
        Ok(self.keys.read().await.get(&institution_id).cloned())
    }
}
