//! Remote catalog (Alma) item updates.
//!
//! A [`CatalogApi`] client is bound to one institution's credential, so the
//! pipeline builds a fresh one per job through a [`CatalogConnector`].

mod alma;
mod region;

pub use alma::{AlmaClient, AlmaConnector};
pub use region::Region;

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::job::ItemRecord;

/// Errors that can occur when talking to the catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// HTTP request failed.
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Item, holding or bib does not exist (404).
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Catalog rejected the request (400).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Catalog returned another error status.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Failed to parse response.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Request was rejected before sending.
    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Construction parameters for a catalog client.
#[derive(Clone)]
pub struct CatalogSettings {
    pub credential: String,
    pub region: Region,
    pub timeout: Duration,
}

impl std::fmt::Debug for CatalogSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CatalogSettings")
            .field("region", &self.region)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

/// Item operations against the catalog.
#[async_trait]
pub trait CatalogApi: Send + Sync {
    /// Replace an item with `record`. Returns the catalog's view of the item.
    async fn update_item(
        &self,
        mms_id: &str,
        holding_id: &str,
        item_pid: &str,
        record: &ItemRecord,
    ) -> Result<Value, CatalogError>;
}

/// Builds catalog clients bound to a credential.
pub trait CatalogConnector: Send + Sync {
    fn connect(&self, settings: CatalogSettings) -> Result<Box<dyn CatalogApi>, CatalogError>;
}
