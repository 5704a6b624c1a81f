//! Testing utilities and mock implementations.
//!
//! This module provides mock implementations of every collaborator trait
//! the update pipeline and queue worker depend on, so both can be exercised
//! end to end without a storage account or remote services.
//!
//! # Example
//!
//! ```rust,ignore
//! use itemupdate_core::testing::{fixtures, MockObjectStore, MockCatalogConnector};
//!
//! let store = MockObjectStore::new();
//! store.insert("updated-items-container", "J1.json", fixtures::staged_item("M1", "H1", "P1")).await;
//!
//! let catalog = MockCatalogConnector::new();
//! // ... build an UpdateService with fixtures::update_settings() ...
//! ```

mod mock_catalog;
mod mock_credentials;
mod mock_storage;

pub use mock_catalog::{MockCatalogConnector, RecordedCatalogUpdate};
pub use mock_credentials::MockCredentialResolver;
pub use mock_storage::{
    MockMessageSource, MockNotificationSink, MockObjectStore, RecordedNotification, RecordedPut,
};

/// Test fixtures and helper functions.
pub mod fixtures {
    use serde_json::{json, Value};
    use std::time::Duration;

    use crate::catalog::Region;
    use crate::config::MissingCredentialPolicy;
    use crate::storage::QueueMessage;
    use crate::update::UpdateSettings;

    pub const UPDATED_ITEMS_CONTAINER: &str = "updated-items-container";
    pub const REPORT_CONTAINER: &str = "reports-container";
    pub const UPDATE_QUEUE: &str = "update-queue";
    pub const NOTIFICATION_QUEUE: &str = "notification-queue";

    /// Pipeline settings with the default container and queue names.
    pub fn update_settings() -> UpdateSettings {
        UpdateSettings {
            updated_items_container: UPDATED_ITEMS_CONTAINER.to_string(),
            report_container: REPORT_CONTAINER.to_string(),
            notification_queue: NOTIFICATION_QUEUE.to_string(),
            region: Region::Na,
            catalog_timeout: Duration::from_secs(90),
            missing_credential: MissingCredentialPolicy::Placeholder,
            skip_completed_jobs: false,
        }
    }

    /// A staged item with title, barcode and call number.
    pub fn staged_item(mms_id: &str, holding_id: &str, item_pid: &str) -> Value {
        json!({
            "bib_data": {
                "mms_id": mms_id,
                "title": "Test Book"
            },
            "holding_data": {
                "holding_id": holding_id
            },
            "item_data": {
                "pid": item_pid,
                "barcode": "123456789",
                "alternative_call_number": "QA76.73 .R87"
            },
            "link": format!(
                "https://api-na.hosted.exlibrisgroup.com/almaws/v1/bibs/{}/holdings/{}/items/{}",
                mms_id, holding_id, item_pid
            )
        })
    }

    /// A job message body.
    pub fn job_message(job_id: &str, institution_id: Value) -> Vec<u8> {
        json!({"job_id": job_id, "institution_id": institution_id})
            .to_string()
            .into_bytes()
    }

    /// A queue message as delivered by a source.
    pub fn queue_message(id: &str, text: &str, dequeue_count: u32) -> QueueMessage {
        QueueMessage {
            id: id.to_string(),
            pop_receipt: format!("{}-receipt", id),
            dequeue_count,
            text: text.to_string(),
        }
    }
}
