//! Types for the queue worker.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::{Config, MessageEncoding};
use crate::storage::StorageError;

/// Errors that can occur while polling.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// Receiving a batch failed.
    #[error("failed to receive messages: {0}")]
    Receive(#[from] StorageError),
}

/// What happened to one queue message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageDisposition {
    /// Handled and removed from the queue.
    Deleted,
    /// Left on the queue; it reappears after the visibility timeout.
    Retained,
    /// Moved to the poison queue.
    Poisoned,
}

impl MessageDisposition {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Deleted => "deleted",
            Self::Retained => "retained",
            Self::Poisoned => "poisoned",
        }
    }
}

/// Queue names and polling knobs.
#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub queue: String,
    pub poison_queue: String,
    pub batch_size: u32,
    pub visibility_timeout: Duration,
    pub poll_interval: Duration,
    pub max_dequeue_count: u32,
    pub encoding: MessageEncoding,
}

impl From<&Config> for WorkerSettings {
    fn from(config: &Config) -> Self {
        let queues = &config.queues;
        Self {
            queue: queues.update_queue.clone(),
            poison_queue: queues.poison_queue(),
            batch_size: queues.batch_size,
            visibility_timeout: Duration::from_secs(u64::from(queues.visibility_timeout_secs)),
            poll_interval: Duration::from_millis(queues.poll_interval_ms),
            max_dequeue_count: queues.max_dequeue_count,
            encoding: queues.message_encoding,
        }
    }
}

/// Current status of the worker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WorkerStatus {
    /// Whether the worker is running.
    pub running: bool,
    /// Queue being polled.
    pub queue: String,
    /// Messages received since start.
    pub received: u64,
    /// Messages processed and deleted.
    pub deleted: u64,
    /// Messages left for redelivery.
    pub retained: u64,
    /// Messages moved to the poison queue.
    pub poisoned: u64,
    /// Failed receive calls.
    pub receive_errors: u64,
    /// When the queue was last polled.
    pub last_poll_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_settings_from_config() {
        let config = crate::config::load_config_from_str(
            r#"
[storage]
connection_string = "UseDevelopmentStorage=true"

[institution_api]
endpoint = "https://institutions.example/api"
api_key = "k"

[queues]
update_queue = "jobs"
batch_size = 8
message_encoding = "none"
"#,
        )
        .unwrap();

        let settings = WorkerSettings::from(&config);
        assert_eq!(settings.queue, "jobs");
        assert_eq!(settings.poison_queue, "jobs-poison");
        assert_eq!(settings.batch_size, 8);
        assert_eq!(settings.visibility_timeout, Duration::from_secs(300));
        assert_eq!(settings.poll_interval, Duration::from_millis(2000));
        assert_eq!(settings.max_dequeue_count, 5);
        assert_eq!(settings.encoding, MessageEncoding::None);
    }

    #[test]
    fn test_status_serialization() {
        let status = WorkerStatus {
            running: true,
            queue: "update-queue".into(),
            deleted: 3,
            ..Default::default()
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["running"], true);
        assert_eq!(json["deleted"], 3);
        assert!(json["last_poll_at"].is_null());
    }
}
