//! Queue worker implementation.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::metrics;
use crate::storage::{decode_message, MessageSource, QueueMessage};
use crate::update::UpdateService;

use super::types::{MessageDisposition, WorkerError, WorkerSettings, WorkerStatus};

#[derive(Debug, Default)]
struct Counters {
    received: AtomicU64,
    deleted: AtomicU64,
    retained: AtomicU64,
    poisoned: AtomicU64,
    receive_errors: AtomicU64,
}

/// Shared between the worker handle and its polling task.
struct Inner {
    settings: WorkerSettings,
    source: Arc<dyn MessageSource>,
    service: Arc<UpdateService>,
    counters: Counters,
    last_poll_at: RwLock<Option<DateTime<Utc>>>,
}

/// Polls the update queue and dispatches messages to the update service.
pub struct QueueWorker {
    inner: Arc<Inner>,
    running: Arc<AtomicBool>,
    shutdown_tx: broadcast::Sender<()>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl QueueWorker {
    pub fn new(
        settings: WorkerSettings,
        source: Arc<dyn MessageSource>,
        service: Arc<UpdateService>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        Self {
            inner: Arc::new(Inner {
                settings,
                source,
                service,
                counters: Counters::default(),
                last_poll_at: RwLock::new(None),
            }),
            running: Arc::new(AtomicBool::new(false)),
            shutdown_tx,
            task: Mutex::new(None),
        }
    }

    /// Start the polling loop in a background task.
    pub async fn start(&self) {
        if self.running.swap(true, Ordering::SeqCst) {
            warn!("Queue worker already running");
            return;
        }

        info!(
            "Starting queue worker on {} (batch {}, poison after {} deliveries)",
            self.inner.settings.queue,
            self.inner.settings.batch_size,
            self.inner.settings.max_dequeue_count
        );

        let inner = Arc::clone(&self.inner);
        let running = Arc::clone(&self.running);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            info!("Poll loop started");
            loop {
                if !running.load(Ordering::Relaxed) {
                    break;
                }

                let delay = match inner.poll_once().await {
                    Ok(0) => inner.settings.poll_interval,
                    // More may be waiting.
                    Ok(_) => Duration::ZERO,
                    Err(e) => {
                        warn!("Poll error: {}", e);
                        inner.settings.poll_interval
                    }
                };

                tokio::select! {
                    _ = shutdown_rx.recv() => {
                        info!("Poll loop received shutdown signal");
                        break;
                    }
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            info!("Poll loop stopped");
        });

        *self.task.lock().await = Some(handle);
    }

    /// Stop the worker, letting the in-flight batch finish.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            warn!("Queue worker not running");
            return;
        }

        info!("Stopping queue worker");
        let _ = self.shutdown_tx.send(());

        if let Some(handle) = self.task.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Poll loop ended abnormally: {}", e);
            }
        }

        info!("Queue worker stopped");
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Get current worker status.
    pub async fn status(&self) -> WorkerStatus {
        let counters = &self.inner.counters;
        WorkerStatus {
            running: self.is_running(),
            queue: self.inner.settings.queue.clone(),
            received: counters.received.load(Ordering::Relaxed),
            deleted: counters.deleted.load(Ordering::Relaxed),
            retained: counters.retained.load(Ordering::Relaxed),
            poisoned: counters.poisoned.load(Ordering::Relaxed),
            receive_errors: counters.receive_errors.load(Ordering::Relaxed),
            last_poll_at: *self.inner.last_poll_at.read().await,
        }
    }

    /// Receive and settle one batch. Returns the number of messages received.
    pub async fn poll_once(&self) -> Result<usize, WorkerError> {
        self.inner.poll_once().await
    }

    /// Settle a single message.
    pub async fn handle_message(&self, message: &QueueMessage) -> MessageDisposition {
        self.inner.handle_message(message).await
    }
}

impl Inner {
    async fn poll_once(&self) -> Result<usize, WorkerError> {
        *self.last_poll_at.write().await = Some(Utc::now());

        let messages = match self
            .source
            .receive(
                &self.settings.queue,
                self.settings.batch_size,
                self.settings.visibility_timeout,
            )
            .await
        {
            Ok(messages) => messages,
            Err(e) => {
                self.counters.receive_errors.fetch_add(1, Ordering::Relaxed);
                return Err(e.into());
            }
        };

        if messages.is_empty() {
            return Ok(0);
        }

        debug!("Received {} message(s) from {}", messages.len(), self.settings.queue);
        self.counters
            .received
            .fetch_add(messages.len() as u64, Ordering::Relaxed);

        join_all(messages.iter().map(|message| self.handle_message(message))).await;
        Ok(messages.len())
    }

    async fn handle_message(&self, message: &QueueMessage) -> MessageDisposition {
        metrics::WORKER_IN_FLIGHT.inc();
        let disposition = if message.dequeue_count > self.settings.max_dequeue_count {
            self.poison(message).await
        } else {
            self.dispatch(message).await
        };
        metrics::WORKER_IN_FLIGHT.dec();

        let counter = match disposition {
            MessageDisposition::Deleted => &self.counters.deleted,
            MessageDisposition::Retained => &self.counters.retained,
            MessageDisposition::Poisoned => &self.counters.poisoned,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        metrics::WORKER_MESSAGES
            .with_label_values(&[disposition.label()])
            .inc();

        disposition
    }

    async fn dispatch(&self, message: &QueueMessage) -> MessageDisposition {
        let body = decode_message(&message.text, self.settings.encoding);

        match self.service.process(&body).await {
            Ok(outcome) => {
                debug!("Message {} handled: {}", message.id, outcome.label());
                if let Err(e) = self.source.delete(&self.settings.queue, message).await {
                    // It will be redelivered and handled again.
                    warn!("Failed to delete message {}: {}", message.id, e);
                    return MessageDisposition::Retained;
                }
                MessageDisposition::Deleted
            }
            Err(e) => {
                error!(
                    "Message {} left for redelivery (delivery {}): {}",
                    message.id, message.dequeue_count, e
                );
                MessageDisposition::Retained
            }
        }
    }

    async fn poison(&self, message: &QueueMessage) -> MessageDisposition {
        warn!(
            "Message {} exceeded {} deliveries, moving to {}",
            message.id, self.settings.max_dequeue_count, self.settings.poison_queue
        );

        if let Err(e) = self
            .source
            .send_text(&self.settings.poison_queue, &message.text)
            .await
        {
            error!("Failed to move message {} to poison queue: {}", message.id, e);
            return MessageDisposition::Retained;
        }

        if let Err(e) = self.source.delete(&self.settings.queue, message).await {
            warn!("Failed to delete poisoned message {}: {}", message.id, e);
        }
        MessageDisposition::Poisoned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MessageEncoding;
    use crate::storage::encode_message;
    use crate::testing::{
        fixtures, MockCatalogConnector, MockCredentialResolver, MockMessageSource,
        MockNotificationSink, MockObjectStore,
    };
    use serde_json::json;

    struct Harness {
        worker: QueueWorker,
        source: Arc<MockMessageSource>,
        store: Arc<MockObjectStore>,
        notifications: Arc<MockNotificationSink>,
    }

    async fn harness() -> Harness {
        let source = Arc::new(MockMessageSource::new());
        let store = Arc::new(MockObjectStore::new());
        let notifications = Arc::new(MockNotificationSink::new());
        let service = Arc::new(UpdateService::new(
            fixtures::update_settings(),
            store.clone(),
            notifications.clone(),
            Arc::new(MockCredentialResolver::with_key(1, "k").await),
            Arc::new(MockCatalogConnector::new()),
        ));

        let settings = WorkerSettings {
            queue: fixtures::UPDATE_QUEUE.to_string(),
            poison_queue: format!("{}-poison", fixtures::UPDATE_QUEUE),
            batch_size: 16,
            visibility_timeout: Duration::from_secs(300),
            poll_interval: Duration::from_millis(10),
            max_dequeue_count: 5,
            encoding: MessageEncoding::Base64,
        };

        Harness {
            worker: QueueWorker::new(settings, source.clone(), service),
            source,
            store,
            notifications,
        }
    }

    fn encoded(job_id: &str) -> String {
        encode_message(
            &json!({"job_id": job_id, "institution_id": 1}).to_string(),
            MessageEncoding::Base64,
        )
    }

    #[tokio::test]
    async fn test_handled_message_is_deleted() {
        let h = harness().await;
        h.store
            .insert(
                fixtures::UPDATED_ITEMS_CONTAINER,
                "J1.json",
                fixtures::staged_item("M1", "H1", "P1"),
            )
            .await;
        let message = fixtures::queue_message("m1", &encoded("J1"), 1);

        assert_eq!(h.worker.handle_message(&message).await, MessageDisposition::Deleted);
        assert_eq!(h.source.recorded_deletes().await.len(), 1);
        assert_eq!(h.notifications.notification_count().await, 1);
    }

    #[tokio::test]
    async fn test_aborted_job_is_still_deleted() {
        let h = harness().await;
        // No staged item: the pipeline aborts at the fetch gate.
        let message = fixtures::queue_message("m1", &encoded("J404"), 1);

        assert_eq!(h.worker.handle_message(&message).await, MessageDisposition::Deleted);
        assert_eq!(h.notifications.notification_count().await, 0);
    }

    #[tokio::test]
    async fn test_faulted_message_is_retained() {
        let h = harness().await;
        h.store
            .insert(
                fixtures::UPDATED_ITEMS_CONTAINER,
                "J1.json",
                fixtures::staged_item("M1", "H1", "P1"),
            )
            .await;
        h.store
            .set_next_put_error(crate::storage::StorageError::Api {
                status: 503,
                message: "ServerBusy".into(),
            })
            .await;
        let message = fixtures::queue_message("m1", &encoded("J1"), 1);

        assert_eq!(h.worker.handle_message(&message).await, MessageDisposition::Retained);
        assert!(h.source.recorded_deletes().await.is_empty());
    }

    #[tokio::test]
    async fn test_over_delivered_message_is_poisoned() {
        let h = harness().await;
        let message = fixtures::queue_message("m1", &encoded("J1"), 6);

        assert_eq!(h.worker.handle_message(&message).await, MessageDisposition::Poisoned);
        assert_eq!(
            h.source.recorded_sends().await,
            vec![("update-queue-poison".to_string(), encoded("J1"))]
        );
        assert_eq!(h.source.recorded_deletes().await[0].1.id, "m1");
        assert!(h.store.recorded_gets().await.is_empty());
    }

    #[tokio::test]
    async fn test_message_at_limit_is_processed() {
        let h = harness().await;
        let message = fixtures::queue_message("m1", &encoded("J1"), 5);

        h.worker.handle_message(&message).await;
        assert!(h.source.recorded_sends().await.is_empty());
        assert_eq!(h.store.recorded_gets().await.len(), 1);
    }

    #[tokio::test]
    async fn test_poll_once_counts_batch() {
        let h = harness().await;
        for i in 0..3 {
            h.source
                .push_message(fixtures::UPDATE_QUEUE, &encoded(&format!("J{}", i)), 1)
                .await;
        }

        assert_eq!(h.worker.poll_once().await.unwrap(), 3);
        assert_eq!(h.worker.poll_once().await.unwrap(), 0);

        let status = h.worker.status().await;
        assert_eq!(status.received, 3);
        assert_eq!(status.deleted, 3);
        assert!(status.last_poll_at.is_some());
    }

    #[tokio::test]
    async fn test_receive_error_is_reported() {
        let h = harness().await;
        h.source
            .set_next_receive_error(crate::storage::StorageError::Api {
                status: 500,
                message: "InternalError".into(),
            })
            .await;

        assert!(matches!(h.worker.poll_once().await, Err(WorkerError::Receive(_))));
        assert_eq!(h.worker.status().await.receive_errors, 1);
    }

    #[tokio::test]
    async fn test_start_stop() {
        let h = harness().await;
        assert!(!h.worker.status().await.running);

        h.worker.start().await;
        assert!(h.worker.is_running());
        tokio::time::sleep(Duration::from_millis(50)).await;

        h.worker.stop().await;
        assert!(!h.worker.is_running());
        assert!(h.source.receive_calls().await >= 1);
    }
}
