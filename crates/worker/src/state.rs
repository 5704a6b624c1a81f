use std::sync::Arc;
use itemupdate_core::{Config, QueueWorker, SanitizedConfig, WorkerStatus};

/// Shared application state
pub struct AppState {
    config: Config,
    worker: Option<Arc<QueueWorker>>,
}

impl AppState {
    pub fn new(config: Config, worker: Option<Arc<QueueWorker>>) -> Self {
        Self { config, worker }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn worker(&self) -> Option<&Arc<QueueWorker>> {
        self.worker.as_ref()
    }

    pub async fn worker_status(&self) -> Option<WorkerStatus> {
        match &self.worker {
            Some(worker) => Some(worker.status().await),
            None => None,
        }
    }
}
