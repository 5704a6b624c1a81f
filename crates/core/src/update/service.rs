//! Update service implementation.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::catalog::{CatalogConnector, CatalogSettings};
use crate::config::MissingCredentialPolicy;
use crate::credentials::CredentialResolver;
use crate::job::{
    blob_key, InstitutionIdError, ItemIdentifiers, ItemRecord, ReportRecord, UpdateJobMessage,
};
use crate::metrics;
use crate::storage::{NotificationSink, ObjectStore, StorageError};

use super::types::{GateFailure, UpdateError, UpdateOutcome, UpdateSettings};

/// Credential handed to the catalog client when none could be resolved
/// under [`MissingCredentialPolicy::Placeholder`].
pub const MISSING_CREDENTIAL_PLACEHOLDER: &str = "None";

/// Why `run` stopped early.
enum Halt {
    Gate(GateFailure),
    Fault(UpdateError),
}

impl From<GateFailure> for Halt {
    fn from(failure: GateFailure) -> Self {
        Halt::Gate(failure)
    }
}

impl From<UpdateError> for Halt {
    fn from(error: UpdateError) -> Self {
        Halt::Fault(error)
    }
}

/// Applies staged item updates to the catalog.
///
/// Holds long-lived storage handles; a catalog client is built per job
/// because it is bound to the institution's credential.
pub struct UpdateService {
    settings: UpdateSettings,
    objects: Arc<dyn ObjectStore>,
    notifications: Arc<dyn NotificationSink>,
    credentials: Arc<dyn CredentialResolver>,
    catalog: Arc<dyn CatalogConnector>,
}

impl UpdateService {
    pub fn new(
        settings: UpdateSettings,
        objects: Arc<dyn ObjectStore>,
        notifications: Arc<dyn NotificationSink>,
        credentials: Arc<dyn CredentialResolver>,
        catalog: Arc<dyn CatalogConnector>,
    ) -> Self {
        Self {
            settings,
            objects,
            notifications,
            credentials,
            catalog,
        }
    }

    pub fn settings(&self) -> &UpdateSettings {
        &self.settings
    }

    /// Process one raw job message.
    pub async fn process(&self, body: &[u8]) -> Result<UpdateOutcome, UpdateError> {
        match self.run(body).await {
            Ok(outcome) => {
                metrics::UPDATE_OUTCOMES
                    .with_label_values(&[outcome.label()])
                    .inc();
                Ok(outcome)
            }
            Err(Halt::Gate(failure)) => {
                error!(
                    job_id = failure.job_id().unwrap_or(""),
                    kind = failure.kind(),
                    "Update aborted: {}",
                    failure
                );
                metrics::GATE_FAILURES
                    .with_label_values(&[failure.kind()])
                    .inc();
                let outcome = UpdateOutcome::Aborted(failure);
                metrics::UPDATE_OUTCOMES
                    .with_label_values(&[outcome.label()])
                    .inc();
                Ok(outcome)
            }
            Err(Halt::Fault(e)) => {
                error!(job_id = e.job_id(), "Update failed after catalog write: {}", e);
                metrics::UPDATE_OUTCOMES.with_label_values(&["error"]).inc();
                Err(e)
            }
        }
    }

    async fn run(&self, body: &[u8]) -> Result<UpdateOutcome, Halt> {
        let (message, job_id) = Self::parse_message(body)?;
        let record = self.fetch_item(&job_id).await?;
        let ids = Self::extract_identifiers(&job_id, &record)?;
        let institution_id = Self::institution_id(&job_id, &message)?;

        if self.settings.skip_completed_jobs && self.report_exists(&job_id).await {
            info!(job_id = %job_id, "Report already exists, skipping catalog update");
            self.notify(&job_id, &message).await?;
            return Ok(UpdateOutcome::AlreadyApplied { job_id });
        }

        let credential = self.resolve_credential(&job_id, institution_id).await?;
        self.submit_update(&job_id, &ids, &record, credential).await?;
        self.write_report(&job_id, &record).await?;
        self.notify(&job_id, &message).await?;

        info!(job_id = %job_id, "Item {} updated", ids.item_pid);
        Ok(UpdateOutcome::Completed { job_id })
    }

    fn parse_message(body: &[u8]) -> Result<(UpdateJobMessage, String), GateFailure> {
        let message = UpdateJobMessage::parse(body).map_err(|e| GateFailure::MalformedMessage {
            reason: e.to_string(),
        })?;
        let job_id = message
            .job_id()
            .map(str::to_string)
            .ok_or(GateFailure::MissingJobId)?;
        Ok((message, job_id))
    }

    async fn fetch_item(&self, job_id: &str) -> Result<ItemRecord, GateFailure> {
        let container = &self.settings.updated_items_container;
        let fetched = self.objects.get_json(container, &blob_key(job_id)).await;

        let value = match fetched {
            Ok(Some(value)) => value,
            Ok(None) => {
                warn!(job_id = %job_id, "No item provided");
                return Err(GateFailure::ItemNotProvided {
                    job_id: job_id.to_string(),
                });
            }
            Err(e) => {
                warn!(job_id = %job_id, "Failed to download item from storage: {}", e);
                return Err(GateFailure::ItemFetchFailed {
                    job_id: job_id.to_string(),
                    reason: e.to_string(),
                });
            }
        };

        serde_json::from_value(value).map_err(|e| {
            warn!(job_id = %job_id, "Staged item has an unexpected shape: {}", e);
            GateFailure::ItemFetchFailed {
                job_id: job_id.to_string(),
                reason: format!("unexpected item shape: {}", e),
            }
        })
    }

    fn extract_identifiers(
        job_id: &str,
        record: &ItemRecord,
    ) -> Result<ItemIdentifiers, GateFailure> {
        ItemIdentifiers::try_from(record).map_err(|missing| GateFailure::MissingIdentifiers {
            job_id: job_id.to_string(),
            missing,
        })
    }

    fn institution_id(job_id: &str, message: &UpdateJobMessage) -> Result<i64, GateFailure> {
        message.institution_id().map_err(|e| match e {
            InstitutionIdError::Missing => GateFailure::MissingInstitutionId {
                job_id: job_id.to_string(),
            },
            InstitutionIdError::Invalid(value) => GateFailure::InvalidInstitutionId {
                job_id: job_id.to_string(),
                value,
            },
        })
    }

    /// A failed existence check counts as "not applied".
    async fn report_exists(&self, job_id: &str) -> bool {
        match self
            .objects
            .exists(&self.settings.report_container, &blob_key(job_id))
            .await
        {
            Ok(exists) => exists,
            Err(e) => {
                warn!(job_id = %job_id, "Could not check for an existing report: {}", e);
                false
            }
        }
    }

    async fn resolve_credential(
        &self,
        job_id: &str,
        institution_id: i64,
    ) -> Result<String, GateFailure> {
        let failure = match self.credentials.resolve(institution_id).await {
            Ok(Some(key)) => return Ok(key),
            Ok(None) => {
                warn!(job_id = %job_id, institution_id, "No institution API key provided");
                GateFailure::NoCredentialProvided {
                    job_id: job_id.to_string(),
                    institution_id,
                }
            }
            Err(e) => {
                warn!(job_id = %job_id, institution_id, "Failed to get API key: {}", e);
                GateFailure::CredentialResolutionFailed {
                    job_id: job_id.to_string(),
                    institution_id,
                    reason: e.to_string(),
                }
            }
        };

        match self.settings.missing_credential {
            MissingCredentialPolicy::Abort => Err(failure),
            MissingCredentialPolicy::Placeholder => {
                debug!(job_id = %job_id, "Continuing with placeholder credential");
                Ok(MISSING_CREDENTIAL_PLACEHOLDER.to_string())
            }
        }
    }

    async fn submit_update(
        &self,
        job_id: &str,
        ids: &ItemIdentifiers,
        record: &ItemRecord,
        credential: String,
    ) -> Result<(), GateFailure> {
        let failed = |reason: String| GateFailure::CatalogUpdateFailed {
            job_id: job_id.to_string(),
            reason,
        };

        let client = self
            .catalog
            .connect(CatalogSettings {
                credential,
                region: self.settings.region,
                timeout: self.settings.catalog_timeout,
            })
            .map_err(|e| failed(e.to_string()))?;

        let started = Instant::now();
        let result = client
            .update_item(&ids.mms_id, &ids.holding_id, &ids.item_pid, record)
            .await;
        metrics::CATALOG_REQUEST_DURATION
            .with_label_values(&[if result.is_ok() { "success" } else { "failure" }])
            .observe(started.elapsed().as_secs_f64());

        result.map(|_| ()).map_err(|e| failed(e.to_string()))
    }

    async fn write_report(&self, job_id: &str, record: &ItemRecord) -> Result<(), UpdateError> {
        let report = ReportRecord::from(record);
        let value = serde_json::to_value(&report).map_err(|e| UpdateError::ReportWrite {
            job_id: job_id.to_string(),
            source: StorageError::InvalidRequest(e.to_string()),
        })?;

        self.objects
            .put_json(&self.settings.report_container, &blob_key(job_id), &value)
            .await
            .map_err(|source| UpdateError::ReportWrite {
                job_id: job_id.to_string(),
                source,
            })
    }

    async fn notify(&self, job_id: &str, message: &UpdateJobMessage) -> Result<(), UpdateError> {
        let payload: Value = message.payload();
        self.notifications
            .enqueue(&self.settings.notification_queue, &payload)
            .await
            .map_err(|source| UpdateError::Notify {
                job_id: job_id.to_string(),
                source,
            })
    }
}
