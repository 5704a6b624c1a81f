//! Outcomes, failures and settings of the update pipeline.

use std::time::Duration;

use thiserror::Error;

use crate::catalog::Region;
use crate::config::{Config, MissingCredentialPolicy};
use crate::job::MissingIdentifiers;
use crate::storage::StorageError;

/// Why a job stopped before the catalog update was applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GateFailure {
    #[error("message is not a JSON object: {reason}")]
    MalformedMessage { reason: String },

    #[error("no job id provided")]
    MissingJobId,

    #[error("failed to fetch staged item for job {job_id}: {reason}")]
    ItemFetchFailed { job_id: String, reason: String },

    #[error("no item provided for job {job_id}")]
    ItemNotProvided { job_id: String },

    #[error("job {job_id}: {missing}")]
    MissingIdentifiers {
        job_id: String,
        missing: MissingIdentifiers,
    },

    #[error("no institution id provided for job {job_id}")]
    MissingInstitutionId { job_id: String },

    #[error("job {job_id}: institution id is not an integer: {value}")]
    InvalidInstitutionId { job_id: String, value: String },

    #[error("failed to get API key for institution {institution_id} (job {job_id}): {reason}")]
    CredentialResolutionFailed {
        job_id: String,
        institution_id: i64,
        reason: String,
    },

    #[error("no API key provided for institution {institution_id} (job {job_id})")]
    NoCredentialProvided { job_id: String, institution_id: i64 },

    #[error("failed to update item for job {job_id}: {reason}")]
    CatalogUpdateFailed { job_id: String, reason: String },
}

impl GateFailure {
    /// Stable snake_case tag, used in logs and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedMessage { .. } => "malformed_message",
            Self::MissingJobId => "missing_job_id",
            Self::ItemFetchFailed { .. } => "item_fetch_failed",
            Self::ItemNotProvided { .. } => "item_not_provided",
            Self::MissingIdentifiers { .. } => "missing_identifiers",
            Self::MissingInstitutionId { .. } => "missing_institution_id",
            Self::InvalidInstitutionId { .. } => "invalid_institution_id",
            Self::CredentialResolutionFailed { .. } => "credential_resolution_failed",
            Self::NoCredentialProvided { .. } => "no_credential_provided",
            Self::CatalogUpdateFailed { .. } => "catalog_update_failed",
        }
    }

    /// Job the failure belongs to, when it got far enough to know it.
    pub fn job_id(&self) -> Option<&str> {
        match self {
            Self::MalformedMessage { .. } | Self::MissingJobId => None,
            Self::ItemFetchFailed { job_id, .. }
            | Self::ItemNotProvided { job_id }
            | Self::MissingIdentifiers { job_id, .. }
            | Self::MissingInstitutionId { job_id }
            | Self::InvalidInstitutionId { job_id, .. }
            | Self::CredentialResolutionFailed { job_id, .. }
            | Self::NoCredentialProvided { job_id, .. }
            | Self::CatalogUpdateFailed { job_id, .. } => Some(job_id),
        }
    }
}

/// Result of a handled job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// All gates passed.
    Completed { job_id: String },
    /// A gate failed; nothing after it ran.
    Aborted(GateFailure),
    /// A report already existed; only the notification was sent.
    AlreadyApplied { job_id: String },
}

impl UpdateOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::Completed { .. } => "completed",
            Self::Aborted(_) => "aborted",
            Self::AlreadyApplied { .. } => "already_applied",
        }
    }
}

/// Faults after the catalog update that the host must see.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("failed to save report for job {job_id}: {source}")]
    ReportWrite { job_id: String, source: StorageError },

    #[error("failed to send notification for job {job_id}: {source}")]
    Notify { job_id: String, source: StorageError },
}

impl UpdateError {
    pub fn job_id(&self) -> &str {
        match self {
            Self::ReportWrite { job_id, .. } | Self::Notify { job_id, .. } => job_id,
        }
    }
}

/// Names and knobs the pipeline needs from the configuration.
#[derive(Debug, Clone)]
pub struct UpdateSettings {
    pub updated_items_container: String,
    pub report_container: String,
    pub notification_queue: String,
    pub region: Region,
    pub catalog_timeout: Duration,
    pub missing_credential: MissingCredentialPolicy,
    pub skip_completed_jobs: bool,
}

impl From<&Config> for UpdateSettings {
    fn from(config: &Config) -> Self {
        Self {
            updated_items_container: config.storage.updated_items_container.clone(),
            report_container: config.storage.report_container.clone(),
            notification_queue: config.queues.notification_queue.clone(),
            region: config.catalog.region,
            catalog_timeout: Duration::from_secs(config.api_client_timeout_secs),
            missing_credential: config.update.missing_credential,
            skip_completed_jobs: config.update.skip_completed_jobs,
        }
    }
}
