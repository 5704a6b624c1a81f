pub mod catalog;
pub mod config;
pub mod credentials;
pub mod job;
pub mod metrics;
pub mod storage;
pub mod testing;
pub mod update;
pub mod worker;

pub use catalog::{
    AlmaClient, AlmaConnector, CatalogApi, CatalogConnector, CatalogError, CatalogSettings, Region,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError,
    MissingCredentialPolicy, SanitizedConfig,
};
pub use credentials::{CredentialError, CredentialResolver, InstitutionApiClient};
pub use job::{ItemIdentifiers, ItemRecord, ReportRecord, UpdateJobMessage};
pub use storage::{
    AzureBlobStore, AzureQueueClient, MessageSource, NotificationSink, ObjectStore, QueueMessage,
    StorageAccount, StorageError,
};
pub use update::{GateFailure, UpdateError, UpdateOutcome, UpdateService, UpdateSettings};
pub use worker::{QueueWorker, WorkerError, WorkerSettings, WorkerStatus};
