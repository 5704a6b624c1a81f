//! The item update pipeline.
//!
//! [`UpdateService::process`] takes one raw job message through eight gates:
//!
//! 1. parse the message and read `job_id`
//! 2. fetch the staged item from the object store
//! 3. extract the mms/holding/item identifiers
//! 4. read the institution id
//! 5. resolve the institution's catalog credential
//! 6. submit the item to the catalog
//! 7. write the update report
//! 8. enqueue the completion notification
//!
//! Failures in gates 1-6 are handled: they are logged and reported as
//! [`UpdateOutcome::Aborted`]. Failures in gates 7-8 come back as
//! [`UpdateError`] so the host leaves the message for redelivery.

mod service;
mod types;

pub use service::{UpdateService, MISSING_CREDENTIAL_PLACEHOLDER};
pub use types::{GateFailure, UpdateError, UpdateOutcome, UpdateSettings};
