//! Per-institution catalog credentials.
//!
//! The update pipeline asks a [`CredentialResolver`] for the API key of the
//! institution that owns a job. [`InstitutionApiClient`] is the HTTP
//! implementation backed by the institution service.

mod institution_api;

pub use institution_api::InstitutionApiClient;

use async_trait::async_trait;
use thiserror::Error;

/// Errors that can occur when resolving a credential.
#[derive(Debug, Error)]
pub enum CredentialError {
    /// HTTP request failed (connect, timeout, body read).
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Service returned a non-success status.
    #[error("Institution API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Response body was not the expected shape.
    #[error("Failed to parse response: {0}")]
    Parse(String),

    /// Endpoint is not usable as a base URL.
    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Looks up the catalog credential for an institution.
#[async_trait]
pub trait CredentialResolver: Send + Sync {
    /// Returns `Ok(None)` when the service answers but holds no key for the
    /// institution.
    async fn resolve(&self, institution_id: i64) -> Result<Option<String>, CredentialError>;
}
