//! Inbound update job message.

use serde_json::{Map, Value};
use thiserror::Error;

/// The message body could not be read as a JSON object.
#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message body is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("message body is not a JSON object")]
    NotAnObject,
}

/// Why the institution id could not be resolved.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InstitutionIdError {
    #[error("no institution id provided")]
    Missing,

    #[error("institution id is not an integer: {0}")]
    Invalid(String),
}

/// An update job message, `{job_id, institution_id}`.
///
/// The full JSON object is kept so that it can be forwarded verbatim as the
/// completion notification, including any fields this stage does not read.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateJobMessage {
    raw: Map<String, Value>,
}

impl UpdateJobMessage {
    /// Decode a raw message body.
    pub fn parse(body: &[u8]) -> Result<Self, MessageError> {
        match serde_json::from_slice::<Value>(body)? {
            Value::Object(raw) => Ok(Self { raw }),
            _ => Err(MessageError::NotAnObject),
        }
    }

    /// The job id, if present as a non-empty string.
    pub fn job_id(&self) -> Option<&str> {
        self.raw
            .get("job_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
    }

    /// The institution id coerced to an integer.
    ///
    /// Accepts a JSON integer or a string holding one (surrounding
    /// whitespace allowed).
    pub fn institution_id(&self) -> Result<i64, InstitutionIdError> {
        match self.raw.get("institution_id") {
            None | Some(Value::Null) => Err(InstitutionIdError::Missing),
            Some(Value::String(s)) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| InstitutionIdError::Invalid(s.clone())),
            Some(Value::Number(n)) => n
                .as_i64()
                .ok_or_else(|| InstitutionIdError::Invalid(n.to_string())),
            Some(other) => Err(InstitutionIdError::Invalid(other.to_string())),
        }
    }

    /// The original payload, unchanged.
    pub fn payload(&self) -> Value {
        Value::Object(self.raw.clone())
    }
}
