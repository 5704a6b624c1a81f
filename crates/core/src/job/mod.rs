//! Job data model.
//!
//! An update job arrives as a small queue message naming the job, and refers
//! to a staged item snapshot in blob storage. This module holds the message,
//! the item record and the values derived from it (identifiers and report).

mod message;
mod record;
mod report;

pub use message::{InstitutionIdError, MessageError, UpdateJobMessage};
pub use record::{ItemIdentifiers, ItemRecord, MissingIdentifiers};
pub use report::ReportRecord;

/// Blob key under which both the staged item and the report are stored.
pub fn blob_key(job_id: &str) -> String {
    format!("{}.json", job_id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blob_key() {
        assert_eq!(blob_key("J1"), "J1.json");
        assert_eq!(blob_key("test-job-123"), "test-job-123.json");
    }
}
