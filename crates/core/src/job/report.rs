//! Update report persisted after a successful catalog update.

use serde::{Deserialize, Serialize};

use super::record::ItemRecord;

/// Summary of an applied update.
///
/// The three leading fields are always written (as `null` when the source
/// item lacks them); the note and provenance code only when present and
/// non-empty.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRecord {
    #[serde(rename = "Title")]
    pub title: Option<String>,
    #[serde(rename = "Barcode")]
    pub barcode: Option<String>,
    #[serde(rename = "Item Call Number")]
    pub item_call_number: Option<String>,
    #[serde(
        rename = "Internal Note 1",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub internal_note_1: Option<String>,
    #[serde(
        rename = "Provenance Code",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub provenance_code: Option<String>,
}

impl From<&ItemRecord> for ReportRecord {
    fn from(record: &ItemRecord) -> Self {
        Self {
            title: record.title(),
            barcode: record.barcode(),
            item_call_number: record.alternative_call_number(),
            internal_note_1: record.internal_note_1(),
            provenance_code: record.provenance_desc(),
        }
    }
}
