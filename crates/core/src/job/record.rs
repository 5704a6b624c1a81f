//! Staged item record and the identifiers derived from it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A full item record: bibliographic, holding and item sections plus the
/// record link.
///
/// This is both the staged snapshot read from blob storage and the request
/// body sent to the catalog. Sections are kept as raw JSON objects so fields
/// this stage does not know about pass through untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    #[serde(default, deserialize_with = "null_as_empty")]
    pub bib_data: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub holding_data: Map<String, Value>,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub item_data: Map<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Map<String, Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Map<String, Value>>::deserialize(deserializer)?.unwrap_or_default())
}

/// Reads a field as text. Numbers are rendered; empty strings count as absent.
fn text(section: &Map<String, Value>, key: &str) -> Option<String> {
    match section.get(key)? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl ItemRecord {
    pub fn title(&self) -> Option<String> {
        text(&self.bib_data, "title")
    }

    pub fn barcode(&self) -> Option<String> {
        text(&self.item_data, "barcode")
    }

    pub fn alternative_call_number(&self) -> Option<String> {
        text(&self.item_data, "alternative_call_number")
    }

    pub fn internal_note_1(&self) -> Option<String> {
        text(&self.item_data, "internal_note_1")
    }

    /// Description of the provenance code (`item_data.provenance.desc`).
    pub fn provenance_desc(&self) -> Option<String> {
        self.item_data
            .get("provenance")
            .and_then(Value::as_object)
            .and_then(|provenance| text(provenance, "desc"))
    }
}

/// The identity triple of an item record. All three are non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemIdentifiers {
    pub mms_id: String,
    pub holding_id: String,
    pub item_pid: String,
}

/// One or more identifiers were absent from the record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingIdentifiers {
    pub mms_id: Option<String>,
    pub holding_id: Option<String>,
    pub item_pid: Option<String>,
}

impl MissingIdentifiers {
    /// Names of the empty fields, in record order.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.mms_id.is_none() {
            missing.push("mms_id");
        }
        if self.holding_id.is_none() {
            missing.push("holding_id");
        }
        if self.item_pid.is_none() {
            missing.push("item_pid");
        }
        missing
    }
}

impl fmt::Display for MissingIdentifiers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let show = |v: &Option<String>| v.clone().unwrap_or_else(|| "None".to_string());
        write!(
            f,
            "missing [{}] - mms_id: {}, holding_id: {}, item_pid: {}",
            self.missing_fields().join(", "),
            show(&self.mms_id),
            show(&self.holding_id),
            show(&self.item_pid)
        )
    }
}

impl TryFrom<&ItemRecord> for ItemIdentifiers {
    type Error = MissingIdentifiers;

    fn try_from(record: &ItemRecord) -> Result<Self, Self::Error> {
        let mms_id = text(&record.bib_data, "mms_id");
        let holding_id = text(&record.holding_data, "holding_id");
        let item_pid = text(&record.item_data, "pid");

        match (mms_id, holding_id, item_pid) {
            (Some(mms_id), Some(holding_id), Some(item_pid)) => Ok(Self {
                mms_id,
                holding_id,
                item_pid,
            }),
            (mms_id, holding_id, item_pid) => Err(MissingIdentifiers {
                mms_id,
                holding_id,
                item_pid,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> ItemRecord {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_identifiers_extracted() {
        let item = record(json!({
            "bib_data": {"title": "Test Book", "mms_id": "M1"},
            "holding_data": {"holding_id": "H1"},
            "item_data": {"pid": "P1", "barcode": "123456789"},
            "link": "https://api.example.com/item/123"
        }));

        let ids = ItemIdentifiers::try_from(&item).unwrap();
        assert_eq!(ids.mms_id, "M1");
        assert_eq!(ids.holding_id, "H1");
        assert_eq!(ids.item_pid, "P1");
    }

    #[test]
    fn test_numeric_identifiers_are_rendered() {
        let item = record(json!({
            "bib_data": {"mms_id": 991234},
            "holding_data": {"holding_id": 221234},
            "item_data": {"pid": 231234}
        }));
        let ids = ItemIdentifiers::try_from(&item).unwrap();
        assert_eq!(ids.mms_id, "991234");
        assert_eq!(ids.item_pid, "231234");
    }

    #[test]
    fn test_missing_identifiers_reports_fields() {
        let item = record(json!({
            "bib_data": {"mms_id": "M1"},
            "holding_data": {"holding_id": ""},
            "item_data": {}
        }));

        let missing = ItemIdentifiers::try_from(&item).unwrap_err();
        assert_eq!(missing.missing_fields(), vec!["holding_id", "item_pid"]);
        let rendered = missing.to_string();
        assert!(rendered.contains("mms_id: M1"));
        assert!(rendered.contains("holding_id: None"));
    }

    #[test]
    fn test_absent_and_null_sections_are_empty() {
        let item = record(json!({"bib_data": null, "link": "x"}));
        assert!(item.bib_data.is_empty());
        assert!(item.holding_data.is_empty());
        assert_eq!(
            ItemIdentifiers::try_from(&item)
                .unwrap_err()
                .missing_fields()
                .len(),
            3
        );
    }

    #[test]
    fn test_non_object_section_fails_to_decode() {
        let result: Result<ItemRecord, _> = serde_json::from_value(json!({"bib_data": "oops"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_record_round_trips_unknown_fields() {
        let original = json!({
            "bib_data": {"mms_id": "M1", "author": "A"},
            "holding_data": {"holding_id": "H1", "library": {"value": "MAIN", "desc": "Main"}},
            "item_data": {"pid": "P1", "policy": {"value": "09"}},
            "link": "https://api.example.com/item/123"
        });
        let item = record(original.clone());
        assert_eq!(serde_json::to_value(&item).unwrap(), original);
    }

    #[test]
    fn test_accessors() {
        let item = record(json!({
            "bib_data": {"title": "Test Book"},
            "item_data": {
                "barcode": "39000",
                "alternative_call_number": "QA76 .R87",
                "internal_note_1": "",
                "provenance": {"value": "GIFT", "desc": "Gift of the estate"}
            }
        }));
        assert_eq!(item.title().as_deref(), Some("Test Book"));
        assert_eq!(item.barcode().as_deref(), Some("39000"));
        assert_eq!(item.alternative_call_number().as_deref(), Some("QA76 .R87"));
        assert_eq!(item.internal_note_1(), None);
        assert_eq!(item.provenance_desc().as_deref(), Some("Gift of the estate"));
    }
}
