// crates/core/src/types.rs
use std::borrow::Cow;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::bucket::{from_unix_millis, from_unix_seconds, parse_timestamp_str};
use crate::error::RecordError;

/// Category used at count time for a record that lacks the dimension field.
/// A literal `"null"` value lands in the same category.
pub const NULL_SENTINEL: &str = "null";

/// Appended to a value that spells its table's own index key (for example a
/// module named `module_index`), so the value cannot shadow the index when
/// the table is written out. A literal `module_index_value` lands in the same
/// category.
pub const INDEX_KEY_ALIAS_SUFFIX: &str = "_value";

/// A categorical field tracked per record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dimension {
    Module,
    Label,
    Method,
    Repo,
    Group,
}

impl Dimension {
    /// Artifact order.
    pub const ALL: [Dimension; 5] = [
        Dimension::Module,
        Dimension::Label,
        Dimension::Method,
        Dimension::Repo,
        Dimension::Group,
    ];

    /// Field name in the raw station documents.
    pub fn field(self) -> &'static str {
        match self {
            Dimension::Module => "module",
            Dimension::Label => "_label",
            Dimension::Method => "method",
            Dimension::Repo => "repo",
            Dimension::Group => "_group",
        }
    }

    /// Stem used for the table key (`<stem>_counts_per_hour`).
    pub fn stem(self) -> &'static str {
        match self {
            Dimension::Module => "module",
            Dimension::Label => "label",
            Dimension::Method => "method",
            Dimension::Repo => "repo",
            Dimension::Group => "group",
        }
    }

    /// Key of the ordered value list inside a table, e.g. `_label_index`.
    pub fn index_key(self) -> String {
        format!("{}_index", self.field())
    }

    pub fn from_stem(stem: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|d| d.stem() == stem)
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.stem())
    }
}

/// One raw event read from a station's record store.
///
/// Categorical fields are already stringified; `None` means the field was
/// absent or `null` in the source document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventRecord {
    pub id: Option<String>,
    pub dtime: NaiveDateTime,
    pub module: Option<String>,
    pub label: Option<String>,
    pub method: Option<String>,
    pub repo: Option<String>,
    pub group: Option<String>,
}

impl EventRecord {
    /// A record with only a timestamp; handy for tests and builders.
    pub fn at(dtime: NaiveDateTime) -> Self {
        Self {
            id: None,
            dtime,
            module: None,
            label: None,
            method: None,
            repo: None,
            group: None,
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with(mut self, dim: Dimension, value: impl Into<String>) -> Self {
        *self.slot_mut(dim) = Some(value.into());
        self
    }

    pub fn value(&self, dim: Dimension) -> Option<&str> {
        match dim {
            Dimension::Module => self.module.as_deref(),
            Dimension::Label => self.label.as_deref(),
            Dimension::Method => self.method.as_deref(),
            Dimension::Repo => self.repo.as_deref(),
            Dimension::Group => self.group.as_deref(),
        }
    }

    /// The lookup key for `dim`: the value, or [`NULL_SENTINEL`] when absent.
    ///
    /// A value equal to `dim.index_key()` is counted under
    /// `<index_key>`[`INDEX_KEY_ALIAS_SUFFIX`].
    pub fn category(&self, dim: Dimension) -> Cow<'_, str> {
        match self.value(dim) {
            None => Cow::Borrowed(NULL_SENTINEL),
            Some(v) if v == dim.index_key() => Cow::Owned(format!("{v}{INDEX_KEY_ALIAS_SUFFIX}")),
            Some(v) => Cow::Borrowed(v),
        }
    }

    fn slot_mut(&mut self, dim: Dimension) -> &mut Option<String> {
        match dim {
            Dimension::Module => &mut self.module,
            Dimension::Label => &mut self.label,
            Dimension::Method => &mut self.method,
            Dimension::Repo => &mut self.repo,
            Dimension::Group => &mut self.group,
        }
    }

    /// Build a record from a raw store document.
    ///
    /// `fallback_id` is used when the document carries no `_id`.
    pub fn from_document(doc: &Value, fallback_id: Option<String>) -> Result<Self, RecordError> {
        let obj = doc.as_object().ok_or(RecordError::NotAnObject)?;
        let raw_time = obj.get("dtime").ok_or(RecordError::MissingTimestamp)?;
        let dtime = parse_document_time(raw_time)?;

        let id = obj.get("_id").and_then(document_id).or(fallback_id);
        let mut record = Self::at(dtime);
        record.id = id;
        for dim in Dimension::ALL {
            *record.slot_mut(dim) = obj.get(dim.field()).and_then(stringify_category);
        }
        Ok(record)
    }
}

/// A document as returned by the record store, before parsing.
#[derive(Debug, Clone, PartialEq)]
pub struct RawDocument {
    pub body: Value,
    /// Store-assigned identifier, used when the body has no `_id`.
    pub fallback_id: Option<String>,
}

impl RawDocument {
    pub fn new(body: Value, fallback_id: Option<String>) -> Self {
        Self { body, fallback_id }
    }
}

/// Interpret a `dtime` value from a document.
pub fn parse_document_time(value: &Value) -> Result<NaiveDateTime, RecordError> {
    let bad = || RecordError::BadTimestamp {
        raw: value.to_string(),
    };
    match value {
        Value::Null => Err(RecordError::MissingTimestamp),
        Value::String(s) => parse_timestamp_str(s).ok_or_else(bad),
        Value::Number(n) => n.as_f64().and_then(from_unix_seconds).ok_or_else(bad),
        Value::Object(obj) => match obj.get("$date") {
            Some(Value::String(s)) => parse_timestamp_str(s).ok_or_else(bad),
            Some(Value::Number(n)) => n.as_i64().and_then(from_unix_millis).ok_or_else(bad),
            Some(Value::Object(inner)) => inner
                .get("$numberLong")
                .and_then(Value::as_str)
                .and_then(|s| s.parse::<i64>().ok())
                .and_then(from_unix_millis)
                .ok_or_else(bad),
            _ => Err(bad()),
        },
        _ => Err(bad()),
    }
}

/// Stringify a categorical value so every index entry is a string.
/// `null` maps to `None` (counted under the sentinel).
pub fn stringify_category(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        other => Some(other.to_string()),
    }
}

/// The `_id` of a document: a plain value or an extended-JSON `{"$oid": ...}`.
pub fn document_id(value: &Value) -> Option<String> {
    match value {
        Value::Object(obj) => obj.get("$oid").and_then(Value::as_str).map(str::to_owned),
        other => stringify_category(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ts(s: &str) -> NaiveDateTime {
        parse_timestamp_str(s).unwrap()
    }

    #[test]
    fn test_dimension_keys() {
        assert_eq!(Dimension::Label.field(), "_label");
        assert_eq!(Dimension::Label.stem(), "label");
        assert_eq!(Dimension::Group.index_key(), "_group_index");
        assert_eq!(Dimension::Module.index_key(), "module_index");
        assert_eq!(Dimension::from_stem("repo"), Some(Dimension::Repo));
        assert_eq!(Dimension::from_stem("_repo"), None);
    }

    #[test]
    fn test_from_document_full() {
        let doc = json!({
            "_id": {"$oid": "65a1f0c2e4b0a1b2c3d4e5f6"},
            "dtime": "2024-01-01T00:10:00",
            "module": "A",
            "_label": "smoke",
            "method": "GET",
            "repo": "fw",
            "_group": "nightly",
        });
        let rec = EventRecord::from_document(&doc, None).unwrap();
        assert_eq!(rec.id.as_deref(), Some("65a1f0c2e4b0a1b2c3d4e5f6"));
        assert_eq!(rec.dtime, ts("2024-01-01 00:10:00"));
        assert_eq!(rec.value(Dimension::Module), Some("A"));
        assert_eq!(rec.value(Dimension::Label), Some("smoke"));
        assert_eq!(rec.value(Dimension::Group), Some("nightly"));
    }

    #[test]
    fn test_from_document_missing_fields_are_none() {
        let doc = json!({"dtime": "2024-01-01 02:00:00", "module": null});
        let rec = EventRecord::from_document(&doc, Some("row-7".into())).unwrap();
        assert_eq!(rec.id.as_deref(), Some("row-7"));
        assert_eq!(rec.module, None);
        assert_eq!(rec.category(Dimension::Module), NULL_SENTINEL);
        assert_eq!(rec.category(Dimension::Repo), NULL_SENTINEL);
    }

    #[test]
    fn test_category_aliases_index_key_value() {
        let rec = EventRecord::at(NaiveDateTime::default())
            .with(Dimension::Module, "module_index")
            .with(Dimension::Label, "module_index");
        assert_eq!(rec.category(Dimension::Module), "module_index_value");
        // Only the table's own index key is reserved.
        assert_eq!(rec.category(Dimension::Label), "module_index");
    }

    #[test]
    fn test_from_document_stringifies_non_strings() {
        let doc = json!({"dtime": "2024-01-01", "module": 7, "_label": true, "method": 1.5, "repo": ["a"]});
        let rec = EventRecord::from_document(&doc, None).unwrap();
        assert_eq!(rec.value(Dimension::Module), Some("7"));
        assert_eq!(rec.value(Dimension::Label), Some("true"));
        assert_eq!(rec.value(Dimension::Method), Some("1.5"));
        assert_eq!(rec.value(Dimension::Repo), Some("[\"a\"]"));
    }

    #[test]
    fn test_from_document_extended_json_dates() {
        let expected = ts("2024-01-01 01:00:00");
        let millis = expected.and_utc().timestamp_millis();

        let doc = json!({"dtime": {"$date": "2024-01-01T01:00:00Z"}});
        assert_eq!(EventRecord::from_document(&doc, None).unwrap().dtime, expected);

        let doc = json!({"dtime": {"$date": millis}});
        assert_eq!(EventRecord::from_document(&doc, None).unwrap().dtime, expected);

        let doc = json!({"dtime": {"$date": {"$numberLong": millis.to_string()}}});
        assert_eq!(EventRecord::from_document(&doc, None).unwrap().dtime, expected);

        let doc = json!({"dtime": expected.and_utc().timestamp()});
        assert_eq!(EventRecord::from_document(&doc, None).unwrap().dtime, expected);
    }

    #[test]
    fn test_from_document_errors() {
        assert_eq!(
            EventRecord::from_document(&json!({"module": "A"}), None),
            Err(RecordError::MissingTimestamp)
        );
        assert_eq!(
            EventRecord::from_document(&json!({"dtime": null}), None),
            Err(RecordError::MissingTimestamp)
        );
        assert!(matches!(
            EventRecord::from_document(&json!({"dtime": "soon"}), None),
            Err(RecordError::BadTimestamp { .. })
        ));
        assert!(matches!(
            EventRecord::from_document(&json!({"dtime": {"$date": false}}), None),
            Err(RecordError::BadTimestamp { .. })
        ));
        assert_eq!(
            EventRecord::from_document(&json!([1, 2]), None),
            Err(RecordError::NotAnObject)
        );
    }

    #[test]
    fn test_numeric_document_id() {
        let doc = json!({"_id": 42, "dtime": "2024-01-01"});
        let rec = EventRecord::from_document(&doc, Some("fallback".into())).unwrap();
        assert_eq!(rec.id.as_deref(), Some("42"));
    }
}
