//! Raw records as exported from a project.

use crate::keys;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Value of a project's primary key field.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(String);

impl RecordId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for RecordId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// One exported row: field name -> raw string value.
///
/// In longitudinal or repeating projects a single [`RecordId`] may own several
/// rows (one per event / repeat instance); each row is a separate `Record`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Record {
    fields: BTreeMap<String, String>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert, mostly for fixtures.
    pub fn with(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(field.into(), value.into());
        self
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.fields.get(field).map(String::as_str)
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<String>) {
        self.fields.insert(field.into(), value.into());
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.fields.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Primary key value of this row, if present and non-blank.
    pub fn record_id(&self, primary_key: &str) -> Option<RecordId> {
        self.get(primary_key)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(RecordId::from)
    }

    /// Full identity of this row. `None` when the primary key is missing.
    pub fn identity(&self, primary_key: &str) -> Option<RecordIdentity> {
        let record_id = self.record_id(primary_key)?;
        Some(RecordIdentity {
            record_id,
            event_name: self.non_blank(keys::EVENT_NAME),
            repeat_instrument: self.non_blank(keys::REPEAT_INSTRUMENT),
            repeat_instance: self.non_blank(keys::REPEAT_INSTANCE),
        })
    }

    fn non_blank(&self, field: &str) -> Option<String> {
        self.get(field)
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }
}

impl<'de> Deserialize<'de> for Record {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        // Exports are string-valued, but tolerate numbers/booleans/nulls.
        let raw = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let fields = raw
            .into_iter()
            .map(|(field, value)| (field, value_to_text(value)))
            .collect();
        Ok(Self { fields })
    }
}

impl FromIterator<(String, String)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

fn value_to_text(value: Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s,
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        other => other.to_string(),
    }
}

/// Identity of one exported row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordIdentity {
    pub record_id: RecordId,
    pub event_name: Option<String>,
    pub repeat_instrument: Option<String>,
    pub repeat_instance: Option<String>,
}

impl fmt::Display for RecordIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.record_id)?;
        if let Some(ref event) = self.event_name {
            write!(f, ", event = {}", event)?;
        }
        if let Some(ref instrument) = self.repeat_instrument {
            write!(f, ", instrument = {}", instrument)?;
        }
        if let Some(ref instance) = self.repeat_instance {
            write!(f, ", instance = {}", instance)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_deserialize_tolerates_non_string_values() {
        let record: Record =
            serde_json::from_str(r#"{"record_id": 7, "flag": true, "note": null, "age": "42"}"#)
                .unwrap();
        assert_eq!(record.get("record_id"), Some("7"));
        assert_eq!(record.get("flag"), Some("true"));
        assert_eq!(record.get("note"), Some(""));
        assert_eq!(record.get("age"), Some("42"));
    }

    #[test]
    fn test_identity_skips_blank_attributes() {
        let record = Record::new()
            .with("record_id", "12")
            .with(keys::EVENT_NAME, "baseline_arm_1")
            .with(keys::REPEAT_INSTRUMENT, "")
            .with(keys::REPEAT_INSTANCE, " ");

        let identity = record.identity("record_id").unwrap();
        assert_eq!(identity.record_id, RecordId::from("12"));
        assert_eq!(identity.event_name.as_deref(), Some("baseline_arm_1"));
        assert!(identity.repeat_instrument.is_none());
        assert!(identity.repeat_instance.is_none());
        assert_eq!(identity.to_string(), "12, event = baseline_arm_1");
    }

    #[test]
    fn test_identity_requires_primary_key() {
        let record = Record::new().with("record_id", "").with("age", "3");
        assert!(record.identity("record_id").is_none());
        assert!(record.identity("missing").is_none());
    }

    #[test]
    fn test_serialize_is_flat_object() {
        let record = Record::new().with("b", "2").with("a", "1");
        let json = serde_json::to_string(&record).unwrap();
        assert_eq!(json, r#"{"a":"1","b":"2"}"#);
    }
}
