//! Request and metadata types exchanged with a remote project.

use crate::record::RecordId;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Selection used when exporting records.
///
/// `None` filters mean "everything": all records, all forms, all events.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordQuery {
    pub ids: Option<Vec<RecordId>>,
    pub forms: Option<Vec<String>>,
    pub events: Option<Vec<String>>,
    /// Filter logic expression, e.g. `[visit_date] < '2024-01-01'`
    pub filter_logic: Option<String>,
}

impl RecordQuery {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_ids(mut self, ids: Vec<RecordId>) -> Self {
        self.ids = Some(ids);
        self
    }

    pub fn with_forms(mut self, forms: Option<Vec<String>>) -> Self {
        self.forms = forms;
        self
    }

    pub fn with_events(mut self, events: Option<Vec<String>>) -> Self {
        self.events = events;
        self
    }

    pub fn with_filter(mut self, filter_logic: impl Into<String>) -> Self {
        self.filter_logic = Some(filter_logic.into());
        self
    }

    /// True when only a subset of forms or events is requested.
    pub fn is_partial(&self) -> bool {
        self.forms.as_ref().is_some_and(|f| !f.is_empty())
            || self.events.as_ref().is_some_and(|e| !e.is_empty())
    }
}

/// Project-level attributes exported once per connection.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInfo {
    #[serde(default)]
    pub project_id: i64,
    #[serde(default)]
    pub project_title: String,
    #[serde(default, deserialize_with = "de_flag")]
    pub is_longitudinal: bool,
    #[serde(default, deserialize_with = "de_flag")]
    pub has_repeating_instruments_or_events: bool,
}

/// A data-entry form (instrument) of a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormInfo {
    pub instrument_name: String,
    #[serde(default)]
    pub instrument_label: String,
}

/// Project flags arrive as `0`/`1`, `"0"`/`"1"` or booleans depending on version.
fn de_flag<'de, D>(deserializer: D) -> Result<bool, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(match value {
        Value::Bool(b) => b,
        Value::Number(n) => n.as_i64().unwrap_or(0) != 0,
        Value::String(s) => matches!(s.trim(), "1" | "true" | "True" | "TRUE"),
        _ => false,
    })
}
