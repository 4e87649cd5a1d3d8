//! Field-level metadata (data dictionary) of a project.

use crate::keys;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One variable of the data dictionary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DictionaryField {
    pub field_name: String,
    #[serde(default)]
    pub form_name: String,
    #[serde(default)]
    pub field_label: String,
    #[serde(default)]
    pub field_type: String,
}

/// Parsed data dictionary, in export order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DataDictionary {
    fields: Vec<DictionaryField>,
}

impl DataDictionary {
    pub fn new(fields: Vec<DictionaryField>) -> Self {
        Self { fields }
    }

    /// Parse the exported metadata document (a JSON array of field objects).
    pub fn from_value(value: &Value) -> Result<Self, serde_json::Error> {
        let fields = Vec::<DictionaryField>::deserialize(value)?;
        Ok(Self { fields })
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn fields(&self) -> &[DictionaryField] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&DictionaryField> {
        self.fields.iter().find(|f| f.field_name == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.field(name).is_some()
    }

    /// Form owning `name`. Completion fields (`<form>_complete`) resolve to their form.
    pub fn form_of(&self, name: &str) -> Option<&str> {
        if let Some(field) = self.field(name) {
            return Some(field.form_name.as_str());
        }
        let form = name.strip_suffix(keys::FORM_COMPLETE_SUFFIX)?;
        self.fields
            .iter()
            .find(|f| f.form_name == form)
            .map(|f| f.form_name.as_str())
    }

    pub fn label_of(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.field_label.as_str())
    }
}
