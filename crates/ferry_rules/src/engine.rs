//! Validation engine.

use crate::datastore::Datastore;
use crate::loader::LoadedSchema;
use crate::schema::RuleSchema;
use crate::types::TypedRecord;
use ferry_protocol::Record;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;
use tracing::{debug, warn};

/// Engine construction refusals.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("strict mode requires rules for every form, missing: {}", forms.join(", "))]
    MissingDefinitions { forms: Vec<String> },

    #[error("strict mode requires rules, but none were loaded for forms: {}", forms.join(", "))]
    EmptySchema { forms: Vec<String> },
}

#[derive(Debug, Clone)]
pub struct EngineOptions {
    /// Reject fields without rules and refuse to start without every rule document.
    pub strict: bool,
    /// Fields never reported as unrecognized (identity, completion, report fields).
    pub passthrough_fields: BTreeSet<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            strict: true,
            passthrough_fields: BTreeSet::new(),
        }
    }
}

impl EngineOptions {
    pub fn strict(strict: bool) -> Self {
        Self {
            strict,
            ..Self::default()
        }
    }

    pub fn with_passthrough<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.passthrough_fields
            .extend(fields.into_iter().map(Into::into));
        self
    }
}

/// Per-field error messages for one record. Passed iff empty.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationOutcome {
    errors: BTreeMap<String, Vec<String>>,
}

impl ValidationOutcome {
    pub fn passed(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &BTreeMap<String, Vec<String>> {
        &self.errors
    }

    pub fn field_errors(&self, field: &str) -> &[String] {
        self.errors.get(field).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn error_count(&self) -> usize {
        self.errors.values().map(Vec::len).sum()
    }

    fn extend(&mut self, field: &str, messages: Vec<String>) {
        if messages.is_empty() {
            return;
        }
        self.errors
            .entry(field.to_string())
            .or_default()
            .extend(messages);
    }
}

/// Holds the merged schema and evaluates records against it.
pub struct ValidationEngine<'d> {
    schema: RuleSchema,
    options: EngineOptions,
    datastore: Option<Box<dyn Datastore + 'd>>,
}

impl<'d> ValidationEngine<'d> {
    /// Build an engine from a loaded schema.
    ///
    /// In strict mode every selected form must have had a rule document and,
    /// when forms were selected, at least one field must carry rules.
    pub fn new(
        loaded: LoadedSchema,
        forms: &[String],
        options: EngineOptions,
    ) -> Result<Self, EngineError> {
        if !loaded.all_found {
            if options.strict {
                return Err(EngineError::MissingDefinitions {
                    forms: loaded.missing_forms,
                });
            }
            warn!(
                "No rules for forms {:?}; their fields will not be validated",
                loaded.missing_forms
            );
        }

        if options.strict && !forms.is_empty() && loaded.schema.is_empty() {
            return Err(EngineError::EmptySchema {
                forms: forms.to_vec(),
            });
        }

        Ok(Self::from_schema(loaded.schema, options))
    }

    pub fn from_schema(schema: RuleSchema, options: EngineOptions) -> Self {
        Self {
            schema,
            options,
            datastore: None,
        }
    }

    pub fn with_datastore(mut self, datastore: impl Datastore + 'd) -> Self {
        self.datastore = Some(Box::new(datastore));
        self
    }

    pub fn schema(&self) -> &RuleSchema {
        &self.schema
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    /// Previous instance of `current` ordered by `order_by`, when a datastore is attached.
    pub fn previous_instance(&self, order_by: &str, current: &Record) -> Option<Record> {
        self.datastore
            .as_ref()
            .and_then(|ds| ds.previous_instance(order_by, current))
    }

    /// Typed private copy of `record`.
    pub fn cast_record(&self, record: &Record) -> TypedRecord {
        TypedRecord::cast(record, |field| self.schema.declared_type(field))
    }

    /// Evaluate every rule against `record`. The record itself is not modified.
    pub fn evaluate(&self, record: &Record) -> ValidationOutcome {
        let typed = self.cast_record(record);
        let mut outcome = ValidationOutcome::default();

        for field in self.schema.iter() {
            outcome.extend(&field.name, field.evaluate(&typed));
        }

        if self.options.strict {
            for (field, _) in record.iter() {
                if self.schema.contains(field) || self.options.passthrough_fields.contains(field) {
                    continue;
                }
                outcome.extend(field, vec![format!("Unrecognized field \"{}\"", field)]);
            }
        }

        debug!(
            "Evaluated {} fields, {} errors",
            typed.len(),
            outcome.error_count()
        );
        outcome
    }
}

impl std::fmt::Debug for ValidationEngine<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ValidationEngine")
            .field("fields", &self.schema.len())
            .field("strict", &self.options.strict)
            .field("datastore", &self.datastore.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::{load_schema, MemoryRuleStore};
    use serde_json::json;
    use std::cell::Cell;

    fn engine(document: serde_json::Value, strict: bool) -> ValidationEngine<'static> {
        let schema = RuleSchema::from_document(&document).unwrap();
        ValidationEngine::from_schema(schema, EngineOptions::strict(strict).with_passthrough(["record_id"]))
    }

    #[test]
    fn test_collects_all_violations_in_order() {
        let engine = engine(
            json!({"score": {"type": "integer", "min": 0, "max": 10, "filled": true}}),
            false,
        );
        let record = Record::new().with("score", "abc");
        let outcome = engine.evaluate(&record);
        assert!(!outcome.passed());
        let errors = outcome.field_errors("score");
        assert_eq!(errors.len(), 2);
        assert!(errors[0].starts_with("Type check failed"));
        assert!(errors[1].starts_with("Range check failed"));
    }

    #[test]
    fn test_missing_field_still_checked() {
        let engine = engine(json!({"consent": {"filled": true}}), false);
        let outcome = engine.evaluate(&Record::new().with("record_id", "1"));
        assert_eq!(outcome.field_errors("consent"), ["Field \"consent\" cannot be empty"]);
    }

    #[test]
    fn test_unknown_fields_strict_vs_lenient() {
        let record = Record::new()
            .with("record_id", "1")
            .with("age", "30")
            .with("notes", "hi");

        let lenient = engine(json!({"age": {"type": "integer"}}), false);
        assert!(lenient.evaluate(&record).passed());

        let strict = engine(json!({"age": {"type": "integer"}}), true);
        let outcome = strict.evaluate(&record);
        assert_eq!(outcome.errors().len(), 1);
        assert_eq!(outcome.field_errors("notes"), ["Unrecognized field \"notes\""]);
    }

    #[test]
    fn test_does_not_mutate_record() {
        let engine = engine(json!({"age": {"type": "integer"}}), false);
        let record = Record::new().with("age", " 30 ");
        let before = record.clone();
        engine.evaluate(&record);
        assert_eq!(record, before);
    }

    #[test]
    fn test_strict_requires_every_document() {
        let store = MemoryRuleStore::new().with("a", json!({"x": {"filled": true}}));
        let forms = vec!["a".to_string(), "b".to_string()];

        let loaded = load_schema(&store, &forms).unwrap();
        let err = ValidationEngine::new(loaded, &forms, EngineOptions::strict(true)).unwrap_err();
        assert!(matches!(err, EngineError::MissingDefinitions { ref forms } if forms == &["b"]));

        let loaded = load_schema(&store, &forms).unwrap();
        let engine = ValidationEngine::new(loaded, &forms, EngineOptions::strict(false)).unwrap();
        assert_eq!(engine.schema().len(), 1);
    }

    #[test]
    fn test_strict_rejects_empty_schema() {
        let store = MemoryRuleStore::new().with("a", json!({}));
        let forms = vec!["a".to_string()];
        let loaded = load_schema(&store, &forms).unwrap();
        let err = ValidationEngine::new(loaded, &forms, EngineOptions::default()).unwrap_err();
        assert!(matches!(err, EngineError::EmptySchema { .. }));
    }

    struct CountingStore<'a> {
        calls: &'a Cell<usize>,
    }

    impl Datastore for CountingStore<'_> {
        fn previous_instance(&self, _order_by: &str, current: &Record) -> Option<Record> {
            self.calls.set(self.calls.get() + 1);
            Some(current.clone().with("visit_date", "2024-01-01"))
        }
    }

    #[test]
    fn test_previous_instance_through_datastore() {
        let calls = Cell::new(0);
        let engine = engine(json!({}), false);
        assert!(engine.previous_instance("visit_date", &Record::new()).is_none());

        let engine = engine.with_datastore(CountingStore { calls: &calls });
        let previous = engine
            .previous_instance("visit_date", &Record::new().with("record_id", "1"))
            .unwrap();
        assert_eq!(previous.get("visit_date"), Some("2024-01-01"));
        assert_eq!(calls.get(), 1);
    }
}
