//! Compiled rule schema.
//!
//! A rule document maps field names to field definitions. Definitions are
//! compiled once, at load time, so structural problems (an unknown rule key,
//! a conditional without `then`) surface before any record is evaluated.

use crate::rule::{Conditional, Dependency, Rule};
use crate::types::{DeclaredType, TypedRecord};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use thiserror::Error;

/// Structural errors in a rule document.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("rule document must be an object mapping field names to definitions")]
    DocumentNotObject,

    #[error("definition for field '{field}' must be an object")]
    DefinitionNotObject { field: String },

    #[error("unknown rule '{rule}' for field '{field}'")]
    UnknownRule { field: String, rule: String },

    #[error("invalid '{rule}' for field '{field}': {reason}")]
    InvalidRule {
        field: String,
        rule: String,
        reason: String,
    },

    #[error("constraint for field '{field}' is missing '{part}'")]
    IncompleteConstraint { field: String, part: &'static str },

    #[error("in rules for form '{form}': {source}")]
    Form {
        form: String,
        #[source]
        source: Box<SchemaError>,
    },
}

impl SchemaError {
    pub fn in_form(self, form: impl Into<String>) -> Self {
        SchemaError::Form {
            form: form.into(),
            source: Box::new(self),
        }
    }
}

/// Declared type, ordered rules and optional custom message for one field.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FieldRules {
    pub name: String,
    pub declared_type: DeclaredType,
    pub rules: Vec<Rule>,
    pub error_message: Option<String>,
}

impl FieldRules {
    pub fn compile(name: &str, definition: &Value) -> Result<Self, SchemaError> {
        let object = definition
            .as_object()
            .ok_or_else(|| SchemaError::DefinitionNotObject {
                field: name.to_string(),
            })?;

        let compiled = compile_definition(name, object)?;
        Ok(Self {
            name: name.to_string(),
            declared_type: compiled.declared_type,
            rules: compiled.rules,
            error_message: compiled.error_message,
        })
    }

    /// All violations for this field in rule-declaration order.
    pub fn evaluate(&self, record: &TypedRecord) -> Vec<String> {
        let value = record.get(&self.name);
        let mut errors = Vec::new();
        for rule in &self.rules {
            rule.apply(&self.name, value, record, &mut errors);
        }

        match &self.error_message {
            Some(message) if !errors.is_empty() => vec![format!("{}: {}", self.name, message)],
            _ => errors,
        }
    }
}

struct Compiled {
    declared_type: DeclaredType,
    rules: Vec<Rule>,
    error_message: Option<String>,
}

fn compile_definition(field: &str, object: &Map<String, Value>) -> Result<Compiled, SchemaError> {
    let mut compiled = Compiled {
        declared_type: DeclaredType::default(),
        rules: Vec::new(),
        error_message: None,
    };
    let mut range_done = false;

    for (key, value) in object {
        match key.as_str() {
            "type" => {
                let ty = value
                    .as_str()
                    .ok_or_else(|| invalid(field, key, "expected a type name"))?
                    .parse::<DeclaredType>()
                    .map_err(|reason| invalid(field, key, reason))?;
                compiled.declared_type = ty;
                if ty != DeclaredType::String {
                    compiled.rules.push(Rule::TypeMatch(ty));
                }
            }
            "filled" => {
                let filled = value
                    .as_bool()
                    .ok_or_else(|| invalid(field, key, "expected true or false"))?;
                compiled.rules.push(Rule::Presence { filled });
            }
            "min" | "max" => {
                if range_done {
                    continue;
                }
                range_done = true;
                let max = match object.get("max") {
                    Some(max) => number(field, "max", max)?,
                    None => return Err(invalid(field, "min", "a minimum requires a maximum")),
                };
                match object.get("min") {
                    Some(min) => {
                        let min = number(field, "min", min)?;
                        if min > max {
                            return Err(invalid(
                                field,
                                "min",
                                format!("minimum {} is greater than maximum {}", min, max),
                            ));
                        }
                        compiled.rules.push(Rule::NumericRange { min, max });
                    }
                    None => compiled.rules.push(Rule::MaxValue { max }),
                }
            }
            "constraints" => {
                let entries = value
                    .as_array()
                    .ok_or_else(|| invalid(field, key, "expected a list"))?;
                for entry in entries {
                    compiled
                        .rules
                        .push(Rule::Conditional(compile_constraint(field, entry)?));
                }
            }
            "meta" => {
                let message = value
                    .get("errmsg")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid(field, key, "expected an object with 'errmsg'"))?;
                compiled.error_message = Some(message.to_string());
            }
            other => {
                return Err(SchemaError::UnknownRule {
                    field: field.to_string(),
                    rule: other.to_string(),
                })
            }
        }
    }

    Ok(compiled)
}

fn compile_constraint(field: &str, entry: &Value) -> Result<Conditional, SchemaError> {
    let entry = entry
        .as_object()
        .ok_or_else(|| invalid(field, "constraints", "each constraint must be an object"))?;

    let when = entry
        .get("if")
        .ok_or_else(|| SchemaError::IncompleteConstraint {
            field: field.to_string(),
            part: "if",
        })?;
    let then = entry
        .get("then")
        .ok_or_else(|| SchemaError::IncompleteConstraint {
            field: field.to_string(),
            part: "then",
        })?;
    if let Some(extra) = entry.keys().find(|k| *k != "if" && *k != "then") {
        return Err(SchemaError::UnknownRule {
            field: field.to_string(),
            rule: format!("constraints.{}", extra),
        });
    }

    let when = when
        .as_object()
        .ok_or_else(|| invalid(field, "if", "expected an object of field conditions"))?;
    if when.is_empty() {
        return Err(invalid(field, "if", "no conditions given"));
    }

    let mut dependencies = Vec::with_capacity(when.len());
    for (dep_field, definition) in when {
        let definition = definition
            .as_object()
            .ok_or_else(|| SchemaError::DefinitionNotObject {
                field: dep_field.clone(),
            })?;
        dependencies.push(Dependency {
            field: dep_field.clone(),
            rules: compile_definition(dep_field, definition)?.rules,
        });
    }

    let then = then
        .as_object()
        .ok_or_else(|| invalid(field, "then", "expected a field definition"))?;

    Ok(Conditional {
        when: dependencies,
        then: compile_definition(field, then)?.rules,
    })
}

fn number(field: &str, rule: &str, value: &Value) -> Result<f64, SchemaError> {
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(field, rule, format!("expected a number, got {}", value)))
}

fn invalid(field: &str, rule: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::InvalidRule {
        field: field.to_string(),
        rule: rule.to_string(),
        reason: reason.into(),
    }
}

/// Flat mapping from field name to its compiled rules.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSchema {
    fields: BTreeMap<String, FieldRules>,
}

impl RuleSchema {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compile one rule document.
    pub fn from_document(document: &Value) -> Result<Self, SchemaError> {
        let object = document.as_object().ok_or(SchemaError::DocumentNotObject)?;
        let mut schema = Self::new();
        for (name, definition) in object {
            schema.insert(FieldRules::compile(name, definition)?);
        }
        Ok(schema)
    }

    /// Merge `other` into `self`. Fields present in both take `other`'s definition.
    pub fn merge(&mut self, other: RuleSchema) {
        self.fields.extend(other.fields);
    }

    pub fn insert(&mut self, field: FieldRules) {
        self.fields.insert(field.name.clone(), field);
    }

    pub fn get(&self, field: &str) -> Option<&FieldRules> {
        self.fields.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    /// Declared type of `field`; undeclared fields are strings.
    pub fn declared_type(&self, field: &str) -> DeclaredType {
        self.fields
            .get(field)
            .map(|f| f.declared_type)
            .unwrap_or_default()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldRules> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compile_in_declaration_order() {
        let field = FieldRules::compile(
            "age",
            &json!({"type": "integer", "filled": true, "min": 0, "max": 120}),
        )
        .unwrap();
        assert_eq!(field.declared_type, DeclaredType::Int);
        assert_eq!(
            field.rules,
            vec![
                Rule::TypeMatch(DeclaredType::Int),
                Rule::Presence { filled: true },
                Rule::NumericRange { min: 0.0, max: 120.0 },
            ]
        );
    }

    #[test]
    fn test_max_alone_is_max_value() {
        let field = FieldRules::compile("score", &json!({"max": "10"})).unwrap();
        assert_eq!(field.declared_type, DeclaredType::String);
        assert_eq!(field.rules, vec![Rule::MaxValue { max: 10.0 }]);
    }

    #[test]
    fn test_min_alone_is_rejected() {
        let err = FieldRules::compile("score", &json!({"min": 1})).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRule { ref rule, .. } if rule == "min"));
    }

    #[test]
    fn test_min_above_max_is_rejected() {
        assert!(FieldRules::compile("score", &json!({"min": 9, "max": 1})).is_err());
    }

    #[test]
    fn test_unknown_rule_and_type() {
        let err = FieldRules::compile("x", &json!({"pattern": "^a"})).unwrap_err();
        assert!(matches!(err, SchemaError::UnknownRule { .. }));
        let err = FieldRules::compile("x", &json!({"type": "decimal"})).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidRule { .. }));
    }

    #[test]
    fn test_constraint_missing_parts() {
        let err = FieldRules::compile(
            "x",
            &json!({"constraints": [{"if": {"y": {"filled": true}}}]}),
        )
        .unwrap_err();
        assert!(matches!(err, SchemaError::IncompleteConstraint { part: "then", .. }));

        let err = FieldRules::compile("x", &json!({"constraints": [{"then": {"filled": true}}]}))
            .unwrap_err();
        assert!(matches!(err, SchemaError::IncompleteConstraint { part: "if", .. }));
    }

    #[test]
    fn test_compile_conditional() {
        let field = FieldRules::compile(
            "packs",
            &json!({
                "type": "integer",
                "constraints": [
                    {"if": {"smoker": {"min": 1, "max": 1}}, "then": {"filled": true, "max": 10}}
                ]
            }),
        )
        .unwrap();
        assert_eq!(field.rules.len(), 2);
        match &field.rules[1] {
            Rule::Conditional(c) => {
                assert_eq!(c.when[0].field, "smoker");
                assert_eq!(c.when[0].rules, vec![Rule::NumericRange { min: 1.0, max: 1.0 }]);
                assert_eq!(
                    c.then,
                    vec![Rule::Presence { filled: true }, Rule::MaxValue { max: 10.0 }]
                );
            }
            other => panic!("expected conditional, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_error_message() {
        let field = FieldRules::compile(
            "weight",
            &json!({"type": "float", "min": 1, "max": 300, "meta": {"errmsg": "weight in kg"}}),
        )
        .unwrap();
        let record = ferry_protocol::Record::new().with("weight", "500");
        let typed = TypedRecord::cast(&record, |_| DeclaredType::Float);
        assert_eq!(field.evaluate(&typed), vec!["weight: weight in kg"]);
    }

    #[test]
    fn test_custom_error_message_once_per_field() {
        let field = FieldRules::compile(
            "weight",
            &json!({"type": "float", "min": 1, "max": 300, "meta": {"errmsg": "weight in kg"}}),
        )
        .unwrap();
        // Fails both the type and the range check.
        let record = ferry_protocol::Record::new().with("weight", "heavy");
        let typed = TypedRecord::cast(&record, |_| DeclaredType::Float);
        assert_eq!(field.evaluate(&typed), vec!["weight: weight in kg"]);

        let record = ferry_protocol::Record::new().with("weight", "70");
        let typed = TypedRecord::cast(&record, |_| DeclaredType::Float);
        assert!(field.evaluate(&typed).is_empty());
    }

    #[test]
    fn test_merge_last_wins() {
        let mut a = RuleSchema::from_document(&json!({"x": {"filled": true}, "y": {}})).unwrap();
        let b = RuleSchema::from_document(&json!({"x": {"max": 5}})).unwrap();
        a.merge(b);
        assert_eq!(a.len(), 2);
        assert_eq!(a.get("x").unwrap().rules, vec![Rule::MaxValue { max: 5.0 }]);
    }

    #[test]
    fn test_document_must_be_object() {
        assert!(matches!(
            RuleSchema::from_document(&json!(["x"])),
            Err(SchemaError::DocumentNotObject)
        ));
    }
}
