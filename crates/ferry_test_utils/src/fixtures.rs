//! Fixture builders.

use ferry_protocol::{DataDictionary, DictionaryField, Record};

/// Dictionary from `(field, form)` pairs; labels repeat the field name.
pub fn dictionary(fields: &[(&str, &str)]) -> DataDictionary {
    DataDictionary::new(
        fields
            .iter()
            .map(|(field, form)| DictionaryField {
                field_name: field.to_string(),
                form_name: form.to_string(),
                field_label: field.to_string(),
                field_type: "text".to_string(),
            })
            .collect(),
    )
}

/// `n` records with `record_id` = 1..=n, each passed through `fill`.
pub fn numbered_records<F>(n: usize, fill: F) -> Vec<Record>
where
    F: Fn(usize, Record) -> Record,
{
    (1..=n)
        .map(|i| fill(i, Record::new().with("record_id", i.to_string())))
        .collect()
}

/// Event definitions document for the given unique event names.
pub fn events(names: &[&str]) -> serde_json::Value {
    serde_json::Value::Array(
        names
            .iter()
            .map(|name| {
                serde_json::json!({
                    "event_name": name,
                    "arm_num": 1,
                    "unique_event_name": format!("{}_arm_1", name),
                })
            })
            .collect(),
    )
}

pub fn arms(count: usize) -> serde_json::Value {
    serde_json::Value::Array(
        (1..=count)
            .map(|n| serde_json::json!({"arm_num": n, "name": format!("Arm {}", n)}))
            .collect(),
    )
}
