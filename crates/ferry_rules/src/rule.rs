//! The fixed rule vocabulary.

use crate::types::{Cast, DeclaredType, Numeric, TypedRecord};
use std::fmt;

/// A single constraint on one field.
///
/// Rules are pure: the outcome depends only on the field name, its cast
/// value and, for [`Rule::Conditional`], the rest of the typed record.
#[derive(Debug, Clone, PartialEq)]
pub enum Rule {
    /// `filled = true` requires a value, `filled = false` forbids one.
    Presence { filled: bool },
    TypeMatch(DeclaredType),
    /// Inclusive on both ends.
    NumericRange { min: f64, max: f64 },
    MaxValue { max: f64 },
    Conditional(Conditional),
}

/// `if` every dependency holds, `then` the nested rules apply to the field itself.
#[derive(Debug, Clone, PartialEq)]
pub struct Conditional {
    pub when: Vec<Dependency>,
    pub then: Vec<Rule>,
}

/// Rules another field must satisfy for a conditional to be in force.
#[derive(Debug, Clone, PartialEq)]
pub struct Dependency {
    pub field: String,
    pub rules: Vec<Rule>,
}

impl Rule {
    /// Evaluate against `value`, appending one message per violation.
    pub fn apply(&self, field: &str, value: &Cast, record: &TypedRecord, errors: &mut Vec<String>) {
        match self {
            Rule::Presence { filled: true } => {
                if value.is_absent() {
                    errors.push(format!("Field \"{}\" cannot be empty", field));
                }
            }
            Rule::Presence { filled: false } => {
                if !value.is_absent() {
                    errors.push(format!(
                        "Field \"{}\" must be empty, current value - {}",
                        field, value
                    ));
                }
            }
            Rule::TypeMatch(ty) => {
                if !ty.accepts(value) {
                    errors.push(format!(
                        "Type check failed for the field \"{}\": current value - {}, expected type - {}",
                        field, value, ty
                    ));
                }
            }
            Rule::NumericRange { min, max } => {
                let expected = format!("expected range - [{} - {}]", min, max);
                match value.numeric() {
                    Numeric::Absent => {}
                    Numeric::Number(v) if *min <= v && v <= *max => {}
                    Numeric::Number(_) => errors.push(format!(
                        "Range check failed for the field \"{}\": current value - {}, {}",
                        field, value, expected
                    )),
                    Numeric::NotNumeric => errors.push(format!(
                        "Range check failed for the field \"{}\": current value - {} {}, {}",
                        field,
                        value,
                        not_numeric(value),
                        expected
                    )),
                }
            }
            Rule::MaxValue { max } => match value.numeric() {
                Numeric::Absent => {}
                Numeric::Number(v) if v <= *max => {}
                Numeric::Number(_) => errors.push(format!(
                    "Max value check failed for the field \"{}\": current value - {}, maximum allowed - {}",
                    field, value, max
                )),
                Numeric::NotNumeric => errors.push(format!(
                    "Max value check failed for the field \"{}\": current value - {} {}, maximum allowed - {}",
                    field,
                    value,
                    not_numeric(value),
                    max
                )),
            },
            Rule::Conditional(conditional) => conditional.apply(field, value, record, errors),
        }
    }

    /// True when `value` violates nothing.
    pub fn holds(&self, field: &str, value: &Cast, record: &TypedRecord) -> bool {
        let mut errors = Vec::new();
        self.apply(field, value, record, &mut errors);
        errors.is_empty()
    }
}

fn not_numeric(value: &Cast) -> &'static str {
    match value {
        Cast::Unparsable(_) => "could not be parsed as a number",
        _ => "is not a number",
    }
}

impl Conditional {
    /// Every dependency holds against the current record.
    ///
    /// A blank dependency field satisfies only a dependency that asks for it
    /// to be empty; other rules never match a value that is not there.
    pub fn in_force(&self, record: &TypedRecord) -> bool {
        self.when.iter().all(|dep| dep.holds(record))
    }

    fn apply(&self, field: &str, value: &Cast, record: &TypedRecord, errors: &mut Vec<String>) {
        if !self.in_force(record) {
            return;
        }

        let mut violations = Vec::new();
        for rule in &self.then {
            rule.apply(field, value, record, &mut violations);
        }
        if violations.is_empty() {
            return;
        }

        let conditions = self
            .when
            .iter()
            .map(|dep| format!("{}: {}", dep.field, join_rules(&dep.rules)))
            .collect::<Vec<_>>()
            .join("; ");
        errors.extend(
            violations
                .into_iter()
                .map(|msg| format!("{} (conditions in force: {})", msg, conditions)),
        );
    }
}

impl Dependency {
    fn holds(&self, record: &TypedRecord) -> bool {
        let value = record.get(&self.field);
        if value.is_absent() && !self.expects_empty() {
            return false;
        }
        self.rules.iter().all(|rule| rule.holds(&self.field, value, record))
    }

    fn expects_empty(&self) -> bool {
        self.rules.contains(&Rule::Presence { filled: false })
    }
}

fn join_rules(rules: &[Rule]) -> String {
    rules
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::Presence { filled: true } => f.write_str("filled"),
            Rule::Presence { filled: false } => f.write_str("empty"),
            Rule::TypeMatch(ty) => write!(f, "type {}", ty),
            Rule::NumericRange { min, max } => write!(f, "range [{} - {}]", min, max),
            Rule::MaxValue { max } => write!(f, "max {}", max),
            Rule::Conditional(c) => {
                let when = c
                    .when
                    .iter()
                    .map(|dep| format!("{}: {}", dep.field, join_rules(&dep.rules)))
                    .collect::<Vec<_>>()
                    .join("; ");
                write!(f, "if ({}) then ({})", when, join_rules(&c.then))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_protocol::Record;

    fn typed(fields: &[(&str, &str)]) -> TypedRecord {
        let record = fields.iter().fold(Record::new(), |r, (k, v)| r.with(*k, *v));
        TypedRecord::cast(&record, |_| DeclaredType::Int)
    }

    fn run(rule: &Rule, raw: &str) -> Vec<String> {
        let record = typed(&[("x", raw)]);
        let mut errors = Vec::new();
        rule.apply("x", record.get("x"), &record, &mut errors);
        errors
    }

    #[test]
    fn test_presence() {
        let required = Rule::Presence { filled: true };
        assert_eq!(run(&required, ""), vec!["Field \"x\" cannot be empty"]);
        assert!(run(&required, "3").is_empty());

        let forbidden = Rule::Presence { filled: false };
        assert!(run(&forbidden, "").is_empty());
        assert_eq!(
            run(&forbidden, "3"),
            vec!["Field \"x\" must be empty, current value - 3"]
        );
    }

    #[test]
    fn test_range_message() {
        let rule = Rule::NumericRange { min: 50.0, max: 90.0 };
        let errors = run(&rule, "95");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("\"x\""));
        assert!(errors[0].contains("95"));
        assert!(errors[0].contains("[50 - 90]"));
        assert!(run(&rule, "50").is_empty());
        assert!(run(&rule, "90").is_empty());
        assert!(run(&rule, "").is_empty());
    }

    #[test]
    fn test_range_fails_unparsable() {
        let rule = Rule::NumericRange { min: 1.0, max: 5.0 };
        let errors = run(&rule, "three");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("could not be parsed"));
    }

    #[test]
    fn test_max_value() {
        let rule = Rule::MaxValue { max: 10.0 };
        assert!(run(&rule, "10").is_empty());
        assert_eq!(
            run(&rule, "12"),
            vec!["Max value check failed for the field \"x\": current value - 12, maximum allowed - 10"]
        );
    }

    #[test]
    fn test_type_match_reports_raw() {
        let errors = run(&Rule::TypeMatch(DeclaredType::Int), "4.5");
        assert_eq!(
            errors,
            vec!["Type check failed for the field \"x\": current value - 4.5, expected type - integer"]
        );
    }

    #[test]
    fn test_conditional_reports_conditions() {
        let rule = Rule::Conditional(Conditional {
            when: vec![Dependency {
                field: "smoker".to_string(),
                rules: vec![Rule::NumericRange { min: 1.0, max: 1.0 }],
            }],
            then: vec![Rule::Presence { filled: true }],
        });

        let record = typed(&[("smoker", "1"), ("x", "")]);
        let mut errors = Vec::new();
        rule.apply("x", record.get("x"), &record, &mut errors);
        assert_eq!(
            errors,
            vec!["Field \"x\" cannot be empty (conditions in force: smoker: range [1 - 1])"]
        );

        let record = typed(&[("smoker", "0"), ("x", "")]);
        let mut errors = Vec::new();
        rule.apply("x", record.get("x"), &record, &mut errors);
        assert!(errors.is_empty());
    }

    #[test]
    fn test_conditional_on_missing_dependency() {
        let rule = Rule::Conditional(Conditional {
            when: vec![Dependency {
                field: "other".to_string(),
                rules: vec![Rule::Presence { filled: true }],
            }],
            then: vec![Rule::Presence { filled: true }],
        });
        assert!(run(&rule, "").is_empty());
    }

    #[test]
    fn test_conditional_on_blank_range_dependency() {
        let rule = Rule::Conditional(Conditional {
            when: vec![Dependency {
                field: "smoker".to_string(),
                rules: vec![Rule::NumericRange { min: 1.0, max: 1.0 }],
            }],
            then: vec![Rule::Presence { filled: true }],
        });

        let record = typed(&[("smoker", ""), ("x", "")]);
        let mut errors = Vec::new();
        rule.apply("x", record.get("x"), &record, &mut errors);
        assert!(errors.is_empty(), "{errors:?}");

        // Field not exported at all.
        assert!(run(&rule, "").is_empty());
    }

    #[test]
    fn test_conditional_on_dependency_required_empty() {
        let rule = Rule::Conditional(Conditional {
            when: vec![Dependency {
                field: "smoker".to_string(),
                rules: vec![Rule::Presence { filled: false }],
            }],
            then: vec![Rule::Presence { filled: true }],
        });

        let record = typed(&[("smoker", ""), ("x", "")]);
        let mut errors = Vec::new();
        rule.apply("x", record.get("x"), &record, &mut errors);
        assert_eq!(
            errors,
            vec!["Field \"x\" cannot be empty (conditions in force: smoker: empty)"]
        );

        let record = typed(&[("smoker", "1"), ("x", "")]);
        let mut errors = Vec::new();
        rule.apply("x", record.get("x"), &record, &mut errors);
        assert!(errors.is_empty());
    }
}
