//! Declared field types and explicit typed casting.
//!
//! Casting never fails: a blank value is [`Cast::Absent`], a value that does
//! not fit its declared type is [`Cast::Unparsable`] and keeps the raw text so
//! that rules can report it.

use chrono::{NaiveDate, NaiveDateTime};
use ferry_protocol::Record;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

const DATE_FORMAT: &str = "%Y-%m-%d";
const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M:%S"];

/// Type declared for a field in a rule document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeclaredType {
    Int,
    Float,
    Bool,
    #[default]
    String,
    Date,
    Datetime,
}

impl DeclaredType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeclaredType::Int => "integer",
            DeclaredType::Float => "float",
            DeclaredType::Bool => "boolean",
            DeclaredType::String => "string",
            DeclaredType::Date => "date",
            DeclaredType::Datetime => "datetime",
        }
    }

    /// Cast a raw exported value to this type.
    pub fn cast(&self, raw: &str) -> Cast {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Cast::Absent;
        }

        let parsed = match self {
            DeclaredType::Int => trimmed.parse::<i64>().ok().map(Value::Int),
            DeclaredType::Float => trimmed
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .map(Value::Float),
            DeclaredType::Bool => parse_bool(trimmed).map(Value::Bool),
            DeclaredType::String => Some(Value::Text(raw.to_string())),
            DeclaredType::Date => NaiveDate::parse_from_str(trimmed, DATE_FORMAT)
                .ok()
                .map(Value::Date),
            DeclaredType::Datetime => DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(trimmed, fmt).ok())
                .map(Value::Datetime),
        };

        match parsed {
            Some(value) => Cast::Parsed(value),
            None => Cast::Unparsable(raw.to_string()),
        }
    }

    /// Whether a cast value satisfies this type.
    ///
    /// Absent values always do. Values parsed under another type are
    /// re-cast from their text form, so `"12"` declared as string still
    /// matches `integer` inside a conditional.
    pub fn accepts(&self, value: &Cast) -> bool {
        match value {
            Cast::Absent => true,
            Cast::Parsed(v) if v.declared_type() == *self => true,
            Cast::Parsed(v) => self.cast(&v.to_string()).is_parsed(),
            Cast::Unparsable(raw) => self.cast(raw).is_parsed(),
        }
    }
}

impl fmt::Display for DeclaredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeclaredType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "integer" | "int" => Ok(DeclaredType::Int),
            "float" | "number" => Ok(DeclaredType::Float),
            "boolean" | "bool" => Ok(DeclaredType::Bool),
            "string" | "str" => Ok(DeclaredType::String),
            "date" => Ok(DeclaredType::Date),
            "datetime" => Ok(DeclaredType::Datetime),
            other => Err(format!("unsupported type '{}'", other)),
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_lowercase().as_str() {
        "1" | "true" | "yes" | "y" | "t" => Some(true),
        "0" | "false" | "no" | "n" | "f" => Some(false),
        _ => None,
    }
}

/// A successfully cast value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bool(bool),
    Text(String),
    Date(NaiveDate),
    Datetime(NaiveDateTime),
}

impl Value {
    pub fn declared_type(&self) -> DeclaredType {
        match self {
            Value::Int(_) => DeclaredType::Int,
            Value::Float(_) => DeclaredType::Float,
            Value::Bool(_) => DeclaredType::Bool,
            Value::Text(_) => DeclaredType::String,
            Value::Date(_) => DeclaredType::Date,
            Value::Datetime(_) => DeclaredType::Datetime,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Int(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Bool(v) => write!(f, "{}", v),
            Value::Text(v) => f.write_str(v),
            Value::Date(v) => write!(f, "{}", v.format(DATE_FORMAT)),
            Value::Datetime(v) => write!(f, "{}", v.format(DATETIME_FORMATS[0])),
        }
    }
}

/// Result of casting one raw value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cast {
    /// Blank in the source. Distinct from invalid.
    Absent,
    Parsed(Value),
    /// Could not be cast to the declared type; holds the original text.
    Unparsable(String),
}

/// How a cast value looks to a numeric rule.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Numeric {
    Absent,
    Number(f64),
    NotNumeric,
}

impl Cast {
    pub fn is_absent(&self) -> bool {
        matches!(self, Cast::Absent)
    }

    pub fn is_parsed(&self) -> bool {
        matches!(self, Cast::Parsed(_))
    }

    /// Numeric view used by range rules. Unparsable values are never numbers.
    pub(crate) fn numeric(&self) -> Numeric {
        match self {
            Cast::Absent => Numeric::Absent,
            Cast::Unparsable(_) => Numeric::NotNumeric,
            Cast::Parsed(Value::Int(v)) => Numeric::Number(*v as f64),
            Cast::Parsed(Value::Float(v)) => Numeric::Number(*v),
            Cast::Parsed(Value::Text(s)) => match s.trim().parse::<f64>() {
                Ok(v) if v.is_finite() => Numeric::Number(v),
                _ => Numeric::NotNumeric,
            },
            Cast::Parsed(_) => Numeric::NotNumeric,
        }
    }
}

impl fmt::Display for Cast {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cast::Absent => Ok(()),
            Cast::Parsed(v) => write!(f, "{}", v),
            Cast::Unparsable(raw) => f.write_str(raw),
        }
    }
}

static ABSENT: Cast = Cast::Absent;

/// Private typed copy of a record. Fields missing from the record read as absent.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedRecord {
    values: BTreeMap<String, Cast>,
}

impl TypedRecord {
    /// Cast every field of `record` using `type_of` to look up declared types.
    pub fn cast<F>(record: &Record, type_of: F) -> Self
    where
        F: Fn(&str) -> DeclaredType,
    {
        let values = record
            .iter()
            .map(|(field, raw)| (field.to_string(), type_of(field).cast(raw)))
            .collect();
        Self { values }
    }

    pub fn get(&self, field: &str) -> &Cast {
        self.values.get(field).unwrap_or(&ABSENT)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Cast)> {
        self.values.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}
