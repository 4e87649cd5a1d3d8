//! Rule stores and the per-form schema loader.

use crate::schema::{RuleSchema, SchemaError};
use serde_json::Value;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Source of per-form rule documents.
///
/// A missing document and a document that cannot be parsed both read as
/// `None`; the loader treats them the same way.
pub trait RuleStore {
    fn read_definition(&self, form: &str) -> Option<Value>;
}

const EXTENSIONS: [&str; 3] = ["json", "yaml", "yml"];

/// Reads `<dir>/<form>.json`, `.yaml` or `.yml`, first found wins.
#[derive(Debug, Clone)]
pub struct DirectoryRuleStore {
    dir: PathBuf,
}

impl DirectoryRuleStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn locate(&self, form: &str) -> Option<PathBuf> {
        EXTENSIONS
            .iter()
            .map(|ext| self.dir.join(format!("{}.{}", form, ext)))
            .find(|path| path.is_file())
    }
}

impl RuleStore for DirectoryRuleStore {
    fn read_definition(&self, form: &str) -> Option<Value> {
        let Some(path) = self.locate(form) else {
            debug!("No rule document for form '{}' in {}", form, self.dir.display());
            return None;
        };

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) => {
                warn!("Failed to read {}: {}", path.display(), e);
                return None;
            }
        };

        let parsed = match path.extension().and_then(|e| e.to_str()) {
            Some("json") => serde_json::from_str::<Value>(&content).map_err(|e| e.to_string()),
            _ => serde_yaml::from_str::<Value>(&content).map_err(|e| e.to_string()),
        };

        match parsed {
            Ok(value) => {
                debug!("Read rule document {}", path.display());
                Some(value)
            }
            Err(e) => {
                warn!("Failed to parse {}: {}", path.display(), e);
                None
            }
        }
    }
}

/// In-memory store, mostly for tests.
#[derive(Debug, Clone, Default)]
pub struct MemoryRuleStore {
    documents: HashMap<String, Value>,
}

impl MemoryRuleStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, form: impl Into<String>, document: Value) {
        self.documents.insert(form.into(), document);
    }

    pub fn with(mut self, form: impl Into<String>, document: Value) -> Self {
        self.insert(form, document);
        self
    }
}

impl RuleStore for MemoryRuleStore {
    fn read_definition(&self, form: &str) -> Option<Value> {
        self.documents.get(form).cloned()
    }
}

/// Merged schema plus which forms had no usable document.
#[derive(Debug, Clone, Default)]
pub struct LoadedSchema {
    pub schema: RuleSchema,
    pub all_found: bool,
    pub missing_forms: Vec<String>,
}

/// Load and merge the rule documents for `forms`, in order.
///
/// A form without a document is logged and skipped. A document that exists
/// but is structurally invalid is an error.
pub fn load_schema(store: &dyn RuleStore, forms: &[String]) -> Result<LoadedSchema, SchemaError> {
    let mut schema = RuleSchema::new();
    let mut missing_forms = Vec::new();

    for form in forms {
        let Some(document) = store.read_definition(form) else {
            warn!("Could not load rules for form '{}'", form);
            missing_forms.push(form.clone());
            continue;
        };

        let compiled = RuleSchema::from_document(&document).map_err(|e| e.in_form(form.as_str()))?;
        debug!("Form '{}' defines rules for {} fields", form, compiled.len());
        schema.merge(compiled);
    }

    info!(
        "Loaded rules for {} fields from {} of {} forms",
        schema.len(),
        forms.len() - missing_forms.len(),
        forms.len()
    );

    Ok(LoadedSchema {
        schema,
        all_found: missing_forms.is_empty(),
        missing_forms,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    #[test]
    fn test_directory_store_reads_json_and_yaml() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("vitals.json"), r#"{"weight": {"type": "float"}}"#).unwrap();
        fs::write(dir.path().join("labs.yml"), "glucose:\n  min: 50\n  max: 90\n").unwrap();

        let store = DirectoryRuleStore::new(dir.path());
        assert_eq!(
            store.read_definition("vitals"),
            Some(json!({"weight": {"type": "float"}}))
        );
        assert_eq!(
            store.read_definition("labs"),
            Some(json!({"glucose": {"min": 50, "max": 90}}))
        );
        assert_eq!(store.read_definition("absent"), None);
    }

    #[test]
    fn test_unparsable_document_reads_as_missing() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        let store = DirectoryRuleStore::new(dir.path());
        assert_eq!(store.read_definition("broken"), None);
    }

    #[test]
    fn test_load_continues_past_missing_forms() {
        let store = MemoryRuleStore::new()
            .with("a", json!({"x": {"filled": true}}))
            .with("c", json!({"y": {"max": 3}}));
        let forms = vec!["a".to_string(), "b".to_string(), "c".to_string()];

        let loaded = load_schema(&store, &forms).unwrap();
        assert!(!loaded.all_found);
        assert_eq!(loaded.missing_forms, vec!["b"]);
        assert_eq!(loaded.schema.len(), 2);
    }

    #[test]
    fn test_load_reports_form_of_structural_error() {
        let store = MemoryRuleStore::new().with("a", json!({"x": {"bogus": 1}}));
        let err = load_schema(&store, &["a".to_string()]).unwrap_err();
        assert!(matches!(err, SchemaError::Form { ref form, .. } if form == "a"));
        assert!(err.to_string().contains("bogus"));
    }

    #[test]
    fn test_load_no_forms() {
        let loaded = load_schema(&MemoryRuleStore::new(), &[]).unwrap();
        assert!(loaded.all_found);
        assert!(loaded.schema.is_empty());
    }
}
