//! Form-encoded request parameters for the project API.

use ferry_protocol::RecordQuery;

/// Ordered `key=value` pairs of one API request.
///
/// List parameters are indexed the way the API expects: `forms[0]`, `forms[1]`, ...
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Params {
    pairs: Vec<(String, String)>,
}

impl Params {
    pub fn new(token: &str, content: &str) -> Self {
        let mut params = Self { pairs: Vec::new() };
        params.set("token", token);
        params.set("content", content);
        params.set("format", "json");
        params.set("returnFormat", "json");
        params
    }

    /// Set `key`, replacing any previous value.
    pub fn set(&mut self, key: &str, value: impl Into<String>) -> &mut Self {
        let value = value.into();
        match self.pairs.iter_mut().find(|(k, _)| k == key) {
            Some(pair) => pair.1 = value,
            None => self.pairs.push((key.to_string(), value)),
        }
        self
    }

    pub fn list<I, S>(&mut self, key: &str, values: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for (i, value) in values.into_iter().enumerate() {
            self.set(&format!("{}[{}]", key, i), value);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn pairs(&self) -> &[(String, String)] {
        &self.pairs
    }

    /// Record export parameters for `query`.
    ///
    /// When only some forms or events are requested the primary key is added
    /// as an explicit field, otherwise the export would not carry it.
    pub fn record_export(token: &str, primary_key: &str, query: &RecordQuery) -> Self {
        let mut params = Self::new(token, "record");
        params.set("action", "export").set("type", "flat");

        if let Some(ids) = &query.ids {
            params.list("records", ids.iter().map(|id| id.as_str().to_string()));
        }
        if let Some(forms) = query.forms.as_deref().filter(|f| !f.is_empty()) {
            params.list("forms", forms.iter().cloned());
        }
        if let Some(events) = query.events.as_deref().filter(|e| !e.is_empty()) {
            params.list("events", events.iter().cloned());
        }
        if let Some(filter) = &query.filter_logic {
            params.set("filterLogic", filter.as_str());
        }
        if query.is_partial() {
            params.set("fields[0]", primary_key);
        }
        params
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_protocol::RecordId;

    #[test]
    fn test_base_params() {
        let params = Params::new("secret", "arm");
        assert_eq!(params.get("token"), Some("secret"));
        assert_eq!(params.get("content"), Some("arm"));
        assert_eq!(params.get("format"), Some("json"));
    }

    #[test]
    fn test_indexed_lists() {
        let mut params = Params::new("t", "metadata");
        params.list("forms", ["demographics", "vitals"]);
        assert_eq!(params.get("forms[0]"), Some("demographics"));
        assert_eq!(params.get("forms[1]"), Some("vitals"));
    }

    #[test]
    fn test_record_export_adds_primary_key_for_subsets() {
        let query = RecordQuery::all()
            .with_ids(vec![RecordId::from("1"), RecordId::from("2")])
            .with_forms(Some(vec!["vitals".to_string()]));
        let params = Params::record_export("t", "record_id", &query);
        assert_eq!(params.get("records[1]"), Some("2"));
        assert_eq!(params.get("forms[0]"), Some("vitals"));
        assert_eq!(params.get("fields[0]"), Some("record_id"));

        let params = Params::record_export("t", "record_id", &RecordQuery::all());
        assert_eq!(params.get("fields[0]"), None);
        assert_eq!(params.get("records[0]"), None);
    }

    #[test]
    fn test_set_replaces() {
        let mut params = Params::new("t", "record");
        params.set("format", "csv");
        assert_eq!(params.get("format"), Some("csv"));
        assert_eq!(params.pairs().iter().filter(|(k, _)| k == "format").count(), 1);
    }
}
