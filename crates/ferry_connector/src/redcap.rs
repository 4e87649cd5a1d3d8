//! HTTP implementation of [`ProjectConnector`].

use crate::params::Params;
use crate::ProjectConnector;
use ferry_protocol::{
    ConnectorError, ConnectorResult, DataDictionary, FormInfo, ProjectInfo, Record, RecordId,
    RecordQuery,
};
use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;
use std::fmt;
use std::time::Duration;
use tracing::{debug, error, info};
use url::Url;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Connection to one project over its HTTP API.
pub struct RedcapConnector {
    client: Client,
    url: Url,
    token: String,
    project: ProjectInfo,
    primary_key: String,
}

impl fmt::Debug for RedcapConnector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedcapConnector")
            .field("url", &self.url.as_str())
            .field("project_id", &self.project.project_id)
            .field("primary_key", &self.primary_key)
            .finish()
    }
}

#[derive(Debug, serde::Deserialize)]
struct ExportFieldName {
    export_field_name: String,
}

impl RedcapConnector {
    /// Connect and capture project information and the primary key.
    pub fn connect(url: &Url, token: &str) -> ConnectorResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ConnectorError::transport("build HTTP client", e))?;
        Self::connect_with_client(client, url, token)
    }

    pub fn connect_with_client(client: Client, url: &Url, token: &str) -> ConnectorResult<Self> {
        let mut connector = Self {
            client,
            url: url.clone(),
            token: token.to_string(),
            project: ProjectInfo::default(),
            primary_key: String::new(),
        };

        connector.project =
            connector.post_json("export project information", &Params::new(token, "project"))?;

        let fields: Vec<ExportFieldName> = connector.post_json(
            "export the project primary key",
            &Params::new(token, "exportFieldNames"),
        )?;
        connector.primary_key = fields
            .into_iter()
            .next()
            .map(|f| f.export_field_name)
            .ok_or_else(|| ConnectorError::empty("export the project primary key"))?;

        info!(
            "Connected to project {} '{}' at {} (primary key '{}')",
            connector.project.project_id,
            connector.project.project_title,
            connector.url,
            connector.primary_key
        );
        Ok(connector)
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    fn post(&self, operation: &str, params: &Params) -> ConnectorResult<String> {
        debug!("POST {} ({})", self.url, operation);
        let response = self
            .client
            .post(self.url.clone())
            .form(params.pairs())
            .send()
            .map_err(|e| {
                error!("Failed to {}: {}", operation, e);
                ConnectorError::transport(operation, e)
            })?;

        let status = response.status();
        let body = response.text().map_err(|e| {
            error!("Failed to read response to {}: {}", operation, e);
            ConnectorError::transport(operation, e)
        })?;

        if !status.is_success() {
            let reason = status.canonical_reason().unwrap_or_default().to_string();
            error!("Failed to {}", operation);
            info!("HTTP Status: {} {} : {}", status.as_u16(), reason, body);
            return Err(ConnectorError::Status {
                operation: operation.to_string(),
                status: status.as_u16(),
                reason,
                body,
            });
        }

        Ok(body)
    }

    fn post_json<T: DeserializeOwned>(&self, operation: &str, params: &Params) -> ConnectorResult<T> {
        let body = self.post(operation, params)?;
        parse_json(operation, &body)
    }
}

pub(crate) fn parse_json<T: DeserializeOwned>(operation: &str, body: &str) -> ConnectorResult<T> {
    if body.trim().is_empty() {
        return Err(ConnectorError::empty(operation));
    }
    serde_json::from_str(body).map_err(|e| {
        error!("Error in parsing the response to {}: {}", operation, e);
        ConnectorError::malformed(operation, e)
    })
}

/// Distinct primary key values, first occurrence order.
pub(crate) fn distinct_ids(rows: &[Record], primary_key: &str) -> Vec<RecordId> {
    let mut seen = HashSet::new();
    rows.iter()
        .filter_map(|row| row.record_id(primary_key))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Count from an import response: `{"count": N}` with N a number or numeric string.
pub(crate) fn parse_import_count(operation: &str, body: &str) -> ConnectorResult<usize> {
    let value: Value = parse_json(operation, body)?;
    let count = match value.get("count") {
        Some(Value::Number(n)) => n.as_u64(),
        Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    count
        .map(|c| c as usize)
        .ok_or_else(|| ConnectorError::malformed(operation, format!("no count in '{}'", body)))
}

pub(crate) fn parse_plain_count(operation: &str, body: &str) -> ConnectorResult<usize> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ConnectorError::empty(operation));
    }
    trimmed
        .parse::<usize>()
        .map_err(|_| ConnectorError::malformed(operation, format!("expected a count, got '{}'", trimmed)))
}

impl ProjectConnector for RedcapConnector {
    fn primary_key(&self) -> &str {
        &self.primary_key
    }

    fn project_info(&self) -> &ProjectInfo {
        &self.project
    }

    fn export_schema(&self, forms: Option<&[String]>) -> ConnectorResult<DataDictionary> {
        const OP: &str = "export the data dictionary";
        let mut params = Params::new(&self.token, "metadata");
        if let Some(forms) = forms.filter(|f| !f.is_empty()) {
            params.list("forms", forms.iter().cloned());
        }
        let value: Value = self.post_json(OP, &params)?;
        DataDictionary::from_value(&value).map_err(|e| ConnectorError::malformed(OP, e))
    }

    fn export_forms(&self) -> ConnectorResult<Vec<FormInfo>> {
        self.post_json(
            "export data entry forms list",
            &Params::new(&self.token, "instrument"),
        )
    }

    fn export_arms(&self) -> ConnectorResult<Value> {
        self.post_json("export arms definitions", &Params::new(&self.token, "arm"))
    }

    fn export_events(&self) -> ConnectorResult<Value> {
        self.post_json("export events definitions", &Params::new(&self.token, "event"))
    }

    fn export_form_event_mappings(&self) -> ConnectorResult<Value> {
        self.post_json(
            "export the form - event mappings",
            &Params::new(&self.token, "formEventMapping"),
        )
    }

    fn export_repeating_instruments(&self) -> ConnectorResult<Value> {
        self.post_json(
            "export the repeating instruments definitions",
            &Params::new(&self.token, "repeatingFormsEvents"),
        )
    }

    fn export_record_ids(
        &self,
        forms: Option<&[String]>,
        events: Option<&[String]>,
    ) -> ConnectorResult<Vec<RecordId>> {
        const OP: &str = "retrieve the record IDs";
        let mut params = Params::new(&self.token, "record");
        params
            .set("action", "export")
            .set("type", "flat")
            .set("fields[0]", self.primary_key.as_str());
        if let Some(forms) = forms.filter(|f| !f.is_empty()) {
            params.list("forms", forms.iter().cloned());
        }
        if let Some(events) = events.filter(|e| !e.is_empty()) {
            params.list("events", events.iter().cloned());
        }

        let rows: Vec<Record> = self.post_json(OP, &params)?;
        info!("Total number of instances - {}", rows.len());
        Ok(distinct_ids(&rows, &self.primary_key))
    }

    fn export_records(&self, query: &RecordQuery) -> ConnectorResult<Vec<Record>> {
        let params = Params::record_export(&self.token, &self.primary_key, query);
        self.post_json("export records", &params)
    }

    fn import_records(&self, records: &[Record]) -> ConnectorResult<usize> {
        const OP: &str = "import records";
        let data = serde_json::to_string(records).map_err(|e| ConnectorError::malformed(OP, e))?;
        let mut params = Params::new(&self.token, "record");
        params
            .set("action", "import")
            .set("type", "flat")
            .set("overwriteBehavior", "normal")
            .set("forceAutoNumber", "false")
            .set("returnContent", "count")
            .set("data", data);

        let body = self.post(OP, &params)?;
        parse_import_count(OP, &body)
    }

    fn delete_records(&self, ids: &[RecordId]) -> ConnectorResult<usize> {
        const OP: &str = "delete records";
        let mut params = Params::new(&self.token, "record");
        params
            .set("action", "delete")
            .list("records", ids.iter().map(|id| id.as_str().to_string()));

        let body = self.post(OP, &params)?;
        parse_plain_count(OP, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distinct_ids_keep_first_occurrence() {
        let rows = vec![
            Record::new().with("record_id", "3").with("redcap_event_name", "baseline"),
            Record::new().with("record_id", "1"),
            Record::new().with("record_id", "3").with("redcap_event_name", "followup"),
            Record::new().with("other", "x"),
        ];
        let ids = distinct_ids(&rows, "record_id");
        assert_eq!(ids, vec![RecordId::from("3"), RecordId::from("1")]);
    }

    #[test]
    fn test_import_count_number_or_string() {
        assert_eq!(parse_import_count("import", r#"{"count": 4}"#).unwrap(), 4);
        assert_eq!(parse_import_count("import", r#"{"count": "12"}"#).unwrap(), 12);
        assert!(matches!(
            parse_import_count("import", r#"{"error": "x"}"#),
            Err(ConnectorError::Malformed { .. })
        ));
        assert!(matches!(
            parse_import_count("import", "  "),
            Err(ConnectorError::Empty { .. })
        ));
    }

    #[test]
    fn test_plain_count() {
        assert_eq!(parse_plain_count("delete", "7\n").unwrap(), 7);
        assert!(parse_plain_count("delete", "").is_err());
        assert!(parse_plain_count("delete", "seven").is_err());
    }

    #[test]
    fn test_parse_json_reports_malformed() {
        let err = parse_json::<Vec<Record>>("export records", "<html>").unwrap_err();
        assert_eq!(err.operation(), "export records");
        assert!(matches!(err, ConnectorError::Malformed { .. }));
    }

    #[test]
    fn test_connect_to_unreachable_host_is_transport_error() {
        let client = Client::builder()
            .timeout(Duration::from_millis(200))
            .build()
            .unwrap();
        let url = Url::parse("http://127.0.0.1:9/api/").unwrap();
        let err = RedcapConnector::connect_with_client(client, &url, "token").unwrap_err();
        assert!(matches!(err, ConnectorError::Transport { .. }));
    }
}
