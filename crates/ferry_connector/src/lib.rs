//! Connector to a remote data-capture project.
//!
//! [`ProjectConnector`] is everything the transfer needs from a project:
//! metadata exports for the compatibility check, record identifier and
//! record exports, record import and deletion. Every call is a blocking
//! round trip and returns a [`ConnectorResult`]; a failed call never panics
//! and never returns a sentinel value.
//!
//! [`RedcapConnector`] implements it over the project's HTTP API.

mod params;
mod redcap;

pub use params::Params;
pub use redcap::RedcapConnector;

use ferry_protocol::{
    ConnectorResult, DataDictionary, FormInfo, ProjectInfo, Record, RecordId, RecordQuery,
};
use serde_json::Value;

/// Operations consumed from one project instance.
pub trait ProjectConnector {
    /// Primary key field of the project.
    fn primary_key(&self) -> &str;

    /// Project attributes captured when the connection was made.
    fn project_info(&self) -> &ProjectInfo;

    fn is_longitudinal(&self) -> bool {
        self.project_info().is_longitudinal
    }

    fn has_repeating_instruments(&self) -> bool {
        self.project_info().has_repeating_instruments_or_events
    }

    /// Data dictionary, restricted to `forms` when given.
    fn export_schema(&self, forms: Option<&[String]>) -> ConnectorResult<DataDictionary>;

    /// Data-entry forms of the project.
    fn export_forms(&self) -> ConnectorResult<Vec<FormInfo>>;

    fn export_arms(&self) -> ConnectorResult<Value>;

    fn export_events(&self) -> ConnectorResult<Value>;

    fn export_form_event_mappings(&self) -> ConnectorResult<Value>;

    fn export_repeating_instruments(&self) -> ConnectorResult<Value>;

    /// Distinct record identifiers, in export order.
    fn export_record_ids(
        &self,
        forms: Option<&[String]>,
        events: Option<&[String]>,
    ) -> ConnectorResult<Vec<RecordId>>;

    fn export_records(&self, query: &RecordQuery) -> ConnectorResult<Vec<Record>>;

    /// Import records, returning the count the project reports.
    fn import_records(&self, records: &[Record]) -> ConnectorResult<usize>;

    /// Delete whole records, returning the count the project reports.
    fn delete_records(&self, ids: &[RecordId]) -> ConnectorResult<usize>;
}

impl<T: ProjectConnector + ?Sized> ProjectConnector for &T {
    fn primary_key(&self) -> &str {
        (**self).primary_key()
    }

    fn project_info(&self) -> &ProjectInfo {
        (**self).project_info()
    }

    fn export_schema(&self, forms: Option<&[String]>) -> ConnectorResult<DataDictionary> {
        (**self).export_schema(forms)
    }

    fn export_forms(&self) -> ConnectorResult<Vec<FormInfo>> {
        (**self).export_forms()
    }

    fn export_arms(&self) -> ConnectorResult<Value> {
        (**self).export_arms()
    }

    fn export_events(&self) -> ConnectorResult<Value> {
        (**self).export_events()
    }

    fn export_form_event_mappings(&self) -> ConnectorResult<Value> {
        (**self).export_form_event_mappings()
    }

    fn export_repeating_instruments(&self) -> ConnectorResult<Value> {
        (**self).export_repeating_instruments()
    }

    fn export_record_ids(
        &self,
        forms: Option<&[String]>,
        events: Option<&[String]>,
    ) -> ConnectorResult<Vec<RecordId>> {
        (**self).export_record_ids(forms, events)
    }

    fn export_records(&self, query: &RecordQuery) -> ConnectorResult<Vec<Record>> {
        (**self).export_records(query)
    }

    fn import_records(&self, records: &[Record]) -> ConnectorResult<usize> {
        (**self).import_records(records)
    }

    fn delete_records(&self, ids: &[RecordId]) -> ConnectorResult<usize> {
        (**self).delete_records(ids)
    }
}
