//! In-memory [`ProjectConnector`] with a call log and injectable failures.

use ferry_connector::ProjectConnector;
use ferry_protocol::{
    keys, ConnectorError, ConnectorResult, DataDictionary, FormInfo, ProjectInfo, Record,
    RecordId, RecordIdentity, RecordQuery,
};
use regex::Regex;
use serde_json::Value;
use std::cell::RefCell;
use std::collections::{BTreeSet, HashSet};

/// One remote call received by a [`MemoryProject`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ExportSchema,
    ExportForms,
    ExportArms,
    ExportEvents,
    ExportFormEventMappings,
    ExportRepeatingInstruments,
    ExportRecordIds,
    ExportRecords {
        ids: Option<Vec<RecordId>>,
        filter: Option<String>,
    },
    ImportRecords {
        ids: Vec<RecordId>,
        records: Vec<Record>,
    },
    DeleteRecords {
        ids: Vec<RecordId>,
    },
}

#[derive(Debug, Default)]
struct Failures {
    /// 1-based import call numbers that fail.
    import_calls: BTreeSet<usize>,
    all_imports: bool,
    /// Import calls that succeed but report this many fewer records.
    import_shortfall: usize,
    export_records: bool,
    export_record_ids: bool,
    delete: bool,
}

#[derive(Debug, Default)]
struct State {
    rows: Vec<Record>,
    calls: Vec<Call>,
    imports: usize,
    failures: Failures,
}

/// A project held in memory.
///
/// Rows are upserted by identity (record id, event, repeat instrument,
/// repeat instance). Metadata documents that were never set fail to export.
#[derive(Debug)]
pub struct MemoryProject {
    primary_key: String,
    info: ProjectInfo,
    dictionary: DataDictionary,
    forms: Vec<FormInfo>,
    arms: Option<Value>,
    events: Option<Value>,
    form_event_mappings: Option<Value>,
    repeating_instruments: Option<Value>,
    state: RefCell<State>,
}

impl MemoryProject {
    pub fn new(primary_key: &str) -> Self {
        Self {
            primary_key: primary_key.to_string(),
            info: ProjectInfo {
                project_id: 1,
                project_title: "memory".to_string(),
                ..ProjectInfo::default()
            },
            dictionary: DataDictionary::default(),
            forms: Vec::new(),
            arms: None,
            events: None,
            form_event_mappings: None,
            repeating_instruments: None,
            state: RefCell::new(State::default()),
        }
    }

    /// Set the dictionary; the form list is derived from it in field order.
    pub fn with_dictionary(mut self, dictionary: DataDictionary) -> Self {
        let mut seen = HashSet::new();
        self.forms = dictionary
            .fields()
            .iter()
            .filter(|f| seen.insert(f.form_name.clone()))
            .map(|f| FormInfo {
                instrument_name: f.form_name.clone(),
                instrument_label: f.form_name.clone(),
            })
            .collect();
        self.dictionary = dictionary;
        self
    }

    pub fn longitudinal(mut self, arms: Value, events: Value, form_event_mappings: Value) -> Self {
        self.info.is_longitudinal = true;
        self.arms = Some(arms);
        self.events = Some(events);
        self.form_event_mappings = Some(form_event_mappings);
        self
    }

    pub fn repeating(mut self, definitions: Value) -> Self {
        self.info.has_repeating_instruments_or_events = true;
        self.repeating_instruments = Some(definitions);
        self
    }

    pub fn with_records(self, records: impl IntoIterator<Item = Record>) -> Self {
        self.state.borrow_mut().rows.extend(records);
        self
    }

    /// Fail the `n`-th import call (1-based).
    pub fn fail_import_call(&self, n: usize) {
        self.state.borrow_mut().failures.import_calls.insert(n);
    }

    pub fn fail_all_imports(&self) {
        self.state.borrow_mut().failures.all_imports = true;
    }

    /// Succeeding imports report `n` fewer records than they received.
    pub fn short_import_count(&self, n: usize) {
        self.state.borrow_mut().failures.import_shortfall = n;
    }

    pub fn fail_export_records(&self) {
        self.state.borrow_mut().failures.export_records = true;
    }

    pub fn fail_export_record_ids(&self) {
        self.state.borrow_mut().failures.export_record_ids = true;
    }

    pub fn fail_delete(&self) {
        self.state.borrow_mut().failures.delete = true;
    }

    /// Set `field` on every row of record `id`, bypassing the call log.
    pub fn set_value(&self, id: &str, field: &str, value: &str) {
        let mut state = self.state.borrow_mut();
        for row in state
            .rows
            .iter_mut()
            .filter(|r| r.get(&self.primary_key) == Some(id))
        {
            row.insert(field, value);
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.borrow().calls.clone()
    }

    /// All rows currently held.
    pub fn rows(&self) -> Vec<Record> {
        self.state.borrow().rows.clone()
    }

    pub fn row_count(&self) -> usize {
        self.state.borrow().rows.len()
    }

    /// Distinct record ids currently held, in row order.
    pub fn record_ids(&self) -> Vec<RecordId> {
        distinct(self.state.borrow().rows.iter(), &self.primary_key)
    }

    /// Rows belonging to `id`.
    pub fn rows_of(&self, id: &str) -> Vec<Record> {
        self.state
            .borrow()
            .rows
            .iter()
            .filter(|r| r.get(&self.primary_key) == Some(id))
            .cloned()
            .collect()
    }

    /// Import payloads received, in order.
    pub fn imported_payloads(&self) -> Vec<Vec<Record>> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::ImportRecords { records, .. } => Some(records.clone()),
                _ => None,
            })
            .collect()
    }

    /// Id lists of delete calls received, in order.
    pub fn deleted_batches(&self) -> Vec<Vec<RecordId>> {
        self.state
            .borrow()
            .calls
            .iter()
            .filter_map(|c| match c {
                Call::DeleteRecords { ids } => Some(ids.clone()),
                _ => None,
            })
            .collect()
    }

    fn log(&self, call: Call) {
        self.state.borrow_mut().calls.push(call);
    }

    fn metadata(&self, call: Call, operation: &str, doc: &Option<Value>) -> ConnectorResult<Value> {
        self.log(call);
        doc.clone().ok_or_else(|| ConnectorError::Status {
            operation: operation.to_string(),
            status: 400,
            reason: "Bad Request".to_string(),
            body: "{\"error\":\"not enabled for this project\"}".to_string(),
        })
    }

    fn identity(&self, row: &Record) -> Option<RecordIdentity> {
        row.identity(&self.primary_key)
    }

    fn project_fields(&self, row: &Record, forms: &[String]) -> Record {
        row.iter()
            .filter(|(field, _)| {
                *field == self.primary_key
                    || keys::IDENTITY_FIELDS.contains(field)
                    || self
                        .dictionary
                        .form_of(field)
                        .is_some_and(|form| forms.iter().any(|f| f == form))
            })
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }
}

fn distinct<'a>(rows: impl Iterator<Item = &'a Record>, primary_key: &str) -> Vec<RecordId> {
    let mut seen = HashSet::new();
    rows.filter_map(|r| r.record_id(primary_key))
        .filter(|id| seen.insert(id.clone()))
        .collect()
}

/// Matches `[field] < 'value'`, the only filter shape the in-memory project understands.
fn less_than_filter(filter: &str) -> Option<(String, String)> {
    let re = Regex::new(r"^\s*\[([A-Za-z0-9_]+)\]\s*<\s*'([^']*)'\s*$").ok()?;
    let caps = re.captures(filter)?;
    Some((caps[1].to_string(), caps[2].to_string()))
}

fn transient(operation: &str) -> ConnectorError {
    ConnectorError::Status {
        operation: operation.to_string(),
        status: 500,
        reason: "Internal Server Error".to_string(),
        body: "injected failure".to_string(),
    }
}

impl ProjectConnector for MemoryProject {
    fn primary_key(&self) -> &str {
        &self.primary_key
    }

    fn project_info(&self) -> &ProjectInfo {
        &self.info
    }

    fn export_schema(&self, forms: Option<&[String]>) -> ConnectorResult<DataDictionary> {
        self.log(Call::ExportSchema);
        let fields = self
            .dictionary
            .fields()
            .iter()
            .filter(|f| forms.map_or(true, |forms| forms.iter().any(|form| *form == f.form_name)))
            .cloned()
            .collect();
        Ok(DataDictionary::new(fields))
    }

    fn export_forms(&self) -> ConnectorResult<Vec<FormInfo>> {
        self.log(Call::ExportForms);
        Ok(self.forms.clone())
    }

    fn export_arms(&self) -> ConnectorResult<Value> {
        self.metadata(Call::ExportArms, "export arms", &self.arms)
    }

    fn export_events(&self) -> ConnectorResult<Value> {
        self.metadata(Call::ExportEvents, "export events", &self.events)
    }

    fn export_form_event_mappings(&self) -> ConnectorResult<Value> {
        self.metadata(
            Call::ExportFormEventMappings,
            "export form event mappings",
            &self.form_event_mappings,
        )
    }

    fn export_repeating_instruments(&self) -> ConnectorResult<Value> {
        self.metadata(
            Call::ExportRepeatingInstruments,
            "export repeating instruments",
            &self.repeating_instruments,
        )
    }

    fn export_record_ids(
        &self,
        _forms: Option<&[String]>,
        events: Option<&[String]>,
    ) -> ConnectorResult<Vec<RecordId>> {
        self.log(Call::ExportRecordIds);
        if self.state.borrow().failures.export_record_ids {
            return Err(transient("retrieve the record IDs"));
        }
        let state = self.state.borrow();
        let rows = state.rows.iter().filter(|row| {
            events.map_or(true, |events| {
                row.get(keys::EVENT_NAME)
                    .is_some_and(|e| events.iter().any(|x| x == e))
            })
        });
        Ok(distinct(rows, &self.primary_key))
    }

    fn export_records(&self, query: &RecordQuery) -> ConnectorResult<Vec<Record>> {
        self.log(Call::ExportRecords {
            ids: query.ids.clone(),
            filter: query.filter_logic.clone(),
        });
        if self.state.borrow().failures.export_records {
            return Err(transient("export records"));
        }

        let filter = match &query.filter_logic {
            Some(logic) => Some(
                less_than_filter(logic)
                    .ok_or_else(|| ConnectorError::malformed("export records", "unsupported filter"))?,
            ),
            None => None,
        };

        let state = self.state.borrow();
        let rows = state
            .rows
            .iter()
            .filter(|row| match &query.ids {
                Some(ids) => row
                    .record_id(&self.primary_key)
                    .is_some_and(|id| ids.contains(&id)),
                None => true,
            })
            .filter(|row| match &query.events {
                Some(events) if !events.is_empty() => row
                    .get(keys::EVENT_NAME)
                    .is_some_and(|e| events.iter().any(|x| x == e)),
                _ => true,
            })
            .filter(|row| match &filter {
                Some((field, bound)) => row
                    .get(field)
                    .is_some_and(|v| !v.is_empty() && v < bound.as_str()),
                None => true,
            })
            .map(|row| match &query.forms {
                Some(forms) if !forms.is_empty() => self.project_fields(row, forms),
                _ => row.clone(),
            })
            .collect();
        Ok(rows)
    }

    fn import_records(&self, records: &[Record]) -> ConnectorResult<usize> {
        let ids = distinct(records.iter(), &self.primary_key);
        self.log(Call::ImportRecords {
            ids: ids.clone(),
            records: records.to_vec(),
        });

        let mut state = self.state.borrow_mut();
        state.imports += 1;
        if state.failures.all_imports || state.failures.import_calls.contains(&state.imports) {
            return Err(transient("import records"));
        }

        for record in records {
            let identity = self.identity(record);
            match state
                .rows
                .iter_mut()
                .find(|row| identity.is_some() && self.identity(row) == identity)
            {
                Some(row) => {
                    for (field, value) in record.iter() {
                        row.insert(field, value);
                    }
                }
                None => state.rows.push(record.clone()),
            }
        }

        Ok(ids.len().saturating_sub(state.failures.import_shortfall))
    }

    fn delete_records(&self, ids: &[RecordId]) -> ConnectorResult<usize> {
        self.log(Call::DeleteRecords { ids: ids.to_vec() });
        let mut state = self.state.borrow_mut();
        if state.failures.delete {
            return Err(transient("delete records"));
        }

        let present: HashSet<RecordId> = distinct(state.rows.iter(), &self.primary_key)
            .into_iter()
            .filter(|id| ids.contains(id))
            .collect();
        let pk = self.primary_key.clone();
        state
            .rows
            .retain(|row| row.record_id(&pk).map_or(true, |id| !present.contains(&id)));
        Ok(present.len())
    }
}
