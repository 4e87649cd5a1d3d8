//! Transfer orchestrator.
//!
//! ```text
//! Idle -> CompatibilityChecked -> Transferring -> Done
//!   \____________\___________________\________-> Failed
//! ```
//!
//! Batches run strictly one after another. Within a batch the order is:
//! export, validate, import the valid rows, delete them from the source
//! (only after the import is confirmed), write rejected rows back.

use crate::batch::{plan_batches, Batch};
use crate::compat::check_compatibility;
use crate::datastore::ProjectDatastore;
use crate::error::TransferError;
use crate::report::{ErrorReporter, RejectedRecord, ReportFile};
use crate::tally::{TransferReport, TransferTally};
use chrono::Local;
use ferry_connector::ProjectConnector;
use ferry_protocol::defaults::{DEFAULT_BATCH_SIZE, DEFAULT_ERRORS_FIELD, DEFAULT_TIMESTAMP_FIELD};
use ferry_protocol::{keys, DataDictionary, FormInfo, Record, RecordId, RecordQuery};
use ferry_rules::{load_schema, EngineOptions, RuleStore, ValidationEngine};
use serde::Serialize;
use std::collections::HashSet;
use std::fmt;
use std::path::PathBuf;
use tracing::{error, info, warn};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Idle,
    CompatibilityChecked,
    Transferring,
    Done,
    Failed,
}

impl fmt::Display for TransferState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TransferState::Idle => "idle",
            TransferState::CompatibilityChecked => "compatibility_checked",
            TransferState::Transferring => "transferring",
            TransferState::Done => "done",
            TransferState::Failed => "failed",
        })
    }
}

/// Everything a run needs to know, fixed for its duration.
#[derive(Debug, Clone)]
pub struct TransferSettings {
    /// Zero or less exports every candidate in one batch.
    pub batch_size: i64,
    /// Delete imported records from the source.
    pub move_records: bool,
    pub strict_mode: bool,
    /// Forms to validate and transfer; `None` means every form except the report form.
    pub forms: Option<Vec<String>>,
    /// Events to transfer; `None` means every event.
    pub events: Option<Vec<String>>,
    /// Form holding the validation-error fields in the source project. Rejected
    /// rows are annotated and written back only when it is set.
    pub report_form: Option<String>,
    pub errors_field: String,
    pub timestamp_field: String,
    /// Directory for the local JSON-lines report.
    pub report_dir: Option<PathBuf>,
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            move_records: false,
            strict_mode: true,
            forms: None,
            events: None,
            report_form: None,
            errors_field: DEFAULT_ERRORS_FIELD.to_string(),
            timestamp_field: DEFAULT_TIMESTAMP_FIELD.to_string(),
            report_dir: None,
        }
    }
}

/// Result of the compatibility step.
#[derive(Debug, Clone)]
pub struct CheckedProjects {
    /// Forms in scope, resolved against the source project.
    pub forms: Vec<String>,
    /// All data-entry forms of the source project.
    pub project_forms: Vec<FormInfo>,
    /// Source dictionary of the forms in scope.
    pub dictionary: DataDictionary,
}

/// Drives one transfer from `source` to `destination`.
pub struct Transfer<'a> {
    source: &'a dyn ProjectConnector,
    destination: &'a dyn ProjectConnector,
    settings: TransferSettings,
    state: TransferState,
    run_id: Uuid,
    tally: TransferTally,
}

impl<'a> Transfer<'a> {
    pub fn new(
        source: &'a dyn ProjectConnector,
        destination: &'a dyn ProjectConnector,
        settings: TransferSettings,
    ) -> Self {
        Self {
            source,
            destination,
            settings,
            state: TransferState::Idle,
            run_id: Uuid::new_v4(),
            tally: TransferTally::default(),
        }
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn tally(&self) -> &TransferTally {
        &self.tally
    }

    pub fn settings(&self) -> &TransferSettings {
        &self.settings
    }

    /// Run the whole transfer.
    ///
    /// Per-record and per-batch failures are absorbed into the tally; only
    /// configuration, rule, compatibility and candidate-export failures are
    /// returned, after moving to [`TransferState::Failed`].
    pub fn run(&mut self, rules: &dyn RuleStore) -> Result<TransferReport, TransferError> {
        let started_at = Local::now();
        self.tally = TransferTally::default();
        info!("================= STARTING data transfer ==================");
        info!(run_id = %self.run_id, "Transfer run started");

        let result = self.execute(rules);

        let outcome = match result {
            Ok(subset) => {
                self.state = TransferState::Done;
                info!(
                    "Total number of records successfully imported to the destination project: {}",
                    self.tally.records_imported
                );
                info!(
                    "Number of records failed due to validation or import errors: {}",
                    self.tally.records_failed()
                );
                Ok(TransferReport {
                    run_id: self.run_id,
                    state: self.state,
                    tally: self.tally.clone(),
                    subset,
                    started_at,
                    finished_at: Local::now(),
                })
            }
            Err(e) => {
                self.state = TransferState::Failed;
                error!(run_id = %self.run_id, "Transfer failed: {}", e);
                Err(e)
            }
        };

        info!("================== ENDING data transfer ===================");
        outcome
    }

    /// Resolve the forms in scope and compare the two projects.
    pub fn check(&mut self) -> Result<CheckedProjects, TransferError> {
        match self.resolve_and_compare() {
            Ok(checked) => {
                self.state = TransferState::CompatibilityChecked;
                Ok(checked)
            }
            Err(e) => {
                self.state = TransferState::Failed;
                Err(e)
            }
        }
    }

    /// Load the rules for `checked.forms` and build the engine.
    ///
    /// Rule fields must all exist in the data dictionary. Longitudinal sources
    /// get a datastore reading earlier instances from the destination.
    pub fn build_engine(
        &self,
        rules: &dyn RuleStore,
        checked: &CheckedProjects,
    ) -> Result<ValidationEngine<'a>, TransferError> {
        let loaded = load_schema(rules, &checked.forms)?;

        let unknown: Vec<String> = loaded
            .schema
            .field_names()
            .filter(|name| !checked.dictionary.contains(name))
            .map(str::to_string)
            .collect();
        if !unknown.is_empty() {
            for name in &unknown {
                error!("Invalid variable name \"{}\" in rule definitions", name);
            }
            return Err(TransferError::UnknownRuleFields { fields: unknown });
        }

        let options = EngineOptions::strict(self.settings.strict_mode)
            .with_passthrough(self.passthrough_fields(&checked.forms));
        let engine = ValidationEngine::new(loaded, &checked.forms, options)?;

        if self.source.is_longitudinal() {
            let datastore = ProjectDatastore::new(
                self.destination,
                Some(checked.forms.clone()),
                self.settings.events.clone(),
            );
            return Ok(engine.with_datastore(datastore));
        }
        Ok(engine)
    }

    fn execute(&mut self, rules: &dyn RuleStore) -> Result<bool, TransferError> {
        if self.settings.errors_field == self.settings.timestamp_field {
            return Err(TransferError::Config(format!(
                "errors field and timestamp field are both '{}'",
                self.settings.errors_field
            )));
        }

        let checked = self.check()?;
        let engine = self.build_engine(rules, &checked)?;
        let subset = self.is_subset(&checked);
        if subset && self.settings.move_records {
            warn!("Records will not be removed from the source project as only a subset of the forms/events is validated");
        }

        let events = self.settings.events.clone();
        let ids = self
            .source
            .export_record_ids(Some(checked.forms.as_slice()), events.as_deref())?;
        if ids.is_empty() {
            warn!("No records in the source project match the selected forms and events");
            return Ok(subset);
        }

        self.tally.records_seen = ids.len();
        info!("Number of records available in the source project: {}", ids.len());

        self.state = TransferState::Transferring;
        let mut reporter = ErrorReporter::new(self.source.primary_key(), &checked.dictionary);
        if self.settings.report_form.is_some() {
            reporter = reporter
                .with_report_fields(&self.settings.errors_field, &self.settings.timestamp_field);
        }
        let report_file = self
            .settings
            .report_dir
            .as_deref()
            .map(|dir| ReportFile::new(dir, Local::now()));

        let batches = plan_batches(&ids, self.settings.batch_size);
        let total = batches.len();
        let mut tally = std::mem::take(&mut self.tally);
        for batch in &batches {
            info!(
                batch = batch.index,
                "Processing batch {} of {} ({} records)",
                batch.index,
                total,
                batch.len()
            );
            let ctx = BatchContext {
                source: self.source,
                destination: self.destination,
                settings: &self.settings,
                forms: &checked.forms,
                engine: &engine,
                reporter: &reporter,
                report_file: report_file.as_ref(),
                run_id: self.run_id,
                delete_allowed: self.settings.move_records && !subset,
            };
            ctx.process(batch, &mut tally);
        }
        self.tally = tally;

        Ok(subset)
    }

    fn resolve_and_compare(&self) -> Result<CheckedProjects, TransferError> {
        let project_forms = self.source.export_forms()?;
        let forms = match &self.settings.forms {
            Some(forms) if !forms.is_empty() => forms.clone(),
            _ => project_forms
                .iter()
                .map(|f| f.instrument_name.clone())
                .filter(|name| Some(name) != self.settings.report_form.as_ref())
                .collect(),
        };
        if forms.is_empty() {
            return Err(TransferError::Config(
                "the source project has no data entry forms to transfer".to_string(),
            ));
        }

        let dictionary = check_compatibility(self.source, self.destination, Some(forms.as_slice()))?;
        Ok(CheckedProjects {
            forms,
            project_forms,
            dictionary,
        })
    }

    fn passthrough_fields(&self, forms: &[String]) -> Vec<String> {
        let mut fields = vec![self.source.primary_key().to_string()];
        fields.extend(keys::IDENTITY_FIELDS.iter().map(|k| k.to_string()));
        fields.extend(forms.iter().map(|f| keys::form_complete_field(f)));
        fields.push(self.settings.errors_field.clone());
        fields.push(self.settings.timestamp_field.clone());
        if let Some(report_form) = &self.settings.report_form {
            fields.push(keys::form_complete_field(report_form));
        }
        fields
    }

    /// Whether the run covers only part of the source project.
    ///
    /// Forms: any data-entry form other than the report form left out.
    /// Events: a configured filter that leaves out any project event, or any
    /// configured filter when the project's events cannot be listed.
    fn is_subset(&self, checked: &CheckedProjects) -> bool {
        let forms_subset = checked
            .project_forms
            .iter()
            .map(|f| &f.instrument_name)
            .filter(|name| Some(*name) != self.settings.report_form.as_ref())
            .any(|name| !checked.forms.contains(name));

        let events_subset = match self.settings.events.as_deref() {
            None | Some([]) => false,
            Some(selected) => match self.source.export_events() {
                Ok(doc) => unique_event_names(&doc)
                    .iter()
                    .any(|event| !selected.contains(event)),
                Err(e) => {
                    warn!("Could not list the source project events: {}", e);
                    true
                }
            },
        };

        forms_subset || events_subset
    }
}

fn unique_event_names(doc: &serde_json::Value) -> Vec<String> {
    doc.as_array()
        .map(|events| {
            events
                .iter()
                .filter_map(|e| e.get("unique_event_name").and_then(|n| n.as_str()))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Borrowed view of the run used while processing one batch.
struct BatchContext<'r, 'a> {
    source: &'a dyn ProjectConnector,
    destination: &'a dyn ProjectConnector,
    settings: &'r TransferSettings,
    forms: &'r [String],
    engine: &'r ValidationEngine<'a>,
    reporter: &'r ErrorReporter<'r>,
    report_file: Option<&'r ReportFile>,
    run_id: Uuid,
    delete_allowed: bool,
}

impl BatchContext<'_, '_> {
    fn process(&self, batch: &Batch, tally: &mut TransferTally) {
        let query = RecordQuery {
            ids: batch.export_ids(),
            forms: Some(self.forms.to_vec()),
            events: self.settings.events.clone(),
            filter_logic: None,
        };

        let rows = match self.source.export_records(&query) {
            Ok(rows) if !rows.is_empty() => rows,
            Ok(_) => {
                warn!("No records returned for the export request");
                info!("Requested record IDs: {:?}", query.ids);
                tally.batches_failed += 1;
                return;
            }
            Err(e) => {
                warn!(batch = batch.index, "Export failed, skipping batch: {}", e);
                tally.batches_failed += 1;
                return;
            }
        };

        info!("Number of input instances: {}", rows.len());
        let primary_key = self.source.primary_key();
        let now = Local::now();

        let mut valid = Vec::new();
        let mut valid_ids = Vec::new();
        let mut seen = HashSet::new();
        let mut rejected: Vec<RejectedRecord> = Vec::new();
        let mut rejected_ids = HashSet::new();
        for row in rows {
            let outcome = self.engine.evaluate(&row);
            let id = row.record_id(primary_key);
            if outcome.passed() {
                if let Some(id) = id.filter(|id| seen.insert(id.clone())) {
                    valid_ids.push(id);
                }
                valid.push(row);
            } else {
                if let Some(id) = id {
                    rejected_ids.insert(id);
                }
                rejected.push(self.reporter.compose(&row, &outcome, now));
            }
        }
        info!("Number of valid instances: {}", valid.len());
        info!("Number failed instances: {}", rejected.len());
        tally.instances_rejected += rejected.len();

        if valid.is_empty() {
            info!("There are no valid records in batch {}", batch.index);
        } else if self.import(&valid, valid_ids.len(), batch, tally) && self.delete_allowed {
            let deletable: Vec<RecordId> = valid_ids
                .into_iter()
                .filter(|id| !rejected_ids.contains(id))
                .collect();
            self.delete(&deletable, tally);
        }

        self.write_back(&rejected);
    }

    /// Import valid rows. True only when the destination confirmed every record.
    fn import(&self, valid: &[Record], expected: usize, batch: &Batch, tally: &mut TransferTally) -> bool {
        match self.destination.import_records(valid) {
            Ok(count) => {
                info!("Number of records imported to the destination project: {}", count);
                tally.records_imported += count;
                if count < expected {
                    warn!(
                        batch = batch.index,
                        "Destination confirmed {} of {} records, source left untouched",
                        count,
                        expected
                    );
                    return false;
                }
                true
            }
            Err(e) => {
                error!(
                    batch = batch.index,
                    "Import failed, source left untouched: {}", e
                );
                tally.batches_failed += 1;
                false
            }
        }
    }

    fn delete(&self, ids: &[RecordId], tally: &mut TransferTally) {
        if ids.is_empty() {
            return;
        }
        match self.source.delete_records(ids) {
            Ok(count) => {
                info!("Number of records deleted from the source project: {}", count);
                tally.records_deleted += count;
            }
            Err(e) => warn!("Failed to delete imported records from the source project: {}", e),
        }
    }

    fn write_back(&self, rejected: &[RejectedRecord]) {
        if rejected.is_empty() {
            return;
        }

        let annotated: Vec<Record> = rejected.iter().filter_map(|r| r.annotated.clone()).collect();
        if !annotated.is_empty() {
            if let Err(e) = self.source.import_records(&annotated) {
                warn!("Failed to write validation errors to the source project: {}", e);
            }
        }

        if let Some(file) = self.report_file {
            if let Err(e) = file.append(self.run_id, Local::now(), rejected) {
                warn!(
                    "Failed to append to validation report {}: {}",
                    file.path().display(),
                    e
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ferry_rules::MemoryRuleStore;
    use ferry_test_utils::{fixtures, Call, MemoryProject};
    use serde_json::json;

    fn project(n: usize) -> MemoryProject {
        MemoryProject::new("record_id")
            .with_dictionary(fixtures::dictionary(&[
                ("record_id", "demo"),
                ("age", "demo"),
                ("glucose", "labs"),
            ]))
            .with_records(fixtures::numbered_records(n, |_, r| {
                r.with("age", "40").with("glucose", "70")
            }))
    }

    fn rules() -> MemoryRuleStore {
        MemoryRuleStore::new()
            .with("demo", json!({"record_id": {"filled": true}, "age": {"type": "integer"}}))
            .with("labs", json!({"glucose": {"type": "integer", "min": 50, "max": 90}}))
    }

    fn settings() -> TransferSettings {
        TransferSettings {
            strict_mode: false,
            ..TransferSettings::default()
        }
    }

    #[test]
    fn test_states_on_success() {
        let source = project(3);
        let destination = project(0);
        let mut transfer = Transfer::new(&source, &destination, settings());
        assert_eq!(transfer.state(), TransferState::Idle);
        let report = transfer.run(&rules()).unwrap();
        assert_eq!(report.state, TransferState::Done);
        assert_eq!(report.tally.records_imported, 3);
        assert_eq!(destination.record_ids().len(), 3);
    }

    #[test]
    fn test_unknown_rule_field_fails() {
        let source = project(3);
        let destination = project(0);
        let store = rules().with("labs", json!({"glucoze": {"filled": true}}));
        let mut transfer = Transfer::new(&source, &destination, settings());
        let err = transfer.run(&store).unwrap_err();
        assert!(matches!(err, TransferError::UnknownRuleFields { ref fields } if fields == &["glucoze"]));
        assert_eq!(transfer.state(), TransferState::Failed);
        assert!(!source.calls().contains(&Call::ExportRecordIds));
    }

    #[test]
    fn test_forms_default_excludes_report_form() {
        let source = MemoryProject::new("record_id").with_dictionary(fixtures::dictionary(&[
            ("record_id", "demo"),
            ("val_errs", "quality_control_check"),
        ]));
        let destination = MemoryProject::new("record_id").with_dictionary(fixtures::dictionary(&[
            ("record_id", "demo"),
            ("val_errs", "quality_control_check"),
        ]));
        let mut transfer = Transfer::new(
            &source,
            &destination,
            TransferSettings {
                report_form: Some("quality_control_check".to_string()),
                ..settings()
            },
        );
        let checked = transfer.check().unwrap();
        assert_eq!(checked.forms, vec!["demo"]);
        assert!(!transfer.is_subset(&checked));
        assert_eq!(transfer.state(), TransferState::CompatibilityChecked);
    }

    #[test]
    fn test_subset_by_forms_and_events() {
        let source = project(1);
        let destination = project(0);

        let mut transfer = Transfer::new(
            &source,
            &destination,
            TransferSettings {
                forms: Some(vec!["demo".to_string()]),
                ..settings()
            },
        );
        let checked = transfer.check().unwrap();
        assert!(transfer.is_subset(&checked));

        let mut transfer = Transfer::new(
            &source,
            &destination,
            TransferSettings {
                events: Some(vec!["baseline_arm_1".to_string()]),
                ..settings()
            },
        );
        let checked = transfer.check().unwrap();
        // events cannot be listed for a classic project
        assert!(transfer.is_subset(&checked));
    }

    #[test]
    fn test_events_filter_covering_all_events_is_not_subset() {
        let longitudinal = |n| {
            project(n).longitudinal(
                fixtures::arms(1),
                fixtures::events(&["baseline"]),
                json!([]),
            )
        };
        let source = longitudinal(1);
        let destination = longitudinal(0);
        let mut transfer = Transfer::new(
            &source,
            &destination,
            TransferSettings {
                events: Some(vec!["baseline_arm_1".to_string()]),
                ..settings()
            },
        );
        let checked = transfer.check().unwrap();
        assert!(!transfer.is_subset(&checked));
    }

    #[test]
    fn test_same_report_fields_rejected() {
        let source = project(1);
        let destination = project(0);
        let mut transfer = Transfer::new(
            &source,
            &destination,
            TransferSettings {
                timestamp_field: "val_errs".to_string(),
                ..settings()
            },
        );
        assert!(matches!(transfer.run(&rules()), Err(TransferError::Config(_))));
    }

    #[test]
    fn test_unique_event_names() {
        let doc = fixtures::events(&["baseline", "month_6"]);
        assert_eq!(unique_event_names(&doc), vec!["baseline_arm_1", "month_6_arm_1"]);
        assert!(unique_event_names(&json!({"error": "x"})).is_empty());
    }
}
