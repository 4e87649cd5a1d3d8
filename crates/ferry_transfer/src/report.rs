//! Validation-error reports for rejected records.

use chrono::{DateTime, Local};
use ferry_protocol::defaults::{REPORT_FILE_PREFIX, REPORT_TIMESTAMP_FORMAT};
use ferry_protocol::{DataDictionary, Record};
use ferry_rules::ValidationOutcome;
use regex::Regex;
use serde_json::json;
use std::collections::BTreeMap;
use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use tracing::{error, info};
use uuid::Uuid;

const FORM_NOT_FOUND: &str = "Form name Not Found";
const LABEL_NOT_FOUND: &str = "Label Not Found";

static TAGS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"<[^>]*>").unwrap());
static SPACES: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());

/// A rejected row and its report.
#[derive(Debug, Clone, PartialEq)]
pub struct RejectedRecord {
    pub header: String,
    pub report: String,
    pub errors: BTreeMap<String, Vec<String>>,
    /// Copy carrying the report fields, written back to the source. `None`
    /// when the source project has no report form.
    pub annotated: Option<Record>,
}

/// Composes per-record error reports.
#[derive(Debug)]
pub struct ErrorReporter<'a> {
    primary_key: &'a str,
    dictionary: &'a DataDictionary,
    /// Errors and timestamp fields of the report form.
    report_fields: Option<(&'a str, &'a str)>,
}

impl<'a> ErrorReporter<'a> {
    pub fn new(primary_key: &'a str, dictionary: &'a DataDictionary) -> Self {
        Self {
            primary_key,
            dictionary,
            report_fields: None,
        }
    }

    /// Annotate rejected rows with the report and the time it was made.
    pub fn with_report_fields(mut self, errors_field: &'a str, timestamp_field: &'a str) -> Self {
        self.report_fields = Some((errors_field, timestamp_field));
        self
    }

    /// Build the report for `record` and log it.
    pub fn compose(
        &self,
        record: &Record,
        outcome: &ValidationOutcome,
        now: DateTime<Local>,
    ) -> RejectedRecord {
        let header = match record.identity(self.primary_key) {
            Some(identity) => format!(
                "Validation failed for the record {} = {}",
                self.primary_key, identity
            ),
            None => format!(
                "Validation failed for a record without {}",
                self.primary_key
            ),
        };

        let mut report = String::new();
        for (field, messages) in outcome.errors() {
            report.push_str(&format!(
                "Form Name: {} | Question: {} | Variable: {} | Current value: {} | Errors: [{}]\n",
                self.dictionary.form_of(field).unwrap_or(FORM_NOT_FOUND),
                self.dictionary
                    .label_of(field)
                    .map(plain_text)
                    .unwrap_or_else(|| LABEL_NOT_FOUND.to_string()),
                field,
                record.get(field).unwrap_or_default(),
                messages.join(", ")
            ));
        }

        let annotated = self.report_fields.map(|(errors_field, timestamp_field)| {
            record
                .clone()
                .with(timestamp_field, now.format(REPORT_TIMESTAMP_FORMAT).to_string())
                .with(errors_field, report.as_str())
        });

        error!("{}. List of errors:", header);
        info!("{}", report.trim_end());

        RejectedRecord {
            header,
            report,
            errors: outcome.errors().clone(),
            annotated,
        }
    }
}

/// Question text without markup.
pub fn plain_text(label: &str) -> String {
    let stripped = TAGS.replace_all(label, " ");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    SPACES.replace_all(decoded.trim(), " ").into_owned()
}

/// Local JSON-lines report, one file per day.
#[derive(Debug, Clone)]
pub struct ReportFile {
    path: PathBuf,
}

impl ReportFile {
    pub fn new(dir: &Path, day: DateTime<Local>) -> Self {
        let name = format!("{}{}.jsonl", REPORT_FILE_PREFIX, day.format("%Y%m%d"));
        Self {
            path: dir.join(name),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Append one line per rejected record.
    pub fn append(&self, run_id: Uuid, at: DateTime<Local>, rejected: &[RejectedRecord]) -> io::Result<()> {
        if rejected.is_empty() {
            return Ok(());
        }
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        for item in rejected {
            let line = json!({
                "run_id": run_id,
                "at": at.to_rfc3339(),
                "header": item.header,
                "errors": item.errors,
            });
            writeln!(file, "{}", line)?;
        }
        Ok(())
    }
}
