//! `ferry rules`

use super::ScopeArgs;
use crate::config::Settings;
use anyhow::{bail, Context, Result};
use clap::Args;
use ferry_connector::{ProjectConnector, RedcapConnector};
use ferry_rules::{load_schema, DirectoryRuleStore, EngineOptions, RuleStore, ValidationEngine};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Args, Debug, Clone, Default)]
pub struct RulesArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Directory holding one rule document per form
    #[arg(long)]
    pub rules_dir: Option<PathBuf>,

    /// Accept forms without a rule document
    #[arg(long)]
    pub lenient: bool,
}

impl RulesArgs {
    pub fn apply(&self, settings: &mut Settings) {
        self.scope.apply(settings);
        if let Some(dir) = &self.rules_dir {
            settings.transfer.rules_dir = dir.clone();
        }
        if self.lenient {
            settings.transfer.strict_mode = false;
        }
    }
}

pub fn run(_args: RulesArgs, settings: Settings) -> Result<ExitCode> {
    let transfer = settings.transfer_settings();
    let forms = match transfer.forms {
        Some(forms) => forms,
        None => {
            let endpoint = settings
                .source_endpoint()
                .context("No forms selected and the source project is not configured")?;
            let source = RedcapConnector::connect(&endpoint.url, &endpoint.token)
                .context("Failed to connect to the source project")?;
            project_forms(&source, transfer.report_form.as_deref())?
        }
    };

    let store = DirectoryRuleStore::new(settings.transfer.rules_dir.clone());
    let mut stdout = std::io::stdout().lock();
    summarize(&store, &forms, transfer.strict_mode, &mut stdout)?;
    Ok(ExitCode::SUCCESS)
}

/// Data entry forms of `project`, without the report form.
pub fn project_forms(
    project: &dyn ProjectConnector,
    report_form: Option<&str>,
) -> Result<Vec<String>> {
    let forms: Vec<String> = project
        .export_forms()
        .context("Failed to export the source project's forms")?
        .into_iter()
        .map(|f| f.instrument_name)
        .filter(|name| Some(name.as_str()) != report_form)
        .collect();
    if forms.is_empty() {
        bail!("The source project has no data entry forms");
    }
    Ok(forms)
}

/// Load the rules for `forms` the way a transfer would and print one line
/// per field. Returns the number of fields with rules.
pub fn summarize(
    store: &dyn RuleStore,
    forms: &[String],
    strict: bool,
    out: &mut dyn Write,
) -> Result<usize> {
    let loaded = load_schema(store, forms)?;
    let missing = loaded.missing_forms.clone();
    let engine = ValidationEngine::new(loaded, forms, EngineOptions::strict(strict))?;
    let schema = engine.schema();

    let width = schema.field_names().map(str::len).max().unwrap_or(0).max(5);
    for field in schema.iter() {
        let rules: Vec<String> = field.rules.iter().map(ToString::to_string).collect();
        writeln!(
            out,
            "{:<width$}  {:<8}  {}",
            field.name,
            field.declared_type.as_str(),
            rules.join(", "),
            width = width
        )?;
    }
    writeln!(
        out,
        "{} field(s) with rules from {} of {} form(s)",
        schema.len(),
        forms.len() - missing.len(),
        forms.len()
    )?;
    if !missing.is_empty() {
        writeln!(out, "No rule document for: {}", missing.join(", "))?;
    }
    Ok(schema.len())
}
