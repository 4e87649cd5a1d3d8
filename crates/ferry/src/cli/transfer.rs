//! `ferry transfer`

use super::ScopeArgs;
use crate::config::Settings;
use anyhow::{Context, Result};
use clap::Args;
use ferry_connector::{ProjectConnector, RedcapConnector};
use ferry_rules::{DirectoryRuleStore, RuleStore};
use ferry_transfer::{Transfer, TransferReport, TransferSettings};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

#[derive(Args, Debug, Clone, Default)]
pub struct TransferArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,

    /// Records per batch; zero or less transfers everything in one batch
    #[arg(short = 'b', long, allow_negative_numbers = true)]
    pub batch_size: Option<i64>,

    /// Delete imported records from the source project
    #[arg(long = "move", conflicts_with = "copy")]
    pub move_records: bool,

    /// Keep records in the source project (overrides configuration)
    #[arg(long)]
    pub copy: bool,

    /// Ignore fields that have no rules instead of rejecting the record
    #[arg(long)]
    pub lenient: bool,

    /// Directory holding one rule document per form
    #[arg(long)]
    pub rules_dir: Option<PathBuf>,

    /// Directory for the JSON-lines validation error report
    #[arg(long)]
    pub report_dir: Option<PathBuf>,

    /// Print the run report as JSON
    #[arg(long)]
    pub json: bool,
}

impl TransferArgs {
    pub fn apply(&self, settings: &mut Settings) {
        self.scope.apply(settings);
        if let Some(size) = self.batch_size {
            settings.transfer.batch_size = size;
        }
        if self.move_records {
            settings.transfer.move_records = true;
        }
        if self.copy {
            settings.transfer.move_records = false;
        }
        if self.lenient {
            settings.transfer.strict_mode = false;
        }
        if let Some(dir) = &self.rules_dir {
            settings.transfer.rules_dir = dir.clone();
        }
        if let Some(dir) = &self.report_dir {
            settings.report.dir = Some(dir.clone());
        }
    }
}

pub fn run(args: TransferArgs, settings: Settings) -> Result<ExitCode> {
    let (source_endpoint, destination_endpoint) =
        settings.endpoints().context("Invalid configuration")?;
    let source = RedcapConnector::connect(&source_endpoint.url, &source_endpoint.token)
        .context("Failed to connect to the source project")?;
    let destination =
        RedcapConnector::connect(&destination_endpoint.url, &destination_endpoint.token)
            .context("Failed to connect to the destination project")?;
    let rules = DirectoryRuleStore::new(settings.transfer.rules_dir.clone());
    info!(rules_dir = %settings.transfer.rules_dir.display(), "Using rule documents");

    let mut stdout = std::io::stdout().lock();
    execute(
        &source,
        &destination,
        &rules,
        settings.transfer_settings(),
        args.json,
        &mut stdout,
    )?;
    Ok(ExitCode::SUCCESS)
}

/// Run one transfer and print its report to `out`.
pub fn execute(
    source: &dyn ProjectConnector,
    destination: &dyn ProjectConnector,
    rules: &dyn RuleStore,
    settings: TransferSettings,
    json: bool,
    out: &mut dyn Write,
) -> Result<TransferReport> {
    let mut transfer = Transfer::new(source, destination, settings);
    let report = transfer.run(rules)?;
    if json {
        serde_json::to_writer_pretty(&mut *out, &report)?;
        writeln!(out)?;
    } else {
        print_summary(&report, out)?;
    }
    Ok(report)
}

fn print_summary(report: &TransferReport, out: &mut dyn Write) -> Result<()> {
    let tally = &report.tally;
    writeln!(out, "Run {} finished: {}", report.run_id, report.state)?;
    writeln!(out, "  Records found:     {}", tally.records_seen)?;
    writeln!(out, "  Records imported:  {}", tally.records_imported)?;
    writeln!(out, "  Records failed:    {}", report.records_failed())?;
    writeln!(out, "  Records deleted:   {}", tally.records_deleted)?;
    writeln!(out, "  Rejected rows:     {}", tally.instances_rejected)?;
    writeln!(out, "  Failed batches:    {}", tally.batches_failed)?;
    if report.subset {
        writeln!(out, "  Only part of the project was validated; source deletion was disabled.")?;
    }
    let elapsed = report.finished_at - report.started_at;
    writeln!(out, "  Duration:          {:.1}s", elapsed.num_milliseconds() as f64 / 1000.0)?;
    Ok(())
}
