//! `ferry compare`

use super::{ScopeArgs, EXIT_INCOMPATIBLE};
use crate::config::Settings;
use anyhow::{Context, Result};
use clap::Args;
use ferry_connector::{ProjectConnector, RedcapConnector};
use ferry_transfer::{Transfer, TransferError, TransferSettings};
use std::io::Write;
use std::process::ExitCode;

#[derive(Args, Debug, Clone, Default)]
pub struct CompareArgs {
    #[command(flatten)]
    pub scope: ScopeArgs,
}

impl CompareArgs {
    pub fn apply(&self, settings: &mut Settings) {
        self.scope.apply(settings);
    }
}

pub fn run(_args: CompareArgs, settings: Settings) -> Result<ExitCode> {
    let (source_endpoint, destination_endpoint) =
        settings.endpoints().context("Invalid configuration")?;
    let source = RedcapConnector::connect(&source_endpoint.url, &source_endpoint.token)
        .context("Failed to connect to the source project")?;
    let destination =
        RedcapConnector::connect(&destination_endpoint.url, &destination_endpoint.token)
            .context("Failed to connect to the destination project")?;

    let mut stdout = std::io::stdout().lock();
    let compatible = execute(&source, &destination, settings.transfer_settings(), &mut stdout)?;
    Ok(if compatible {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_INCOMPATIBLE)
    })
}

/// Compare the projects for the forms in scope.
///
/// Returns `Ok(false)` when the projects differ; failures that are not about
/// compatibility (no forms, unreachable project) are errors.
pub fn execute(
    source: &dyn ProjectConnector,
    destination: &dyn ProjectConnector,
    settings: TransferSettings,
    out: &mut dyn Write,
) -> Result<bool> {
    let mut transfer = Transfer::new(source, destination, settings);
    match transfer.check() {
        Ok(checked) => {
            writeln!(
                out,
                "Projects are compatible ({} form(s), {} field(s))",
                checked.forms.len(),
                checked.dictionary.len()
            )?;
            Ok(true)
        }
        Err(TransferError::Incompatible(reason)) => {
            writeln!(out, "Projects are NOT compatible: {}", reason)?;
            Ok(false)
        }
        Err(e) => Err(e.into()),
    }
}
