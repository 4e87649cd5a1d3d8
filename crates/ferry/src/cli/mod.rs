//! Command-line interface for ferry.
//!
//! `transfer` runs a full validated transfer, `compare` only checks that the
//! two projects are structurally compatible, and `rules` loads the rule
//! schema for the selected forms without touching any record.

use crate::config::Settings;
use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

pub mod compare;
pub mod rules;
pub mod transfer;

/// Exit code of `compare` when the projects are incompatible.
pub const EXIT_INCOMPATIBLE: u8 = 2;

#[derive(Parser, Debug)]
#[command(
    name = "ferry",
    version,
    about = "Validate records and move them between two data-capture projects"
)]
pub struct Cli {
    /// TOML configuration file
    #[arg(short, long, global = true, env = "FERRY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate, import and optionally delete records batch by batch
    Transfer(transfer::TransferArgs),

    /// Check that the source and destination projects are compatible
    Compare(compare::CompareArgs),

    /// Load the rule schema for the selected forms and summarize it
    Rules(rules::RulesArgs),
}

/// Forms and events to restrict a command to.
#[derive(Args, Debug, Clone, Default)]
pub struct ScopeArgs {
    /// Forms to include (comma-separated); default is every form
    #[arg(long, value_delimiter = ',')]
    pub forms: Vec<String>,

    /// Events to include (comma-separated); default is every event
    #[arg(long, value_delimiter = ',')]
    pub events: Vec<String>,
}

impl ScopeArgs {
    pub fn apply(&self, settings: &mut Settings) {
        if !self.forms.is_empty() {
            settings.transfer.forms = Some(self.forms.clone());
        }
        if !self.events.is_empty() {
            settings.transfer.events = Some(self.events.clone());
        }
    }
}

impl Commands {
    /// Fold this command's flags into `settings`. Flags win over everything.
    pub fn apply(&self, settings: &mut Settings) {
        match self {
            Commands::Transfer(args) => args.apply(settings),
            Commands::Compare(args) => args.apply(settings),
            Commands::Rules(args) => args.apply(settings),
        }
    }
}

/// Load the file and environment layers for `cli`, then its flags.
pub fn load_settings(cli: &Cli) -> Result<Settings> {
    let mut settings = Settings::load(cli.config.as_deref()).with_context(|| match &cli.config {
        Some(path) => format!("Failed to load configuration from {}", path.display()),
        None => "Failed to load configuration".to_string(),
    })?;
    settings
        .apply_process_env()
        .context("Invalid environment override")?;
    cli.command.apply(&mut settings);
    Ok(settings)
}

pub fn run_command(command: Commands, settings: Settings) -> Result<ExitCode> {
    match command {
        Commands::Transfer(args) => transfer::run(args, settings),
        Commands::Compare(args) => compare::run(args, settings),
        Commands::Rules(args) => rules::run(args, settings),
    }
}
