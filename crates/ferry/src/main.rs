//! Ferry command-line launcher.

use clap::Parser;
use ferry::cli::{self, Cli};
use ferry_logging::{init_logging, LogConfig};
use std::process::ExitCode;
use tracing::error;

fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let settings = match cli::load_settings(&cli) {
        Ok(settings) => settings,
        Err(err) => {
            eprintln!("{:?}", err);
            return ExitCode::from(1);
        }
    };

    if let Err(err) = init_logging(LogConfig {
        app_name: "ferry",
        verbose: cli.verbose,
        log_dir: settings.logging.dir.as_deref(),
    }) {
        eprintln!("Warning: failed to initialize logging: {:#}", err);
    }

    match cli::run_command(cli.command, settings) {
        Ok(code) => code,
        Err(err) => {
            error!("{:#}", err);
            eprintln!("{:?}", err);
            ExitCode::from(1)
        }
    }
}
