//! Logging setup for the ferry binary.
//!
//! Every run appends to a dated log file, `<dir>/<app>-YYYYMMDD.log`, and
//! mirrors warnings (or everything, when verbose) on stderr. Only the newest
//! [`KEEP_LOG_FILES`] dated files are kept.

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use std::fmt;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str =
    "ferry=info,ferry_transfer=info,ferry_rules=info,ferry_connector=info";

/// Timestamp format of log lines.
pub const LOG_TIMESTAMP_FORMAT: &str = "%m-%d-%y %H:%M:%S";

/// Dated log files kept per application.
pub const KEEP_LOG_FILES: usize = 14;

/// Logging configuration for one process.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    /// Mirror the file filter on stderr instead of warnings only.
    pub verbose: bool,
    /// Directory for log files; `None` resolves to [`logs_dir`].
    pub log_dir: Option<&'a Path>,
}

/// Local wall-clock timestamps in [`LOG_TIMESTAMP_FORMAT`].
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalTimer;

impl FormatTime for LocalTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> fmt::Result {
        write!(w, "{}", Local::now().format(LOG_TIMESTAMP_FORMAT))
    }
}

/// Initialize tracing. Returns the path of today's log file.
pub fn init_logging(config: LogConfig<'_>) -> Result<PathBuf> {
    let log_dir = match config.log_dir {
        Some(dir) => dir.to_path_buf(),
        None => logs_dir(),
    };
    fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create logs directory: {}", log_dir.display()))?;

    let app_name = sanitize_name(config.app_name);
    let path = log_file_path(&log_dir, &app_name, Local::now().date_naive());
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file: {}", path.display()))?;

    let file_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        file_filter.to_string()
    } else {
        "warn".to_string()
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_timer(LocalTimer)
                .with_target(false)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(io::stderr)
                .with_timer(LocalTimer)
                .with_target(false)
                .with_filter(EnvFilter::new(console_filter)),
        )
        .try_init()
        .context("Failed to install tracing subscriber")?;

    match prune_old_logs(&log_dir, &app_name, KEEP_LOG_FILES) {
        Ok(0) => {}
        Ok(removed) => tracing::debug!("Removed {} old log files", removed),
        Err(e) => tracing::warn!("Failed to prune old log files in {}: {}", log_dir.display(), e),
    }

    Ok(path)
}

/// Get the ferry home directory: `$FERRY_HOME` or `~/.ferry`
pub fn ferry_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("FERRY_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".ferry")
}

/// Get the logs directory: ~/.ferry/logs
pub fn logs_dir() -> PathBuf {
    ferry_home().join("logs")
}

pub fn log_file_path(dir: &Path, app_name: &str, day: NaiveDate) -> PathBuf {
    dir.join(format!("{}-{}.log", app_name, day.format("%Y%m%d")))
}

/// Delete all but the newest `keep` dated log files of `app_name`.
///
/// Files that do not follow the `<app>-YYYYMMDD.log` pattern are left alone.
pub fn prune_old_logs(dir: &Path, app_name: &str, keep: usize) -> io::Result<usize> {
    let mut dated: Vec<(NaiveDate, PathBuf)> = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            continue;
        };
        if let Some(day) = parse_log_day(name, app_name) {
            dated.push((day, path));
        }
    }
    if dated.len() <= keep {
        return Ok(0);
    }

    dated.sort_by(|a, b| b.0.cmp(&a.0));
    let mut removed = 0;
    for (_, path) in dated.into_iter().skip(keep) {
        fs::remove_file(&path)?;
        removed += 1;
    }
    Ok(removed)
}

fn parse_log_day(file_name: &str, app_name: &str) -> Option<NaiveDate> {
    let stamp = file_name
        .strip_prefix(app_name)?
        .strip_prefix('-')?
        .strip_suffix(".log")?;
    if stamp.len() != 8 {
        return None;
    }
    NaiveDate::parse_from_str(stamp, "%Y%m%d").ok()
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|ch| if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' { ch } else { '_' })
        .collect()
}
