//! Run configuration.
//!
//! Settings are layered: the optional TOML file, then `.env` and process
//! environment overrides, then command-line flags. Validation happens once,
//! before any remote call.

use ferry_protocol::defaults::{
    DEFAULT_BATCH_SIZE, DEFAULT_ERRORS_FIELD, DEFAULT_RULES_DIR, DEFAULT_TIMESTAMP_FIELD,
};
use ferry_transfer::TransferSettings;
use serde::Deserialize;
use std::fmt;
use std::path::{Path, PathBuf};
use url::Url;

pub const ENV_SRC_API_TOKEN: &str = "SRC_API_TOKEN";
pub const ENV_SRC_API_URL: &str = "SRC_API_URL";
pub const ENV_DEST_API_TOKEN: &str = "DEST_API_TOKEN";
pub const ENV_DEST_API_URL: &str = "DEST_API_URL";
pub const ENV_BATCH_SIZE: &str = "BATCH_SIZE";
pub const ENV_MOVE_RECORDS: &str = "MOVE_RECORDS";
pub const ENV_STRICT_MODE: &str = "STRICT_MODE";
pub const ENV_RULES_DIR: &str = "RULES_DIR";
pub const ENV_LOG_FILE_DIR: &str = "LOG_FILE_DIR";

/// Error type for config operations
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Missing required setting: {0}")]
    Missing(&'static str),

    #[error("Invalid value for {key}: '{value}'")]
    InvalidValue { key: &'static str, value: String },

    #[error("Invalid URL for {key}: {reason}")]
    InvalidUrl { key: &'static str, reason: String },

    #[error("Source and destination projects must use different API tokens")]
    SameToken,
}

/// Result type for config operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Credentials section for one project.
#[derive(Clone, Default, Deserialize)]
#[serde(default)]
pub struct ProjectSection {
    pub api_url: Option<String>,
    pub api_token: Option<String>,
}

impl fmt::Debug for ProjectSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProjectSection")
            .field("api_url", &self.api_url)
            .field("api_token", &self.api_token.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TransferSection {
    pub batch_size: i64,
    pub move_records: bool,
    pub strict_mode: bool,
    pub forms: Option<Vec<String>>,
    pub events: Option<Vec<String>>,
    pub rules_dir: PathBuf,
}

impl Default for TransferSection {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            move_records: false,
            strict_mode: true,
            forms: None,
            events: None,
            rules_dir: PathBuf::from(DEFAULT_RULES_DIR),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ReportSection {
    /// Form in the source project that holds the error fields.
    pub form: Option<String>,
    pub errors_field: String,
    pub timestamp_field: String,
    /// Directory for the local JSON-lines report; unset disables it.
    pub dir: Option<PathBuf>,
}

impl Default for ReportSection {
    fn default() -> Self {
        Self {
            form: None,
            errors_field: DEFAULT_ERRORS_FIELD.to_string(),
            timestamp_field: DEFAULT_TIMESTAMP_FIELD.to_string(),
            dir: None,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    pub dir: Option<PathBuf>,
}

/// Everything a run needs, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub source: ProjectSection,
    pub destination: ProjectSection,
    pub transfer: TransferSection,
    pub report: ReportSection,
    pub logging: LoggingSection,
}

/// A validated project endpoint.
#[derive(Clone)]
pub struct Endpoint {
    pub url: Url,
    pub token: String,
}

impl fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Endpoint")
            .field("url", &self.url.as_str())
            .finish_non_exhaustive()
    }
}

impl Settings {
    /// Load settings from a TOML file. A missing file is an error; pass `None`
    /// to start from defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply overrides from the process environment.
    pub fn apply_process_env(&mut self) -> Result<()> {
        self.apply_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup`, keyed by the `ENV_*` names.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(v) = lookup(ENV_SRC_API_TOKEN) {
            self.source.api_token = Some(v);
        }
        if let Some(v) = lookup(ENV_SRC_API_URL) {
            self.source.api_url = Some(v);
        }
        if let Some(v) = lookup(ENV_DEST_API_TOKEN) {
            self.destination.api_token = Some(v);
        }
        if let Some(v) = lookup(ENV_DEST_API_URL) {
            self.destination.api_url = Some(v);
        }
        if let Some(v) = lookup(ENV_BATCH_SIZE) {
            self.transfer.batch_size =
                v.trim()
                    .parse()
                    .map_err(|_| ConfigError::InvalidValue {
                        key: ENV_BATCH_SIZE,
                        value: v.clone(),
                    })?;
        }
        if let Some(v) = lookup(ENV_MOVE_RECORDS) {
            self.transfer.move_records = parse_flag(ENV_MOVE_RECORDS, &v)?;
        }
        if let Some(v) = lookup(ENV_STRICT_MODE) {
            self.transfer.strict_mode = parse_flag(ENV_STRICT_MODE, &v)?;
        }
        if let Some(v) = lookup(ENV_RULES_DIR) {
            self.transfer.rules_dir = PathBuf::from(v);
        }
        if let Some(v) = lookup(ENV_LOG_FILE_DIR) {
            self.logging.dir = Some(PathBuf::from(v));
        }
        Ok(())
    }

    pub fn source_endpoint(&self) -> Result<Endpoint> {
        endpoint(&self.source, ENV_SRC_API_URL, ENV_SRC_API_TOKEN)
    }

    pub fn destination_endpoint(&self) -> Result<Endpoint> {
        endpoint(&self.destination, ENV_DEST_API_URL, ENV_DEST_API_TOKEN)
    }

    /// Validate both endpoints for a run that touches both projects.
    pub fn endpoints(&self) -> Result<(Endpoint, Endpoint)> {
        let source = self.source_endpoint()?;
        let destination = self.destination_endpoint()?;
        if source.token == destination.token {
            return Err(ConfigError::SameToken);
        }
        Ok((source, destination))
    }

    pub fn transfer_settings(&self) -> TransferSettings {
        TransferSettings {
            batch_size: self.transfer.batch_size,
            move_records: self.transfer.move_records,
            strict_mode: self.transfer.strict_mode,
            forms: non_empty(self.transfer.forms.clone()),
            events: non_empty(self.transfer.events.clone()),
            report_form: self.report.form.clone().filter(|f| !f.trim().is_empty()),
            errors_field: self.report.errors_field.clone(),
            timestamp_field: self.report.timestamp_field.clone(),
            report_dir: self.report.dir.clone(),
        }
    }
}

fn endpoint(section: &ProjectSection, url_key: &'static str, token_key: &'static str) -> Result<Endpoint> {
    let token = section
        .api_token
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ConfigError::Missing(token_key))?;
    let raw_url = section
        .api_url
        .as_deref()
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or(ConfigError::Missing(url_key))?;
    let url = parse_api_url(url_key, raw_url)?;
    Ok(Endpoint {
        url,
        token: token.to_string(),
    })
}

fn parse_api_url(key: &'static str, raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| ConfigError::InvalidUrl {
        key,
        reason: e.to_string(),
    })?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(ConfigError::InvalidUrl {
            key,
            reason: format!("unsupported scheme '{}'", url.scheme()),
        });
    }
    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl {
            key,
            reason: "missing host".to_string(),
        });
    }
    Ok(url)
}

/// Parse `0/1/true/false` (and `yes/no`), case-insensitive.
pub fn parse_flag(key: &'static str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            key,
            value: value.to_string(),
        }),
    }
}

fn non_empty(list: Option<Vec<String>>) -> Option<Vec<String>> {
    list.map(|items| {
        items
            .into_iter()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
    })
    .filter(|items| !items.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn credentials() -> Settings {
        let mut settings = Settings::default();
        settings
            .apply_env(env(&[
                (ENV_SRC_API_URL, "https://src.example.org/api/"),
                (ENV_SRC_API_TOKEN, "AAAA"),
                (ENV_DEST_API_URL, "https://dest.example.org/api/"),
                (ENV_DEST_API_TOKEN, "BBBB"),
            ]))
            .unwrap();
        settings
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert_eq!(settings.transfer.batch_size, 100);
        assert!(!settings.transfer.move_records);
        assert!(settings.transfer.strict_mode);
        assert_eq!(settings.transfer.rules_dir, PathBuf::from("./rules"));
        assert_eq!(settings.report.errors_field, "val_errs");
        assert_eq!(settings.report.timestamp_field, "timestamp");
    }

    #[test]
    fn test_parse_full_toml() {
        let settings = Settings::from_toml_str(
            r#"
            [source]
            api_url = "https://src.example.org/api/"
            api_token = "AAAA"

            [destination]
            api_url = "https://dest.example.org/api/"
            api_token = "BBBB"

            [transfer]
            batch_size = 25
            move_records = true
            strict_mode = false
            forms = ["demographics", "labs"]
            events = ["baseline_arm_1"]
            rules_dir = "/etc/ferry/rules"

            [report]
            form = "quality_control_check"
            dir = "/var/ferry/reports"

            [logging]
            dir = "/var/log/ferry"
            "#,
        )
        .unwrap();

        assert_eq!(settings.transfer.batch_size, 25);
        assert!(settings.transfer.move_records);
        assert!(!settings.transfer.strict_mode);
        assert_eq!(settings.report.errors_field, "val_errs");
        assert_eq!(settings.logging.dir, Some(PathBuf::from("/var/log/ferry")));

        let transfer = settings.transfer_settings();
        assert_eq!(transfer.forms.as_deref().map(|f| f.len()), Some(2));
        assert_eq!(transfer.report_form.as_deref(), Some("quality_control_check"));
        assert_eq!(transfer.report_dir, Some(PathBuf::from("/var/ferry/reports")));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let settings = Settings::from_toml_str("[transfer]\nmove_records = true\n").unwrap();
        assert!(settings.transfer.move_records);
        assert_eq!(settings.transfer.batch_size, 100);
        assert!(settings.transfer.strict_mode);
    }

    #[test]
    fn test_invalid_toml() {
        let err = Settings::from_toml_str("[transfer]\nbatch_size = \"many\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_load_missing_file_is_error() {
        let dir = TempDir::new().unwrap();
        let err = Settings::load(Some(&dir.path().join("ferry.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ferry.toml");
        std::fs::write(&path, "[transfer]\nbatch_size = 7\n").unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.transfer.batch_size, 7);
    }

    #[test]
    fn test_env_overrides_file() {
        let mut settings = Settings::from_toml_str("[transfer]\nbatch_size = 7\n").unwrap();
        settings
            .apply_env(env(&[
                (ENV_BATCH_SIZE, "0"),
                (ENV_MOVE_RECORDS, "1"),
                (ENV_STRICT_MODE, "False"),
                (ENV_RULES_DIR, "custom_rules"),
                (ENV_LOG_FILE_DIR, "custom_logs"),
            ]))
            .unwrap();
        assert_eq!(settings.transfer.batch_size, 0);
        assert!(settings.transfer.move_records);
        assert!(!settings.transfer.strict_mode);
        assert_eq!(settings.transfer.rules_dir, PathBuf::from("custom_rules"));
        assert_eq!(settings.logging.dir, Some(PathBuf::from("custom_logs")));
    }

    #[test]
    fn test_env_bad_values() {
        let mut settings = Settings::default();
        let err = settings.apply_env(env(&[(ENV_BATCH_SIZE, "ten")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_BATCH_SIZE, .. }));

        let err = settings.apply_env(env(&[(ENV_MOVE_RECORDS, "maybe")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { key: ENV_MOVE_RECORDS, .. }));
    }

    #[test]
    fn test_endpoints_valid() {
        let (source, destination) = credentials().endpoints().unwrap();
        assert_eq!(source.url.host_str(), Some("src.example.org"));
        assert_eq!(destination.token, "BBBB");
    }

    #[test]
    fn test_missing_credentials() {
        let mut settings = credentials();
        settings.destination.api_token = Some("   ".to_string());
        let err = settings.endpoints().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_DEST_API_TOKEN)));

        let mut settings = credentials();
        settings.source.api_url = None;
        let err = settings.endpoints().unwrap_err();
        assert!(matches!(err, ConfigError::Missing(ENV_SRC_API_URL)));
    }

    #[test]
    fn test_same_token_rejected() {
        let mut settings = credentials();
        settings.destination.api_token = Some("AAAA".to_string());
        assert!(matches!(settings.endpoints(), Err(ConfigError::SameToken)));
        // A single side is still usable on its own.
        assert!(settings.source_endpoint().is_ok());
    }

    #[test]
    fn test_url_must_be_absolute_http() {
        for bad in ["src.example.org/api", "ftp://src.example.org/api", "not a url"] {
            let mut settings = credentials();
            settings.source.api_url = Some(bad.to_string());
            let err = settings.endpoints().unwrap_err();
            assert!(
                matches!(err, ConfigError::InvalidUrl { key: ENV_SRC_API_URL, .. }),
                "{bad}: {err}"
            );
        }
    }

    #[test]
    fn test_empty_filters_mean_everything() {
        let mut settings = Settings::default();
        settings.transfer.forms = Some(vec![" ".to_string()]);
        settings.transfer.events = Some(Vec::new());
        settings.report.form = Some(String::new());
        let transfer = settings.transfer_settings();
        assert!(transfer.forms.is_none());
        assert!(transfer.events.is_none());
        assert!(transfer.report_form.is_none());
    }

    #[test]
    fn test_debug_redacts_tokens() {
        let settings = credentials();
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("AAAA"));
        assert!(!rendered.contains("BBBB"));
        let (source, _) = settings.endpoints().unwrap();
        assert!(!format!("{:?}", source).contains("AAAA"));
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag(ENV_MOVE_RECORDS, "TRUE").unwrap());
        assert!(parse_flag(ENV_MOVE_RECORDS, " yes ").unwrap());
        assert!(!parse_flag(ENV_MOVE_RECORDS, "0").unwrap());
        assert!(parse_flag(ENV_MOVE_RECORDS, "").is_err());
    }
}
