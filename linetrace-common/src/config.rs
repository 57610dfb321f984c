//! Configuration loading and policy settings
//!
//! Bootstrap configuration is a small TOML file. The file is located with
//! this priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. Platform config file (`~/.config/linetrace/config.toml`, `/etc/linetrace/config.toml`)
//! 4. Built-in defaults (fallback)

use crate::time::DEFAULT_TIMEZONE;
use crate::{Error, Result};
use chrono_tz::Tz;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::info;

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "LINETRACE_CONFIG";

/// Which fields make two traceability records the same unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DedupKey {
    /// A serial may be recorded once, whatever the product type
    #[default]
    Serial,
    /// A serial may be recorded once per product type
    SerialAndProduct,
}

/// What the intake machine does with the pending serial after a duplicate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Keep the serial so the operator can scan another order for it
    RetrySameSerial,
    /// Drop the serial; the operator starts over
    #[default]
    AbandonSerial,
}

/// Row type whose presence marks a unit as inspected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionMarker {
    /// At least one answer row exists
    #[default]
    AnyAnswer,
    /// A checklist header row exists
    Header,
}

/// Where a question's complement is stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplementEncoding {
    /// Appended to the item label: `"{item_key} - {complement}"`
    InlineLabel,
    /// Kept in its own `complement` column
    #[default]
    SeparateField,
}

/// Business policy switches
#[derive(Debug, Clone, Copy, Default, Deserialize)]
#[serde(default)]
pub struct Policies {
    pub dedup_key: DedupKey,
    pub on_duplicate: DuplicatePolicy,
    pub completion_marker: CompletionMarker,
    pub complement_encoding: ComplementEncoding,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Station bootstrap configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StationConfig {
    /// Path to the SQLite record store
    pub database_path: PathBuf,

    /// HTTP server port
    pub port: u16,

    /// Root directory for evidence photos
    pub evidence_root: PathBuf,

    /// Base URL under which evidence files are served
    pub public_base_url: String,

    /// IANA timezone used for "today" comparisons
    pub timezone: String,

    /// Row cap for the dashboard listing
    pub dashboard_limit: i64,

    /// Operator name used when a session does not provide one
    pub default_operator: String,

    /// Request body cap for checklist submissions, photos included
    pub max_submission_bytes: usize,

    /// Sessions untouched for longer than this are dropped
    pub session_idle_minutes: i64,

    pub policies: Policies,

    pub logging: LoggingConfig,
}

impl Default for StationConfig {
    fn default() -> Self {
        let root = get_default_root_folder();
        Self {
            database_path: root.join("linetrace.db"),
            port: 5830,
            evidence_root: root.join("evidence"),
            public_base_url: "http://127.0.0.1:5830/evidence".to_string(),
            timezone: DEFAULT_TIMEZONE.name().to_string(),
            dashboard_limit: 1000,
            default_operator: "Operador_Logado".to_string(),
            max_submission_bytes: 32 * 1024 * 1024,
            session_idle_minutes: 12 * 60,
            policies: Policies::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl StationConfig {
    /// Parse configuration from TOML text and validate it
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StationConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("Cannot read config file {}: {}", path.display(), e))
        })?;
        Self::from_toml_str(&content)
    }

    /// Resolve and load configuration following the priority order
    pub fn resolve(cli_arg: Option<&Path>) -> Result<Self> {
        match resolve_config_path(cli_arg, CONFIG_ENV_VAR) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                Self::load_file(&path)
            }
            None => {
                info!("No configuration file found, using built-in defaults");
                Ok(Self::default())
            }
        }
    }

    /// Idle time after which a session is evicted
    pub fn session_idle_timeout(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.session_idle_minutes)
    }

    /// Operating timezone
    pub fn tz(&self) -> Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| Error::Config(format!("Unknown timezone {:?}: {}", self.timezone, e)))
    }

    fn validate(&self) -> Result<()> {
        self.tz()?;
        if self.dashboard_limit <= 0 {
            return Err(Error::Config(format!(
                "dashboard_limit must be positive, got {}",
                self.dashboard_limit
            )));
        }
        if self.default_operator.trim().is_empty() {
            return Err(Error::Config("default_operator must not be empty".to_string()));
        }
        if self.max_submission_bytes == 0 {
            return Err(Error::Config("max_submission_bytes must be positive".to_string()));
        }
        if self.session_idle_minutes <= 0 {
            return Err(Error::Config(format!(
                "session_idle_minutes must be positive, got {}",
                self.session_idle_minutes
            )));
        }
        Ok(())
    }
}

/// Locate the configuration file
///
/// Returns `None` when no tier names an existing file, in which case the
/// built-in defaults apply.
pub fn resolve_config_path(cli_arg: Option<&Path>, env_var_name: &str) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_arg {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3: Platform config file
    platform_config_file()
}

fn platform_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("linetrace").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(unix) {
        let system_config = PathBuf::from("/etc/linetrace/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Get OS-dependent default data folder
fn get_default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("linetrace"))
        .unwrap_or_else(|| PathBuf::from("./linetrace_data"))
}
