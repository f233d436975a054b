//! Application configuration.
//!
//! Configuration is loaded from a TOML file at:
//! 1. `$PDFHARVEST_CONFIG` (environment variable)
//! 2. `~/.config/pdfharvest/config.toml` (Linux)
//!    `~/Library/Application Support/pdfharvest/config.toml` (macOS)
//! 3. Built-in defaults

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::classify::rule::{VendorRule, DEFAULT_KEYWORD, DEFAULT_VENDOR_TAG};
use crate::cursor::DEFAULT_QUERY_FILTER;
use crate::error::{HarvestError, Result};
use crate::ledger::DEFAULT_LOOKBACK_DAYS;

/// Environment variable that overrides the config file location.
pub const CONFIG_ENV: &str = "PDFHARVEST_CONFIG";

const APP_DIR: &str = "pdfharvest";
const LEDGER_FILE: &str = "activity.json";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,
    pub fetch: FetchConfig,
    pub classify: ClassifyConfig,
    pub notify: NotifyConfig,
}

/// General behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log level: "error", "warn", "info", "debug", "trace".
    pub log_level: String,
    /// Directory for the ledger and logs (default: `~/.config/pdfharvest`).
    pub config_dir: Option<PathBuf>,
    /// Override the ledger file (default: `<config_dir>/activity.json`).
    pub ledger_path: Option<PathBuf>,
    /// Override the log directory (default: `<config_dir>/logs`).
    pub log_dir: Option<PathBuf>,
}

/// Where messages come from and where PDFs go.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Download directory (default: `~/Downloads/attachments`).
    pub attachments_dir: Option<PathBuf>,
    /// Directory of `.eml` files served as the mailbox.
    pub spool_dir: Option<PathBuf>,
    /// Days to look back when there is no checkpoint.
    pub lookback_days: i64,
    /// Provider search filter appended after the date bound.
    pub query_filter: String,
}

/// Rename rule settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifyConfig {
    /// Sender display name to match, also used in the new filename.
    pub vendor_tag: String,
    /// Subject keyword to match, also used in the new filename.
    pub keyword: String,
}

/// Desktop notification settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Send a desktop notification; when false, notifications are only logged.
    pub enabled: bool,
    /// Notification program, invoked with terminal-notifier arguments.
    pub program: PathBuf,
}

// ── Default implementations ─────────────────────────────────────

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            config_dir: None,
            ledger_path: None,
            log_dir: None,
        }
    }
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            attachments_dir: None,
            spool_dir: None,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            query_filter: DEFAULT_QUERY_FILTER.to_string(),
        }
    }
}

impl Default for ClassifyConfig {
    fn default() -> Self {
        Self {
            vendor_tag: DEFAULT_VENDOR_TAG.to_string(),
            keyword: DEFAULT_KEYWORD.to_string(),
        }
    }
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            enabled: cfg!(target_os = "macos"),
            program: PathBuf::from("terminal-notifier"),
        }
    }
}

impl ClassifyConfig {
    pub fn rule(&self) -> VendorRule {
        VendorRule::new(&self.vendor_tag, &self.keyword)
    }
}

// ── Load ────────────────────────────────────────────────────────

/// Load configuration, searching standard locations.
///
/// Returns the default configuration if no file is found or on parse error.
pub fn load_config() -> Config {
    match config_file_path() {
        Some(path) => load_config_from(&path),
        None => Config::default(),
    }
}

/// Load configuration from `path`, falling back to defaults.
pub fn load_config_from(path: &Path) -> Config {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "No config file, using defaults");
        return Config::default();
    }
    match std::fs::read_to_string(path) {
        Ok(contents) => match toml::from_str::<Config>(&contents) {
            Ok(cfg) => {
                tracing::info!(path = %path.display(), "Loaded config");
                cfg
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "Failed to parse config, using defaults"
                );
                Config::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "Failed to read config file, using defaults"
            );
            Config::default()
        }
    }
}

/// Determine the config file path (checking env var first, then standard dirs).
pub fn config_file_path() -> Option<PathBuf> {
    if let Ok(env_path) = std::env::var(CONFIG_ENV) {
        return Some(PathBuf::from(env_path));
    }
    dirs::config_dir().map(|d| d.join(APP_DIR).join("config.toml"))
}

// ── Paths ───────────────────────────────────────────────────────

/// Concrete locations used by a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    pub config_dir: PathBuf,
    pub ledger: PathBuf,
    pub log_dir: PathBuf,
    pub attachments_dir: PathBuf,
    pub spool_dir: PathBuf,
}

impl Paths {
    /// Fill in defaults for every location the config leaves unset.
    pub fn resolve(config: &Config) -> Result<Self> {
        let config_dir = match &config.general.config_dir {
            Some(dir) => dir.clone(),
            None => dirs::home_dir()
                .map(|h| h.join(".config").join(APP_DIR))
                .ok_or_else(|| HarvestError::Config("cannot determine home directory".into()))?,
        };
        let attachments_dir = match &config.fetch.attachments_dir {
            Some(dir) => dir.clone(),
            None => dirs::download_dir()
                .or_else(|| dirs::home_dir().map(|h| h.join("Downloads")))
                .map(|d| d.join("attachments"))
                .ok_or_else(|| {
                    HarvestError::Config("cannot determine downloads directory".into())
                })?,
        };
        Ok(Self {
            ledger: config
                .general
                .ledger_path
                .clone()
                .unwrap_or_else(|| config_dir.join(LEDGER_FILE)),
            log_dir: config
                .general
                .log_dir
                .clone()
                .unwrap_or_else(|| config_dir.join("logs")),
            spool_dir: config
                .fetch
                .spool_dir
                .clone()
                .unwrap_or_else(|| config_dir.join("spool")),
            config_dir,
            attachments_dir,
        })
    }

    /// Create the directories a run writes into.
    pub fn bootstrap(&self) -> Result<()> {
        let ledger_dir = self.ledger.parent().unwrap_or(Path::new("."));
        for dir in [&self.config_dir, &self.log_dir, &self.attachments_dir] {
            std::fs::create_dir_all(dir).map_err(|e| HarvestError::io(dir, e))?;
        }
        std::fs::create_dir_all(ledger_dir).map_err(|e| HarvestError::io(ledger_dir, e))?;
        Ok(())
    }
}
