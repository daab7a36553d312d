//! Configuration file handling.
//!
//! This module provides loading and saving of pentrail configuration
//! from a TOML file.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/pentrail/config.toml`
//! - macOS: `~/Library/Application Support/pentrail/config.toml`
//! - Windows: `%APPDATA%\pentrail\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! port_range = [1, 1024]
//! default_modules = ["port-scan", "service-scan", "vulnerability-probe"]
//! report_dir = "reports"
//!
//! [scan]
//! max_threads = 50
//! connect_timeout_ms = 1000
//! verify_ssl = true
//!
//! [scheduler]
//! max_concurrent_targets = 4
//!
//! [exclude]
//! targets = ["*.internal.example.com"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::logging::LogConfig;
use crate::module::ModuleKind;

/// Environment variable that overrides `scope.api_token`.
pub const SCOPE_TOKEN_ENV: &str = "PENTRAIL_SCOPE_TOKEN";

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Settings captured by every scan when it starts.
    pub scan: ScanConfiguration,

    pub scheduler: SchedulerConfig,

    /// Inclusive port range probed by the port-scan module.
    ///
    /// Default: [1, 1024]
    pub port_range: [u16; 2],

    /// Modules run when no `--module` flag is given, in order.
    pub default_modules: Vec<ModuleKind>,

    /// Root directory for report artifacts and external tool output.
    ///
    /// Default: "reports"
    pub report_dir: PathBuf,

    pub notify: NotifyConfig,

    pub scope: ScopeConfig,

    pub logging: LogConfig,

    /// Targets that must never be scheduled.
    #[serde(default)]
    pub exclude: ExcludeConfig,
}

/// Per-scan settings, snapshotted into each [`Scan`](crate::Scan).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfiguration {
    /// Maximum simultaneous connection attempts per target.
    ///
    /// Default: 10
    pub max_threads: usize,

    /// Timeout for resolution and HTTP requests, in seconds.
    ///
    /// Default: 5
    pub timeout_secs: u64,

    /// Per-port connect timeout, in milliseconds. A port that does not answer
    /// in time is reported closed.
    ///
    /// Default: 1000
    pub connect_timeout_ms: u64,

    pub user_agent: String,

    /// Proxy URLs keyed by scheme ("http", "https" or "all").
    pub proxies: Option<BTreeMap<String, String>>,

    pub verify_ssl: bool,
}

impl Default for ScanConfiguration {
    fn default() -> Self {
        Self {
            max_threads: 10,
            timeout_secs: 5,
            connect_timeout_ms: 1000,
            user_agent: format!("pentrail/{}", env!("CARGO_PKG_VERSION")),
            proxies: None,
            verify_ssl: true,
        }
    }
}

impl ScanConfiguration {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum number of targets whose pipelines run at the same time.
    ///
    /// Default: 4
    pub max_concurrent_targets: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_targets: 4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Mail recipient for report artifacts. Notification is off when unset.
    pub recipient: Option<String>,

    /// Mail program invoked as `<command> -s <subject> -a <files...> -- <recipient>`.
    ///
    /// Default: "mutt"
    pub command: String,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            recipient: None,
            command: "mutt".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScopeConfig {
    /// Program listing endpoint of the bug-bounty platform.
    pub api_url: String,

    /// Bearer token. `PENTRAIL_SCOPE_TOKEN` takes precedence.
    pub api_token: Option<String>,
}

impl Default for ScopeConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.hackerone.com/v1/hackers/programs".to_string(),
            api_token: None,
        }
    }
}

impl ScopeConfig {
    pub fn token(&self) -> Option<String> {
        std::env::var(SCOPE_TOKEN_ENV)
            .ok()
            .filter(|t| !t.is_empty())
            .or_else(|| self.api_token.clone())
    }
}

/// Targets to drop before scheduling.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExcludeConfig {
    /// Target identifiers or hosts to skip. Supports `*` wildcards
    /// (e.g., "*.internal.example.com", "10.0.*").
    pub targets: Vec<String>,
}

impl ExcludeConfig {
    /// Check if a target should be skipped, matching either its raw
    /// identifier or its host.
    pub fn should_exclude(&self, raw: &str, host: &str) -> bool {
        self.targets.iter().any(|pattern| {
            if pattern.contains('*') {
                glob_match(pattern, raw) || glob_match(pattern, host)
            } else {
                pattern == raw || pattern == host
            }
        })
    }
}

/// Simple glob matching (supports * as wildcard).
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return pattern == text;
    }

    let mut remaining = text;

    // Check prefix (before first *)
    if !parts[0].is_empty() {
        if !remaining.starts_with(parts[0]) {
            return false;
        }
        remaining = &remaining[parts[0].len()..];
    }

    // Check suffix (after last *)
    let last_part = parts[parts.len() - 1];
    if !last_part.is_empty() {
        if !remaining.ends_with(last_part) {
            return false;
        }
        remaining = &remaining[..remaining.len() - last_part.len()];
    }

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        if let Some(pos) = remaining.find(part) {
            remaining = &remaining[pos + part.len()..];
        } else {
            return false;
        }
    }

    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            scan: ScanConfiguration::default(),
            scheduler: SchedulerConfig::default(),
            port_range: [1, 1024],
            default_modules: vec![
                ModuleKind::PortScan,
                ModuleKind::ServiceScan,
                ModuleKind::VulnerabilityProbe,
            ],
            report_dir: PathBuf::from("reports"),
            notify: NotifyConfig::default(),
            scope: ScopeConfig::default(),
            logging: LogConfig::default(),
            exclude: ExcludeConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the default config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Self::config_path();

        if !path.exists() {
            return Ok(Self::default());
        }

        Self::load_from(&path)
    }

    /// Loads configuration from an explicit path. The file must exist.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(config)
    }

    /// Saves the configuration to the default config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    pub fn config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("pentrail")
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }
}
