use anyhow::{anyhow, Context, Result};
use dirs::config_dir;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::server::{Scheme, ServerIdentity};

/// Main configuration structure for remotemap
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// Directories scanned for local git repositories
    #[serde(default = "default_roots")]
    pub roots: Vec<String>,

    /// Default public hosting server every installation knows about
    #[serde(default = "default_host")]
    pub default_host: String,

    /// Authenticated account entries (self-hosted or public servers)
    #[serde(default)]
    pub accounts: Vec<AccountEntry>,

    /// Server discovery probing settings
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Reconciliation behavior settings
    #[serde(default)]
    pub reconcile: ReconcileConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// One authenticated account against a hosting server
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct AccountEntry {
    /// Server host name
    pub host: String,

    /// Transport scheme
    #[serde(default = "default_scheme")]
    pub scheme: Scheme,

    /// Explicit port if the server runs off the scheme default
    #[serde(default)]
    pub port: Option<u16>,

    /// Installation path suffix (e.g. "gitea" for https://host/gitea)
    #[serde(default)]
    pub suffix: Option<String>,

    /// Account login, informational only
    #[serde(default)]
    pub username: Option<String>,
}

impl AccountEntry {
    /// The server identity this account authenticates against
    pub fn server(&self) -> ServerIdentity {
        ServerIdentity {
            scheme: self.scheme,
            host: self.host.clone(),
            port: self.port,
            suffix: self.suffix.clone().filter(|s| !s.is_empty()),
        }
    }
}

/// Discovery probing configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ProbeConfig {
    /// Alternate secure port tried as the last probe candidate
    #[serde(default = "default_alt_port")]
    pub alt_port: u16,

    /// Path of the server metadata endpoint, relative to the server base URL
    #[serde(default = "default_metadata_path")]
    pub metadata_path: String,

    /// Per-request timeout for metadata fetches, in seconds
    #[serde(default = "default_probe_timeout")]
    pub timeout_secs: u64,
}

/// Reconciliation behavior configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ReconcileConfig {
    /// Coalescing delay applied to change triggers, in milliseconds
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Repository rescan interval for daemon mode ("30s", "5m", "1h")
    #[serde(default = "default_rescan_interval")]
    pub rescan_interval: String,
}

/// Logging configuration
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String, // "info"

    /// Log format
    #[serde(default = "default_log_format")]
    pub format: String, // "compact"
}

// Default value functions
fn default_roots() -> Vec<String> {
    vec!["~/dev".to_string()]
}
fn default_host() -> String {
    "github.com".to_string()
}
fn default_scheme() -> Scheme {
    Scheme::Https
}
fn default_alt_port() -> u16 {
    8080
}
fn default_metadata_path() -> String {
    "api/v1/meta".to_string()
}
fn default_probe_timeout() -> u64 {
    5
}
fn default_debounce_ms() -> u64 {
    50
}
fn default_rescan_interval() -> String {
    "5m".to_string()
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "compact".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            roots: default_roots(),
            default_host: default_host(),
            accounts: Vec::new(),
            probe: ProbeConfig::default(),
            reconcile: ReconcileConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            alt_port: default_alt_port(),
            metadata_path: default_metadata_path(),
            timeout_secs: default_probe_timeout(),
        }
    }
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            rescan_interval: default_rescan_interval(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl Config {
    /// Default configuration file location (XDG compliant)
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = config_dir().context("Could not determine config directory")?;
        Ok(config_dir.join("remotemap").join("config.yml"))
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from the default location, falling back to defaults
    pub fn load_or_default() -> Result<Self> {
        let path = Self::default_path()?;
        if path.exists() {
            Self::load_from_file(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Write this configuration to the given file, creating parent directories
    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = serde_yaml::to_string(self).context("Failed to serialize configuration")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.default_host.trim().is_empty() {
            return Err(anyhow!("default_host must not be empty"));
        }
        for account in &self.accounts {
            if account.host.trim().is_empty() {
                return Err(anyhow!("Account entry with empty host"));
            }
        }
        parse_duration(&self.reconcile.rescan_interval)
            .context("Invalid reconcile.rescan_interval")?;
        Ok(())
    }

    /// Scan roots with shell variables and tilde expanded
    pub fn expanded_roots(&self) -> Vec<PathBuf> {
        self.roots
            .iter()
            .map(|root| {
                let expanded = shellexpand::full(root)
                    .unwrap_or_else(|_| std::borrow::Cow::Borrowed(root.as_str()));
                PathBuf::from(expanded.as_ref())
            })
            .collect()
    }

    /// The always-present default public server identity
    pub fn default_server(&self) -> ServerIdentity {
        ServerIdentity::https(self.default_host.clone())
    }

    /// Rescan interval parsed into seconds
    pub fn rescan_interval_secs(&self) -> Result<u64> {
        parse_duration(&self.reconcile.rescan_interval)
    }
}

/// Parse duration strings like "30s", "5m", "1h", "2d" into seconds
pub fn parse_duration(duration_str: &str) -> Result<u64> {
    let duration_str = duration_str.trim().to_lowercase();

    if let Some(value) = duration_str.strip_suffix('s') {
        value.parse::<u64>().context("Invalid seconds value")
    } else if let Some(value) = duration_str.strip_suffix('m') {
        value
            .parse::<u64>()
            .map(|v| v * 60)
            .context("Invalid minutes value")
    } else if let Some(value) = duration_str.strip_suffix('h') {
        value
            .parse::<u64>()
            .map(|v| v * 3600)
            .context("Invalid hours value")
    } else if let Some(value) = duration_str.strip_suffix('d') {
        value
            .parse::<u64>()
            .map(|v| v * 86400)
            .context("Invalid days value")
    } else {
        duration_str
            .parse::<u64>()
            .context("Invalid duration format. Use format like '30s', '5m', '1h'")
    }
}
