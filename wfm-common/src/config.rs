//! Configuration loading and resolution
//!
//! Settings sources, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default
//!
//! A missing TOML file is not an error: a warning is logged and defaults apply.
//! The one setting with no fallback in production is the signing secret.

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const ENV_CONFIG: &str = "WFM_CONFIG";
pub const ENV_SERVER_URL: &str = "WFM_SERVER_URL";
pub const ENV_PROFILE: &str = "WFM_PROFILE";
pub const ENV_SIGNING_SECRET: &str = "WFM_SIGNING_SECRET";

pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_CHANNEL_PATH: &str = "/ws";

/// Deployment profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Production,
    Development,
}

impl Profile {
    /// Resolve from `WFM_PROFILE`, defaulting to production
    pub fn from_env() -> Self {
        match std::env::var(ENV_PROFILE) {
            Ok(v) if v.trim().eq_ignore_ascii_case("development") || v.trim() == "dev" => {
                Profile::Development
            }
            _ => Profile::Production,
        }
    }
}

/// Bootstrap configuration loaded from TOML file
#[derive(Debug, Clone, Deserialize, Default)]
pub struct TomlConfig {
    /// Base URL of the REST server (also used to derive the channel URL)
    #[serde(default)]
    pub server_url: Option<String>,

    #[serde(default)]
    pub profile: Option<Profile>,

    #[serde(default)]
    pub channel: ChannelConfig,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub documents: DocumentsConfig,
}

/// Session channel settings
#[derive(Debug, Clone, Deserialize)]
pub struct ChannelConfig {
    /// Path of the upgrade endpoint on the server
    #[serde(default = "default_channel_path")]
    pub path: String,

    /// Reopen the channel after transient loss
    #[serde(default = "default_true")]
    pub reconnect: bool,

    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,

    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,

    /// Give up after this many consecutive failed attempts (None = never)
    #[serde(default)]
    pub max_attempts: Option<u32>,

    /// Open a channel for employee sessions too
    #[serde(default)]
    pub allow_employee_channel: bool,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            path: default_channel_path(),
            reconnect: true,
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            max_attempts: None,
            allow_employee_channel: false,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// Document store settings
#[derive(Debug, Clone, Deserialize)]
pub struct DocumentsConfig {
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Root folder for stored artifacts
    #[serde(default)]
    pub storage_root: Option<PathBuf>,

    /// Lifetime of signed view URLs
    #[serde(default = "default_view_url_ttl_secs")]
    pub view_url_ttl_secs: u64,
}

impl Default for DocumentsConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            storage_root: None,
            view_url_ttl_secs: default_view_url_ttl_secs(),
        }
    }
}

fn default_channel_path() -> String {
    DEFAULT_CHANNEL_PATH.to_string()
}

fn default_true() -> bool {
    true
}

fn default_initial_backoff_ms() -> u64 {
    500
}

fn default_max_backoff_ms() -> u64 {
    30_000
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database_url() -> String {
    "sqlite:wfm-documents.db?mode=rwc".to_string()
}

fn default_view_url_ttl_secs() -> u64 {
    300
}

impl TomlConfig {
    /// Parse TOML text
    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load configuration
    ///
    /// Uses `explicit` if given, otherwise `WFM_CONFIG`, otherwise the
    /// platform config file. Missing files fall back to defaults with a warning;
    /// a file that exists but does not parse is an error.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var(ENV_CONFIG)
                .ok()
                .map(PathBuf::from)
                .or_else(default_config_file),
        };

        let Some(path) = path else {
            warn!("No config file found, using built-in defaults");
            return Ok(Self::default());
        };

        match std::fs::read_to_string(&path) {
            Ok(text) => {
                let config = Self::from_toml_str(&text)?;
                info!("Loaded configuration from {}", path.display());
                Ok(config)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Config file {} not found, using built-in defaults", path.display());
                Ok(Self::default())
            }
            Err(e) => Err(Error::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))),
        }
    }

    /// Resolve the server base URL (CLI > ENV > TOML > default)
    pub fn resolve_server_url(&self, cli_arg: Option<&str>) -> String {
        if let Some(url) = cli_arg.filter(|s| !s.trim().is_empty()) {
            return url.trim_end_matches('/').to_string();
        }
        if let Ok(url) = std::env::var(ENV_SERVER_URL) {
            if !url.trim().is_empty() {
                return url.trim().trim_end_matches('/').to_string();
            }
        }
        if let Some(url) = self.server_url.as_deref().filter(|s| !s.trim().is_empty()) {
            return url.trim_end_matches('/').to_string();
        }
        DEFAULT_SERVER_URL.to_string()
    }

    /// Resolve the profile (ENV > TOML > production)
    pub fn resolve_profile(&self) -> Profile {
        if std::env::var(ENV_PROFILE).is_ok() {
            return Profile::from_env();
        }
        self.profile.unwrap_or(Profile::Production)
    }
}

/// Platform config file: `~/.config/wfm/config.toml`, then `/etc/wfm/config.toml`
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("wfm").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }
    let system_config = PathBuf::from("/etc/wfm/config.toml");
    if cfg!(unix) && system_config.exists() {
        return Some(system_config);
    }
    None
}

/// Secret used to sign server-issued tokens and view URLs
#[derive(Clone, PartialEq, Eq)]
pub struct SigningSecret(String);

impl SigningSecret {
    pub fn new(value: impl Into<String>) -> Result<Self> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(Error::Config("Signing secret must not be empty".to_string()));
        }
        Ok(Self(value))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for SigningSecret {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningSecret(<redacted>)")
    }
}

/// Resolve the signing secret from `WFM_SIGNING_SECRET`
///
/// Production: a missing or blank secret fails startup.
/// Development: an ephemeral random secret is generated and a warning logged.
pub fn resolve_signing_secret(profile: Profile) -> Result<SigningSecret> {
    match std::env::var(ENV_SIGNING_SECRET) {
        Ok(value) if !value.trim().is_empty() => SigningSecret::new(value),
        _ => match profile {
            Profile::Production => Err(Error::Config(format!(
                "{} is not set. A signing secret is required in production.",
                ENV_SIGNING_SECRET
            ))),
            Profile::Development => {
                use rand::RngCore;

                let mut bytes = [0u8; 32];
                rand::thread_rng().fill_bytes(&mut bytes);
                let secret: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
                warn!(
                    "!!! {} not set: generated an EPHEMERAL development signing secret. \
                     Every restart invalidates issued URLs. NEVER run production like this. !!!",
                    ENV_SIGNING_SECRET
                );
                SigningSecret::new(secret)
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_toml() {
        let config = TomlConfig::from_toml_str("").unwrap();
        assert!(config.server_url.is_none());
        assert_eq!(config.channel.path, "/ws");
        assert!(config.channel.reconnect);
        assert_eq!(config.channel.initial_backoff_ms, 500);
        assert_eq!(config.channel.max_backoff_ms, 30_000);
        assert!(!config.channel.allow_employee_channel);
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.documents.view_url_ttl_secs, 300);
    }

    #[test]
    fn test_partial_sections() {
        let config = TomlConfig::from_toml_str(
            r#"
            server_url = "https://rrhh.example.com/"
            profile = "development"

            [channel]
            reconnect = false
            max_attempts = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.server_url.as_deref(), Some("https://rrhh.example.com/"));
        assert_eq!(config.profile, Some(Profile::Development));
        assert!(!config.channel.reconnect);
        assert_eq!(config.channel.max_attempts, Some(5));
        assert_eq!(config.channel.path, "/ws");
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = TomlConfig::from_toml_str("server_url = [").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_signing_secret_debug_is_redacted() {
        let secret = SigningSecret::new("super-secret").unwrap();
        assert!(!format!("{:?}", secret).contains("super-secret"));
        assert!(SigningSecret::new("   ").is_err());
    }
}
