//! TOML-based configuration for the WebREPL client.
//!
//! Reads and writes [`ClientConfig`] at the platform-appropriate path:
//! - Windows:  `%APPDATA%\webrepl\config.toml`
//! - Linux:    `$XDG_CONFIG_HOME/webrepl/config.toml` or `~/.config/webrepl/config.toml`
//! - macOS:    `~/Library/Application Support/webrepl/config.toml`
//!
//! Example file:
//!
//! ```toml
//! log_level = "debug"
//!
//! [device]
//! password = "s3cret"
//! address = "192.168.1.50"
//!
//! [reboot]
//! max_attempts = 8
//! ```
//!
//! Every field carries a `#[serde(default = ...)]`, so a missing file, a
//! missing section or a missing key all fall back to the built-in values.
//! Durations are stored as milliseconds.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use webrepl_core::protocol::DEFAULT_MAX_FILE_SIZE;
use webrepl_core::{DEFAULT_PASSWORD, DEFAULT_PORT, FALLBACK_ADDRESS};

use crate::application::reset::RebootPolicy;
use crate::infrastructure::transport::SessionTimeouts;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// The platform config directory could not be determined.
    #[error("could not determine platform config directory")]
    NoPlatformConfigDir,

    #[error("I/O error accessing config at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

// ── Config schema ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ClientConfig {
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub reboot: RebootConfig,
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// How to reach and log in to the board.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceConfig {
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Known address; tried before scanning.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    /// Cache key for the last working address.
    #[serde(default = "default_cache_key")]
    pub cache_key: String,
    /// Upload limit in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    /// Address of the board's own access point.
    #[serde(default = "default_fallback_address")]
    pub fallback_address: String,
    /// Per-host TCP connect timeout during the subnet scan.
    #[serde(default = "default_scan_timeout_ms")]
    pub scan_timeout_ms: u64,
    /// Concurrent TCP connects during the subnet scan.
    #[serde(default = "default_max_in_flight")]
    pub max_in_flight: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SessionConfig {
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_auth_timeout_ms")]
    pub auth_timeout_ms: u64,
    #[serde(default = "default_command_timeout_ms")]
    pub command_timeout_ms: u64,
    /// Send Ctrl-C after connecting so the board's main program stops.
    #[serde(default = "default_true")]
    pub interrupt_on_connect: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RebootConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_wait_ms")]
    pub initial_wait_ms: u64,
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_backoff")]
    pub backoff: f64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_password() -> String {
    DEFAULT_PASSWORD.to_string()
}
fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_cache_key() -> String {
    "esp8266".to_string()
}
fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}
fn default_fallback_address() -> String {
    FALLBACK_ADDRESS.to_string()
}
fn default_scan_timeout_ms() -> u64 {
    500
}
fn default_max_in_flight() -> usize {
    100
}
fn default_connect_timeout_ms() -> u64 {
    10_000
}
fn default_auth_timeout_ms() -> u64 {
    2_000
}
fn default_command_timeout_ms() -> u64 {
    5_000
}
fn default_true() -> bool {
    true
}
fn default_max_attempts() -> u32 {
    5
}
fn default_initial_wait_ms() -> u64 {
    5_000
}
fn default_retry_delay_ms() -> u64 {
    3_000
}
fn default_backoff() -> f64 {
    1.5
}
fn default_max_delay_ms() -> u64 {
    10_000
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            password: default_password(),
            port: default_port(),
            address: None,
            cache_key: default_cache_key(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            fallback_address: default_fallback_address(),
            scan_timeout_ms: default_scan_timeout_ms(),
            max_in_flight: default_max_in_flight(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: default_connect_timeout_ms(),
            auth_timeout_ms: default_auth_timeout_ms(),
            command_timeout_ms: default_command_timeout_ms(),
            interrupt_on_connect: default_true(),
        }
    }
}

impl Default for RebootConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            initial_wait_ms: default_initial_wait_ms(),
            retry_delay_ms: default_retry_delay_ms(),
            backoff: default_backoff(),
            max_delay_ms: default_max_delay_ms(),
        }
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig::default(),
            discovery: DiscoveryConfig::default(),
            session: SessionConfig::default(),
            reboot: RebootConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl ClientConfig {
    pub fn session_timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            connect: Duration::from_millis(self.session.connect_timeout_ms),
            auth: Duration::from_millis(self.session.auth_timeout_ms),
            ..SessionTimeouts::default()
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.session.command_timeout_ms)
    }

    pub fn scan_timeout(&self) -> Duration {
        Duration::from_millis(self.discovery.scan_timeout_ms)
    }

    pub fn reboot_policy(&self) -> RebootPolicy {
        RebootPolicy {
            max_attempts: self.reboot.max_attempts,
            initial_wait: Duration::from_millis(self.reboot.initial_wait_ms),
            retry_delay: Duration::from_millis(self.reboot.retry_delay_ms),
            backoff: self.reboot.backoff,
            max_delay: Duration::from_millis(self.reboot.max_delay_ms),
        }
    }
}

// ── Config repository ─────────────────────────────────────────────────────────

/// Full path of the default config file.
///
/// # Errors
///
/// [`ConfigError::NoPlatformConfigDir`] when the environment gives no base
/// directory.
pub fn config_file_path() -> Result<PathBuf, ConfigError> {
    platform_config_dir()
        .map(|dir| dir.join("config.toml"))
        .ok_or(ConfigError::NoPlatformConfigDir)
}

/// Loads the config from `path`, or defaults when the file does not exist.
///
/// # Errors
///
/// [`ConfigError::Io`] for read failures other than "not found" and
/// [`ConfigError::Parse`] for malformed TOML.
pub fn load_config_from(path: &Path) -> Result<ClientConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => Ok(toml::from_str(&content)?),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(ClientConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Loads the config from the platform default path.
///
/// # Errors
///
/// See [`load_config_from`].
pub fn load_config() -> Result<ClientConfig, ConfigError> {
    load_config_from(&config_file_path()?)
}

/// Writes `config` to `path`, creating parent directories.
///
/// # Errors
///
/// [`ConfigError::Io`] or [`ConfigError::Serialize`].
pub fn save_config_to(config: &ClientConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|source| ConfigError::Io {
            path: dir.to_path_buf(),
            source,
        })?;
    }
    let content = toml::to_string_pretty(config)?;
    std::fs::write(path, content).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })
}

fn platform_config_dir() -> Option<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        std::env::var_os("APPDATA").map(|p| PathBuf::from(p).join("webrepl"))
    }

    #[cfg(target_os = "macos")]
    {
        std::env::var_os("HOME").map(|h| {
            PathBuf::from(h)
                .join("Library")
                .join("Application Support")
                .join("webrepl")
        })
    }

    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    {
        let base = std::env::var_os("XDG_CONFIG_HOME")
            .map(PathBuf::from)
            .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
        Some(base.join("webrepl"))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
