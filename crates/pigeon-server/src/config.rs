//! Server configuration loading from file and environment variables.

use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr};
use thiserror::Error;

/// Top-level server configuration.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server network settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Event log read limits.
    #[serde(default)]
    pub log: LogConfig,

    /// Console subscriber settings.
    #[serde(default)]
    pub subscriber: SubscriberConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Network configuration for the HTTP server.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to.
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,
}

/// Database configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_db_path")]
    pub path: String,

    /// SQLite busy timeout in milliseconds.
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled SQLite connections.
    #[serde(default = "default_pool_max_size")]
    pub pool_max_size: u32,

    /// How long to wait for a pooled connection before reporting the store
    /// unavailable, in milliseconds.
    #[serde(default = "default_connection_timeout_ms")]
    pub connection_timeout_ms: u64,
}

/// Limits for reads from the event log.
#[derive(Debug, Clone, Deserialize)]
pub struct LogConfig {
    /// Largest accepted `limit` for `GET /alerts/recent`.
    #[serde(default = "default_max_recent_limit")]
    pub max_recent_limit: u32,

    /// `limit` used when the request does not give one.
    #[serde(default = "default_recent_limit")]
    pub default_recent_limit: u32,
}

/// Console subscriber configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct SubscriberConfig {
    /// Whether to print every alert to stdout.
    #[serde(default)]
    pub enabled: bool,

    /// Replay the whole log instead of starting at its tail.
    #[serde(default)]
    pub from_start: bool,

    /// Delay before retrying after the store becomes unavailable.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "pigeon_log=debug,info").
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Whether to output logs in JSON format.
    #[serde(default)]
    pub json: bool,
}

fn default_host() -> IpAddr {
    IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
}

fn default_port() -> u16 {
    8000
}

fn default_db_path() -> String {
    "eventpigeon.db".to_string()
}

fn default_busy_timeout_ms() -> u64 {
    5_000
}

fn default_pool_max_size() -> u32 {
    8
}

fn default_connection_timeout_ms() -> u64 {
    5_000
}

fn default_max_recent_limit() -> u32 {
    pigeon_log::DEFAULT_MAX_RECENT_LIMIT
}

fn default_recent_limit() -> u32 {
    10
}

fn default_retry_delay_ms() -> u64 {
    1_000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            busy_timeout_ms: default_busy_timeout_ms(),
            pool_max_size: default_pool_max_size(),
            connection_timeout_ms: default_connection_timeout_ms(),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            max_recent_limit: default_max_recent_limit(),
            default_recent_limit: default_recent_limit(),
        }
    }
}

impl Default for SubscriberConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            from_start: false,
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            json: false,
        }
    }
}

impl DatabaseConfig {
    /// Pool tunables derived from this section.
    pub fn runtime_settings(&self) -> pigeon_db::DbRuntimeSettings {
        pigeon_db::DbRuntimeSettings {
            busy_timeout_ms: self.busy_timeout_ms,
            pool_max_size: self.pool_max_size,
            connection_timeout_ms: self.connection_timeout_ms,
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    /// Failed to parse the configuration file.
    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    /// A value is outside its allowed range.
    #[error("invalid config: {0}")]
    Invalid(String),
}

fn is_truthy(value: &str) -> bool {
    matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes")
}

/// Loads configuration from a TOML file, falling back to defaults.
///
/// Environment variable overrides:
/// - `PIGEON_HOST` overrides `server.host`
/// - `PIGEON_PORT` overrides `server.port`
/// - `PIGEON_DB_PATH` overrides `database.path`
/// - `PIGEON_LOG_LEVEL` overrides `logging.level`
/// - `PIGEON_LOG_JSON` overrides `logging.json`
/// - `PIGEON_SUBSCRIBER` overrides `subscriber.enabled`
/// - `PIGEON_FROM_START` overrides `subscriber.from_start`
///
/// Boolean variables accept `1`, `true`, or `yes` (case-insensitive).
///
/// # Errors
///
/// Returns `ConfigError` if the file exists but cannot be read or parsed,
/// or if the recent-read limits are inconsistent.
pub fn load_config(path: Option<&str>) -> Result<Config, ConfigError> {
    let mut config = match path {
        Some(p) => match std::fs::read_to_string(p) {
            Ok(contents) => toml::from_str(&contents)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = p, "config file not found, using defaults");
                Config::default()
            }
            Err(e) => return Err(ConfigError::FileRead(e)),
        },
        None => Config::default(),
    };

    if let Ok(host) = std::env::var("PIGEON_HOST") {
        if let Ok(parsed) = host.parse() {
            config.server.host = parsed;
        }
    }
    if let Ok(port) = std::env::var("PIGEON_PORT") {
        if let Ok(parsed) = port.parse() {
            config.server.port = parsed;
        }
    }
    if let Ok(db_path) = std::env::var("PIGEON_DB_PATH") {
        config.database.path = db_path;
    }
    if let Ok(level) = std::env::var("PIGEON_LOG_LEVEL") {
        config.logging.level = level;
    }
    if let Ok(json) = std::env::var("PIGEON_LOG_JSON") {
        config.logging.json = is_truthy(&json);
    }
    if let Ok(enabled) = std::env::var("PIGEON_SUBSCRIBER") {
        config.subscriber.enabled = is_truthy(&enabled);
    }
    if let Ok(from_start) = std::env::var("PIGEON_FROM_START") {
        config.subscriber.from_start = is_truthy(&from_start);
    }

    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<(), ConfigError> {
    let log = &config.log;
    if log.max_recent_limit == 0 {
        return Err(ConfigError::Invalid(
            "log.max_recent_limit must be at least 1".to_string(),
        ));
    }
    if log.default_recent_limit == 0 || log.default_recent_limit > log.max_recent_limit {
        return Err(ConfigError::Invalid(format!(
            "log.default_recent_limit must be between 1 and {}, got {}",
            log.max_recent_limit, log.default_recent_limit
        )));
    }
    Ok(())
}
