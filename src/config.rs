//! Configuration System
//!
//! Handles loading configuration from files and environment variables.
//! Supports TOML config files and environment variable overrides.

use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Storage layer configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    #[serde(default = "default_db_path")]
    pub path: String,

    #[serde(default = "default_max_connections")]
    pub max_connections: usize,

    #[serde(default = "default_min_idle")]
    pub min_idle: usize,

    #[serde(default = "default_acquire_timeout")]
    pub acquire_timeout_ms: u64,

    #[serde(default = "default_import_batch_size")]
    pub import_batch_size: usize,
}

fn default_db_path() -> String {
    dirs::data_local_dir()
        .map(|p| {
            p.join("tickstore")
                .join("tickstore.db")
                .to_string_lossy()
                .to_string()
        })
        .unwrap_or_else(|| "./tickstore.db".to_string())
}

fn default_max_connections() -> usize {
    8
}

fn default_min_idle() -> usize {
    2
}

fn default_acquire_timeout() -> u64 {
    5000 // 5 seconds
}

fn default_import_batch_size() -> usize {
    1000
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
            max_connections: default_max_connections(),
            min_idle: default_min_idle(),
            acquire_timeout_ms: default_acquire_timeout(),
            import_batch_size: default_import_batch_size(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default = "default_log_format")]
    pub format: String,

    pub file: Option<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
        }
    }
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            error: e.to_string(),
        })?;

        Ok(config)
    }

    /// Load configuration from environment variables only
    pub fn from_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    /// Load configuration with environment variable overrides
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from default locations or environment
    pub fn load_default() -> Self {
        // Try default config locations
        let config_paths = [
            dirs::config_dir().map(|p| p.join("tickstore").join("config.toml")),
            Some(PathBuf::from("/etc/tickstore/config.toml")),
            Some(PathBuf::from("./config.toml")),
        ];

        for path_opt in config_paths.iter().flatten() {
            if path_opt.exists() {
                match Self::load_with_env(path_opt) {
                    Ok(config) => {
                        tracing::info!("Loaded config from {:?}", path_opt);
                        return config;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to load config from {:?}: {}", path_opt, e);
                    }
                }
            }
        }

        // Fall back to environment-only config
        tracing::info!("Using default config with environment overrides");
        Self::from_env()
    }

    /// Apply environment variable overrides to an existing config
    fn apply_env_overrides(&mut self) {
        // Store overrides
        if let Ok(path) = std::env::var("TICKSTORE_DB_PATH") {
            self.store.path = path;
        }
        if let Ok(max) = std::env::var("TICKSTORE_MAX_CONNECTIONS") {
            if let Ok(n) = max.parse() {
                self.store.max_connections = n;
            }
        }
        if let Ok(min) = std::env::var("TICKSTORE_MIN_IDLE") {
            if let Ok(n) = min.parse() {
                self.store.min_idle = n;
            }
        }
        if let Ok(timeout) = std::env::var("TICKSTORE_ACQUIRE_TIMEOUT_MS") {
            if let Ok(n) = timeout.parse() {
                self.store.acquire_timeout_ms = n;
            }
        }
        if let Ok(batch) = std::env::var("TICKSTORE_IMPORT_BATCH_SIZE") {
            if let Ok(n) = batch.parse() {
                self.store.import_batch_size = n;
            }
        }

        // Logging overrides
        if let Ok(level) = std::env::var("TICKSTORE_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(format) = std::env::var("TICKSTORE_LOG_FORMAT") {
            self.logging.format = format;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {error}")]
    Io { path: PathBuf, error: String },

    #[error("Failed to parse config file {path:?}: {error}")]
    Parse { path: PathBuf, error: String },
}

/// Generate a default config file content
pub fn generate_default_config() -> String {
    r#"# Tickstore Configuration
#
# Environment variables override these settings:
# - TICKSTORE_DB_PATH
# - TICKSTORE_MAX_CONNECTIONS
# - TICKSTORE_MIN_IDLE
# - TICKSTORE_ACQUIRE_TIMEOUT_MS
# - TICKSTORE_IMPORT_BATCH_SIZE
# - TICKSTORE_LOG_LEVEL
# - TICKSTORE_LOG_FORMAT

[store]
# Path of the store file
path = "~/.local/share/tickstore/tickstore.db"

# Maximum number of concurrently open connections
max_connections = 8

# Connections pre-warmed at startup
min_idle = 2

# How long acquire() waits before reporting pool exhaustion (ms)
acquire_timeout_ms = 5000

# Rows per transaction during bulk import
import_batch_size = 1000

[logging]
# Log level: trace, debug, info, warn, error
level = "info"

# Log format: pretty (for development) or json (for production)
format = "pretty"

# Optional log file path
# file = "/var/log/tickstore/tickstore.log"
"#
    .to_string()
}
