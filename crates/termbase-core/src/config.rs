//! Runtime configuration.
//!
//! Configuration can be loaded from:
//! - a TOML file (`TERMBASE_CONFIG`, else `~/.config/termbase/config.toml`)
//! - environment variables (`DATABASE_URL`, `TERMBASE_*`)
//!
//! # Example
//!
//! ```rust,no_run
//! use termbase_core::config::TermbaseConfig;
//!
//! let config = TermbaseConfig::load().expect("Failed to load config");
//! config.validate().expect("Invalid config");
//! ```

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::defaults;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

impl From<ConfigError> for crate::Error {
    fn from(e: ConfigError) -> Self {
        crate::Error::Config(e.to_string())
    }
}

/// Database connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// PostgreSQL URL. `None` means the in-memory store.
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default = "DatabaseSettings::default_max_connections")]
    pub max_connections: u32,
    #[serde(default = "DatabaseSettings::default_connect_timeout")]
    pub connect_timeout_secs: u64,
}

impl DatabaseSettings {
    fn default_max_connections() -> u32 {
        defaults::DB_MAX_CONNECTIONS
    }

    fn default_connect_timeout() -> u64 {
        defaults::DB_CONNECT_TIMEOUT_SECS
    }
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: Self::default_max_connections(),
            connect_timeout_secs: Self::default_connect_timeout(),
        }
    }
}

/// Top-level termbase configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TermbaseConfig {
    /// Locale given to new sources that do not name one.
    #[serde(default = "TermbaseConfig::default_locale")]
    pub default_locale: String,
    #[serde(default)]
    pub database: DatabaseSettings,
}

impl Default for TermbaseConfig {
    fn default() -> Self {
        Self {
            default_locale: Self::default_locale(),
            database: DatabaseSettings::default(),
        }
    }
}

impl TermbaseConfig {
    fn default_locale() -> String {
        defaults::DEFAULT_LOCALE.to_string()
    }

    /// Path of the config file consulted by [`TermbaseConfig::load`].
    pub fn default_config_path() -> PathBuf {
        if let Ok(path) = env::var("TERMBASE_CONFIG") {
            return PathBuf::from(path);
        }
        let home = env::var("HOME").unwrap_or_else(|_| ".".to_string());
        PathBuf::from(home)
            .join(".config")
            .join("termbase")
            .join("config.toml")
    }

    /// Load from the default config file if present, else from environment
    /// variables.
    pub fn load() -> ConfigResult<Self> {
        let path = Self::default_config_path();

        if path.exists() {
            info!("Loading termbase config from: {}", path.display());
            Self::from_file(&path)
        } else {
            debug!(
                "Config file not found at {}, using environment variables",
                path.display()
            );
            Ok(Self::from_env())
        }
    }

    /// Load from a TOML file with a `[termbase]` table.
    pub fn from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse TOML text, substituting `${VAR}` references first.
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        #[derive(Deserialize)]
        struct TomlRoot {
            #[serde(default)]
            termbase: TermbaseConfig,
        }

        let content = substitute_env_vars(content);
        let root: TomlRoot = toml::from_str(&content)?;
        Ok(root.termbase)
    }

    /// Load from environment variables, with defaults for anything unset.
    pub fn from_env() -> Self {
        let database = DatabaseSettings {
            url: env::var("DATABASE_URL").ok(),
            max_connections: env::var("TERMBASE_DB_MAX_CONNECTIONS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::DB_MAX_CONNECTIONS),
            connect_timeout_secs: env::var("TERMBASE_DB_CONNECT_TIMEOUT_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults::DB_CONNECT_TIMEOUT_SECS),
        };

        Self {
            default_locale: env::var("TERMBASE_DEFAULT_LOCALE")
                .unwrap_or_else(|_| Self::default_locale()),
            database,
        }
    }

    /// Validate the configuration.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.default_locale.trim().is_empty() {
            return Err(ConfigError::Validation(
                "default_locale cannot be empty".to_string(),
            ));
        }

        if let Some(url) = &self.database.url {
            if !url.starts_with("postgres://") && !url.starts_with("postgresql://") {
                return Err(ConfigError::Validation(format!(
                    "database url must start with postgres:// or postgresql://, got: {}",
                    url
                )));
            }
        }

        if self.database.max_connections == 0 {
            return Err(ConfigError::Validation(
                "database max_connections must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

/// Replace `${VAR}` with the variable's value (empty when unset).
fn substitute_env_vars(content: &str) -> String {
    let mut result = String::with_capacity(content.len());
    let mut rest = content;

    while let Some(start) = rest.find("${") {
        result.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find('}') {
            Some(end) => {
                let name = &after[..end];
                result.push_str(&env::var(name).unwrap_or_default());
                rest = &after[end + 1..];
            }
            None => {
                result.push_str(&rest[start..]);
                rest = "";
            }
        }
    }
    result.push_str(rest);
    result
}
