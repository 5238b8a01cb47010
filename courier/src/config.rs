//! The `courier.toml` configuration file and where to find it.

use std::{
    ffi::OsString,
    fs,
    path::{Path, PathBuf},
};

use courier_smtp::ServerConfig;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "COURIER_CONFIG";

/// Searched, in order, when neither `--config` nor [`CONFIG_ENV`] is given.
pub const DEFAULT_CONFIG_PATHS: [&str; 2] = ["./courier.toml", "/etc/courier/courier.toml"];

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config from {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config in {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("COURIER_CONFIG points to non-existent file: {}", .0.display())]
    MissingEnvTarget(PathBuf),

    #[error("Config file does not exist: {}", .0.display())]
    MissingExplicit(PathBuf),

    #[error("No configuration file found. Tried:\n  - COURIER_CONFIG environment variable\n{tried}")]
    NotFound { tried: String },
}

/// Default envelope sender for messages sent from the command line.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SenderConfig {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// The whole configuration file.
///
/// ```toml
/// [server]
/// host = "smtp.example.com"
/// port = 587
/// username = "orders@example.com"
/// password = "hunter2"
/// use_tls = true
///
/// [sender]
/// address = "orders@example.com"
/// name = "Example Orders"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub server: ServerConfig,
    #[serde(default)]
    pub sender: Option<SenderConfig>,
}

impl AppConfig {
    /// Reads and parses the file at `path`.
    ///
    /// # Errors
    ///
    /// If the file cannot be read or is not a valid configuration.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Find the configuration file using the following precedence:
/// 1. `explicit` (the `--config` flag)
/// 2. `COURIER_CONFIG` environment variable
/// 3. ./courier.toml (current working directory)
/// 4. /etc/courier/courier.toml (system-wide config)
///
/// # Errors
///
/// If an explicitly named file does not exist, or none of the defaults do.
pub fn find_config_file(explicit: Option<&Path>) -> Result<PathBuf, ConfigError> {
    let defaults = DEFAULT_CONFIG_PATHS.map(PathBuf::from);
    locate(explicit, std::env::var_os(CONFIG_ENV), &defaults)
}

fn locate(
    explicit: Option<&Path>,
    env: Option<OsString>,
    defaults: &[PathBuf],
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit {
        if path.exists() {
            return Ok(path.to_path_buf());
        }
        return Err(ConfigError::MissingExplicit(path.to_path_buf()));
    }

    if let Some(env_path) = env {
        let path = PathBuf::from(env_path);
        if path.exists() {
            return Ok(path);
        }
        return Err(ConfigError::MissingEnvTarget(path));
    }

    if let Some(path) = defaults.iter().find(|path| path.exists()) {
        return Ok(path.clone());
    }

    let tried = defaults
        .iter()
        .map(|p| format!("  - {}", p.display()))
        .collect::<Vec<_>>()
        .join("\n");

    Err(ConfigError::NotFound { tried })
}
