//! Configuration loading traits and types.
//!
//! This module provides a standardized way to load TOML configuration files
//! across all trk components. A single file may hold the configuration of
//! several components, each under its own table key:
//!
//! ```toml
//! [shared]
//! log_level = "debug"
//! service_name = "trk-lab-rig-2"
//!
//! [posigen]
//! dt = 0.02
//!
//! [posicom]
//! sources = ["pos_a", "pos_b"]
//! sink = "pos_mean"
//! ```
//!
//! # Usage
//!
//! ```rust,no_run
//! use trk_common::config::{load_table, ConfigError};
//! use serde::Deserialize;
//! use std::path::Path;
//!
//! #[derive(Debug, Deserialize)]
//! struct TesterConfig {
//!     dt: f64,
//! }
//!
//! fn main() -> Result<(), ConfigError> {
//!     let config: TesterConfig = load_table(Path::new("config.toml"), "posigen")?;
//!     println!("dt = {}", config.dt);
//!     Ok(())
//! }
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// Error type for configuration loading operations.
///
/// This enum represents all possible errors that can occur when loading
/// configuration files.
#[derive(Debug, Clone, Error)]
pub enum ConfigError {
    /// Configuration file not found at specified path.
    #[error("Configuration file not found")]
    FileNotFound,

    /// TOML parsing failed.
    #[error("Failed to parse configuration: {0}")]
    ParseError(String),

    /// The file does not contain the requested component table.
    #[error("No configuration table named '{key}' was provided")]
    MissingTable {
        /// Requested table key.
        key: String,
    },

    /// Semantic validation failed.
    #[error("Configuration validation failed: {0}")]
    ValidationError(String),
}

/// Log level for application logging.
///
/// Represents the verbosity level of logging output.
/// Uses lowercase serde values for TOML compatibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose, detailed tracing information.
    Trace,
    /// Debug information useful during development.
    Debug,
    /// General information about application operation.
    #[default]
    Info,
    /// Warning messages for potentially problematic situations.
    Warn,
    /// Error messages for serious problems.
    Error,
}

impl LogLevel {
    /// Lowercase name, usable as an `EnvFilter` directive.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// Common configuration fields shared across all trk components.
///
/// # TOML Example
///
/// ```toml
/// [shared]
/// log_level = "debug"
/// service_name = "trk-lab-rig-2"
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SharedConfig {
    /// Logging verbosity level.
    #[serde(default)]
    pub log_level: LogLevel,

    /// Application instance identifier.
    pub service_name: String,
}

impl SharedConfig {
    /// Validate the configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::ValidationError` if:
    /// - `service_name` is empty
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.service_name.is_empty() {
            return Err(ConfigError::ValidationError(
                "service_name cannot be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Trait for loading configuration from TOML files.
///
/// This trait provides a default implementation that works with any type
/// implementing `serde::de::DeserializeOwned`.
///
/// # Contract
///
/// - Returns `ConfigError::FileNotFound` if the file does not exist
/// - Returns `ConfigError::ParseError` if TOML syntax is invalid
pub trait ConfigLoader: Sized + serde::de::DeserializeOwned {
    /// Load configuration from a TOML file.
    fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = read_config_file(path)?;
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))
    }
}

// Blanket implementation for all types that implement DeserializeOwned.
impl<T: serde::de::DeserializeOwned> ConfigLoader for T {}

/// Load the table named `key` from a TOML file and deserialize it.
///
/// # Errors
///
/// - `ConfigError::FileNotFound` if the file does not exist
/// - `ConfigError::ParseError` if the file or the table is malformed
/// - `ConfigError::MissingTable` if the file has no table named `key`
pub fn load_table<T: serde::de::DeserializeOwned>(path: &Path, key: &str) -> Result<T, ConfigError> {
    let content = read_config_file(path)?;
    let mut root: toml::Table =
        toml::from_str(&content).map_err(|e| ConfigError::ParseError(e.to_string()))?;

    match root.remove(key) {
        Some(value @ toml::Value::Table(_)) => value
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError(format!("[{key}]: {e}"))),
        Some(_) => Err(ConfigError::ParseError(format!("'{key}' is not a table"))),
        None => Err(ConfigError::MissingTable {
            key: key.to_string(),
        }),
    }
}

/// Load the optional `[shared]` table of a configuration file.
///
/// Returns `Ok(None)` when the file has no `[shared]` table; other tables are
/// ignored.
///
/// # Errors
///
/// - `ConfigError::FileNotFound` if the file does not exist
/// - `ConfigError::ParseError` if the file or the table is malformed
/// - `ConfigError::ValidationError` if the table fails [`SharedConfig::validate`]
pub fn load_shared(path: &Path) -> Result<Option<SharedConfig>, ConfigError> {
    #[derive(Deserialize)]
    struct SharedSection {
        shared: Option<SharedConfig>,
    }

    let section = SharedSection::load(path)?;
    if let Some(shared) = &section.shared {
        shared.validate()?;
    }
    Ok(section.shared)
}

fn read_config_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound
        } else {
            ConfigError::ParseError(e.to_string())
        }
    })
}
