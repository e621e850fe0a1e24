//! Engine configuration
//!
//! Configuration is read from a JSON5 file (comments and trailing commas
//! allowed), then adjusted by environment variables:
//!
//! ```jsonc
//! {
//!     // Interpreter used to run commands (defaults to /bin/sh)
//!     "shell": "/bin/bash",
//!     "workingDirectory": "/srv/app",
//!     "env": { "RUST_BACKTRACE": "1" },
//! }
//! ```
//!
//! ## Environment Variables
//!
//! * `SHELLPIPE_SHELL` - Overrides the configured interpreter

use crate::errors::{ConfigError, Result};
use crate::shell::DEFAULT_SHELL;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, instrument};

/// Environment variable overriding [`EngineConfig::shell`]
pub const SHELL_ENV_VAR: &str = "SHELLPIPE_SHELL";

/// Settings applied to every command an engine runs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EngineConfig {
    /// Interpreter path
    pub shell: String,
    /// Directory the command starts in; inherits the caller's when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub working_directory: Option<PathBuf>,
    /// Extra environment variables, applied in order
    #[serde(skip_serializing_if = "IndexMap::is_empty")]
    pub env: IndexMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            shell: DEFAULT_SHELL.to_string(),
            working_directory: None,
            env: IndexMap::new(),
        }
    }
}

/// Loads and validates [`EngineConfig`]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a JSON5 file
    ///
    /// ## Errors
    ///
    /// - `ConfigError::NotFound` if the file does not exist
    /// - `ConfigError::Io` if it cannot be read
    /// - `ConfigError::Parsing` for malformed JSON5 or a non-object root
    /// - `ConfigError::Validation` for values of the wrong type or an invalid
    ///   working directory
    #[instrument(skip_all, fields(path = %path.display()))]
    pub fn load_from_path(path: &Path) -> Result<EngineConfig> {
        debug!("Loading engine configuration from {}", path.display());

        if !path.exists() {
            return Err(ConfigError::NotFound {
                path: path.display().to_string(),
            }
            .into());
        }

        let content = std::fs::read_to_string(path).map_err(|e| {
            debug!("Failed to read configuration file: {}", e);
            ConfigError::Io(e)
        })?;

        Self::load_from_str(&content)
    }

    /// Parse configuration from JSON5 text and validate it
    pub fn load_from_str(content: &str) -> Result<EngineConfig> {
        let raw_value: serde_json::Value = json5::from_str(content).map_err(|e| {
            debug!("Failed to parse configuration file: {}", e);
            ConfigError::Parsing {
                message: format!("JSON parsing error: {}", e),
            }
        })?;

        let serde_json::Value::Object(ref obj) = raw_value else {
            return Err(ConfigError::Parsing {
                message: "configuration root must be an object".to_string(),
            }
            .into());
        };
        Self::log_unknown_keys(obj);

        let config: EngineConfig = serde_json::from_value(raw_value).map_err(|e| {
            debug!("Failed to deserialize configuration: {}", e);
            ConfigError::Validation {
                message: format!("Deserialization error: {}", e),
            }
        })?;

        Self::validate_config(&config)?;
        debug!("Loaded configuration with shell {:?}", config.shell);
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_env_overrides(config: &mut EngineConfig) {
        if let Ok(shell) = std::env::var(SHELL_ENV_VAR) {
            if !shell.is_empty() {
                debug!("Using shell {} from {}", shell, SHELL_ENV_VAR);
                config.shell = shell;
            }
        }
    }

    /// Check values that deserialization cannot
    pub fn validate_config(config: &EngineConfig) -> Result<()> {
        if let Some(dir) = &config.working_directory {
            if !dir.is_dir() {
                return Err(ConfigError::Validation {
                    message: format!("workingDirectory is not a directory: {}", dir.display()),
                }
                .into());
            }
        }
        if config.env.keys().any(|key| key.is_empty() || key.contains('=')) {
            return Err(ConfigError::Validation {
                message: "env names must be non-empty and must not contain '='".to_string(),
            }
            .into());
        }
        Ok(())
    }

    fn log_unknown_keys(obj: &serde_json::Map<String, serde_json::Value>) {
        let known_keys = ["shell", "workingDirectory", "env"];
        for key in obj.keys() {
            if !known_keys.contains(&key.as_str()) {
                debug!("Ignoring unknown configuration key: {}", key);
            }
        }
    }
}
