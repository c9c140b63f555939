//! Configuration System
//!
//! Layered configuration for discovery and logging: merge-policy defaults,
//! then an optional TOML file, then `CTXRELAY__*` environment variables.

use crate::logging::LoggingConfig;
use crate::registry::DiscoveryScope;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

mod facade;
mod merge {
    pub mod merge_policy;
}
mod sources {
    pub mod environment;
    pub mod global_file;
}

pub use facade::ConfigLoader;
pub use sources::global_file::global_config_path;

/// Root configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where the registry looks for managers and timers at startup.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// Named scope for explicit registrations
    #[serde(default)]
    pub scope: Option<String>,

    /// Plugin directory holding `*.toml` manifests
    #[serde(default)]
    pub plugin_dir: Option<PathBuf>,
}

impl DiscoveryConfig {
    /// Scope the registry starts in; `None` keeps the default scope.
    pub fn initial_scope(&self) -> Option<DiscoveryScope> {
        if let Some(dir) = &self.plugin_dir {
            return Some(DiscoveryScope::Path(dir.clone()));
        }
        self.scope.clone().map(DiscoveryScope::Named)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.scope.is_some() && self.plugin_dir.is_some() {
            return Err("scope and plugin_dir are mutually exclusive".to_string());
        }
        if let Some(scope) = &self.scope {
            if scope.trim().is_empty() {
                return Err("scope cannot be empty".to_string());
            }
        }
        if let Some(dir) = &self.plugin_dir {
            if dir.as_os_str().is_empty() {
                return Err("plugin_dir cannot be empty".to_string());
            }
        }
        Ok(())
    }
}

/// Configuration validation errors
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    Discovery(String),
    Logging(String),
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::Discovery(msg) => write!(f, "Discovery: {}", msg),
            ValidationError::Logging(msg) => write!(f, "Logging: {}", msg),
        }
    }
}

impl std::error::Error for ValidationError {}

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error", "off"];

fn validate_logging(logging: &LoggingConfig) -> Vec<ValidationError> {
    let mut errors = Vec::new();
    if !LOG_LEVELS.contains(&logging.level.as_str()) {
        errors.push(ValidationError::Logging(format!(
            "unknown level '{}'",
            logging.level
        )));
    }
    if logging.format != "json" && logging.format != "text" {
        errors.push(ValidationError::Logging(format!(
            "unknown format '{}'",
            logging.format
        )));
    }
    if !matches!(logging.output.as_str(), "stdout" | "stderr" | "file") {
        errors.push(ValidationError::Logging(format!(
            "unknown output '{}'",
            logging.output
        )));
    }
    errors
}

impl RelayConfig {
    /// Validate the entire configuration
    pub fn validate(&self) -> Result<(), Vec<ValidationError>> {
        let mut errors = Vec::new();
        if let Err(e) = self.discovery.validate() {
            errors.push(ValidationError::Discovery(e));
        }
        errors.extend(validate_logging(&self.logging));

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
