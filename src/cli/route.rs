//! CLI route: single route table and run context. Dispatches to domain services and presentation.

use crate::cli::parse::Commands;
use crate::cli::presentation::{
    format_config_json, format_config_text, format_manifest_plan_json, format_manifest_plan_text,
};
use crate::config::{ConfigLoader, RelayConfig};
use crate::error::{DiscoveryError, SetupError};
use crate::registry::manifest::{plan, read_manifest_dir};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Runtime context for CLI execution: the loaded configuration and where it came from.
pub struct RunContext {
    config: RelayConfig,
    config_path: Option<PathBuf>,
}

impl RunContext {
    /// Load configuration from `config_path`, or from the default sources.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, SetupError> {
        let config = ConfigLoader::load(config_path.as_deref())?;
        Ok(Self::with_config(config, config_path))
    }

    pub fn with_config(config: RelayConfig, config_path: Option<PathBuf>) -> Self {
        RunContext {
            config,
            config_path,
        }
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn execute(&self, command: &Commands) -> Result<String, SetupError> {
        match command {
            Commands::Manifest { dir, format } => self.handle_manifest(dir.as_deref(), format),
            Commands::Config { format } => self.handle_config(format),
        }
    }

    fn handle_manifest(&self, dir: Option<&Path>, format: &str) -> Result<String, SetupError> {
        let dir = dir
            .or(self.config.discovery.plugin_dir.as_deref())
            .ok_or_else(|| {
                DiscoveryError::Unavailable(
                    "no plugin directory given and discovery.plugin_dir is not set".to_string(),
                )
            })?;
        debug!(dir = %dir.display(), "planning plugin directory");
        let plan = plan(read_manifest_dir(dir)?);
        if format == "json" {
            format_manifest_plan_json(dir, &plan)
        } else {
            Ok(format_manifest_plan_text(dir, &plan))
        }
    }

    fn handle_config(&self, format: &str) -> Result<String, SetupError> {
        if format == "json" {
            format_config_json(&self.config)
        } else {
            Ok(format_config_text(&self.config, self.config_path.as_deref()))
        }
    }
}
