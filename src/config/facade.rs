//! Loader entry point combining the merge policy and every source.

use super::merge::merge_policy;
use super::sources::{environment, global_file};
use super::RelayConfig;
use crate::error::SetupError;
use config::builder::DefaultState;
use config::ConfigBuilder;
use std::path::Path;

/// Loads and validates [`RelayConfig`].
pub struct ConfigLoader;

impl ConfigLoader {
    /// Defaults, then `explicit` (or the per-user file), then environment.
    pub fn load(explicit: Option<&Path>) -> Result<RelayConfig, SetupError> {
        let builder = merge_policy::builder_with_defaults()?;
        let builder = global_file::add_to_builder(builder, explicit);
        let builder = environment::add_to_builder(builder);
        Self::finish(builder)
    }

    /// Defaults, then exactly the given file. The environment is ignored.
    pub fn load_from_file(path: &Path) -> Result<RelayConfig, SetupError> {
        let builder = merge_policy::builder_with_defaults()?;
        Self::finish(global_file::add_to_builder(builder, Some(path)))
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<RelayConfig, SetupError> {
        let config: RelayConfig = builder.build()?.try_deserialize()?;
        config.validate().map_err(|errors| {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            SetupError::Config(format!(
                "Configuration validation failed:\n{}",
                messages.join("\n")
            ))
        })?;
        Ok(config)
    }
}
