//! Config file source: an explicit path, or $XDG_CONFIG_HOME/ctxrelay/config.toml
//! (~/.config/ctxrelay/config.toml when XDG_CONFIG_HOME is unset).

use config::builder::DefaultState;
use config::{ConfigBuilder, File, FileFormat};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Path to the per-user config file.
pub fn global_config_path() -> Option<PathBuf> {
    let base = match std::env::var_os("XDG_CONFIG_HOME") {
        Some(dir) if !dir.is_empty() => PathBuf::from(dir),
        _ => PathBuf::from(std::env::var_os("HOME")?).join(".config"),
    };
    Some(base.join("ctxrelay").join("config.toml"))
}

/// Add the config file to the builder.
///
/// An explicit path must exist; the per-user file is optional.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
    explicit: Option<&Path>,
) -> ConfigBuilder<DefaultState> {
    match explicit {
        Some(path) => builder.add_source(File::from(path).format(FileFormat::Toml).required(true)),
        None => match global_config_path() {
            Some(path) if path.exists() => {
                debug!(config_path = %path.display(), "using per-user config file");
                builder.add_source(File::from(path).format(FileFormat::Toml).required(false))
            }
            _ => builder,
        },
    }
}
