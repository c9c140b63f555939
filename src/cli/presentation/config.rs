//! Config command presentation.

use crate::config::RelayConfig;
use crate::error::SetupError;
use std::path::Path;

pub fn format_config_text(config: &RelayConfig, source: Option<&Path>) -> String {
    let mut output = String::from("Effective configuration\n");
    match source {
        Some(path) => output.push_str(&format!("  source:      {}\n", path.display())),
        None => output.push_str("  source:      defaults + environment\n"),
    }

    output.push_str("\n[discovery]\n");
    let scope = match config.discovery.initial_scope() {
        Some(scope) => scope.to_string(),
        None => "default".to_string(),
    };
    output.push_str(&format!("  scope:       {}\n", scope));

    output.push_str("\n[logging]\n");
    output.push_str(&format!("  level:       {}\n", config.logging.level));
    output.push_str(&format!("  format:      {}\n", config.logging.format));
    output.push_str(&format!("  output:      {}\n", config.logging.output));
    if config.logging.output == "file" {
        output.push_str(&format!("  file:        {}\n", config.logging.file.display()));
    }
    let mut modules: Vec<_> = config.logging.modules.iter().collect();
    modules.sort();
    for (module, level) in modules {
        output.push_str(&format!("  {} = {}\n", module, level));
    }
    output
}

pub fn format_config_json(config: &RelayConfig) -> Result<String, SetupError> {
    serde_json::to_string_pretty(config)
        .map_err(|e| SetupError::Render(format!("config: {}", e)))
}
