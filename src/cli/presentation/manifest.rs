//! Manifest command presentation: effective priority order text/json.

use crate::error::SetupError;
use crate::registry::{ManifestPlan, PlannedEntry};
use comfy_table::presets::UTF8_FULL;
use comfy_table::Table;
use std::path::Path;

fn entries_table(entries: &[PlannedEntry]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["#", "Name", "Priority", "Manifest"]);
    for (position, entry) in entries.iter().enumerate() {
        let priority = entry
            .priority
            .map(|p| p.to_string())
            .unwrap_or_else(|| "-".to_string());
        let manifest = entry
            .manifest
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| entry.manifest.display().to_string());
        table.add_row(vec![
            (position + 1).to_string(),
            entry.name.clone(),
            priority,
            manifest,
        ]);
    }
    table
}

pub fn format_manifest_plan_text(dir: &Path, plan: &ManifestPlan) -> String {
    let mut output = format!("Plugin directory: {}\n", dir.display());

    output.push_str(&format!("\nManagers ({}):\n", plan.managers.len()));
    if plan.managers.is_empty() {
        output.push_str("  none\n");
    } else {
        output.push_str(&format!("{}\n", entries_table(&plan.managers)));
    }

    output.push_str(&format!("\nTimers ({}):\n", plan.timers.len()));
    if plan.timers.is_empty() {
        output.push_str("  none\n");
    } else {
        output.push_str(&format!("{}\n", entries_table(&plan.timers)));
    }

    if !plan.invalid.is_empty() {
        output.push_str(&format!("\nSkipped manifests ({}):\n", plan.invalid.len()));
        for invalid in &plan.invalid {
            output.push_str(&format!("  ✗ {}\n", invalid.reason));
        }
    }
    output
}

pub fn format_manifest_plan_json(dir: &Path, plan: &ManifestPlan) -> Result<String, SetupError> {
    let out = serde_json::json!({
        "dir": dir,
        "managers": plan.managers,
        "timers": plan.timers,
        "invalid": plan.invalid,
    });
    serde_json::to_string_pretty(&out)
        .map_err(|e| SetupError::Render(format!("manifest plan: {}", e)))
}
