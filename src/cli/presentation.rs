//! CLI presentation: text and json formatters per command family.

mod config;
mod manifest;

pub use config::{format_config_json, format_config_text};
pub use manifest::{format_manifest_plan_json, format_manifest_plan_text};
