//! CLI domain: parse, route, output, and presentation only.
//! Inspection commands over configuration and plugin directories.

mod output;
mod parse;
mod presentation;
mod route;

pub use output::map_error;
pub use parse::{Cli, Commands};
pub use presentation::{
    format_config_json, format_config_text, format_manifest_plan_json, format_manifest_plan_text,
};
pub use route::RunContext;
