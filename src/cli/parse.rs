//! CLI parse: clap types for ctxrelay. No behavior; definitions only.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// ctxrelay - inspect context propagation configuration and plugin directories
#[derive(Parser, Debug)]
#[command(name = "ctxrelay")]
#[command(about = "Inspect context propagation configuration and plugin manifests")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Configuration file path (overrides default config loading)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(long, global = true)]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long, global = true)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long, global = true)]
    pub log_format: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Show the managers and timers a plugin directory enables, in priority order
    Manifest {
        /// Plugin directory (defaults to discovery.plugin_dir from config)
        dir: Option<PathBuf>,

        /// Output format (text or json)
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
    /// Show the effective configuration
    Config {
        /// Output format (text or json)
        #[arg(long, default_value = "text", value_parser = ["text", "json"])]
        format: String,
    },
}
