//! ---
//! kf_section: "06-cli"
//! kf_subsection: "binary"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Configuration loading and display."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Args, Subcommand, ValueEnum};
use kforge_common::config::{ClusterConfig, LoadedClusterConfig};

/// Files tried, in order, when no configuration path is given.
pub const DEFAULT_CANDIDATES: [&str; 4] = ["kforge.yml", "kforge.yaml", "kforge.toml", "config.yml"];

pub fn run(command: ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Show(cmd) => cmd.execute(),
    }
}

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Print the effective configuration with secrets masked.
    #[command(name = "show")]
    Show(ShowCommand),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Json,
    Yaml,
}

#[derive(Debug, Args)]
pub struct ShowCommand {
    /// Cluster configuration file (YAML or TOML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
    format: OutputFormat,
}

impl ShowCommand {
    fn execute(self) -> Result<()> {
        let loaded = load(self.config.as_ref())?;
        let redacted = loaded.config.redacted();
        let rendered = match self.format {
            OutputFormat::Json => serde_json::to_string_pretty(&redacted)
                .context("failed to render configuration as json")?,
            OutputFormat::Yaml => serde_yaml::to_string(&redacted)
                .context("failed to render configuration as yaml")?,
        };
        println!("{}", rendered);
        Ok(())
    }
}

/// Load an explicit file, or fall back to `KFORGE_CONFIG` and the default candidates.
pub fn load(path: Option<&PathBuf>) -> Result<LoadedClusterConfig> {
    match path {
        Some(path) => Ok(LoadedClusterConfig {
            config: ClusterConfig::from_path(path)?,
            source: path.clone(),
        }),
        None => ClusterConfig::load_with_source(&DEFAULT_CANDIDATES),
    }
}
