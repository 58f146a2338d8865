//! ---
//! kf_section: "06-cli"
//! kf_subsection: "binary"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Control CLI for deploying and extending clusters."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use anyhow::Result;
use clap::{Parser, Subcommand};

mod config;
mod install;
mod steps;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Bootstrap and extend multi-node clusters over SSH",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Run the deploy pipeline, or the update pipeline with --update.
    Install(install::InstallArgs),
    /// List the steps of a pipeline.
    Steps(steps::StepsArgs),
    #[command(subcommand, about = "Configuration inspection")]
    Config(config::ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Install(args) => install::run(args).await?,
        Commands::Steps(args) => steps::run(args),
        Commands::Config(cmd) => config::run(cmd)?,
    }
    Ok(())
}
