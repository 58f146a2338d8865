//! ---
//! kf_section: "06-cli"
//! kf_subsection: "binary"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Deploy and update pipeline execution."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Args;
use kforge_common::config::ClusterConfig;
use kforge_common::logging::init_tracing;
use kforge_engine::{ClusterSettings, Engine, Pipeline};
use kforge_node::{BufferPool, NodeSpec, RemoteNode, ResourceLayout, SessionOptions};
use tracing::info;

use crate::config::load;
use crate::steps;

const SERVICE_NAME: &str = "kforgectl";

#[derive(Debug, Args)]
pub struct InstallArgs {
    /// Cluster configuration file (YAML or TOML).
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Extend a running cluster instead of deploying a new one.
    #[arg(long)]
    update: bool,

    /// Comma-separated step numbers to run; step 1 always runs first.
    #[arg(short, long, value_name = "LIST", default_value = "")]
    step: String,

    /// Print the selected pipeline's steps and exit.
    #[arg(long)]
    steps: bool,
}

pub async fn run(args: InstallArgs) -> Result<()> {
    let pipeline = steps::pipeline(args.update);
    if args.steps {
        steps::print(pipeline);
        return Ok(());
    }

    let loaded = load(args.config.as_ref())?;
    init_tracing(SERVICE_NAME, &loaded.config.logging)?;
    info!(config = %loaded.source.display(), %pipeline, nodes = loaded.config.nodes.len(), "configuration loaded");

    let engine = build_engine(&loaded.config)?;
    let outcome = match pipeline {
        Pipeline::Deploy => engine.install(&args.step).await,
        Pipeline::Update => engine.update(&args.step).await,
    };
    outcome.with_context(|| format!("{} pipeline failed", pipeline))
}

/// One `RemoteNode` per configured host, all sharing a single chunk pool.
pub fn build_engine(config: &ClusterConfig) -> Result<Engine> {
    let mut engine = Engine::new(ClusterSettings::from_config(config));
    let buffers = BufferPool::new();
    let options = SessionOptions::from_config(&config.ssh);
    let layout = ResourceLayout::new(&config.resource_root);

    for node in &config.nodes {
        let spec = NodeSpec::from_config(node, config.credential_encoding)
            .with_context(|| format!("invalid node {}", node.address))?;
        let remote = RemoteNode::new(spec)
            .with_session_options(options.clone())
            .with_layout(layout.clone())
            .with_buffers(Arc::clone(&buffers));
        engine.add_node(Arc::new(remote))?;
    }
    Ok(engine)
}
