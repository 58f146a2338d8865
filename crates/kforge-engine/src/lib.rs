//! ---
//! kf_section: "04-configuration-orchestration"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Cluster bootstrap engine: pipelines, topology, and per-node fan-out."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
#![warn(missing_docs)]
//! The engine owns the cluster settings and node set, checks topology, and
//! runs the deploy or update pipeline one step at a time. Each step fans out
//! to its target nodes and joins before the next step starts.

mod actions;
pub mod engine;
pub mod error;
pub mod fanout;
pub mod join;
pub mod pipeline;
pub mod settings;
pub mod topology;

pub use actions::{CALICO_DIR, KUBEADM_DIR, LIST_NODE_NAMES};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use pipeline::{
    listing, parse_selector, Action, ConsoleObserver, Pipeline, Step, StepObserver, DEPLOY_STEPS,
    UPDATE_STEPS,
};
pub use settings::{ClusterSettings, NfsSettings, NtpSettings};
