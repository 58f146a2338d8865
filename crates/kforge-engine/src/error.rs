//! ---
//! kf_section: "04-configuration-orchestration"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Engine error taxonomy."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use kforge_common::role::Role;
use kforge_node::NodeError;
use thiserror::Error;

/// Result alias used throughout the engine.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Failures raised by topology checks, step selection, and pipeline actions.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A node with the same address is already registered.
    #[error("{address}: node already in cluster")]
    DuplicateNode {
        /// Address of the rejected node.
        address: String,
    },
    /// No nodes were added before running a pipeline.
    #[error("cluster must have at least one node")]
    EmptyCluster,
    /// The only node of a single-node cluster lacks a role.
    #[error("single node {address} needs all roles (etcd controlplane worker)")]
    IncompleteRoles {
        /// Address of the single node.
        address: String,
    },
    /// No node of a multi-node cluster declares this role.
    #[error("cluster has no {0} node")]
    MissingRole(Role),
    /// The NTP server is a cluster node, so it must know which clients to serve.
    #[error("ntp server {server} is a cluster node but ntp allow is empty")]
    MissingNtpAllowList {
        /// Configured NTP server address.
        server: String,
    },
    /// A step selector named a step the pipeline does not have.
    #[error("{pipeline} pipeline has no step {number}")]
    UnknownStep {
        /// Pipeline the selector was applied to.
        pipeline: &'static str,
        /// Requested step number.
        number: usize,
    },
    /// Cluster initialisation output carried no usable join block.
    #[error("{address}: cluster init output contains no kubeadm join command")]
    JoinCommandNotFound {
        /// Master address.
        address: String,
    },
    /// An action needed the master but none was elected.
    #[error("cluster has no control-plane node to act as master")]
    NoMaster,
    /// A fan-out unit panicked or was aborted.
    #[error("{address}: task failed: {reason}")]
    Task {
        /// Node the unit was working on.
        address: String,
        /// Join error description.
        reason: String,
    },
    /// A remote node operation failed.
    #[error(transparent)]
    Node(#[from] NodeError),
}

impl EngineError {
    /// Whether the failure was detected before any remote work.
    pub fn is_topology(&self) -> bool {
        matches!(
            self,
            EngineError::DuplicateNode { .. }
                | EngineError::EmptyCluster
                | EngineError::IncompleteRoles { .. }
                | EngineError::MissingRole(_)
                | EngineError::MissingNtpAllowList { .. }
        )
    }
}
