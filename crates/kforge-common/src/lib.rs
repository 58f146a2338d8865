//! ---
//! kf_section: "01-core-functionality"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Shared primitives for the kforge workspace."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
//! Core shared primitives for the kforge workspace.
//! This crate exposes the cluster configuration model and loader, the role
//! vocabulary, and tracing setup consumed across the workspace.

pub mod config;
pub mod logging;
pub mod role;

pub use config::{
    ClusterConfig, CredentialEncoding, HostKeyPolicy, LoadedClusterConfig, LoggingConfig,
    NfsConfig, NodeConfig, NtpConfig, SshConfig,
};
pub use logging::{init_tracing, LogFormat};
pub use role::{Role, RoleSet};
