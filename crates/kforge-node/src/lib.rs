//! ---
//! kf_section: "02-remote-node"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Remote node abstraction over SSH sessions."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
//! One authenticated session per host: command execution, fact discovery,
//! and chunked directory transfer followed by an install script.

pub mod command;
pub mod error;
pub mod facts;
pub mod node;
pub mod remote;
pub mod resource;
pub mod spec;
pub mod transfer;

pub use error::{NodeError, Result};
pub use facts::{Arch, NodeFacts, OsFamily};
pub use node::Node;
pub use remote::{RemoteNode, SessionOptions};
pub use resource::ResourceLayout;
pub use spec::{Credential, NodeSpec, Secret};
pub use transfer::{BufferPool, ProgressEvent, TracingProgress, TransferEntry, TransferProgress};
