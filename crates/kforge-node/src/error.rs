//! ---
//! kf_section: "02-remote-node"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Error taxonomy for remote node operations."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::io;
use std::path::PathBuf;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, NodeError>;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("{address}: invalid node address: {reason}")]
    InvalidAddress { address: String, reason: String },
    #[error("{address}: {reason}")]
    InvalidRole { address: String, reason: String },
    #[error("{address}: invalid credential: {reason}")]
    Credential { address: String, reason: String },
    #[error("dial {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: io::Error,
    },
    #[error("ssh {address}: {source}")]
    Ssh {
        address: String,
        #[source]
        source: ssh2::Error,
    },
    #[error("{address}: host key rejected: {reason}")]
    HostKeyRejected { address: String, reason: String },
    #[error("{address}: authentication failed for user {username}: {reason}")]
    Authentication {
        address: String,
        username: String,
        reason: String,
    },
    #[error("read key file {path:?}: {source}")]
    KeyFile {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{address}: node is not connected")]
    NotConnected { address: String },
    #[error("{address}: unsupported operating system {os:?}")]
    UnsupportedPlatform { address: String, os: String },
    #[error("{address}: unsupported machine architecture: {arch:?}")]
    UnsupportedArchitecture { address: String, arch: String },
    #[error("{address}: `{command}` exited with status {status}: {stderr}")]
    RemoteCommand {
        address: String,
        command: String,
        status: i32,
        stderr: String,
    },
    #[error("resource directory {path:?} not found")]
    ResourceMissing { path: PathBuf },
    #[error("transfer {path}: {source}")]
    Transfer {
        path: String,
        #[source]
        source: io::Error,
    },
    #[error("sftp {path}: {source}")]
    Sftp {
        path: String,
        #[source]
        source: ssh2::Error,
    },
    #[error("{address}: remote task aborted: {reason}")]
    Task { address: String, reason: String },
}

impl NodeError {
    pub(crate) fn ssh(address: &str, source: ssh2::Error) -> Self {
        NodeError::Ssh {
            address: address.to_owned(),
            source,
        }
    }

    pub(crate) fn sftp(path: impl Into<String>, source: ssh2::Error) -> Self {
        NodeError::Sftp {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn transfer(path: impl Into<String>, source: io::Error) -> Self {
        NodeError::Transfer {
            path: path.into(),
            source,
        }
    }

    /// Whether the error came from the remote command itself rather than the session.
    pub fn is_remote_command(&self) -> bool {
        matches!(self, NodeError::RemoteCommand { .. })
    }
}
