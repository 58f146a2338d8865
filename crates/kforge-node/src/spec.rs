//! ---
//! kf_section: "02-remote-node"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Static identity of a managed node."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::fmt;
use std::net::{IpAddr, ToSocketAddrs};
use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use kforge_common::config::{CredentialEncoding, NodeConfig};
use kforge_common::role::{Role, RoleSet};

use crate::error::{NodeError, Result};

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Secret half of a node credential. Values are already decoded.
#[derive(Clone, PartialEq, Eq)]
pub enum Secret {
    Password(String),
    PrivateKey {
        path: PathBuf,
        passphrase: Option<String>,
    },
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Secret::Password(_) => f.write_str("Password(******)"),
            Secret::PrivateKey { path, .. } => f
                .debug_struct("PrivateKey")
                .field("path", path)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credential {
    pub username: String,
    pub secret: Secret,
}

impl Credential {
    pub fn password(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: Secret::Password(password.into()),
        }
    }

    pub fn private_key(username: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            username: username.into(),
            secret: Secret::PrivateKey {
                path: path.into(),
                passphrase: None,
            },
        }
    }
}

/// Identity of one managed host: where it is, how to log in, and what it does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeSpec {
    pub address: String,
    pub port: u16,
    pub hostname: String,
    pub roles: RoleSet,
    pub credential: Credential,
}

impl NodeSpec {
    /// Build a spec on the default SSH port after validating the address.
    pub fn new(
        address: impl Into<String>,
        hostname: impl Into<String>,
        roles: RoleSet,
        credential: Credential,
    ) -> Result<Self> {
        let address = address.into();
        validate_address(&address)?;
        Ok(Self {
            address,
            port: DEFAULT_SSH_PORT,
            hostname: hostname.into(),
            roles,
            credential,
        })
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Decode a configuration entry. A key path takes precedence over a password.
    pub fn from_config(config: &NodeConfig, encoding: CredentialEncoding) -> Result<Self> {
        let address = config.address.trim().to_owned();
        let roles = RoleSet::parse(&config.role).map_err(|reason| NodeError::InvalidRole {
            address: address.clone(),
            reason,
        })?;
        let credential_error = |reason: String| NodeError::Credential {
            address: address.clone(),
            reason,
        };
        let username = config
            .decoded_username(encoding)
            .map_err(|err| credential_error(format!("{err:#}")))?;
        let secret = match &config.key_path {
            Some(path) => Secret::PrivateKey {
                path: path.clone(),
                passphrase: config
                    .decoded_key_passphrase(encoding)
                    .map_err(|err| credential_error(format!("{err:#}")))?,
            },
            None => {
                let password = config
                    .decoded_password(encoding)
                    .map_err(|err| credential_error(format!("{err:#}")))?
                    .unwrap_or_default();
                Secret::Password(password)
            }
        };
        let spec = NodeSpec::new(
            address.clone(),
            config.hostname.trim(),
            roles,
            Credential { username, secret },
        )?;
        Ok(spec.with_port(config.port))
    }

    pub fn has_role(&self, role: Role) -> bool {
        self.roles.contains(role)
    }

    /// Password re-encoded as base64 for handing to bootstrap payloads; empty for key auth.
    pub fn encoded_password(&self) -> String {
        match &self.credential.secret {
            Secret::Password(password) => STANDARD.encode(password.as_bytes()),
            Secret::PrivateKey { .. } => String::new(),
        }
    }
}

/// Accept IP literals directly, otherwise require the name to resolve.
pub fn validate_address(address: &str) -> Result<()> {
    if address.is_empty() {
        return Err(NodeError::InvalidAddress {
            address: address.to_owned(),
            reason: "address is empty".to_owned(),
        });
    }
    if address.parse::<IpAddr>().is_ok() {
        return Ok(());
    }
    match (address, 0u16).to_socket_addrs() {
        Ok(addrs) if addrs.len() > 0 => Ok(()),
        Ok(_) => Err(NodeError::InvalidAddress {
            address: address.to_owned(),
            reason: "name resolved to no addresses".to_owned(),
        }),
        Err(err) => Err(NodeError::InvalidAddress {
            address: address.to_owned(),
            reason: err.to_string(),
        }),
    }
}
