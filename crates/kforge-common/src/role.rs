//! ---
//! kf_section: "01-core-functionality"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Cluster role vocabulary shared by configuration and nodes."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Role a node can hold inside the cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Member of the etcd consensus store.
    Etcd,
    /// Runs the API server and scheduler components.
    #[serde(rename = "controlplane")]
    ControlPlane,
    /// Runs application workloads only.
    Worker,
}

impl Role {
    /// Every role, in the order topology checks report them.
    pub const ALL: [Role; 3] = [Role::Etcd, Role::ControlPlane, Role::Worker];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Etcd => "etcd",
            Role::ControlPlane => "controlplane",
            Role::Worker => "worker",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "etcd" => Ok(Role::Etcd),
            "controlplane" | "control-plane" => Ok(Role::ControlPlane),
            "worker" => Ok(Role::Worker),
            other => Err(format!("invalid role: {}", other)),
        }
    }
}

/// Set of roles declared for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RoleSet {
    etcd: bool,
    control_plane: bool,
    worker: bool,
}

impl RoleSet {
    /// Empty role set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Role set holding every role, as a single-node cluster requires.
    pub fn all() -> Self {
        Self {
            etcd: true,
            control_plane: true,
            worker: true,
        }
    }

    pub fn with(mut self, role: Role) -> Self {
        self.insert(role);
        self
    }

    pub fn insert(&mut self, role: Role) {
        match role {
            Role::Etcd => self.etcd = true,
            Role::ControlPlane => self.control_plane = true,
            Role::Worker => self.worker = true,
        }
    }

    pub fn contains(&self, role: Role) -> bool {
        match role {
            Role::Etcd => self.etcd,
            Role::ControlPlane => self.control_plane,
            Role::Worker => self.worker,
        }
    }

    pub fn is_empty(&self) -> bool {
        !(self.etcd || self.control_plane || self.worker)
    }

    pub fn is_complete(&self) -> bool {
        self.etcd && self.control_plane && self.worker
    }

    /// Roles held, in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL.into_iter().filter(move |role| self.contains(*role))
    }

    /// Parse a list of role names as they appear in configuration.
    pub fn parse<S: AsRef<str>>(names: &[S]) -> Result<Self, String> {
        let mut roles = RoleSet::new();
        for name in names {
            roles.insert(name.as_ref().parse()?);
        }
        Ok(roles)
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut roles = RoleSet::new();
        for role in iter {
            roles.insert(role);
        }
        roles
    }
}

impl fmt::Display for RoleSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.iter().map(|role| role.as_str()).collect();
        f.write_str(&names.join(","))
    }
}
