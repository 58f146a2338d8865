//! ---
//! kf_section: "04-configuration-orchestration"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Cluster-wide scalars handed to the engine at construction."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use kforge_common::config::ClusterConfig;

/// Time synchronisation parameters for the chrony payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NtpSettings {
    /// Address of the NTP server.
    pub server: String,
    /// Client network allowed to query the server, when it runs on a node.
    pub allow: Option<String>,
    /// Timezone applied to every node.
    pub timezone: String,
}

/// Shared storage parameters for the NFS payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NfsSettings {
    /// NFS server address.
    pub server: String,
    /// Exported path.
    pub path: String,
}

/// Immutable cluster-wide configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterSettings {
    /// Namespace the application payloads are installed into.
    pub namespace: String,
    /// Container registry hostname.
    pub registry: String,
    /// CRI socket handed to `kubeadm join`; empty leaves the default.
    pub cri_socket: String,
    /// Virtual IP floated across control-plane nodes.
    pub vip: String,
    /// `None` skips chrony installation.
    pub ntp: Option<NtpSettings>,
    /// `None` installs client utilities only.
    pub nfs: Option<NfsSettings>,
}

fn non_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_owned())
}

impl ClusterSettings {
    /// Extract the engine's scalars from a validated configuration.
    pub fn from_config(config: &ClusterConfig) -> Self {
        let ntp = non_empty(&config.ntp.server).map(|server| NtpSettings {
            server,
            allow: non_empty(&config.ntp.allow),
            timezone: config.ntp.timezone.trim().to_owned(),
        });
        let nfs = non_empty(&config.nfs.server).map(|server| NfsSettings {
            server,
            path: config.nfs.path.trim().to_owned(),
        });
        Self {
            namespace: config.namespace.trim().to_owned(),
            registry: config.registry.trim().to_owned(),
            cri_socket: config.cri_socket.trim().to_owned(),
            vip: config.vip.trim().to_owned(),
            ntp,
            nfs,
        }
    }
}
