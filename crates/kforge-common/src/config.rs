//! ---
//! kf_section: "04-configuration-orchestration"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Cluster configuration model, loading, and validation."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::logging::LogFormat;
use crate::role::RoleSet;

const REDACTED: &str = "******";

fn default_port() -> u16 {
    22
}

fn default_username() -> String {
    "root".to_owned()
}

fn default_resource_root() -> PathBuf {
    PathBuf::from("resource")
}

fn default_log_format() -> LogFormat {
    LogFormat::Pretty
}

/// Cluster-wide configuration consumed by the bootstrap engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct ClusterConfig {
    #[serde(default)]
    pub namespace: String,
    #[serde(default)]
    pub registry: String,
    #[serde(default)]
    pub cri_socket: String,
    #[serde(default)]
    pub vip: String,
    #[serde(default)]
    pub ntp: NtpConfig,
    #[serde(default)]
    pub nfs: NfsConfig,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
    #[serde(default)]
    pub credential_encoding: CredentialEncoding,
    #[serde(default = "default_resource_root")]
    pub resource_root: PathBuf,
    #[serde(default)]
    pub ssh: SshConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Metadata describing where a [`ClusterConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedClusterConfig {
    pub config: ClusterConfig,
    pub source: PathBuf,
}

impl ClusterConfig {
    pub const ENV_CONFIG_PATH: &str = "KFORGE_CONFIG";

    /// Load configuration from disk, respecting the `KFORGE_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedClusterConfig> {
        let source = Self::locate(candidates)?;
        let config = Self::from_path(&source)?;
        Ok(LoadedClusterConfig { config, source })
    }

    /// `KFORGE_CONFIG` wins; otherwise the first candidate that is a file.
    fn locate<P: AsRef<Path>>(candidates: &[P]) -> Result<PathBuf> {
        let overridden = std::env::var(Self::ENV_CONFIG_PATH)
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty());
        if let Some(path) = overridden {
            return Ok(PathBuf::from(path));
        }
        candidates
            .iter()
            .map(|candidate| candidate.as_ref())
            .find(|path| path.is_file())
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                let inspected: Vec<String> = candidates
                    .iter()
                    .map(|path| path.as_ref().display().to_string())
                    .collect();
                anyhow!(
                    "no cluster configuration found; looked for {}",
                    inspected.join(", ")
                )
            })
    }

    /// Parse and validate one configuration file; the extension picks the format.
    pub fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        let config = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Self::from_toml_str(&contents),
            _ => Self::from_yaml_str(&contents),
        };
        config.with_context(|| format!("failed to load config file {}", path.display()))
    }

    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let config: ClusterConfig =
            serde_yaml::from_str(content).context("failed to parse yaml configuration")?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: ClusterConfig =
            toml::from_str(content).context("failed to parse toml configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate structural invariants of the node list.
    ///
    /// Topology rules (which roles must exist) belong to the engine and are
    /// checked there before any pipeline runs.
    pub fn validate(&self) -> Result<()> {
        if self.nodes.is_empty() {
            return Err(anyhow!("configuration must declare at least one node"));
        }
        let mut seen = HashSet::new();
        for (index, node) in self.nodes.iter().enumerate() {
            node.validate(index)?;
            if !seen.insert(node.address.trim()) {
                return Err(anyhow!("node address {} is declared twice", node.address));
            }
        }
        Ok(())
    }

    /// Copy of the configuration with every secret masked, for display.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        for node in &mut copy.nodes {
            if node.password.is_some() {
                node.password = Some(REDACTED.to_owned());
            }
            if node.key_passphrase.is_some() {
                node.key_passphrase = Some(REDACTED.to_owned());
            }
        }
        copy
    }
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            namespace: String::new(),
            registry: String::new(),
            cri_socket: String::new(),
            vip: String::new(),
            ntp: NtpConfig::default(),
            nfs: NfsConfig::default(),
            nodes: Vec::new(),
            credential_encoding: CredentialEncoding::default(),
            resource_root: default_resource_root(),
            ssh: SshConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl std::str::FromStr for ClusterConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_yaml_str(content)
    }
}

/// Time synchronisation settings. An empty server disables the chrony step.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct NtpConfig {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub allow: String,
    #[serde(default)]
    pub timezone: String,
}

/// Shared storage settings. An empty server skips the mount step.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
pub struct NfsConfig {
    #[serde(default)]
    pub server: String,
    #[serde(default)]
    pub path: String,
}

/// How credential fields are written in the configuration file.
///
/// Base64 is a transport convenience for the file format, not protection.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum CredentialEncoding {
    #[default]
    Base64,
    Plain,
}

impl CredentialEncoding {
    pub fn decode(&self, value: &str) -> Result<String> {
        match self {
            CredentialEncoding::Plain => Ok(value.trim().to_owned()),
            CredentialEncoding::Base64 => {
                let bytes = STANDARD
                    .decode(value.trim())
                    .context("credential is not valid base64")?;
                let decoded =
                    String::from_utf8(bytes).context("decoded credential is not valid utf-8")?;
                Ok(decoded.trim().to_owned())
            }
        }
    }
}

/// One managed host as declared in configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct NodeConfig {
    pub address: String,
    #[serde(default)]
    pub hostname: String,
    #[serde(default, alias = "roles")]
    pub role: Vec<String>,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
    #[serde(default)]
    pub key_passphrase: Option<String>,
}

impl NodeConfig {
    fn validate(&self, index: usize) -> Result<()> {
        if self.address.trim().is_empty() {
            return Err(anyhow!("node #{} has an empty address", index + 1));
        }
        if self.hostname.trim().is_empty() {
            return Err(anyhow!("node {} must declare a hostname", self.address));
        }
        if self.port == 0 {
            return Err(anyhow!("node {} has port 0", self.address));
        }
        if self.role.is_empty() {
            return Err(anyhow!("node {} must declare at least one role", self.address));
        }
        RoleSet::parse(&self.role).map_err(|err| anyhow!("node {}: {}", self.address, err))?;
        if self.password.is_none() && self.key_path.is_none() {
            return Err(anyhow!(
                "node {} needs either a password or a key-path",
                self.address
            ));
        }
        Ok(())
    }

    /// Parsed role set; configuration validation guarantees this succeeds.
    pub fn roles(&self) -> Result<RoleSet> {
        RoleSet::parse(&self.role).map_err(|err| anyhow!("node {}: {}", self.address, err))
    }

    pub fn decoded_username(&self, encoding: CredentialEncoding) -> Result<String> {
        match &self.username {
            Some(raw) => encoding
                .decode(raw)
                .with_context(|| format!("node {}: username", self.address)),
            None => Ok(default_username()),
        }
    }

    pub fn decoded_password(&self, encoding: CredentialEncoding) -> Result<Option<String>> {
        self.password
            .as_deref()
            .map(|raw| {
                encoding
                    .decode(raw)
                    .with_context(|| format!("node {}: password", self.address))
            })
            .transpose()
    }

    pub fn decoded_key_passphrase(&self, encoding: CredentialEncoding) -> Result<Option<String>> {
        self.key_passphrase
            .as_deref()
            .map(|raw| {
                encoding
                    .decode(raw)
                    .with_context(|| format!("node {}: key-passphrase", self.address))
            })
            .transpose()
    }
}

/// Host key trust policy applied when opening sessions.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum HostKeyPolicy {
    #[default]
    AcceptAny,
    KnownHosts,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct SshConfig {
    #[serde(default)]
    pub host_key_policy: HostKeyPolicy,
    #[serde(default)]
    pub known_hosts: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct LoggingConfig {
    #[serde(default)]
    pub directory: Option<PathBuf>,
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    #[serde(default)]
    pub file_prefix: Option<String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: None,
            format: default_log_format(),
            file_prefix: None,
        }
    }
}
