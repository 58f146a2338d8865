//! ---
//! kf_section: "04-configuration-orchestration"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Cluster configuration model, loading, and validation."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::fs;

use kforge_common::config::{ClusterConfig, CredentialEncoding, HostKeyPolicy};
use kforge_common::role::Role;
use kforge_common::LogFormat;
use tempfile::tempdir;

const THREE_NODE_YAML: &str = r#"
namespace: prod
registry: registry.local
cri-socket: unix:///var/run/cri-dockerd.sock
vip: 10.0.0.100
ntp:
  server: 10.0.0.1
  allow: 10.0.0.0/24
  timezone: Asia/Shanghai
nfs:
  server: 10.0.0.50
  path: /data/nfs
nodes:
  - address: 10.0.0.1
    hostname: master-1
    role: [etcd, controlplane]
    username: cm9vdA==
    password: c2VjcmV0Cg==
  - address: 10.0.0.2
    hostname: worker-1
    role: [worker]
    port: 2222
    password: c2VjcmV0
  - address: 10.0.0.3
    hostname: worker-2
    role: [Worker]
    key-path: /root/.ssh/id_ed25519
"#;

#[test]
fn parses_yaml_with_kebab_case_keys() {
    let config: ClusterConfig = THREE_NODE_YAML.parse().expect("valid yaml config");
    assert_eq!(config.namespace, "prod");
    assert_eq!(config.cri_socket, "unix:///var/run/cri-dockerd.sock");
    assert_eq!(config.ntp.allow, "10.0.0.0/24");
    assert_eq!(config.nfs.path, "/data/nfs");
    assert_eq!(config.nodes.len(), 3);
    assert_eq!(config.nodes[0].port, 22);
    assert_eq!(config.nodes[1].port, 2222);
    assert_eq!(config.resource_root.to_str(), Some("resource"));
    assert_eq!(config.ssh.host_key_policy, HostKeyPolicy::AcceptAny);
    assert_eq!(config.logging.format, LogFormat::Pretty);

    let roles = config.nodes[0].roles().expect("roles parse");
    assert!(roles.contains(Role::Etcd));
    assert!(roles.contains(Role::ControlPlane));
    assert!(!roles.contains(Role::Worker));
}

#[test]
fn decodes_base64_credentials_and_trims() {
    let config: ClusterConfig = THREE_NODE_YAML.parse().expect("valid yaml config");
    let encoding = config.credential_encoding;
    assert_eq!(encoding, CredentialEncoding::Base64);

    let first = &config.nodes[0];
    assert_eq!(first.decoded_username(encoding).unwrap(), "root");
    assert_eq!(
        first.decoded_password(encoding).unwrap().as_deref(),
        Some("secret")
    );

    let second = &config.nodes[1];
    assert_eq!(second.decoded_username(encoding).unwrap(), "root");

    let third = &config.nodes[2];
    assert_eq!(third.decoded_password(encoding).unwrap(), None);
}

#[test]
fn plain_encoding_passes_values_through() {
    assert_eq!(
        CredentialEncoding::Plain.decode(" hunter2 ").unwrap(),
        "hunter2"
    );
    assert!(CredentialEncoding::Base64.decode("%%%").is_err());
}

#[test]
fn rejects_unknown_role() {
    let yaml = r#"
nodes:
  - address: 10.0.0.1
    hostname: n1
    role: [etcd, ingress]
    password: c2VjcmV0
"#;
    let err = yaml.parse::<ClusterConfig>().expect_err("ingress is not a role");
    assert!(format!("{err:#}").contains("invalid role: ingress"));
}

#[test]
fn rejects_duplicate_addresses_and_missing_secret() {
    let duplicate = r#"
nodes:
  - address: 10.0.0.1
    hostname: n1
    role: [etcd, controlplane, worker]
    password: c2VjcmV0
  - address: 10.0.0.1
    hostname: n2
    role: [worker]
    password: c2VjcmV0
"#;
    let err = duplicate.parse::<ClusterConfig>().unwrap_err();
    assert!(err.to_string().contains("declared twice"));

    let no_secret = r#"
nodes:
  - address: 10.0.0.1
    hostname: n1
    role: [worker]
"#;
    let err = no_secret.parse::<ClusterConfig>().unwrap_err();
    assert!(err.to_string().contains("password or a key-path"));
}

#[test]
fn loads_toml_by_extension_and_redacts_secrets() {
    let dir = tempdir().expect("tempdir");
    let path = dir.path().join("cluster.toml");
    fs::write(
        &path,
        r#"
namespace = "edge"
vip = "192.168.1.10"
credential-encoding = "plain"

[ssh]
host-key-policy = "known-hosts"
known-hosts = "/etc/kforge/known_hosts"

[[nodes]]
address = "192.168.1.11"
hostname = "solo"
role = ["etcd", "controlplane", "worker"]
username = "admin"
password = "pa55"
"#,
    )
    .unwrap();

    let loaded = ClusterConfig::load_with_source(&[dir.path().join("missing.yml"), path.clone()])
        .expect("toml config loads");
    assert_eq!(loaded.source, path);
    let config = loaded.config;
    assert_eq!(config.namespace, "edge");
    assert_eq!(config.ssh.host_key_policy, HostKeyPolicy::KnownHosts);
    assert_eq!(
        config.nodes[0]
            .decoded_username(config.credential_encoding)
            .unwrap(),
        "admin"
    );

    let redacted = config.redacted();
    assert_eq!(redacted.nodes[0].password.as_deref(), Some("******"));
    assert_eq!(config.nodes[0].password.as_deref(), Some("pa55"));
}

#[test]
fn load_reports_inspected_candidates() {
    let dir = tempdir().expect("tempdir");
    let missing = dir.path().join("absent.yml");
    let err = ClusterConfig::load(&[missing.clone()]).unwrap_err();
    assert!(err.to_string().contains(&missing.display().to_string()));
}
