//! ---
//! kf_section: "02-remote-node"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Operating system, architecture, and home directory discovery."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::fmt;

use async_trait::async_trait;
use tracing::info;

use crate::error::{NodeError, Result};

pub const OS_ID_COMMAND: &str = "cat /etc/os-release | grep -w ID | awk -F '=' '{print $2}'";
pub const ARCH_COMMAND: &str = "arch";
pub const HOME_COMMAND: &str = "echo -n $HOME";
const APT_CHECK: &str = "type apt 2>/dev/null";
const YUM_CHECK: &str = "type yum 2>/dev/null";

/// Package-manager family of the remote operating system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsFamily {
    Centos,
    Ubuntu,
}

impl OsFamily {
    pub fn as_str(&self) -> &'static str {
        match self {
            OsFamily::Centos => "centos",
            OsFamily::Ubuntu => "ubuntu",
        }
    }
}

impl fmt::Display for OsFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// CPU architecture as reported by `arch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arch {
    X86_64,
    Aarch64,
}

impl Arch {
    pub const ALL: [Arch; 2] = [Arch::X86_64, Arch::Aarch64];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::X86_64 => "x86_64",
            Arch::Aarch64 => "aarch64",
        }
    }

    pub fn from_name(name: &str) -> Option<Arch> {
        Arch::ALL.into_iter().find(|arch| arch.as_str() == name)
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Facts discovered once at connect time and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeFacts {
    pub os: OsFamily,
    pub arch: Arch,
    pub home: String,
}

/// Classification of the `ID` field of `/etc/os-release`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OsRelease {
    Known(OsFamily),
    /// Kylin ships either package manager; the family is found by asking for each.
    Ambiguous(String),
    Unsupported(String),
}

pub fn classify_os_release(output: &str) -> OsRelease {
    let id = output.trim().trim_matches('"').trim();
    match id {
        "centos" => OsRelease::Known(OsFamily::Centos),
        "ubuntu" => OsRelease::Known(OsFamily::Ubuntu),
        "kylin" => OsRelease::Ambiguous(id.to_owned()),
        other => OsRelease::Unsupported(other.to_owned()),
    }
}

/// Minimal command surface fact discovery needs from a session.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run one command and return its standard output.
    async fn output(&self, command: &str) -> Result<String>;
}

/// Discover OS family, architecture, and home directory, failing on the first problem.
pub async fn discover(runner: &dyn CommandRunner, address: &str) -> Result<NodeFacts> {
    let os = discover_os(runner, address).await?;
    info!(node = %address, %os, "operating system detected");

    let arch_output = runner.output(ARCH_COMMAND).await?;
    let arch_name = arch_output.trim();
    let arch = Arch::from_name(arch_name).ok_or_else(|| NodeError::UnsupportedArchitecture {
        address: address.to_owned(),
        arch: arch_name.to_owned(),
    })?;
    info!(node = %address, %arch, "architecture detected");

    let home = runner.output(HOME_COMMAND).await?;
    info!(node = %address, %home, "home directory detected");

    Ok(NodeFacts { os, arch, home })
}

async fn discover_os(runner: &dyn CommandRunner, address: &str) -> Result<OsFamily> {
    match classify_os_release(&runner.output(OS_ID_COMMAND).await?) {
        OsRelease::Known(os) => Ok(os),
        OsRelease::Ambiguous(id) => {
            if has_command(runner, APT_CHECK).await? {
                Ok(OsFamily::Ubuntu)
            } else if has_command(runner, YUM_CHECK).await? {
                Ok(OsFamily::Centos)
            } else {
                Err(NodeError::UnsupportedPlatform {
                    address: address.to_owned(),
                    os: format!("{} (neither apt nor yum found)", id),
                })
            }
        }
        OsRelease::Unsupported(id) => Err(NodeError::UnsupportedPlatform {
            address: address.to_owned(),
            os: id,
        }),
    }
}

/// A check that exits non-zero means "absent"; session failures still propagate.
async fn has_command(runner: &dyn CommandRunner, command: &str) -> Result<bool> {
    match runner.output(command).await {
        Ok(_) => Ok(true),
        Err(err) if err.is_remote_command() => Ok(false),
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    struct Scripted {
        replies: HashMap<&'static str, std::result::Result<&'static str, i32>>,
    }

    #[async_trait]
    impl CommandRunner for Scripted {
        async fn output(&self, command: &str) -> Result<String> {
            match self.replies.get(command) {
                Some(Ok(out)) => Ok((*out).to_owned()),
                Some(Err(status)) => Err(NodeError::RemoteCommand {
                    address: "test".to_owned(),
                    command: command.to_owned(),
                    status: *status,
                    stderr: String::new(),
                }),
                None => panic!("unexpected command {command}"),
            }
        }
    }

    fn scripted(
        pairs: &[(&'static str, std::result::Result<&'static str, i32>)],
    ) -> Scripted {
        Scripted {
            replies: pairs.iter().cloned().collect(),
        }
    }

    #[test]
    fn classifies_quoted_ids() {
        assert_eq!(
            classify_os_release("\"centos\"\n"),
            OsRelease::Known(OsFamily::Centos)
        );
        assert_eq!(
            classify_os_release("ubuntu\n"),
            OsRelease::Known(OsFamily::Ubuntu)
        );
        assert_eq!(
            classify_os_release("kylin"),
            OsRelease::Ambiguous("kylin".to_owned())
        );
        assert_eq!(
            classify_os_release("\"debian\""),
            OsRelease::Unsupported("debian".to_owned())
        );
    }

    #[tokio::test]
    async fn discovers_all_facts() {
        let runner = scripted(&[
            (OS_ID_COMMAND, Ok("ubuntu\n")),
            (ARCH_COMMAND, Ok("aarch64\n")),
            (HOME_COMMAND, Ok("/home/ops")),
        ]);
        let facts = discover(&runner, "10.0.0.1").await.expect("facts");
        assert_eq!(
            facts,
            NodeFacts {
                os: OsFamily::Ubuntu,
                arch: Arch::Aarch64,
                home: "/home/ops".to_owned(),
            }
        );
    }

    #[tokio::test]
    async fn kylin_with_apt_is_ubuntu_family() {
        let runner = scripted(&[
            (OS_ID_COMMAND, Ok("\"kylin\"\n")),
            (APT_CHECK, Ok("apt is /usr/bin/apt")),
            (ARCH_COMMAND, Ok("aarch64\n")),
            (HOME_COMMAND, Ok("/root")),
        ]);
        let facts = discover(&runner, "10.0.0.5").await.expect("facts");
        assert_eq!(facts.os, OsFamily::Ubuntu);
        assert_eq!(facts.arch, Arch::Aarch64);
    }

    #[tokio::test]
    async fn kylin_falls_back_to_yum() {
        let runner = scripted(&[
            (OS_ID_COMMAND, Ok("kylin\n")),
            (APT_CHECK, Err(1)),
            (YUM_CHECK, Ok("yum is /usr/bin/yum")),
            (ARCH_COMMAND, Ok("x86_64")),
            (HOME_COMMAND, Ok("/root")),
        ]);
        let facts = discover(&runner, "10.0.0.2").await.expect("facts");
        assert_eq!(facts.os, OsFamily::Centos);
    }

    #[tokio::test]
    async fn kylin_without_package_manager_is_unsupported() {
        let runner = scripted(&[
            (OS_ID_COMMAND, Ok("kylin\n")),
            (APT_CHECK, Err(1)),
            (YUM_CHECK, Err(1)),
        ]);
        let err = discover(&runner, "10.0.0.3").await.unwrap_err();
        assert!(matches!(err, NodeError::UnsupportedPlatform { .. }));
    }

    #[tokio::test]
    async fn unsupported_architecture_stops_discovery() {
        let runner = scripted(&[
            (OS_ID_COMMAND, Ok("centos")),
            (ARCH_COMMAND, Ok("riscv64\n")),
        ]);
        let err = discover(&runner, "10.0.0.4").await.unwrap_err();
        match err {
            NodeError::UnsupportedArchitecture { arch, .. } => assert_eq!(arch, "riscv64"),
            other => panic!("unexpected error {other:?}"),
        }
    }
}
