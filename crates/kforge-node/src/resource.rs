//! ---
//! kf_section: "02-remote-node"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Local resource directory resolution and remote path mapping."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use std::path::{Path, PathBuf};

use crate::error::{NodeError, Result};
use crate::facts::OsFamily;

pub const DEFAULT_REMOTE_ROOT: &str = "resource";

/// Where payload directories live locally and under the remote home.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLayout {
    pub local_root: PathBuf,
    pub remote_root: String,
}

/// A payload directory selected for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedResource {
    pub local: PathBuf,
    /// Path relative to the remote home, using `/` separators.
    pub remote: String,
}

impl Default for ResourceLayout {
    fn default() -> Self {
        Self::new(DEFAULT_REMOTE_ROOT)
    }
}

impl ResourceLayout {
    pub fn new(local_root: impl Into<PathBuf>) -> Self {
        Self {
            local_root: local_root.into(),
            remote_root: DEFAULT_REMOTE_ROOT.to_owned(),
        }
    }

    /// Prefer `<root>/<name>/<os>` and fall back to `<root>/<name>`.
    pub fn resolve(&self, name: &str, os: OsFamily) -> Result<ResolvedResource> {
        let name = name.trim_matches('/');
        let base = self.local_root.join(name);
        let specific = base.join(os.as_str());
        if specific.is_dir() {
            return Ok(ResolvedResource {
                local: specific,
                remote: format!("{}/{}/{}", self.remote_root, name, os.as_str()),
            });
        }
        if base.is_dir() {
            return Ok(ResolvedResource {
                local: base,
                remote: format!("{}/{}", self.remote_root, name),
            });
        }
        Err(NodeError::ResourceMissing { path: base })
    }

    /// Remote path for a read-back request.
    ///
    /// `~/x` is taken relative to the home directory, anything else relative to
    /// the remote resource root.
    pub fn remote_read_path(&self, home: &str, path: &str) -> String {
        match path.strip_prefix('~') {
            Some(rest) => remote_absolute(home, rest.trim_start_matches('/')),
            None => remote_absolute(
                home,
                &format!("{}/{}", self.remote_root, path.trim_start_matches('/')),
            ),
        }
    }
}

pub fn remote_absolute(home: &str, relative: &str) -> String {
    let home = home.trim_end_matches('/');
    if relative.is_empty() {
        home.to_owned()
    } else {
        format!("{}/{}", home, relative)
    }
}

/// Convert a relative local path into a `/`-separated remote suffix.
pub fn to_remote_suffix(path: &Path) -> String {
    path.components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn prefers_os_specific_directory() {
        let dir = tempdir().unwrap();
        fs::create_dir_all(dir.path().join("docker/ubuntu")).unwrap();
        fs::create_dir_all(dir.path().join("kubeadm")).unwrap();
        let layout = ResourceLayout::new(dir.path());

        let docker = layout.resolve("docker", OsFamily::Ubuntu).unwrap();
        assert_eq!(docker.local, dir.path().join("docker/ubuntu"));
        assert_eq!(docker.remote, "resource/docker/ubuntu");

        let docker_centos = layout.resolve("docker", OsFamily::Centos).unwrap();
        assert_eq!(docker_centos.remote, "resource/docker");

        let nested = layout.resolve("kubeadm", OsFamily::Centos).unwrap();
        assert_eq!(nested.local, dir.path().join("kubeadm"));
    }

    #[test]
    fn missing_resource_is_an_error() {
        let dir = tempdir().unwrap();
        let layout = ResourceLayout::new(dir.path());
        let err = layout.resolve("helm", OsFamily::Ubuntu).unwrap_err();
        assert!(matches!(err, NodeError::ResourceMissing { .. }));
    }

    #[test]
    fn read_paths() {
        let layout = ResourceLayout::default();
        assert_eq!(
            layout.remote_read_path("/root", "~/.kube/config"),
            "/root/.kube/config"
        );
        assert_eq!(
            layout.remote_read_path("/home/ops/", "kubeadm/join.txt"),
            "/home/ops/resource/kubeadm/join.txt"
        );
    }
}
