//! ---
//! kf_section: "04-configuration-orchestration"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Join command extraction and formatting."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---
use once_cell::sync::Lazy;
use regex::Regex;

/// `kubeadm join` block spanning three lines of init output.
static JOIN_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(kubeadm join.*?\n.*?\n.*?)\n").expect("regex for join block"));

/// Prints a control-plane join command with a fresh certificate key.
pub const CONTROL_PLANE_TOKEN: &str =
    "sudo kubeadm token create --print-join-command --certificate-key $(kubeadm certs certificate-key)";
/// Prints a worker join command.
pub const WORKER_TOKEN: &str = "sudo kubeadm token create --print-join-command";
/// Re-uploads control-plane certificates so a new certificate key is valid.
pub const UPLOAD_CERTS: &str = "sudo kubeadm init phase upload-certs --upload-certs";

/// Join commands recovered from cluster initialisation output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinCommands {
    /// Three-line join including `--control-plane --certificate-key`.
    pub control_plane: String,
    /// Two-line join for worker nodes.
    pub worker: String,
}

/// Extract the first join block from `kubeadm init` output.
///
/// The block's continuation lines are split on `\` + newline and rejoined
/// with single spaces.
pub fn parse_join_commands(output: &str) -> Option<JoinCommands> {
    let block = JOIN_BLOCK.captures(output)?.get(1)?.as_str();
    let parts: Vec<&str> = block.split("\\\n").map(str::trim).collect();
    if parts.len() < 3 || parts.iter().take(3).any(|part| part.is_empty()) {
        return None;
    }
    Some(JoinCommands {
        control_plane: format!("sudo {} {} {}", parts[0], parts[1], parts[2]),
        worker: format!("sudo {} {}", parts[0], parts[1]),
    })
}

/// Turn printed `kubeadm token create` output into a runnable join.
///
/// A CRI socket given as a bare path becomes `--cri-socket=<path>`; a value
/// that already starts with `--` is appended verbatim.
pub fn join_invocation(printed: &str, cri_socket: &str) -> String {
    let command = printed.trim();
    let cri_socket = cri_socket.trim();
    if cri_socket.is_empty() {
        format!("sudo {}", command)
    } else if cri_socket.starts_with("--") {
        format!("sudo {} {}", command, cri_socket)
    } else {
        format!("sudo {} --cri-socket={}", command, cri_socket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const INIT_OUTPUT: &str = "Your Kubernetes control-plane has initialized successfully!\n\
\n\
You can now join any number of the control-plane node running the following command on each as root:\n\
\n\
  kubeadm join 10.0.0.100:6443 --token abcdef.0123456789abcdef \\\n\
\t--discovery-token-ca-cert-hash sha256:1234 \\\n\
\t--control-plane --certificate-key 5678\n\
\n\
Then you can join any number of worker nodes by running the following on each as root:\n\
\n\
kubeadm join 10.0.0.100:6443 --token abcdef.0123456789abcdef \\\n\
\t--discovery-token-ca-cert-hash sha256:1234 \n";

    #[test]
    fn extracts_both_join_commands() {
        let joins = parse_join_commands(INIT_OUTPUT).expect("join block present");
        assert_eq!(
            joins.control_plane,
            "sudo kubeadm join 10.0.0.100:6443 --token abcdef.0123456789abcdef \
--discovery-token-ca-cert-hash sha256:1234 --control-plane --certificate-key 5678"
        );
        assert_eq!(
            joins.worker,
            "sudo kubeadm join 10.0.0.100:6443 --token abcdef.0123456789abcdef \
--discovery-token-ca-cert-hash sha256:1234"
        );
    }

    #[test]
    fn missing_block_yields_none() {
        assert!(parse_join_commands("init failed\n").is_none());
        assert!(parse_join_commands("kubeadm join x\ny\n").is_none());
    }

    #[test]
    fn cri_socket_formats() {
        assert_eq!(
            join_invocation("kubeadm join a --token t\n", ""),
            "sudo kubeadm join a --token t"
        );
        assert_eq!(
            join_invocation("kubeadm join a", "unix:///var/run/cri-dockerd.sock"),
            "sudo kubeadm join a --cri-socket=unix:///var/run/cri-dockerd.sock"
        );
        assert_eq!(
            join_invocation("kubeadm join a", "--cri-socket /run/containerd.sock"),
            "sudo kubeadm join a --cri-socket /run/containerd.sock"
        );
    }
}
