//! ---
//! kf_section: "02-remote-node"
//! kf_subsection: "module"
//! kf_type: "source"
//! kf_scope: "code"
//! kf_description: "Shell command composition for remote invocations."
//! kf_version: "v0.0.0-prealpha"
//! kf_owner: "tbd"
//! ---

const HOSTS_FILE: &str = "/etc/hosts";

/// Join commands into a single remote invocation.
///
/// With a working directory the sequence becomes `cd <cwd> && ... && cd ~`.
pub fn compose(cwd: Option<&str>, commands: &[String]) -> String {
    let body = commands.join(" && ");
    match cwd {
        Some(dir) if !dir.is_empty() => format!("cd {} && {} && cd ~", dir, body),
        _ => body,
    }
}

/// Commands that run a resource's `install.sh` with the given arguments.
pub fn install_script(args: &[String]) -> Vec<String> {
    let invocation = if args.is_empty() {
        "bash install.sh".to_owned()
    } else {
        format!("bash install.sh {}", args.join(" "))
    };
    vec!["chmod +x install.sh".to_owned(), invocation]
}

pub fn add_host(address: &str, name: &str) -> String {
    format!("sudo sed -i '$a {}  {}' {}", address, name, HOSTS_FILE)
}

pub fn remove_host(name: &str) -> String {
    format!("sudo sed -i '/{}/d' {}", name, HOSTS_FILE)
}

pub fn replace_host(address: &str, name: &str) -> Vec<String> {
    vec![remove_host(name), add_host(address, name)]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceAction {
    Start,
    Stop,
}

pub fn systemctl(action: ServiceAction, name: &str) -> String {
    let verb = match action {
        ServiceAction::Start => "start",
        ServiceAction::Stop => "stop",
    };
    format!("sudo systemctl {} {}", verb, name)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| (*s).to_owned()).collect()
    }

    #[test]
    fn composes_with_and_without_cwd() {
        let cmds = owned(&["a", "b"]);
        assert_eq!(compose(None, &cmds), "a && b");
        assert_eq!(
            compose(Some("resource/kubeadm"), &cmds),
            "cd resource/kubeadm && a && b && cd ~"
        );
        assert_eq!(compose(Some(""), &cmds), "a && b");
    }

    #[test]
    fn install_script_joins_arguments() {
        assert_eq!(
            install_script(&owned(&["10.0.0.1", "10.0.0.0/24"])),
            owned(&["chmod +x install.sh", "bash install.sh 10.0.0.1 10.0.0.0/24"])
        );
        assert_eq!(install_script(&[])[1], "bash install.sh");
    }

    #[test]
    fn host_file_edits() {
        assert_eq!(
            add_host("10.0.0.2", "worker-1"),
            "sudo sed -i '$a 10.0.0.2  worker-1' /etc/hosts"
        );
        assert_eq!(
            replace_host("10.0.0.2", "worker-1"),
            vec![
                "sudo sed -i '/worker-1/d' /etc/hosts".to_owned(),
                "sudo sed -i '$a 10.0.0.2  worker-1' /etc/hosts".to_owned(),
            ]
        );
        assert_eq!(
            systemctl(ServiceAction::Stop, "keepalived"),
            "sudo systemctl stop keepalived"
        );
    }
}
